// src/workbook.rs

use crate::config::SourceConfig;
use crate::error::{Error, Result};
use crate::models::Record;
use async_trait::async_trait;
use std::io::Read;
use std::path::PathBuf;
use tracing::{debug, info};
use urlencoding::encode;

/// Source of named worksheets, each read as header-keyed records.
#[async_trait]
pub trait Workbook: Send + Sync {
    async fn records(&self, sheet: &str) -> Result<Vec<Record>>;
}

/// Parse CSV with a header row. Header names are trimmed; cell text is kept
/// as-is since multi-line order blocks depend on it. Short rows are padded.
pub fn records_from_csv<R: Read>(reader: R) -> Result<Vec<Record>> {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_reader(reader);
    let headers = rdr.headers()?.clone();

    let mut records = Vec::new();
    for row in rdr.records() {
        let row = row?;
        records.push(Record::from_pairs(
            headers
                .iter()
                .enumerate()
                .map(|(i, h)| (h, row.get(i).unwrap_or(""))),
        ));
    }
    Ok(records)
}

/// Worksheets exported as `<dir>/<sheet>.csv`.
pub struct LocalWorkbook {
    dir: PathBuf,
}

impl LocalWorkbook {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl Workbook for LocalWorkbook {
    async fn records(&self, sheet: &str) -> Result<Vec<Record>> {
        let path = self.dir.join(format!("{sheet}.csv"));
        let file = std::fs::File::open(&path)?;
        let records = records_from_csv(file)?;
        info!(sheet, path = %path.display(), rows = records.len(), "Worksheet loaded");
        Ok(records)
    }
}

/// A shared online spreadsheet, fetched one worksheet at a time as CSV.
pub struct RemoteWorkbook {
    client: reqwest::Client,
    spreadsheet_id: String,
    access_token: Option<String>,
}

impl RemoteWorkbook {
    pub fn new(spreadsheet_id: &str, access_token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            spreadsheet_id: spreadsheet_id.to_string(),
            access_token,
        }
    }

    fn sheet_url(&self, sheet: &str) -> String {
        format!(
            "https://docs.google.com/spreadsheets/d/{}/gviz/tq?tqx=out:csv&sheet={}",
            self.spreadsheet_id,
            encode(sheet)
        )
    }
}

#[async_trait]
impl Workbook for RemoteWorkbook {
    async fn records(&self, sheet: &str) -> Result<Vec<Record>> {
        let url = self.sheet_url(sheet);
        debug!(sheet, %url, "Fetching worksheet");

        let mut request = self.client.get(&url);
        if let Some(token) = &self.access_token {
            request = request.bearer_auth(token);
        }
        let resp = request.send().await?;

        if !resp.status().is_success() {
            return Err(Error::RemoteStatus {
                sheet: sheet.to_string(),
                status: resp.status().as_u16(),
            });
        }

        let body = resp.bytes().await?;
        let records = records_from_csv(body.as_ref())?;
        info!(sheet, rows = records.len(), "Worksheet downloaded");
        Ok(records)
    }
}

pub fn open(source: &SourceConfig) -> Box<dyn Workbook> {
    match source {
        SourceConfig::Local { dir } => Box::new(LocalWorkbook::new(dir)),
        SourceConfig::Remote {
            spreadsheet_id,
            access_token,
        } => Box::new(RemoteWorkbook::new(spreadsheet_id, access_token.clone())),
    }
}
