use serde::Deserialize;
use std::{fs, path::Path, path::PathBuf};
use toml_edit::{DocumentMut, table, value};

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: String,
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
    pub source: SourceConfig,
    #[serde(default)]
    pub sheets: SheetNames,
    #[serde(default)]
    pub form: FormFields,
    #[serde(default)]
    pub run: RunState,
}

fn default_db_path() -> String {
    "data/groupbuy.db".to_string()
}

fn default_output_dir() -> String {
    "out".to_string()
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SourceConfig {
    Local {
        dir: PathBuf,
    },
    Remote {
        spreadsheet_id: String,
        #[serde(default)]
        access_token: Option<String>,
    },
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SheetNames {
    pub stores: String,
    pub products: String,
    pub orders: Vec<String>,
    pub extra_orders: Option<String>,
}

impl Default for SheetNames {
    fn default() -> Self {
        Self {
            stores: "Stores".to_string(),
            products: "Products".to_string(),
            orders: vec!["Orders".to_string()],
            extra_orders: None,
        }
    }
}

/// Order form columns holding the two free-text item blocks.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct FormFields {
    pub grouped_field: String,
    pub tabular_field: String,
}

impl Default for FormFields {
    fn default() -> Self {
        Self {
            grouped_field: "食物: Products".to_string(),
            tabular_field: "冰品飲料".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RunState {
    /// First store id still to be exported.
    pub resume_id: i64,
}

impl Default for RunState {
    fn default() -> Self {
        Self { resume_id: 1 }
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Box<dyn std::error::Error>> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    pub fn record_resume_id(
        path: impl AsRef<Path>,
        resume_id: i64,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let content = fs::read_to_string(&path)?;
        let mut doc = content.parse::<DocumentMut>()?;

        if !doc.contains_key("run") {
            doc["run"] = table();
        }
        doc["run"]["resume_id"] = value(resume_id);

        fs::write(&path, doc.to_string())?;
        Ok(())
    }
}
