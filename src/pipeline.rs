// src/pipeline.rs

use crate::catalog::CatalogIndex;
use crate::config::Config;
use crate::export::SheetExporter;
use crate::ingest::{DeliveryFilter, IngestSummary, Ingestor};
use crate::models::{Product, Store};
use crate::order_db::OrderStore;
use crate::report::{customer_sheet, store_sheet};
use crate::workbook::{self, Workbook};
use std::path::Path;
use tracing::{info, info_span};

/// One batch run, as chosen on the command line.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub delivery: DeliveryFilter,
    /// Reload the catalog and every order from the workbook.
    pub reingest: bool,
    /// Only stores whose group contains this token; empty keeps all.
    pub group: String,
    pub customers_only: bool,
    /// Overrides the resume marker stored in the config file.
    pub resume_id: Option<i64>,
    pub check_totals: bool,
}

pub async fn run(
    config_path: &Path,
    cfg: &Config,
    opts: &RunOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let book = workbook::open(&cfg.source);
    let db = OrderStore::new(&cfg.db_path)?;

    let stores: Vec<Store> = book
        .records(&cfg.sheets.stores)
        .await?
        .iter()
        .map(Store::from_record)
        .collect::<crate::error::Result<_>>()?;
    let stores: Vec<Store> = stores.into_iter().filter(|s| s.in_group(&opts.group)).collect();
    info!(group = %opts.group, stores = stores.len(), "Stores selected");

    let index = if opts.reingest {
        let products: Vec<Product> = book
            .records(&cfg.sheets.products)
            .await?
            .iter()
            .map(Product::from_record)
            .collect::<crate::error::Result<_>>()?;
        db.reset_orders()?;
        let saved = db.replace_catalog(&stores, &products)?;
        let index = CatalogIndex::build(stores, saved);

        let summary = ingest(book.as_ref(), &db, &index, cfg, opts).await?;
        info!(
            orders = summary.orders,
            items = summary.items,
            skipped = summary.skipped,
            "Orders ingested"
        );
        index
    } else {
        let mut products = db.load_products()?;
        products.retain(|p| stores.iter().any(|s| s.id == p.store_id));
        CatalogIndex::build(stores, products)
    };
    info!(
        stores = index.stores().len(),
        products = index.products().len(),
        "Catalog ready"
    );

    let Some(date) = opts.delivery.date() else {
        info!("All delivery dates ingested, reports need a single date");
        log_counts(&db)?;
        return Ok(());
    };

    let exporter = SheetExporter::new(&cfg.output_dir);
    if !opts.customers_only {
        let resume_id = opts.resume_id.unwrap_or(cfg.run.resume_id);
        for store in index.stores().iter().filter(|s| s.id >= resume_id) {
            let _span = info_span!("store", store_id = store.id).entered();
            let rows = db.store_fulfillment_rows(store.id, date)?;
            if rows.is_empty() {
                info!(store = %store.name, "No orders for this store, sheet skipped");
            } else {
                let picks = db.store_customer_rows(store.id, date)?;
                let report = store_sheet(&index, store, date, &rows, &picks);
                exporter.export(&report.sheet)?;
                info!(store = %store.name, total = %report.total, "Store sheet done");
            }

            Config::record_resume_id(config_path, store.id + 1)?;
        }
    }

    let rows = db.all_customer_rows(date)?;
    if rows.is_empty() {
        info!(date = %date, "No customer orders, sheet skipped");
    } else {
        exporter.export(&customer_sheet(date, &rows))?;
    }
    Config::record_resume_id(config_path, 1)?;

    log_counts(&db)?;
    Ok(())
}

async fn ingest(
    book: &dyn Workbook,
    db: &OrderStore,
    index: &CatalogIndex,
    cfg: &Config,
    opts: &RunOptions,
) -> crate::error::Result<IngestSummary> {
    let ingestor = Ingestor::new(db, index, &cfg.form, &opts.delivery).check_totals(opts.check_totals);
    let mut summary = IngestSummary::default();

    for sheet in &cfg.sheets.orders {
        let records = book.records(sheet).await?;
        summary.absorb(ingestor.ingest_submissions(sheet, &records)?);
    }
    if let Some(extra) = &cfg.sheets.extra_orders {
        summary.absorb(ingestor.ingest_extra_orders(book, extra).await?);
    }
    Ok(summary)
}

fn log_counts(db: &OrderStore) -> crate::error::Result<()> {
    let (orders, items) = db.counts()?;
    info!(orders, items, "Database statistics");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const ORDERS: &str = "Submission Date,Order ID,First Name,Last Name,Email,Phone Number,Submission ID,Payment,Comments,Delivery Date,Delivery Address,食物: Products,冰品飲料\n\
        2024-02-10 10:00:00,1001,Amy,Lin,amy@example.com,555-0100,58213,Venmo,,2/19 Edison,,\"傳統客家小炒 (Amount: 16.00 USD, Quantity: 1)\nTotal: 16.00\",\"0: #, 1: 品項, 2: 配料, 3: 單價, 4: 數量, 5: 總價\n0: 1, 1: 手工豆花, 2: 芋圓, 3: 5.50, 4: 2, 5: 11\"\n\
        ,,,,,,,,,,,,\n";

    /// Workbook CSVs plus a config file pointing into one temp dir.
    fn workspace() -> (TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let sheets = dir.path().join("sheets");
        fs::create_dir_all(&sheets).unwrap();
        fs::write(
            sheets.join("Stores.csv"),
            "id,name,alias,tax,group\n1,豆花店,DH,0,north south\n2,阿扁,,1,north\n3,Elsewhere,,0,south\n",
        )
        .unwrap();
        fs::write(
            sheets.join("Products.csv"),
            "store_id,name,options,price,cost\n1,手工豆花,芋圓,5.50,4.50\n2,傳統客家小炒,,16.00,\n3,Far,,1.00,\n",
        )
        .unwrap();
        fs::write(sheets.join("Orders.csv"), ORDERS).unwrap();

        let config_path = dir.path().join("groupbuy.toml");
        fs::write(
            &config_path,
            format!(
                "db_path = \"{}\"\noutput_dir = \"{}\"\n\n[source]\nkind = \"local\"\ndir = \"{}\"\n",
                dir.path().join("db/groupbuy.db").display(),
                dir.path().join("out").display(),
                sheets.display()
            ),
        )
        .unwrap();
        (dir, config_path)
    }

    fn options(date: &str, reingest: bool) -> RunOptions {
        RunOptions {
            delivery: DeliveryFilter::parse(date),
            reingest,
            group: "north".to_string(),
            customers_only: false,
            resume_id: None,
            check_totals: true,
        }
    }

    #[tokio::test]
    async fn test_full_run_exports_every_sheet() {
        let (dir, config_path) = workspace();
        let cfg = Config::load(&config_path).unwrap();
        run(&config_path, &cfg, &options("2/19", true)).await.unwrap();

        let out = dir.path().join("out");
        for stem in ["豆花店 2_19", "阿扁 2_19", "人客 2_19"] {
            assert!(out.join(format!("{stem}.json")).exists(), "{stem}.json");
            assert!(out.join(format!("{stem}.pdf")).exists(), "{stem}.pdf");
        }
        assert!(!out.join("Elsewhere 2_19.json").exists());
        assert_eq!(Config::load(&config_path).unwrap().run.resume_id, 1);

        let db = OrderStore::new(&cfg.db_path).unwrap();
        assert_eq!(db.counts().unwrap(), (1, 2));
        assert_eq!(db.order_total(1).unwrap(), Some(rust_decimal_macros::dec!(27)));
    }

    #[tokio::test]
    async fn test_reuse_run_resumes_from_marker() {
        let (dir, config_path) = workspace();
        let cfg = Config::load(&config_path).unwrap();
        run(&config_path, &cfg, &options("2/19", true)).await.unwrap();
        fs::remove_dir_all(dir.path().join("out")).unwrap();

        let opts = RunOptions {
            resume_id: Some(2),
            ..options("2/19", false)
        };
        run(&config_path, &cfg, &opts).await.unwrap();

        let out = dir.path().join("out");
        assert!(!out.join("豆花店 2_19.json").exists());
        assert!(out.join("阿扁 2_19.json").exists());
        assert!(out.join("人客 2_19.json").exists());

        let db = OrderStore::new(&cfg.db_path).unwrap();
        assert_eq!(db.counts().unwrap(), (1, 2));
    }

    #[tokio::test]
    async fn test_store_without_orders_gets_no_sheet() {
        let (dir, config_path) = workspace();
        let cfg = Config::load(&config_path).unwrap();
        let opts = RunOptions {
            group: "south".to_string(),
            ..options("2/19", true)
        };
        run(&config_path, &cfg, &opts).await.unwrap();

        let out = dir.path().join("out");
        assert!(out.join("豆花店 2_19.json").exists());
        assert!(out.join("人客 2_19.json").exists());
        assert!(!out.join("Elsewhere 2_19.json").exists());
        assert!(!out.join("Elsewhere 2_19.pdf").exists());
        assert_eq!(Config::load(&config_path).unwrap().run.resume_id, 1);
    }

    #[tokio::test]
    async fn test_date_without_orders_exports_nothing() {
        let (dir, config_path) = workspace();
        let cfg = Config::load(&config_path).unwrap();
        run(&config_path, &cfg, &options("3/1", true)).await.unwrap();

        let out = dir.path().join("out");
        assert!(!out.join("豆花店 3_1.json").exists());
        assert!(!out.join("人客 3_1.json").exists());
        assert_eq!(Config::load(&config_path).unwrap().run.resume_id, 1);
    }

    #[tokio::test]
    async fn test_all_dates_ingests_without_reports() {
        let (dir, config_path) = workspace();
        let cfg = Config::load(&config_path).unwrap();
        run(&config_path, &cfg, &options("ALL", true)).await.unwrap();

        assert!(!dir.path().join("out").exists());
        let db = OrderStore::new(&cfg.db_path).unwrap();
        assert_eq!(db.counts().unwrap(), (1, 2));
    }
}
