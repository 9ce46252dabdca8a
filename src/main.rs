mod catalog;
mod config;
mod error;
mod export;
mod ingest;
mod models;
mod order_db;
mod parser;
mod pipeline;
mod pricing;
mod queries;
mod report;
mod workbook;

use catalog::CatalogIndex;
use clap::{Args, Parser, Subcommand, ValueEnum};
use ingest::DeliveryFilter;
use order_db::OrderStore;
use pipeline::RunOptions;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Consolidate group-buy orders into store and customer sheets.
#[derive(Parser, Debug)]
#[command(name = "groupbuy")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(short, long, global = true, default_value = "config/groupbuy.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ingest orders and build the sheets for one delivery date
    Run(RunArgs),
    /// Parse one order block against the saved catalog and print it as JSON
    Parse {
        #[arg(short, long, value_enum)]
        format: BlockFormat,

        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Delivery date token such as 2/19, or ALL to ingest every date without reports
    #[arg(short, long)]
    date: String,

    /// Reload the catalog and all orders from the workbook
    #[arg(long)]
    reingest: bool,

    /// Only stores in this group
    #[arg(short, long, default_value = "")]
    group: String,

    /// Skip the per-store sheets
    #[arg(long)]
    customers_only: bool,

    /// First store id to export; overrides the saved marker
    #[arg(long)]
    resume_id: Option<i64>,

    /// Warn when a form's printed total disagrees with its items
    #[arg(long)]
    check_totals: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum BlockFormat {
    Grouped,
    Tabular,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // init tracing
    tracing_subscriber::fmt()
        .with_target(true)
        .with_level(true)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let cfg = config::Config::load(&cli.config)?;

    match cli.command {
        Command::Run(args) => {
            let opts = RunOptions {
                delivery: DeliveryFilter::parse(&args.date),
                reingest: args.reingest,
                group: args.group,
                customers_only: args.customers_only,
                resume_id: args.resume_id,
                check_totals: args.check_totals,
            };
            info!(date = %args.date, reingest = opts.reingest, "Run started");
            pipeline::run(&cli.config, &cfg, &opts).await?;
        }
        Command::Parse { format, file } => {
            let db = OrderStore::new(&cfg.db_path)?;
            let index = CatalogIndex::build(db.load_stores()?, db.load_products()?);
            let text = std::fs::read_to_string(&file)?;
            let block = match format {
                BlockFormat::Grouped => parser::parse_grouped(&index, &text)?,
                BlockFormat::Tabular => parser::parse_tabular(&index, &text)?,
            };
            println!("{}", serde_json::to_string_pretty(&block)?);
        }
    }

    Ok(())
}
