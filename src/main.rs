mod api_client;
mod config;
mod data;
mod error;
mod extractor;
mod runner;
mod sink;
mod warehouse;

use clap::Parser;
use crate::config::Config;
use error::Error;
use log::{error, info};
use sink::LogicalTable;

#[derive(Parser)]
#[command(about = "Loads ads performance data for every account under an MCC into the warehouse")]
struct Args {
    #[command(flatten)]
    config: Config,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let args = Args::parse();

    env_logger::init();

    if !std::path::Path::new(&args.config.key_file).exists() {
        error!("service key file {} not found", args.config.key_file);
        std::process::exit(1);
    }
    std::env::set_var(warehouse::CREDENTIALS_ENV, &args.config.key_file);

    match runner::run(args.config).await {
        Ok(summary) => {
            info!(
                "run complete: {} accounts processed, {} failed",
                summary.accounts, summary.failed
            );
            for table in LogicalTable::ALL {
                info!(
                    "{}: {} rows loaded, {} failed writes",
                    table.table_name(),
                    summary.stats.rows_loaded(table),
                    summary.stats.write_failures(table)
                );
            }
        }
        Err(err) => {
            error!("run failed: {}", err);
            std::process::exit(1);
        }
    }

    Ok(())
}
