use crate::api_client::{AdsApi, AdsApiClient, DateWindow};
use crate::config::{ApiConfig, Config};
use crate::error::Error;
use crate::extractor;
use crate::sink::{LogicalTable, SinkWriter, TableSet, WriteStats};
use crate::warehouse::{Warehouse, WarehouseClient};
use chrono::Local;
use futures::stream::{self, StreamExt};
use log::{error, info, warn};
use std::sync::Arc;

#[derive(Debug)]
pub struct RunSummary {
    pub accounts: usize,
    pub failed: usize,
    pub stats: WriteStats,
}

/// One batch run: discover the MCC's child accounts, extract every account
/// concurrently and route the results into the warehouse.
pub async fn run(config: Config) -> Result<RunSummary, Error> {
    let mut api_config = ApiConfig::load(&config.config_file)?;
    // The MCC id from the command line wins over whatever the config file
    // carries.
    api_config.login_customer_id = Some(config.mcc_id.clone());

    let api: Arc<dyn AdsApi> = Arc::new(AdsApiClient::new(&api_config));
    let warehouse: Arc<dyn Warehouse> = Arc::new(WarehouseClient::from_env()?);
    let tables = TableSet::new(&config.project_id, &config.dataset_id);
    let window = DateWindow::trailing_90_days(Local::now().date_naive());

    sync_accounts(api, warehouse, tables, &config.mcc_id, window, config.workers).await
}

pub(crate) async fn sync_accounts(
    api: Arc<dyn AdsApi>,
    warehouse: Arc<dyn Warehouse>,
    tables: TableSet,
    mcc_id: &str,
    window: DateWindow,
    workers: usize,
) -> Result<RunSummary, Error> {
    info!("extraction window: {} to {}", window.start, window.end);

    // Discovery is the prerequisite for everything else; a partial account
    // list is unsafe to continue with, so any error here aborts the run.
    let accounts = api.list_child_accounts(mcc_id).await?;
    let total = accounts.len();
    if accounts.is_empty() {
        warn!("no active accounts found under manager {mcc_id}");
    } else {
        info!("processing {total} accounts with {workers} workers");
    }

    let mut writer = SinkWriter::new(warehouse, tables);
    let mut failed = 0usize;

    let mut completions = stream::iter(accounts.into_iter().map(|account| {
        let api = Arc::clone(&api);
        async move {
            let result = extractor::extract_account(api.as_ref(), &account, window).await;
            (account, result)
        }
    }))
    .buffer_unordered(workers.max(1));

    // Completed extractions are consumed here, in completion order, on this
    // one task; the writer's state never needs a lock.
    while let Some((account, result)) = completions.next().await {
        match result {
            Ok(report) => {
                writer.write(LogicalTable::Campaign, report.campaign).await;
                writer.write(LogicalTable::Geography, report.geography).await;
                writer.write(LogicalTable::SearchTerms, report.search_terms).await;
                info!("account {} ({}) done", account.name, account.id);
            }
            Err(err) => {
                failed += 1;
                error!("account {} ({}) failed: {err}", account.name, account.id);
            }
        }
    }

    Ok(RunSummary {
        accounts: total,
        failed,
        stats: writer.into_stats(),
    })
}
