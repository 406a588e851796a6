use crate::data::RecordSet;
use crate::warehouse::{TableId, Warehouse, WriteDisposition};
use log::{error, info};
use std::collections::HashMap;
use std::sync::Arc;

/// The three logical destinations of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalTable {
    Campaign,
    Geography,
    SearchTerms,
}

impl LogicalTable {
    pub const ALL: [LogicalTable; 3] = [
        LogicalTable::Campaign,
        LogicalTable::Geography,
        LogicalTable::SearchTerms,
    ];

    pub fn table_name(&self) -> &'static str {
        match self {
            LogicalTable::Campaign => "daily_campaign_data",
            LogicalTable::Geography => "daily_geo_data",
            LogicalTable::SearchTerms => "daily_search_query_data",
        }
    }
}

/// Resolves logical tables to fully qualified table ids within one dataset.
#[derive(Debug, Clone)]
pub struct TableSet {
    project: String,
    dataset: String,
}

impl TableSet {
    pub fn new(project: &str, dataset: &str) -> Self {
        TableSet {
            project: project.to_string(),
            dataset: dataset.to_string(),
        }
    }

    pub fn id(&self, table: LogicalTable) -> TableId {
        TableId::new(&self.project, &self.dataset, table.table_name())
    }
}

/// Rows loaded and writes failed per logical table over one run.
#[derive(Debug, Clone, Default)]
pub struct WriteStats {
    rows: HashMap<LogicalTable, u64>,
    failures: HashMap<LogicalTable, u32>,
}

impl WriteStats {
    pub fn rows_loaded(&self, table: LogicalTable) -> u64 {
        self.rows.get(&table).copied().unwrap_or(0)
    }

    pub fn write_failures(&self, table: LogicalTable) -> u32 {
        self.failures.get(&table).copied().unwrap_or(0)
    }

    fn add_rows(&mut self, table: LogicalTable, rows: u64) {
        *self.rows.entry(table).or_insert(0) += rows;
    }

    fn add_failure(&mut self, table: LogicalTable) {
        *self.failures.entry(table).or_insert(0) += 1;
    }
}

/// Routes record sets into the warehouse, replacing each table's contents on
/// its first successful write of the run and appending afterwards.
///
/// The per-table write state lives here and is mutated only by
/// [`SinkWriter::write`], which runs on the single result-consuming task —
/// the extraction pool never touches it.
pub struct SinkWriter {
    warehouse: Arc<dyn Warehouse>,
    tables: TableSet,
    written: HashMap<LogicalTable, bool>,
    stats: WriteStats,
}

impl SinkWriter {
    pub fn new(warehouse: Arc<dyn Warehouse>, tables: TableSet) -> Self {
        let written = LogicalTable::ALL.iter().map(|table| (*table, false)).collect();
        SinkWriter {
            warehouse,
            tables,
            written,
            stats: WriteStats::default(),
        }
    }

    fn has_written(&self, table: LogicalTable) -> bool {
        self.written.get(&table).copied().unwrap_or(false)
    }

    /// Sole mutation point for the write state. Flips only after a write has
    /// been confirmed successful and never back.
    fn mark_written(&mut self, table: LogicalTable) {
        self.written.insert(table, true);
    }

    pub fn disposition(&self, table: LogicalTable) -> WriteDisposition {
        if self.has_written(table) {
            WriteDisposition::Append
        } else {
            WriteDisposition::Truncate
        }
    }

    /// Writes one record set. An empty set is a no-op. A failed write is
    /// logged and dropped; the write state stays untouched so a later
    /// success still replaces the table instead of appending to stale data.
    pub async fn write(&mut self, table: LogicalTable, records: RecordSet) {
        if records.is_empty() {
            return;
        }

        let disposition = self.disposition(table);
        let target = self.tables.id(table);
        let rows = records.num_rows();

        match self
            .warehouse
            .load_table(target.clone(), records, disposition)
            .await
        {
            Ok(loaded) => {
                self.mark_written(table);
                self.stats.add_rows(table, loaded);
                info!("loaded {loaded} rows into {target} ({disposition:?})");
            }
            Err(err) => {
                self.stats.add_failure(table);
                error!("write of {rows} rows to {target} failed: {err}");
            }
        }
    }

    pub fn into_stats(self) -> WriteStats {
        self.stats
    }
}
