use crate::data::RecordSet;
use crate::error::Error;
use datafusion::arrow::datatypes::{DataType, Schema};
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Environment variable pointing the warehouse client at its credential file.
pub const CREDENTIALS_ENV: &str = "GOOGLE_APPLICATION_CREDENTIALS";

const DEFAULT_ENDPOINT: &str = "https://bigquery.googleapis.com/bigquery/v2";

/// The streaming insert endpoint rejects oversized requests; rows are sent in
/// chunks of this many.
const INSERT_CHUNK_ROWS: usize = 500;

/// Fully qualified warehouse table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableId {
    pub project: String,
    pub dataset: String,
    pub table: String,
}

impl TableId {
    pub fn new(project: &str, dataset: &str, table: &str) -> Self {
        TableId {
            project: project.to_string(),
            dataset: dataset.to_string(),
            table: table.to_string(),
        }
    }
}

impl std::fmt::Display for TableId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.project, self.dataset, self.table)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteDisposition {
    /// Drop prior contents and recreate the table from the payload schema.
    Truncate,
    /// Add rows, widening the table schema when the payload carries new
    /// columns.
    Append,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait Warehouse: Send + Sync + 'static {
    /// Writes a record set to a table under the given disposition, creating
    /// the table when it does not exist. Returns the number of rows loaded.
    async fn load_table(
        &self,
        table: TableId,
        records: RecordSet,
        disposition: WriteDisposition,
    ) -> Result<u64, Error>;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
    pub mode: String,
}

impl ColumnSpec {
    fn nullable(name: &str, field_type: &str) -> Self {
        ColumnSpec {
            name: name.to_string(),
            field_type: field_type.to_string(),
            mode: "NULLABLE".to_string(),
        }
    }
}

/// Maps the canonical Arrow schema onto warehouse column types: the date
/// column becomes DATE, identifier-like columns INTEGER, numeric columns
/// INTEGER or FLOAT, everything else STRING.
pub fn infer_columns(schema: &Schema) -> Vec<ColumnSpec> {
    schema
        .fields()
        .iter()
        .map(|field| {
            let name = field.name();
            let field_type = if name == "date" {
                "DATE"
            } else if name.to_lowercase().contains("id") {
                "INTEGER"
            } else {
                match field.data_type() {
                    DataType::Int8
                    | DataType::Int16
                    | DataType::Int32
                    | DataType::Int64
                    | DataType::UInt8
                    | DataType::UInt16
                    | DataType::UInt32
                    | DataType::UInt64 => "INTEGER",
                    DataType::Float16 | DataType::Float32 | DataType::Float64 => "FLOAT",
                    _ => "STRING",
                }
            };
            ColumnSpec::nullable(name, field_type)
        })
        .collect()
}

/// Union of the live table schema and the payload columns. Returns `None`
/// when the table already covers the payload; otherwise the merged field
/// list with every new column appended as NULLABLE.
pub fn merge_columns(existing: &[ColumnSpec], payload: &[ColumnSpec]) -> Option<Vec<ColumnSpec>> {
    let known: Vec<&str> = existing.iter().map(|column| column.name.as_str()).collect();
    let added: Vec<ColumnSpec> = payload
        .iter()
        .filter(|column| !known.contains(&column.name.as_str()))
        .cloned()
        .collect();

    if added.is_empty() {
        return None;
    }

    let mut merged = existing.to_vec();
    merged.extend(added);
    Some(merged)
}

#[derive(Debug, Deserialize)]
struct ServiceKey {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct TableResource {
    schema: TableSchema,
}

#[derive(Debug, Deserialize)]
struct TableSchema {
    #[serde(default)]
    fields: Vec<ColumnSpec>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct InsertResponse {
    insert_errors: Vec<serde_json::Value>,
}

#[derive(Debug)]
pub struct WarehouseClient {
    client: Client,
    endpoint: String,
    access_token: String,
}

impl WarehouseClient {
    /// Builds a client from the credential file at the path exported in
    /// [`CREDENTIALS_ENV`].
    pub fn from_env() -> Result<Self, Error> {
        let path = std::env::var(CREDENTIALS_ENV).map_err(|_| Error::Credentials {
            path: CREDENTIALS_ENV.to_string(),
            reason: "environment variable is not set".to_string(),
        })?;
        Self::from_key_file(&path)
    }

    pub fn from_key_file(path: &str) -> Result<Self, Error> {
        let raw = std::fs::read_to_string(path).map_err(|err| Error::Credentials {
            path: path.to_string(),
            reason: err.to_string(),
        })?;
        let key: ServiceKey = serde_json::from_str(&raw).map_err(|err| Error::Credentials {
            path: path.to_string(),
            reason: err.to_string(),
        })?;
        if key.access_token.is_empty() {
            return Err(Error::Credentials {
                path: path.to_string(),
                reason: "access token is empty".to_string(),
            });
        }

        Ok(WarehouseClient {
            client: Client::new(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            access_token: key.access_token,
        })
    }

    fn url(&self, segments: &[&str]) -> Result<Url, Error> {
        let mut url = Url::parse(&self.endpoint)?;
        url.path_segments_mut()
            .map_err(|_| Error::UrlParsingFailed(url::ParseError::SetHostOnCannotBeABaseUrl))?
            .extend(segments);
        Ok(url)
    }

    fn table_url(&self, table: &TableId) -> Result<Url, Error> {
        self.url(&[
            "projects",
            &table.project,
            "datasets",
            &table.dataset,
            "tables",
            &table.table,
        ])
    }

    fn tables_url(&self, table: &TableId) -> Result<Url, Error> {
        self.url(&["projects", &table.project, "datasets", &table.dataset, "tables"])
    }

    fn insert_url(&self, table: &TableId) -> Result<Url, Error> {
        self.url(&[
            "projects",
            &table.project,
            "datasets",
            &table.dataset,
            "tables",
            &table.table,
            "insertAll",
        ])
    }

    /// Live schema of a table, or `None` when the table does not exist.
    async fn table_schema(&self, table: &TableId) -> Result<Option<Vec<ColumnSpec>>, Error> {
        let resp = self
            .client
            .get(self.table_url(table)?)
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|err| sink_error(table, err))?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let resp = expect_success(table, resp).await?;
        let resource: TableResource = resp.json().await.map_err(|err| sink_error(table, err))?;

        Ok(Some(resource.schema.fields))
    }

    async fn create_table(&self, table: &TableId, columns: &[ColumnSpec]) -> Result<(), Error> {
        let body = json!({
            "tableReference": {
                "projectId": table.project,
                "datasetId": table.dataset,
                "tableId": table.table,
            },
            "schema": { "fields": columns },
        });

        let resp = self
            .client
            .post(self.tables_url(table)?)
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await
            .map_err(|err| sink_error(table, err))?;
        expect_success(table, resp).await?;

        Ok(())
    }

    /// Deletes a table; a table that never existed is not an error.
    async fn delete_table(&self, table: &TableId) -> Result<(), Error> {
        let resp = self
            .client
            .delete(self.table_url(table)?)
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|err| sink_error(table, err))?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        expect_success(table, resp).await?;

        Ok(())
    }

    async fn patch_schema(&self, table: &TableId, columns: &[ColumnSpec]) -> Result<(), Error> {
        let body = json!({ "schema": { "fields": columns } });

        let resp = self
            .client
            .patch(self.table_url(table)?)
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await
            .map_err(|err| sink_error(table, err))?;
        expect_success(table, resp).await?;

        Ok(())
    }

    async fn insert_rows(&self, table: &TableId, records: &RecordSet) -> Result<u64, Error> {
        let rows = records.json_rows()?;
        let mut loaded = 0u64;

        for chunk in rows.chunks(INSERT_CHUNK_ROWS) {
            let payload: Vec<serde_json::Value> =
                chunk.iter().map(|row| json!({ "json": row })).collect();
            let body = json!({ "rows": payload });

            let resp = self
                .client
                .post(self.insert_url(table)?)
                .bearer_auth(&self.access_token)
                .json(&body)
                .send()
                .await
                .map_err(|err| sink_error(table, err))?;
            let resp = expect_success(table, resp).await?;

            let outcome: InsertResponse =
                resp.json().await.map_err(|err| sink_error(table, err))?;
            if !outcome.insert_errors.is_empty() {
                return Err(Error::Sink {
                    table: table.to_string(),
                    message: format!("{} rows were rejected", outcome.insert_errors.len()),
                });
            }

            loaded += chunk.len() as u64;
        }

        Ok(loaded)
    }
}

#[async_trait::async_trait]
impl Warehouse for WarehouseClient {
    async fn load_table(
        &self,
        table: TableId,
        records: RecordSet,
        disposition: WriteDisposition,
    ) -> Result<u64, Error> {
        let columns = infer_columns(records.schema());

        match disposition {
            WriteDisposition::Truncate => {
                self.delete_table(&table).await?;
                self.create_table(&table, &columns).await?;
            }
            WriteDisposition::Append => match self.table_schema(&table).await? {
                None => self.create_table(&table, &columns).await?,
                Some(existing) => {
                    if let Some(merged) = merge_columns(&existing, &columns) {
                        self.patch_schema(&table, &merged).await?;
                    }
                }
            },
        }

        self.insert_rows(&table, &records).await
    }
}

fn sink_error(table: &TableId, message: impl ToString) -> Error {
    Error::Sink {
        table: table.to_string(),
        message: message.to_string(),
    }
}

async fn expect_success(table: &TableId, resp: reqwest::Response) -> Result<reqwest::Response, Error> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let message = resp.text().await.unwrap_or_default();
    Err(Error::Sink {
        table: table.to_string(),
        message: format!("{status}: {message}"),
    })
}
