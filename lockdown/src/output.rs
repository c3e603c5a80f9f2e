//! Table, CSV, JSON and YAML output formatting for CLI commands.

use chrono::{DateTime, SecondsFormat, Utc};
use lockdown_core::{ActiveLockdown, LockRecord};
use serde::Serialize;
use tabled::{Table, Tabled};

#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    #[error("CSV output failed: {0}")]
    Csv(String),

    #[error("JSON output failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML output failed: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Output format selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table
    #[default]
    Table,
    /// Comma separated values with a header row
    Csv,
    /// JSON array
    Json,
    /// YAML sequence
    Yaml,
}

/// One row of `lockdown list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Tabled)]
pub struct LockdownRow {
    #[serde(rename = "lockdown_ID")]
    #[tabled(rename = "lockdown_ID")]
    pub id: i64,
    pub minutes_left: i64,
    #[serde(rename = "lockdown_IP")]
    #[tabled(rename = "lockdown_IP")]
    pub ip: String,
}

impl From<&ActiveLockdown> for LockdownRow {
    fn from(lockdown: &ActiveLockdown) -> Self {
        Self {
            id: lockdown.id,
            minutes_left: lockdown.minutes_left,
            ip: lockdown.ip.clone(),
        }
    }
}

/// One row of `lockdown history`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Tabled)]
pub struct HistoryRow {
    #[serde(rename = "lockdown_ID")]
    #[tabled(rename = "lockdown_ID")]
    pub id: i64,
    #[serde(rename = "lockdown_IP")]
    #[tabled(rename = "lockdown_IP")]
    pub ip: String,
    pub username: String,
    pub locked_at: String,
    pub release_at: String,
    pub status: String,
}

impl HistoryRow {
    pub fn from_record(record: &LockRecord, now: DateTime<Utc>) -> Self {
        Self {
            id: record.id,
            ip: record.ip.clone(),
            username: record.username.clone().unwrap_or_default(),
            locked_at: record.locked_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            release_at: record.release_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            status: record.status_at(now).to_string(),
        }
    }
}

/// Render a list of rows in the selected format.
///
/// Every format prints the column headers even when there are no rows.
pub fn render_list<T: Serialize + Tabled>(
    items: &[T],
    format: OutputFormat,
) -> Result<String, OutputError> {
    match format {
        OutputFormat::Table => Ok(format!("{}\n", Table::new(items))),
        OutputFormat::Csv => render_csv(items),
        OutputFormat::Json => Ok(format!("{}\n", serde_json::to_string(items)?)),
        OutputFormat::Yaml => {
            if items.is_empty() {
                Ok("[]\n".to_string())
            } else {
                Ok(serde_yaml::to_string(items)?)
            }
        }
    }
}

fn render_csv<T: Serialize + Tabled>(items: &[T]) -> Result<String, OutputError> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());

    let headers = T::headers();
    writer
        .write_record(headers.iter().map(|header| header.as_bytes()))
        .map_err(|e| OutputError::Csv(e.to_string()))?;
    for item in items {
        writer
            .serialize(item)
            .map_err(|e| OutputError::Csv(e.to_string()))?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| OutputError::Csv(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| OutputError::Csv(e.to_string()))
}
