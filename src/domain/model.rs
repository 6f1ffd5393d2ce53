use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::utils::error::{EtlError, Result};

/// One row from a remote dataset. No schema is enforced; fields are read by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub data: HashMap<String, Value>,
}

impl Record {
    pub fn from_object(object: Map<String, Value>) -> Self {
        Self {
            data: object.into_iter().collect(),
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.data.get(field)
    }

    /// Field that the exporter relies on; absence means the response is malformed.
    pub fn require(&self, field: &str) -> Result<&Value> {
        self.data.get(field).ok_or_else(|| {
            EtlError::malformed("record", format!("missing expected field '{}'", field))
        })
    }

    /// Numeric field, `None` when it is null.
    pub fn require_f64(&self, field: &str) -> Result<Option<f64>> {
        match self.require(field)? {
            Value::Null => Ok(None),
            Value::Number(n) => Ok(n.as_f64()),
            Value::String(s) => s.trim().parse::<f64>().map(Some).map_err(|_| {
                EtlError::malformed(
                    "record",
                    format!("field '{}' is not numeric: {:?}", field, s),
                )
            }),
            other => Err(EtlError::malformed(
                "record",
                format!("field '{}' is not numeric: {}", field, other),
            )),
        }
    }
}

impl<const N: usize> From<[(&str, Value); N]> for Record {
    fn from(fields: [(&str, Value); N]) -> Self {
        Self {
            data: fields
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        }
    }
}

/// Outcome of one pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct ExportReport {
    pub pipeline: String,
    pub output_files: Vec<PathBuf>,
    pub records_scanned: u64,
    pub rows_written: u64,
    /// Rows exported with an empty per-capita cell because the population was zero or null.
    pub rows_without_rate: u64,
    pub started_at: chrono::DateTime<chrono::Utc>,
    #[serde(with = "duration_millis")]
    pub elapsed: Duration,
}

impl ExportReport {
    pub fn new(pipeline: impl Into<String>) -> Self {
        Self {
            pipeline: pipeline.into(),
            output_files: Vec::new(),
            records_scanned: 0,
            rows_written: 0,
            rows_without_rate: 0,
            started_at: chrono::Utc::now(),
            elapsed: Duration::ZERO,
        }
    }

    pub fn finish(mut self) -> Self {
        self.elapsed = (chrono::Utc::now() - self.started_at)
            .to_std()
            .unwrap_or_default();
        self
    }
}

mod duration_millis {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }
}
