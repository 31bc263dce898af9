//! Customer profile mapping
//!
//! One change row becomes one profile update keyed by the id column:
//!
//! - attribute names are lower-cased
//! - date columns become `date(<name>)` with RFC 3339 values
//! - URL columns become `url(<name>)`
//! - null values are omitted
//! - DELETE rows are dropped; profiles are never deleted

use super::Transformer;
use crate::config::TransformConfig;
use crate::error::{Error, Result};
use crate::model::{Record, TransformedRecord};
use crate::types::{ChangeAction, JsonObject, JsonValue};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use tracing::{trace, warn};

/// Output format for date attributes
const DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Maps change rows to profile attribute updates
#[derive(Debug, Clone)]
pub struct ProfileTransformer {
    id_column: String,
    date_columns: Vec<String>,
    url_columns: Vec<String>,
}

impl ProfileTransformer {
    /// Create a transformer from the job's transform section
    pub fn new(config: &TransformConfig) -> Result<Self> {
        let id_column = config.id_column.trim();
        if id_column.is_empty() {
            return Err(Error::missing_field("transform.id_column"));
        }

        Ok(Self {
            id_column: id_column.to_string(),
            date_columns: normalize(&config.date_columns),
            url_columns: normalize(&config.url_columns),
        })
    }

    /// Column holding the profile identifier
    pub fn id_column(&self) -> &str {
        &self.id_column
    }

    fn attribute_name(&self, column: &str) -> String {
        let name = column.to_lowercase();
        if self.date_columns.contains(&name) {
            format!("date({name})")
        } else if self.url_columns.contains(&name) {
            format!("url({name})")
        } else {
            name
        }
    }

    fn attribute_value(&self, record: &Record, column: &str, value: &JsonValue) -> Result<JsonValue> {
        if !self.date_columns.iter().any(|c| c.eq_ignore_ascii_case(column)) {
            return Ok(value.clone());
        }

        value
            .as_str()
            .and_then(format_date)
            .map(JsonValue::String)
            .ok_or_else(|| {
                Error::data_quality(
                    record.id.clone(),
                    format!("column '{column}' is not a date: {value}"),
                )
            })
    }
}

impl Transformer for ProfileTransformer {
    fn map(&self, record: &Record) -> Result<Option<TransformedRecord>> {
        if record.action == ChangeAction::Delete {
            trace!(id = %record.id, "Dropping DELETE change");
            return Ok(None);
        }

        let id = record
            .fields
            .iter()
            .find(|(column, _)| column.eq_ignore_ascii_case(&self.id_column))
            .and_then(|(_, value)| identifier(value))
            .ok_or_else(|| {
                Error::data_quality(
                    record.id.clone(),
                    format!("missing value for id column '{}'", self.id_column),
                )
            })?;

        let mut attributes = JsonObject::new();
        for (column, value) in &record.fields {
            if value.is_null() || column.eq_ignore_ascii_case(&self.id_column) {
                continue;
            }
            attributes.insert(
                self.attribute_name(column),
                self.attribute_value(record, column, value)?,
            );
        }

        Ok(Some(TransformedRecord { id, attributes }))
    }

    fn check_columns(&self, columns: &[String]) -> Result<()> {
        if !columns.iter().any(|c| c.eq_ignore_ascii_case(&self.id_column)) {
            return Err(Error::schema(format!(
                "id column '{}' not found in source columns: {}",
                self.id_column,
                columns.join(", ")
            )));
        }

        for configured in self.date_columns.iter().chain(&self.url_columns) {
            if !columns.iter().any(|c| c.eq_ignore_ascii_case(configured)) {
                warn!(column = %configured, "Configured column not found in source");
            }
        }
        Ok(())
    }
}

fn normalize(columns: &[String]) -> Vec<String> {
    columns
        .iter()
        .map(|c| c.trim().to_lowercase())
        .filter(|c| !c.is_empty())
        .collect()
}

/// Profile identifier from a column value; null and blank are missing
fn identifier(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) if !s.trim().is_empty() => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        JsonValue::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Reformat a date or timestamp string as `YYYY-MM-DDTHH:MM:SSZ`
///
/// Dates without a time are taken at midnight; values with an offset are
/// converted to UTC.
pub(crate) fn format_date(value: &str) -> Option<String> {
    let value = value.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.naive_utc().format(DATE_FORMAT).to_string());
    }
    for pattern in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, pattern) {
            return Some(dt.format(DATE_FORMAT).to_string());
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.format(DATE_FORMAT).to_string())
}
