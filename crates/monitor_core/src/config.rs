use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Timestamp wire format shared with the backend (minute precision, the
/// same shape an HTML `datetime-local` input produces).
pub const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M";

/// Data source submitted when the caller does not pick one explicitly.
/// The backend treats the value as an opaque source key.
pub const DEFAULT_DATA_SOURCE: &str = "opinion_database";

/// Immutable description of one batch run, serialized verbatim as the
/// request body of the batch-parse call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskConfig {
    pub data_source: String,
    #[serde(with = "wire_time")]
    pub start_time: NaiveDateTime,
    #[serde(with = "wire_time")]
    pub end_time: NaiveDateTime,
    pub enable_sentiment: bool,
    pub enable_tags: bool,
    pub enable_companies: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("data source must not be empty")]
    EmptyDataSource,
    #[error("start time {start} is not before end time {end}")]
    InvertedRange { start: String, end: String },
}

impl TaskConfig {
    /// Config over the given window with the default source and every
    /// analysis module enabled.
    pub fn for_range(start_time: NaiveDateTime, end_time: NaiveDateTime) -> Self {
        Self {
            data_source: DEFAULT_DATA_SOURCE.to_owned(),
            start_time,
            end_time,
            enable_sentiment: true,
            enable_tags: true,
            enable_companies: true,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.data_source.trim().is_empty() {
            return Err(ConfigError::EmptyDataSource);
        }
        if self.start_time >= self.end_time {
            return Err(ConfigError::InvertedRange {
                start: self.start_time.format(TIME_FORMAT).to_string(),
                end: self.end_time.format(TIME_FORMAT).to_string(),
            });
        }
        Ok(())
    }
}

/// Serde adapter for [`TIME_FORMAT`] timestamps.
mod wire_time {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.format(super::TIME_FORMAT).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveDateTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&raw, super::TIME_FORMAT).map_err(serde::de::Error::custom)
    }
}
