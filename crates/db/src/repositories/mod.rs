use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

use tenderbridge_core::store::StoreError;

pub mod award_job;
pub mod memory;
pub mod tender;

pub use award_job::SqlAwardJobQueue;
pub use memory::{InMemoryAwardJobQueue, InMemoryTenderStore};
pub use tender::SqlTenderStore;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("encode error: {0}")]
    Encode(String),
}

impl From<RepositoryError> for StoreError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::Database(sqlx::Error::Database(db_error))
                if db_error.is_unique_violation() =>
            {
                StoreError::Duplicate(db_error.message().to_string())
            }
            RepositoryError::Database(error) => StoreError::Backend(error.to_string()),
            RepositoryError::Decode(message) => StoreError::Decode(message),
            RepositoryError::Encode(message) => StoreError::Backend(message),
        }
    }
}

pub(crate) fn store_error(error: sqlx::Error) -> StoreError {
    RepositoryError::Database(error).into()
}

/// Fixed-width UTC encoding so text comparison in SQL orders by time.
pub(crate) fn encode_timestamp(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn encode_optional_timestamp(value: Option<&DateTime<Utc>>) -> Option<String> {
    value.map(encode_timestamp)
}

pub(crate) fn parse_timestamp(
    column: &str,
    value: String,
) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}

pub(crate) fn parse_optional_timestamp(
    column: &str,
    value: Option<String>,
) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    value.map(|timestamp| parse_timestamp(column, timestamp)).transpose()
}

pub(crate) fn parse_u32(column: &str, value: i64) -> Result<u32, RepositoryError> {
    u32::try_from(value).map_err(|_| {
        RepositoryError::Decode(format!(
            "invalid value for `{column}` (expected non-negative u32): {value}"
        ))
    })
}

pub(crate) fn parse_decimal(column: &str, value: &str) -> Result<Decimal, RepositoryError> {
    Decimal::from_str(value).map_err(|error| {
        RepositoryError::Decode(format!("invalid decimal in `{column}`: `{value}` ({error})"))
    })
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;

    use super::{encode_timestamp, parse_decimal, parse_timestamp, parse_u32, RepositoryError};
    use tenderbridge_core::store::StoreError;

    #[test]
    fn timestamps_encode_with_fixed_width() {
        let early = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).single().expect("valid");
        let later = early + chrono::Duration::microseconds(1);

        let early_text = encode_timestamp(&early);
        let later_text = encode_timestamp(&later);

        assert_eq!(early_text, "2026-01-02T03:04:05.000000Z");
        assert!(early_text < later_text);
        assert_eq!(parse_timestamp("at", early_text).expect("parse"), early);
    }

    #[test]
    fn decode_helpers_reject_bad_values() {
        assert!(matches!(parse_u32("retry_count", -1), Err(RepositoryError::Decode(_))));
        assert!(matches!(parse_decimal("amount", "ten"), Err(RepositoryError::Decode(_))));
        assert_eq!(parse_decimal("amount", "1250.50").expect("parse"), Decimal::new(125_050, 2));
    }

    #[test]
    fn decode_errors_stay_distinguishable_in_the_store_error() {
        let error: StoreError = RepositoryError::Decode("bad status".to_string()).into();
        assert_eq!(error, StoreError::Decode("bad status".to_string()));
    }
}
