use time::format_description::well_known::Rfc3339;
use time::{OffsetDateTime, UtcOffset};

use crate::error::AppError;

/// Canonical storage form: RFC3339 in UTC.
pub fn to_rfc3339_utc(dt: OffsetDateTime) -> Result<String, AppError> {
    dt.to_offset(UtcOffset::UTC).format(&Rfc3339).map_err(|e| {
        AppError::new("TS_FORMAT_FAILED", "Failed to format timestamp")
            .with_details(format!("value={dt}; err={e}"))
    })
}

pub fn opt_to_rfc3339_utc(dt: Option<OffsetDateTime>) -> Result<Option<String>, AppError> {
    dt.map(to_rfc3339_utc).transpose()
}

/// Parse a stored timestamp. Offsets other than UTC are accepted and normalized.
pub fn parse_rfc3339(field: &str, raw: &str) -> Result<OffsetDateTime, AppError> {
    OffsetDateTime::parse(raw.trim(), &Rfc3339)
        .map(|dt| dt.to_offset(UtcOffset::UTC))
        .map_err(|e| {
            AppError::new("DB_DECODE_FAILED", format!("Failed to parse {field}"))
                .with_details(format!("value={raw}; err={e}"))
        })
}

pub fn parse_opt_rfc3339(
    field: &str,
    raw: Option<&str>,
) -> Result<Option<OffsetDateTime>, AppError> {
    raw.map(|s| parse_rfc3339(field, s)).transpose()
}
