//! Conversion between caption timecodes (`HH:MM:SS.mmm`, `MM:SS.mmm`, bare
//! seconds) and fractional seconds.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TimestampError {
    #[error("timestamp is empty")]
    Empty,
    #[error("invalid {component} value in timestamp: {value:?}")]
    InvalidValue {
        component: &'static str,
        value: String,
    },
    #[error("unsupported timestamp format: {0:?}")]
    InvalidFormat(String),
}

/// Rounds to millisecond precision, the resolution caption formats carry.
pub fn round_millis(seconds: f64) -> f64 {
    (seconds * 1000.0).round() / 1000.0
}

/// Parses a caption timecode into seconds, rounded to three decimals.
///
/// Accepts `HH:MM:SS.mmm`, `MM:SS.mmm` and a bare seconds value. A comma as
/// the decimal separator (SRT style) is accepted as well.
pub fn parse_timestamp(text: &str) -> Result<f64, TimestampError> {
    let cleaned = text.trim().replace(',', ".");
    if cleaned.is_empty() {
        return Err(TimestampError::Empty);
    }

    let parts: Vec<&str> = cleaned.split(':').collect();
    let (hours, minutes, seconds) = match parts.as_slice() {
        [s] => ("0", "0", *s),
        [m, s] => ("0", *m, *s),
        [h, m, s] => (*h, *m, *s),
        _ => return Err(TimestampError::InvalidFormat(text.to_owned())),
    };

    let hours = component(hours, "hours")?;
    let minutes = component(minutes, "minutes")?;
    let seconds = component(seconds, "seconds")?;
    Ok(round_millis(hours * 3600.0 + minutes * 60.0 + seconds))
}

fn component(value: &str, name: &'static str) -> Result<f64, TimestampError> {
    let invalid = || TimestampError::InvalidValue {
        component: name,
        value: value.to_owned(),
    };
    // Rejects signs, exponents and `inf`/`nan`, which f64::from_str would take.
    if value.is_empty() || !value.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return Err(invalid());
    }
    value.parse::<f64>().map_err(|_| invalid())
}

/// Formats seconds as `HH:MM:SS.mmm`. Inverse of [`parse_timestamp`].
pub fn format_timestamp(seconds: f64) -> String {
    let total_millis = (seconds.max(0.0) * 1000.0).round() as u64;
    let hours = total_millis / 3_600_000;
    let minutes = (total_millis % 3_600_000) / 60_000;
    let secs = (total_millis % 60_000) / 1000;
    let millis = total_millis % 1000;
    format!("{hours:02}:{minutes:02}:{secs:02}.{millis:03}")
}
