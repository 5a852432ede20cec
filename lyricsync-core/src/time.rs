//! Position formatting helpers.
//!
//! Positions are carried as signed 64-bit milliseconds so that offsets and
//! "before the first line" queries can go below zero without wrapping.

/// Format milliseconds as `mm:ss.xx` for log output.
#[must_use]
pub fn format_position(millis: i64) -> String {
    let sign = if millis < 0 { "-" } else { "" };
    let abs = millis.unsigned_abs();
    let minutes = abs / 60_000;
    let seconds = (abs % 60_000) / 1000;
    let hundredths = (abs % 1000) / 10;
    format!("{sign}{minutes:02}:{seconds:02}.{hundredths:02}")
}
