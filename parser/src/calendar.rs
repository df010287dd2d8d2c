//! FILENAME: parser/src/calendar.rs
//! PURPOSE: 1900-based serial-day arithmetic shared by the date lexer and
//! the TODAY/DATE built-ins.
//! CONTEXT: Serial days count from 1900-01-01 using
//!   (y-1900)*365 + (y-1900)/4 + 1 + month_start[m-1] + d
//! with integer division. The leap-day term is added unconditionally, which
//! over-counts for month <= February of a leap year; downstream code relies
//! on the lexer, TODAY and DATE all agreeing, so the formula is kept as-is
//! rather than corrected.

/// Cumulative day offsets at the start of each month (non-leap year).
pub const MONTH_STARTS: [i64; 12] = [0, 31, 59, 90, 120, 151, 181, 212, 243, 273, 304, 334];

/// Folds a civil date into its serial-day number.
/// Years before 1900 clamp to 1900; months clamp into 1..=12. The day is
/// taken at face value (callers validate the 1..=31 window where it matters).
pub fn serial_day(year: i64, month: i64, day: i64) -> f64 {
    let elapsed = year.max(1900) - 1900;
    let m = month.clamp(1, 12) as usize;
    (elapsed * 365 + elapsed / 4 + 1 + MONTH_STARTS[m - 1] + day) as f64
}
