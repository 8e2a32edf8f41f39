//! Shared formatting helpers for table cells.
//!
//! All pure formatting (no terminal I/O) lives here.

use std::fmt;

/// Decimal scale units, largest first.
const UNITS: [(u64, char); 4] = [
    (1_000_000_000_000, 'T'),
    (1_000_000_000, 'G'),
    (1_000_000, 'M'),
    (1_000, 'K'),
];

/// Counter or gauge value rendered with a decimal suffix.
///
/// `999` -> `"999"`, `1500` -> `"2K"`, `999999` -> `"1M"`, `1234567890` -> `"1G"`.
///
/// The value is divided by the largest unit it strictly exceeds and rounded
/// half away from zero. A result that rounds up to 1000 of a unit is shown
/// as 1 of the next unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct RateValue(u64);

impl RateValue {
    pub fn new(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for RateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = self.0;
        let Some(pos) = UNITS.iter().position(|&(scale, _)| value > scale) else {
            return write!(f, "{}", value);
        };

        let (scale, suffix) = UNITS[pos];
        let scaled = (value as f64 / scale as f64).round() as u64;
        if scaled >= 1000 && pos > 0 {
            let (bigger, bigger_suffix) = UNITS[pos - 1];
            let promoted = (value as f64 / bigger as f64).round() as u64;
            return write!(f, "{}{}", promoted, bigger_suffix);
        }
        write!(f, "{}{}", scaled, suffix)
    }
}

/// Formats a `current / total` pair of values.
pub fn format_pair(left: u64, right: u64) -> String {
    format!("{} / {}", RateValue::new(left), RateValue::new(right))
}

/// Truncates `text` to at most `max_chars` characters.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_value_plain_below_thousand() {
        assert_eq!(RateValue::new(0).to_string(), "0");
        assert_eq!(RateValue::new(999).to_string(), "999");
        // Threshold must be exceeded, not reached
        assert_eq!(RateValue::new(1000).to_string(), "1000");
    }

    #[test]
    fn test_rate_value_suffixes() {
        assert_eq!(RateValue::new(1500).to_string(), "2K");
        assert_eq!(RateValue::new(1001).to_string(), "1K");
        assert_eq!(RateValue::new(250_000).to_string(), "250K");
        assert_eq!(RateValue::new(1_234_567_890).to_string(), "1G");
        assert_eq!(RateValue::new(7_600_000_000_000).to_string(), "8T");
    }

    #[test]
    fn test_rate_value_rounding_promotes_unit() {
        assert_eq!(RateValue::new(999_999).to_string(), "1M");
        assert_eq!(RateValue::new(999_500).to_string(), "1M");
        assert_eq!(RateValue::new(999_499).to_string(), "999K");
        assert_eq!(RateValue::new(999_999_999).to_string(), "1G");
    }

    #[test]
    fn test_rate_value_terabytes_do_not_promote() {
        assert_eq!(RateValue::new(999_999_999_999_999).to_string(), "1000T");
    }

    #[test]
    fn test_format_pair() {
        assert_eq!(format_pair(12, 819), "12 / 819");
        assert_eq!(format_pair(1500, 2_000_000), "2K / 2M");
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("abcdef", 3), "abc");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("żółw", 2), "żó");
    }
}
