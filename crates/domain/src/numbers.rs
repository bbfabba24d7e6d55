//! Human-readable purchase and reservation numbers.
//!
//! Format: `<PREFIX>-<yyyymmddHHMMSS>-<4 random digits>`. Uniqueness is
//! backed by a unique constraint in the store; a collision is reported as
//! a conflict rather than retried.

use chrono::{DateTime, Utc};
use rand::Rng;

pub const RESERVATION_PREFIX: &str = "RES";
pub const PURCHASE_PREFIX: &str = "CMP";

/// Formats a number from its parts.
pub fn format_number(prefix: &str, at: DateTime<Utc>, suffix: u16) -> String {
    format!("{prefix}-{}-{:04}", at.format("%Y%m%d%H%M%S"), suffix % 10_000)
}

fn generate(prefix: &str) -> String {
    let suffix = rand::thread_rng().gen_range(0..10_000);
    format_number(prefix, Utc::now(), suffix)
}

pub fn reservation_number() -> String {
    generate(RESERVATION_PREFIX)
}

pub fn purchase_number() -> String {
    generate(PURCHASE_PREFIX)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_format() {
        let at = Utc.with_ymd_and_hms(2026, 3, 7, 9, 5, 1).unwrap();
        assert_eq!(format_number("RES", at, 42), "RES-20260307090501-0042");
    }

    #[test]
    fn test_generated_shape() {
        let number = reservation_number();
        let parts: Vec<&str> = number.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "RES");
        assert_eq!(parts[1].len(), 14);
        assert_eq!(parts[2].len(), 4);
        assert!(purchase_number().starts_with("CMP-"));
    }
}
