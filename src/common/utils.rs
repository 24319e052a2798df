//! Utility functions for ringbid

use chrono::{DateTime, Utc};

/// Longest display name a bidder may use
pub const MAX_CLIENT_NAME_LEN: usize = 128;

/// Parse duration string (e.g., "500ms", "30s", "5m", "1h", "7d")
pub fn parse_duration(s: &str) -> crate::Result<std::time::Duration> {
    let s = s.trim();
    if s.is_empty() {
        return Err(crate::Error::InvalidConfig("empty duration".into()));
    }

    let split = s
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| crate::Error::InvalidConfig(format!("missing duration unit: {}", s)))?;
    let (num_str, unit) = s.split_at(split);

    let num: u64 = num_str
        .parse()
        .map_err(|_| crate::Error::InvalidConfig(format!("invalid duration: {}", s)))?;

    let secs_per_unit = match unit {
        "ms" => return Ok(std::time::Duration::from_millis(num)),
        "s" => 1,
        "m" => 60,
        "h" => 3600,
        "d" => 86400,
        _ => {
            return Err(crate::Error::InvalidConfig(format!(
                "unknown duration unit: {}",
                unit
            )))
        }
    };

    let secs = num
        .checked_mul(secs_per_unit)
        .ok_or_else(|| crate::Error::InvalidConfig(format!("duration out of range: {}", s)))?;
    Ok(std::time::Duration::from_secs(secs))
}

/// Parse a duration into whole milliseconds, as stored in config
pub fn parse_duration_ms(s: &str) -> crate::Result<u64> {
    let duration = parse_duration(s)?;
    u64::try_from(duration.as_millis())
        .map_err(|_| crate::Error::InvalidConfig(format!("duration out of range: {}", s)))
}

/// Parse an auction deadline.
///
/// Accepts either an RFC 3339 timestamp (`2026-10-16T18:00:00Z`) or a
/// duration relative to `now` (`90s`, `5m`, `2h`).
pub fn parse_deadline(s: &str, now: DateTime<Utc>) -> crate::Result<DateTime<Utc>> {
    if let Ok(at) = DateTime::parse_from_rfc3339(s.trim()) {
        return Ok(at.with_timezone(&Utc));
    }

    let offset = parse_duration(s).map_err(|_| {
        crate::Error::InvalidConfig(format!(
            "deadline must be an RFC 3339 timestamp or a duration: {}",
            s
        ))
    })?;
    chrono::Duration::from_std(offset)
        .ok()
        .and_then(|offset| now.checked_add_signed(offset))
        .ok_or_else(|| crate::Error::InvalidConfig(format!("deadline out of range: {}", s)))
}

/// Derive a stable client id from a display name
pub fn client_id_for_name(name: &str) -> u64 {
    crc32fast::hash(name.as_bytes()) as u64
}

/// Validate a bidder display name (non-empty, bounded, printable)
pub fn validate_client_name(name: &str) -> crate::Result<()> {
    if name.trim().is_empty() {
        return Err(crate::Error::Malformed("client name cannot be empty".into()));
    }

    if name.chars().count() > MAX_CLIENT_NAME_LEN {
        return Err(crate::Error::Malformed(format!(
            "client name too long (max {} characters)",
            MAX_CLIENT_NAME_LEN
        )));
    }

    if name.chars().any(|c| c.is_control()) {
        return Err(crate::Error::Malformed(
            "client name contains invalid characters".into(),
        ));
    }

    Ok(())
}

/// Validate a bid amount (finite and strictly positive)
pub fn validate_amount(amount: f64) -> crate::Result<()> {
    if !amount.is_finite() {
        return Err(crate::Error::Malformed(format!(
            "amount must be a finite number, got {}",
            amount
        )));
    }
    if amount <= 0.0 {
        return Err(crate::Error::Malformed(format!(
            "amount must be positive, got {}",
            amount
        )));
    }
    Ok(())
}

/// Time left until `deadline`, zero once it has passed
pub fn remaining_until(deadline: DateTime<Utc>, now: DateTime<Utc>) -> std::time::Duration {
    (deadline - now).to_std().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_duration() {
        assert_eq!(
            parse_duration("500ms").unwrap(),
            std::time::Duration::from_millis(500)
        );
        assert_eq!(
            parse_duration("30s").unwrap(),
            std::time::Duration::from_secs(30)
        );
        assert_eq!(
            parse_duration("5m").unwrap(),
            std::time::Duration::from_secs(300)
        );
        assert_eq!(
            parse_duration("1h").unwrap(),
            std::time::Duration::from_secs(3600)
        );
        assert_eq!(
            parse_duration("7d").unwrap(),
            std::time::Duration::from_secs(604800)
        );
    }

    #[test]
    fn test_parse_duration_invalid() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("abc").is_err());
        assert!(parse_duration("10x").is_err());
        assert!(parse_duration("42").is_err());
    }

    #[test]
    fn test_parse_duration_out_of_range() {
        let err = parse_duration("3074457345618258603h").unwrap_err();
        assert!(matches!(err, crate::Error::InvalidConfig(_)));
        assert!(parse_duration("18446744073709551615d").is_err());
        assert!(parse_duration("99999999999999999999s").is_err());

        // Fits a Duration but not a millisecond count
        assert!(parse_duration("18446744073709552s").is_ok());
        assert!(matches!(
            parse_duration_ms("18446744073709552s"),
            Err(crate::Error::InvalidConfig(_))
        ));
        assert_eq!(parse_duration_ms("2s").unwrap(), 2_000);
    }

    #[test]
    fn test_parse_deadline() {
        let now = Utc.with_ymd_and_hms(2026, 10, 16, 12, 0, 0).unwrap();

        let absolute = parse_deadline("2026-10-16T18:30:00Z", now).unwrap();
        assert_eq!(absolute, Utc.with_ymd_and_hms(2026, 10, 16, 18, 30, 0).unwrap());

        let relative = parse_deadline("5m", now).unwrap();
        assert_eq!(relative, Utc.with_ymd_and_hms(2026, 10, 16, 12, 5, 0).unwrap());

        assert!(parse_deadline("tomorrow", now).is_err());
    }

    #[test]
    fn test_parse_deadline_out_of_range() {
        let now = Utc.with_ymd_and_hms(2026, 10, 16, 12, 0, 0).unwrap();

        // Too large for a chrono duration
        let err = parse_deadline("100000000000d", now).unwrap_err();
        assert!(matches!(err, crate::Error::InvalidConfig(_)));

        // A valid duration that lands past the last representable date
        let err = parse_deadline("100000000d", now).unwrap_err();
        assert!(matches!(err, crate::Error::InvalidConfig(_)));
    }

    #[test]
    fn test_client_id_is_stable() {
        assert_eq!(client_id_for_name("alice"), client_id_for_name("alice"));
        assert_ne!(client_id_for_name("alice"), client_id_for_name("bob"));
    }

    #[test]
    fn test_validate_client_name() {
        assert!(validate_client_name("alice").is_ok());
        assert!(validate_client_name("").is_err());
        assert!(validate_client_name("   ").is_err());
        assert!(validate_client_name(&"x".repeat(200)).is_err());
        assert!(validate_client_name("bad\nname").is_err());
    }

    #[test]
    fn test_validate_amount() {
        assert!(validate_amount(10.5).is_ok());
        assert!(validate_amount(0.0).is_err());
        assert!(validate_amount(-3.0).is_err());
        assert!(validate_amount(f64::NAN).is_err());
        assert!(validate_amount(f64::INFINITY).is_err());
    }

    #[test]
    fn test_remaining_until() {
        let now = Utc.with_ymd_and_hms(2026, 10, 16, 12, 0, 0).unwrap();
        let later = now + chrono::Duration::seconds(30);
        assert_eq!(remaining_until(later, now), std::time::Duration::from_secs(30));
        assert_eq!(remaining_until(now, later), std::time::Duration::ZERO);
    }
}
