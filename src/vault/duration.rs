//! # Vault Duration Parsing
//!
//! Vault expresses TTLs and periods as duration strings ("90s", "30m",
//! "768h") but reports most of them back as integer seconds. Everything
//! that compares a desired TTL against an observed one goes through this
//! module so both sides end up in seconds.

use anyhow::Result;
use regex::Regex;
use std::time::Duration;

/// Parse a Vault duration string into a [`Duration`].
///
/// Supported formats: `<number><unit>` with unit `s`, `m`, `h`, or `d`,
/// e.g. "30s", "5m", "1h", "1d". A bare number is taken as seconds, which
/// matches how Vault itself interprets unadorned values.
pub fn parse_vault_duration(duration_str: &str) -> Result<Duration> {
    let trimmed = duration_str.trim();

    if trimmed.is_empty() {
        return Err(anyhow::anyhow!("duration string cannot be empty"));
    }

    // Bare integer: Vault treats it as seconds.
    if let Ok(seconds) = trimmed.parse::<u64>() {
        return Ok(Duration::from_secs(seconds));
    }

    let duration_regex = Regex::new(r"^(?P<number>\d+)(?P<unit>[smhd])$")
        .map_err(|e| anyhow::anyhow!("failed to compile regex: {e}"))?;

    let lower = trimmed.to_lowercase();
    let captures = duration_regex.captures(&lower).ok_or_else(|| {
        anyhow::anyhow!(
            "invalid duration format '{trimmed}'. Expected <number><unit> (e.g. '30s', '5m', '1h')"
        )
    })?;

    let number: u64 = captures
        .name("number")
        .ok_or_else(|| anyhow::anyhow!("failed to extract number from duration '{trimmed}'"))?
        .as_str()
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid duration number in '{trimmed}': {e}"))?;

    let unit = captures
        .name("unit")
        .ok_or_else(|| anyhow::anyhow!("failed to extract unit from duration '{trimmed}'"))?
        .as_str();

    let seconds = match unit {
        "s" => number,
        "m" => number * 60,
        "h" => number * 3600,
        "d" => number * 86400,
        _ => {
            return Err(anyhow::anyhow!(
                "invalid unit '{unit}' in duration '{trimmed}'. Expected: s, m, h, or d"
            ));
        }
    };

    Ok(Duration::from_secs(seconds))
}

/// Seconds for a Vault duration string.
pub fn duration_secs(duration_str: &str) -> Result<u64> {
    parse_vault_duration(duration_str).map(|d| d.as_secs())
}

/// Compare a desired TTL string against the value Vault reported.
///
/// Vault answers tune/config reads with integer seconds; some older
/// endpoints echo the string form back. Both are accepted.
pub fn ttl_matches(desired: &str, observed: &serde_json::Value) -> Result<bool> {
    let desired_secs = duration_secs(desired)?;
    let observed_secs = match observed {
        serde_json::Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| anyhow::anyhow!("observed TTL is not a non-negative integer: {n}"))?,
        serde_json::Value::String(s) => duration_secs(s)?,
        other => {
            return Err(anyhow::anyhow!(
                "observed TTL is neither a number nor a duration string: {other}"
            ));
        }
    };
    Ok(desired_secs == observed_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_unit_suffixed_durations() {
        assert_eq!(parse_vault_duration("30s").unwrap().as_secs(), 30);
        assert_eq!(parse_vault_duration("5m").unwrap().as_secs(), 300);
        assert_eq!(parse_vault_duration("1h").unwrap().as_secs(), 3600);
        assert_eq!(parse_vault_duration("1d").unwrap().as_secs(), 86400);
    }

    #[test]
    fn parses_bare_seconds() {
        assert_eq!(parse_vault_duration("768").unwrap().as_secs(), 768);
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_vault_duration("").is_err());
        assert!(parse_vault_duration("1h30m").is_err());
        assert!(parse_vault_duration("soon").is_err());
    }

    #[test]
    fn ttl_matches_numeric_and_string_forms() {
        assert!(ttl_matches("1h", &serde_json::json!(3600)).unwrap());
        assert!(ttl_matches("1h", &serde_json::json!("3600")).unwrap());
        assert!(ttl_matches("1h", &serde_json::json!("60m")).unwrap());
        assert!(!ttl_matches("1h", &serde_json::json!(1800)).unwrap());
    }

    #[test]
    fn ttl_matches_rejects_malformed_observed() {
        assert!(ttl_matches("1h", &serde_json::json!({"nested": true})).is_err());
    }
}
