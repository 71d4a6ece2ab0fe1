//! Human-friendly durations: `90`, `"90s"`, `"15m"`, `"1h30m"`, `"250ms"`

use std::time::Duration;

const UNITS: &[(&str, u64)] = &[
    ("d", 86_400_000),
    ("h", 3_600_000),
    ("m", 60_000),
    ("s", 1_000),
    ("ms", 1),
];

/// Parse a duration. A bare number is seconds.
///
/// Usable directly as a clap `value_parser`.
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let text = input.trim();
    if text.is_empty() {
        return Err("empty duration".to_string());
    }
    if let Ok(secs) = text.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }

    let mut total_ms: u64 = 0;
    let mut rest = text;
    while !rest.is_empty() {
        let digits = rest.chars().take_while(|c| c.is_ascii_digit()).count();
        if digits == 0 {
            return Err(format!("invalid duration '{}': expected a number", input));
        }
        let (number, tail) = rest.split_at(digits);
        let unit_len = tail.chars().take_while(|c| c.is_ascii_alphabetic()).count();
        let (unit, tail) = tail.split_at(unit_len);

        let factor = UNITS
            .iter()
            .find(|(name, _)| *name == unit)
            .map(|(_, ms)| *ms)
            .ok_or_else(|| format!("invalid duration '{}': unknown unit '{}'", input, unit))?;
        let value: u64 = number
            .parse()
            .map_err(|_| format!("invalid duration '{}': number too large", input))?;

        total_ms = value
            .checked_mul(factor)
            .and_then(|ms| total_ms.checked_add(ms))
            .ok_or_else(|| format!("invalid duration '{}': overflow", input))?;
        rest = tail;
    }

    Ok(Duration::from_millis(total_ms))
}

/// Render the shortest unit string that parses back to the same value
pub fn format_duration(duration: Duration) -> String {
    let mut remaining = duration.as_millis() as u64;
    if remaining == 0 {
        return "0s".to_string();
    }

    let mut out = String::new();
    for (unit, ms) in UNITS {
        if remaining >= *ms {
            out.push_str(&format!("{}{}", remaining / ms, unit));
            remaining %= ms;
        }
    }
    out
}

pub(crate) mod serde_duration {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Seconds(u64),
        Text(String),
    }

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_duration(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        match Raw::deserialize(deserializer)? {
            Raw::Seconds(secs) => Ok(Duration::from_secs(secs)),
            Raw::Text(text) => super::parse_duration(&text).map_err(serde::de::Error::custom),
        }
    }
}
