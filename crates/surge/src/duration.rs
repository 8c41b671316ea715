//! Human-readable durations for scenario files (`"500ms"`, `"30s"`, `"4m"`, `"1h30m"`).

use crate::result::{SurgeError, SurgeResult};
use std::time::Duration;

/// Parse a duration such as `"30s"`, `"4m"`, `"2h"`, `"500ms"` or `"1m30s"`.
///
/// A bare number is read as seconds.
pub fn parse_duration(input: &str) -> SurgeResult<Duration> {
    let invalid = || SurgeError::InvalidDuration {
        input: input.to_string(),
    };
    let trimmed = input.trim();
    if let Ok(secs) = trimmed.parse::<f64>() {
        return Duration::try_from_secs_f64(secs).map_err(|_| invalid());
    }
    humantime::parse_duration(trimmed).map_err(|_| invalid())
}

/// Render a duration compactly at millisecond precision: `"2h5m"`, `"30s"`, `"1s500ms"`.
pub fn format_duration(d: Duration) -> String {
    let millis = Duration::from_millis(u64::try_from(d.as_millis()).unwrap_or(u64::MAX));
    humantime::format_duration(millis).to_string().replace(' ', "")
}

/// Serde adapter accepting either a duration string or a number of seconds.
pub mod human {
    use super::{format_duration, parse_duration};
    use serde::{de, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Secs(f64),
        Text(String),
    }

    pub fn serialize<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_duration(*d))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        match Raw::deserialize(deserializer)? {
            Raw::Secs(secs) => Duration::try_from_secs_f64(secs).map_err(de::Error::custom),
            Raw::Text(text) => parse_duration(&text).map_err(de::Error::custom),
        }
    }

    /// Same adapter for `Option<Duration>` fields.
    pub mod option {
        use serde::{Deserialize, Deserializer, Serializer};
        use std::time::Duration;

        pub fn serialize<S: Serializer>(
            d: &Option<Duration>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match d {
                Some(d) => super::serialize(d, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<Duration>, D::Error> {
            #[derive(Deserialize)]
            struct Wrapper(#[serde(with = "super")] Duration);

            Ok(Option::<Wrapper>::deserialize(deserializer)?.map(|Wrapper(d)| d))
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_units() {
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("4m").unwrap(), Duration::from_secs(240));
        assert_eq!(parse_duration("2h").unwrap(), Duration::from_secs(7200));
    }

    #[test]
    fn test_parse_zero_is_valid() {
        assert_eq!(parse_duration("0s").unwrap(), Duration::ZERO);
        assert_eq!(parse_duration("0").unwrap(), Duration::ZERO);
    }

    #[test]
    fn test_parse_compound() {
        assert_eq!(parse_duration("1m30s").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_duration("1h5m").unwrap(), Duration::from_secs(3900));
    }

    #[test]
    fn test_parse_bare_number_is_seconds() {
        assert_eq!(parse_duration("12").unwrap(), Duration::from_secs(12));
        assert_eq!(parse_duration("1.5").unwrap(), Duration::from_millis(1500));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("s").is_err());
        assert!(parse_duration("soon").is_err());
        assert!(parse_duration("5 fortnights").is_err());
        assert!(parse_duration("-3s").is_err());
        assert!(parse_duration("-3").is_err());
    }

    #[test]
    fn test_parse_long_unit_names() {
        assert_eq!(parse_duration("10 minutes").unwrap(), Duration::from_secs(600));
        assert_eq!(parse_duration("1day").unwrap(), Duration::from_secs(86_400));
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::ZERO), "0s");
        assert_eq!(format_duration(Duration::from_millis(250)), "250ms");
        assert_eq!(format_duration(Duration::from_secs(30)), "30s");
        assert_eq!(format_duration(Duration::from_secs(240)), "4m");
        assert_eq!(format_duration(Duration::from_secs(7500)), "2h5m");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1s500ms");
        assert_eq!(format_duration(Duration::from_micros(2_750)), "2ms");
    }

    #[test]
    fn test_format_then_parse_is_stable() {
        for ms in [0, 1, 999, 59_000, 60_000, 61_500, 3_600_000, 3_661_000] {
            let d = Duration::from_millis(ms);
            assert_eq!(parse_duration(&format_duration(d)).unwrap(), d);
        }
    }

    #[test]
    fn test_serde_accepts_string_and_number() {
        #[derive(serde::Deserialize)]
        struct Holder {
            #[serde(with = "human")]
            d: Duration,
        }
        let a: Holder = serde_json::from_str(r#"{"d":"2m"}"#).unwrap();
        let b: Holder = serde_json::from_str(r#"{"d":120}"#).unwrap();
        assert_eq!(a.d, b.d);
    }

    #[test]
    fn test_serde_option() {
        #[derive(serde::Deserialize)]
        struct Holder {
            #[serde(default, with = "human::option")]
            d: Option<Duration>,
        }
        let some: Holder = serde_json::from_str(r#"{"d":"15m"}"#).unwrap();
        let none: Holder = serde_json::from_str("{}").unwrap();
        assert_eq!(some.d, Some(Duration::from_secs(900)));
        assert!(none.d.is_none());
    }
}
