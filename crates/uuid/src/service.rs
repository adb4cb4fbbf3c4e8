//! Internal implementation of record identifiers.

use crate::{UuidError, UuidResult};
use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use std::path::{Path, PathBuf};
use std::{fmt, str::FromStr};

/// Re-exported for convenience.
pub use ::uuid::Uuid;

const TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%S%.3f";

/// Canonical record identifier (32 lowercase hex characters, no hyphens).
///
/// Once constructed, the contained UUID is known to be valid and always displays in canonical
/// form. Use [`RecordId::parse`] for identifiers arriving from outside the core (CLI arguments,
/// REST path segments) and [`RecordId::new`] to allocate a fresh one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId(Uuid);

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordId {
    /// Generates a new random (v4) identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wraps an existing UUID. Any UUID value has a canonical rendering.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Validates and parses an identifier that must already be canonical.
    ///
    /// This does **not** normalise hyphenated or uppercase input.
    ///
    /// # Errors
    ///
    /// Returns [`UuidError::InvalidInput`] if `input` is not in canonical form.
    pub fn parse(input: &str) -> UuidResult<Self> {
        if !Self::is_canonical(input) {
            return Err(UuidError::InvalidInput(format!(
                "UUID must be 32 lowercase hex characters without hyphens, got: '{}'",
                input
            )));
        }
        Uuid::parse_str(input)
            .map(Self)
            .map_err(|e| UuidError::InvalidInput(format!("invalid UUID '{}': {}", input, e)))
    }

    /// Returns the inner `uuid::Uuid`.
    pub fn uuid(&self) -> Uuid {
        self.0
    }

    /// Returns true if `input` is exactly 32 lowercase hex characters.
    pub fn is_canonical(input: &str) -> bool {
        input.len() == 32
            && input
                .bytes()
                .all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
    }

    /// Returns `parent_dir/<s1>/<s2>/<id>/` where `s1`/`s2` are the first two pairs of hex
    /// characters of this identifier.
    pub fn sharded_dir(&self, parent_dir: &Path) -> PathBuf {
        let canonical = self.0.simple().to_string();
        let s1 = &canonical[0..2];
        let s2 = &canonical[2..4];
        parent_dir.join(s1).join(s2).join(&canonical)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

impl FromStr for RecordId {
    type Err = UuidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RecordId::parse(s)
    }
}

/// A time-prefixed identifier.
///
/// Format: `YYYYMMDDTHHMMSS.mmmZ-<canonical_uuid>`, for example
/// `20260111T143522.045Z-550e8400e29b41d4a716446655440000`.
///
/// When generated with the previous identifier of the same parent record, the timestamp is
/// strictly greater than the previous one (bumped by 1 ms when the clock has not advanced).
/// Ordering compares the timestamp first, so sorting ids sorts chronologically.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimestampId {
    timestamp: DateTime<Utc>,
    id: RecordId,
}

impl TimestampId {
    /// Generates an identifier stamped at `now`, kept strictly after `last` if given.
    ///
    /// Call this while holding whatever lock serialises writes to the parent record.
    pub fn generate(now: DateTime<Utc>, last: Option<&TimestampId>) -> Self {
        let now = truncate_to_millis(now);
        let timestamp = match last {
            Some(prev) if now <= prev.timestamp => prev.timestamp + Duration::milliseconds(1),
            _ => now,
        };

        Self {
            timestamp,
            id: RecordId::new(),
        }
    }

    /// Returns the timestamp component.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Returns the random component.
    pub fn record_id(&self) -> &RecordId {
        &self.id
    }
}

// The textual form carries millisecond precision; truncating at generation keeps
// display/parse lossless.
fn truncate_to_millis(ts: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(ts.timestamp_millis()).unwrap_or(ts)
}

impl fmt::Display for TimestampId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}Z-{}",
            self.timestamp.format(TIMESTAMP_FORMAT),
            self.id
        )
    }
}

impl FromStr for TimestampId {
    type Err = UuidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (ts_str, id_str) = s.split_once('-').ok_or_else(|| {
            UuidError::InvalidInput(format!("Invalid timestamp id format: '{}'", s))
        })?;

        let ts_no_z = ts_str.strip_suffix('Z').ok_or_else(|| {
            UuidError::InvalidInput(format!("Timestamp must end with 'Z': '{}'", ts_str))
        })?;

        let naive = NaiveDateTime::parse_from_str(ts_no_z, TIMESTAMP_FORMAT).map_err(|e| {
            UuidError::InvalidInput(format!("Invalid timestamp format '{}': {}", ts_str, e))
        })?;

        Ok(Self {
            timestamp: DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc),
            id: RecordId::parse(id_str)?,
        })
    }
}

#[cfg(feature = "serde")]
mod serde_impls {
    use super::{RecordId, TimestampId};
    use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

    impl Serialize for RecordId {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            serializer.collect_str(self)
        }
    }

    impl<'de> Deserialize<'de> for RecordId {
        fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
            let s = String::deserialize(deserializer)?;
            RecordId::parse(&s).map_err(de::Error::custom)
        }
    }

    impl Serialize for TimestampId {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            serializer.collect_str(self)
        }
    }

    impl<'de> Deserialize<'de> for TimestampId {
        fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
            let s = String::deserialize(deserializer)?;
            s.parse().map_err(de::Error::custom)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_new_generates_canonical_id() {
        let id = RecordId::new().to_string();
        assert_eq!(id.len(), 32);
        assert!(RecordId::is_canonical(&id));
    }

    #[test]
    fn test_parse_rejects_hyphenated() {
        let result = RecordId::parse("550e8400-e29b-41d4-a716-446655440000");
        match result {
            Err(UuidError::InvalidInput(msg)) => {
                assert!(msg.contains("32 lowercase hex characters"));
            }
            _ => panic!("Expected InvalidInput error"),
        }
    }

    #[test]
    fn test_parse_rejects_uppercase_and_bad_length() {
        assert!(RecordId::parse("550E8400E29B41D4A716446655440000").is_err());
        assert!(RecordId::parse("550e8400e29b41d4a71644665544000").is_err());
        assert!(RecordId::parse("").is_err());
    }

    #[test]
    fn test_sharded_dir_structure() {
        let id = RecordId::parse("550e8400e29b41d4a716446655440000").unwrap();
        let sharded = id.sharded_dir(Path::new("/triage_data/assessments"));

        assert_eq!(
            sharded,
            PathBuf::from("/triage_data/assessments/55/0e/550e8400e29b41d4a716446655440000")
        );
    }

    #[test]
    fn test_record_id_serde_uses_canonical_form() {
        let id = RecordId::parse("550e8400e29b41d4a716446655440000").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"550e8400e29b41d4a716446655440000\"");

        let hyphenated = "\"550e8400-e29b-41d4-a716-446655440000\"";
        assert!(serde_json::from_str::<RecordId>(hyphenated).is_err());
    }

    #[test]
    fn test_timestamp_id_strictly_after_previous_at_same_instant() {
        let now = Utc.with_ymd_and_hms(2026, 1, 11, 14, 35, 22).unwrap();
        let first = TimestampId::generate(now, None);
        let second = TimestampId::generate(now, Some(&first));

        assert!(second.timestamp() > first.timestamp());
        assert!(second > first);
    }

    #[test]
    fn test_timestamp_id_uses_clock_when_it_advanced() {
        let t0 = Utc.with_ymd_and_hms(2026, 1, 11, 14, 35, 22).unwrap();
        let first = TimestampId::generate(t0, None);
        let later = t0 + Duration::minutes(5);
        let second = TimestampId::generate(later, Some(&first));

        assert_eq!(second.timestamp(), later);
    }

    #[test]
    fn test_timestamp_id_display_parses_back() {
        let original = "20260111T143522.045Z-550e8400e29b41d4a716446655440000";
        let parsed: TimestampId = original.parse().unwrap();
        assert_eq!(parsed.to_string(), original);
        assert_eq!(
            parsed.record_id().to_string(),
            "550e8400e29b41d4a716446655440000"
        );
    }

    #[test]
    fn test_timestamp_id_parse_errors() {
        assert!("20260111T143522.045Z550e8400e29b41d4a716446655440000"
            .parse::<TimestampId>()
            .is_err());
        match "20260111T143522.045-550e8400e29b41d4a716446655440000".parse::<TimestampId>() {
            Err(UuidError::InvalidInput(msg)) => assert!(msg.contains("must end with 'Z'")),
            _ => panic!("Expected InvalidInput error"),
        }
        assert!("20260199T143522.045Z-550e8400e29b41d4a716446655440000"
            .parse::<TimestampId>()
            .is_err());
    }

    #[test]
    fn test_generated_timestamp_id_survives_text_form() {
        let now = Utc::now();
        let id = TimestampId::generate(now, None);
        let parsed: TimestampId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
    }
}
