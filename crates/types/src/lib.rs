//! # Triage Types
//!
//! Small validated value types shared by every triage crate.
//!
//! - [`NonEmptyText`]: trimmed text that is guaranteed to contain at least one character.
//! - [`TriageLevel`]: the five-point urgency ordinal (1 = most critical, 5 = least urgent).

use std::fmt;

/// Errors that can occur when creating validated text types.
#[derive(Debug, thiserror::Error)]
pub enum TextError {
    /// The input text was empty or contained only whitespace
    #[error("Text cannot be empty")]
    Empty,
}

/// A string type that guarantees non-empty content.
///
/// The input is trimmed of leading and trailing whitespace during construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NonEmptyText(String);

impl NonEmptyText {
    /// Creates a new `NonEmptyText` from the given input.
    ///
    /// # Errors
    ///
    /// Returns [`TextError::Empty`] if the trimmed input is empty.
    pub fn new(input: impl AsRef<str>) -> Result<Self, TextError> {
        let trimmed = input.as_ref().trim();
        if trimmed.is_empty() {
            return Err(TextError::Empty);
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Returns the inner string as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NonEmptyText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for NonEmptyText {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl serde::Serialize for NonEmptyText {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for NonEmptyText {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        NonEmptyText::new(&s).map_err(serde::de::Error::custom)
    }
}

/// Errors raised when converting a raw number into a [`TriageLevel`].
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum LevelError {
    #[error("triage level must be between 1 and 5, got {0}")]
    OutOfRange(u8),
}

/// Ordinal urgency classification.
///
/// Ordering follows urgency: `Resuscitation < Emergent < ... < NonUrgent`, so sorting ascending
/// puts the most critical patients first.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
#[serde(try_from = "u8", into = "u8")]
pub enum TriageLevel {
    /// Level 1: immediate life-saving intervention.
    Resuscitation = 1,
    /// Level 2: high risk, should not wait.
    Emergent = 2,
    /// Level 3: stable, needs several resources.
    Urgent = 3,
    /// Level 4: stable, needs one resource.
    LessUrgent = 4,
    /// Level 5: stable, needs no resources.
    NonUrgent = 5,
}

impl TriageLevel {
    /// Every level, most critical first.
    pub const ALL: [TriageLevel; 5] = [
        TriageLevel::Resuscitation,
        TriageLevel::Emergent,
        TriageLevel::Urgent,
        TriageLevel::LessUrgent,
        TriageLevel::NonUrgent,
    ];

    /// Returns the numeric ordinal (1..=5).
    pub fn ordinal(self) -> u8 {
        self as u8
    }

    /// Levels 1 and 2 count as critical for capacity signals.
    pub fn is_critical(self) -> bool {
        matches!(self, TriageLevel::Resuscitation | TriageLevel::Emergent)
    }

    /// Zero-based index, handy for fixed-size per-level tables.
    pub fn index(self) -> usize {
        usize::from(self.ordinal() - 1)
    }
}

impl TryFrom<u8> for TriageLevel {
    type Error = LevelError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(TriageLevel::Resuscitation),
            2 => Ok(TriageLevel::Emergent),
            3 => Ok(TriageLevel::Urgent),
            4 => Ok(TriageLevel::LessUrgent),
            5 => Ok(TriageLevel::NonUrgent),
            other => Err(LevelError::OutOfRange(other)),
        }
    }
}

impl From<TriageLevel> for u8 {
    fn from(level: TriageLevel) -> Self {
        level.ordinal()
    }
}

impl fmt::Display for TriageLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TriageLevel::Resuscitation => "resuscitation",
            TriageLevel::Emergent => "emergent",
            TriageLevel::Urgent => "urgent",
            TriageLevel::LessUrgent => "less urgent",
            TriageLevel::NonUrgent => "non-urgent",
        };
        write!(f, "ESI {} ({})", self.ordinal(), label)
    }
}
