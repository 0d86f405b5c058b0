//! Domain primitives: TimeMs, PlayerId, PetId, Token.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::Decimal;

/// Milliseconds in one day.
pub const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// Milliseconds in one mana unit (8 hours).
pub const MANA_UNIT_MS: i64 = 8 * 60 * 60 * 1000;

/// Time in milliseconds since Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimeMs(pub i64);

impl TimeMs {
    /// Create a TimeMs from milliseconds.
    pub fn new(ms: i64) -> Self {
        TimeMs(ms)
    }

    /// Current wall-clock time.
    pub fn now() -> Self {
        TimeMs(chrono::Utc::now().timestamp_millis())
    }

    /// Get the underlying milliseconds value.
    pub fn as_ms(&self) -> i64 {
        self.0
    }

    pub fn plus_ms(&self, ms: i64) -> Self {
        TimeMs(self.0.saturating_add(ms))
    }

    /// Fractional days from `self` to `end`; empty or inverted intervals yield zero.
    pub fn days_until(&self, end: TimeMs) -> Decimal {
        let span = end.0.saturating_sub(self.0);
        if span <= 0 {
            return Decimal::zero();
        }
        Decimal::from(span) / Decimal::from(DAY_MS)
    }

    /// RFC 3339 rendering for API payloads.
    pub fn to_rfc3339(&self) -> String {
        use chrono::TimeZone;
        match chrono::Utc.timestamp_millis_opt(self.0).single() {
            Some(dt) => dt.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            None => self.0.to_string(),
        }
    }
}

/// Stable external player identity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PlayerId(pub String);

impl PlayerId {
    pub fn new(id: impl Into<String>) -> Self {
        PlayerId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PlayerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Pet identity (UUID string assigned at purchase).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PetId(pub String);

impl PetId {
    pub fn new(id: impl Into<String>) -> Self {
        PetId(id.into())
    }

    /// Fresh random identity for a newly purchased pet.
    pub fn generate() -> Self {
        PetId(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Spendable token kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Token {
    /// Farmed points; credited by claims and spent first.
    Tgp,
    /// Secondary token; covers whatever the primary balance cannot.
    Tgpet,
}

impl Token {
    /// Debit order for every spend.
    pub const PAYMENT_ORDER: [Token; 2] = [Token::Tgp, Token::Tgpet];

    pub fn as_str(&self) -> &'static str {
        match self {
            Token::Tgp => "tgp",
            Token::Tgpet => "tgpet",
        }
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown token: {0}")]
pub struct UnknownToken(pub String);

impl FromStr for Token {
    type Err = UnknownToken;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tgp" => Ok(Token::Tgp),
            "tgpet" => Ok(Token::Tgpet),
            other => Err(UnknownToken(other.to_string())),
        }
    }
}
