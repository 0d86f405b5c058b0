//! Write-once audit records, one per economy transaction attempt.

use serde::{Deserialize, Serialize};

use super::{PetId, PlayerId, TimeMs};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Claim,
    FarmStart,
    Feed,
    Upgrade,
    Purchase,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Claim => "claim",
            ActionKind::FarmStart => "farm_start",
            ActionKind::Feed => "feed",
            ActionKind::Upgrade => "upgrade",
            ActionKind::Purchase => "purchase",
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Applied,
    Aborted,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Applied => "applied",
            Outcome::Aborted => "aborted",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub kind: ActionKind,
    pub player_id: PlayerId,
    pub pet_id: Option<PetId>,
    pub pre_state: serde_json::Value,
    pub deltas: serde_json::Value,
    pub outcome: Outcome,
    /// Error code for aborted attempts.
    pub reason: Option<String>,
    pub created_at: TimeMs,
}
