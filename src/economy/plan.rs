//! Structured per-entity deltas produced by an action and applied uniformly
//! by the conditional-write step.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::domain::{ActionKind, Decimal, Pet, PetId, PlayerId, TimeMs, Token};

/// Change to one token balance, conditional on its pre-image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BalanceWrite {
    pub token: Token,
    pub expected: Decimal,
    pub delta: Decimal,
}

impl BalanceWrite {
    pub fn after(&self) -> Decimal {
        self.expected + self.delta
    }
}

/// Additive change to a lifetime total.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TotalWrite {
    pub metric: String,
    pub before: Decimal,
    pub delta: Decimal,
}

impl TotalWrite {
    pub fn after(&self) -> Decimal {
        self.before + self.delta
    }
}

/// Inventory change; debits require at least `-delta` units on hand at write time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InventoryWrite {
    pub item: String,
    pub delta: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlayerWrite {
    pub player_id: PlayerId,
    pub expected_revision: i64,
    pub balances: Vec<BalanceWrite>,
    pub totals: Vec<TotalWrite>,
    pub inventory: Vec<InventoryWrite>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_claimed_at: Option<TimeMs>,
}

impl PlayerWrite {
    pub fn new(player_id: PlayerId, expected_revision: i64) -> Self {
        Self {
            player_id,
            expected_revision,
            balances: Vec::new(),
            totals: Vec::new(),
            inventory: Vec::new(),
            last_claimed_at: None,
        }
    }

    pub fn balance_delta(&self, token: Token) -> Decimal {
        self.balances
            .iter()
            .filter(|b| b.token == token)
            .map(|b| b.delta)
            .sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum PetWrite {
    Insert(Pet),
    Update { expected_revision: i64, after: Pet },
}

impl PetWrite {
    pub fn pet(&self) -> &Pet {
        match self {
            PetWrite::Insert(pet) => pet,
            PetWrite::Update { after, .. } => after,
        }
    }
}

/// Success payload of an action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionReceipt {
    pub action: ActionKind,
    /// Points credited (claim) or flushed into a pet's carried balance (feed, upgrade).
    pub points: Decimal,
    pub boost_points: Decimal,
    pub costs: BTreeMap<Token, Decimal>,
    pub balances: BTreeMap<Token, Decimal>,
    pub pet: Option<Pet>,
    pub at: TimeMs,
}

/// Everything one action will write, computed from a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WritePlan {
    pub kind: ActionKind,
    pub player: Option<PlayerWrite>,
    pub pets: Vec<PetWrite>,
    #[serde(skip)]
    pub receipt: ActionReceipt,
}

impl WritePlan {
    /// True when the action has nothing to write besides its audit record.
    pub fn is_noop(&self) -> bool {
        self.player.is_none() && self.pets.is_empty()
    }

    pub fn pet_id(&self) -> Option<&PetId> {
        self.receipt.pet.as_ref().map(|p| &p.id)
    }

    /// Audit payload describing the deltas.
    pub fn deltas_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}
