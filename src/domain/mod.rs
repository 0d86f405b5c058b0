//! Domain types for the pet-farming economy.
//!
//! This module provides:
//! - Lossless numeric handling via Decimal wrapper
//! - Domain primitives: TimeMs, PlayerId, PetId, Token
//! - Player, Pet, Boost and audit record types

pub mod audit;
pub mod decimal;
pub mod pet;
pub mod player;
pub mod primitives;

pub use audit::{ActionKind, AuditRecord, Outcome};
pub use decimal::{Decimal, BALANCE_DP};
pub use pet::{FarmRate, Pet, MAX_LEVEL};
pub use player::{Boost, Player};
pub use primitives::{PetId, PlayerId, TimeMs, Token, UnknownToken, DAY_MS, MANA_UNIT_MS};
