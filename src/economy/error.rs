use serde::Serialize;
use thiserror::Error;

use crate::catalog::CatalogError;
use crate::guard::GuardError;

/// Business rule that rejected an action, with a stable machine-readable code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Reason {
    #[error("pet is already farming")]
    PetAlreadyFarming,
    #[error("pet is out of mana")]
    PetIsOutOfMana,
    #[error("not enough money")]
    NotEnoughMoney,
    #[error("pet has reached max level")]
    PetMaxLevel,
    #[error("not enough food")]
    NotEnoughFood,
    #[error("claim too soon")]
    ClaimTooSoon,
}

impl Reason {
    pub fn code(&self) -> &'static str {
        match self {
            Reason::PetAlreadyFarming => "PET_ALREADY_FARMING",
            Reason::PetIsOutOfMana => "PET_IS_OUT_OF_MANA",
            Reason::NotEnoughMoney => "NOT_ENOUGH_MONEY",
            Reason::PetMaxLevel => "PET_MAX_LEVEL",
            Reason::NotEnoughFood => "NOT_ENOUGH_FOOD",
            Reason::ClaimTooSoon => "CLAIM_TOO_SOON",
        }
    }
}

#[derive(Debug, Error)]
pub enum EconomyError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Precondition failed: {0}")]
    PreconditionFailed(Reason),
    #[error("Another action is in progress for this player")]
    Contended,
    #[error("Write conflict: state changed while the action was running")]
    WriteConflict,
    #[error("Internal error: {0}")]
    Internal(String),
}

impl EconomyError {
    /// Stable code recorded on aborted audit records and returned to callers.
    pub fn code(&self) -> &'static str {
        match self {
            EconomyError::InvalidInput(_) => "INVALID_INPUT",
            EconomyError::NotFound(_) => "NOT_FOUND",
            EconomyError::PreconditionFailed(reason) => reason.code(),
            EconomyError::Contended => "CONTENDED",
            EconomyError::WriteConflict => "WRITE_CONFLICT",
            EconomyError::Internal(_) => "INTERNAL",
        }
    }

    /// Whether resubmitting the whole action may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EconomyError::Contended | EconomyError::WriteConflict)
    }
}

/// SQLite lock contention means another transaction won the race.
pub(crate) fn is_lock_conflict(err: &sqlx::Error) -> bool {
    let Some(db_err) = err.as_database_error() else {
        return false;
    };
    let Some(code) = db_err.code() else {
        return false;
    };
    // SQLITE_BUSY (5) and SQLITE_LOCKED (6), including extended variants.
    match code.parse::<i32>() {
        Ok(code) => matches!(code & 0xff, 5 | 6),
        Err(_) => false,
    }
}

impl From<sqlx::Error> for EconomyError {
    fn from(err: sqlx::Error) -> Self {
        if is_lock_conflict(&err) {
            EconomyError::WriteConflict
        } else {
            EconomyError::Internal(err.to_string())
        }
    }
}

impl From<CatalogError> for EconomyError {
    fn from(err: CatalogError) -> Self {
        EconomyError::Internal(err.to_string())
    }
}

impl From<GuardError> for EconomyError {
    fn from(err: GuardError) -> Self {
        EconomyError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_distinct_per_kind() {
        let errors = [
            EconomyError::InvalidInput("x".into()),
            EconomyError::NotFound("x".into()),
            EconomyError::PreconditionFailed(Reason::PetMaxLevel),
            EconomyError::Contended,
            EconomyError::WriteConflict,
            EconomyError::Internal("x".into()),
        ];
        let codes: std::collections::HashSet<_> = errors.iter().map(|e| e.code()).collect();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn test_only_races_are_retryable() {
        assert!(EconomyError::Contended.is_retryable());
        assert!(EconomyError::WriteConflict.is_retryable());
        assert!(!EconomyError::PreconditionFailed(Reason::NotEnoughMoney).is_retryable());
        assert!(!EconomyError::Internal("db".into()).is_retryable());
    }

    #[test]
    fn test_reason_serializes_as_code() {
        for reason in [
            Reason::PetAlreadyFarming,
            Reason::PetIsOutOfMana,
            Reason::NotEnoughMoney,
            Reason::PetMaxLevel,
            Reason::NotEnoughFood,
            Reason::ClaimTooSoon,
        ] {
            let json = serde_json::to_string(&reason).unwrap();
            assert_eq!(json, format!("\"{}\"", reason.code()));
        }
    }

    #[test]
    fn test_non_database_sqlx_error_is_internal() {
        let err: EconomyError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, EconomyError::Internal(_)));
    }
}
