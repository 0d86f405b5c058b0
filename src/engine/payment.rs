//! Splitting a cost across token balances in priority order.

use crate::domain::{Decimal, Player, Token};

/// Per-token debits covering one cost.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Payment {
    pub debits: Vec<(Token, Decimal)>,
}

impl Payment {
    pub fn total(&self) -> Decimal {
        self.debits.iter().map(|(_, amount)| *amount).sum()
    }

    pub fn amount(&self, token: Token) -> Decimal {
        self.debits
            .iter()
            .filter(|(t, _)| *t == token)
            .map(|(_, amount)| *amount)
            .sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("insufficient funds: required {required}, available {available}")]
pub struct InsufficientFunds {
    pub required: Decimal,
    pub available: Decimal,
}

/// Debit the primary token up to its balance, the remainder from the next.
pub fn split_payment(player: &Player, cost: Decimal) -> Result<Payment, InsufficientFunds> {
    let available: Decimal = Token::PAYMENT_ORDER
        .iter()
        .map(|t| player.balance(*t).non_negative())
        .sum();
    if cost.is_negative() || available < cost {
        return Err(InsufficientFunds {
            required: cost,
            available,
        });
    }

    let mut remaining = cost;
    let mut debits = Vec::new();
    for token in Token::PAYMENT_ORDER {
        if !remaining.is_positive() {
            break;
        }
        let share = std::cmp::min(player.balance(token).non_negative(), remaining);
        if share.is_positive() {
            debits.push((token, share));
            remaining = remaining - share;
        }
    }

    Ok(Payment { debits })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PlayerId;

    fn d(s: &str) -> Decimal {
        Decimal::from_str_canonical(s).unwrap()
    }

    fn player(tgp: &str, tgpet: &str) -> Player {
        let mut p = Player::new(PlayerId::new("p1"));
        p.balances.insert(Token::Tgp, d(tgp));
        p.balances.insert(Token::Tgpet, d(tgpet));
        p
    }

    #[test]
    fn test_primary_covers_everything() {
        let payment = split_payment(&player("100", "50"), d("60")).unwrap();
        assert_eq!(payment.debits, vec![(Token::Tgp, d("60"))]);
    }

    #[test]
    fn test_remainder_from_secondary() {
        let payment = split_payment(&player("40", "50"), d("60")).unwrap();
        assert_eq!(
            payment.debits,
            vec![(Token::Tgp, d("40")), (Token::Tgpet, d("20"))]
        );
        assert_eq!(payment.total(), d("60"));
    }

    #[test]
    fn test_empty_primary_skipped() {
        let payment = split_payment(&player("0", "50"), d("10")).unwrap();
        assert_eq!(payment.debits, vec![(Token::Tgpet, d("10"))]);
        assert_eq!(payment.amount(Token::Tgp), Decimal::zero());
    }

    #[test]
    fn test_insufficient_combined_balance() {
        let err = split_payment(&player("10", "10"), d("21")).unwrap_err();
        assert_eq!(err.available, d("20"));
    }

    #[test]
    fn test_zero_cost_debits_nothing() {
        let payment = split_payment(&player("0", "0"), Decimal::zero()).unwrap();
        assert!(payment.debits.is_empty());
    }
}
