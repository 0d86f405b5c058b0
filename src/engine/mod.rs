//! Pure computation engine(s) for farm accrual and spending.

pub mod accrual;
pub mod boost;
pub mod payment;
pub mod settlement;

pub use accrual::{Accrual, AccrualCalculator, FarmInterval};
pub use boost::BoostAggregator;
pub use payment::{split_payment, InsufficientFunds, Payment};
pub use settlement::{FarmCalculator, PetSettlement};
