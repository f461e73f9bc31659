pub mod amount;
pub mod time;

pub use amount::*;
pub use time::*;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum UnitError {
    #[error("amount must not be negative (got {0})")]
    Negative(f64),
    #[error("amount is not a finite number")]
    NotFinite,
    #[error("amount {0} does not fit in minor units")]
    Overflow(f64),
    #[error("timestamp {0}ns is outside the representable calendar range")]
    TimeOutOfRange(i64),
}
