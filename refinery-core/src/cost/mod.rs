//! Cost accounting
//!
//! Currency conversion for estimates, the per-run usage accumulator, and
//! the persisted ledger it exports to.

pub mod currency;
pub mod ledger;
pub mod tracker;

pub use currency::{Currency, CurrencyConverter, CurrencyError};
pub use ledger::{LedgerError, LedgerRow, LedgerWriter};
pub use tracker::{CostTracker, UsageTotals};
