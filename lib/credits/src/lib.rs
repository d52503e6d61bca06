//! Credit metering for kelasi generation requests.
//!
//! Every paid generation passes through [`CreditLedger::authorize_and_deduct`]
//! exactly once, before the model is called. The check and the decrement are
//! a single indivisible operation, so two concurrent requests can never both
//! spend the last credit.
//!
//! Two ledgers are provided:
//! - [`InMemoryLedger`]: process-local, for tests and single-node development
//! - [`PgCreditLedger`]: PostgreSQL-backed, the production store

pub mod error;
pub mod ledger;
pub mod memory;
pub mod postgres;

pub use error::{GateError, LedgerError};
pub use ledger::{CreditLedger, Deduction, GateOutcome};
pub use memory::InMemoryLedger;
pub use postgres::PgCreditLedger;
