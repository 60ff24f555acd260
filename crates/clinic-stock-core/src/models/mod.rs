//! Domain models for the clinic stock ledger.

mod batch;
mod medicine;
mod patient;
mod pricing;
mod transaction;

pub use batch::*;
pub use medicine::*;
pub use patient::*;
pub use pricing::*;
pub use transaction::*;
