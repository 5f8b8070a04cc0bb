//! In-memory collaborators: a multi-mint token ledger and a constant-product
//! AMM. Used by the CLI's local deployments and by the test-suite.

pub mod amm;
pub mod ledger;

pub use amm::ConstantProductAmm;
pub use ledger::MemoryLedger;
