//! Ledger access: the client trait, its backends, and the transaction
//! pipeline that orders every mutation.

mod call;
mod client;
mod error;
mod http;
mod memory;
mod pipeline;

pub use call::{LedgerCall, Receipt, TeamCounts, TxHandle};
pub use client::Ledger;
pub use error::{LedgerError, LedgerErrorKind};
pub use http::HttpLedger;
pub use memory::MemoryLedger;
pub use pipeline::TxPipeline;
