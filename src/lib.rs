//! Transaction construction engine for a personal Bitcoin wallet.
//!
//! Selects UTXOs for a sweep or a fixed transfer, estimates the miner fee
//! from a linear size model, disposes of change and sanity-checks the result
//! before it is handed to an external signer.

pub mod balance;
pub mod change;
pub mod config;
pub mod error;
pub mod fee;
pub mod selection;
pub mod source;
pub mod transaction;
pub mod types;
pub mod wallet;

pub use config::EngineConfig;
pub use error::{EngineError, Shortfall, SourceError};
pub use transaction::{Engine, sign_and_broadcast};
pub use types::{
    CandidateTransaction, ChangeDisposition, SelectionOrder, TransferMode, TransferRequest,
    TxOutput, UnspentOutput,
};
