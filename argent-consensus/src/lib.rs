//! Consensus engine: transaction and block validation, the UTXO set, the
//! stake kernel, mempool policy and chain-state management with
//! reorganization support.
//!
//! The entry point is [`ChainManager`], the single-writer owner of all
//! chain state. Blocks are offered through [`ChainManager::accept_block`]
//! and loose transactions through [`ChainManager::accept_transaction`];
//! everything else here is the machinery those two paths use.

pub mod chain;
pub mod error;
pub mod kernel;
pub mod mempool;
pub mod script;
pub mod utxo_set;
pub mod validation;

pub use chain::{
    BlockDisposition, BlockIndexEntry, BlockStatus, ChainManager, ChainTip, MintStatus,
};
pub use error::{ConsensusError, RejectionKind};
pub use kernel::{check_proof_of_stake, kernel_hash, next_stake_modifier, stake_target};
pub use mempool::{Mempool, MempoolEntry};
pub use script::{signature_message, verify_script};
pub use utxo_set::{BatchView, BlockUndo, UtxoBatch, UtxoSet, UtxoView};
pub use validation::{check_block_syntactic, check_transaction_syntactic, TxContext, TxValidationState};
