//! Privacy-coin subsystem: denomination mints folded into per-denomination
//! RSA-style accumulators, with one-time serials preventing double spends.
//!
//! A mint burns a fixed face value and publishes a commitment; the commitment
//! is mapped into the accumulator's odd-number domain and folded into the
//! running accumulator for its denomination. A later spend proves membership
//! against a historical checkpoint of that accumulator and consumes a serial
//! that may never appear again.

pub mod accumulator;
pub mod error;
pub mod state;

pub use accumulator::{member_from_commitment, Accumulator, MembershipWitness};
pub use error::VeilError;
pub use state::{MintRecord, VeilState};
