//! Cryptographic primitives for Argent.

pub mod hash;
pub mod keypair;
pub mod signature;

pub use hash::{hash160, hash256, merkle_root, sha256};
pub use keypair::ArgentKeyPair;
pub use signature::verify_signature;
