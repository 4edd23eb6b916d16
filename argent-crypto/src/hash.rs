//! Hashing algorithms for Argent.

use blake3::Hasher as Blake3Hasher;
use ripemd::Ripemd160;
use sha2::{Digest, Sha256};

use argent_types::{Hash, PubKeyHash};

/// Single BLAKE3 over the input.
pub fn hash256(data: &[u8]) -> Hash {
    blake3::hash(data).into()
}

/// Single SHA-256 over the input.
pub fn sha256(data: &[u8]) -> Hash {
    let digest = Sha256::digest(data);
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

/// SHA-256 followed by RIPEMD-160, the classic address-hash form.
pub fn hash160(data: &[u8]) -> PubKeyHash {
    let sha = Sha256::digest(data);
    let ripe = Ripemd160::digest(sha);
    let mut out = [0u8; 20];
    out.copy_from_slice(&ripe);
    out
}

/// Computes a merkle root over the given leaf hashes by pairwise BLAKE3.
///
/// An odd level duplicates its last element, so callers guarding against
/// mutated blocks must reject duplicate leaves themselves (the historical
/// duplicate-txid malleability).
pub fn merkle_root(leaves: &[Hash]) -> Hash {
    if leaves.is_empty() {
        return [0u8; 32];
    }
    let mut level: Vec<Hash> = leaves.to_vec();
    while level.len() > 1 {
        if level.len() % 2 == 1 {
            let last = *level.last().unwrap();
            level.push(last);
        }
        level = level
            .chunks(2)
            .map(|pair| {
                let mut hasher = Blake3Hasher::new();
                hasher.update(&pair[0]);
                hasher.update(&pair[1]);
                hasher.finalize().into()
            })
            .collect();
    }
    level[0]
}
