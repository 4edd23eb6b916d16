//! Proof-of-stake kernel validation.
//!
//! A coinstake proves that the staker's chosen UTXO hashes below a target
//! scaled by the stake's value and age. The kernel hash binds the chain's
//! stake modifier so stakers cannot grind future kernels offline.

use log::debug;
use primitive_types::U256;

use argent_types::{Amount, ConsensusParams, Hash, OutPoint, Utxo, COIN};

use crate::error::ConsensusError;

/// Expands a compact-encoded target. Returns zero for a negative or
/// overflowing encoding, which no hash can satisfy.
pub fn compact_to_target(bits: u32) -> U256 {
    let exponent = (bits >> 24) as usize;
    let mantissa = bits & 0x007f_ffff;
    if bits & 0x0080_0000 != 0 || mantissa == 0 {
        return U256::zero();
    }
    if exponent <= 3 {
        U256::from(mantissa >> (8 * (3 - exponent)))
    } else if exponent > 34 {
        // Would shift past 256 bits.
        U256::zero()
    } else {
        U256::from(mantissa) << (8 * (exponent - 3))
    }
}

/// Expected work to find a hash under the target, for cumulative chain
/// weight comparison.
pub fn work_from_bits(bits: u32) -> U256 {
    let target = compact_to_target(bits);
    if target.is_zero() {
        return U256::zero();
    }
    match target.checked_add(U256::one()) {
        Some(divisor) => U256::MAX / divisor + U256::one(),
        None => U256::one(),
    }
}

/// Folds the next per-block stake modifier out of the parent's modifier and
/// the parent block hash.
pub fn next_stake_modifier(parent_modifier: u64, parent_hash: &Hash) -> u64 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&parent_modifier.to_le_bytes());
    hasher.update(parent_hash);
    let digest = hasher.finalize();
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest.as_bytes()[..8]);
    u64::from_le_bytes(bytes)
}

/// The kernel hash: modifier, then the stake output's creation time, its
/// outpoint, and the block time.
pub fn kernel_hash(
    stake_modifier: u64,
    stake_utxo_time: u64,
    prevout: &OutPoint,
    block_time: u64,
) -> Hash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&stake_modifier.to_le_bytes());
    hasher.update(&stake_utxo_time.to_le_bytes());
    hasher.update(&prevout.vout.to_le_bytes());
    hasher.update(&prevout.txid);
    hasher.update(&block_time.to_le_bytes());
    *hasher.finalize().as_bytes()
}

/// The stake target: the per-coin-day base target scaled by the staked
/// value and its capped age. `None` means the multiplication overflowed,
/// in which case every kernel hash is under the target (minimal-difficulty
/// networks rely on this).
pub fn stake_target(bits: u32, value: Amount, weight_seconds: u64) -> Option<U256> {
    let base = compact_to_target(bits);
    base.checked_mul(U256::from(value))
        .and_then(|t| t.checked_mul(U256::from(weight_seconds)))
        .map(|t| t / U256::from(COIN) / U256::from(400u64))
}

/// Full kernel check for a coinstake's stake input.
///
/// `stake_utxo_time` is the timestamp of the block that created the staked
/// output; `tip_height` is the height of the block under validation. The
/// coinstake's timestamp is the block timestamp, already enforced by the
/// caller's block shape checks.
#[allow(clippy::too_many_arguments)]
pub fn check_proof_of_stake(
    prevout: &OutPoint,
    stake_utxo: &Utxo,
    stake_utxo_time: u64,
    stake_modifier: u64,
    block_time: u64,
    bits: u32,
    tip_height: u64,
    params: &ConsensusParams,
) -> Result<(), ConsensusError> {
    let depth = tip_height.saturating_sub(stake_utxo.creation_height);
    if depth < params.min_stake_depth {
        return Err(ConsensusError::InvalidProofOfStake(format!(
            "stake depth {depth} below minimum {}",
            params.min_stake_depth
        )));
    }
    if stake_utxo.output.value < params.min_stake_value {
        return Err(ConsensusError::InvalidProofOfStake(format!(
            "stake value {} below minimum {}",
            stake_utxo.output.value, params.min_stake_value
        )));
    }
    if block_time < stake_utxo_time {
        return Err(ConsensusError::InvalidProofOfStake(
            "block time precedes the stake's creation time".to_string(),
        ));
    }

    let weight = (block_time - stake_utxo_time).min(params.max_coin_age_weight);
    let hash = kernel_hash(stake_modifier, stake_utxo_time, prevout, block_time);
    match stake_target(bits, stake_utxo.output.value, weight) {
        // Overflowed target: every hash qualifies.
        None => Ok(()),
        Some(target) => {
            let hash_value = U256::from_big_endian(&hash);
            if hash_value < target {
                debug!("kernel accepted for {}", prevout);
                Ok(())
            } else {
                Err(ConsensusError::InvalidProofOfStake(
                    "kernel hash does not meet the stake target".to_string(),
                ))
            }
        }
    }
}
