//! Deterministic masternode payment selection.
//!
//! Every validator must agree on which masternode a block at a given height
//! owes its service reward to. Eligible nodes are ranked by the distance of a
//! per-node score from a per-height target, both derived from hashes every
//! node computes identically.

use primitive_types::U256;

use argent_types::{Amount, ConsensusParams, Hash, TxOutput};

use crate::registry::{MasternodeEntry, MasternodeId, MasternodeRegistry};

/// Score for a masternode at a selection point. The selection hash is the
/// hash of a recent block on the active chain (a fixed depth below the
/// payment height), so the ranking is stable across validators but changes
/// with the chain.
pub fn ranking_score(selection_hash: &Hash, id: &MasternodeId) -> U256 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(selection_hash);
    hasher.update(&id.0.txid);
    hasher.update(&id.0.vout.to_le_bytes());
    U256::from_big_endian(hasher.finalize().as_bytes())
}

/// Per-height target the scores are measured against.
fn height_target(height: u64) -> U256 {
    let digest = blake3::hash(&height.to_le_bytes());
    U256::from_big_endian(digest.as_bytes())
}

fn score_distance(score: U256, target: U256) -> U256 {
    if score > target {
        score - target
    } else {
        target - score
    }
}

fn is_eligible(entry: &MasternodeEntry, height: u64, now: u64, params: &ConsensusParams) -> bool {
    if now.saturating_sub(entry.registered_at) < params.masternode_min_active_seconds {
        return false;
    }
    if entry.last_paid_height != 0
        && height.saturating_sub(entry.last_paid_height) < params.masternode_payment_cooldown
    {
        return false;
    }
    true
}

/// Selects the payment winner for a block at `height`.
///
/// Returns `None` when no masternode is eligible, in which case the block
/// owes no service payment. Ties on distance resolve by collateral outpoint
/// ordering so the result is total.
pub fn winner_for_height(
    registry: &MasternodeRegistry,
    height: u64,
    selection_hash: &Hash,
    now: u64,
    params: &ConsensusParams,
) -> Option<MasternodeEntry> {
    let target = height_target(height);
    registry
        .iter()
        .filter(|entry| is_eligible(entry, height, now, params))
        .min_by(|a, b| {
            let da = score_distance(ranking_score(selection_hash, &a.id), target);
            let db = score_distance(ranking_score(selection_hash, &b.id), target);
            da.cmp(&db).then_with(|| a.id.cmp(&b.id))
        })
        .cloned()
}

/// Checks that a block's reward outputs pay the expected masternode amount to
/// the winner's payee script. Outputs to the winner script are summed so the
/// payment may be split, but the total must match exactly.
pub fn validate_payment(outputs: &[TxOutput], winner_payee_script: &[u8], expected: Amount) -> bool {
    let paid: Amount = outputs
        .iter()
        .filter(|out| out.script_pubkey == winner_payee_script)
        .map(|out| out.value)
        .sum();
    paid == expected
}
