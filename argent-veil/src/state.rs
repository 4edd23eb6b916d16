//! Chain-level veil state: per-denomination accumulators, per-height
//! checkpoints, the mint ledger and the consumed-serial set.
//!
//! Every container is ordered so serialized snapshots are deterministic; the
//! reorg machinery compares snapshots byte for byte after a disconnect.

use std::collections::{BTreeMap, BTreeSet};

use log::{debug, warn};
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

use argent_types::veil::{SpendPayload, VeilDenomination};
use argent_types::{ConsensusParams, Hash};

use crate::accumulator::{member_from_commitment, parse_modulus, Accumulator, MembershipWitness};
use crate::error::VeilError;

/// One accepted mint: its commitment, the height it confirmed at and the
/// height whose connect folded it into its denomination's accumulator.
/// `folded_at` stays `None` while the mint is still maturing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintRecord {
    pub commitment: Hash,
    pub height: u64,
    pub folded_at: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VeilState {
    modulus_hex: String,
    /// Mints per denomination, in fold-in order.
    mints: BTreeMap<VeilDenomination, Vec<MintRecord>>,
    /// Running accumulator value per denomination, big-endian bytes.
    accumulators: BTreeMap<VeilDenomination, Vec<u8>>,
    /// Published per-height snapshots of the accumulator values. Never
    /// rewritten once stored; disconnects remove them whole.
    checkpoints: BTreeMap<u64, BTreeMap<VeilDenomination, Vec<u8>>>,
    /// Every consumed one-time serial, across all history.
    spent_serials: BTreeSet<Hash>,
}

impl VeilState {
    pub fn new(params: &ConsensusParams) -> Result<Self, VeilError> {
        let modulus = parse_modulus(&params.accumulator_modulus_hex)?;
        let mut accumulators = BTreeMap::new();
        let mut mints = BTreeMap::new();
        for denom in &params.veil_denominations {
            accumulators.insert(*denom, Accumulator::new(modulus.clone()).value_bytes());
            mints.insert(*denom, Vec::new());
        }
        Ok(VeilState {
            modulus_hex: params.accumulator_modulus_hex.clone(),
            mints,
            accumulators,
            checkpoints: BTreeMap::new(),
            spent_serials: BTreeSet::new(),
        })
    }

    fn modulus(&self) -> BigUint {
        // The hex was validated at construction.
        parse_modulus(&self.modulus_hex).unwrap_or_else(|_| BigUint::from(1u32))
    }

    /// Records a newly confirmed mint. The commitment enters the ledger
    /// immediately but joins its accumulator only once it matures; see
    /// [`VeilState::record_checkpoint`].
    pub fn apply_mint(
        &mut self,
        denomination: VeilDenomination,
        commitment: Hash,
        height: u64,
    ) -> Result<(), VeilError> {
        self.mints
            .get_mut(&denomination)
            .ok_or(VeilError::UnsupportedDenomination(denomination))?
            .push(MintRecord { commitment, height, folded_at: None });
        debug!("veil mint {} recorded at height {}", hex::encode(commitment), height);
        Ok(())
    }

    /// Folds every mint that matured by `height` into its accumulator.
    /// A mint matures once it is buried `veil_mint_maturity` deep and at
    /// least `veil_min_subsequent_mints` later mints of the same
    /// denomination exist.
    fn fold_matured(&mut self, height: u64, params: &ConsensusParams) -> Result<(), VeilError> {
        let modulus = self.modulus();
        for (denomination, records) in self.mints.iter_mut() {
            let heights: Vec<u64> = records.iter().map(|r| r.height).collect();
            let mut folded = Vec::new();
            for record in records.iter_mut() {
                if record.folded_at.is_some() {
                    continue;
                }
                if height.saturating_sub(record.height) < params.veil_mint_maturity {
                    continue;
                }
                let subsequent =
                    heights.iter().filter(|h| **h > record.height).count() as u64;
                if subsequent < params.veil_min_subsequent_mints {
                    continue;
                }
                record.folded_at = Some(height);
                folded.push(member_from_commitment(&record.commitment));
                debug!(
                    "veil mint {} matured into the accumulator at height {}",
                    hex::encode(record.commitment),
                    height
                );
            }
            if !folded.is_empty() {
                let value = self
                    .accumulators
                    .get_mut(denomination)
                    .ok_or(VeilError::UnsupportedDenomination(*denomination))?;
                let mut acc = Accumulator::from_value_bytes(modulus.clone(), value.as_slice());
                for member in &folded {
                    acc.accumulate(member);
                }
                *value = acc.value_bytes();
            }
        }
        Ok(())
    }

    /// Drains the maturity queue for a just-connected block and publishes
    /// its checkpoint. Only matured mints are ever part of a published
    /// checkpoint, so accumulator membership itself implies spendability.
    pub fn record_checkpoint(
        &mut self,
        height: u64,
        params: &ConsensusParams,
    ) -> Result<(), VeilError> {
        if self.checkpoints.contains_key(&height) {
            warn!("checkpoint at height {} already published, keeping it", height);
            return Ok(());
        }
        self.fold_matured(height, params)?;
        self.checkpoints.insert(height, self.accumulators.clone());
        Ok(())
    }

    /// Digest of the checkpoint at a height, the value headers commit to.
    pub fn checkpoint_digest(&self, height: u64) -> Result<Hash, VeilError> {
        let checkpoint = self
            .checkpoints
            .get(&height)
            .ok_or(VeilError::UnknownCheckpoint(height))?;
        let encoded = bincode::serialize(checkpoint)?;
        Ok(*blake3::hash(&encoded).as_bytes())
    }

    pub fn is_serial_spent(&self, serial: &Hash) -> bool {
        self.spent_serials.contains(serial)
    }

    pub fn mint_count(&self, denomination: VeilDenomination) -> u64 {
        self.mints.get(&denomination).map(|m| m.len() as u64).unwrap_or(0)
    }

    /// Ledger record for a single commitment, with its denomination.
    pub fn mint_record(&self, commitment: &Hash) -> Option<(VeilDenomination, &MintRecord)> {
        for (denomination, records) in &self.mints {
            if let Some(record) = records.iter().find(|r| &r.commitment == commitment) {
                return Some((*denomination, record));
            }
        }
        None
    }

    /// Full spend verification against committed state. Checks, in order:
    /// the serial is fresh, the referenced checkpoint exists, the proven
    /// mint was mature at the reference height, and the membership witness
    /// opens the checkpointed accumulator.
    pub fn validate_spend(
        &self,
        spend: &SpendPayload,
        params: &ConsensusParams,
    ) -> Result<(), VeilError> {
        if !params.veil_denominations.contains(&spend.denomination) {
            return Err(VeilError::UnsupportedDenomination(spend.denomination));
        }
        if self.is_serial_spent(&spend.serial) {
            return Err(VeilError::SerialAlreadySpent(hex::encode(spend.serial)));
        }
        let checkpoint = self
            .checkpoints
            .get(&spend.reference_height)
            .ok_or(VeilError::UnknownCheckpoint(spend.reference_height))?;
        let checkpoint_value = checkpoint
            .get(&spend.denomination)
            .ok_or(VeilError::UnsupportedDenomination(spend.denomination))?;

        let member = BigUint::from_bytes_be(&spend.member);
        let records = self
            .mints
            .get(&spend.denomination)
            .ok_or(VeilError::UnsupportedDenomination(spend.denomination))?;
        let record = records
            .iter()
            .find(|r| {
                r.height <= spend.reference_height
                    && member_from_commitment(&r.commitment) == member
            })
            .ok_or(VeilError::UnknownMember)?;

        if spend.reference_height.saturating_sub(record.height) < params.veil_mint_maturity {
            return Err(VeilError::ImmatureMint {
                mint_height: record.height,
                reference_height: spend.reference_height,
            });
        }
        let subsequent = records
            .iter()
            .filter(|r| r.height > record.height && r.height <= spend.reference_height)
            .count() as u64;
        if subsequent < params.veil_min_subsequent_mints {
            return Err(VeilError::InsufficientSubsequentMints {
                have: subsequent,
                need: params.veil_min_subsequent_mints,
            });
        }

        let modulus = self.modulus();
        let witness = MembershipWitness::from_bytes(&spend.witness);
        let acc_value = BigUint::from_bytes_be(checkpoint_value);
        if !witness.verifies(&member, &acc_value, &modulus) {
            return Err(VeilError::BadWitness);
        }
        Ok(())
    }

    /// Consumes a spend's serial. Call only after `validate_spend`.
    pub fn apply_spend(&mut self, spend: &SpendPayload) -> Result<(), VeilError> {
        if !self.spent_serials.insert(spend.serial) {
            return Err(VeilError::SerialAlreadySpent(hex::encode(spend.serial)));
        }
        Ok(())
    }

    /// Releases a serial back when the block that consumed it disconnects.
    pub fn remove_serial(&mut self, serial: &Hash) -> Result<(), VeilError> {
        if !self.spent_serials.remove(serial) {
            return Err(VeilError::UnknownSerial(hex::encode(*serial)));
        }
        Ok(())
    }

    /// Rolls mints, accumulators and checkpoints back so the last connected
    /// height is `height`. Consumed serials are restored separately from the
    /// block undo data, which knows which serials each block spent.
    pub fn disconnect_to(&mut self, height: u64) -> Result<(), VeilError> {
        for records in self.mints.values_mut() {
            records.retain(|r| r.height <= height);
            // Mints that survive but were folded above the fork go back to
            // maturing.
            for record in records.iter_mut() {
                if matches!(record.folded_at, Some(h) if h > height) {
                    record.folded_at = None;
                }
            }
        }
        self.checkpoints.retain(|h, _| *h <= height);
        match self.checkpoints.get(&height) {
            Some(snapshot) => self.accumulators = snapshot.clone(),
            None => {
                // Back before the first checkpoint: reset to the empty
                // accumulators.
                let modulus = self.modulus();
                for value in self.accumulators.values_mut() {
                    *value = Accumulator::new(modulus.clone()).value_bytes();
                }
            }
        }
        Ok(())
    }

    /// Builds the membership witness for one of this state's own mints,
    /// against the checkpoint at `reference_height`. Wallet-side helper.
    pub fn witness_for(
        &self,
        denomination: VeilDenomination,
        commitment: &Hash,
        reference_height: u64,
    ) -> Result<Vec<u8>, VeilError> {
        if !self.checkpoints.contains_key(&reference_height) {
            return Err(VeilError::UnknownCheckpoint(reference_height));
        }
        let records = self
            .mints
            .get(&denomination)
            .ok_or(VeilError::UnsupportedDenomination(denomination))?;
        let target = member_from_commitment(commitment);
        let members: Vec<BigUint> = records
            .iter()
            .filter(|r| matches!(r.folded_at, Some(h) if h <= reference_height))
            .map(|r| member_from_commitment(&r.commitment))
            .collect();
        if !members.contains(&target) {
            // Distinguish a mint that exists but has not matured into the
            // referenced checkpoint from one this state never saw.
            if let Some(record) = records.iter().find(|r| &r.commitment == commitment) {
                return Err(VeilError::ImmatureMint {
                    mint_height: record.height,
                    reference_height,
                });
            }
            return Err(VeilError::UnknownMember);
        }
        let modulus = self.modulus();
        let witness = Accumulator::witness_for(&modulus, members.iter(), &target);
        Ok(witness.to_bytes())
    }

    /// Replays every folded mint from scratch and checks each stored
    /// checkpoint against the replayed accumulator values. A mismatch means
    /// the stored state is corrupt.
    pub fn verify_checkpoints(&self) -> Result<(), VeilError> {
        let modulus = self.modulus();
        let mut replay: BTreeMap<VeilDenomination, Accumulator> = self
            .accumulators
            .keys()
            .map(|d| (*d, Accumulator::new(modulus.clone())))
            .collect();

        // Folded mints across denominations, ordered by fold-in height.
        let mut pending: Vec<(u64, VeilDenomination, Hash)> = Vec::new();
        for (denom, records) in &self.mints {
            for record in records {
                if let Some(folded_at) = record.folded_at {
                    pending.push((folded_at, *denom, record.commitment));
                }
            }
        }
        pending.sort();
        let mut next = pending.into_iter().peekable();

        for (height, checkpoint) in &self.checkpoints {
            while let Some((_, denom, commitment)) = next.next_if(|(h, _, _)| h <= height) {
                if let Some(acc) = replay.get_mut(&denom) {
                    acc.accumulate(&member_from_commitment(&commitment));
                }
            }
            for (denom, stored) in checkpoint {
                let replayed = replay
                    .get(denom)
                    .map(Accumulator::value_bytes)
                    .unwrap_or_default();
                if &replayed != stored {
                    return Err(VeilError::CheckpointMismatch {
                        height: *height,
                        denomination: *denom,
                    });
                }
            }
        }
        Ok(())
    }

    /// Deterministic serialized snapshot of the whole veil state.
    pub fn snapshot(&self) -> Result<Vec<u8>, VeilError> {
        Ok(bincode::serialize(self)?)
    }
}
