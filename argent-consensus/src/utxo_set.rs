//! UTXO set with transactional batches and per-block undo logs.
//!
//! Block connection stages every create and spend in a [`UtxoBatch`] overlay;
//! nothing touches the committed set until `commit_batch`, which applies the
//! whole batch atomically and returns the [`BlockUndo`] that can restore the
//! exact prior state on disconnect.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use argent_types::{Hash, OutPoint, Utxo};

use crate::error::ConsensusError;

/// Read access to unspent outputs, either the committed set or a batch view
/// layered over it.
pub trait UtxoView {
    fn utxo(&self, outpoint: &OutPoint) -> Option<Utxo>;
}

/// The committed set of unspent transaction outputs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UtxoSet {
    entries: HashMap<OutPoint, Utxo>,
}

impl UtxoSet {
    pub fn new() -> Self {
        UtxoSet { entries: HashMap::new() }
    }

    pub fn lookup(&self, outpoint: &OutPoint) -> Option<&Utxo> {
        self.entries.get(outpoint)
    }

    pub fn contains(&self, outpoint: &OutPoint) -> bool {
        self.entries.contains_key(outpoint)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of values locked under any of the given scripts.
    pub fn balance_for_scripts(&self, scripts: &[Vec<u8>]) -> u64 {
        self.entries
            .values()
            .filter(|utxo| scripts.iter().any(|s| *s == utxo.output.script_pubkey))
            .map(|utxo| utxo.output.value)
            .sum()
    }

    pub fn create(&mut self, outpoint: OutPoint, utxo: Utxo) -> Result<(), ConsensusError> {
        if self.entries.contains_key(&outpoint) {
            return Err(ConsensusError::DuplicateUtxo(outpoint));
        }
        self.entries.insert(outpoint, utxo);
        Ok(())
    }

    /// Removes an entry, returning it for the undo log.
    pub fn spend(&mut self, outpoint: &OutPoint) -> Result<Utxo, ConsensusError> {
        self.entries
            .remove(outpoint)
            .ok_or_else(|| ConsensusError::MissingUtxo(outpoint.clone()))
    }

    pub fn begin_batch(&self) -> UtxoBatch {
        UtxoBatch::default()
    }

    /// Applies a staged batch atomically, producing the undo log for the
    /// block it belongs to. The batch was validated against this same set,
    /// so failures here mean corrupt state, not bad input.
    pub fn commit_batch(
        &mut self,
        batch: UtxoBatch,
        block_hash: Hash,
    ) -> Result<BlockUndo, ConsensusError> {
        // Stage 1: verify the whole batch still applies cleanly, collecting
        // the entries it will consume.
        let mut spent = Vec::with_capacity(batch.spent.len());
        for outpoint in batch.spent.keys() {
            let consumed = self.entries.get(outpoint).cloned().ok_or_else(|| {
                ConsensusError::CorruptState(format!("batch spends missing utxo {outpoint}"))
            })?;
            spent.push((outpoint.clone(), consumed));
        }
        for outpoint in batch.created.keys() {
            if self.entries.contains_key(outpoint) && !batch.spent.contains_key(outpoint) {
                return Err(ConsensusError::CorruptState(format!(
                    "batch recreates existing utxo {outpoint}"
                )));
            }
        }
        // Stage 2: apply. No fallible operation below this line.
        for (outpoint, _) in &spent {
            self.entries.remove(outpoint);
        }
        let mut created = Vec::with_capacity(batch.created.len());
        for (outpoint, utxo) in batch.created {
            created.push(outpoint.clone());
            self.entries.insert(outpoint, utxo);
        }
        let undo = BlockUndo { block_hash, spent, created };
        debug!(
            "committed batch for block {}: {} spent, {} created",
            hex::encode(block_hash),
            undo.spent.len(),
            undo.created.len()
        );
        Ok(undo)
    }

    /// Restores the state from before the block recorded in `undo` was
    /// connected. A mismatch between the log and the committed set means the
    /// set is corrupt, and nothing is mutated in that case.
    pub fn apply_undo(&mut self, undo: &BlockUndo) -> Result<(), ConsensusError> {
        for outpoint in &undo.created {
            if !self.entries.contains_key(outpoint) {
                return Err(ConsensusError::UndoMismatch(format!(
                    "created utxo {outpoint} is absent"
                )));
            }
        }
        for (outpoint, _) in &undo.spent {
            if self.entries.contains_key(outpoint) {
                return Err(ConsensusError::UndoMismatch(format!(
                    "spent utxo {outpoint} is present"
                )));
            }
        }
        for outpoint in &undo.created {
            self.entries.remove(outpoint);
        }
        for (outpoint, utxo) in &undo.spent {
            self.entries.insert(outpoint.clone(), utxo.clone());
        }
        Ok(())
    }

    /// Deterministic serialized form: entries ordered by outpoint, so two
    /// sets with equal content produce identical bytes.
    pub fn snapshot(&self) -> Result<Vec<u8>, ConsensusError> {
        let ordered: BTreeMap<&OutPoint, &Utxo> = self.entries.iter().collect();
        Ok(bincode::serialize(&ordered)?)
    }

    pub fn save_to_disk<P: AsRef<Path>>(&self, path: P) -> Result<(), ConsensusError> {
        let bytes = self.snapshot()?;
        std::fs::write(&path, bytes).map_err(|e| ConsensusError::Io(e.to_string()))?;
        info!("utxo set saved, {} entries", self.entries.len());
        Ok(())
    }

    pub fn load_from_disk<P: AsRef<Path>>(path: P) -> Result<Self, ConsensusError> {
        let bytes = std::fs::read(&path).map_err(|e| ConsensusError::Io(e.to_string()))?;
        let ordered: BTreeMap<OutPoint, Utxo> = bincode::deserialize(&bytes)?;
        info!("utxo set loaded, {} entries", ordered.len());
        Ok(UtxoSet { entries: ordered.into_iter().collect() })
    }
}

impl UtxoView for UtxoSet {
    fn utxo(&self, outpoint: &OutPoint) -> Option<Utxo> {
        self.lookup(outpoint).cloned()
    }
}

/// Staged creates and spends for one block. Nothing is visible in the
/// committed set until the batch commits; dropping the batch rolls it back.
#[derive(Debug, Clone, Default)]
pub struct UtxoBatch {
    created: BTreeMap<OutPoint, Utxo>,
    spent: BTreeMap<OutPoint, Utxo>,
}

impl UtxoBatch {
    /// Read-through view: staged creates first, then the base set minus
    /// staged spends.
    pub fn utxo(&self, base: &UtxoSet, outpoint: &OutPoint) -> Option<Utxo> {
        if let Some(utxo) = self.created.get(outpoint) {
            return Some(utxo.clone());
        }
        if self.spent.contains_key(outpoint) {
            return None;
        }
        base.lookup(outpoint).cloned()
    }

    pub fn create(&mut self, outpoint: OutPoint, utxo: Utxo) -> Result<(), ConsensusError> {
        if self.created.contains_key(&outpoint) {
            return Err(ConsensusError::DuplicateUtxo(outpoint));
        }
        self.created.insert(outpoint, utxo);
        Ok(())
    }

    /// Stages a spend, returning the consumed entry.
    pub fn spend(&mut self, base: &UtxoSet, outpoint: &OutPoint) -> Result<Utxo, ConsensusError> {
        // An output created earlier in the same block may be spent by a
        // later transaction in it.
        if let Some(utxo) = self.created.remove(outpoint) {
            return Ok(utxo);
        }
        if self.spent.contains_key(outpoint) {
            return Err(ConsensusError::MissingUtxo(outpoint.clone()));
        }
        let utxo = base
            .lookup(outpoint)
            .cloned()
            .ok_or_else(|| ConsensusError::MissingUtxo(outpoint.clone()))?;
        self.spent.insert(outpoint.clone(), utxo.clone());
        Ok(utxo)
    }

    /// All outpoints this batch spends from the committed set.
    pub fn spent_outpoints(&self) -> impl Iterator<Item = &OutPoint> {
        self.spent.keys()
    }
}

/// A batch view layered over a base set, usable wherever a [`UtxoView`] is
/// expected.
pub struct BatchView<'a> {
    pub base: &'a UtxoSet,
    pub batch: &'a UtxoBatch,
}

impl UtxoView for BatchView<'_> {
    fn utxo(&self, outpoint: &OutPoint) -> Option<Utxo> {
        self.batch.utxo(self.base, outpoint)
    }
}

/// Undo log for one connected block: the entries it consumed (in spend
/// order) and the outpoints it created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockUndo {
    pub block_hash: Hash,
    pub spent: Vec<(OutPoint, Utxo)>,
    pub created: Vec<OutPoint>,
}
