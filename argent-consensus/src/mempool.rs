//! Transaction memory pool with a first-seen conflict rule.
//!
//! An outpoint (or veil serial) belongs to whichever acceptable transaction
//! claimed it first; later claimants are rejected outright, never replaced.
//! Entries leave the pool when a block confirms them or confirms a conflict.

use std::collections::HashMap;

use log::debug;

use argent_types::{Amount, Block, Hash, OutPoint, Transaction};

use crate::error::ConsensusError;

#[derive(Debug, Clone)]
pub struct MempoolEntry {
    pub tx: Transaction,
    pub fee: Amount,
    pub added_at: u64,
}

#[derive(Debug, Clone, Default)]
pub struct Mempool {
    entries: HashMap<Hash, MempoolEntry>,
    /// First-seen claims on outpoints.
    by_outpoint: HashMap<OutPoint, Hash>,
    /// First-seen claims on veil serials.
    by_serial: HashMap<Hash, Hash>,
}

impl Mempool {
    pub fn new() -> Self {
        Mempool::default()
    }

    /// Admits a transaction the caller has already validated. Enforces only
    /// the pool's own conflict rules.
    pub fn insert(&mut self, tx: Transaction, fee: Amount, now: u64) -> Result<(), ConsensusError> {
        let txid = tx.txid();
        if self.entries.contains_key(&txid) {
            return Err(ConsensusError::AlreadyInMempool(hex::encode(txid)));
        }
        for input in tx.inputs() {
            if self.by_outpoint.contains_key(&input.previous_output) {
                return Err(ConsensusError::MempoolConflict(input.previous_output.clone()));
            }
        }
        if let Some(spend) = tx.spend_payload() {
            if self.by_serial.contains_key(&spend.serial) {
                return Err(ConsensusError::BadVeilPayload(
                    "serial already claimed in the mempool".to_string(),
                ));
            }
        }

        for input in tx.inputs() {
            self.by_outpoint.insert(input.previous_output.clone(), txid);
        }
        if let Some(spend) = tx.spend_payload() {
            self.by_serial.insert(spend.serial, txid);
        }
        debug!("mempool accepted {}", hex::encode(txid));
        self.entries.insert(txid, MempoolEntry { tx, fee, added_at: now });
        Ok(())
    }

    pub fn contains(&self, txid: &Hash) -> bool {
        self.entries.contains_key(txid)
    }

    pub fn get(&self, txid: &Hash) -> Option<&MempoolEntry> {
        self.entries.get(txid)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Evicts everything a just-connected block confirmed, plus everything
    /// that conflicts with the block's claims.
    pub fn remove_confirmed(&mut self, block: &Block) {
        for tx in &block.transactions {
            self.remove(&tx.txid());
            for input in tx.inputs() {
                if let Some(conflicting) = self.by_outpoint.get(&input.previous_output).copied() {
                    self.remove(&conflicting);
                }
            }
            if let Some(spend) = tx.spend_payload() {
                if let Some(conflicting) = self.by_serial.get(&spend.serial).copied() {
                    self.remove(&conflicting);
                }
            }
        }
    }

    fn remove(&mut self, txid: &Hash) {
        if let Some(entry) = self.entries.remove(txid) {
            for input in entry.tx.inputs() {
                self.by_outpoint.remove(&input.previous_output);
            }
            if let Some(spend) = entry.tx.spend_payload() {
                self.by_serial.remove(&spend.serial);
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Hash, &MempoolEntry)> {
        self.entries.iter()
    }
}
