//! The masternode registry: the set of announced, collateral-backed service
//! nodes, keyed by collateral outpoint.

use std::collections::BTreeMap;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use argent_crypto::verify_signature;
use argent_types::{ConsensusParams, OutPoint, PublicKey};

use crate::error::MasternodeError;

/// Unique identifier for a masternode, derived from its collateral outpoint.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MasternodeId(pub OutPoint);

impl std::fmt::Display for MasternodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<OutPoint> for MasternodeId {
    fn from(outpoint: OutPoint) -> Self {
        MasternodeId(outpoint)
    }
}

/// A registration broadcast, signed by the node's operator key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasternodeAnnounce {
    pub collateral: OutPoint,
    /// The script the winner payment must go to (the collateral script).
    pub payee_script: Vec<u8>,
    pub operator_pubkey: PublicKey,
    /// IP:port the node services from.
    pub service_address: String,
    pub protocol_version: u32,
    pub signed_at: u64,
    pub signature: Vec<u8>,
}

impl MasternodeAnnounce {
    /// The message the operator signs: the announce with the signature field
    /// cleared.
    pub fn signing_message(&self) -> Result<Vec<u8>, MasternodeError> {
        let mut unsigned = self.clone();
        unsigned.signature = Vec::new();
        Ok(bincode::serialize(&unsigned)?)
    }
}

/// A liveness refresh, signed by the operator key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasternodePing {
    pub collateral: OutPoint,
    pub ping_time: u64,
    pub signature: Vec<u8>,
}

impl MasternodePing {
    pub fn signing_message(&self) -> Result<Vec<u8>, MasternodeError> {
        let mut unsigned = self.clone();
        unsigned.signature = Vec::new();
        Ok(bincode::serialize(&unsigned)?)
    }
}

/// A registered masternode and its activity/payment bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasternodeEntry {
    pub id: MasternodeId,
    pub payee_script: Vec<u8>,
    pub operator_pubkey: PublicKey,
    pub service_address: String,
    pub protocol_version: u32,
    /// When the node's announce was accepted.
    pub registered_at: u64,
    /// Last accepted ping time; entries expire without refreshes.
    pub last_ping: u64,
    /// Height of the node's most recent confirmed payment, 0 if never paid.
    pub last_paid_height: u64,
}

/// The registry of active masternodes, keyed by collateral outpoint.
///
/// Keys are ordered so that serialized snapshots are deterministic, which
/// the reorg machinery relies on for byte-exact restore checks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasternodeRegistry {
    entries: BTreeMap<MasternodeId, MasternodeEntry>,
}

impl MasternodeRegistry {
    pub fn new() -> Self {
        MasternodeRegistry { entries: BTreeMap::new() }
    }

    /// Processes a registration broadcast. The caller resolves the collateral
    /// outpoint and passes its value; registration requires exactly the
    /// network collateral amount locked there.
    pub fn register(
        &mut self,
        announce: MasternodeAnnounce,
        collateral_value: u64,
        params: &ConsensusParams,
    ) -> Result<(), MasternodeError> {
        let id = MasternodeId(announce.collateral.clone());
        if self.entries.contains_key(&id) {
            return Err(MasternodeError::AlreadyRegistered(id));
        }
        if collateral_value != params.masternode_collateral {
            return Err(MasternodeError::WrongCollateral {
                got: collateral_value,
                required: params.masternode_collateral,
            });
        }
        let message = announce.signing_message()?;
        if !verify_signature(&announce.operator_pubkey, &message, &announce.signature) {
            return Err(MasternodeError::BadAnnounceSignature(id));
        }
        info!("masternode {} registered at {}", id, announce.service_address);
        let entry = MasternodeEntry {
            id: id.clone(),
            payee_script: announce.payee_script,
            operator_pubkey: announce.operator_pubkey,
            service_address: announce.service_address,
            protocol_version: announce.protocol_version,
            registered_at: announce.signed_at,
            last_ping: announce.signed_at,
            last_paid_height: 0,
        };
        self.entries.insert(id, entry);
        Ok(())
    }

    /// Refreshes a node's liveness from a signed ping.
    pub fn process_ping(&mut self, ping: &MasternodePing) -> Result<(), MasternodeError> {
        let id = MasternodeId(ping.collateral.clone());
        let message = ping.signing_message()?;
        let entry = self
            .entries
            .get_mut(&id)
            .ok_or_else(|| MasternodeError::NotFound(id.clone()))?;
        if !verify_signature(&entry.operator_pubkey, &message, &ping.signature) {
            return Err(MasternodeError::BadPingSignature(id));
        }
        if ping.ping_time <= entry.last_ping {
            return Err(MasternodeError::StalePing(ping.ping_time));
        }
        entry.last_ping = ping.ping_time;
        Ok(())
    }

    /// Drops entries that have not been refreshed within the expiry window.
    /// Expiry never retroactively invalidates past payment decisions.
    pub fn remove_expired(&mut self, now: u64, params: &ConsensusParams) -> Vec<MasternodeEntry> {
        let expired: Vec<MasternodeId> = self
            .entries
            .values()
            .filter(|e| now.saturating_sub(e.last_ping) > params.masternode_expiry_seconds)
            .map(|e| e.id.clone())
            .collect();
        expired
            .into_iter()
            .filter_map(|id| {
                debug!("masternode {} expired", id);
                self.entries.remove(&id)
            })
            .collect()
    }

    /// Removes the masternode whose collateral was just spent on-chain.
    /// Returns the removed entry for the block's undo log.
    pub fn on_collateral_spent(&mut self, outpoint: &OutPoint) -> Option<MasternodeEntry> {
        let removed = self.entries.remove(&MasternodeId(outpoint.clone()));
        if let Some(entry) = &removed {
            info!("masternode {} removed, collateral spent", entry.id);
        }
        removed
    }

    /// Records a confirmed payment, returning the previous last-paid height
    /// for the undo log.
    pub fn note_paid(&mut self, id: &MasternodeId, height: u64) -> Option<u64> {
        let entry = self.entries.get_mut(id)?;
        let previous = entry.last_paid_height;
        entry.last_paid_height = height;
        Some(previous)
    }

    /// Restores a last-paid height recorded by `note_paid`, used when a
    /// block is disconnected.
    pub fn restore_last_paid(&mut self, id: &MasternodeId, previous: u64) {
        if let Some(entry) = self.entries.get_mut(id) {
            entry.last_paid_height = previous;
        }
    }

    /// Reinserts an entry removed by `on_collateral_spent` during a reorg.
    pub fn reinsert(&mut self, entry: MasternodeEntry) {
        self.entries.insert(entry.id.clone(), entry);
    }

    pub fn get(&self, id: &MasternodeId) -> Option<&MasternodeEntry> {
        self.entries.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &MasternodeEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serialized snapshot, used for persistence and for the byte-identical
    /// restore checks in the reorg tests.
    pub fn snapshot(&self) -> Result<Vec<u8>, MasternodeError> {
        Ok(bincode::serialize(self)?)
    }
}
