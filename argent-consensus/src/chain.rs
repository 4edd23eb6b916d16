//! Chain state management: the block index, best-chain selection and
//! reorganization.
//!
//! Candidate blocks move through `Received → HeaderValid → FullyValid`;
//! full validation and state mutation happen only when a block lands on the
//! (potential) best chain. Every connected block leaves an undo record, and
//! a failed reorganization restores the original tip byte-exactly from
//! those records before the offending branch is marked invalid.

use std::collections::{BTreeMap, HashMap, HashSet};

use log::{debug, info, warn};
use primitive_types::U256;

use argent_crypto::verify_signature;
use argent_masternode::{
    winner_for_height, validate_payment, MasternodeAnnounce, MasternodeEntry, MasternodeId,
    MasternodePing, MasternodeRegistry,
};
use argent_types::veil::{SpendPayload, VeilDenomination};
use argent_types::{
    Amount, Block, BlockHeader, ConsensusParams, Hash, OutPoint, Transaction, Utxo,
};
use argent_veil::VeilState;

use crate::error::ConsensusError;
use crate::kernel::{check_proof_of_stake, next_stake_modifier, work_from_bits};
use crate::mempool::Mempool;
use crate::script::{extract_pubkey, is_data_carrier};
use crate::utxo_set::{BatchView, BlockUndo, UtxoSet};
use crate::validation::{
    check_block_syntactic, median_time_past, TxContext, TxValidationState,
};

/// Most blocks held while waiting for a missing parent. At the cap the
/// first-keyed entry is evicted; a well-behaved peer redelivers.
const MAX_ORPHAN_BLOCKS: usize = 64;

/// Validation status of an indexed block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockStatus {
    /// Header rules passed; the block body has not been connected.
    HeaderValid,
    /// Fully validated and connected at least once.
    FullyValid,
    /// Permanently rejected, along with every descendant.
    Invalid,
}

/// One entry in the block index arena. Entries persist for side branches so
/// reorganizations can be evaluated without re-downloading anything.
#[derive(Debug, Clone)]
pub struct BlockIndexEntry {
    pub hash: Hash,
    pub header: BlockHeader,
    pub height: u64,
    /// Cumulative expected work of the chain ending here.
    pub chain_work: U256,
    /// Stake modifier bound by kernels in this block.
    pub stake_modifier: u64,
    pub status: BlockStatus,
}

/// Where an accepted block ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockDisposition {
    /// The block is the new active tip.
    ActiveTip,
    /// Stored on a side branch; the active chain did not change.
    SideChain,
}

/// Snapshot of the active tip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainTip {
    pub hash: Hash,
    pub height: u64,
    pub chain_work: U256,
}

/// Wallet-facing view of one recorded mint at the current tip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MintStatus {
    pub denomination: VeilDenomination,
    pub mint_height: u64,
    /// Blocks buried under the tip.
    pub depth: u64,
    /// Whether the commitment has been folded into a published checkpoint
    /// and can therefore be proven and spent.
    pub mature: bool,
}

/// Everything needed to take one connected block back off the chain.
#[derive(Debug, Clone)]
struct ConnectUndo {
    utxo: BlockUndo,
    /// Winner paid by this block and their previous last-paid height.
    paid: Option<(MasternodeId, u64)>,
    /// Masternodes dropped because this block spent their collateral.
    removed_masternodes: Vec<MasternodeEntry>,
    /// Serials this block consumed.
    serials: Vec<Hash>,
}

/// The single-writer chain state manager. Callers needing shared access
/// wrap it in the usual `Arc<RwLock<_>>`.
pub struct ChainManager {
    params: ConsensusParams,
    index: HashMap<Hash, BlockIndexEntry>,
    blocks: HashMap<Hash, Block>,
    undo_logs: HashMap<Hash, ConnectUndo>,
    /// Active chain, indexed by height.
    active: Vec<Hash>,
    utxos: UtxoSet,
    masternodes: MasternodeRegistry,
    veil: VeilState,
    /// Blocks waiting for an unknown parent, keyed by that parent. Bounded
    /// by [`MAX_ORPHAN_BLOCKS`].
    orphans: BTreeMap<Hash, Vec<Block>>,
    mempool: Mempool,
}

impl ChainManager {
    /// Bootstraps the chain from its genesis block. Genesis is connected
    /// as-is: its outputs enter the UTXO set without transaction checks.
    pub fn new(params: ConsensusParams, genesis: Block) -> Result<Self, ConsensusError> {
        if genesis.header.height != 0 || genesis.header.previous_block_hash != [0u8; 32] {
            return Err(ConsensusError::InvalidHeader(
                "genesis must be at height zero with a null parent".to_string(),
            ));
        }
        if genesis.transactions.is_empty() || !genesis.transactions[0].is_coinbase() {
            return Err(ConsensusError::BadCoinbase(
                "genesis must start with a coinbase".to_string(),
            ));
        }
        let hash = genesis.hash();
        let mut utxos = UtxoSet::new();
        for tx in &genesis.transactions {
            let txid = tx.txid();
            for (vout, output) in tx.outputs().iter().enumerate() {
                if output.value == 0 || is_data_carrier(&output.script_pubkey) {
                    continue;
                }
                let mut utxo = Utxo::new(output.clone(), 0);
                utxo.is_coinbase = tx.is_coinbase();
                utxos.create(OutPoint::new(txid, vout as u32), utxo)?;
            }
        }
        let mut veil = VeilState::new(&params)?;
        veil.record_checkpoint(0, &params)?;

        let entry = BlockIndexEntry {
            hash,
            header: genesis.header.clone(),
            height: 0,
            chain_work: work_from_bits(genesis.header.bits),
            stake_modifier: 0,
            status: BlockStatus::FullyValid,
        };
        let mut index = HashMap::new();
        index.insert(hash, entry);
        let mut blocks = HashMap::new();
        blocks.insert(hash, genesis);
        info!("chain initialized at genesis {}", hex::encode(hash));
        Ok(ChainManager {
            params,
            index,
            blocks,
            undo_logs: HashMap::new(),
            active: vec![hash],
            utxos,
            masternodes: MasternodeRegistry::new(),
            veil,
            orphans: BTreeMap::new(),
            mempool: Mempool::new(),
        })
    }

    pub fn params(&self) -> &ConsensusParams {
        &self.params
    }

    // ---- read model -----------------------------------------------------

    pub fn get_utxo(&self, outpoint: &OutPoint) -> Option<Utxo> {
        self.utxos.lookup(outpoint).cloned()
    }

    pub fn get_balance_for_scripts(&self, scripts: &[Vec<u8>]) -> Amount {
        self.utxos.balance_for_scripts(scripts)
    }

    pub fn get_chain_tip(&self) -> ChainTip {
        // The active chain always holds at least genesis.
        let hash = *self.active.last().unwrap_or(&[0u8; 32]);
        let (height, chain_work) = self
            .index
            .get(&hash)
            .map(|e| (e.height, e.chain_work))
            .unwrap_or((0, U256::zero()));
        ChainTip { hash, height, chain_work }
    }

    pub fn get_masternode_list(&self) -> Vec<MasternodeEntry> {
        self.masternodes.iter().cloned().collect()
    }

    /// Status of a single mint by its commitment, or `None` if the chain
    /// never recorded it.
    pub fn get_mint_status(&self, commitment: &Hash) -> Option<MintStatus> {
        let tip_height = (self.active.len() - 1) as u64;
        let (denomination, record) = self.veil.mint_record(commitment)?;
        Some(MintStatus {
            denomination,
            mint_height: record.height,
            depth: tip_height.saturating_sub(record.height),
            mature: record.folded_at.is_some(),
        })
    }

    /// Total recorded mints for a denomination.
    pub fn get_mint_count(&self, denomination: VeilDenomination) -> u64 {
        self.veil.mint_count(denomination)
    }

    pub fn block_index_entry(&self, hash: &Hash) -> Option<&BlockIndexEntry> {
        self.index.get(hash)
    }

    pub fn block_hash_at_height(&self, height: u64) -> Option<Hash> {
        self.active.get(height as usize).copied()
    }

    pub fn veil_state(&self) -> &VeilState {
        &self.veil
    }

    pub fn masternode_registry(&self) -> &MasternodeRegistry {
        &self.masternodes
    }

    pub fn utxo_snapshot(&self) -> Result<Vec<u8>, ConsensusError> {
        self.utxos.snapshot()
    }

    /// Replays every matured veil mint from genesis and compares the result
    /// against the stored accumulator checkpoints. A mismatch is fatal
    /// corruption.
    pub fn verify_veil_checkpoints(&self) -> Result<(), ConsensusError> {
        self.veil.verify_checkpoints()?;
        Ok(())
    }

    pub fn mempool(&self) -> &Mempool {
        &self.mempool
    }

    // ---- mempool and masternode entry points ----------------------------

    /// Validates a loose transaction and admits it to the mempool under the
    /// first-seen rule.
    pub fn accept_transaction(&mut self, tx: Transaction, now: u64) -> Result<(), ConsensusError> {
        let height = (self.active.len() - 1) as u64 + 1;
        let mut state = TxValidationState::new();
        state.advance_syntactic(&tx, &self.params)?;
        let fee = {
            let ctx = TxContext {
                view: &self.utxos,
                veil: &self.veil,
                params: &self.params,
                height,
                require_fee: true,
            };
            state.advance_contextual(&tx, &ctx)?
        };
        // Mempool transactions must not claim outpoints the pool already
        // holds; committed double spends were rejected above.
        self.mempool.insert(tx, fee, now)
    }

    /// Registers a masternode whose collateral is locked in the committed
    /// UTXO set.
    pub fn register_masternode(&mut self, announce: MasternodeAnnounce) -> Result<(), ConsensusError> {
        let collateral = self
            .utxos
            .lookup(&announce.collateral)
            .ok_or_else(|| ConsensusError::MissingUtxo(announce.collateral.clone()))?;
        let value = collateral.output.value;
        self.masternodes.register(announce, value, &self.params)?;
        Ok(())
    }

    pub fn process_masternode_ping(&mut self, ping: &MasternodePing) -> Result<(), ConsensusError> {
        self.masternodes.process_ping(ping)?;
        Ok(())
    }

    /// Drops masternodes that have not pinged within the expiry window.
    pub fn expire_masternodes(&mut self, now: u64) -> usize {
        self.masternodes.remove_expired(now, &self.params).len()
    }

    // ---- block acceptance ------------------------------------------------

    /// Offers a block to the chain. The block is indexed if its header is
    /// valid, and the chain reorganizes onto it when it extends the
    /// heaviest chain. Ties never displace the incumbent.
    pub fn accept_block(&mut self, block: Block, now: u64) -> Result<BlockDisposition, ConsensusError> {
        let hash = block.hash();
        if self.index.contains_key(&hash) {
            return Ok(self.disposition_of(&hash));
        }
        check_block_syntactic(&block, &self.params)?;

        let parent_hash = block.header.previous_block_hash;
        if !self.index.contains_key(&parent_hash) {
            debug!(
                "queueing orphan {} waiting on {}",
                hex::encode(hash),
                hex::encode(parent_hash)
            );
            while self.orphan_count() >= MAX_ORPHAN_BLOCKS {
                if let Some((evicted, _)) = self.orphans.pop_first() {
                    warn!(
                        "orphan pool full, dropped blocks waiting on {}",
                        hex::encode(evicted)
                    );
                }
            }
            self.orphans.entry(parent_hash).or_default().push(block);
            return Err(ConsensusError::OrphanBlock(hex::encode(parent_hash)));
        }
        self.check_header_contextual(&block.header, now)?;

        let parent = self
            .index
            .get(&parent_hash)
            .ok_or_else(|| ConsensusError::UnknownBlock(hex::encode(parent_hash)))?;
        if parent.status == BlockStatus::Invalid {
            return Err(ConsensusError::InvalidAncestor);
        }
        let chain_work = parent.chain_work + work_from_bits(block.header.bits);
        let stake_modifier = next_stake_modifier(parent.stake_modifier, &parent_hash);
        let entry = BlockIndexEntry {
            hash,
            header: block.header.clone(),
            height: block.header.height,
            chain_work,
            stake_modifier,
            status: BlockStatus::HeaderValid,
        };
        self.index.insert(hash, entry);
        self.blocks.insert(hash, block);

        let tip_work = self.get_chain_tip().chain_work;
        // Strict comparison: a tie keeps the first-seen chain.
        let result = if chain_work > tip_work {
            self.activate_chain(hash)
        } else {
            debug!("block {} parked on a side branch", hex::encode(hash));
            Ok(BlockDisposition::SideChain)
        };

        match &result {
            Ok(_) => self.process_orphans_of(hash, now),
            // A block that failed to connect is marked invalid; anything
            // queued behind it is doomed too.
            Err(_) => {
                self.orphans.remove(&hash);
            }
        }
        result
    }

    fn orphan_count(&self) -> usize {
        self.orphans.values().map(Vec::len).sum()
    }

    fn disposition_of(&self, hash: &Hash) -> BlockDisposition {
        if self.active.last() == Some(hash) {
            BlockDisposition::ActiveTip
        } else {
            BlockDisposition::SideChain
        }
    }

    fn process_orphans_of(&mut self, parent: Hash, now: u64) {
        if let Some(children) = self.orphans.remove(&parent) {
            for child in children {
                let child_hash = child.hash();
                if let Err(err) = self.accept_block(child, now) {
                    warn!(
                        "queued orphan {} rejected: {}",
                        hex::encode(child_hash),
                        err
                    );
                }
            }
        }
    }

    /// Header rules that need the parent: height continuity, the fixed
    /// target encoding, future drift and the median-time-past floor.
    fn check_header_contextual(&self, header: &BlockHeader, now: u64) -> Result<(), ConsensusError> {
        let parent = self
            .index
            .get(&header.previous_block_hash)
            .ok_or_else(|| ConsensusError::UnknownBlock(hex::encode(header.previous_block_hash)))?;
        if header.height != parent.height + 1 {
            return Err(ConsensusError::InvalidHeader(format!(
                "height {} does not follow parent height {}",
                header.height, parent.height
            )));
        }
        if header.bits != self.params.genesis_bits {
            return Err(ConsensusError::InvalidHeader(
                "unexpected target encoding".to_string(),
            ));
        }
        if header.timestamp > now + self.params.max_future_drift {
            return Err(ConsensusError::InvalidHeader(
                "timestamp too far in the future".to_string(),
            ));
        }
        let mut times = Vec::with_capacity(11);
        let mut cursor = Some(parent);
        while let Some(entry) = cursor {
            times.push(entry.header.timestamp);
            if times.len() == 11 {
                break;
            }
            cursor = self.index.get(&entry.header.previous_block_hash);
        }
        if header.timestamp <= median_time_past(&times) {
            return Err(ConsensusError::InvalidHeader(
                "timestamp at or below median time past".to_string(),
            ));
        }
        Ok(())
    }

    // ---- reorganization --------------------------------------------------

    /// Makes `new_tip` the active tip: disconnect to the fork point, then
    /// connect the new branch with full validation. Any connection failure
    /// rolls everything back and restores the original chain before the
    /// offending subtree is marked invalid.
    fn activate_chain(&mut self, new_tip: Hash) -> Result<BlockDisposition, ConsensusError> {
        // Branch path from the fork point (exclusive) to the new tip.
        let mut path = Vec::new();
        let mut cursor = new_tip;
        while !self.is_on_active_chain(&cursor) {
            let entry = self
                .index
                .get(&cursor)
                .ok_or_else(|| ConsensusError::UnknownBlock(hex::encode(cursor)))?;
            if entry.status == BlockStatus::Invalid {
                return Err(ConsensusError::InvalidAncestor);
            }
            path.push(cursor);
            cursor = entry.header.previous_block_hash;
        }
        path.reverse();
        let fork_height = self
            .index
            .get(&cursor)
            .map(|e| e.height)
            .ok_or_else(|| ConsensusError::CorruptState("fork point not indexed".to_string()))?;

        let mut disconnected = Vec::new();
        while (self.active.len() - 1) as u64 > fork_height {
            disconnected.push(self.disconnect_tip()?);
        }
        disconnected.reverse();
        if !disconnected.is_empty() {
            info!(
                "reorganizing: {} blocks off, {} candidate blocks on",
                disconnected.len(),
                path.len()
            );
        }

        for (connected, hash) in path.iter().enumerate() {
            let block = self
                .blocks
                .get(hash)
                .cloned()
                .ok_or_else(|| ConsensusError::UnknownBlock(hex::encode(hash)))?;
            if let Err(err) = self.connect_block(&block) {
                warn!(
                    "block {} failed to connect: {}; restoring previous chain",
                    hex::encode(hash),
                    err
                );
                for _ in 0..connected {
                    self.disconnect_tip()?;
                }
                for original in &disconnected {
                    let block = self.blocks.get(original).cloned().ok_or_else(|| {
                        ConsensusError::CorruptState("disconnected block lost".to_string())
                    })?;
                    self.connect_block(&block).map_err(|e| {
                        ConsensusError::CorruptState(format!(
                            "failed to restore the original chain: {e}"
                        ))
                    })?;
                }
                self.mark_invalid_subtree(*hash);
                return Err(err);
            }
        }
        Ok(BlockDisposition::ActiveTip)
    }

    fn is_on_active_chain(&self, hash: &Hash) -> bool {
        self.index
            .get(hash)
            .map(|e| self.active.get(e.height as usize) == Some(hash))
            .unwrap_or(false)
    }

    /// Marks a block and every indexed descendant permanently invalid.
    fn mark_invalid_subtree(&mut self, root: Hash) {
        if let Some(entry) = self.index.get_mut(&root) {
            entry.status = BlockStatus::Invalid;
        }
        loop {
            let newly_invalid: Vec<Hash> = self
                .index
                .values()
                .filter(|e| {
                    e.status != BlockStatus::Invalid
                        && self
                            .index
                            .get(&e.header.previous_block_hash)
                            .map(|p| p.status == BlockStatus::Invalid)
                            .unwrap_or(false)
                })
                .map(|e| e.hash)
                .collect();
            if newly_invalid.is_empty() {
                break;
            }
            for hash in newly_invalid {
                if let Some(entry) = self.index.get_mut(&hash) {
                    entry.status = BlockStatus::Invalid;
                }
            }
        }
    }

    /// Takes the tip block off, restoring UTXO, masternode and veil state
    /// from its undo record. Failure here is fatal: the records no longer
    /// describe the committed state.
    fn disconnect_tip(&mut self) -> Result<Hash, ConsensusError> {
        if self.active.len() <= 1 {
            return Err(ConsensusError::CorruptState(
                "cannot disconnect genesis".to_string(),
            ));
        }
        let hash = *self
            .active
            .last()
            .ok_or_else(|| ConsensusError::CorruptState("empty active chain".to_string()))?;
        let height = (self.active.len() - 1) as u64;
        let undo = self
            .undo_logs
            .remove(&hash)
            .ok_or_else(|| ConsensusError::UndoMismatch("missing undo record".to_string()))?;

        for serial in &undo.serials {
            self.veil.remove_serial(serial)?;
        }
        self.veil.disconnect_to(height - 1)?;
        if let Some((id, previous)) = &undo.paid {
            self.masternodes.restore_last_paid(id, *previous);
        }
        for entry in undo.removed_masternodes {
            self.masternodes.reinsert(entry);
        }
        self.utxos.apply_undo(&undo.utxo)?;
        self.active.pop();
        debug!("disconnected {}", hex::encode(hash));
        Ok(hash)
    }

    /// Fully validates and connects a block whose parent is the active tip.
    fn connect_block(&mut self, block: &Block) -> Result<(), ConsensusError> {
        let hash = block.hash();
        let height = block.header.height;
        let params = self.params.clone();
        check_block_syntactic(block, &params)?;

        // Proof-of-stake checks come first: the kernel and the detached
        // block signature.
        let pos = block.is_proof_of_stake();
        if pos {
            self.check_stake(block)?;
        }

        let mut batch = self.utxos.begin_batch();
        let mut fees: Amount = 0;
        let mut coinstake_in_total: Amount = 0;
        let mut spent_outpoints: Vec<OutPoint> = Vec::new();
        let mut mints: Vec<(VeilDenomination, Hash)> = Vec::new();
        let mut spend_payloads: Vec<SpendPayload> = Vec::new();
        let mut block_serials: HashSet<Hash> = HashSet::new();

        for tx in &block.transactions {
            let mut state = TxValidationState::new();
            state.advance_syntactic(tx, &params)?;
            {
                let view = BatchView { base: &self.utxos, batch: &batch };
                let ctx = TxContext {
                    view: &view,
                    veil: &self.veil,
                    params: &params,
                    height,
                    require_fee: false,
                };
                fees = fees
                    .checked_add(state.advance_contextual(tx, &ctx)?)
                    .ok_or(ConsensusError::ValueOutOfRange)?;
            }

            if let Some(spend) = tx.spend_payload() {
                if !block_serials.insert(spend.serial) {
                    return Err(argent_veil::VeilError::SerialAlreadySpent(hex::encode(
                        spend.serial,
                    ))
                    .into());
                }
                spend_payloads.push(spend.clone());
            }
            if let Some(mint) = tx.mint_payload() {
                mints.push((mint.denomination, mint.commitment));
            }

            let txid = tx.txid();
            if !tx.is_coinbase() {
                // A second in-block spend of the same outpoint fails here,
                // rejecting the block.
                for input in tx.inputs() {
                    let consumed = batch.spend(&self.utxos, &input.previous_output)?;
                    if tx.is_coinstake() {
                        coinstake_in_total = coinstake_in_total
                            .checked_add(consumed.output.value)
                            .ok_or(ConsensusError::ValueOutOfRange)?;
                    }
                    spent_outpoints.push(input.previous_output.clone());
                }
            }
            for (vout, output) in tx.outputs().iter().enumerate() {
                if output.value == 0 || is_data_carrier(&output.script_pubkey) {
                    continue;
                }
                let mut utxo = Utxo::new(output.clone(), height);
                utxo.is_coinbase = tx.is_coinbase();
                utxo.is_coinstake = tx.is_coinstake();
                batch.create(OutPoint::new(txid, vout as u32), utxo)?;
            }
        }

        // Reward bound: subsidy plus collected fees, claimed by the
        // coinbase (work blocks) or the coinstake (stake blocks).
        let allowed = params
            .block_subsidy(height)
            .checked_add(fees)
            .ok_or(ConsensusError::ValueOutOfRange)?;
        if pos {
            let coinstake = block
                .coinstake()
                .ok_or_else(|| ConsensusError::BadCoinstake("missing coinstake".to_string()))?;
            let out_total = coinstake
                .total_output_value()
                .ok_or(ConsensusError::ValueOutOfRange)?;
            let claimed = out_total.saturating_sub(coinstake_in_total);
            if claimed > allowed {
                return Err(ConsensusError::BadSubsidy { claimed, allowed });
            }
        } else {
            let claimed = block.transactions[0]
                .total_output_value()
                .ok_or(ConsensusError::ValueOutOfRange)?;
            if claimed > allowed {
                return Err(ConsensusError::BadSubsidy { claimed, allowed });
            }
        }

        // Masternode payment: the winner is a pure function of the registry
        // and a prior block hash on this chain.
        let winner = self.payment_winner(block)?;
        if let Some(winner) = &winner {
            let expected = params.masternode_reward(height);
            if expected > 0 {
                let reward_outputs = if pos {
                    block
                        .coinstake()
                        .map(|tx| tx.outputs())
                        .unwrap_or(&[])
                } else {
                    block.transactions[0].outputs()
                };
                if !validate_payment(reward_outputs, &winner.payee_script, expected) {
                    return Err(ConsensusError::BadMasternodePayment);
                }
            }
        }

        // All checks passed: commit. The staged veil and masternode
        // mutations below were pre-validated and cannot fail against the
        // state the checks ran on.
        let undo_utxo = self.utxos.commit_batch(batch, hash)?;
        let mut removed_masternodes = Vec::new();
        for outpoint in &spent_outpoints {
            if let Some(entry) = self.masternodes.on_collateral_spent(outpoint) {
                removed_masternodes.push(entry);
            }
        }
        let paid = match &winner {
            Some(winner) => self
                .masternodes
                .note_paid(&winner.id, height)
                .map(|previous| (winner.id.clone(), previous)),
            None => None,
        };
        for (denomination, commitment) in mints {
            self.veil.apply_mint(denomination, commitment, height)?;
        }
        for spend in &spend_payloads {
            self.veil.apply_spend(spend)?;
        }
        self.veil.record_checkpoint(height, &params)?;

        let serials = spend_payloads.iter().map(|s| s.serial).collect();
        self.undo_logs.insert(
            hash,
            ConnectUndo { utxo: undo_utxo, paid, removed_masternodes, serials },
        );
        self.active.push(hash);
        if let Some(entry) = self.index.get_mut(&hash) {
            entry.status = BlockStatus::FullyValid;
        }
        self.mempool.remove_confirmed(block);
        info!(
            "connected {} at height {} ({} transactions)",
            hex::encode(hash),
            height,
            block.transactions.len()
        );
        Ok(())
    }

    /// Kernel and block-signature validation for a proof-of-stake block.
    fn check_stake(&self, block: &Block) -> Result<(), ConsensusError> {
        let coinstake = block
            .coinstake()
            .ok_or_else(|| ConsensusError::BadCoinstake("missing coinstake".to_string()))?;
        let kernel_input = coinstake
            .inputs()
            .first()
            .ok_or_else(|| ConsensusError::BadCoinstake("coinstake has no inputs".to_string()))?;
        let prevout = &kernel_input.previous_output;
        let stake_utxo = self
            .utxos
            .lookup(prevout)
            .cloned()
            .ok_or_else(|| ConsensusError::MissingUtxo(prevout.clone()))?;

        // Timestamp of the block that created the staked output, taken from
        // the chain the block is being connected to.
        let creator_hash = self
            .active
            .get(stake_utxo.creation_height as usize)
            .ok_or_else(|| ConsensusError::CorruptState("stake creator not on chain".to_string()))?;
        let stake_utxo_time = self
            .index
            .get(creator_hash)
            .map(|e| e.header.timestamp)
            .ok_or_else(|| ConsensusError::CorruptState("stake creator not indexed".to_string()))?;
        let stake_modifier = self
            .index
            .get(&block.hash())
            .map(|e| e.stake_modifier)
            .ok_or_else(|| ConsensusError::UnknownBlock(hex::encode(block.hash())))?;

        check_proof_of_stake(
            prevout,
            &stake_utxo,
            stake_utxo_time,
            stake_modifier,
            block.header.timestamp,
            block.header.bits,
            block.header.height,
            &self.params,
        )?;

        // The detached signature must verify under the key locked by the
        // kernel payout output.
        let kernel_output = coinstake
            .outputs()
            .get(1)
            .ok_or_else(|| ConsensusError::BadCoinstake("missing kernel output".to_string()))?;
        let staker_key = extract_pubkey(&kernel_output.script_pubkey)
            .ok_or(ConsensusError::BadBlockSignature)?;
        if !verify_signature(&staker_key, &block.header.hash(), &block.block_signature) {
            return Err(ConsensusError::BadBlockSignature);
        }
        Ok(())
    }

    /// The deterministic payment winner for the block being connected, from
    /// the selection hash `masternode_ranking_depth` blocks back.
    fn payment_winner(&self, block: &Block) -> Result<Option<MasternodeEntry>, ConsensusError> {
        if self.masternodes.is_empty() {
            return Ok(None);
        }
        let height = block.header.height;
        let selection_height = height
            .saturating_sub(self.params.masternode_ranking_depth)
            .min(height.saturating_sub(1));
        let selection_hash = self
            .active
            .get(selection_height as usize)
            .copied()
            .ok_or_else(|| {
                ConsensusError::CorruptState("selection block not on chain".to_string())
            })?;
        Ok(winner_for_height(
            &self.masternodes,
            height,
            &selection_hash,
            block.header.timestamp,
            &self.params,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use argent_crypto::merkle_root;
    use argent_types::{TxOutput, COIN};

    const BASE_TIME: u64 = 1_000_000;

    fn params() -> ConsensusParams {
        ConsensusParams::regtest()
    }

    fn genesis_block(params: &ConsensusParams) -> Block {
        let coinbase =
            Transaction::new_coinbase(0, vec![TxOutput::new(1_000 * COIN, vec![0xAC])]);
        let txids = [coinbase.txid()];
        Block {
            header: BlockHeader {
                version: 1,
                previous_block_hash: [0u8; 32],
                merkle_root: merkle_root(&txids),
                timestamp: BASE_TIME,
                bits: params.genesis_bits,
                nonce: 0,
                height: 0,
            },
            transactions: vec![coinbase],
            block_signature: vec![],
        }
    }

    fn block_on(
        parent: Hash,
        height: u64,
        timestamp: u64,
        params: &ConsensusParams,
        extra: Vec<Transaction>,
        nonce: u64,
    ) -> Block {
        let subsidy = params.block_subsidy(height);
        let coinbase =
            Transaction::new_coinbase(height, vec![TxOutput::new(subsidy, vec![0xAC])]);
        let mut transactions = vec![coinbase];
        transactions.extend(extra);
        let txids: Vec<Hash> = transactions.iter().map(|t| t.txid()).collect();
        Block {
            header: BlockHeader {
                version: 1,
                previous_block_hash: parent,
                merkle_root: merkle_root(&txids),
                timestamp,
                bits: params.genesis_bits,
                nonce,
                height,
            },
            transactions,
            block_signature: vec![],
        }
    }

    fn manager() -> (ChainManager, Block) {
        let params = params();
        let genesis = genesis_block(&params);
        (ChainManager::new(params, genesis.clone()).unwrap(), genesis)
    }

    #[test]
    fn genesis_bootstraps_the_chain() {
        let (mgr, genesis) = manager();
        let tip = mgr.get_chain_tip();
        assert_eq!(tip.hash, genesis.hash());
        assert_eq!(tip.height, 0);
        assert!(tip.chain_work > U256::zero());
        // Genesis coinbase landed in the UTXO set.
        let txid = genesis.transactions[0].txid();
        assert!(mgr.get_utxo(&OutPoint::new(txid, 0)).is_some());
    }

    #[test]
    fn blocks_extend_the_active_chain() {
        let (mut mgr, genesis) = manager();
        let params = params();
        let b1 = block_on(genesis.hash(), 1, BASE_TIME + 60, &params, vec![], 0);
        let d = mgr.accept_block(b1.clone(), BASE_TIME + 60).unwrap();
        assert_eq!(d, BlockDisposition::ActiveTip);

        let b2 = block_on(b1.hash(), 2, BASE_TIME + 120, &params, vec![], 0);
        mgr.accept_block(b2.clone(), BASE_TIME + 120).unwrap();
        assert_eq!(mgr.get_chain_tip().height, 2);
        assert_eq!(mgr.block_hash_at_height(2), Some(b2.hash()));
    }

    #[test]
    fn header_rules_rejected() {
        let (mut mgr, genesis) = manager();
        let params = params();
        let now = BASE_TIME + 60;

        // Wrong height.
        let bad = block_on(genesis.hash(), 5, BASE_TIME + 60, &params, vec![], 0);
        assert!(matches!(
            mgr.accept_block(bad, now),
            Err(ConsensusError::InvalidHeader(_))
        ));

        // Wrong bits.
        let mut bad = block_on(genesis.hash(), 1, BASE_TIME + 60, &params, vec![], 1);
        bad.header.bits = 0x1e0f_fff0;
        assert!(matches!(
            mgr.accept_block(bad, now),
            Err(ConsensusError::InvalidHeader(_))
        ));

        // Too far in the future.
        let bad = block_on(
            genesis.hash(),
            1,
            now + params.max_future_drift + 1,
            &params,
            vec![],
            2,
        );
        assert!(matches!(
            mgr.accept_block(bad, now),
            Err(ConsensusError::InvalidHeader(_))
        ));

        // At or below the parent's time.
        let bad = block_on(genesis.hash(), 1, BASE_TIME, &params, vec![], 3);
        assert!(matches!(
            mgr.accept_block(bad, now),
            Err(ConsensusError::InvalidHeader(_))
        ));

        assert_eq!(mgr.get_chain_tip().height, 0);
    }

    #[test]
    fn orphans_queue_and_reconnect() {
        let (mut mgr, genesis) = manager();
        let params = params();
        let b1 = block_on(genesis.hash(), 1, BASE_TIME + 60, &params, vec![], 0);
        let b2 = block_on(b1.hash(), 2, BASE_TIME + 120, &params, vec![], 0);

        // Child first: queued, not connected.
        let err = mgr.accept_block(b2.clone(), BASE_TIME + 120).unwrap_err();
        assert!(matches!(err, ConsensusError::OrphanBlock(_)));
        assert_eq!(err.kind(), crate::error::RejectionKind::TransientUnavailable);
        assert_eq!(mgr.get_chain_tip().height, 0);

        // Parent arrives; both connect.
        mgr.accept_block(b1, BASE_TIME + 120).unwrap();
        assert_eq!(mgr.get_chain_tip().height, 2);
        assert_eq!(mgr.get_chain_tip().hash, b2.hash());
    }

    #[test]
    fn orphan_pool_is_bounded() {
        let (mut mgr, _genesis) = manager();
        let params = params();
        for tag in 0..(MAX_ORPHAN_BLOCKS + 10) {
            let unknown_parent = [tag as u8 + 1; 32];
            let block = block_on(unknown_parent, 2, BASE_TIME + 120, &params, vec![], tag as u64);
            let err = mgr.accept_block(block, BASE_TIME + 120).unwrap_err();
            assert!(matches!(err, ConsensusError::OrphanBlock(_)));
        }
        assert!(mgr.orphan_count() <= MAX_ORPHAN_BLOCKS);
    }

    #[test]
    fn tie_keeps_first_seen_chain() {
        let (mut mgr, genesis) = manager();
        let params = params();
        let first = block_on(genesis.hash(), 1, BASE_TIME + 60, &params, vec![], 0);
        let rival = block_on(genesis.hash(), 1, BASE_TIME + 61, &params, vec![], 1);
        assert_ne!(first.hash(), rival.hash());

        mgr.accept_block(first.clone(), BASE_TIME + 120).unwrap();
        let d = mgr.accept_block(rival, BASE_TIME + 120).unwrap();
        assert_eq!(d, BlockDisposition::SideChain);
        assert_eq!(mgr.get_chain_tip().hash, first.hash());
    }

    #[test]
    fn bad_subsidy_rejected() {
        let (mut mgr, genesis) = manager();
        let params = params();
        let height = 1;
        let coinbase = Transaction::new_coinbase(
            height,
            vec![TxOutput::new(params.block_subsidy(height) + 1, vec![0xAC])],
        );
        let txids = [coinbase.txid()];
        let block = Block {
            header: BlockHeader {
                version: 1,
                previous_block_hash: genesis.hash(),
                merkle_root: merkle_root(&txids),
                timestamp: BASE_TIME + 60,
                bits: params.genesis_bits,
                nonce: 0,
                height,
            },
            transactions: vec![coinbase],
            block_signature: vec![],
        };
        let err = mgr.accept_block(block, BASE_TIME + 60).unwrap_err();
        assert!(matches!(err, ConsensusError::BadSubsidy { .. }));
        // The failed block is marked invalid; the chain is unchanged.
        assert_eq!(mgr.get_chain_tip().height, 0);
    }

    #[test]
    fn descendants_of_invalid_blocks_rejected() {
        let (mut mgr, genesis) = manager();
        let params = params();
        // An overpaying block.
        let coinbase = Transaction::new_coinbase(
            1,
            vec![TxOutput::new(params.block_subsidy(1) + 1, vec![0xAC])],
        );
        let txids = [coinbase.txid()];
        let bad = Block {
            header: BlockHeader {
                version: 1,
                previous_block_hash: genesis.hash(),
                merkle_root: merkle_root(&txids),
                timestamp: BASE_TIME + 60,
                bits: params.genesis_bits,
                nonce: 0,
                height: 1,
            },
            transactions: vec![coinbase],
            block_signature: vec![],
        };
        let bad_hash = bad.hash();
        mgr.accept_block(bad, BASE_TIME + 60).unwrap_err();
        assert_eq!(
            mgr.block_index_entry(&bad_hash).map(|e| e.status),
            Some(BlockStatus::Invalid)
        );

        let child = block_on(bad_hash, 2, BASE_TIME + 120, &params, vec![], 0);
        let err = mgr.accept_block(child, BASE_TIME + 120).unwrap_err();
        assert!(matches!(err, ConsensusError::InvalidAncestor));
    }
}
