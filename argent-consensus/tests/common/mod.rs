//! Shared harness for the chain-level integration tests: a regtest chain
//! seeded with spendable outputs plus builders for signed transactions and
//! work/stake blocks.
#![allow(dead_code)]

use argent_consensus::chain::{BlockDisposition, ChainManager, ChainTip};
use argent_consensus::script::{
    data_carrier_script, p2pkh_script, p2pkh_script_sig, pubkey_script, pubkey_script_sig,
};
use argent_consensus::signature_message;
use argent_consensus::ConsensusError;
use argent_crypto::{hash160, merkle_root, ArgentKeyPair};
use argent_types::veil::{MintPayload, SpendPayload, VeilDenomination};
use argent_types::{
    Amount, Block, BlockHeader, ConsensusParams, Hash, OutPoint, Transaction, TxInput, TxOutput,
    COIN,
};

pub const BASE_TIME: u64 = 1_000_000;
pub const SPACING: u64 = 60;

/// Genesis coinbase output layout.
pub const VOUT_FUNDS: u32 = 0;
pub const VOUT_COLLATERAL: u32 = 1;
pub const VOUT_STAKE: u32 = 2;
pub const VOUT_FUNDS_B: u32 = 3;

pub struct Harness {
    pub chain: ChainManager,
    pub params: ConsensusParams,
    /// Owns the p2pkh-funded genesis outputs.
    pub owner: ArgentKeyPair,
    /// Owns the bare-pubkey stake output.
    pub staker: ArgentKeyPair,
    pub genesis: Block,
    /// Timestamp the next built block should carry.
    pub next_time: u64,
}

impl Harness {
    pub fn new() -> Self {
        let params = ConsensusParams::regtest();
        let owner = ArgentKeyPair::generate();
        let staker = ArgentKeyPair::generate();
        let owner_script = p2pkh_script(&hash160(&owner.public_key()));
        let coinbase = Transaction::new_coinbase(
            0,
            vec![
                TxOutput::new(500 * COIN, owner_script.clone()),
                TxOutput::new(params.masternode_collateral, owner_script.clone()),
                TxOutput::new(50 * COIN, pubkey_script(&staker.public_key())),
                TxOutput::new(500 * COIN, owner_script),
            ],
        );
        let txids = [coinbase.txid()];
        let genesis = Block {
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
        };
        let chain = ChainManager::new(params.clone(), genesis.clone()).unwrap();
        Harness { chain, params, owner, staker, genesis, next_time: BASE_TIME + SPACING }
    }

    pub fn owner_script(&self) -> Vec<u8> {
        p2pkh_script(&hash160(&self.owner.public_key()))
    }

    pub fn genesis_outpoint(&self, vout: u32) -> OutPoint {
        OutPoint::new(self.genesis.transactions[0].txid(), vout)
    }

    pub fn tip(&self) -> ChainTip {
        self.chain.get_chain_tip()
    }

    /// Builds a work block on the given parent. The coinbase claims the full
    /// subsidy plus `fees` to the provided script.
    pub fn build_block_on(
        &self,
        parent: Hash,
        height: u64,
        timestamp: u64,
        extra: Vec<Transaction>,
        fees: Amount,
        nonce: u64,
    ) -> Block {
        let coinbase_outputs = vec![TxOutput::new(
            self.params.block_subsidy(height) + fees,
            self.owner_script(),
        )];
        self.build_block_with_coinbase(parent, height, timestamp, coinbase_outputs, extra, nonce)
    }

    pub fn build_block_with_coinbase(
        &self,
        parent: Hash,
        height: u64,
        timestamp: u64,
        coinbase_outputs: Vec<TxOutput>,
        extra: Vec<Transaction>,
        nonce: u64,
    ) -> Block {
        let coinbase = Transaction::new_coinbase(height, coinbase_outputs);
        let mut transactions = vec![coinbase];
        transactions.extend(extra);
        let txids: Vec<Hash> = transactions.iter().map(|t| t.txid()).collect();
        Block {
            header: BlockHeader {
                version: 1,
                previous_block_hash: parent,
                merkle_root: merkle_root(&txids),
                timestamp,
                bits: self.params.genesis_bits,
                nonce,
                height,
            },
            transactions,
            block_signature: vec![],
        }
    }

    /// Builds, accepts and returns one work block extending the tip.
    pub fn mine(&mut self, extra: Vec<Transaction>, fees: Amount) -> Block {
        let tip = self.tip();
        let timestamp = self.next_time;
        let block = self.build_block_on(tip.hash, tip.height + 1, timestamp, extra, fees, 0);
        let now = timestamp;
        let disposition = self.chain.accept_block(block.clone(), now).unwrap();
        assert_eq!(disposition, BlockDisposition::ActiveTip);
        self.next_time += SPACING;
        block
    }

    pub fn mine_empty(&mut self, count: usize) {
        for _ in 0..count {
            self.mine(vec![], 0);
        }
    }

    /// Offers a block built by hand, advancing the harness clock on success.
    pub fn accept(&mut self, block: Block) -> Result<BlockDisposition, ConsensusError> {
        let result = self.chain.accept_block(block, self.next_time);
        if result.is_ok() {
            self.next_time += SPACING;
        }
        result
    }

    /// A standard transaction spending p2pkh outputs held by `key`.
    pub fn signed_standard(
        &self,
        key: &ArgentKeyPair,
        inputs: Vec<OutPoint>,
        outputs: Vec<TxOutput>,
    ) -> Transaction {
        let unsigned = Transaction::Standard {
            version: 1,
            inputs: inputs.iter().map(|op| TxInput::new(op.clone(), Vec::new())).collect(),
            outputs: outputs.clone(),
            lock_time: 0,
        };
        let signed = inputs
            .iter()
            .enumerate()
            .map(|(index, op)| {
                let sig = key.sign(&signature_message(&unsigned, index));
                TxInput::new(op.clone(), p2pkh_script_sig(&sig, &key.public_key()))
            })
            .collect();
        Transaction::Standard { version: 1, inputs: signed, outputs, lock_time: 0 }
    }

    /// A veil mint funded from a p2pkh output: burns the face value to the
    /// commitment carrier and returns the change to the owner.
    pub fn signed_mint(
        &self,
        funding: OutPoint,
        funding_value: Amount,
        denomination: VeilDenomination,
        commitment: Hash,
    ) -> Transaction {
        let mint = MintPayload { denomination, commitment };
        let outputs = vec![
            TxOutput::new(denomination.value(), data_carrier_script(&commitment)),
            TxOutput::new(funding_value - denomination.value(), self.owner_script()),
        ];
        let unsigned = Transaction::VeilMint {
            version: 1,
            inputs: vec![TxInput::new(funding.clone(), Vec::new())],
            outputs: outputs.clone(),
            mint: mint.clone(),
            lock_time: 0,
        };
        let sig = self.owner.sign(&signature_message(&unsigned, 0));
        let input = TxInput::new(funding, p2pkh_script_sig(&sig, &self.owner.public_key()));
        Transaction::VeilMint { version: 1, inputs: vec![input], outputs, mint, lock_time: 0 }
    }

    /// A veil spend redeeming a mint against the checkpoint at
    /// `reference_height`, paying the full face value to the owner.
    pub fn build_spend(
        &self,
        denomination: VeilDenomination,
        commitment: &Hash,
        reference_height: u64,
        serial: Hash,
    ) -> Transaction {
        // No witness exists while the mint is immature; the validator
        // rejects such a spend before ever checking the witness.
        let witness = self
            .chain
            .veil_state()
            .witness_for(denomination, commitment, reference_height)
            .unwrap_or_else(|_| vec![0x02]);
        let spend = SpendPayload {
            denomination,
            reference_height,
            serial,
            member: argent_veil::member_from_commitment(commitment).to_bytes_be(),
            witness,
        };
        Transaction::VeilSpend {
            version: 1,
            spend,
            outputs: vec![TxOutput::new(denomination.value(), self.owner_script())],
            lock_time: 0,
        }
    }

    /// A stake block: zero-value coinbase, a coinstake spending `stake` for
    /// its value plus the subsidy (minus any masternode payment outputs,
    /// which are appended to the coinstake), and the staker's detached
    /// header signature.
    pub fn build_pos_block(
        &self,
        parent: Hash,
        height: u64,
        timestamp: u64,
        stake: OutPoint,
        stake_value: Amount,
        extra_outputs: Vec<TxOutput>,
    ) -> Block {
        let extra_total: Amount = extra_outputs.iter().map(|o| o.value).sum();
        let kernel_value = stake_value + self.params.block_subsidy(height) - extra_total;
        let mut outputs = vec![
            TxOutput::empty_marker(),
            TxOutput::new(kernel_value, pubkey_script(&self.staker.public_key())),
        ];
        outputs.extend(extra_outputs);

        let unsigned = Transaction::Coinstake {
            version: 1,
            inputs: vec![TxInput::new(stake.clone(), Vec::new())],
            outputs: outputs.clone(),
            lock_time: 0,
        };
        let sig = self.staker.sign(&signature_message(&unsigned, 0));
        let coinstake = Transaction::Coinstake {
            version: 1,
            inputs: vec![TxInput::new(stake, pubkey_script_sig(&sig))],
            outputs,
            lock_time: 0,
        };
        let coinbase = Transaction::new_coinbase(height, vec![TxOutput::new(0, vec![0x6A])]);
        let transactions = vec![coinbase, coinstake];
        let txids: Vec<Hash> = transactions.iter().map(|t| t.txid()).collect();
        let header = BlockHeader {
            version: 1,
            previous_block_hash: parent,
            merkle_root: merkle_root(&txids),
            timestamp,
            bits: self.params.genesis_bits,
            nonce: 0,
            height,
        };
        let block_signature = self.staker.sign(&header.hash()).to_vec();
        Block { header, transactions, block_signature }
    }
}
