use serde::{Deserialize, Serialize};

pub mod veil;

use veil::{MintPayload, SpendPayload, VeilDenomination};

pub type Hash = [u8; 32];
pub type PublicKey = [u8; 32];
pub type Signature = [u8; 64];
pub type PubKeyHash = [u8; 20];
pub type Amount = u64;

/// One coin in satoshis. All monetary values are fixed-point integers in
/// the smallest unit; validation never touches floating point.
pub const COIN: Amount = 100_000_000;

/// Upper bound on the total money supply, used for overflow checks.
pub const MAX_MONEY: Amount = 21_000_000 * COIN;

/// Represents a reference to a specific transaction output.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OutPoint {
    /// The transaction ID (hash) of the transaction containing the output.
    pub txid: Hash,
    /// The index of the output within that transaction.
    pub vout: u32,
}

impl OutPoint {
    pub fn new(txid: Hash, vout: u32) -> Self {
        OutPoint { txid, vout }
    }

    /// The null outpoint used by coinbase inputs.
    pub fn null() -> Self {
        OutPoint { txid: [0u8; 32], vout: u32::MAX }
    }

    pub fn is_null(&self) -> bool {
        self.txid == [0u8; 32] && self.vout == u32::MAX
    }
}

impl std::fmt::Display for OutPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", hex::encode(self.txid), self.vout)
    }
}

/// Represents a transaction input, referencing a previous transaction's output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxInput {
    /// The `OutPoint` referencing the output being spent.
    pub previous_output: OutPoint,
    /// The unlocking script, providing proof of ownership.
    pub script_sig: Vec<u8>,
    /// A sequence number, reserved for relative lock-times.
    pub sequence: u32,
}

impl TxInput {
    pub fn new(previous_output: OutPoint, script_sig: Vec<u8>) -> Self {
        TxInput { previous_output, script_sig, sequence: u32::MAX }
    }
}

/// Represents a transaction output, specifying a value and a locking script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    /// The value of the output in satoshis.
    pub value: Amount,
    /// The locking script that defines the conditions for spending this output.
    pub script_pubkey: Vec<u8>,
}

impl TxOutput {
    pub fn new(value: Amount, script_pubkey: Vec<u8>) -> Self {
        TxOutput { value, script_pubkey }
    }

    /// The empty marker output that identifies a coinstake transaction.
    pub fn empty_marker() -> Self {
        TxOutput { value: 0, script_pubkey: Vec::new() }
    }

    pub fn is_empty_marker(&self) -> bool {
        self.value == 0 && self.script_pubkey.is_empty()
    }

    /// Extracts the public key hash from a P2PKH script, if applicable.
    pub fn extract_public_key_hash(&self) -> Option<PubKeyHash> {
        // P2PKH script: OP_DUP OP_HASH160 <20-byte-hash> OP_EQUALVERIFY OP_CHECKSIG
        if self.script_pubkey.len() == 25
            && self.script_pubkey[0] == 0x76
            && self.script_pubkey[1] == 0xA9
            && self.script_pubkey[2] == 0x14
            && self.script_pubkey[23] == 0x88
            && self.script_pubkey[24] == 0xAC
        {
            let mut public_key_hash = [0u8; 20];
            public_key_hash.copy_from_slice(&self.script_pubkey[3..23]);
            Some(public_key_hash)
        } else {
            None
        }
    }
}

/// The transaction-type discriminant. Validation rules are dispatched on this
/// tag rather than on structural guesswork.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxKind {
    Standard,
    Coinbase,
    Coinstake,
    VeilMint,
    VeilSpend,
}

/// Represents the different types of transactions supported by the chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Transaction {
    Standard {
        version: u32,
        inputs: Vec<TxInput>,
        outputs: Vec<TxOutput>,
        lock_time: u32,
    },
    Coinbase {
        version: u32,
        inputs: Vec<TxInput>,
        outputs: Vec<TxOutput>,
        lock_time: u32,
    },
    /// The special transaction in a proof-of-stake block that spends the
    /// staked output and claims the staking reward. Its first output is the
    /// empty marker.
    Coinstake {
        version: u32,
        inputs: Vec<TxInput>,
        outputs: Vec<TxOutput>,
        lock_time: u32,
    },
    /// Burns a denomination's face value into an anonymized commitment.
    VeilMint {
        version: u32,
        inputs: Vec<TxInput>,
        outputs: Vec<TxOutput>,
        mint: MintPayload,
        lock_time: u32,
    },
    /// Redeems a previously minted commitment by accumulator membership
    /// proof, revealing only a one-time serial number.
    VeilSpend {
        version: u32,
        spend: SpendPayload,
        outputs: Vec<TxOutput>,
        lock_time: u32,
    },
}

impl Transaction {
    pub fn new_coinbase(height: u64, outputs: Vec<TxOutput>) -> Self {
        // The height is folded into the coinbase script so that coinbase
        // txids are unique across blocks.
        let input = TxInput {
            previous_output: OutPoint::null(),
            script_sig: height.to_le_bytes().to_vec(),
            sequence: u32::MAX,
        };
        Transaction::Coinbase { version: 1, inputs: vec![input], outputs, lock_time: 0 }
    }

    pub fn kind(&self) -> TxKind {
        match self {
            Transaction::Standard { .. } => TxKind::Standard,
            Transaction::Coinbase { .. } => TxKind::Coinbase,
            Transaction::Coinstake { .. } => TxKind::Coinstake,
            Transaction::VeilMint { .. } => TxKind::VeilMint,
            Transaction::VeilSpend { .. } => TxKind::VeilSpend,
        }
    }

    /// Returns the transaction's inputs. A veil spend has no regular inputs;
    /// its value comes out of the accumulator.
    pub fn inputs(&self) -> &[TxInput] {
        match self {
            Transaction::Standard { inputs, .. } => inputs,
            Transaction::Coinbase { inputs, .. } => inputs,
            Transaction::Coinstake { inputs, .. } => inputs,
            Transaction::VeilMint { inputs, .. } => inputs,
            Transaction::VeilSpend { .. } => &[],
        }
    }

    pub fn outputs(&self) -> &[TxOutput] {
        match self {
            Transaction::Standard { outputs, .. } => outputs,
            Transaction::Coinbase { outputs, .. } => outputs,
            Transaction::Coinstake { outputs, .. } => outputs,
            Transaction::VeilMint { outputs, .. } => outputs,
            Transaction::VeilSpend { outputs, .. } => outputs,
        }
    }

    pub fn lock_time(&self) -> u32 {
        match self {
            Transaction::Standard { lock_time, .. } => *lock_time,
            Transaction::Coinbase { lock_time, .. } => *lock_time,
            Transaction::Coinstake { lock_time, .. } => *lock_time,
            Transaction::VeilMint { lock_time, .. } => *lock_time,
            Transaction::VeilSpend { lock_time, .. } => *lock_time,
        }
    }

    pub fn mint_payload(&self) -> Option<&MintPayload> {
        match self {
            Transaction::VeilMint { mint, .. } => Some(mint),
            _ => None,
        }
    }

    pub fn spend_payload(&self) -> Option<&SpendPayload> {
        match self {
            Transaction::VeilSpend { spend, .. } => Some(spend),
            _ => None,
        }
    }

    pub fn is_coinbase(&self) -> bool {
        matches!(self, Transaction::Coinbase { .. })
    }

    pub fn is_coinstake(&self) -> bool {
        matches!(self, Transaction::Coinstake { .. })
    }

    /// Returns the canonical byte representation of the transaction.
    pub fn to_bytes(&self) -> Result<Vec<u8>, Box<bincode::ErrorKind>> {
        bincode::serialize(self)
    }

    /// Calculates and returns the transaction ID (hash) of the transaction.
    pub fn txid(&self) -> Hash {
        let bytes = self.to_bytes().unwrap();
        blake3::hash(&bytes).into()
    }

    /// Sum of output values, `None` on overflow.
    pub fn total_output_value(&self) -> Option<Amount> {
        self.outputs()
            .iter()
            .try_fold(0u64, |acc, o| acc.checked_add(o.value))
    }
}

/// Represents an unspent transaction output and its maturity metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utxo {
    pub output: TxOutput,
    /// The block height at which this output was created.
    pub creation_height: u64,
    pub is_coinbase: bool,
    pub is_coinstake: bool,
}

impl Utxo {
    pub fn new(output: TxOutput, creation_height: u64) -> Self {
        Utxo { output, creation_height, is_coinbase: false, is_coinstake: false }
    }

    /// Whether spending this entry is subject to the coinbase maturity rule.
    pub fn requires_maturity(&self) -> bool {
        self.is_coinbase || self.is_coinstake
    }
}

/// Represents a block header in the chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub version: u32,
    pub previous_block_hash: Hash,
    pub merkle_root: Hash,
    pub timestamp: u64,
    /// Compact-encoded work or stake target.
    pub bits: u32,
    pub nonce: u64,
    pub height: u64,
}

impl BlockHeader {
    /// Calculates the hash of the block header.
    pub fn hash(&self) -> Hash {
        let bytes = bincode::serialize(self).unwrap();
        blake3::hash(&bytes).into()
    }
}

/// Represents a block in the chain. The block signature is only present on
/// proof-of-stake blocks, signed by the staker's key over the header hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
    pub block_signature: Vec<u8>,
}

impl Block {
    pub fn hash(&self) -> Hash {
        self.header.hash()
    }

    /// A proof-of-stake block carries its coinstake as the second
    /// transaction, right after the coinbase.
    pub fn is_proof_of_stake(&self) -> bool {
        self.transactions.len() > 1 && self.transactions[1].is_coinstake()
    }

    pub fn coinstake(&self) -> Option<&Transaction> {
        if self.is_proof_of_stake() {
            self.transactions.get(1)
        } else {
            None
        }
    }
}

/// Network parameters consumed by validation. These are compile-time/network
/// constants, read-only during validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusParams {
    /// Maximum serialized block size in bytes.
    pub max_block_size: usize,
    /// Maximum serialized transaction size in bytes.
    pub max_tx_size: usize,
    /// Target spacing between blocks, in seconds.
    pub target_block_spacing: u64,
    /// Maximum tolerated clock drift for block timestamps, in seconds.
    pub max_future_drift: u64,
    /// Minimum relay fee per started kilobyte, in satoshis.
    pub min_relay_tx_fee: Amount,
    /// Confirmations before coinbase/coinstake outputs are spendable.
    pub coinbase_maturity: u64,
    /// Minimum confirmations before an output may serve as a stake kernel.
    pub min_stake_depth: u64,
    /// Minimum value of a staking output, in satoshis.
    pub min_stake_value: Amount,
    /// Cap on coin-age weight in seconds, bounding stake grinding with old
    /// coins. Seven days minus one hour on mainnet.
    pub max_coin_age_weight: u64,
    /// Height of the last proof-of-work block; everything after must stake.
    pub last_pow_height: u64,
    /// Compact target for the genesis block.
    pub genesis_bits: u32,
    /// Block subsidy at height 1, in satoshis.
    pub initial_subsidy: Amount,
    /// Interval in blocks between subsidy halvings.
    pub halving_interval: u64,
    /// Exact collateral amount that backs a masternode, in satoshis.
    pub masternode_collateral: Amount,
    /// Percentage of the block subsidy paid to the masternode winner.
    pub masternode_reward_percent: u64,
    /// Minimum time a masternode must have been active to be payable.
    pub masternode_min_active_seconds: u64,
    /// A masternode expires if not refreshed within this window.
    pub masternode_expiry_seconds: u64,
    /// Blocks a masternode must wait between payments.
    pub masternode_payment_cooldown: u64,
    /// How many blocks behind the payment height the ranking hash is taken.
    pub masternode_ranking_depth: u64,
    /// The set of active veil denominations on this network.
    pub veil_denominations: Vec<VeilDenomination>,
    /// Confirmations before a mint may enter the accumulator.
    pub veil_mint_maturity: u64,
    /// Later mints of the same denomination required before a mint matures.
    pub veil_min_subsequent_mints: u64,
    /// Hex-encoded RSA modulus for the veil accumulators.
    pub accumulator_modulus_hex: String,
}

/// RSA-2048 factoring-challenge modulus, the accumulator group for mainnet
/// and testnet.
const RSA2048_MODULUS_HEX: &str = "c7970ceedcc3b0754490201a7aa613cd73911081c790f5f1a8726f463550bb5b7ff0db8e1ea1189ec72f93d1650011bd721aeeacc2acde32a04107f0648c2813a31f5b0b7765ff8b44b4b6ffc93384b646eb09c7cf5e8592d40ea33c80039f35b4f14a04b51f7bfe7813ebbd95c0ec17a85c1733732f7cdf9e8545f50b048510c9ab67ba5f707a42be571c86b2e6444185ccee6a0287bab784647001b7cfa2a85c58633759256ef517a8e3d1d8930a0c2682f50c1b0d9746bdd3c6704016954ff87e29e5aa0e1fd2553d0b42999e1d0da0b64273be2846e616b1795874ceccbf6d622085d65d16d2b2cd9cf6b297e402d1f1bbc6a83cc39c8e3873f07765dd3";

impl Default for ConsensusParams {
    fn default() -> Self {
        ConsensusParams {
            max_block_size: 2_000_000,
            max_tx_size: 100_000,
            target_block_spacing: 60,
            max_future_drift: 180,
            min_relay_tx_fee: 10_000,
            coinbase_maturity: 100,
            min_stake_depth: 60,
            min_stake_value: 100 * COIN,
            max_coin_age_weight: 60 * 60 * 24 * 7 - 60 * 60,
            last_pow_height: 100,
            genesis_bits: 0x1e0ffff0,
            initial_subsidy: 1250 * COIN,
            halving_interval: 1_051_200,
            masternode_collateral: 10_000 * COIN,
            masternode_reward_percent: 45,
            masternode_min_active_seconds: 60 * 60,
            masternode_expiry_seconds: 120 * 60,
            masternode_payment_cooldown: 10,
            masternode_ranking_depth: 100,
            veil_denominations: VeilDenomination::all().to_vec(),
            veil_mint_maturity: 20,
            veil_min_subsequent_mints: 1,
            accumulator_modulus_hex: RSA2048_MODULUS_HEX.to_string(),
        }
    }
}

impl ConsensusParams {
    pub fn testnet() -> Self {
        ConsensusParams {
            coinbase_maturity: 15,
            min_stake_depth: 10,
            min_stake_value: COIN,
            last_pow_height: 200,
            masternode_collateral: 1_000 * COIN,
            masternode_min_active_seconds: 60,
            masternode_expiry_seconds: 20 * 60,
            masternode_payment_cooldown: 4,
            masternode_ranking_depth: 10,
            veil_mint_maturity: 6,
            ..Default::default()
        }
    }

    pub fn regtest() -> Self {
        ConsensusParams {
            max_future_drift: 7200,
            min_relay_tx_fee: 0,
            coinbase_maturity: 2,
            min_stake_depth: 2,
            min_stake_value: COIN,
            max_coin_age_weight: 60 * 60 * 24,
            last_pow_height: u64::MAX,
            genesis_bits: 0x207fffff,
            initial_subsidy: 50 * COIN,
            halving_interval: 150,
            masternode_collateral: 100 * COIN,
            masternode_reward_percent: 45,
            masternode_min_active_seconds: 0,
            masternode_expiry_seconds: 60 * 60,
            masternode_payment_cooldown: 2,
            masternode_ranking_depth: 1,
            veil_mint_maturity: 2,
            veil_min_subsequent_mints: 1,
            // Small odd modulus keeps regtest accumulator math cheap.
            accumulator_modulus_hex: "d8a6f31f0f8dbb0f4f312cf37be2b945".to_string(),
            ..Default::default()
        }
    }

    /// The block subsidy at the given height, halving on the configured
    /// interval.
    pub fn block_subsidy(&self, height: u64) -> Amount {
        if height == 0 {
            return 0;
        }
        let halvings = (height - 1) / self.halving_interval;
        if halvings >= 64 {
            return 0;
        }
        self.initial_subsidy >> halvings
    }

    /// The share of the subsidy owed to the masternode payment winner.
    pub fn masternode_reward(&self, height: u64) -> Amount {
        self.block_subsidy(height) * self.masternode_reward_percent / 100
    }
}
