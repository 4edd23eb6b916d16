//! Stack-based script interpreter.
//!
//! Execution is pure: a malformed script makes verification return `false`,
//! it never panics and never touches chain state. Resource limits bound
//! script size, operation count, stack depth and signature operations.

use argent_crypto::{hash160, hash256, sha256, verify_signature};
use argent_types::{Hash, PubKeyHash, Transaction};

pub const MAX_SCRIPT_SIZE: usize = 10_000;
pub const MAX_OPS: usize = 201;
pub const MAX_STACK_DEPTH: usize = 1_000;
pub const MAX_SIGOPS: usize = 20;
pub const MAX_ELEMENT_SIZE: usize = 520;

// Opcodes. Values follow the classic script encoding.
pub const OP_0: u8 = 0x00;
pub const OP_PUSHDATA1: u8 = 0x4c;
pub const OP_PUSHDATA2: u8 = 0x4d;
pub const OP_1: u8 = 0x51;
pub const OP_16: u8 = 0x60;
pub const OP_NOP: u8 = 0x61;
pub const OP_IF: u8 = 0x63;
pub const OP_ELSE: u8 = 0x67;
pub const OP_ENDIF: u8 = 0x68;
pub const OP_VERIFY: u8 = 0x69;
pub const OP_RETURN: u8 = 0x6a;
pub const OP_DROP: u8 = 0x75;
pub const OP_DUP: u8 = 0x76;
pub const OP_SWAP: u8 = 0x7c;
pub const OP_EQUAL: u8 = 0x87;
pub const OP_EQUALVERIFY: u8 = 0x88;
pub const OP_SHA256: u8 = 0xa8;
pub const OP_HASH160: u8 = 0xa9;
pub const OP_HASH256: u8 = 0xaa;
pub const OP_CHECKSIG: u8 = 0xac;
pub const OP_CHECKSIGVERIFY: u8 = 0xad;
pub const OP_CHECKMULTISIG: u8 = 0xae;
pub const OP_CHECKMULTISIGVERIFY: u8 = 0xaf;

/// The message a signature in input `input_index` commits to: the
/// transaction with every input's unlocking script cleared, then the input
/// index. Deterministic per input.
pub fn signature_message(tx: &Transaction, input_index: usize) -> Hash {
    let mut cleared = tx.clone();
    match &mut cleared {
        Transaction::Standard { inputs, .. }
        | Transaction::Coinbase { inputs, .. }
        | Transaction::Coinstake { inputs, .. }
        | Transaction::VeilMint { inputs, .. } => {
            for input in inputs {
                input.script_sig.clear();
            }
        }
        Transaction::VeilSpend { .. } => {}
    }
    let mut hasher = blake3::Hasher::new();
    // Clearing the scripts leaves only fixed-shape fields, so this cannot
    // fail to serialize.
    hasher.update(&bincode::serialize(&cleared).unwrap_or_default());
    hasher.update(&(input_index as u32).to_le_bytes());
    *hasher.finalize().as_bytes()
}

/// Verifies that `script_sig` satisfies `script_pubkey` for the given input
/// of `tx`. Never panics; any malformed script fails cleanly.
pub fn verify_script(
    script_sig: &[u8],
    script_pubkey: &[u8],
    tx: &Transaction,
    input_index: usize,
) -> bool {
    if script_sig.len() + script_pubkey.len() > MAX_SCRIPT_SIZE {
        return false;
    }
    let message = signature_message(tx, input_index);
    let mut engine = Engine::new(message);
    if !engine.run(script_sig) {
        return false;
    }
    if !engine.run(script_pubkey) {
        return false;
    }
    engine.succeeded()
}

struct Engine {
    stack: Vec<Vec<u8>>,
    message: Hash,
    op_count: usize,
    sigop_count: usize,
}

impl Engine {
    fn new(message: Hash) -> Self {
        Engine { stack: Vec::new(), message, op_count: 0, sigop_count: 0 }
    }

    fn succeeded(&self) -> bool {
        self.stack.last().map(|top| is_truthy(top)).unwrap_or(false)
    }

    fn push(&mut self, element: Vec<u8>) -> bool {
        if element.len() > MAX_ELEMENT_SIZE || self.stack.len() >= MAX_STACK_DEPTH {
            return false;
        }
        self.stack.push(element);
        true
    }

    fn run(&mut self, script: &[u8]) -> bool {
        // Execution-branch stack for IF/ELSE/ENDIF; an entry is whether the
        // branch is live.
        let mut exec: Vec<bool> = Vec::new();
        let mut pc = 0usize;
        while pc < script.len() {
            let op = script[pc];
            pc += 1;
            let executing = exec.iter().all(|live| *live);

            // Pushes are not counted against the op limit.
            if op > OP_16 {
                self.op_count += 1;
                if self.op_count > MAX_OPS {
                    return false;
                }
            }

            // Data pushes first; they must be skipped over even on dead
            // branches.
            if op <= OP_PUSHDATA2 {
                let len = match op {
                    OP_0 => 0usize,
                    OP_PUSHDATA1 => {
                        if pc >= script.len() {
                            return false;
                        }
                        let n = script[pc] as usize;
                        pc += 1;
                        n
                    }
                    OP_PUSHDATA2 => {
                        if pc + 2 > script.len() {
                            return false;
                        }
                        let n = u16::from_le_bytes([script[pc], script[pc + 1]]) as usize;
                        pc += 2;
                        n
                    }
                    direct => direct as usize,
                };
                if pc + len > script.len() {
                    return false;
                }
                if executing && !self.push(script[pc..pc + len].to_vec()) {
                    return false;
                }
                pc += len;
                continue;
            }

            if (OP_1..=OP_16).contains(&op) {
                if executing && !self.push(vec![op - OP_1 + 1]) {
                    return false;
                }
                continue;
            }

            match op {
                OP_IF => {
                    if executing {
                        let Some(condition) = self.stack.pop() else { return false };
                        exec.push(is_truthy(&condition));
                    } else {
                        exec.push(false);
                    }
                }
                OP_ELSE => {
                    let Some(live) = exec.last_mut() else { return false };
                    *live = !*live;
                }
                OP_ENDIF => {
                    if exec.pop().is_none() {
                        return false;
                    }
                }
                _ if !executing => {}
                OP_NOP => {}
                OP_RETURN => return false,
                OP_VERIFY => {
                    let Some(top) = self.stack.pop() else { return false };
                    if !is_truthy(&top) {
                        return false;
                    }
                }
                OP_DROP => {
                    if self.stack.pop().is_none() {
                        return false;
                    }
                }
                OP_DUP => {
                    let Some(top) = self.stack.last().cloned() else { return false };
                    if !self.push(top) {
                        return false;
                    }
                }
                OP_SWAP => {
                    let len = self.stack.len();
                    if len < 2 {
                        return false;
                    }
                    self.stack.swap(len - 1, len - 2);
                }
                OP_EQUAL | OP_EQUALVERIFY => {
                    let (Some(a), Some(b)) = (self.stack.pop(), self.stack.pop()) else {
                        return false;
                    };
                    let equal = a == b;
                    if op == OP_EQUALVERIFY {
                        if !equal {
                            return false;
                        }
                    } else if !self.push(vec![equal as u8]) {
                        return false;
                    }
                }
                OP_SHA256 => {
                    let Some(top) = self.stack.pop() else { return false };
                    if !self.push(sha256(&top).to_vec()) {
                        return false;
                    }
                }
                OP_HASH160 => {
                    let Some(top) = self.stack.pop() else { return false };
                    if !self.push(hash160(&top).to_vec()) {
                        return false;
                    }
                }
                OP_HASH256 => {
                    let Some(top) = self.stack.pop() else { return false };
                    if !self.push(hash256(&top).to_vec()) {
                        return false;
                    }
                }
                OP_CHECKSIG | OP_CHECKSIGVERIFY => {
                    self.sigop_count += 1;
                    if self.sigop_count > MAX_SIGOPS {
                        return false;
                    }
                    let (Some(pubkey), Some(sig)) = (self.stack.pop(), self.stack.pop()) else {
                        return false;
                    };
                    let valid = verify_signature(&pubkey, &self.message, &sig);
                    if op == OP_CHECKSIGVERIFY {
                        if !valid {
                            return false;
                        }
                    } else if !self.push(vec![valid as u8]) {
                        return false;
                    }
                }
                OP_CHECKMULTISIG | OP_CHECKMULTISIGVERIFY => {
                    if !self.checkmultisig() {
                        return false;
                    }
                    if op == OP_CHECKMULTISIGVERIFY {
                        let Some(top) = self.stack.pop() else { return false };
                        if !is_truthy(&top) {
                            return false;
                        }
                    }
                }
                _ => return false,
            }
        }
        exec.is_empty()
    }

    /// Pops `n`, `n` pubkeys, `m`, `m` signatures; pushes whether every
    /// signature matches a distinct pubkey, in order.
    fn checkmultisig(&mut self) -> bool {
        let Some(n) = self.stack.pop().and_then(|e| small_int(&e)) else { return false };
        if n as usize > self.stack.len() || n > 16 {
            return false;
        }
        let split = self.stack.len() - n as usize;
        let pubkeys = self.stack.split_off(split);

        let Some(m) = self.stack.pop().and_then(|e| small_int(&e)) else { return false };
        if m > n || m as usize > self.stack.len() {
            return false;
        }
        self.sigop_count += n as usize;
        if self.sigop_count > MAX_SIGOPS {
            return false;
        }
        let split = self.stack.len() - m as usize;
        let sigs = self.stack.split_off(split);

        // Each signature must match a pubkey, consuming pubkeys left to
        // right so ordering is enforced.
        let mut key_iter = pubkeys.iter();
        let mut matched = 0usize;
        for sig in &sigs {
            for pubkey in key_iter.by_ref() {
                if verify_signature(pubkey, &self.message, sig) {
                    matched += 1;
                    break;
                }
            }
        }
        self.push(vec![(matched == sigs.len()) as u8])
    }
}

fn is_truthy(element: &[u8]) -> bool {
    element.iter().any(|b| *b != 0)
}

fn small_int(element: &[u8]) -> Option<u8> {
    match element {
        [] => Some(0),
        [n] if *n <= 16 => Some(*n),
        _ => None,
    }
}

fn push_slice(script: &mut Vec<u8>, data: &[u8]) {
    debug_assert!(data.len() <= 0x4b);
    script.push(data.len() as u8);
    script.extend_from_slice(data);
}

/// `DUP HASH160 <hash> EQUALVERIFY CHECKSIG`.
pub fn p2pkh_script(pubkey_hash: &PubKeyHash) -> Vec<u8> {
    let mut script = vec![OP_DUP, OP_HASH160];
    push_slice(&mut script, pubkey_hash);
    script.extend_from_slice(&[OP_EQUALVERIFY, OP_CHECKSIG]);
    script
}

/// Unlocking script for P2PKH: `<sig> <pubkey>`.
pub fn p2pkh_script_sig(signature: &[u8], pubkey: &[u8]) -> Vec<u8> {
    let mut script = Vec::new();
    push_slice(&mut script, signature);
    push_slice(&mut script, pubkey);
    script
}

/// Bare pubkey form: `<pubkey> CHECKSIG`. Stake kernel outputs use this so
/// the block signer's key is recoverable from the script.
pub fn pubkey_script(pubkey: &[u8]) -> Vec<u8> {
    let mut script = Vec::new();
    push_slice(&mut script, pubkey);
    script.push(OP_CHECKSIG);
    script
}

/// Unlocking script for the bare pubkey form: `<sig>`.
pub fn pubkey_script_sig(signature: &[u8]) -> Vec<u8> {
    let mut script = Vec::new();
    push_slice(&mut script, signature);
    script
}

/// Extracts the key from a bare pubkey script.
pub fn extract_pubkey(script: &[u8]) -> Option<[u8; 32]> {
    if script.len() == 34 && script[0] == 32 && script[33] == OP_CHECKSIG {
        let mut pubkey = [0u8; 32];
        pubkey.copy_from_slice(&script[1..33]);
        Some(pubkey)
    } else {
        None
    }
}

/// `m <key…> n CHECKMULTISIG`. Requires `1 <= m <= pubkeys.len() <= 16`.
pub fn multisig_script(m: u8, pubkeys: &[[u8; 32]]) -> Vec<u8> {
    debug_assert!(m >= 1 && m as usize <= pubkeys.len());
    debug_assert!(pubkeys.len() <= 16);
    let mut script = vec![OP_1 + m - 1];
    for pubkey in pubkeys {
        push_slice(&mut script, pubkey);
    }
    script.push(OP_1 + pubkeys.len() as u8 - 1);
    script.push(OP_CHECKMULTISIG);
    script
}

/// Provably unspendable data carrier: `RETURN <data>`.
pub fn data_carrier_script(data: &[u8]) -> Vec<u8> {
    let mut script = vec![OP_RETURN];
    push_slice(&mut script, data);
    script
}

/// Whether a script is the unspendable data-carrier form.
pub fn is_data_carrier(script: &[u8]) -> bool {
    script.first() == Some(&OP_RETURN)
}
