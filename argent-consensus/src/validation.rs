//! Transaction and block validation.
//!
//! Transaction validation is an explicit two-stage state machine: a pure
//! syntactic stage that needs no chain state, then a contextual stage
//! against a UTXO view and the veil state. A rejection at either stage is
//! terminal for that transaction object.

use std::collections::HashSet;

use log::warn;
use rayon::prelude::*;

use argent_crypto::merkle_root;
use argent_types::veil::{MintPayload, SpendPayload};
use argent_types::{
    Amount, Block, ConsensusParams, Transaction, TxKind, Utxo, MAX_MONEY,
};
use argent_veil::VeilState;

use crate::error::ConsensusError;
use crate::script::{data_carrier_script, verify_script};
use crate::utxo_set::UtxoView;

/// Validation progress for one transaction. `Rejected` is terminal.
#[derive(Debug, Clone, PartialEq)]
pub enum TxValidationState {
    Unchecked,
    SyntacticallyValid,
    ContextuallyValid { fee: Amount },
    Rejected(ConsensusError),
}

impl Default for TxValidationState {
    fn default() -> Self {
        TxValidationState::Unchecked
    }
}

impl TxValidationState {
    pub fn new() -> Self {
        TxValidationState::Unchecked
    }

    /// Runs the pure checks. Valid transitions: `Unchecked →
    /// SyntacticallyValid | Rejected`.
    pub fn advance_syntactic(
        &mut self,
        tx: &Transaction,
        params: &ConsensusParams,
    ) -> Result<(), ConsensusError> {
        match self {
            TxValidationState::Unchecked => match check_transaction_syntactic(tx, params) {
                Ok(()) => {
                    *self = TxValidationState::SyntacticallyValid;
                    Ok(())
                }
                Err(err) => {
                    *self = TxValidationState::Rejected(err.clone());
                    Err(err)
                }
            },
            TxValidationState::Rejected(err) => Err(err.clone()),
            _ => Ok(()),
        }
    }

    /// Runs the stateful checks. Requires the syntactic stage to have
    /// passed first.
    pub fn advance_contextual(
        &mut self,
        tx: &Transaction,
        ctx: &TxContext<'_>,
    ) -> Result<Amount, ConsensusError> {
        match self {
            TxValidationState::SyntacticallyValid => {
                match check_transaction_contextual(tx, ctx) {
                    Ok(fee) => {
                        *self = TxValidationState::ContextuallyValid { fee };
                        Ok(fee)
                    }
                    Err(err) => {
                        *self = TxValidationState::Rejected(err.clone());
                        Err(err)
                    }
                }
            }
            TxValidationState::ContextuallyValid { fee } => Ok(*fee),
            TxValidationState::Rejected(err) => Err(err.clone()),
            TxValidationState::Unchecked => Err(ConsensusError::CorruptState(
                "contextual validation before syntactic".to_string(),
            )),
        }
    }

    pub fn fee(&self) -> Option<Amount> {
        match self {
            TxValidationState::ContextuallyValid { fee } => Some(*fee),
            _ => None,
        }
    }

    pub fn rejection(&self) -> Option<&ConsensusError> {
        match self {
            TxValidationState::Rejected(err) => Some(err),
            _ => None,
        }
    }
}

/// Chain context for the contextual stage.
pub struct TxContext<'a> {
    pub view: &'a dyn UtxoView,
    pub veil: &'a VeilState,
    pub params: &'a ConsensusParams,
    /// Height the transaction would confirm at.
    pub height: u64,
    /// Mempool entry enforces the relay fee floor; block connection does
    /// not.
    pub require_fee: bool,
}

/// The burn output a veil mint must carry: the denomination's face value
/// locked under a data carrier committing to the mint.
pub fn mint_burn_output(mint: &MintPayload) -> (Amount, Vec<u8>) {
    (mint.denomination.value(), data_carrier_script(&mint.commitment))
}

/// Pure structural checks, no chain state.
pub fn check_transaction_syntactic(
    tx: &Transaction,
    params: &ConsensusParams,
) -> Result<(), ConsensusError> {
    let size = bincode::serialized_size(tx)? as usize;
    if size > params.max_tx_size {
        return Err(ConsensusError::TransactionTooLarge { size, limit: params.max_tx_size });
    }
    if tx.outputs().is_empty() {
        return Err(ConsensusError::EmptyTransaction);
    }
    if tx.inputs().is_empty() && tx.kind() != TxKind::VeilSpend {
        return Err(ConsensusError::EmptyTransaction);
    }

    let mut total: Amount = 0;
    for output in tx.outputs() {
        if output.value > MAX_MONEY {
            return Err(ConsensusError::ValueOutOfRange);
        }
        total = total.checked_add(output.value).ok_or(ConsensusError::ValueOutOfRange)?;
    }
    if total > MAX_MONEY {
        return Err(ConsensusError::ValueOutOfRange);
    }

    let mut seen = HashSet::new();
    for input in tx.inputs() {
        if !seen.insert(input.previous_output.clone()) {
            return Err(ConsensusError::DuplicateInput(input.previous_output.clone()));
        }
    }

    match tx {
        Transaction::Coinbase { inputs, .. } => {
            if inputs.len() != 1 || !inputs[0].previous_output.is_null() {
                return Err(ConsensusError::BadCoinbase(
                    "coinbase must have exactly one null input".to_string(),
                ));
            }
        }
        Transaction::Coinstake { inputs, outputs, .. } => {
            if inputs.iter().any(|i| i.previous_output.is_null()) {
                return Err(ConsensusError::BadCoinstake(
                    "coinstake inputs must reference real outputs".to_string(),
                ));
            }
            if outputs.len() < 2 || !outputs[0].is_empty_marker() {
                return Err(ConsensusError::BadCoinstake(
                    "first output must be the empty marker".to_string(),
                ));
            }
            if outputs[1..].iter().any(|o| o.is_empty_marker()) {
                return Err(ConsensusError::BadCoinstake(
                    "only the first output may be the marker".to_string(),
                ));
            }
        }
        Transaction::VeilMint { inputs, outputs, mint, .. } => {
            if inputs.iter().any(|i| i.previous_output.is_null()) {
                return Err(ConsensusError::BadVeilPayload(
                    "mint inputs must reference real outputs".to_string(),
                ));
            }
            if !params.veil_denominations.contains(&mint.denomination) {
                return Err(ConsensusError::BadMintDenomination(mint.denomination.value()));
            }
            let (burn_value, burn_script) = mint_burn_output(mint);
            let burns = outputs
                .iter()
                .filter(|o| o.value == burn_value && o.script_pubkey == burn_script)
                .count();
            if burns != 1 {
                return Err(ConsensusError::BadVeilPayload(
                    "mint must burn exactly the denomination value to the mint carrier"
                        .to_string(),
                ));
            }
        }
        Transaction::VeilSpend { spend, outputs, .. } => {
            check_spend_shape(spend, params)?;
            let out_total: Amount = outputs.iter().map(|o| o.value).sum();
            if out_total > spend.denomination.value() {
                return Err(ConsensusError::BadVeilPayload(
                    "spend outputs exceed the denomination value".to_string(),
                ));
            }
        }
        Transaction::Standard { inputs, .. } => {
            if inputs.iter().any(|i| i.previous_output.is_null()) {
                return Err(ConsensusError::BadCoinbase(
                    "null input outside a coinbase".to_string(),
                ));
            }
        }
    }
    Ok(())
}

fn check_spend_shape(spend: &SpendPayload, params: &ConsensusParams) -> Result<(), ConsensusError> {
    if !params.veil_denominations.contains(&spend.denomination) {
        return Err(ConsensusError::BadMintDenomination(spend.denomination.value()));
    }
    if spend.member.is_empty() || spend.witness.is_empty() {
        return Err(ConsensusError::BadVeilPayload(
            "spend proof is missing member or witness".to_string(),
        ));
    }
    if spend.serial == [0u8; 32] {
        return Err(ConsensusError::BadVeilPayload("spend serial is zero".to_string()));
    }
    Ok(())
}

/// Contextual checks against a UTXO view and the veil state. Returns the
/// transaction fee.
pub fn check_transaction_contextual(
    tx: &Transaction,
    ctx: &TxContext<'_>,
) -> Result<Amount, ConsensusError> {
    match tx.kind() {
        // The coinbase's reward bound is a block-level rule.
        TxKind::Coinbase => return Ok(0),
        TxKind::VeilSpend => {
            let spend = tx.spend_payload().ok_or_else(|| {
                ConsensusError::CorruptState("veil spend without payload".to_string())
            })?;
            ctx.veil.validate_spend(spend, ctx.params)?;
            let out_total: Amount = tx.outputs().iter().map(|o| o.value).sum();
            // Shape check bounded outputs by the face value.
            let fee = spend.denomination.value() - out_total;
            check_relay_fee(tx, fee, ctx)?;
            return Ok(fee);
        }
        TxKind::Standard | TxKind::Coinstake | TxKind::VeilMint => {}
    }

    // Resolve every input against the view.
    let mut resolved: Vec<Utxo> = Vec::with_capacity(tx.inputs().len());
    let mut input_total: Amount = 0;
    for input in tx.inputs() {
        let utxo = ctx
            .view
            .utxo(&input.previous_output)
            .ok_or_else(|| ConsensusError::MissingUtxo(input.previous_output.clone()))?;
        if utxo.requires_maturity() {
            let depth = ctx.height.saturating_sub(utxo.creation_height);
            if depth < ctx.params.coinbase_maturity {
                return Err(ConsensusError::ImmatureSpend {
                    outpoint: input.previous_output.clone(),
                    depth,
                    required: ctx.params.coinbase_maturity,
                });
            }
        }
        input_total = input_total
            .checked_add(utxo.output.value)
            .ok_or(ConsensusError::ValueOutOfRange)?;
        resolved.push(utxo);
    }

    // Script verification, one unit per input.
    let inputs = tx.inputs();
    let failed = inputs
        .par_iter()
        .zip(resolved.par_iter())
        .enumerate()
        .find_map_any(|(index, (input, utxo))| {
            if verify_script(&input.script_sig, &utxo.output.script_pubkey, tx, index) {
                None
            } else {
                Some(input.previous_output.clone())
            }
        });
    if let Some(outpoint) = failed {
        warn!("script verification failed for {}", outpoint);
        return Err(ConsensusError::ScriptVerificationFailed(outpoint));
    }

    // A coinstake's outputs exceed its inputs by the stake reward; the
    // bound on that reward is a block-level rule.
    if tx.is_coinstake() {
        return Ok(0);
    }

    let output_total = tx.total_output_value().ok_or(ConsensusError::ValueOutOfRange)?;
    if output_total > input_total {
        return Err(ConsensusError::Overspend { inputs: input_total, outputs: output_total });
    }
    let fee = input_total - output_total;
    check_relay_fee(tx, fee, ctx)?;
    Ok(fee)
}

fn check_relay_fee(
    tx: &Transaction,
    fee: Amount,
    ctx: &TxContext<'_>,
) -> Result<(), ConsensusError> {
    if !ctx.require_fee {
        return Ok(());
    }
    let size = bincode::serialized_size(tx)? as u64;
    let required = (size / 1000 + 1) * ctx.params.min_relay_tx_fee;
    if fee < required {
        return Err(ConsensusError::InsufficientFee { fee, required });
    }
    Ok(())
}

/// Pure block-shape checks: size, transaction placement, merkle commitment
/// and the duplicate-txid guard.
pub fn check_block_syntactic(block: &Block, params: &ConsensusParams) -> Result<(), ConsensusError> {
    if block.transactions.is_empty() {
        return Err(ConsensusError::EmptyBlock);
    }
    let size = bincode::serialized_size(block)? as usize;
    if size > params.max_block_size {
        return Err(ConsensusError::BlockTooLarge { size, limit: params.max_block_size });
    }
    if !block.transactions[0].is_coinbase() {
        return Err(ConsensusError::BadCoinbase(
            "first transaction must be the coinbase".to_string(),
        ));
    }
    for (index, tx) in block.transactions.iter().enumerate() {
        if index > 0 && tx.is_coinbase() {
            return Err(ConsensusError::BadCoinbase(format!(
                "unexpected coinbase at index {index}"
            )));
        }
        if tx.is_coinstake() && index != 1 {
            return Err(ConsensusError::BadCoinstake(format!(
                "coinstake at index {index}, only index 1 is allowed"
            )));
        }
    }

    if block.header.height > params.last_pow_height && !block.is_proof_of_stake() {
        return Err(ConsensusError::InvalidHeader(
            "proof of stake required at this height".to_string(),
        ));
    }
    if block.is_proof_of_stake() {
        let coinbase_total = block.transactions[0].total_output_value();
        if coinbase_total != Some(0) {
            return Err(ConsensusError::BadCoinbase(
                "coinbase must pay zero in a proof-of-stake block".to_string(),
            ));
        }
    }

    // Duplicate txids would let a mutated block commit to the same merkle
    // root as an honest one.
    let mut txids = Vec::with_capacity(block.transactions.len());
    let mut seen = HashSet::new();
    for tx in &block.transactions {
        let txid = tx.txid();
        if !seen.insert(txid) {
            return Err(ConsensusError::DuplicateTxId(hex::encode(txid)));
        }
        txids.push(txid);
    }
    if merkle_root(&txids) != block.header.merkle_root {
        return Err(ConsensusError::BadMerkleRoot);
    }
    Ok(())
}

/// Median of the given timestamps, the floor for a child's timestamp.
/// Callers pass the last (up to) eleven block times.
pub fn median_time_past(timestamps: &[u64]) -> u64 {
    if timestamps.is_empty() {
        return 0;
    }
    let mut sorted = timestamps.to_vec();
    sorted.sort_unstable();
    sorted[sorted.len() / 2]
}

#[cfg(test)]
mod tests {
    use super::*;
    use argent_crypto::{hash160, ArgentKeyPair};
    use argent_types::veil::VeilDenomination;
    use argent_types::{BlockHeader, OutPoint, TxInput, TxOutput};
    use argent_veil::VeilState;

    use crate::script::{p2pkh_script, p2pkh_script_sig, signature_message};
    use crate::utxo_set::UtxoSet;

    fn params() -> ConsensusParams {
        ConsensusParams::regtest()
    }

    fn standard_tx(inputs: Vec<TxInput>, outputs: Vec<TxOutput>) -> Transaction {
        Transaction::Standard { version: 1, inputs, outputs, lock_time: 0 }
    }

    fn ctx<'a>(
        view: &'a UtxoSet,
        veil: &'a VeilState,
        params: &'a ConsensusParams,
        height: u64,
        require_fee: bool,
    ) -> TxContext<'a> {
        TxContext { view, veil, params, height, require_fee }
    }

    #[test]
    fn duplicate_inputs_rejected() {
        let params = params();
        let input = TxInput::new(OutPoint::new([1u8; 32], 0), vec![]);
        let tx = standard_tx(vec![input.clone(), input], vec![TxOutput::new(1, vec![0xAC])]);
        let err = check_transaction_syntactic(&tx, &params).unwrap_err();
        assert!(matches!(err, ConsensusError::DuplicateInput(_)));
    }

    #[test]
    fn output_overflow_rejected() {
        let params = params();
        let input = TxInput::new(OutPoint::new([1u8; 32], 0), vec![]);
        let tx = standard_tx(
            vec![input],
            vec![TxOutput::new(MAX_MONEY, vec![0xAC]), TxOutput::new(MAX_MONEY, vec![0xAC])],
        );
        let err = check_transaction_syntactic(&tx, &params).unwrap_err();
        assert_eq!(err, ConsensusError::ValueOutOfRange);
    }

    #[test]
    fn coinstake_marker_rules() {
        let params = params();
        let input = TxInput::new(OutPoint::new([1u8; 32], 0), vec![]);
        // Missing marker.
        let bad = Transaction::Coinstake {
            version: 1,
            inputs: vec![input.clone()],
            outputs: vec![TxOutput::new(1, vec![0xAC]), TxOutput::new(1, vec![0xAC])],
            lock_time: 0,
        };
        assert!(matches!(
            check_transaction_syntactic(&bad, &params),
            Err(ConsensusError::BadCoinstake(_))
        ));
        // Correct shape.
        let good = Transaction::Coinstake {
            version: 1,
            inputs: vec![input],
            outputs: vec![TxOutput::empty_marker(), TxOutput::new(1, vec![0xAC])],
            lock_time: 0,
        };
        check_transaction_syntactic(&good, &params).unwrap();
    }

    #[test]
    fn mint_requires_exact_burn() {
        let params = params();
        let mint = MintPayload { denomination: VeilDenomination::Ten, commitment: [7u8; 32] };
        let input = TxInput::new(OutPoint::new([1u8; 32], 0), vec![]);
        let (burn_value, burn_script) = mint_burn_output(&mint);

        let good = Transaction::VeilMint {
            version: 1,
            inputs: vec![input.clone()],
            outputs: vec![TxOutput::new(burn_value, burn_script.clone())],
            mint: mint.clone(),
            lock_time: 0,
        };
        check_transaction_syntactic(&good, &params).unwrap();

        // Burning the wrong value fails.
        let bad = Transaction::VeilMint {
            version: 1,
            inputs: vec![input],
            outputs: vec![TxOutput::new(burn_value - 1, burn_script)],
            mint,
            lock_time: 0,
        };
        assert!(matches!(
            check_transaction_syntactic(&bad, &params),
            Err(ConsensusError::BadVeilPayload(_))
        ));
    }

    #[test]
    fn contextual_before_syntactic_is_an_error() {
        let params = params();
        let utxos = UtxoSet::new();
        let veil = VeilState::new(&params).unwrap();
        let tx = standard_tx(
            vec![TxInput::new(OutPoint::new([1u8; 32], 0), vec![])],
            vec![TxOutput::new(1, vec![0xAC])],
        );
        let mut state = TxValidationState::new();
        let err = state
            .advance_contextual(&tx, &ctx(&utxos, &veil, &params, 1, false))
            .unwrap_err();
        assert!(matches!(err, ConsensusError::CorruptState(_)));
    }

    #[test]
    fn rejection_is_terminal() {
        let params = params();
        let input = TxInput::new(OutPoint::new([1u8; 32], 0), vec![]);
        let tx = standard_tx(vec![input.clone(), input], vec![TxOutput::new(1, vec![0xAC])]);
        let mut state = TxValidationState::new();
        assert!(state.advance_syntactic(&tx, &params).is_err());
        assert!(state.rejection().is_some());
        // A second attempt replays the rejection.
        assert!(state.advance_syntactic(&tx, &params).is_err());
    }

    #[test]
    fn full_pipeline_with_signed_spend() {
        let params = params();
        let veil = VeilState::new(&params).unwrap();
        let pair = ArgentKeyPair::generate();
        let script_pubkey = p2pkh_script(&hash160(&pair.public_key()));

        let mut utxos = UtxoSet::new();
        let prevout = OutPoint::new([1u8; 32], 0);
        utxos
            .create(prevout.clone(), Utxo::new(TxOutput::new(100, script_pubkey), 1))
            .unwrap();

        let mut tx = standard_tx(
            vec![TxInput::new(prevout, vec![])],
            vec![TxOutput::new(90, vec![0xAC])],
        );
        let sig = pair.sign(&signature_message(&tx, 0));
        if let Transaction::Standard { inputs, .. } = &mut tx {
            inputs[0].script_sig = p2pkh_script_sig(&sig, &pair.public_key());
        }

        let mut state = TxValidationState::new();
        state.advance_syntactic(&tx, &params).unwrap();
        let fee = state
            .advance_contextual(&tx, &ctx(&utxos, &veil, &params, 10, true))
            .unwrap();
        assert_eq!(fee, 10);
        assert_eq!(state.fee(), Some(10));
    }

    #[test]
    fn overspend_rejected_as_consensus_violation() {
        let params = params();
        let veil = VeilState::new(&params).unwrap();
        let pair = ArgentKeyPair::generate();
        let script_pubkey = p2pkh_script(&hash160(&pair.public_key()));

        let mut utxos = UtxoSet::new();
        let prevout = OutPoint::new([1u8; 32], 0);
        utxos
            .create(prevout.clone(), Utxo::new(TxOutput::new(100, script_pubkey), 1))
            .unwrap();

        let mut tx = standard_tx(
            vec![TxInput::new(prevout, vec![])],
            vec![TxOutput::new(101, vec![0xAC])],
        );
        let sig = pair.sign(&signature_message(&tx, 0));
        if let Transaction::Standard { inputs, .. } = &mut tx {
            inputs[0].script_sig = p2pkh_script_sig(&sig, &pair.public_key());
        }

        let err =
            check_transaction_contextual(&tx, &ctx(&utxos, &veil, &params, 10, false)).unwrap_err();
        assert!(matches!(err, ConsensusError::Overspend { inputs: 100, outputs: 101 }));
        assert_eq!(err.kind(), crate::error::RejectionKind::ConsensusViolation);
    }

    #[test]
    fn missing_and_immature_inputs_rejected() {
        let params = params();
        let veil = VeilState::new(&params).unwrap();
        let mut utxos = UtxoSet::new();

        let tx = standard_tx(
            vec![TxInput::new(OutPoint::new([1u8; 32], 0), vec![])],
            vec![TxOutput::new(1, vec![0xAC])],
        );
        let err =
            check_transaction_contextual(&tx, &ctx(&utxos, &veil, &params, 10, false)).unwrap_err();
        assert!(matches!(err, ConsensusError::MissingUtxo(_)));

        // A freshly created coinbase output is immature.
        let mut coinbase_utxo = Utxo::new(TxOutput::new(50, vec![0xAC]), 9);
        coinbase_utxo.is_coinbase = true;
        utxos.create(OutPoint::new([1u8; 32], 0), coinbase_utxo).unwrap();
        let err =
            check_transaction_contextual(&tx, &ctx(&utxos, &veil, &params, 10, false)).unwrap_err();
        assert!(matches!(err, ConsensusError::ImmatureSpend { depth: 1, required: 2, .. }));
    }

    #[test]
    fn bad_script_rejected() {
        let params = params();
        let veil = VeilState::new(&params).unwrap();
        let pair = ArgentKeyPair::generate();
        let script_pubkey = p2pkh_script(&hash160(&pair.public_key()));

        let mut utxos = UtxoSet::new();
        let prevout = OutPoint::new([1u8; 32], 0);
        utxos
            .create(prevout.clone(), Utxo::new(TxOutput::new(100, script_pubkey), 1))
            .unwrap();

        // Unsigned spend.
        let tx = standard_tx(vec![TxInput::new(prevout, vec![])], vec![TxOutput::new(1, vec![0xAC])]);
        let err =
            check_transaction_contextual(&tx, &ctx(&utxos, &veil, &params, 10, false)).unwrap_err();
        assert!(matches!(err, ConsensusError::ScriptVerificationFailed(_)));
    }

    #[test]
    fn block_shape_rules() {
        let params = params();
        let coinbase = Transaction::new_coinbase(1, vec![TxOutput::new(1, vec![0xAC])]);
        let txids = [coinbase.txid()];
        let header = BlockHeader {
            version: 1,
            previous_block_hash: [0u8; 32],
            merkle_root: merkle_root(&txids),
            timestamp: 1_000,
            bits: params.genesis_bits,
            nonce: 0,
            height: 1,
        };
        let block = Block {
            header: header.clone(),
            transactions: vec![coinbase.clone()],
            block_signature: vec![],
        };
        check_block_syntactic(&block, &params).unwrap();

        // Coinbase not first.
        let standard = standard_tx(
            vec![TxInput::new(OutPoint::new([1u8; 32], 0), vec![])],
            vec![TxOutput::new(1, vec![0xAC])],
        );
        let mut swapped = block.clone();
        swapped.transactions = vec![standard, coinbase];
        assert!(matches!(
            check_block_syntactic(&swapped, &params),
            Err(ConsensusError::BadCoinbase(_))
        ));

        // Wrong merkle root.
        let mut bad_root = block.clone();
        bad_root.header.merkle_root = [9u8; 32];
        assert_eq!(
            check_block_syntactic(&bad_root, &params).unwrap_err(),
            ConsensusError::BadMerkleRoot
        );

        // Empty block.
        let empty = Block { header, transactions: vec![], block_signature: vec![] };
        assert_eq!(check_block_syntactic(&empty, &params).unwrap_err(), ConsensusError::EmptyBlock);
    }

    #[test]
    fn duplicate_txid_guard() {
        let params = params();
        let coinbase = Transaction::new_coinbase(1, vec![TxOutput::new(0, vec![0xAC])]);
        let dup = standard_tx(
            vec![TxInput::new(OutPoint::new([1u8; 32], 0), vec![])],
            vec![TxOutput::new(1, vec![0xAC])],
        );
        let txids = [coinbase.txid(), dup.txid(), dup.txid()];
        let header = BlockHeader {
            version: 1,
            previous_block_hash: [0u8; 32],
            merkle_root: merkle_root(&txids),
            timestamp: 1_000,
            bits: params.genesis_bits,
            nonce: 0,
            height: 1,
        };
        let block = Block {
            header,
            transactions: vec![coinbase, dup.clone(), dup],
            block_signature: vec![],
        };
        assert!(matches!(
            check_block_syntactic(&block, &params),
            Err(ConsensusError::DuplicateTxId(_))
        ));
    }

    #[test]
    fn median_time_past_is_the_middle_timestamp() {
        assert_eq!(median_time_past(&[]), 0);
        assert_eq!(median_time_past(&[5]), 5);
        assert_eq!(median_time_past(&[3, 1, 2]), 2);
        assert_eq!(median_time_past(&[1, 2, 3, 4]), 3);
    }
}
