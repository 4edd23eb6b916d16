//! Chain reorganization behavior: heaviest-chain selection, byte-exact state
//! restore when a candidate branch fails mid-connect, and serial accounting
//! across branch switches.

mod common;

use argent_consensus::chain::{BlockDisposition, BlockStatus};
use argent_consensus::ConsensusError;
use argent_masternode::MasternodeAnnounce;
use argent_types::veil::VeilDenomination;
use argent_types::{TxOutput, COIN};
use argent_crypto::{hash160, ArgentKeyPair};
use argent_consensus::script::p2pkh_script;

use common::{Harness, BASE_TIME, SPACING, VOUT_COLLATERAL, VOUT_FUNDS};

fn time_at(height: u64, offset: u64) -> u64 {
    BASE_TIME + SPACING * height + offset
}

#[test]
fn longer_fork_displaces_shorter_chain() {
    let mut h = Harness::new();
    h.mine_empty(3);
    let original_tip = h.tip();
    assert_eq!(original_tip.height, 3);

    // A four-block branch from genesis carries more cumulative work.
    let mut parent = h.genesis.hash();
    let mut fork_tip = parent;
    for height in 1..=4u64 {
        let block = h.build_block_on(parent, height, time_at(height, 7), vec![], 0, 1);
        fork_tip = block.hash();
        let disposition = h.chain.accept_block(block, time_at(height, 7)).unwrap();
        if height < 4 {
            assert_eq!(disposition, BlockDisposition::SideChain);
        } else {
            assert_eq!(disposition, BlockDisposition::ActiveTip);
        }
        parent = fork_tip;
    }

    let tip = h.tip();
    assert_eq!(tip.height, 4);
    assert_eq!(tip.hash, fork_tip);
    assert!(tip.chain_work > original_tip.chain_work);
    // The displaced blocks stay indexed as a valid side branch.
    assert_eq!(
        h.chain.block_index_entry(&original_tip.hash).map(|e| e.status),
        Some(BlockStatus::FullyValid)
    );
}

#[test]
fn equal_work_branch_never_displaces_the_tip() {
    let mut h = Harness::new();
    h.mine_empty(2);
    let tip = h.tip();

    let rival = h.build_block_on(
        h.chain.block_hash_at_height(1).unwrap(),
        2,
        time_at(2, 7),
        vec![],
        0,
        9,
    );
    let disposition = h.chain.accept_block(rival, time_at(2, 7)).unwrap();
    assert_eq!(disposition, BlockDisposition::SideChain);
    assert_eq!(h.tip().hash, tip.hash);
}

#[test]
fn failed_branch_restores_state_byte_exactly() {
    let mut h = Harness::new();
    h.mine_empty(2);

    // A registered masternode, so the connected block at height 3 carries a
    // payment whose bookkeeping the rollback must also restore.
    let operator = ArgentKeyPair::generate();
    let payee = p2pkh_script(&hash160(&operator.public_key()));
    let mut announce = MasternodeAnnounce {
        collateral: h.genesis_outpoint(VOUT_COLLATERAL),
        payee_script: payee.clone(),
        operator_pubkey: operator.public_key(),
        service_address: "127.0.0.1:51472".to_string(),
        protocol_version: 70915,
        signed_at: time_at(2, 0),
        signature: Vec::new(),
    };
    announce.signature = operator.sign(&announce.signing_message().unwrap()).to_vec();
    h.chain.register_masternode(announce).unwrap();

    // Height 3: a spend of the matured genesis funds plus the owed payment.
    let spend = h.signed_standard(
        &h.owner,
        vec![h.genesis_outpoint(VOUT_FUNDS)],
        vec![
            TxOutput::new(300 * COIN, h.owner_script()),
            TxOutput::new(200 * COIN, h.owner_script()),
        ],
    );
    let reward = h.params.masternode_reward(3);
    let subsidy = h.params.block_subsidy(3);
    let a3 = h.build_block_with_coinbase(
        h.tip().hash,
        3,
        time_at(3, 0),
        vec![
            TxOutput::new(subsidy - reward, h.owner_script()),
            TxOutput::new(reward, payee.clone()),
        ],
        vec![spend],
        0,
    );
    let a3_hash = a3.hash();
    h.chain.accept_block(a3, time_at(3, 0)).unwrap();

    let utxos_before = h.chain.utxo_snapshot().unwrap();
    let masternodes_before = h.chain.masternode_registry().snapshot().unwrap();
    let veil_before = h.chain.veil_state().snapshot().unwrap();

    // A heavier branch from height 2 whose second block overpays the
    // subsidy. Connecting it forces a reorganization that fails at the
    // second block.
    let parent = h.chain.block_hash_at_height(2).unwrap();
    let f3 = h.build_block_with_coinbase(
        parent,
        3,
        time_at(3, 7),
        vec![
            TxOutput::new(subsidy - reward, h.owner_script()),
            TxOutput::new(reward, payee),
        ],
        vec![],
        0,
    );
    let f3_hash = f3.hash();
    assert_eq!(
        h.chain.accept_block(f3, time_at(3, 7)).unwrap(),
        BlockDisposition::SideChain
    );

    let f4 = h.build_block_with_coinbase(
        f3_hash,
        4,
        time_at(4, 7),
        vec![TxOutput::new(h.params.block_subsidy(4) + 1, h.owner_script())],
        vec![],
        0,
    );
    let f4_hash = f4.hash();
    let err = h.chain.accept_block(f4, time_at(4, 7)).unwrap_err();
    assert!(matches!(err, ConsensusError::BadSubsidy { .. }));

    // The original chain is back, and every state snapshot is byte-equal.
    assert_eq!(h.tip().hash, a3_hash);
    assert_eq!(h.chain.utxo_snapshot().unwrap(), utxos_before);
    assert_eq!(
        h.chain.masternode_registry().snapshot().unwrap(),
        masternodes_before
    );
    assert_eq!(h.chain.veil_state().snapshot().unwrap(), veil_before);
    assert_eq!(
        h.chain.block_index_entry(&f4_hash).map(|e| e.status),
        Some(BlockStatus::Invalid)
    );
}

#[test]
fn serials_release_and_reclaim_across_reorg() {
    let mut h = Harness::new();
    h.mine_empty(2);
    let denomination = VeilDenomination::Ten;
    let c1 = [0x11u8; 32];
    let c2 = [0x22u8; 32];
    let serial = [0x77u8; 32];

    // Height 3: first mint from the matured genesis funds.
    let mint1 = h.signed_mint(h.genesis_outpoint(VOUT_FUNDS), 500 * COIN, denomination, c1);
    let mint1_change = argent_types::OutPoint::new(mint1.txid(), 1);
    h.mine(vec![mint1], 0);
    // Height 4: the subsequent mint the first needs to mature.
    let mint2 = h.signed_mint(mint1_change, 490 * COIN, denomination, c2);
    h.mine(vec![mint2], 0);
    // Height 5: buries the checkpoint the spend will reference.
    h.mine_empty(1);

    // Height 6: the spend consumes the serial.
    let spend = h.build_spend(denomination, &c1, 5, serial);
    h.mine(vec![spend], 0);
    assert!(h.chain.veil_state().is_serial_spent(&serial));

    // A heavier branch from height 5 disconnects the spend; the serial is
    // released.
    let parent = h.chain.block_hash_at_height(5).unwrap();
    let f6 = h.build_block_on(parent, 6, time_at(6, 7), vec![], 0, 1);
    let f6_hash = f6.hash();
    h.chain.accept_block(f6, time_at(6, 7)).unwrap();
    let f7 = h.build_block_on(f6_hash, 7, time_at(7, 7), vec![], 0, 1);
    let f7_hash = f7.hash();
    assert_eq!(
        h.chain.accept_block(f7, time_at(7, 7)).unwrap(),
        BlockDisposition::ActiveTip
    );
    assert!(!h.chain.veil_state().is_serial_spent(&serial));

    // The same serial can now be consumed on the new branch; the mint and
    // its checkpoint live below the fork point.
    let respend = h.build_spend(denomination, &c1, 5, serial);
    let b8 = h.build_block_on(f7_hash, 8, time_at(8, 7), vec![respend], 0, 0);
    assert_eq!(
        h.chain.accept_block(b8, time_at(8, 7)).unwrap(),
        BlockDisposition::ActiveTip
    );
    assert!(h.chain.veil_state().is_serial_spent(&serial));
}
