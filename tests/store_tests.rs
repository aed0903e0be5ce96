//! Persistence of channel history through sled
mod common;

use common::*;
use contract_channel::{
    ChannelConfig, ChannelError, Rejection,
    fixed_rate::ContractRole,
    signer::SignatureFacility,
    store::HistoryLog,
    transport::LocalBus,
};
use sled::open;
use std::sync::Arc;
use tempfile::tempdir;

#[test]
fn restored_channel_resumes_history() -> anyhow::Result<()> {
    // one database per test, sled locks the directory
    let temp_dir = tempdir()?;
    let db = Arc::new(open(temp_dir.path().join("restore.db"))?);

    let pair = open_pair_with(ContractRole::Lender, ChannelConfig::persistent(db.clone()));
    pair.y.acknowledge()?;
    pair.x.sign_and_send_next_update(&day(30))?;
    pair.y.acknowledge()?;

    let contract_id = pair.x.contract_id().to_string();
    let expected = pair.x.history();
    let Pair { x, y, bus, x_signer, .. } = pair;
    x.close();
    assert_eq!(bus.subscriber_count(&contract_id), 1);

    let restored = builder(x_signer, &bus)
        .set_config(ChannelConfig::persistent(db))
        .set_contract_id(contract_id.clone())
        .restore()?;
    assert_eq!(restored.history(), expected);
    assert_eq!(bus.subscriber_count(&contract_id), 2);

    // the restored channel keeps taking part in the protocol
    y.sign_and_send_next_update(&day(60))?;
    assert_eq!(restored.history().len(), expected.len() + 1);
    restored.acknowledge()?;
    assert_eq!(y.history(), restored.history());
    Ok(())
}

#[test]
fn tampered_log_fails_revalidation() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let db = Arc::new(open(temp_dir.path().join("tampered.db"))?);

    let pair = open_pair_with(ContractRole::Lender, ChannelConfig::persistent(db.clone()));
    pair.y.acknowledge()?;
    let contract_id = pair.x.contract_id().to_string();

    let mut forged = pair.x.history()[1].clone();
    forged.contract_update.contract_state.accrued_interest = 7;
    HistoryLog::open(&db, &contract_id)?.append(1, &forged)?;

    let x_signer = pair.x_signer.clone();
    drop(pair);
    let bus = LocalBus::new();

    let err = builder(x_signer.clone(), &bus)
        .set_config(ChannelConfig::persistent(db.clone()))
        .set_contract_id(contract_id.clone())
        .restore()
        .err()
        .unwrap();
    assert!(matches!(
        err,
        ChannelError::CorruptLog {
            index: 1,
            reason: Rejection::InvalidSignature
        }
    ));

    // trusting the log as written skips the replay
    let config = ChannelConfig {
        revalidate_on_restore: false,
        ..ChannelConfig::persistent(db)
    };
    let restored = builder(x_signer, &bus)
        .set_config(config)
        .set_contract_id(contract_id)
        .restore()?;
    assert_eq!(restored.history()[1], forged);
    Ok(())
}

#[test]
fn restore_requires_a_database() {
    let bus = LocalBus::new();
    let err = builder(signer(), &bus)
        .set_contract_id("contract1nothing")
        .restore()
        .err()
        .unwrap();

    assert!(matches!(err, ChannelError::NoDatabase));
}

#[test]
fn restore_of_foreign_account_is_refused() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let db = Arc::new(open(temp_dir.path().join("foreign.db"))?);

    let pair = open_pair_with(ContractRole::Lender, ChannelConfig::persistent(db.clone()));
    let contract_id = pair.x.contract_id().to_string();
    drop(pair);

    let stranger = signer();
    let bus = LocalBus::new();
    let err = builder(stranger.clone(), &bus)
        .set_config(ChannelConfig::persistent(db))
        .set_contract_id(contract_id)
        .restore()
        .err()
        .unwrap();

    assert!(matches!(
        err,
        ChannelError::UnauthorizedSigner(account) if account == stranger.account_id()
    ));
    Ok(())
}
