//! Two parties run a fixed-rate loan channel to maturity over the in-process
//! bus, with party A's history persisted to a temporary sled database.
use contract_channel::{
    ChannelBuilder, ChannelConfig,
    fixed_rate::{ContractRole, FixedRateEngine, FixedRateTerms},
    signer::{Ed25519Signer, SignatureFacility},
    transport::{LocalBus, Transport},
    types::TimeStamp,
    utils,
};
use std::sync::Arc;

const DAY: i64 = 86_400;

fn main() -> anyhow::Result<()> {
    let db = Arc::new(sled::Config::new().temporary(true).open()?);
    let bus = LocalBus::new();
    let transport: Arc<dyn Transport> = Arc::new(bus.clone());
    let engine = Arc::new(FixedRateEngine);

    let lender = Arc::new(Ed25519Signer::generate()?);
    let borrower = Arc::new(Ed25519Signer::generate()?);
    let contract_id = utils::new_contract_id()?;

    let start = TimeStamp::new_with(2025, 1, 1, 0, 0, 0)
        .ok_or_else(|| anyhow::anyhow!("invalid start date"))?;
    let terms = FixedRateTerms {
        role: ContractRole::Lender,
        notional: 1_000_000,
        rate_bps: 365,
        maturity: start.add_seconds(90 * DAY),
        initial_exchange: start.clone(),
        interest_cycle_secs: 30 * DAY,
    };

    let b = ChannelBuilder::new(engine.clone(), borrower.clone(), transport.clone())
        .set_contract_id(contract_id.clone())
        .await_first_update()?;
    let a = ChannelBuilder::new(engine, lender.clone(), transport)
        .set_config(ChannelConfig::persistent(db))
        .set_contract_id(contract_id)
        .set_counterparty(borrower.account_id())
        .set_terms(terms)
        .create()?;

    println!("contract {}", a.contract_id());
    println!("  lender   {}", lender.account_id());
    println!("  borrower {}", borrower.account_id());

    b.acknowledge()?;
    println!("day 0: A {:?}, B {:?}", a.channel_state(&start)?, b.channel_state(&start)?);

    for days in [30, 60, 90] {
        let at = start.add_seconds(days * DAY);
        println!("day {days}: A {:?}, B {:?}", a.channel_state(&at)?, b.channel_state(&at)?);

        let proposal = a.sign_and_send_next_update(&at)?;
        b.acknowledge()?;
        println!(
            "  round {} closed, state {:?}",
            proposal.nonce(),
            a.contract_state()
        );
    }

    println!("history holds {} signed updates", a.history().len());
    Ok(())
}
