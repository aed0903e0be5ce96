//! Fixtures shared by the integration tests
#![allow(dead_code)]

use contract_channel::{
    Channel, ChannelBuilder, ChannelConfig,
    fixed_rate::{ContractRole, FixedRateEngine, FixedRateTerms},
    signer::{Ed25519Signer, SignatureFacility},
    transport::{LocalBus, Transport},
    types::TimeStamp,
};
use chrono::Utc;
use std::sync::Arc;

pub const DAY: i64 = 86_400;

pub fn start() -> TimeStamp<Utc> {
    TimeStamp::new_with(2025, 1, 1, 0, 0, 0).unwrap()
}

pub fn day(n: i64) -> TimeStamp<Utc> {
    start().add_seconds(n * DAY)
}

/// 1_000_000 at 3.65% for 90 days, interest every 30 days: 3_000 per cycle.
pub fn terms(role: ContractRole) -> FixedRateTerms {
    FixedRateTerms {
        role,
        notional: 1_000_000,
        rate_bps: 365,
        initial_exchange: start(),
        maturity: day(90),
        interest_cycle_secs: 30 * DAY,
    }
}

/// Signs for real but accepts any signature, so checks behind the signature
/// step can be reached with forged bytes.
pub struct TrustingSigner(pub Ed25519Signer);

impl SignatureFacility for TrustingSigner {
    fn account_id(&self) -> &str {
        self.0.account_id()
    }
    fn sign(&self, message: &[u8]) -> anyhow::Result<String> {
        self.0.sign(message)
    }
    fn verify(&self, _: &str, _: &[u8], _: &str) -> bool {
        true
    }
}

pub fn signer() -> Arc<Ed25519Signer> {
    Arc::new(Ed25519Signer::generate().unwrap())
}

pub fn builder(
    signer: Arc<dyn SignatureFacility>,
    bus: &LocalBus,
) -> ChannelBuilder<FixedRateEngine> {
    let transport: Arc<dyn Transport> = Arc::new(bus.clone());
    ChannelBuilder::new(Arc::new(FixedRateEngine), signer, transport)
}

/// Two connected channels after the initial proposal: `x` is party A (creator),
/// `y` party B waiting on the same contract id.
pub struct Pair {
    pub bus: LocalBus,
    pub x_signer: Arc<Ed25519Signer>,
    pub y_signer: Arc<Ed25519Signer>,
    pub x: Channel<FixedRateEngine>,
    pub y: Channel<FixedRateEngine>,
}

pub fn open_pair(role: ContractRole) -> Pair {
    open_pair_with(role, ChannelConfig::default())
}

pub fn open_pair_with(role: ContractRole, x_config: ChannelConfig) -> Pair {
    let bus = LocalBus::new();
    let x_signer = signer();
    let y_signer = signer();
    let contract_id = contract_channel::utils::new_contract_id().unwrap();

    let y = builder(y_signer.clone(), &bus)
        .set_contract_id(contract_id.clone())
        .await_first_update()
        .unwrap();
    let x = builder(x_signer.clone(), &bus)
        .set_config(x_config)
        .set_contract_id(contract_id)
        .set_counterparty(y_signer.account_id())
        .set_terms(terms(role))
        .create()
        .unwrap();

    Pair {
        bus,
        x_signer,
        y_signer,
        x,
        y,
    }
}

/// Open a pair and close the initial round.
pub fn acknowledged_pair(role: ContractRole) -> Pair {
    let pair = open_pair(role);
    pair.y.acknowledge().unwrap();
    pair
}
