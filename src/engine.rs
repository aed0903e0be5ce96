//! Contract engine capability consumed by channels
use crate::{
    types::{Amount, TimeStamp},
    update::SignedContractUpdate,
};
use chrono::Utc;
use std::fmt::Debug;

/// Signed update carrying the terms and state of engine `E`.
pub type SignedUpdate<E> =
    SignedContractUpdate<<E as ContractEngine>::Terms, <E as ContractEngine>::State>;

/// Bounds every terms/state type must meet to travel inside a contract update.
pub trait ContractData:
    Clone + Debug + PartialEq + Send + Sync + 'static + minicbor::Encode<()> + for<'b> minicbor::Decode<'b, ()>
{
}

impl<T> ContractData for T where
    T: Clone
        + Debug
        + PartialEq
        + Send
        + Sync
        + 'static
        + minicbor::Encode<()>
        + for<'b> minicbor::Decode<'b, ()>
{
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    #[n(0)]
    InterestPayment,
    #[n(1)]
    PrincipalRedemption,
    #[n(2)]
    Maturity,
}

/// A contractual event due at a point in time.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq)]
pub struct ScheduledEvent {
    #[n(0)]
    pub kind: EventKind,
    #[n(1)]
    pub at: TimeStamp<Utc>,
    #[n(2)]
    pub payoff: Amount, // party A's perspective
}

/// Deterministic evolution rules for one contract type.
///
/// Channels never compute contract state themselves; they ask the engine and
/// re-derive every state a counterparty sends them.
pub trait ContractEngine: Send + Sync + 'static {
    type Terms: ContractData;
    type State: ContractData;

    fn compute_initial_state(&self, terms: &Self::Terms) -> anyhow::Result<Self::State>;

    /// Advance `state` to `timestamp`, processing every event due on the way.
    fn compute_next_state(
        &self,
        terms: &Self::Terms,
        state: &Self::State,
        timestamp: &TimeStamp<Utc>,
    ) -> anyhow::Result<Self::State>;

    fn validate_initial_state(&self, terms: &Self::Terms, state: &Self::State) -> bool;

    /// Whether `candidate` is the correct successor of `prior`.
    fn validate_next_state(
        &self,
        terms: &Self::Terms,
        prior: &Self::State,
        candidate: &Self::State,
    ) -> bool;

    /// Events falling due after `state` up to and including `timestamp`.
    fn compute_pending_schedule(
        &self,
        terms: &Self::Terms,
        state: &Self::State,
        timestamp: &TimeStamp<Utc>,
    ) -> anyhow::Result<Vec<ScheduledEvent>>;

    /// Net amount due by `timestamp`. Positive when party B owes party A.
    fn compute_due_payoff(
        &self,
        terms: &Self::Terms,
        state: &Self::State,
        timestamp: &TimeStamp<Utc>,
    ) -> anyhow::Result<Amount>;
}
