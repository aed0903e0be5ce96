//! Reference engine for a fixed-rate bullet loan
//!
//! Interest accrues linearly on the outstanding notional (actual seconds over a
//! 365 day year) and is paid every `interest_cycle_secs`; the principal and the
//! final interest are settled at maturity.
use crate::{
    engine::{ContractEngine, EventKind, ScheduledEvent},
    types::{Amount, TimeStamp},
};
use chrono::Utc;

const SECONDS_PER_YEAR: i128 = 365 * 86_400;
const BASIS_POINTS: i128 = 10_000;

/// Shortest interest cycle accepted in terms.
pub const MIN_INTEREST_CYCLE_SECS: i64 = 86_400;
/// Upper bound on interest payments scheduled before maturity.
pub const MAX_INTEREST_EVENTS: usize = 10_000;

/// Role of party A in the loan.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractRole {
    #[n(0)]
    Lender,
    #[n(1)]
    Borrower,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractStatus {
    #[n(0)]
    Performing,
    #[n(1)]
    Matured,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq)]
#[cbor(map)]
pub struct FixedRateTerms {
    #[n(0)]
    pub role: ContractRole,
    #[n(1)]
    pub notional: Amount,
    #[n(2)]
    pub rate_bps: u32,
    #[n(3)]
    pub initial_exchange: TimeStamp<Utc>,
    #[n(4)]
    pub maturity: TimeStamp<Utc>,
    #[n(5)]
    pub interest_cycle_secs: i64,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq)]
#[cbor(map)]
pub struct FixedRateState {
    #[n(0)]
    pub status_date: TimeStamp<Utc>,
    #[n(1)]
    pub notional_outstanding: Amount,
    #[n(2)]
    pub accrued_interest: Amount,
    #[n(3)]
    pub events_processed: u32,
    #[n(4)]
    pub status: ContractStatus,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct FixedRateEngine;

impl FixedRateTerms {
    /// Interest payment dates followed by the maturity date.
    fn event_dates(&self) -> Vec<TimeStamp<Utc>> {
        let mut dates = vec![];
        // terms that never passed validation still get a bounded schedule
        if self.interest_cycle_secs >= MIN_INTEREST_CYCLE_SECS {
            let mut at = self.initial_exchange.checked_add_seconds(self.interest_cycle_secs);
            while let Some(date) = at.filter(|date| *date < self.maturity) {
                if dates.len() == MAX_INTEREST_EVENTS {
                    break;
                }
                at = date.checked_add_seconds(self.interest_cycle_secs);
                dates.push(date);
            }
        }
        dates.push(self.maturity.clone());
        dates
    }

    fn check(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.notional > 0, "notional must be positive");
        anyhow::ensure!(
            self.maturity > self.initial_exchange,
            "maturity must fall after the initial exchange"
        );
        if self.interest_cycle_secs != 0 {
            let span = self.maturity.seconds_since(&self.initial_exchange);
            anyhow::ensure!(
                (MIN_INTEREST_CYCLE_SECS..=span).contains(&self.interest_cycle_secs),
                "interest cycle of {}s must be 0 or between {}s and the {}s term",
                self.interest_cycle_secs,
                MIN_INTEREST_CYCLE_SECS,
                span
            );
            anyhow::ensure!(
                (span / self.interest_cycle_secs) as usize <= MAX_INTEREST_EVENTS,
                "more than {MAX_INTEREST_EVENTS} interest payments before maturity"
            );
        }
        Ok(())
    }
    fn signed(&self, amount: Amount) -> Amount {
        match self.role {
            ContractRole::Lender => amount,
            ContractRole::Borrower => amount.saturating_neg(),
        }
    }
}

fn accrue(terms: &FixedRateTerms, state: &mut FixedRateState, to: &TimeStamp<Utc>) {
    if *to <= state.status_date {
        return;
    }
    let secs = to.seconds_since(&state.status_date) as i128;
    let interest = (state.notional_outstanding as i128)
        .saturating_mul(terms.rate_bps as i128)
        .saturating_mul(secs)
        / (BASIS_POINTS * SECONDS_PER_YEAR);
    let interest = Amount::try_from(interest).unwrap_or(Amount::MAX);

    state.accrued_interest = state.accrued_interest.saturating_add(interest);
    state.status_date = to.clone();
}

/// Process every unprocessed event up to `until`, then accrue to `until`.
fn roll(
    terms: &FixedRateTerms,
    state: &FixedRateState,
    until: &TimeStamp<Utc>,
) -> (FixedRateState, Vec<ScheduledEvent>) {
    let mut next = state.clone();
    let mut events = vec![];

    for date in terms
        .event_dates()
        .into_iter()
        .skip(state.events_processed as usize)
    {
        if date > *until {
            break;
        }
        accrue(terms, &mut next, &date);

        let event = if date == terms.maturity {
            let payoff = next.accrued_interest.saturating_add(next.notional_outstanding);
            next.notional_outstanding = 0;
            next.status = ContractStatus::Matured;
            ScheduledEvent {
                kind: EventKind::Maturity,
                at: date,
                payoff: terms.signed(payoff),
            }
        } else {
            ScheduledEvent {
                kind: EventKind::InterestPayment,
                at: date,
                payoff: terms.signed(next.accrued_interest),
            }
        };
        next.accrued_interest = 0;
        next.events_processed += 1;
        events.push(event);
    }
    accrue(terms, &mut next, until);

    (next, events)
}

impl ContractEngine for FixedRateEngine {
    type Terms = FixedRateTerms;
    type State = FixedRateState;

    fn compute_initial_state(&self, terms: &FixedRateTerms) -> anyhow::Result<FixedRateState> {
        terms.check()?;

        Ok(FixedRateState {
            status_date: terms.initial_exchange.clone(),
            notional_outstanding: terms.notional,
            accrued_interest: 0,
            events_processed: 0,
            status: ContractStatus::Performing,
        })
    }

    fn compute_next_state(
        &self,
        terms: &FixedRateTerms,
        state: &FixedRateState,
        timestamp: &TimeStamp<Utc>,
    ) -> anyhow::Result<FixedRateState> {
        anyhow::ensure!(
            *timestamp >= state.status_date,
            "timestamp {:?} precedes status date {:?}",
            timestamp,
            state.status_date
        );
        Ok(roll(terms, state, timestamp).0)
    }

    fn validate_initial_state(&self, terms: &FixedRateTerms, state: &FixedRateState) -> bool {
        self.compute_initial_state(terms)
            .is_ok_and(|initial| initial == *state)
    }

    fn validate_next_state(
        &self,
        terms: &FixedRateTerms,
        prior: &FixedRateState,
        candidate: &FixedRateState,
    ) -> bool {
        candidate.status_date >= prior.status_date
            && roll(terms, prior, &candidate.status_date).0 == *candidate
    }

    fn compute_pending_schedule(
        &self,
        terms: &FixedRateTerms,
        state: &FixedRateState,
        timestamp: &TimeStamp<Utc>,
    ) -> anyhow::Result<Vec<ScheduledEvent>> {
        Ok(roll(terms, state, timestamp).1)
    }

    fn compute_due_payoff(
        &self,
        terms: &FixedRateTerms,
        state: &FixedRateState,
        timestamp: &TimeStamp<Utc>,
    ) -> anyhow::Result<Amount> {
        Ok(roll(terms, state, timestamp)
            .1
            .iter()
            .fold(0, |due: Amount, event| due.saturating_add(event.payoff)))
    }
}
