//! Bilateral channel over one financial contract
//!
//! A channel owns the ordered history of signed contract updates, drives the
//! propose/acknowledge handshake for the local party and validates whatever
//! the counterparty sends. Local calls and the inbound listener both append
//! through the same lock, so the validation rules resolve any race between
//! them against the latest history.
use crate::{
    config::ChannelConfig,
    engine::{ContractEngine, SignedUpdate},
    error::{ChannelError, Rejection},
    history::History,
    signer::SignatureFacility,
    store::HistoryLog,
    transport::{Handler, Subscription, Transport},
    types::{Party, TimeStamp},
    update::{ContractUpdate, SignedContractUpdate},
    validation,
};
use chrono::Utc;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

/// What the local party can do with the channel right now.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ChannelState {
    /// Fully co-signed and nothing is due.
    Idle,
    /// Fully co-signed, something is due and the local party does not owe it.
    Updatable,
    /// A proposal is waiting for the local signature.
    Confirmable,
    /// Waiting for the counterparty to act.
    Receivable,
}

/// Collaborators shared by every constructor.
pub(crate) struct Parts<E: ContractEngine> {
    pub engine: Arc<E>,
    pub signer: Arc<dyn SignatureFacility>,
    pub transport: Arc<dyn Transport>,
    pub config: ChannelConfig,
}

struct Shared<E: ContractEngine> {
    contract_id: String,
    engine: Arc<E>,
    signer: Arc<dyn SignatureFacility>,
    transport: Arc<dyn Transport>,
    history: Mutex<History<E::Terms, E::State>>,
}

pub struct Channel<E: ContractEngine> {
    shared: Arc<Shared<E>>,
    subscription: Mutex<Option<Subscription>>,
}

fn party_in<T, S>(
    signer: &dyn SignatureFacility,
    update: &ContractUpdate<T, S>,
) -> Result<Party, ChannelError> {
    let account = signer.account_id();
    update
        .party_of(account)
        .ok_or_else(|| ChannelError::UnauthorizedSigner(account.to_string()))
}

/// Add the local signature in the slot of whichever party the signer is.
fn sign_into<T, S>(
    signer: &dyn SignatureFacility,
    signed: &mut SignedContractUpdate<T, S>,
) -> Result<(), ChannelError>
where
    T: minicbor::Encode<()>,
    S: minicbor::Encode<()>,
{
    let party = party_in(signer, &signed.contract_update)?;
    let digest = signed.contract_update.digest()?;
    let signature = signer.sign(digest.as_bytes()).map_err(ChannelError::Signing)?;

    signed.set_signature(party, signature);
    Ok(())
}

impl<E: ContractEngine> Shared<E> {
    // history is only mutated after validation, so a poisoned guard is still consistent
    fn history(&self) -> MutexGuard<'_, History<E::Terms, E::State>> {
        self.history.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn validate(
        &self,
        history: &History<E::Terms, E::State>,
        candidate: &SignedUpdate<E>,
    ) -> Result<(), Rejection> {
        if candidate.contract_update.contract_id != self.contract_id {
            return Err(Rejection::ContractMismatch);
        }
        if candidate
            .contract_update
            .party_of(self.signer.account_id())
            .is_none()
        {
            return Err(Rejection::NotAParty);
        }
        validation::validate(
            history.as_slice(),
            candidate,
            self.engine.as_ref(),
            self.signer.as_ref(),
        )
    }

    fn deliver(&self, signed: &SignedUpdate<E>) -> Result<(), ChannelError> {
        let payload = signed.to_wire()?;
        self.transport.send(&self.contract_id, &payload)?;
        Ok(())
    }

    /// Validate and append. Rejections are logged and reported as `Ok(false)`;
    /// only a failure to persist an accepted update is an error.
    fn accept(&self, candidate: SignedUpdate<E>) -> Result<bool, ChannelError> {
        let mut history = self.history();
        if let Err(reason) = self.validate(&history, &candidate) {
            debug!(contract_id = %self.contract_id, nonce = candidate.nonce(), %reason, "dropped contract update");
            return Ok(false);
        }

        let nonce = candidate.nonce();
        let acknowledged = candidate.is_acknowledged();
        history.append(candidate)?;

        info!(contract_id = %self.contract_id, nonce, acknowledged, "accepted contract update");
        Ok(true)
    }

    fn on_message(&self, payload: &[u8]) {
        let candidate = match SignedContractUpdate::from_wire(payload) {
            Ok(candidate) => candidate,
            Err(err) => {
                debug!(contract_id = %self.contract_id, %err, "dropped undecodable message");
                return;
            }
        };
        if let Err(err) = self.accept(candidate) {
            warn!(contract_id = %self.contract_id, %err, "failed to record accepted update");
        }
    }
}

impl<E: ContractEngine> Channel<E> {
    fn assemble(parts: Parts<E>, contract_id: String, history: History<E::Terms, E::State>) -> Self {
        let shared = Arc::new(Shared {
            contract_id,
            engine: parts.engine,
            signer: parts.signer,
            transport: parts.transport,
            history: Mutex::new(history),
        });

        let weak = Arc::downgrade(&shared);
        let handler: Handler = Arc::new(move |payload: &[u8]| {
            if let Some(shared) = weak.upgrade() {
                shared.on_message(payload);
            }
        });
        let subscription = shared.transport.subscribe(&shared.contract_id, handler);

        Self {
            shared,
            subscription: Mutex::new(Some(subscription)),
        }
    }

    fn open_log(config: &ChannelConfig, contract_id: &str) -> Result<Option<HistoryLog>, ChannelError> {
        config
            .db
            .as_ref()
            .map(|db| HistoryLog::open(db, contract_id))
            .transpose()
    }

    /// Start a new contract: compute the initial state, sign it as party A and
    /// send it to the counterparty.
    ///
    /// A failed first delivery is logged; the proposal stays in history and can
    /// be re-sent with [`Channel::resend_last`].
    pub(crate) fn create(
        parts: Parts<E>,
        contract_id: String,
        counterparty: String,
        terms: E::Terms,
        contract_address: String,
    ) -> Result<Self, ChannelError> {
        let state = parts
            .engine
            .compute_initial_state(&terms)
            .map_err(ChannelError::Engine)?;

        let mut signed = SignedContractUpdate::unsigned(ContractUpdate {
            contract_id: contract_id.clone(),
            party_a_address: parts.signer.account_id().to_string(),
            party_b_address: counterparty,
            contract_address,
            contract_terms: terms,
            contract_state: state,
            update_nonce: 0,
        });

        sign_into(parts.signer.as_ref(), &mut signed)?;
        let mut history = History::new(Self::open_log(&parts.config, &contract_id)?);
        history.append(signed.clone())?;
        let channel = Self::assemble(parts, contract_id, history);

        info!(contract_id = %channel.shared.contract_id, "created channel");
        if let Err(err) = channel.shared.deliver(&signed) {
            warn!(contract_id = %channel.shared.contract_id, %err, "initial proposal not delivered");
        }

        Ok(channel)
    }

    /// Seed a channel with an update received out of band. The seed goes
    /// through full validation first.
    pub(crate) fn from_signed_update(parts: Parts<E>, seed: SignedUpdate<E>) -> Result<Self, ChannelError> {
        validation::validate(&[], &seed, parts.engine.as_ref(), parts.signer.as_ref())?;
        Self::seeded(parts, seed)
    }

    /// Seed a channel without validating the seed. Diagnostics only.
    pub(crate) fn from_signed_update_unchecked(
        parts: Parts<E>,
        seed: SignedUpdate<E>,
    ) -> Result<Self, ChannelError> {
        warn!(
            contract_id = %seed.contract_update.contract_id,
            nonce = seed.nonce(),
            "seeding channel with an unvalidated update"
        );
        Self::seeded(parts, seed)
    }

    fn seeded(parts: Parts<E>, seed: SignedUpdate<E>) -> Result<Self, ChannelError> {
        party_in(parts.signer.as_ref(), &seed.contract_update)?;

        let contract_id = seed.contract_update.contract_id.clone();
        let mut history = History::new(Self::open_log(&parts.config, &contract_id)?);
        history.append(seed)?;

        info!(%contract_id, "seeded channel");
        Ok(Self::assemble(parts, contract_id, history))
    }

    /// An empty channel that takes its first update from the transport.
    pub(crate) fn await_first_update(parts: Parts<E>, contract_id: String) -> Result<Self, ChannelError> {
        let history = History::new(Self::open_log(&parts.config, &contract_id)?);

        debug!(%contract_id, "waiting for first contract update");
        Ok(Self::assemble(parts, contract_id, history))
    }

    /// Reopen a channel from its durable log.
    pub(crate) fn restore(parts: Parts<E>, contract_id: String) -> Result<Self, ChannelError> {
        let db = parts.config.db.as_ref().ok_or(ChannelError::NoDatabase)?;
        let log = HistoryLog::open(db, &contract_id)?;
        let entries: Vec<SignedUpdate<E>> = log.load()?;

        if let Some(first) = entries.first() {
            if first.contract_update.contract_id != contract_id {
                return Err(ChannelError::ContractMismatch {
                    expected: contract_id,
                    got: first.contract_update.contract_id.clone(),
                });
            }
            party_in(parts.signer.as_ref(), &first.contract_update)?;
        }

        if parts.config.revalidate_on_restore {
            for (index, entry) in entries.iter().enumerate() {
                validation::validate(
                    &entries[..index],
                    entry,
                    parts.engine.as_ref(),
                    parts.signer.as_ref(),
                )
                .map_err(|reason| ChannelError::CorruptLog {
                    index: index as u64,
                    reason,
                })?;
            }
        }

        info!(%contract_id, entries = entries.len(), "restored channel");
        let history = History::with_entries(entries, Some(log));
        Ok(Self::assemble(parts, contract_id, history))
    }

    pub fn contract_id(&self) -> &str {
        &self.shared.contract_id
    }

    pub fn last_signed_update(&self) -> Option<SignedUpdate<E>> {
        self.shared.history().last().cloned()
    }

    pub fn contract_terms(&self) -> Option<E::Terms> {
        self.shared
            .history()
            .last()
            .map(|signed| signed.contract_update.contract_terms.clone())
    }

    pub fn contract_state(&self) -> Option<E::State> {
        self.shared
            .history()
            .last()
            .map(|signed| signed.contract_update.contract_state.clone())
    }

    /// Snapshot of the full history in insertion order.
    pub fn history(&self) -> Vec<SignedUpdate<E>> {
        self.shared.history().as_slice().to_vec()
    }

    pub fn local_party(&self) -> Result<Party, ChannelError> {
        let history = self.shared.history();
        let last = history.last().ok_or(ChannelError::NotInitialized)?;
        party_in(self.shared.signer.as_ref(), &last.contract_update)
    }

    /// Derive the action open to the local party as of `timestamp`.
    pub fn channel_state(&self, timestamp: &TimeStamp<Utc>) -> Result<ChannelState, ChannelError> {
        let history = self.shared.history();
        let last = history.last().ok_or(ChannelError::NotInitialized)?;
        let local = party_in(self.shared.signer.as_ref(), &last.contract_update)?;
        let update = &last.contract_update;

        if last.is_acknowledged() {
            let engine = &self.shared.engine;
            let pending = engine
                .compute_pending_schedule(&update.contract_terms, &update.contract_state, timestamp)
                .map_err(ChannelError::Engine)?;
            if pending.is_empty() {
                return Ok(ChannelState::Idle);
            }

            let due = engine
                .compute_due_payoff(&update.contract_terms, &update.contract_state, timestamp)
                .map_err(ChannelError::Engine)?;
            let owes_nothing = match local {
                Party::A => due >= 0,
                Party::B => due <= 0,
            };
            return Ok(if owes_nothing {
                ChannelState::Updatable
            } else {
                ChannelState::Receivable
            });
        }

        if last.awaiting() == Some(local) {
            Ok(ChannelState::Confirmable)
        } else {
            Ok(ChannelState::Receivable)
        }
    }

    /// Propose the contract state as of `timestamp`.
    ///
    /// After a co-signed update this opens the next round; while a proposal is
    /// pending it produces a counter-proposal for the same round. The update is
    /// kept in history even if delivery fails.
    pub fn sign_and_send_next_update(
        &self,
        timestamp: &TimeStamp<Utc>,
    ) -> Result<SignedUpdate<E>, ChannelError> {
        let signed = {
            let mut history = self.shared.history();
            let last = history.last().ok_or(ChannelError::NotInitialized)?;
            let nonce = if last.is_acknowledged() {
                last.nonce() + 1
            } else {
                last.nonce()
            };
            let base = history
                .anchor()
                .ok_or(ChannelError::NoAcknowledgedUpdate)?
                .contract_update
                .clone();

            let state = self
                .shared
                .engine
                .compute_next_state(&base.contract_terms, &base.contract_state, timestamp)
                .map_err(ChannelError::Engine)?;

            let mut signed = SignedContractUpdate::unsigned(ContractUpdate {
                contract_state: state,
                update_nonce: nonce,
                ..base
            });
            sign_into(self.shared.signer.as_ref(), &mut signed)?;

            match self.shared.validate(&history, &signed) {
                Ok(()) => history.append(signed.clone())?,
                // same proposal again: deliver it, don't record it twice
                Err(Rejection::Duplicate) => {}
                Err(reason) => return Err(ChannelError::LocalUpdateRejected(reason)),
            }
            signed
        };

        info!(contract_id = %self.shared.contract_id, nonce = signed.nonce(), "proposed contract update");
        self.shared.deliver(&signed)?;
        Ok(signed)
    }

    /// Countersign the pending proposal and send the acknowledgement.
    pub fn acknowledge(&self) -> Result<SignedUpdate<E>, ChannelError> {
        let signed = {
            let mut history = self.shared.history();
            let last = history.last().ok_or(ChannelError::NotInitialized)?;
            let local = party_in(self.shared.signer.as_ref(), &last.contract_update)?;

            if last.is_acknowledged() {
                return Err(ChannelError::NothingToAcknowledge(
                    "current update is already co-signed",
                ));
            }
            if last.signature(local).is_some() {
                return Err(ChannelError::NothingToAcknowledge(
                    "proposal already carries the local signature",
                ));
            }

            let mut ack = last.clone();
            sign_into(self.shared.signer.as_ref(), &mut ack)?;
            self.shared
                .validate(&history, &ack)
                .map_err(ChannelError::LocalUpdateRejected)?;

            history.append(ack.clone())?;
            ack
        };

        info!(contract_id = %self.shared.contract_id, nonce = signed.nonce(), "acknowledged contract update");
        self.shared.deliver(&signed)?;
        Ok(signed)
    }

    /// Deliver the current update again.
    pub fn resend_last(&self) -> Result<(), ChannelError> {
        let last = self
            .last_signed_update()
            .ok_or(ChannelError::NotInitialized)?;
        self.shared.deliver(&last)
    }

    /// Run `candidate` through validation against the current history without
    /// appending it.
    pub fn validate(&self, candidate: &SignedUpdate<E>) -> Result<(), Rejection> {
        let history = self.shared.history();
        self.shared.validate(&history, candidate)
    }

    /// Inbound entry point: validate and append. Returns whether the update
    /// was accepted; rejections are never surfaced as errors.
    pub fn receive(&self, candidate: SignedUpdate<E>) -> bool {
        self.shared.accept(candidate).unwrap_or_else(|err| {
            warn!(contract_id = %self.shared.contract_id, %err, "failed to record accepted update");
            false
        })
    }

    /// Stop listening for inbound updates.
    pub fn close(self) {
        let subscription = self
            .subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(subscription) = subscription {
            subscription.cancel();
        }
        debug!(contract_id = %self.shared.contract_id, "closed channel");
    }
}
