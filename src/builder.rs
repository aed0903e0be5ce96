//! Fluent construction of channels
use crate::{
    channel::{Channel, Parts},
    config::ChannelConfig,
    engine::{ContractEngine, SignedUpdate},
    error::ChannelError,
    signer::SignatureFacility,
    transport::Transport,
    utils,
};
use std::sync::Arc;

/// Collects what a channel needs, then opens it through one of the
/// constructor methods. Each constructor checks only the fields it uses.
pub struct ChannelBuilder<E: ContractEngine> {
    engine: Arc<E>,
    signer: Arc<dyn SignatureFacility>,
    transport: Arc<dyn Transport>,
    config: ChannelConfig,
    contract_id: Option<String>,
    counterparty: Option<String>,
    terms: Option<E::Terms>,
    contract_address: String,
}

impl<E: ContractEngine> ChannelBuilder<E> {
    pub fn new(
        engine: Arc<E>,
        signer: Arc<dyn SignatureFacility>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            engine,
            signer,
            transport,
            config: ChannelConfig::default(),
            contract_id: None,
            counterparty: None,
            terms: None,
            contract_address: String::new(),
        }
    }
    pub fn set_config(mut self, config: ChannelConfig) -> Self {
        self.config = config;
        self
    }
    pub fn set_contract_id(mut self, contract_id: impl Into<String>) -> Self {
        self.contract_id = Some(contract_id.into());
        self
    }
    pub fn set_counterparty(mut self, account_id: impl Into<String>) -> Self {
        self.counterparty = Some(account_id.into());
        self
    }
    pub fn set_terms(mut self, terms: E::Terms) -> Self {
        self.terms = Some(terms);
        self
    }
    pub fn set_contract_address(mut self, address: impl Into<String>) -> Self {
        self.contract_address = address.into();
        self
    }

    fn parts(self) -> (Parts<E>, Fields<E>) {
        (
            Parts {
                engine: self.engine,
                signer: self.signer,
                transport: self.transport,
                config: self.config,
            },
            Fields {
                contract_id: self.contract_id,
                counterparty: self.counterparty,
                terms: self.terms,
                contract_address: self.contract_address,
            },
        )
    }

    /// Open a new contract with the local signer as party A. A contract id is
    /// generated unless one was set.
    pub fn create(self) -> Result<Channel<E>, ChannelError> {
        let (parts, fields) = self.parts();
        let counterparty = fields
            .counterparty
            .ok_or(ChannelError::MissingField("counterparty"))?;
        let terms = fields.terms.ok_or(ChannelError::MissingField("terms"))?;
        let contract_id = match fields.contract_id {
            Some(id) => id,
            None => utils::new_contract_id().map_err(ChannelError::IdGeneration)?,
        };

        Channel::create(parts, contract_id, counterparty, terms, fields.contract_address)
    }

    /// Join a channel from a seed that must pass validation.
    pub fn from_signed_update(self, seed: SignedUpdate<E>) -> Result<Channel<E>, ChannelError> {
        Channel::from_signed_update(self.parts().0, seed)
    }

    /// Join a channel from a seed that is trusted as is. Diagnostics only.
    pub fn from_signed_update_unchecked(
        self,
        seed: SignedUpdate<E>,
    ) -> Result<Channel<E>, ChannelError> {
        Channel::from_signed_update_unchecked(self.parts().0, seed)
    }

    /// Open an empty channel for a known contract id and wait for its first
    /// update on the transport.
    pub fn await_first_update(self) -> Result<Channel<E>, ChannelError> {
        let (parts, fields) = self.parts();
        let contract_id = fields
            .contract_id
            .ok_or(ChannelError::MissingField("contract id"))?;
        Channel::await_first_update(parts, contract_id)
    }

    /// Reopen a persisted channel from `config.db`.
    pub fn restore(self) -> Result<Channel<E>, ChannelError> {
        let (parts, fields) = self.parts();
        let contract_id = fields
            .contract_id
            .ok_or(ChannelError::MissingField("contract id"))?;
        Channel::restore(parts, contract_id)
    }
}

struct Fields<E: ContractEngine> {
    contract_id: Option<String>,
    counterparty: Option<String>,
    terms: Option<E::Terms>,
    contract_address: String,
}
