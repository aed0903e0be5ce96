//! Append-only history of one channel
use crate::{
    error::ChannelError,
    store::HistoryLog,
    update::SignedContractUpdate,
    validation,
};

pub struct History<T, S> {
    updates: Vec<SignedContractUpdate<T, S>>,
    log: Option<HistoryLog>,
}

impl<T, S> History<T, S>
where
    T: minicbor::Encode<()>,
    S: minicbor::Encode<()>,
{
    pub fn new(log: Option<HistoryLog>) -> Self {
        Self {
            updates: vec![],
            log,
        }
    }

    /// Previously persisted entries, already present in `log`.
    pub fn with_entries(updates: Vec<SignedContractUpdate<T, S>>, log: Option<HistoryLog>) -> Self {
        Self { updates, log }
    }

    /// The durable copy is written before the in-memory one.
    pub fn append(&mut self, update: SignedContractUpdate<T, S>) -> Result<(), ChannelError> {
        if let Some(log) = &self.log {
            log.append(self.updates.len() as u64, &update)?;
        }
        self.updates.push(update);
        Ok(())
    }

    pub fn last(&self) -> Option<&SignedContractUpdate<T, S>> {
        self.updates.last()
    }

    pub fn anchor(&self) -> Option<&SignedContractUpdate<T, S>> {
        validation::anchor(&self.updates)
    }

    pub fn as_slice(&self) -> &[SignedContractUpdate<T, S>] {
        &self.updates
    }

    pub fn len(&self) -> usize {
        self.updates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }
}
