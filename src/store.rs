//! Durable ordered log of a channel's signed contract updates
use crate::{error::ChannelError, update::SignedContractUpdate};
use sled::{Db, Tree};

/// One sled tree per contract, keyed by the big-endian history index so
/// iteration order is insertion order.
#[derive(Clone)]
pub struct HistoryLog {
    tree: Tree,
}

impl HistoryLog {
    pub fn open(db: &Db, contract_id: &str) -> Result<Self, ChannelError> {
        let tree = db.open_tree(format!("channel/{contract_id}"))?;
        Ok(Self { tree })
    }

    pub fn append<T, S>(
        &self,
        index: u64,
        update: &SignedContractUpdate<T, S>,
    ) -> Result<(), ChannelError>
    where
        T: minicbor::Encode<()>,
        S: minicbor::Encode<()>,
    {
        self.tree.insert(index.to_be_bytes(), update.to_wire()?)?;
        self.tree.flush()?;
        Ok(())
    }

    /// Load every entry in order.
    pub fn load<T, S>(&self) -> Result<Vec<SignedContractUpdate<T, S>>, ChannelError>
    where
        T: for<'b> minicbor::Decode<'b, ()>,
        S: for<'b> minicbor::Decode<'b, ()>,
    {
        self.tree
            .iter()
            .values()
            .map(|value| SignedContractUpdate::from_wire(&value?))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }
}
