//! Two-party channels that evolve a financial contract off ledger through
//! signed contract updates.
//!
//! Either party may propose the next contract state; the other acknowledges it
//! by countersigning. Every inbound update is re-derived through the contract
//! engine before it is accepted, and rejected updates are dropped silently.

pub mod builder;
pub mod channel;
pub mod config;
pub mod engine;
pub mod error;
pub mod fixed_rate;
pub mod history;
pub mod signer;
pub mod store;
pub mod transport;
pub mod types;
pub mod update;
pub mod utils;
pub mod validation;

pub use builder::ChannelBuilder;
pub use channel::{Channel, ChannelState};
pub use config::ChannelConfig;
pub use engine::{ContractEngine, SignedUpdate};
pub use error::{ChannelError, Rejection, TransportError};
pub use update::{ContractUpdate, SignatureShape, SignedContractUpdate};
