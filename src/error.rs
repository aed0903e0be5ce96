use std::convert::Infallible;

/// Fatal and transport errors surfaced to the local caller.
#[derive(thiserror::Error, Debug)]
pub enum ChannelError {
    #[error("Signer {0} is neither party A nor party B of the contract")]
    UnauthorizedSigner(String),
    #[error("Channel has no contract updates yet")]
    NotInitialized,
    #[error("Channel has no fully co-signed update to build the next proposal on")]
    NoAcknowledgedUpdate,
    #[error("Nothing to acknowledge: {0}")]
    NothingToAcknowledge(&'static str),
    #[error("Update for contract {got} offered to channel {expected}")]
    ContractMismatch { expected: String, got: String },
    #[error("Seed update failed validation: {0}")]
    SeedRejected(#[from] Rejection),
    #[error("Failed to deliver contract update: {0}")]
    Transport(#[from] TransportError),
    #[error("Contract engine failure: {0:#}")]
    Engine(anyhow::Error),
    #[error("Signing failure: {0:#}")]
    Signing(anyhow::Error),
    #[error(transparent)]
    Encode(#[from] minicbor::encode::Error<Infallible>),
    #[error(transparent)]
    Decode(#[from] minicbor::decode::Error),
    #[error(transparent)]
    Storage(#[from] sled::Error),
    #[error("History log entry {index} failed revalidation: {reason}")]
    CorruptLog { index: u64, reason: Rejection },
    #[error("Locally built update failed validation: {0}")]
    LocalUpdateRejected(Rejection),
    #[error("Failed to generate a contract id: {0:#}")]
    IdGeneration(anyhow::Error),
    #[error("Channel builder is missing {0}")]
    MissingField(&'static str),
    #[error("Channel config has no database to restore from")]
    NoDatabase,
}

/// Reasons an inbound signed contract update is not accepted.
///
/// These are expected protocol outcomes, never raised as errors by the
/// inbound listener.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    #[error("A present signature does not verify for its claimed party")]
    InvalidSignature,
    #[error("Update carries no signature")]
    Unsigned,
    #[error("Update belongs to another contract")]
    ContractMismatch,
    #[error("Local account is neither party of the update")]
    NotAParty,
    #[error("Initial proposal offered to a channel that already has history")]
    HistoryNotEmpty,
    #[error("No prior update to build on")]
    NoPriorUpdate,
    #[error("Party addresses differ from the prior update")]
    IdentityChanged,
    #[error("Contract terms differ from the prior update")]
    TermsChanged,
    #[error("Nonce {got} does not advance past {prior}")]
    NonceNotAdvanced { prior: u64, got: u64 },
    #[error("Nonce {got} skips ahead of expected {expected}")]
    NonceGap { expected: u64, got: u64 },
    #[error("Acknowledgement nonce {got} differs from proposal nonce {expected}")]
    NonceMismatch { expected: u64, got: u64 },
    #[error("Acknowledgement alters a signature already present")]
    SignatureAltered,
    #[error("Update is identical to the current one")]
    Duplicate,
    #[error("Embedded state is not the initial state for the terms")]
    InvalidInitialState,
    #[error("Embedded state is not the successor of the prior state")]
    InvalidSuccessorState,
    #[error("Message could not be decoded")]
    Malformed,
}

#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    #[error("No subscriber is listening on contract {0}")]
    NoRoute(String),
    #[error("Transport is disconnected")]
    Disconnected,
    #[error("Transport failure: {0}")]
    Other(String),
}
