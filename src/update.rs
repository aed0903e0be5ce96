//! Contract updates and their signed envelopes
use crate::{
    error::ChannelError,
    signer::SignatureFacility,
    types::Party,
};

/// One proposed or agreed state of a contract between two parties.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq)]
#[cbor(map)]
pub struct ContractUpdate<T, S> {
    #[n(0)]
    pub contract_id: String,
    #[n(1)]
    pub party_a_address: String, // record creator
    #[n(2)]
    pub party_b_address: String, // counterparty
    #[n(3)]
    pub contract_address: String, // ledger anchor, empty when off-ledger only
    #[n(4)]
    pub contract_terms: T,
    #[n(5)]
    pub contract_state: S,
    #[n(6)]
    pub update_nonce: u64,
}

/// A contract update together with the signatures of both parties.
///
/// An empty signature string means the party has not signed.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq)]
#[cbor(map)]
pub struct SignedContractUpdate<T, S> {
    #[n(0)]
    pub contract_update: ContractUpdate<T, S>,
    #[n(1)]
    pub party_a_signature: String,
    #[n(2)]
    pub party_b_signature: String,
}

/// Which signatures a [`SignedContractUpdate`] carries.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum SignatureShape {
    Unsigned,
    /// Signed only by the given party.
    Proposal(Party),
    Acknowledged,
}

impl<T, S> ContractUpdate<T, S>
where
    T: minicbor::Encode<()>,
    S: minicbor::Encode<()>,
{
    /// Hex SHA-256 digest of the canonical CBOR encoding. This is what gets signed.
    pub fn digest(&self) -> Result<String, ChannelError> {
        let cbor = minicbor::to_vec(self)?;
        Ok(sha256::digest(&cbor))
    }
}

impl<T, S> ContractUpdate<T, S> {
    pub fn address_of(&self, party: Party) -> &str {
        match party {
            Party::A => &self.party_a_address,
            Party::B => &self.party_b_address,
        }
    }
    /// The party addressed by `account`, if any.
    pub fn party_of(&self, account: &str) -> Option<Party> {
        if self.party_a_address == account {
            Some(Party::A)
        } else if self.party_b_address == account {
            Some(Party::B)
        } else {
            None
        }
    }
    pub fn same_parties(&self, other: &ContractUpdate<T, S>) -> bool {
        self.party_a_address == other.party_a_address
            && self.party_b_address == other.party_b_address
    }
}

impl<T, S> SignedContractUpdate<T, S> {
    pub fn unsigned(contract_update: ContractUpdate<T, S>) -> Self {
        Self {
            contract_update,
            party_a_signature: String::new(),
            party_b_signature: String::new(),
        }
    }
    pub fn nonce(&self) -> u64 {
        self.contract_update.update_nonce
    }
    pub fn signature(&self, party: Party) -> Option<&str> {
        let sig = match party {
            Party::A => &self.party_a_signature,
            Party::B => &self.party_b_signature,
        };
        (!sig.is_empty()).then_some(sig.as_str())
    }
    pub fn set_signature(&mut self, party: Party, signature: String) {
        match party {
            Party::A => self.party_a_signature = signature,
            Party::B => self.party_b_signature = signature,
        }
    }
    pub fn shape(&self) -> SignatureShape {
        match (self.signature(Party::A), self.signature(Party::B)) {
            (None, None) => SignatureShape::Unsigned,
            (Some(_), None) => SignatureShape::Proposal(Party::A),
            (None, Some(_)) => SignatureShape::Proposal(Party::B),
            (Some(_), Some(_)) => SignatureShape::Acknowledged,
        }
    }
    pub fn is_acknowledged(&self) -> bool {
        self.shape() == SignatureShape::Acknowledged
    }
    /// The party whose signature is still missing on a proposal.
    pub fn awaiting(&self) -> Option<Party> {
        match self.shape() {
            SignatureShape::Proposal(signer) => Some(signer.other()),
            _ => None,
        }
    }
}

impl<T, S> SignedContractUpdate<T, S>
where
    T: minicbor::Encode<()>,
    S: minicbor::Encode<()>,
{
    /// Every present signature must verify for the party whose slot it occupies.
    pub fn verify_signatures(&self, verifier: &dyn SignatureFacility) -> bool {
        let Ok(digest) = self.contract_update.digest() else {
            return false;
        };

        [Party::A, Party::B].into_iter().all(|party| {
            match self.signature(party) {
                Some(sig) => verifier.verify(
                    self.contract_update.address_of(party),
                    digest.as_bytes(),
                    sig,
                ),
                None => true,
            }
        })
    }
    /// Wire encoding handed to the transport.
    pub fn to_wire(&self) -> Result<Vec<u8>, ChannelError> {
        Ok(minicbor::to_vec(self)?)
    }
}

impl<T, S> SignedContractUpdate<T, S>
where
    T: for<'b> minicbor::Decode<'b, ()>,
    S: for<'b> minicbor::Decode<'b, ()>,
{
    pub fn from_wire(bytes: &[u8]) -> Result<Self, ChannelError> {
        Ok(minicbor::decode(bytes)?)
    }
}
