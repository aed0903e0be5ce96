//! Signature facility seam and its Ed25519 implementation
use anyhow::Context;
use bech32::Bech32m;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::RngCore;

/// Human readable prefix of account identifiers.
pub const ACCOUNT_HRP: &str = "acct";

/// Produces signatures for the local account and checks signatures of any account.
pub trait SignatureFacility: Send + Sync {
    /// The identity string used both to sign and to address the local party.
    fn account_id(&self) -> &str;
    fn sign(&self, message: &[u8]) -> anyhow::Result<String>;
    fn verify(&self, account_id: &str, message: &[u8], signature: &str) -> bool;
}

/// Ed25519 keys whose account identifier is the bech32m encoded public key.
pub struct Ed25519Signer {
    key: SigningKey,
    account_id: String,
}

impl Ed25519Signer {
    pub fn generate() -> anyhow::Result<Self> {
        let mut secret = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut secret);
        Self::from_secret(&secret)
    }
    pub fn from_secret(secret: &[u8; 32]) -> anyhow::Result<Self> {
        let key = SigningKey::from_bytes(secret);
        let account_id = account_for(&key.verifying_key())?;

        Ok(Self { key, account_id })
    }
}

pub fn account_for(key: &VerifyingKey) -> anyhow::Result<String> {
    let hrp = bech32::Hrp::parse(ACCOUNT_HRP)?;
    Ok(bech32::encode::<Bech32m>(hrp, key.as_bytes())?)
}

fn verifying_key_of(account_id: &str) -> anyhow::Result<VerifyingKey> {
    let (hrp, data) = bech32::decode(account_id)?;
    anyhow::ensure!(hrp.as_str() == ACCOUNT_HRP, "unexpected account prefix {hrp}");

    let bytes: [u8; 32] = data
        .as_slice()
        .try_into()
        .context("account key is not 32 bytes")?;
    Ok(VerifyingKey::from_bytes(&bytes)?)
}

fn verify_ed25519(account_id: &str, message: &[u8], signature: &str) -> anyhow::Result<()> {
    let key = verifying_key_of(account_id)?;
    let raw: [u8; 64] = hex::decode(signature)?
        .as_slice()
        .try_into()
        .context("signature is not 64 bytes")?;

    key.verify(message, &Signature::from_bytes(&raw))?;
    Ok(())
}

impl SignatureFacility for Ed25519Signer {
    fn account_id(&self) -> &str {
        &self.account_id
    }
    fn sign(&self, message: &[u8]) -> anyhow::Result<String> {
        Ok(hex::encode(self.key.sign(message).to_bytes()))
    }
    fn verify(&self, account_id: &str, message: &[u8], signature: &str) -> bool {
        verify_ed25519(account_id, message, signature).is_ok()
    }
}
