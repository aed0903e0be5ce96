//! Utility functions for identifiers

use bech32::Bech32m;
use uuid7::uuid7;

// construct a unique id then encode using bech32
pub fn new_uuid_to_bech32(hrp: &str) -> anyhow::Result<String> {
    let hrp = bech32::Hrp::parse(hrp)?;
    let encode = bech32::encode::<Bech32m>(hrp, uuid7().as_bytes())?;
    Ok(encode)
}

/// A fresh contract identifier, `contract1...`.
pub fn new_contract_id() -> anyhow::Result<String> {
    new_uuid_to_bech32("contract")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contract_ids_are_unique_and_prefixed() {
        let a = new_contract_id().unwrap();
        let b = new_contract_id().unwrap();

        assert!(a.starts_with("contract1"));
        assert_ne!(a, b);
    }

    #[test]
    fn empty_hrp_is_rejected() {
        assert!(new_uuid_to_bech32("").is_err());
    }
}
