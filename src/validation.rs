//! Acceptance rules for signed contract updates
//!
//! A candidate is checked against the channel history in two steps: every
//! present signature must verify, then the candidate is judged either as a
//! proposal (one signature) or as an acknowledgement (both signatures).
//! Contract state is always re-derived by the engine, never trusted.
//!
//! The *anchor* is the most recent fully co-signed update. Proposals build on
//! the anchor, so a counter-proposal for a round still open is judged against
//! the same base as the proposal it competes with.
use crate::{
    engine::{ContractEngine, SignedUpdate as Signed},
    error::Rejection,
    signer::SignatureFacility,
    types::Party,
    update::{SignatureShape, SignedContractUpdate},
};

/// Most recent fully co-signed update.
pub fn anchor<T, S>(history: &[SignedContractUpdate<T, S>]) -> Option<&SignedContractUpdate<T, S>> {
    history.iter().rev().find(|update| update.is_acknowledged())
}

/// Decide whether `candidate` may be appended to `history`.
pub fn validate<E: ContractEngine>(
    history: &[Signed<E>],
    candidate: &Signed<E>,
    engine: &E,
    verifier: &dyn SignatureFacility,
) -> Result<(), Rejection> {
    if !candidate.verify_signatures(verifier) {
        return Err(Rejection::InvalidSignature);
    }

    match candidate.shape() {
        SignatureShape::Unsigned => Err(Rejection::Unsigned),
        SignatureShape::Proposal(_) => validate_proposal(history, candidate, engine),
        SignatureShape::Acknowledged => validate_acknowledgement(history, candidate, engine),
    }
}

fn check_identity<E: ContractEngine>(prior: &Signed<E>, candidate: &Signed<E>) -> Result<(), Rejection> {
    let (prior, next) = (&prior.contract_update, &candidate.contract_update);

    if prior.contract_id != next.contract_id {
        return Err(Rejection::ContractMismatch);
    }
    if !prior.same_parties(next) || prior.contract_address != next.contract_address {
        return Err(Rejection::IdentityChanged);
    }
    if prior.contract_terms != next.contract_terms {
        return Err(Rejection::TermsChanged);
    }
    Ok(())
}

fn check_state<E: ContractEngine>(
    base: &[Signed<E>],
    candidate: &Signed<E>,
    engine: &E,
) -> Result<(), Rejection> {
    let update = &candidate.contract_update;

    if update.update_nonce == 0 {
        return engine
            .validate_initial_state(&update.contract_terms, &update.contract_state)
            .then_some(())
            .ok_or(Rejection::InvalidInitialState);
    }

    let anchor = anchor(base).ok_or(Rejection::NoPriorUpdate)?;
    engine
        .validate_next_state(
            &update.contract_terms,
            &anchor.contract_update.contract_state,
            &update.contract_state,
        )
        .then_some(())
        .ok_or(Rejection::InvalidSuccessorState)
}

fn validate_proposal<E: ContractEngine>(
    history: &[Signed<E>],
    candidate: &Signed<E>,
    engine: &E,
) -> Result<(), Rejection> {
    let nonce = candidate.nonce();

    if nonce == 0 {
        if !history.is_empty() {
            return Err(Rejection::HistoryNotEmpty);
        }
        return check_state(history, candidate, engine);
    }

    let last = history.last().ok_or(Rejection::NoPriorUpdate)?;
    check_identity::<E>(last, candidate)?;

    // any proposal of the open round, not only the latest one
    let mut open_round = history.iter().rev().take_while(|update| !update.is_acknowledged());
    if candidate == last || open_round.any(|update| update == candidate) {
        return Err(Rejection::Duplicate);
    }

    let base = anchor(history).ok_or(Rejection::NoPriorUpdate)?;
    if nonce <= base.nonce() {
        return Err(Rejection::NonceNotAdvanced {
            prior: base.nonce(),
            got: nonce,
        });
    }
    if nonce != base.nonce() + 1 {
        return Err(Rejection::NonceGap {
            expected: base.nonce() + 1,
            got: nonce,
        });
    }

    check_state(history, candidate, engine)
}

fn validate_acknowledgement<E: ContractEngine>(
    history: &[Signed<E>],
    candidate: &Signed<E>,
    engine: &E,
) -> Result<(), Rejection> {
    let (last, earlier) = history.split_last().ok_or(Rejection::NoPriorUpdate)?;
    check_identity::<E>(last, candidate)?;

    // a co-signer may only fill the empty slot
    for party in [Party::A, Party::B] {
        if let Some(existing) = last.signature(party) {
            if candidate.signature(party) != Some(existing) {
                return Err(Rejection::SignatureAltered);
            }
        }
    }

    if candidate.nonce() != last.nonce() {
        return Err(Rejection::NonceMismatch {
            expected: last.nonce(),
            got: candidate.nonce(),
        });
    }
    if candidate == last {
        return Err(Rejection::Duplicate);
    }

    check_state(earlier, candidate, engine)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        fixed_rate::{ContractRole, FixedRateEngine, FixedRateTerms},
        signer::Ed25519Signer,
        types::TimeStamp,
        update::ContractUpdate,
    };

    fn terms() -> FixedRateTerms {
        let start = TimeStamp::new_with(2025, 1, 1, 0, 0, 0).unwrap();
        FixedRateTerms {
            role: ContractRole::Lender,
            notional: 10_000,
            rate_bps: 500,
            maturity: start.add_seconds(365 * 86_400),
            initial_exchange: start,
            interest_cycle_secs: 90 * 86_400,
        }
    }

    fn proposal(
        a: &Ed25519Signer,
        b: &Ed25519Signer,
    ) -> SignedContractUpdate<FixedRateTerms, crate::fixed_rate::FixedRateState> {
        let terms = terms();
        let state = FixedRateEngine.compute_initial_state(&terms).unwrap();
        let update = ContractUpdate {
            contract_id: "contract1test".into(),
            party_a_address: a.account_id().into(),
            party_b_address: b.account_id().into(),
            contract_address: String::new(),
            contract_terms: terms,
            contract_state: state,
            update_nonce: 0,
        };
        let digest = update.digest().unwrap();
        let mut signed = SignedContractUpdate::unsigned(update);
        signed.set_signature(Party::A, a.sign(digest.as_bytes()).unwrap());
        signed
    }

    #[test]
    fn initial_proposal_on_empty_history() {
        let a = Ed25519Signer::generate().unwrap();
        let b = Ed25519Signer::generate().unwrap();
        let p0 = proposal(&a, &b);

        assert_eq!(validate(&[], &p0, &FixedRateEngine, &b), Ok(()));
        assert_eq!(
            validate(&[p0.clone()], &p0, &FixedRateEngine, &b),
            Err(Rejection::HistoryNotEmpty)
        );
    }

    #[test]
    fn unsigned_update_is_rejected() {
        let a = Ed25519Signer::generate().unwrap();
        let b = Ed25519Signer::generate().unwrap();
        let p0 = proposal(&a, &b);
        let bare = SignedContractUpdate::unsigned(p0.contract_update);

        assert_eq!(
            validate(&[], &bare, &FixedRateEngine, &b),
            Err(Rejection::Unsigned)
        );
    }

    #[test]
    fn signature_in_wrong_slot_is_rejected() {
        let a = Ed25519Signer::generate().unwrap();
        let b = Ed25519Signer::generate().unwrap();
        let mut p0 = proposal(&a, &b);
        let sig = p0.party_a_signature.clone();
        p0.party_a_signature.clear();
        p0.party_b_signature = sig;

        assert_eq!(
            validate(&[], &p0, &FixedRateEngine, &b),
            Err(Rejection::InvalidSignature)
        );
    }

    #[test]
    fn acknowledgement_needs_prior_proposal() {
        let a = Ed25519Signer::generate().unwrap();
        let b = Ed25519Signer::generate().unwrap();
        let p0 = proposal(&a, &b);
        let digest = p0.contract_update.digest().unwrap();
        let mut ack = p0.clone();
        ack.set_signature(Party::B, b.sign(digest.as_bytes()).unwrap());

        assert_eq!(
            validate(&[], &ack, &FixedRateEngine, &a),
            Err(Rejection::NoPriorUpdate)
        );
        assert_eq!(validate(&[p0], &ack, &FixedRateEngine, &a), Ok(()));
    }

    #[test]
    fn anchor_skips_trailing_proposal() {
        let a = Ed25519Signer::generate().unwrap();
        let b = Ed25519Signer::generate().unwrap();
        let p0 = proposal(&a, &b);

        assert!(anchor(std::slice::from_ref(&p0)).is_none());

        let mut ack = p0.clone();
        ack.party_b_signature = "00".into();
        let history = vec![p0.clone(), ack.clone(), p0];
        assert_eq!(anchor(&history), Some(&ack));
    }
}
