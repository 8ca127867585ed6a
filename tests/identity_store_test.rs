//! Integration tests for identity enumeration, classification and ranking.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use profile_signer::identity::{CertStamp, IdentityCandidate, IssuerAttr};
use profile_signer::store::memory::MemoryTrustStore;
use profile_signer::{CertificateType, IdentityStore, SIGNING_SUBJECT_MARKERS};

fn raw_candidate(subject: &str, has_key: bool, not_after: Option<CertStamp>) -> IdentityCandidate {
    IdentityCandidate {
        subject: subject.to_string(),
        common_name: Some(subject.to_string()),
        issuer_attrs: vec![IssuerAttr {
            oid: "2.5.4.3".into(),
            value: "Test Issuer CA".into(),
        }],
        not_before: None,
        not_after,
        has_private_key: has_key,
        fingerprint: format!("fp-{subject}"),
    }
}

fn day() -> Duration {
    Duration::from_secs(86_400)
}

#[test]
fn every_listed_identity_matches_a_signing_marker() {
    let mut store = MemoryTrustStore::new();
    let now = SystemTime::now();
    store
        .add_identity("Apple Development: Jane Appleseed (ABCDE12345)", now, now + 30 * day())
        .unwrap();
    store
        .add_identity("iPhone Distribution: Acme Corp (FGHIJ67890)", now, now + 60 * day())
        .unwrap();
    // A perfectly valid TLS certificate that is not a code-signing identity.
    store.add_identity("example.com", now, now + 90 * day()).unwrap();

    let identities = IdentityStore::new(Arc::new(store)).list_signing_identities();

    assert_eq!(identities.len(), 2);
    for identity in &identities {
        assert!(
            SIGNING_SUBJECT_MARKERS
                .iter()
                .any(|m| identity.name.contains(m)),
            "unexpected identity surfaced: {}",
            identity.name
        );
    }
}

#[test]
fn keyless_candidates_never_surface() {
    let mut store = MemoryTrustStore::new();
    store.add_candidate(raw_candidate(
        "Apple Development: No Key (XXXXX00000)",
        false,
        Some(CertStamp::At(SystemTime::now() + 10 * day())),
    ));

    let identities = IdentityStore::new(Arc::new(store)).list_signing_identities();
    assert!(identities.is_empty());
}

#[test]
fn duplicate_subject_common_name_pairs_are_suppressed() {
    let mut store = MemoryTrustStore::new();
    let now = SystemTime::now();
    // Two keychain entries for the same certificate subject.
    store
        .add_identity("Apple Distribution: Acme Corp (FGHIJ67890)", now, now + 30 * day())
        .unwrap();
    store
        .add_identity("Apple Distribution: Acme Corp (FGHIJ67890)", now, now + 30 * day())
        .unwrap();

    let identities = IdentityStore::new(Arc::new(store)).list_signing_identities();
    assert_eq!(identities.len(), 1);
}

#[test]
fn valid_identities_rank_before_expired_ones() {
    let mut store = MemoryTrustStore::new();
    let now = SystemTime::now();
    store
        .add_identity("Apple Development: Expired (AAAAA11111)", now - 400 * day(), now - 10 * day())
        .unwrap();
    store
        .add_identity("Apple Development: Later (BBBBB22222)", now, now + 200 * day())
        .unwrap();
    store
        .add_identity("Apple Development: Sooner (CCCCC33333)", now, now + 20 * day())
        .unwrap();

    let identities = IdentityStore::new(Arc::new(store)).list_signing_identities();

    assert_eq!(identities.len(), 3);
    assert!(identities[0].name.contains("Sooner"));
    assert!(identities[1].name.contains("Later"));
    assert!(identities[2].name.contains("Expired"));
    assert!(identities[2].is_expired());
    assert_eq!(identities[2].days_until_expiration(), None);
}

#[test]
fn expiry_attributes_are_derived_from_the_certificate() {
    let mut store = MemoryTrustStore::new();
    let now = SystemTime::now();
    store
        .add_identity(
            "Apple Development: Jane Appleseed (ABCDE12345)",
            now - day(),
            now + 45 * day() + Duration::from_secs(600),
        )
        .unwrap();

    let identities = IdentityStore::new(Arc::new(store)).list_signing_identities();
    let identity = &identities[0];

    assert!(!identity.is_expired());
    assert_eq!(identity.days_until_expiration(), Some(45));
    assert_eq!(identity.certificate_type, CertificateType::AppleDevelopment);
    assert!(identity.not_before.is_some());
    assert!(identity.not_after.is_some());
    assert!(!identity.fingerprint.is_empty());
}

#[test]
fn unknown_expiry_identities_are_retained_without_day_count() {
    let mut store = MemoryTrustStore::new();
    store.add_candidate(raw_candidate(
        "Mac Developer: Opaque Metadata (DDDDD44444)",
        true,
        None,
    ));

    let identities = IdentityStore::new(Arc::new(store)).list_signing_identities();
    assert_eq!(identities.len(), 1);
    assert!(!identities[0].is_expired());
    assert_eq!(identities[0].days_until_expiration(), None);
    assert_eq!(identities[0].issuer_name, "Test Issuer CA");
}

#[test]
fn unknown_expiry_sends_the_group_to_name_order() {
    let mut store = MemoryTrustStore::new();
    let now = SystemTime::now();
    store
        .add_identity("Apple Development: Zed Known (ZZZZZ99999)", now, now + 1400 * day())
        .unwrap();
    store.add_candidate(raw_candidate(
        "Apple Development: Abe Unknown (AAAAA00000)",
        true,
        None,
    ));

    let identities = IdentityStore::new(Arc::new(store)).list_signing_identities();

    // Both are valid, but one expiry date is unknown, so the group orders
    // lexicographically by subject name instead of by date.
    assert_eq!(identities.len(), 2);
    assert!(identities[0].name.contains("Abe Unknown"));
    assert!(identities[1].name.contains("Zed Known"));
}

#[test]
fn reference_epoch_validity_values_are_decoded() {
    let mut store = MemoryTrustStore::new();
    // 30 days from now, expressed as seconds since 2001-01-01.
    let now_unix = SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs() as f64;
    let reference_offset = now_unix - 978_307_200.0 + 30.0 * 86_400.0;

    store.add_candidate(raw_candidate(
        "iOS Distribution: Offset Encoded (EEEEE55555)",
        true,
        Some(CertStamp::SinceReferenceEpoch(reference_offset)),
    ));

    let identities = IdentityStore::new(Arc::new(store)).list_signing_identities();
    assert_eq!(identities.len(), 1);
    assert!(!identities[0].is_expired());
    let days = identities[0].days_until_expiration().unwrap();
    assert!((29..=30).contains(&days), "got {days} days");
}

#[test]
fn enumeration_is_fresh_on_every_call() {
    let mut store = MemoryTrustStore::new();
    let now = SystemTime::now();
    store
        .add_identity("Apple Development: Stable (ABCDE12345)", now, now + 30 * day())
        .unwrap();

    let store = IdentityStore::new(Arc::new(store));
    let first = store.list_signing_identities();
    let second = store.list_signing_identities();

    assert_eq!(first.len(), second.len());
    // The name is the stable lookup key across enumerations.
    assert_eq!(first[0].name, second[0].name);
}
