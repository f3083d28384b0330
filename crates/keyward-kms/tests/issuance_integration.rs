#![allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]

//! Integration tests for DEK issuance against the in-memory store.

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

use data_encoding::BASE64;
use keyward_crypto_core::protect::MachineProtector;
use keyward_kms::{
    KeyGenerationRequest, KeyIssuance, KeyStatus, KeyVersion, KmsConfig, KmsError,
    MasterKeyLifecycle, MemoryKeyStore, RequestContext, RotationPolicy, StoreError,
};
use tempfile::TempDir;
use uuid::Uuid;

struct Harness {
    dir: TempDir,
    issuance: Arc<KeyIssuance>,
    store: Arc<MemoryKeyStore>,
}

fn harness() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let config = KmsConfig {
        backup_kdf_rounds: 1_000,
        ..KmsConfig::default()
    };
    let protector = MachineProtector::open(&config.protector_key_path(dir.path()), "host-a").unwrap();
    let lifecycle = Arc::new(MasterKeyLifecycle::new(dir.path(), &config, Arc::new(protector)));
    lifecycle.create_new_master_key("correct-password").unwrap();
    let store = Arc::new(MemoryKeyStore::new());
    let issuance = Arc::new(KeyIssuance::new(lifecycle, store.clone()));
    Harness {
        dir,
        issuance,
        store,
    }
}

fn request(client_id: Uuid) -> KeyGenerationRequest {
    KeyGenerationRequest {
        client_id,
        policy: RotationPolicy::manual(),
        skip_ip_validation: false,
    }
}

fn decode(b64: &str) -> Vec<u8> {
    BASE64.decode(b64.as_bytes()).unwrap()
}

#[test]
fn generate_and_retrieve_round_trip() {
    let h = harness();
    let client = h.store.register_client("client-42", vec![]);
    let ctx = RequestContext::default();

    let record = h.issuance.generate(&request(client), &ctx).unwrap();
    let dek = decode(&h.issuance.retrieve(client, KeyVersion::Current, &ctx).unwrap());
    assert_eq!(dek.len(), 32);
    assert_eq!(record.status, KeyStatus::Active);
    // Stored bytes are the wrapped form, not the DEK.
    assert!(!record.wrapped_key.windows(32).any(|w| w == dek.as_slice()));
}

#[test]
fn previous_version_after_rotation() {
    let h = harness();
    let client = h.store.register_client("rotating", vec![]);
    let ctx = RequestContext::default();

    h.issuance.generate(&request(client), &ctx).unwrap();
    let v1 = decode(&h.issuance.retrieve(client, KeyVersion::Current, &ctx).unwrap());

    let rotated = h.issuance.generate(&request(client), &ctx).unwrap();
    assert_eq!(rotated.version, 2);
    let v2 = decode(&h.issuance.retrieve(client, KeyVersion::Current, &ctx).unwrap());
    let previous = decode(&h.issuance.retrieve(client, KeyVersion::Previous, &ctx).unwrap());

    assert_ne!(v1, v2);
    assert_eq!(previous, v1);
    let info = h.issuance.key_info(client, KeyVersion::Previous, &ctx).unwrap();
    assert_eq!((info.version, info.status), (1, KeyStatus::Rotated));
}

#[test]
fn revoked_key_cannot_be_retrieved_as_previous() {
    let h = harness();
    let client = h.store.register_client("revoking", vec![]);
    let ctx = RequestContext::default();

    h.issuance.generate(&request(client), &ctx).unwrap();
    h.issuance.generate(&request(client), &ctx).unwrap();
    assert_eq!(h.store.revoke_active_key(client, "compromised").unwrap(), 2);
    let v3 = h.issuance.generate(&request(client), &ctx).unwrap();
    assert_eq!(v3.version, 3);

    let err = h
        .issuance
        .retrieve(client, KeyVersion::Previous, &ctx)
        .unwrap_err();
    assert!(matches!(
        err,
        KmsError::NotFound {
            version: KeyVersion::Previous,
            ..
        }
    ));
    assert!(h.issuance.retrieve(client, KeyVersion::Current, &ctx).is_ok());
}

#[test]
fn keys_survive_a_restart() {
    let h = harness();
    let client = h.store.register_client("durable", vec![]);
    let ctx = RequestContext::default();
    h.issuance.generate(&request(client), &ctx).unwrap();
    let before = h.issuance.retrieve(client, KeyVersion::Current, &ctx).unwrap();

    let config = KmsConfig {
        backup_kdf_rounds: 1_000,
        ..KmsConfig::default()
    };
    let protector =
        MachineProtector::open(&config.protector_key_path(h.dir.path()), "host-a").unwrap();
    let restarted = Arc::new(MasterKeyLifecycle::new(h.dir.path(), &config, Arc::new(protector)));
    let issuance = KeyIssuance::new(restarted, h.store.clone());
    let after = issuance.retrieve(client, KeyVersion::Current, &ctx).unwrap();
    assert_eq!(*before, *after);
}

#[test]
fn ip_allow_list_and_admin_bypass() {
    let h = harness();
    let allowed = IpAddr::V4(Ipv4Addr::new(192, 168, 1, 10));
    let stranger = IpAddr::V4(Ipv4Addr::new(203, 0, 113, 5));
    let client = h.store.register_client("pinned", vec![allowed]);

    let err = h
        .issuance
        .generate(&request(client), &RequestContext::from_ip(stranger))
        .unwrap_err();
    assert!(matches!(err, KmsError::Store(StoreError::IpNotAllowed)));

    let admin = KeyGenerationRequest {
        skip_ip_validation: true,
        ..request(client)
    };
    h.issuance.generate(&admin, &RequestContext::default()).unwrap();

    assert!(h
        .issuance
        .retrieve(client, KeyVersion::Current, &RequestContext::from_ip(allowed))
        .is_ok());
    let err = h
        .issuance
        .retrieve(client, KeyVersion::Current, &RequestContext::from_ip(stranger))
        .unwrap_err();
    assert!(matches!(err, KmsError::Store(ref e) if e.code() == 1002));
}

#[test]
fn concurrent_generate_and_retrieve() {
    let h = harness();
    let clients: Vec<Uuid> = (0..8)
        .map(|i| h.store.register_client(&format!("client-{i}"), vec![]))
        .collect();

    let handles: Vec<_> = clients
        .iter()
        .copied()
        .map(|client| {
            let issuance = Arc::clone(&h.issuance);
            std::thread::spawn(move || {
                let ctx = RequestContext::default();
                let mut seen = Vec::new();
                for _ in 0..5 {
                    issuance.generate(&request(client), &ctx).unwrap();
                    let dek = issuance.retrieve(client, KeyVersion::Current, &ctx).unwrap();
                    seen.push(dek.to_string());
                }
                seen
            })
        })
        .collect();

    for (client, handle) in clients.iter().zip(handles) {
        let seen = handle.join().unwrap();
        let mut unique = seen.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), 5, "each generation yields a fresh DEK");
        assert_eq!(h.store.keys(*client).len(), 5);
    }
}
