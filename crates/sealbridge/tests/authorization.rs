//! Session, policy and threshold checks on key release.

use std::time::Duration;

use bytes::Bytes;

use sealbridge::core::Identifier;
use sealbridge::seal::{KeyClient, SealError};
use sealbridge::{PipelineError, PolicyRef};
use sealbridge_testkit::Deployment;

fn seal_error(err: PipelineError) -> SealError {
    match err {
        PipelineError::Seal(e) => e,
        other => panic!("expected a seal error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_session_expiry_boundary() {
    let d = Deployment::new(3, 2);
    let receipt = d
        .pipeline
        .encrypt_and_publish(Bytes::from_static(b"expiring"))
        .await
        .unwrap();
    let session = d.session();
    let ttl = Duration::from_secs(u64::from(d.pipeline.config().ttl_minutes) * 60);

    d.advance(ttl - Duration::from_millis(1));
    let plaintext = d
        .pipeline
        .fetch_and_decrypt(&receipt.content_id, &session)
        .await
        .unwrap();
    assert_eq!(plaintext, b"expiring");

    d.advance(Duration::from_millis(2));
    let err = d
        .pipeline
        .fetch_and_decrypt(&receipt.content_id, &session)
        .await
        .unwrap_err();
    assert!(err.is_authorization());
    assert!(matches!(seal_error(err), SealError::SessionExpired));
}

#[tokio::test]
async fn test_threshold_equal_to_server_count() {
    let d = Deployment::new(3, 3);
    let receipt = d
        .pipeline
        .encrypt_and_publish(Bytes::from_static(b"all three"))
        .await
        .unwrap();
    assert_eq!(receipt.header.threshold.get(), 3);
    assert_eq!(receipt.header.share_count, 3);

    let plaintext = d
        .pipeline
        .fetch_and_decrypt(&receipt.content_id, &d.session())
        .await
        .unwrap();
    assert_eq!(plaintext, b"all three");
}

#[tokio::test]
async fn test_majority_below_threshold_is_insufficient() {
    let d = Deployment::new(5, 4);
    let receipt = d
        .pipeline
        .encrypt_and_publish(Bytes::from_static(b"four of five"))
        .await
        .unwrap();

    // Three of five answer: a majority, but below the threshold.
    d.committee.set_reachable(0, false);
    d.committee.set_reachable(1, false);

    let err = d
        .pipeline
        .fetch_and_decrypt(&receipt.content_id, &d.session())
        .await
        .unwrap_err();
    assert!(err.is_transient());
    match seal_error(err) {
        SealError::InsufficientShares { required, received } => {
            assert_eq!(required, 4);
            assert_eq!(received, 3);
        }
        other => panic!("expected InsufficientShares, got {other:?}"),
    }
}

#[tokio::test]
async fn test_unreferenced_identifier_is_policy_mismatch() {
    let d = Deployment::new(3, 2);
    let receipt = d
        .pipeline
        .encrypt_and_publish(Bytes::from_static(b"covered"))
        .await
        .unwrap();
    let envelope = d.pipeline.fetch_envelope(&receipt.content_id).await.unwrap();
    let tx = d.pipeline.approval_for(&envelope).unwrap();

    let keys = KeyClient::new(
        d.committee.key_servers(d.ledger.clone(), d.clock.clone()),
        d.clock.clone(),
    );
    let other = d.pipeline.new_identifier(true);
    assert_ne!(&other, envelope.identifier());

    let err = keys
        .request_keys(&[other], &tx, &d.session(), envelope.threshold())
        .await
        .unwrap_err();
    assert!(matches!(err, SealError::PolicyMismatch(_)));
    assert!(err.is_authorization());
}

#[tokio::test]
async fn test_identifier_outside_policy_namespace_is_rejected() {
    let d = Deployment::new(3, 2);
    let mut envelope = d
        .pipeline
        .encrypt(Bytes::from_static(b"x"), true)
        .await
        .unwrap()
        .envelope;
    envelope.header.identifier = Identifier::from_bytes(vec![7u8; 8]).unwrap();

    let err = d.pipeline.approval_for(&envelope).unwrap_err();
    assert!(matches!(seal_error(err), SealError::PolicyMismatch(_)));
}

#[tokio::test]
async fn test_revoked_member_is_denied() {
    let d = Deployment::new(3, 2);
    let receipt = d
        .pipeline
        .encrypt_and_publish(Bytes::from_static(b"members only"))
        .await
        .unwrap();
    let session = d.session();
    d.revoke_user();

    let err = d
        .pipeline
        .fetch_and_decrypt(&receipt.content_id, &session)
        .await
        .unwrap_err();
    assert!(!err.is_transient());
    assert!(matches!(seal_error(err), SealError::AccessDenied(_)));
}

#[tokio::test]
async fn test_stranger_is_denied() {
    let d = Deployment::new(3, 2);
    let receipt = d
        .pipeline
        .encrypt_and_publish(Bytes::from_static(b"members only"))
        .await
        .unwrap();
    let session = d.pipeline.mint_session(&d.stranger()).unwrap();

    let err = d
        .pipeline
        .fetch_and_decrypt(&receipt.content_id, &session)
        .await
        .unwrap_err();
    assert!(matches!(seal_error(err), SealError::AccessDenied(_)));
}

#[tokio::test]
async fn test_bare_policy_identifier_still_decrypts() {
    let d = Deployment::builder().include_nonce(false).build();
    let receipt = d
        .pipeline
        .encrypt_and_publish(Bytes::from_static(b"no nonce"))
        .await
        .unwrap();
    assert_eq!(receipt.identifier, Identifier::for_policy(&d.policy));
    assert_eq!(receipt.identifier.policy_prefix(), Some(d.policy));
    assert_ne!(d.policy, PolicyRef::ZERO);

    let plaintext = d
        .pipeline
        .fetch_and_decrypt(&receipt.content_id, &d.session())
        .await
        .unwrap();
    assert_eq!(plaintext, b"no nonce");
}
