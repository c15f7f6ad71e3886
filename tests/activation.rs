//! Tests for activation, deactivation and reconciliation of stale activations.

mod common;
use common::*;

// ============ Activate ============

#[tokio::test]
async fn test_activate_sets_flag() {
    let h = harness(Some(KEY));
    h.remote.respond(&activate_path(KEY), Ok(action_body(true)));

    h.licence.activate(&h.token()).await.unwrap();

    assert!(h.licence.is_activated());
    assert_eq!(h.settings.get(keys::ACTIVATED).as_deref(), Some("1"));
    assert_eq!(h.remote.calls_to(&activate_path(KEY)), 1);
}

#[tokio::test]
async fn test_activate_twice_calls_server_once() {
    let h = harness(Some(KEY));
    h.remote.respond(&activate_path(KEY), Ok(action_body(true)));

    h.licence.activate(&h.token()).await.unwrap();
    let err = h.licence.activate(&h.token()).await.unwrap_err();

    assert!(matches!(err, ActivationError::AlreadyActive));
    assert!(err.is_noop());
    assert!(h.licence.is_activated());
    assert_eq!(h.remote.calls_to(&activate_path(KEY)), 1);
}

#[tokio::test]
async fn test_activate_rejects_bad_token() {
    let h = harness(Some(KEY));
    h.remote.respond(&activate_path(KEY), Ok(action_body(true)));
    h.token();

    let err = h.licence.activate("forged").await.unwrap_err();

    assert!(matches!(err, ActivationError::InvalidToken));
    assert!(!h.is_flag_set());
    assert_eq!(h.remote.total_calls(), 0);
}

#[tokio::test]
async fn test_activate_token_is_single_use() {
    let h = harness(Some(KEY));
    h.remote.respond(&activate_path(KEY), Err(FetchError::HttpStatus(503)));

    let token = h.token();
    assert!(h.licence.activate(&token).await.is_err());

    h.remote.respond(&activate_path(KEY), Ok(action_body(true)));
    let err = h.licence.activate(&token).await.unwrap_err();
    assert!(matches!(err, ActivationError::InvalidToken));
    assert_eq!(h.remote.calls_to(&activate_path(KEY)), 1);
}

#[tokio::test]
async fn test_activate_refused_by_server() {
    let h = harness(Some(KEY));
    h.remote.respond(&activate_path(KEY), Ok(action_body(false)));

    let err = h.licence.activate(&h.token()).await.unwrap_err();

    match err {
        ActivationError::RemoteRejected(message) => {
            assert_eq!(message, "License Key reached maximum activation count.")
        }
        other => panic!("expected RemoteRejected, got {:?}", other),
    }
    assert!(!h.is_flag_set());
}

#[tokio::test]
async fn test_activate_client_error_is_rejection() {
    let h = harness(Some(KEY));
    h.remote.respond(&activate_path(KEY), Err(FetchError::HttpStatus(404)));

    let err = h.licence.activate(&h.token()).await.unwrap_err();

    assert_eq!(err, ActivationError::RemoteRejected("HTTP 404".into()));
    assert!(!h.is_flag_set());
}

#[tokio::test]
async fn test_activate_network_failure() {
    let h = harness(Some(KEY));
    h.remote.respond(
        &activate_path(KEY),
        Err(FetchError::Network("connection reset".into())),
    );

    let err = h.licence.activate(&h.token()).await.unwrap_err();

    assert!(matches!(err, ActivationError::Fetch(FetchError::Network(_))));
    assert!(!err.is_noop());
    assert!(!h.is_flag_set());
}

#[tokio::test]
async fn test_activate_without_key() {
    let h = harness(None);

    let err = h.licence.activate(&h.token()).await.unwrap_err();

    assert!(matches!(err, ActivationError::Config(ConfigError::MissingKey)));
    assert_eq!(h.remote.total_calls(), 0);
}

#[tokio::test]
async fn test_missing_key_does_not_use_up_token() {
    let h = harness(None);
    h.remote.respond(&activate_path(KEY), Ok(action_body(true)));
    let token = h.token();

    let err = h.licence.activate(&token).await.unwrap_err();
    assert!(matches!(err, ActivationError::Config(ConfigError::MissingKey)));

    h.settings.set("api_key", KEY);
    h.licence.activate(&token).await.unwrap();
    assert!(h.licence.is_activated());
}

#[tokio::test]
async fn test_activate_invalidates_cached_counts() {
    let h = harness(Some(KEY));
    h.serve_valid_licence(1, 3);
    h.remote.respond(&activate_path(KEY), Ok(action_body(true)));
    assert!(h.licence.is_valid().await);

    h.licence.activate(&h.token()).await.unwrap();
    h.serve_valid_licence(2, 3);
    assert!(h.licence.is_valid().await);

    assert_eq!(h.remote.calls_to(&validate_path(KEY)), 2);
}

// ============ Deactivate ============

#[tokio::test]
async fn test_deactivate_clears_flag() {
    let h = harness(Some(KEY));
    h.mark_activated();
    h.remote.respond(&deactivate_path(KEY), Ok(action_body(true)));

    h.licence.deactivate(&h.token()).await.unwrap();

    assert!(!h.is_flag_set());
    assert_eq!(h.remote.calls_to(&deactivate_path(KEY)), 1);
}

#[tokio::test]
async fn test_deactivate_when_not_active() {
    let h = harness(Some(KEY));

    let err = h.licence.deactivate(&h.token()).await.unwrap_err();

    assert!(matches!(err, ActivationError::NotActive));
    assert!(err.is_noop());
    assert_eq!(h.remote.total_calls(), 0);
}

#[tokio::test]
async fn test_deactivate_refused_keeps_flag() {
    let h = harness(Some(KEY));
    h.mark_activated();
    h.remote.respond(&deactivate_path(KEY), Ok(action_body(false)));

    let err = h.licence.deactivate(&h.token()).await.unwrap_err();

    assert!(matches!(err, ActivationError::RemoteRejected(_)));
    assert!(h.is_flag_set());
}

// ============ Reconciliation ============

#[tokio::test]
async fn test_reconcile_not_activated_is_noop() {
    let h = harness(Some(KEY));

    let outcome = h.licence.activation().reconcile_on_invalid().await;

    assert_eq!(outcome, Reconciliation::NotNeeded);
    assert_eq!(h.remote.total_calls(), 0);
}

#[tokio::test]
async fn test_reconcile_valid_licence_keeps_activation() {
    let h = harness(Some(KEY));
    h.mark_activated();
    h.serve_valid_licence(1, 3);

    let outcome = h.licence.activation().reconcile_on_invalid().await;

    assert_eq!(outcome, Reconciliation::NotNeeded);
    assert!(h.is_flag_set());
    assert_eq!(h.remote.calls_to(&deactivate_path(KEY)), 0);
}

#[tokio::test]
async fn test_reconcile_releases_invalid_licence_once() {
    let h = harness(Some(KEY));
    h.mark_activated();
    h.serve_valid_licence(1, 3);
    h.remote.respond(&deactivate_path(KEY), Ok(action_body(true)));
    assert!(h.licence.is_valid().await);

    // The licence is revoked server-side
    h.remote.respond(&licence_path(KEY), Ok(licence_body(false)));
    h.licence.state().invalidate_remote();

    let outcome = h.licence.activation().reconcile_on_invalid().await;
    assert_eq!(outcome, Reconciliation::Deactivated);
    assert!(!h.is_flag_set());
    assert_eq!(h.remote.calls_to(&deactivate_path(KEY)), 1);

    let again = h.licence.activation().reconcile_on_invalid().await;
    assert_eq!(again, Reconciliation::NotNeeded);
    assert_eq!(h.remote.calls_to(&deactivate_path(KEY)), 1);
}

#[tokio::test]
async fn test_reconcile_empty_key_clears_locally() {
    let h = harness(None);
    h.mark_activated();

    let outcome = h.licence.activation().reconcile_on_invalid().await;

    assert_eq!(outcome, Reconciliation::ClearedLocally);
    assert!(!h.is_flag_set());
    assert_eq!(h.remote.total_calls(), 0);
}

#[tokio::test]
async fn test_reconcile_keeps_flag_when_deactivation_unreachable() {
    let h = harness(Some(KEY));
    h.mark_activated();
    h.remote.respond(&licence_path(KEY), Ok(licence_body(false)));
    h.remote.respond(
        &deactivate_path(KEY),
        Err(FetchError::Network("connection refused".into())),
    );

    let outcome = h.licence.activation().reconcile_on_invalid().await;

    assert_eq!(outcome, Reconciliation::Deferred);
    assert!(h.is_flag_set());
    assert_eq!(h.remote.calls_to(&deactivate_path(KEY)), 1);

    h.remote.respond(&deactivate_path(KEY), Ok(action_body(true)));
    let retried = h.licence.activation().reconcile_on_invalid().await;
    assert_eq!(retried, Reconciliation::Deactivated);
    assert!(!h.is_flag_set());
}

#[tokio::test]
async fn test_reconcile_clears_flag_when_server_refuses_deactivation() {
    let h = harness(Some(KEY));
    h.mark_activated();
    h.remote.respond(&licence_path(KEY), Ok(licence_body(false)));
    h.remote.respond(&deactivate_path(KEY), Err(FetchError::HttpStatus(404)));

    let outcome = h.licence.activation().reconcile_on_invalid().await;

    assert_eq!(outcome, Reconciliation::ClearedLocally);
    assert!(!h.is_flag_set());
}

#[tokio::test]
async fn test_outage_does_not_drop_activation() {
    let h = harness(Some(KEY));
    h.mark_activated();
    for path in [licence_path(KEY), validate_path(KEY), deactivate_path(KEY)] {
        h.remote
            .respond(&path, Err(FetchError::Network("connection timed out".into())));
    }

    let notices = h.licence.periodic_check().await;

    assert_eq!(notices, vec![Notice::InvalidKey]);
    assert!(h.is_flag_set());
    assert_eq!(h.remote.calls_to(&deactivate_path(KEY)), 0);

    // The host comes back
    h.serve_valid_licence(1, 3);
    assert!(h.licence.periodic_check().await.is_empty());
    assert!(h.licence.is_valid().await);
    assert!(h.licence.is_activated());
}

#[tokio::test]
async fn test_reconcile_defers_on_server_error() {
    let h = harness(Some(KEY));
    h.mark_activated();
    h.remote.respond(&licence_path(KEY), Err(FetchError::HttpStatus(503)));

    let outcome = h.licence.activation().reconcile_on_invalid().await;

    assert_eq!(outcome, Reconciliation::Deferred);
    assert!(h.is_flag_set());
    assert_eq!(h.remote.calls_to(&deactivate_path(KEY)), 0);
}

// ============ Periodic check ============

#[tokio::test]
async fn test_periodic_check_valid_and_activated() {
    let h = harness(Some(KEY));
    h.mark_activated();
    h.serve_valid_licence(1, 3);

    assert!(h.licence.periodic_check().await.is_empty());
}

#[tokio::test]
async fn test_periodic_check_asks_for_activation() {
    let h = harness(Some(KEY));
    h.serve_valid_licence(1, 3);

    assert_eq!(h.licence.periodic_check().await, vec![Notice::ActivationNeeded]);
}

#[tokio::test]
async fn test_periodic_check_empty_key() {
    let h = harness(None);

    assert_eq!(
        h.licence.periodic_check().await,
        vec![Notice::EmptyKey, Notice::ActivationNeeded]
    );
}

#[tokio::test]
async fn test_periodic_check_reconciles_revoked_licence() {
    let h = harness(Some(KEY));
    h.mark_activated();
    h.remote.respond(&licence_path(KEY), Ok(licence_body(false)));
    h.remote.respond(&deactivate_path(KEY), Ok(action_body(true)));

    let notices = h.licence.periodic_check().await;

    assert_eq!(notices, vec![Notice::InvalidKey, Notice::ActivationNeeded]);
    assert!(!h.is_flag_set());
}
