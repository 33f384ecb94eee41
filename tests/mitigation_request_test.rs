// End-to-end mitigation lifecycle through the dispatcher: create, update,
// delete, and the failure paths that must leave no trace behind.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use dots_server::blocker::Blocker;
use dots_server::config::ServerConfig;
use dots_server::dispatcher::{Dispatcher, Method};
use dots_server::messages::{
    MitigationRequest, MitigationResponse, MitigationScopePayload, Scope, TargetPortRange,
};
use dots_server::mitigation_scope::PortRange;
use dots_server::repository::{Repository, SqliteRepository};

use common::{cbor, pdu, repo_with_customer, CountingBlocker, TEST_COMMON_NAME};

struct Setup {
    repo: Arc<SqliteRepository>,
    blocker: Arc<CountingBlocker>,
    dispatcher: Dispatcher,
}

async fn setup() -> Setup {
    let repo = repo_with_customer().await;
    let blocker = CountingBlocker::new(1, 100, repo.clone());
    let dispatcher = Dispatcher::signal_channel(
        repo.clone(),
        vec![blocker.clone() as Arc<dyn Blocker>],
        &ServerConfig::default(),
    );
    Setup {
        repo,
        blocker,
        dispatcher,
    }
}

fn single_scope_request(scope: Scope) -> MitigationRequest {
    MitigationRequest {
        mitigation_scope: MitigationScopePayload {
            scopes: vec![scope],
            client_identifier: None,
        },
    }
}

fn basic_scope() -> Scope {
    Scope {
        mitigation_id: 12345,
        target_prefix: vec!["192.0.2.0/24".to_string()],
        target_protocol: vec![6],
        lifetime: 3600,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_put_fresh_mitigation_returns_created() {
    let s = setup().await;

    let request = single_scope_request(basic_scope());
    let response = s
        .dispatcher
        .handle(
            &pdu(Method::Put, "/mitigation_request", cbor(&request)),
            Some(TEST_COMMON_NAME),
        )
        .await;

    assert_eq!(response.code, 0x41); // 2.01 Created

    let stored = s
        .repo
        .get_mitigation_scope(1, TEST_COMMON_NAME, 12345)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.mitigation_id, 12345);
    assert_eq!(stored.lifetime, 3600);
    assert!(stored.target_protocol.contains(&6));
    assert_eq!(s.blocker.execute_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_put_same_id_again_returns_changed() {
    let s = setup().await;
    let request = single_scope_request(basic_scope());
    let payload = cbor(&request);

    let response = s
        .dispatcher
        .handle(
            &pdu(Method::Put, "/mitigation_request", payload.clone()),
            Some(TEST_COMMON_NAME),
        )
        .await;
    assert_eq!(response.code, 0x41);

    let response = s
        .dispatcher
        .handle(
            &pdu(Method::Put, "/mitigation_request", payload),
            Some(TEST_COMMON_NAME),
        )
        .await;
    assert_eq!(response.code, 0x44); // 2.04 Changed

    // The prior protection was stopped exactly once, and the replacement
    // executed after it.
    assert_eq!(s.blocker.stop_calls.load(Ordering::SeqCst), 1);
    assert_eq!(s.blocker.execute_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_put_with_two_scopes_is_bad_request() {
    let s = setup().await;

    let mut second = basic_scope();
    second.mitigation_id = 12346;
    let request = MitigationRequest {
        mitigation_scope: MitigationScopePayload {
            scopes: vec![basic_scope(), second],
            client_identifier: None,
        },
    };

    let response = s
        .dispatcher
        .handle(
            &pdu(Method::Put, "/mitigation_request", cbor(&request)),
            Some(TEST_COMMON_NAME),
        )
        .await;

    assert_eq!(response.code, 0x80); // 4.00 Bad Request
    assert!(s
        .repo
        .get_mitigation_ids(1, TEST_COMMON_NAME)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_put_normalizes_zero_upper_port() {
    let s = setup().await;

    let mut scope = basic_scope();
    scope.target_port_range = vec![TargetPortRange {
        lower_port: 443,
        upper_port: 0,
    }];
    let response = s
        .dispatcher
        .handle(
            &pdu(
                Method::Put,
                "/mitigation_request",
                cbor(&single_scope_request(scope)),
            ),
            Some(TEST_COMMON_NAME),
        )
        .await;
    assert_eq!(response.code, 0x41);

    let stored = s
        .repo
        .get_mitigation_scope(1, TEST_COMMON_NAME, 12345)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.target_port_range, vec![PortRange::new(443, 443)]);
}

#[tokio::test]
async fn test_put_coerces_nonpositive_lifetime_to_default() {
    let s = setup().await;

    let mut scope = basic_scope();
    scope.lifetime = 0;
    let response = s
        .dispatcher
        .handle(
            &pdu(
                Method::Put,
                "/mitigation_request",
                cbor(&single_scope_request(scope)),
            ),
            Some(TEST_COMMON_NAME),
        )
        .await;
    assert_eq!(response.code, 0x41);

    let stored = s
        .repo
        .get_mitigation_scope(1, TEST_COMMON_NAME, 12345)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        stored.lifetime,
        ServerConfig::default().lifecycle.default_mitigation_lifetime
    );
}

#[tokio::test]
async fn test_put_outside_policy_is_bad_request() {
    let s = setup().await;

    let mut scope = basic_scope();
    scope.target_prefix = vec!["198.51.100.0/24".to_string()];
    let response = s
        .dispatcher
        .handle(
            &pdu(
                Method::Put,
                "/mitigation_request",
                cbor(&single_scope_request(scope)),
            ),
            Some(TEST_COMMON_NAME),
        )
        .await;

    assert_eq!(response.code, 0x80);
    assert!(s
        .repo
        .get_mitigation_scope(1, TEST_COMMON_NAME, 12345)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_put_rollback_leaves_nothing_behind() {
    let s = setup().await;
    s.blocker.fail_execute.store(true, Ordering::SeqCst);

    let response = s
        .dispatcher
        .handle(
            &pdu(
                Method::Put,
                "/mitigation_request",
                cbor(&single_scope_request(basic_scope())),
            ),
            Some(TEST_COMMON_NAME),
        )
        .await;

    // Blocker failure after rollback surfaces as 5.00
    assert_eq!(response.code, 0xa0);

    // Registered protection was unregistered again and the scope row is gone
    assert_eq!(s.blocker.unregister_calls.load(Ordering::SeqCst), 1);
    assert!(s
        .repo
        .get_active_protection_by_mitigation_id(1, TEST_COMMON_NAME, 12345)
        .await
        .unwrap()
        .is_none());
    assert!(s
        .repo
        .get_mitigation_scope(1, TEST_COMMON_NAME, 12345)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_update_with_refusing_blocker_is_internal_server_error() {
    let s = setup().await;
    let request = single_scope_request(basic_scope());
    let payload = cbor(&request);

    s.dispatcher
        .handle(
            &pdu(Method::Put, "/mitigation_request", payload.clone()),
            Some(TEST_COMMON_NAME),
        )
        .await;

    // The running protection cannot be stopped, so the update aborts with
    // 5.00 and the original scope stays in place.
    s.blocker.fail_stop.store(true, Ordering::SeqCst);
    let response = s
        .dispatcher
        .handle(
            &pdu(Method::Put, "/mitigation_request", payload),
            Some(TEST_COMMON_NAME),
        )
        .await;

    assert_eq!(response.code, 0xa0); // 5.00 Internal Server Error
    assert_eq!(s.blocker.execute_calls.load(Ordering::SeqCst), 1);
    assert!(s
        .repo
        .get_mitigation_scope(1, TEST_COMMON_NAME, 12345)
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn test_delete_with_refusing_blocker_is_internal_server_error() {
    let s = setup().await;
    s.dispatcher
        .handle(
            &pdu(
                Method::Put,
                "/mitigation_request",
                cbor(&single_scope_request(basic_scope())),
            ),
            Some(TEST_COMMON_NAME),
        )
        .await;

    s.blocker.fail_stop.store(true, Ordering::SeqCst);
    let delete_request = single_scope_request(Scope {
        mitigation_id: 12345,
        ..Default::default()
    });
    let response = s
        .dispatcher
        .handle(
            &pdu(Method::Delete, "/mitigation_request", cbor(&delete_request)),
            Some(TEST_COMMON_NAME),
        )
        .await;

    assert_eq!(response.code, 0xa0);
    // The scope was not deleted and its protection is still active
    assert!(s
        .repo
        .get_mitigation_scope(1, TEST_COMMON_NAME, 12345)
        .await
        .unwrap()
        .is_some());
    assert!(s
        .repo
        .get_active_protection_by_mitigation_id(1, TEST_COMMON_NAME, 12345)
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn test_get_reports_scope_status() {
    let s = setup().await;
    let request = single_scope_request(basic_scope());

    s.dispatcher
        .handle(
            &pdu(Method::Put, "/mitigation_request", cbor(&request)),
            Some(TEST_COMMON_NAME),
        )
        .await;

    // GET with an empty scope list enumerates everything the client holds
    let get_request = MitigationRequest::default();
    let response = s
        .dispatcher
        .handle(
            &pdu(Method::Get, "/mitigation_request", cbor(&get_request)),
            Some(TEST_COMMON_NAME),
        )
        .await;
    assert_eq!(response.code, 0x45); // 2.05 Content

    let body: MitigationResponse = ciborium::de::from_reader(&response.payload[..]).unwrap();
    assert_eq!(body.mitigation_scope.scopes.len(), 1);
    let status = &body.mitigation_scope.scopes[0];
    assert_eq!(status.mitigation_id, 12345);
    assert_eq!(status.lifetime, 3600);
    assert!(status.mitigation_start > 0.0);
    assert_eq!(status.status, 2);
    assert_eq!(status.bytes_dropped, 0);
    assert_eq!(status.pps_dropped, 0);
    assert_eq!(status.target_protocol, vec![6]);
}

#[tokio::test]
async fn test_get_skips_missing_scopes() {
    let s = setup().await;
    s.dispatcher
        .handle(
            &pdu(
                Method::Put,
                "/mitigation_request",
                cbor(&single_scope_request(basic_scope())),
            ),
            Some(TEST_COMMON_NAME),
        )
        .await;

    let mut missing = basic_scope();
    missing.mitigation_id = 999;
    let get_request = MitigationRequest {
        mitigation_scope: MitigationScopePayload {
            scopes: vec![basic_scope(), missing],
            client_identifier: None,
        },
    };
    let response = s
        .dispatcher
        .handle(
            &pdu(Method::Get, "/mitigation_request", cbor(&get_request)),
            Some(TEST_COMMON_NAME),
        )
        .await;
    assert_eq!(response.code, 0x45);

    let body: MitigationResponse = ciborium::de::from_reader(&response.payload[..]).unwrap();
    assert_eq!(body.mitigation_scope.scopes.len(), 1);
    assert_eq!(body.mitigation_scope.scopes[0].mitigation_id, 12345);
}

#[tokio::test]
async fn test_delete_removes_scope_and_protection() {
    let s = setup().await;
    s.dispatcher
        .handle(
            &pdu(
                Method::Put,
                "/mitigation_request",
                cbor(&single_scope_request(basic_scope())),
            ),
            Some(TEST_COMMON_NAME),
        )
        .await;

    let delete_request = single_scope_request(Scope {
        mitigation_id: 12345,
        ..Default::default()
    });
    let response = s
        .dispatcher
        .handle(
            &pdu(Method::Delete, "/mitigation_request", cbor(&delete_request)),
            Some(TEST_COMMON_NAME),
        )
        .await;

    assert_eq!(response.code, 0x42); // 2.02 Deleted
    assert_eq!(s.blocker.stop_calls.load(Ordering::SeqCst), 1);
    assert!(s
        .repo
        .get_mitigation_scope(1, TEST_COMMON_NAME, 12345)
        .await
        .unwrap()
        .is_none());
    assert!(s
        .repo
        .get_active_protection_by_mitigation_id(1, TEST_COMMON_NAME, 12345)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_delete_zero_id_is_not_found() {
    let s = setup().await;

    let delete_request = single_scope_request(Scope {
        mitigation_id: 0,
        ..Default::default()
    });
    let response = s
        .dispatcher
        .handle(
            &pdu(Method::Delete, "/mitigation_request", cbor(&delete_request)),
            Some(TEST_COMMON_NAME),
        )
        .await;

    assert_eq!(response.code, 0x84); // 4.04 Not Found
}

#[tokio::test]
async fn test_delete_unknown_id_is_not_found() {
    let s = setup().await;

    let delete_request = single_scope_request(Scope {
        mitigation_id: 4242,
        ..Default::default()
    });
    let response = s
        .dispatcher
        .handle(
            &pdu(Method::Delete, "/mitigation_request", cbor(&delete_request)),
            Some(TEST_COMMON_NAME),
        )
        .await;

    assert_eq!(response.code, 0x84);
}

#[tokio::test]
async fn test_delete_disabled_protection_is_precondition_failed() {
    let s = setup().await;
    s.dispatcher
        .handle(
            &pdu(
                Method::Put,
                "/mitigation_request",
                cbor(&single_scope_request(basic_scope())),
            ),
            Some(TEST_COMMON_NAME),
        )
        .await;

    // Disable the protection out of band, keeping it unfinished
    let mut protection = s
        .repo
        .get_active_protection_by_mitigation_id(1, TEST_COMMON_NAME, 12345)
        .await
        .unwrap()
        .unwrap();
    protection.is_enabled = false;
    s.repo.update_protection(&protection).await.unwrap();

    let delete_request = single_scope_request(Scope {
        mitigation_id: 12345,
        ..Default::default()
    });
    let response = s
        .dispatcher
        .handle(
            &pdu(Method::Delete, "/mitigation_request", cbor(&delete_request)),
            Some(TEST_COMMON_NAME),
        )
        .await;

    assert_eq!(response.code, 0x8c); // 4.12 Precondition Failed
}

#[tokio::test]
async fn test_client_identifier_namespaces_mitigations() {
    let s = setup().await;

    let mut request = single_scope_request(basic_scope());
    request.mitigation_scope.client_identifier = Some("ops-team-2".to_string());
    let response = s
        .dispatcher
        .handle(
            &pdu(Method::Put, "/mitigation_request", cbor(&request)),
            Some(TEST_COMMON_NAME),
        )
        .await;
    assert_eq!(response.code, 0x41);

    // Stored under the explicit client identifier, not the peer CN
    assert!(s
        .repo
        .get_mitigation_scope(1, "ops-team-2", 12345)
        .await
        .unwrap()
        .is_some());
    assert!(s
        .repo
        .get_mitigation_scope(1, TEST_COMMON_NAME, 12345)
        .await
        .unwrap()
        .is_none());
}
