//! End-to-end tests against an in-process control plane

mod common;

use axum::http::StatusCode;
use common::{ControlPlane, capture_logs, purger, purger_with, secrets, settings_for};
use section_core::{
    ConfigError, HeaderSetting, Invalidation, InvalidationKind, InvalidationState, PurgerSettings,
    StaticSecrets,
};
use section_purger::PurgeError;

fn batch(kind: InvalidationKind, expressions: &[&str]) -> Vec<Invalidation> {
    expressions
        .iter()
        .enumerate()
        .map(|(id, expression)| Invalidation::new(id as u64 + 1, kind, *expression))
        .collect()
}

fn states(invalidations: &[Invalidation]) -> Vec<InvalidationState> {
    invalidations.iter().map(|i| i.state()).collect()
}

#[tokio::test]
async fn test_batch_is_dispatched_in_order() {
    let control_plane = ControlPlane::start(StatusCode::OK).await;
    let purger = purger(control_plane.settings());
    let mut invalidations = batch(
        InvalidationKind::WildcardPath,
        &["node/*", "/about", "blog/2024"],
    );

    purger
        .invalidate(InvalidationKind::WildcardPath, &mut invalidations)
        .await
        .unwrap();

    assert_eq!(states(&invalidations), vec![InvalidationState::Succeeded; 3]);
    assert_eq!(
        control_plane.ban_expressions(),
        vec![
            r#"req.url ~ "^/node/.*$""#,
            r#"req.url ~ "^/about$""#,
            r#"req.url ~ "^/blog/2024$""#,
        ]
    );

    let requests = control_plane.requests();
    assert!(requests.iter().all(|r| r.method == "POST"));
    assert!(requests.iter().all(|r| {
        r.path == "/api/v1/account/1/application/100/environment/Production/proxy/varnish/state"
    }));
    assert_eq!(
        requests[0].authorization.as_deref(),
        Some("Basic dXNlcm5hbWU6aHVudGVyMg==")
    );
    assert_eq!(
        requests[0].headers.get("user-agent").unwrap(),
        "Section Purge module for Rust"
    );
    assert_eq!(requests[0].headers.get("accept").unwrap(), "application/json");

    assert_eq!(purger.requests_sent(), 3);
    assert_eq!(purger.capacity_hint().unwrap(), 247);
}

#[tokio::test]
async fn test_tags_are_hashed_and_scoped_to_site() {
    let control_plane = ControlPlane::start(StatusCode::OK).await;
    let purger = purger(PurgerSettings {
        site_name: "world".to_string(),
        ..control_plane.settings()
    });
    let mut tags = batch(InvalidationKind::Tag, &["node:1"]);
    let mut everything = batch(InvalidationKind::Everything, &[""]);

    purger.invalidate(InvalidationKind::Tag, &mut tags).await.unwrap();
    purger
        .invalidate(InvalidationKind::Everything, &mut everything)
        .await
        .unwrap();

    assert_eq!(
        control_plane.ban_expressions(),
        vec![
            r#"obj.http.Section-Cache-Tags ~ "Z6pv" && req.http.host == "world""#,
            r#"obj.status != 0 && req.http.host == "world""#,
        ]
    );
}

#[tokio::test]
async fn test_server_error_fails_invalidation() {
    let control_plane = ControlPlane::start(StatusCode::INTERNAL_SERVER_ERROR).await;
    let purger = purger(control_plane.settings());
    let mut invalidations = batch(InvalidationKind::Domain, &["example.com"]);

    let (logs, _guard) = capture_logs();
    purger
        .invalidate(InvalidationKind::Domain, &mut invalidations)
        .await
        .unwrap();

    assert_eq!(states(&invalidations), vec![InvalidationState::Failed]);
    assert_eq!(control_plane.requests().len(), 1);

    let logs = logs.contents();
    assert!(logs.contains("500 Internal Server Error"));
    assert!(logs.contains("data: {"));
    assert!(!logs.contains("hunter2"));
}

#[tokio::test]
async fn test_server_error_ignored_without_http_errors() {
    let control_plane = ControlPlane::start(StatusCode::INTERNAL_SERVER_ERROR).await;
    let purger = purger(PurgerSettings {
        http_errors: false,
        ..control_plane.settings()
    });
    let mut invalidations = batch(InvalidationKind::Domain, &["example.com"]);

    purger
        .invalidate(InvalidationKind::Domain, &mut invalidations)
        .await
        .unwrap();

    assert_eq!(states(&invalidations), vec![InvalidationState::Succeeded]);
}

#[tokio::test]
async fn test_refused_connection_fails_every_invalidation() {
    let addr = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    };
    let purger = purger(settings_for(addr));
    let mut invalidations = batch(InvalidationKind::Path, &["node/1", "node/2"]);

    let (logs, _guard) = capture_logs();
    purger
        .invalidate(InvalidationKind::Path, &mut invalidations)
        .await
        .unwrap();

    assert_eq!(states(&invalidations), vec![InvalidationState::Failed; 2]);
    let expected = format!("http request for http://127.0.0.1:{}/api/v1", addr.port());
    assert!(logs.contents().contains(&expected));
}

#[tokio::test]
async fn test_invalid_url_fails_without_dispatch() {
    let control_plane = ControlPlane::start(StatusCode::OK).await;
    let purger = purger(control_plane.settings());
    let mut invalidations = batch(
        InvalidationKind::Url,
        &["not a url", "http://example.com/node/1"],
    );

    purger
        .invalidate(InvalidationKind::Url, &mut invalidations)
        .await
        .unwrap();

    assert_eq!(
        states(&invalidations),
        vec![InvalidationState::Failed, InvalidationState::Succeeded]
    );
    assert_eq!(
        control_plane.ban_expressions(),
        vec![
            r#"req.http.X-Forwarded-Proto == "http" && req.http.host == "example.com" && req.url ~ "^/node/1$""#
        ]
    );
    assert_eq!(purger.requests_sent(), 1);
}

#[tokio::test]
async fn test_kind_mismatch_is_rejected_up_front() {
    let control_plane = ControlPlane::start(StatusCode::OK).await;
    let purger = purger(control_plane.settings());
    let mut invalidations = vec![
        Invalidation::new(1, InvalidationKind::Tag, "node:1"),
        Invalidation::new(2, InvalidationKind::Path, "node/1"),
    ];

    let err = purger
        .invalidate(InvalidationKind::Tag, &mut invalidations)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        PurgeError::KindMismatch {
            expected: InvalidationKind::Tag,
            found: InvalidationKind::Path,
            id: 2,
        }
    ));
    assert_eq!(states(&invalidations), vec![InvalidationState::Fresh; 2]);
    assert!(control_plane.requests().is_empty());
}

#[tokio::test]
async fn test_missing_secret_aborts_batch() {
    let control_plane = ControlPlane::start(StatusCode::OK).await;
    let (purger, _) = purger_with(control_plane.settings(), StaticSecrets::default());
    let mut invalidations = batch(InvalidationKind::Tag, &["node:1"]);

    let err = purger
        .invalidate(InvalidationKind::Tag, &mut invalidations)
        .await
        .unwrap_err();

    assert!(matches!(err, PurgeError::Config(ConfigError::Secret(_))));
    assert_eq!(states(&invalidations), vec![InvalidationState::Fresh]);
    assert!(control_plane.requests().is_empty());
}

#[tokio::test]
async fn test_invalid_settings_abort_batch() {
    let control_plane = ControlPlane::start(StatusCode::OK).await;
    let purger = purger(PurgerSettings {
        timeout: 9.0,
        connect_timeout: 9.0,
        ..control_plane.settings()
    });
    let mut invalidations = batch(InvalidationKind::Tag, &["node:1"]);

    let err = purger
        .invalidate(InvalidationKind::Tag, &mut invalidations)
        .await
        .unwrap_err();

    match err {
        PurgeError::Config(ConfigError::InvalidSettings(problems)) => {
            assert_eq!(problems.len(), 2)
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(control_plane.requests().is_empty());
}

#[tokio::test]
async fn test_unknown_kind_name() {
    let control_plane = ControlPlane::start(StatusCode::OK).await;
    let purger = purger(control_plane.settings());
    let mut invalidations: Vec<Invalidation> = Vec::new();

    let err = purger
        .invalidate_named("purge-all", &mut invalidations)
        .await
        .unwrap_err();
    assert!(matches!(err, PurgeError::UnsupportedKind(kind) if kind == "purge-all"));

    purger
        .invalidate_named("wildcardurl", &mut invalidations)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_finished_invalidations_are_skipped() {
    let control_plane = ControlPlane::start(StatusCode::OK).await;
    let purger = purger(control_plane.settings());
    let mut invalidations = batch(InvalidationKind::Raw, &["obj.status == 404", "obj.status == 410"]);
    invalidations[0].start_processing().unwrap();
    invalidations[0].fail();

    purger
        .invalidate(InvalidationKind::Raw, &mut invalidations)
        .await
        .unwrap();

    assert_eq!(
        states(&invalidations),
        vec![InvalidationState::Failed, InvalidationState::Succeeded]
    );
    assert_eq!(control_plane.ban_expressions(), vec!["obj.status == 410"]);

    invalidations[0].retry();
    purger
        .invalidate(InvalidationKind::Raw, &mut invalidations[..1])
        .await
        .unwrap();
    assert_eq!(invalidations[0].state(), InvalidationState::Succeeded);
    assert_eq!(control_plane.ban_expressions().len(), 2);
}

#[tokio::test]
async fn test_configured_headers_and_path_tokens() {
    let control_plane = ControlPlane::start(StatusCode::OK).await;
    let purger = purger(PurgerSettings {
        path: "/[invalidation:type]/".to_string(),
        request_method: "PUT".to_string(),
        headers: vec![
            HeaderSetting::new("X-Purge-Type", "[invalidation:type]"),
            HeaderSetting::new("X-Expression", "[invalidation:expression]"),
            HeaderSetting::new("x-purge-type", "override"),
        ],
        ..control_plane.settings()
    });
    let mut invalidations = batch(InvalidationKind::Domain, &["example.com"]);

    purger
        .invalidate(InvalidationKind::Domain, &mut invalidations)
        .await
        .unwrap();

    let requests = control_plane.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, "PUT");
    assert!(requests[0].path.starts_with("/domain/api/v1/account/1/"));
    assert_eq!(requests[0].headers.get("x-expression").unwrap(), "example.com");
    let purge_types: Vec<_> = requests[0]
        .headers
        .get_all("x-purge-type")
        .iter()
        .map(|v| v.to_str().unwrap())
        .collect();
    assert_eq!(purge_types, vec!["override"]);
}

#[tokio::test]
async fn test_invalid_header_value_fails_only_its_invalidation() {
    let control_plane = ControlPlane::start(StatusCode::OK).await;
    let purger = purger(PurgerSettings {
        headers: vec![HeaderSetting::new("X-Expression", "[invalidation:expression]")],
        ..control_plane.settings()
    });
    let mut invalidations = batch(
        InvalidationKind::Raw,
        &["obj.status == 404", "obj.status\n== 404", "obj.status == 410"],
    );

    let (logs, _guard) = capture_logs();
    purger
        .invalidate(InvalidationKind::Raw, &mut invalidations)
        .await
        .unwrap();

    assert_eq!(
        states(&invalidations),
        vec![
            InvalidationState::Succeeded,
            InvalidationState::Failed,
            InvalidationState::Succeeded,
        ]
    );
    assert_eq!(
        control_plane.ban_expressions(),
        vec!["obj.status == 404", "obj.status == 410"]
    );
    assert!(logs.contents().contains("Invalid header x-expression"));
}

#[tokio::test]
async fn test_invalid_header_name_aborts_batch() {
    let control_plane = ControlPlane::start(StatusCode::OK).await;
    let purger = purger(PurgerSettings {
        headers: vec![HeaderSetting::new("X Expression", "[invalidation:expression]")],
        ..control_plane.settings()
    });
    let mut invalidations = batch(InvalidationKind::Raw, &["obj.status == 404"]);

    let err = purger
        .invalidate(InvalidationKind::Raw, &mut invalidations)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        PurgeError::Config(ConfigError::InvalidHeader { .. })
    ));
    assert_eq!(states(&invalidations), vec![InvalidationState::Fresh]);
    assert!(control_plane.requests().is_empty());
}

#[tokio::test]
async fn test_unanswered_request_times_out() {
    // Connections complete in the backlog but nothing ever reads them
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let purger = purger(PurgerSettings {
        timeout: 0.3,
        ..settings_for(listener.local_addr().unwrap())
    });
    let mut invalidations = batch(InvalidationKind::Tag, &["node:1"]);

    let (logs, _guard) = capture_logs();
    purger
        .invalidate(InvalidationKind::Tag, &mut invalidations)
        .await
        .unwrap();

    assert_eq!(states(&invalidations), vec![InvalidationState::Failed]);
    let logs = logs.contents();
    assert!(logs.contains("Request timed out"));
    assert!(logs.contains("data: {"));
    assert!(!logs.contains("http request for"));
    drop(listener);
}

#[tokio::test]
async fn test_connect_timeout_is_connection_failure() {
    // Non-routable address, the handshake never completes
    let purger = purger(PurgerSettings {
        scheme: "http".to_string(),
        hostname: "10.255.255.1".to_string(),
        port: 81,
        connect_timeout: 0.2,
        ..PurgerSettings::new(common::PURGER_ID)
    });
    let mut invalidations = batch(InvalidationKind::Tag, &["node:1"]);

    let (logs, _guard) = capture_logs();
    purger
        .invalidate(InvalidationKind::Tag, &mut invalidations)
        .await
        .unwrap();

    assert_eq!(states(&invalidations), vec![InvalidationState::Failed]);
    let logs = logs.contents();
    assert!(logs.contains("http request for http://10.255.255.1:81/api/v1"));
    assert!(!logs.contains("data: {"));
}

#[tokio::test]
async fn test_hints() {
    let control_plane = ControlPlane::start(StatusCode::OK).await;
    let purger = purger(PurgerSettings {
        name: "Edge".to_string(),
        runtime_measurement: false,
        timeout: 0.5,
        connect_timeout: 1.5,
        cooldown_time: 2.5,
        max_requests: 10,
        ..control_plane.settings()
    });

    assert_eq!(purger.label().unwrap(), "Edge");
    assert_eq!(purger.time_hint().unwrap(), 2.0);
    assert_eq!(purger.cooldown_time().unwrap(), 2.5);
    assert_eq!(purger.capacity_hint().unwrap(), 10);
    assert!(!purger.has_runtime_measurement().unwrap());
    assert_eq!(purger.supported_kinds().len(), 9);
}

#[tokio::test]
async fn test_runtime_measurement_replaces_static_hint() {
    let control_plane = ControlPlane::start(StatusCode::OK).await;
    let purger = purger(control_plane.settings());
    assert_eq!(purger.time_hint().unwrap(), 2.0);

    let mut invalidations = batch(InvalidationKind::Tag, &["node:1", "node:2"]);
    purger
        .invalidate(InvalidationKind::Tag, &mut invalidations)
        .await
        .unwrap();

    let hint = purger.time_hint().unwrap();
    assert!(hint < 2.0);
    assert!(hint >= 0.1);
}

#[tokio::test]
async fn test_delete_removes_settings() {
    let control_plane = ControlPlane::start(StatusCode::OK).await;
    let (purger, provider) = purger_with(control_plane.settings(), secrets());

    assert!(purger.delete().is_some());
    assert!(provider.ids().is_empty());
    assert!(matches!(
        purger.cooldown_time(),
        Err(PurgeError::Config(ConfigError::MissingSettings(id))) if id == "section"
    ));
}
