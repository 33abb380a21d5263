use super::*;
use std::sync::Arc;
use std::time::Duration;

const DOC: &str = r#"{"services": [
    {"path": "/api", "url": "http://api.internal:8080"},
    {"path": "/api/v1/auth/", "url": "http://auth.internal:8081/", "auth_protection": true},
    {"path": "/svc", "url": "https://svc.internal", "csrf_protection": true, "rbac_protection": true}
]}"#;

#[test]
fn test_longest_prefix_wins() {
    let table = RouteTable::from_document(DOC, 1).unwrap();

    let entry = table.match_path("/api/v1/auth/login").unwrap();
    assert_eq!(entry.path_prefix, "/api/v1/auth");
    assert!(entry.require_auth);

    assert_eq!(table.match_path("/api/v2/items").unwrap().path_prefix, "/api");
    assert_eq!(table.match_path("/api").unwrap().path_prefix, "/api");
}

#[test]
fn test_match_is_segment_aware() {
    let table = RouteTable::from_document(DOC, 1).unwrap();
    assert!(table.match_path("/svcx/items").is_none());
    assert!(table.match_path("/apis").is_none());
    assert!(table.match_path("/other").is_none());
    assert_eq!(table.match_path("/svc/items").unwrap().path_prefix, "/svc");
}

#[test]
fn test_root_prefix_is_catch_all() {
    let table = RouteTable::from_document(
        r#"[{"path": "/", "url": "http://fallback"}, {"path": "/svc", "url": "http://svc"}]"#,
        1,
    )
    .unwrap();
    assert_eq!(table.match_path("/anything/else").unwrap().path_prefix, "/");
    assert_eq!(table.match_path("/svc/a").unwrap().path_prefix, "/svc");
}

#[test]
fn test_flags_default() {
    let table = RouteTable::from_document(r#"[{"path": "/a", "url": "http://a"}]"#, 1).unwrap();
    let entry = &table.entries()[0];
    assert!(!entry.require_auth && !entry.require_csrf && !entry.require_session && !entry.require_rbac);
    assert!(entry.last_health_status);
}

#[test]
fn test_duplicate_normalized_prefix_rejected() {
    let doc = r#"[{"path": "/svc", "url": "http://a"}, {"path": "/svc/", "url": "http://b"}]"#;
    assert!(matches!(
        RouteTable::from_document(doc, 1),
        Err(ConfigError::DuplicatePrefix(p)) if p == "/svc"
    ));
}

#[test]
fn test_invalid_entries_rejected() {
    let cases = [
        r#"[{"path": "svc", "url": "http://a"}]"#,
        r#"[{"path": "", "url": "http://a"}]"#,
        r#"[{"path": "/svc", "url": "ftp://a"}]"#,
        r#"[{"path": "/svc", "url": "not a url"}]"#,
        r#"[{"url": "http://a"}]"#,
        r#"{"routes": []}"#,
    ];
    for doc in cases {
        assert!(RouteTable::from_document(doc, 1).is_err(), "{doc}");
    }
}

#[test]
fn test_upstream_url_strips_prefix() {
    let table = RouteTable::from_document(DOC, 1).unwrap();
    let entry = table.match_path("/api/v1/auth/login").unwrap();
    assert_eq!(
        entry.upstream_url("/api/v1/auth/login", Some("next=%2F")),
        "http://auth.internal:8081/login?next=%2F"
    );
    let entry = table.match_path("/svc").unwrap();
    assert_eq!(entry.upstream_url("/svc", None), "https://svc.internal");
}

#[test]
fn test_invalid_reload_keeps_previous_table() {
    let handle = RouteTableHandle::new(RouteTable::from_document(DOC, 1).unwrap());
    let before = handle.match_path("/svc/items");

    let result = handle.reload_from_str(r#"[{"path": "/svc", "url": "nope"}]"#);
    assert!(result.is_err());

    assert_eq!(handle.version(), 1);
    assert_eq!(handle.match_path("/svc/items"), before);
    assert_eq!(handle.stats().rejected_reloads, 1);
}

#[test]
fn test_valid_reload_swaps_and_bumps_version() {
    let handle = RouteTableHandle::new(RouteTable::from_document(DOC, 1).unwrap());
    let old_snapshot = handle.current();

    let version = handle
        .reload_from_str(r#"[{"path": "/svc", "url": "http://moved:9000"}]"#)
        .unwrap();
    assert_eq!(version, 2);
    assert_eq!(handle.match_path("/svc/a").unwrap().upstream_base_url, "http://moved:9000");
    assert!(handle.match_path("/api/x").is_none());

    // Snapshots taken before the swap are untouched.
    assert_eq!(old_snapshot.version(), 1);
    assert!(old_snapshot.match_path("/api/x").is_some());

    // Same routes again: no new version.
    let again = handle
        .reload_from_str(r#"{"services": [{"path": "/svc", "url": "http://moved:9000"}]}"#)
        .unwrap();
    assert_eq!(again, 2);
    assert_eq!(handle.stats().reloads, 1);
}

#[test]
fn test_health_update_skipped_after_reload() {
    let handle = RouteTableHandle::new(RouteTable::from_document(DOC, 1).unwrap());
    let snapshot = handle.current();

    handle
        .reload_from_str(r#"[{"path": "/svc", "url": "http://moved:9000"}]"#)
        .unwrap();
    assert!(!handle.apply_health(snapshot.version(), &[false, false, false]));
    assert!(handle.current().entries()[0].last_health_status);

    assert!(handle.apply_health(2, &[false]));
    assert!(!handle.current().entries()[0].last_health_status);
    assert_eq!(handle.version(), 2);
}

#[tokio::test]
async fn test_save_document_validates_then_writes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, DOC).unwrap();

    let err = save_document(&path, r#"[{"path": "/x", "url": "bad"}]"#).await;
    assert!(err.is_err());
    assert_eq!(std::fs::read_to_string(&path).unwrap(), DOC);

    let entries = save_document(&path, r#"[{"path": "/x/", "url": "http://x"}]"#)
        .await
        .unwrap();
    assert_eq!(entries[0].path_prefix, "/x");
    let written = std::fs::read_to_string(&path).unwrap();
    assert!(RouteTable::from_document(&written, 1).is_ok());
    assert!(!dir.path().join("config.json.tmp").exists());
}

#[tokio::test]
async fn test_watcher_reloads_on_change_and_ignores_invalid() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, DOC).unwrap();

    let handle = Arc::new(RouteTableHandle::load_file(&path).unwrap());
    let watcher = RouteWatcher::spawn(handle.clone(), &path).unwrap();

    std::fs::write(&path, "{ not json").unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(handle.version(), 1);

    std::fs::write(&path, r#"[{"path": "/new", "url": "http://new"}]"#).unwrap();
    let mut reloaded = false;
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        if handle.match_path("/new/a").is_some() {
            reloaded = true;
            break;
        }
    }
    assert!(reloaded, "watcher should pick up the valid document");
    assert!(handle.version() >= 2);

    watcher.stop().await;
}

#[tokio::test]
async fn test_watcher_reload_survives_burst_of_unrelated_files() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, DOC).unwrap();

    let handle = Arc::new(RouteTableHandle::load_file(&path).unwrap());
    let watcher = RouteWatcher::spawn(handle.clone(), &path).unwrap();

    for i in 0..200 {
        std::fs::write(dir.path().join(format!("other-{i}.txt")), "noise").unwrap();
    }
    std::fs::write(&path, r#"[{"path": "/late", "url": "http://late"}]"#).unwrap();

    let mut reloaded = false;
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        if handle.match_path("/late/a").is_some() {
            reloaded = true;
            break;
        }
    }
    assert!(reloaded, "config change behind unrelated events must not be lost");

    watcher.stop().await;
}

#[test]
fn test_dot_segments_detected_in_any_encoding() {
    for path in [
        "/api/../items",
        "/api/./items",
        "/api/..",
        "/api/%2e%2e/items",
        "/api/%2E./items",
        "/api/..%2fitems",
        "/api\\..\\items",
        "/api/..%5Citems",
    ] {
        assert!(has_dot_segment(path), "{path}");
    }
    for path in ["/api/items", "/api/v1.2/items", "/api/...", "/api/.well-known/x", "/"] {
        assert!(!has_dot_segment(path), "{path}");
    }
}
