//! End-to-end tests over HTTP
//!
//! A real axum store on a local port, reached through `HttpStore`.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use reqwest::Client;
use serde::Deserialize;
use tokio::net::TcpListener;

use rangeseal_core::wire::{FindRequest, InsertRequest};
use rangeseal_core::{Dimension, Field, Record, RemoteError, RemoteStore, Token};
use rangeseal_owner::{HttpStore, Owner, OwnerConfig, OwnerError, Searcher};
use rangeseal_store::routes::create_router;
use rangeseal_store::state::{create_shared_state, SharedState};

static PORT_COUNTER: AtomicU16 = AtomicU16::new(19400);

fn next_port() -> u16 {
    PORT_COUNTER.fetch_add(1, Ordering::SeqCst)
}

fn t0() -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000, 0).unwrap()
}

#[derive(Deserialize)]
struct HealthBody {
    status: String,
    store: HealthStats,
}

#[derive(Deserialize)]
struct HealthStats {
    documents: usize,
    index_entries: usize,
}

/// Test harness running the store server on a local port
struct TestHarness {
    server_url: String,
    state: SharedState,
    http: Client,
    _shutdown: tokio::sync::oneshot::Sender<()>,
}

impl TestHarness {
    async fn new() -> Self {
        let state = create_shared_state();
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
        let port = next_port();
        let addr: SocketAddr = ([127, 0, 0, 1], port).into();
        let server_url = format!("http://127.0.0.1:{}", port);

        let router = create_router(state.clone(), None);
        let listener = TcpListener::bind(addr).await.expect("Bind should succeed");

        tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .ok();
        });

        for _ in 0..20 {
            if Client::new()
                .get(format!("{}/health", server_url))
                .send()
                .await
                .is_ok()
            {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        Self {
            server_url,
            state,
            http: Client::new(),
            _shutdown: shutdown_tx,
        }
    }

    async fn health(&self) -> reqwest::Result<HealthBody> {
        self.http
            .get(format!("{}/health", self.server_url))
            .send()
            .await?
            .json()
            .await
    }

    fn owner(&self, dir: &std::path::Path) -> Owner<HttpStore> {
        let config = OwnerConfig::new(dir, vec!["grpA".into(), "grpB".into()])
            .with_server_addr(&self.server_url);
        Owner::open(config).expect("owner should open")
    }
}

#[tokio::test]
async fn test_health() {
    let harness = TestHarness::new().await;
    let health = harness.health().await.unwrap();
    assert_eq!(health.status, "ready");
    assert_eq!(health.store.documents, 0);
    assert_eq!(health.store.index_entries, 0);
}

#[tokio::test]
async fn test_insert_and_find_over_http() {
    let harness = TestHarness::new().await;
    let dir = tempfile::tempdir().unwrap();
    let owner = harness.owner(dir.path());

    owner
        .insert(&[
            Record::new("u1", "loc1", "grpA", t0()),
            Record::new("u2", "loc2", "grpA", t0()),
        ])
        .await
        .unwrap();

    let health = harness.health().await.unwrap();
    assert_eq!(health.store.documents, 2);
    assert_eq!(health.store.index_entries, 256);

    let hits = owner
        .find_user_ids_and_sets(
            "grpA",
            Dimension::B,
            "loc1",
            t0() - chrono::Duration::seconds(1),
            t0() + chrono::Duration::seconds(1),
        )
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    let record = hits[0].as_ref().unwrap();
    assert_eq!(record.user_id(), Some("u1"));
    assert_eq!(record.set(), Some("grpA"));

    let hits = owner
        .find_user_ids(
            "grpA",
            Dimension::B,
            "loc1",
            t0() + chrono::Duration::seconds(100),
            t0() + chrono::Duration::seconds(200),
        )
        .await
        .unwrap();
    assert!(hits.is_empty());
}

#[tokio::test]
async fn test_large_batch_over_http() {
    let harness = TestHarness::new().await;
    let dir = tempfile::tempdir().unwrap();
    let owner = harness.owner(dir.path());

    let records: Vec<Record> = (0..200)
        .map(|i| {
            Record::new(
                format!("u{}", i),
                "loc1",
                "grpA",
                t0() + chrono::Duration::seconds(i),
            )
        })
        .collect();
    assert_eq!(owner.insert(&records).await.unwrap().len(), 200);

    let health = harness.health().await.unwrap();
    assert_eq!(health.store.documents, 200);
    assert_eq!(health.store.index_entries, 200 * 128);

    let hits = owner
        .find_user_ids(
            "grpA",
            Dimension::B,
            "loc1",
            t0(),
            t0() + chrono::Duration::seconds(199),
        )
        .await
        .unwrap();
    assert_eq!(hits.len(), 200);
    assert!(hits.iter().all(|hit| hit.is_ok()));
}

#[tokio::test]
async fn test_searcher_config_over_http() {
    let harness = TestHarness::new().await;
    let dir = tempfile::tempdir().unwrap();
    let owner = harness.owner(dir.path());

    owner
        .insert(&[
            Record::new("u1", "loc1", "grpA", t0()),
            Record::new("u2", "loc1", "grpB", t0()),
        ])
        .await
        .unwrap();

    let path = dir.path().join("searcher.json");
    owner.export_searcher_config("grpB").unwrap().save(&path).unwrap();
    let config = rangeseal_owner::SearcherConfig::load(&path).unwrap();
    let searcher = Searcher::open(config).unwrap();

    let hits = searcher
        .find_user_ids(Dimension::B, "loc1", t0(), t0())
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].as_ref().unwrap().user_id(), Some("u2"));
}

#[tokio::test]
async fn test_rejection_carries_status_message() {
    let harness = TestHarness::new().await;
    let store = HttpStore::new(&harness.server_url);

    let err = store
        .insert(InsertRequest {
            documents: vec![],
            tokens: vec![Token(vec![0xde, 0xad])],
        })
        .await
        .unwrap_err();
    match err {
        RemoteError::Status(message) => assert!(message.starts_with("Invalid token")),
        other => panic!("unexpected error: {:?}", other),
    }

    let err = store
        .find(FindRequest {
            fields: vec![Field::UserId],
            tokens: vec![Token(vec![0x01])],
        })
        .await
        .unwrap_err();
    assert!(matches!(err, RemoteError::Status(_)));
    assert_eq!(harness.state.read().await.stats().index_entries, 0);
}

#[tokio::test]
async fn test_unreachable_store_is_remote_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = OwnerConfig::new(dir.path(), vec!["grpA".into()])
        .with_server_addr(format!("http://127.0.0.1:{}", next_port()));
    let owner = Owner::open(config).unwrap();

    let err = owner
        .insert(&[Record::new("u1", "loc1", "grpA", t0())])
        .await
        .unwrap_err();
    assert!(matches!(err, OwnerError::Remote(RemoteError::Transport(_))));

    // nothing was committed, so the query needs no round trip at all
    let hits = owner
        .find_user_ids("grpA", Dimension::B, "loc1", t0(), t0())
        .await
        .unwrap();
    assert!(hits.is_empty());
}
