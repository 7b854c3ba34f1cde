// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::{
    collections::HashMap,
    path::Path,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use axum::{
    Router,
    body::{Body, Bytes},
    extract::{Path as UrlPath, State},
    http::{HeaderMap, StatusCode, header},
    response::Response,
    routing::get,
};
use axum_test::TestServer;
use imgcache::{
    AuthHeaderProvider, CacheError, ContentKey, DEFAULT_INDEX_KEY, ImageCache, ImageCacheConfig,
    KvStore, MemoryKvStore, NoAuth, StaticHeaders,
};
use imgcache_common_telemetry::init_default_ut_logging;
use imgcache_store::{DBStore, DatabaseConfig};
use tempfile::TempDir;
use tokio::sync::{Mutex, Notify, oneshot};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::{
    Registry,
    layer::{Context, Layer, SubscriberExt},
};

#[derive(Clone)]
struct Asset {
    status:       StatusCode,
    content_type: Option<&'static str>,
    body:         &'static [u8],
}

#[derive(Clone)]
struct GetHooks {
    started: Arc<Mutex<Option<oneshot::Sender<()>>>>,
    release: Arc<Notify>,
}

#[derive(Clone, Default)]
struct AppState {
    assets:    Arc<HashMap<&'static str, Asset>>,
    hits:      Arc<AtomicUsize>,
    last_auth: Arc<Mutex<Option<String>>>,
    hooks:     Option<GetHooks>,
}

const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\nnot-really-a-png";
const WEBP_BYTES: &[u8] = b"RIFF....WEBPVP8 payload";
const RAW_BYTES: &[u8] = b"opaque image bytes";

fn default_assets() -> HashMap<&'static str, Asset> {
    HashMap::from([
        ("img1.png", Asset {
            status:       StatusCode::OK,
            content_type: Some("image/png"),
            body:         PNG_BYTES,
        }),
        ("banner.webp", Asset {
            status:       StatusCode::OK,
            content_type: Some("image/webp"),
            body:         WEBP_BYTES,
        }),
        ("untyped", Asset {
            status:       StatusCode::OK,
            content_type: None,
            body:         RAW_BYTES,
        }),
        ("broken.png", Asset {
            status:       StatusCode::INTERNAL_SERVER_ERROR,
            content_type: Some("image/png"),
            body:         b"oops",
        }),
    ])
}

async fn handle_get(
    UrlPath(name): UrlPath<String>,
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Response {
    state.hits.fetch_add(1, Ordering::SeqCst);
    *state.last_auth.lock().await = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned);

    if let Some(hooks) = state.hooks.as_ref() {
        let mut sender = hooks.started.lock().await;
        if let Some(tx) = sender.take() {
            let _ = tx.send(());
        }
        drop(sender);
        hooks.release.notified().await;
    }

    let Some(asset) = state.assets.get(name.as_str()) else {
        return Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Body::empty())
            .unwrap();
    };

    // Built by hand so no content type is added implicitly.
    let mut builder = Response::builder().status(asset.status);
    if let Some(content_type) = asset.content_type {
        builder = builder.header(header::CONTENT_TYPE, content_type);
    }
    builder.body(Body::from(asset.body)).unwrap()
}

fn create_temp_dir(prefix: &str) -> TempDir {
    tempfile::Builder::new()
        .prefix(&format!("imgcache-{prefix}-"))
        .tempdir()
        .expect("failed to create temp dir")
}

/// Declares a PNG, sends one chunk, then aborts the connection.
async fn handle_truncated(State(state): State<AppState>) -> Response {
    state.hits.fetch_add(1, Ordering::SeqCst);
    let chunks = futures::stream::iter([
        Ok(Bytes::from_static(PNG_BYTES)),
        Err(std::io::Error::other("connection reset mid-body")),
    ]);

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "image/png")
        .body(Body::from_stream(chunks))
        .unwrap()
}

fn create_test_server(state: AppState) -> TestServer {
    let app = Router::new()
        .route("/img/{name}", get(handle_get))
        .route("/cut/{name}", get(handle_truncated))
        .with_state(state);

    TestServer::builder()
        .http_transport()
        .try_build(app)
        .expect("failed to create test server")
}

fn image_url(server: &TestServer, name: &str) -> String {
    let base = server
        .server_address()
        .expect("server should have HTTP address")
        .to_string();
    format!("{}/img/{name}", base.trim_end_matches('/'))
}

fn create_cache(
    cache_dir: &TempDir,
    store: Arc<dyn KvStore>,
    auth: Arc<dyn AuthHeaderProvider>,
) -> ImageCache {
    let config = ImageCacheConfig::builder()
        .cache_dir(cache_dir.path().join("images"))
        .build();
    ImageCache::new(config, store, auth).expect("failed to create cache")
}

struct Fixture {
    server: TestServer,
    state:  AppState,
    dir:    TempDir,
    store:  Arc<MemoryKvStore>,
    cache:  ImageCache,
}

fn fixture() -> Fixture { fixture_with(None) }

fn fixture_with(hooks: Option<GetHooks>) -> Fixture {
    init_default_ut_logging();

    let state = AppState {
        assets: Arc::new(default_assets()),
        hooks,
        ..AppState::default()
    };
    let server = create_test_server(state.clone());
    let dir = create_temp_dir("cache");
    let store = Arc::new(MemoryKvStore::new());
    let cache = create_cache(&dir, store.clone(), Arc::new(NoAuth));

    Fixture {
        server,
        state,
        dir,
        store,
        cache,
    }
}

impl Fixture {
    fn url(&self, name: &str) -> String { image_url(&self.server, name) }

    fn truncated_url(&self, name: &str) -> String {
        image_url(&self.server, name).replacen("/img/", "/cut/", 1)
    }

    fn hits(&self) -> usize { self.state.hits.load(Ordering::SeqCst) }
}

/// Names of every file in `dir` whose stem is `key`.
fn files_for_key(dir: &Path, key: &ContentKey) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    entries
        .filter_map(|entry| entry.ok()?.file_name().into_string().ok())
        .filter(|name| name.starts_with(key.as_str()))
        .collect()
}

#[tokio::test]
async fn png_download_is_published_and_indexed() {
    let fx = fixture();
    let url = fx.url("img1.png");
    let key = ContentKey::derive(&url);

    let path = fx.cache.ensure_cached(&url).await.unwrap();

    assert_eq!(path, fx.cache.cache_dir().join(format!("{key}.png")));
    assert_eq!(tokio::fs::read(&path).await.unwrap(), PNG_BYTES);
    assert!(!fx.cache.cache_dir().join(format!("{key}.tmp")).exists());

    // The persisted blob is keyed by the content key.
    let blob = fx.store.get(DEFAULT_INDEX_KEY).await.unwrap().unwrap();
    let persisted: serde_json::Value = serde_json::from_str(&blob).unwrap();
    let entry = &persisted[key.as_str()];
    assert_eq!(entry["remote_locator"], url.as_str());
    assert!(entry["local_path"].as_str().unwrap().ends_with(".png"));
    assert!(entry["created_at"].as_i64().unwrap() > 0);
}

#[tokio::test]
async fn extension_follows_content_type() {
    let fx = fixture();

    let webp = fx.cache.ensure_cached(&fx.url("banner.webp")).await.unwrap();
    assert_eq!(webp.extension().unwrap(), "webp");

    let untyped = fx.cache.ensure_cached(&fx.url("untyped")).await.unwrap();
    assert_eq!(untyped.extension().unwrap(), "jpg");
    assert_eq!(tokio::fs::read(&untyped).await.unwrap(), RAW_BYTES);
}

#[tokio::test]
async fn cached_path_is_served_without_network() {
    let fx = fixture();
    let url = fx.url("img1.png");

    assert_eq!(fx.cache.local_path_if_cached(&url).await.unwrap(), None);
    assert_eq!(fx.hits(), 0);

    let path = fx.cache.ensure_cached(&url).await.unwrap();
    assert_eq!(
        fx.cache.local_path_if_cached(&url).await.unwrap(),
        Some(path.clone())
    );

    let again = fx.cache.ensure_cached(&url).await.unwrap();
    assert_eq!(again, path);
    assert_eq!(fx.hits(), 1);
}

#[tokio::test]
async fn deleted_file_is_a_miss_and_gets_redownloaded() {
    let fx = fixture();
    let url = fx.url("img1.png");

    let path = fx.cache.ensure_cached(&url).await.unwrap();
    tokio::fs::remove_file(&path).await.unwrap();

    assert_eq!(fx.cache.local_path_if_cached(&url).await.unwrap(), None);
    // The dangling entry is left in place by the lookup.
    let entries = fx.cache.entries().await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].local_path, path);

    let republished = fx.cache.ensure_cached(&url).await.unwrap();
    assert_eq!(republished, path);
    assert_eq!(tokio::fs::read(&path).await.unwrap(), PNG_BYTES);
    assert_eq!(fx.hits(), 2);
}

#[tokio::test]
async fn http_errors_leave_no_entry_and_no_file() {
    let fx = fixture();

    for (name, status) in [("missing.png", 404), ("broken.png", 500)] {
        let url = fx.url(name);
        let key = ContentKey::derive(&url);

        let err = fx.cache.ensure_cached(&url).await.unwrap_err();
        assert_eq!(err.http_status(), Some(status), "{name}");

        assert_eq!(fx.cache.local_path_if_cached(&url).await.unwrap(), None);
        assert!(files_for_key(fx.cache.cache_dir(), &key).is_empty(), "{name}");
        assert!(!fx.cache.is_fetching(&url));
    }

    assert!(fx.cache.entries().await.unwrap().is_empty());
    assert!(fx.store.get(DEFAULT_INDEX_KEY).await.unwrap().is_none());
}

#[tokio::test]
async fn transport_errors_surface_as_network_errors() {
    let fx = fixture();
    let url = "http://127.0.0.1:1/img/unreachable.png";

    let err = fx.cache.ensure_cached(url).await.unwrap_err();
    assert!(matches!(err.as_ref(), CacheError::Network { .. }), "{err}");
    assert!(files_for_key(fx.cache.cache_dir(), &ContentKey::derive(url)).is_empty());
}

#[tokio::test]
async fn concurrent_fetches_share_one_download() {
    let (tx, rx) = oneshot::channel();
    let hooks = GetHooks {
        started: Arc::new(Mutex::new(Some(tx))),
        release: Arc::new(Notify::new()),
    };
    let fx = fixture_with(Some(hooks.clone()));
    let url = fx.url("img1.png");

    let first = {
        let cache = fx.cache.clone();
        let url = url.clone();
        tokio::spawn(async move { cache.ensure_cached(&url).await })
    };
    let _ = rx.await;
    assert!(fx.cache.is_fetching(&url));

    let second = {
        let cache = fx.cache.clone();
        let url = url.clone();
        tokio::spawn(async move { cache.ensure_cached(&url).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    hooks.release.notify_one();
    let first = first.await.unwrap().unwrap();
    let second = second.await.unwrap().unwrap();

    assert_eq!(first, second);
    assert_eq!(fx.hits(), 1);
    assert!(!fx.cache.is_fetching(&url));
}

#[tokio::test]
async fn warm_all_settles_every_locator() {
    let fx = fixture();
    let good = fx.url("img1.png");
    let bad = fx.url("missing.png");

    let outcomes = fx
        .cache
        .warm_all([good.clone(), String::new(), bad.clone()])
        .await;

    assert_eq!(outcomes.len(), 2);
    assert_eq!(outcomes[0].locator, good);
    assert!(outcomes[0].is_ok());
    assert!(outcomes[0].path().unwrap().exists());
    assert_eq!(outcomes[1].locator, bad);
    assert!(!outcomes[1].is_ok());
    assert_eq!(outcomes[1].error().unwrap().http_status(), Some(404));

    assert!(fx.cache.local_path_if_cached(&good).await.unwrap().is_some());
}

#[tokio::test]
async fn auth_headers_are_sent_verbatim() {
    let fx = fixture();
    let cache = create_cache(
        &fx.dir,
        Arc::new(MemoryKvStore::new()),
        Arc::new(StaticHeaders::bearer("s3cret").unwrap()),
    );

    cache.ensure_cached(&fx.url("img1.png")).await.unwrap();

    assert_eq!(
        fx.state.last_auth.lock().await.as_deref(),
        Some("Bearer s3cret")
    );
}

#[tokio::test]
async fn corrupted_index_is_treated_as_empty() {
    let fx = fixture();
    let store = Arc::new(MemoryKvStore::new());
    store.set(DEFAULT_INDEX_KEY, "[[[").await.unwrap();
    let cache = create_cache(&fx.dir, store.clone(), Arc::new(NoAuth));
    let url = fx.url("img1.png");

    assert_eq!(cache.local_path_if_cached(&url).await.unwrap(), None);
    let path = cache.ensure_cached(&url).await.unwrap();

    assert_eq!(cache.local_path_if_cached(&url).await.unwrap(), Some(path));
    let blob = store.get(DEFAULT_INDEX_KEY).await.unwrap().unwrap();
    assert!(serde_json::from_str::<serde_json::Value>(&blob).is_ok());
}

#[tokio::test]
async fn index_survives_restart_with_sqlite_store() {
    let fx = fixture();
    let url = fx.url("banner.webp");
    let db_config = DatabaseConfig::builder()
        .db_path(fx.dir.path().join("db").join("imgcache.db"))
        .build();

    let path = {
        let db = DBStore::open(&db_config).await.unwrap();
        let cache = create_cache(&fx.dir, Arc::new(db.kv_store()), Arc::new(NoAuth));
        let path = cache.ensure_cached(&url).await.unwrap();
        db.close().await;
        path
    };

    let db = DBStore::open(&db_config).await.unwrap();
    let restarted = create_cache(&fx.dir, Arc::new(db.kv_store()), Arc::new(NoAuth));

    assert_eq!(
        restarted.local_path_if_cached(&url).await.unwrap(),
        Some(path)
    );
    assert_eq!(fx.hits(), 1);
}

#[tokio::test]
async fn prune_dangling_removes_only_missing_files() {
    let fx = fixture();
    let kept = fx.cache.ensure_cached(&fx.url("img1.png")).await.unwrap();
    let dropped = fx.cache.ensure_cached(&fx.url("banner.webp")).await.unwrap();
    tokio::fs::remove_file(&dropped).await.unwrap();

    assert_eq!(fx.cache.prune_dangling().await.unwrap(), 1);
    assert_eq!(fx.cache.prune_dangling().await.unwrap(), 0);

    let entries = fx.cache.entries().await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].local_path, kept);
}

#[tokio::test]
async fn unwritable_temp_path_fails_without_publishing() {
    let fx = fixture();
    let url = fx.url("img1.png");
    let key = ContentKey::derive(&url);
    // A directory squatting on the temp name makes the temp file uncreatable.
    tokio::fs::create_dir_all(fx.cache.cache_dir().join(format!("{key}.tmp")))
        .await
        .unwrap();

    let err = fx.cache.ensure_cached(&url).await.unwrap_err();

    assert!(matches!(err.as_ref(), CacheError::FileSystem { .. }), "{err}");
    assert!(fx.cache.entries().await.unwrap().is_empty());
    assert!(!fx.cache.cache_dir().join(format!("{key}.png")).exists());
    assert!(!fx.cache.is_fetching(&url));
    assert_eq!(fx.cache.local_path_if_cached(&url).await.unwrap(), None);
}

#[tokio::test]
async fn stale_temp_file_is_overwritten() {
    let fx = fixture();
    let url = fx.url("img1.png");
    let key = ContentKey::derive(&url);
    let temp_path = fx.cache.cache_dir().join(format!("{key}.tmp"));
    tokio::fs::create_dir_all(fx.cache.cache_dir()).await.unwrap();
    tokio::fs::write(&temp_path, vec![0xAB; PNG_BYTES.len() * 4])
        .await
        .unwrap();

    let path = fx.cache.ensure_cached(&url).await.unwrap();

    assert_eq!(tokio::fs::read(&path).await.unwrap(), PNG_BYTES);
    assert!(!temp_path.exists());
}

#[tokio::test]
async fn body_cut_short_is_a_network_error() {
    let fx = fixture();
    let url = fx.truncated_url("img1.png");
    let key = ContentKey::derive(&url);

    let err = fx.cache.ensure_cached(&url).await.unwrap_err();

    assert!(matches!(err.as_ref(), CacheError::Network { .. }), "{err}");
    assert!(files_for_key(fx.cache.cache_dir(), &key).is_empty());
    assert!(fx.cache.entries().await.unwrap().is_empty());
    assert!(!fx.cache.is_fetching(&url));
    assert_eq!(fx.hits(), 1);
}

/// Counts ERROR events seen on the thread it is installed on.
#[derive(Clone, Default)]
struct ErrorCounter(Arc<AtomicUsize>);

impl<S: Subscriber> Layer<S> for ErrorCounter {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() == Level::ERROR {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[tokio::test]
async fn failed_fetch_is_not_logged_as_error() {
    let fx = fixture();
    let counter = ErrorCounter::default();
    let _default = tracing::subscriber::set_default(Registry::default().with(counter.clone()));

    let err = fx
        .cache
        .ensure_cached(&fx.url("missing.png"))
        .await
        .unwrap_err();
    let outcomes = fx.cache.warm_all([fx.url("missing.png")]).await;

    assert_eq!(err.http_status(), Some(404));
    assert!(!outcomes[0].is_ok());
    assert_eq!(counter.0.load(Ordering::SeqCst), 0);
}
