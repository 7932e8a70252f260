use imgtier::{
    CacheError, Fetcher, ImageCodec, ImageLoader, JpegCodec, LoadFailure, LoadState, LoaderOptions,
};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

mod common;

/// Replays scripted responses; repeats the last one once the script runs out.
struct ScriptedFetcher {
    script: Mutex<VecDeque<Result<Vec<u8>, String>>>,
    calls: AtomicUsize,
}

impl ScriptedFetcher {
    fn new(script: Vec<Result<Vec<u8>, String>>) -> Arc<Self> {
        Arc::new(Self { script: Mutex::new(script.into()), calls: AtomicUsize::new(0) })
    }
}

impl Fetcher for ScriptedFetcher {
    fn fetch(&self, _url: &str) -> impl Future<Output = Result<Vec<u8>, CacheError>> + Send {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut script = self.script.lock();
        let next = if script.len() > 1 { script.pop_front() } else { script.front().cloned() };
        let result = next.unwrap_or_else(|| Err("empty script".into())).map_err(CacheError::Fetch);
        async move { result }
    }
}

fn jpeg_bytes(w: u32, h: u32) -> Vec<u8> {
    JpegCodec.encode(&common::solid(w, h, 128), 0.9).unwrap()
}

#[tokio::test]
async fn cache_hit_never_fetches() {
    let dir = tempfile::tempdir().unwrap();
    let cache = common::open(dir.path());
    cache.set("https://cdn/x.jpg", common::solid(3, 3, 0));
    let fetcher = ScriptedFetcher::new(vec![Err("offline".into())]);

    let mut loader = ImageLoader::new("https://cdn/x.jpg", cache.clone(), fetcher.clone());
    let state = loader.load().await;
    assert!(matches!(state, LoadState::Loaded(_)));
    assert_eq!(loader.fetch_count(), 0);
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn miss_fetches_decodes_and_populates_cache() {
    let dir = tempfile::tempdir().unwrap();
    let cache = common::open(dir.path());
    let fetcher = ScriptedFetcher::new(vec![Ok(jpeg_bytes(20, 10))]);

    let mut loader = ImageLoader::new("https://cdn/y.jpg", cache.clone(), fetcher);
    assert_eq!(loader.state(), LoadState::Idle);
    let state = loader.load().await;
    let img = state.image().unwrap();
    assert_eq!((img.width(), img.height()), (20, 10));
    assert!(cache.in_memory("https://cdn/y.jpg"));

    // A second loader for the same URL is served from the cache.
    let offline = ScriptedFetcher::new(vec![Err("offline".into())]);
    let mut again = ImageLoader::new("https://cdn/y.jpg", cache.clone(), offline);
    assert!(again.load().await.image().is_some());
    assert_eq!(again.fetch_count(), 0);

    cache.flush().await;
    assert_eq!(common::disk_files(dir.path()).len(), 1);
}

#[tokio::test]
async fn fetch_failure_is_retryable() {
    let dir = tempfile::tempdir().unwrap();
    let cache = common::open(dir.path());
    let fetcher = ScriptedFetcher::new(vec![Err("timeout".into()), Ok(jpeg_bytes(5, 5))]);

    let mut loader = ImageLoader::new("https://cdn/z.jpg", cache.clone(), fetcher);
    let state = loader.load().await;
    match &state {
        LoadState::Failed(LoadFailure::Fetch(msg)) => assert!(msg.contains("timeout")),
        other => panic!("expected fetch failure, got {other:?}"),
    }
    assert!(!cache.in_memory("https://cdn/z.jpg"));

    // load() does not restart a failed loader.
    assert!(loader.load().await.is_failed());
    assert_eq!(loader.fetch_count(), 1);

    assert!(loader.retry().await.image().is_some());
    assert_eq!(loader.fetch_count(), 2);
    assert!(cache.in_memory("https://cdn/z.jpg"));
}

#[tokio::test]
async fn decode_failure_is_reported_and_not_cached() {
    let dir = tempfile::tempdir().unwrap();
    let cache = common::open(dir.path());
    let fetcher = ScriptedFetcher::new(vec![Ok(b"<html>404</html>".to_vec())]);

    let mut loader = ImageLoader::new("https://cdn/bad", cache.clone(), fetcher);
    assert!(matches!(loader.load().await, LoadState::Failed(LoadFailure::Decode(_))));
    cache.flush().await;
    assert!(common::disk_files(dir.path()).is_empty());
    assert!(cache.get("https://cdn/bad").is_none());
}

#[tokio::test]
async fn retry_is_a_no_op_unless_failed() {
    let dir = tempfile::tempdir().unwrap();
    let cache = common::open(dir.path());
    let fetcher = ScriptedFetcher::new(vec![Ok(jpeg_bytes(2, 2))]);
    let mut loader = ImageLoader::new("u", cache, fetcher);

    assert_eq!(loader.retry().await, LoadState::Idle);
    loader.load().await;
    loader.retry().await;
    loader.load().await;
    assert_eq!(loader.fetch_count(), 1);
}

#[tokio::test]
async fn auto_retries_before_failing() {
    let dir = tempfile::tempdir().unwrap();
    let cache = common::open(dir.path());
    let fetcher = ScriptedFetcher::new(vec![
        Err("reset".into()),
        Err("reset".into()),
        Ok(jpeg_bytes(3, 3)),
    ]);
    let opts = LoaderOptions { auto_retries: 2, retry_backoff: Duration::from_millis(1) };
    let mut loader = ImageLoader::with_options("flaky", cache, fetcher, opts);
    assert!(loader.load().await.image().is_some());
    assert_eq!(loader.fetch_count(), 3);
}

#[tokio::test]
async fn subscribers_observe_final_state() {
    let dir = tempfile::tempdir().unwrap();
    let cache = common::open(dir.path());
    let fetcher = ScriptedFetcher::new(vec![Err("dns".into())]);
    let mut loader = ImageLoader::new("https://cdn/w.jpg", cache, fetcher);
    let mut rx = loader.subscribe();
    assert_eq!(*rx.borrow(), LoadState::Idle);

    loader.load().await;
    assert!(rx.has_changed().unwrap());
    assert!(rx.borrow_and_update().is_failed());
}
