//! Per-call-site image loading on top of [`ImageCache`].
//!
//! A loader walks `Idle -> Loading -> Loaded | Failed`. Loading checks the
//! cache first and only fetches on a miss; a successful fetch is decoded and
//! written back through [`ImageCache::set`]. Failures are retryable.
//!
//! Loaders are independent: two loaders for the same URL that both miss will
//! both fetch. `set` is idempotent, so the duplicate costs bandwidth, not
//! correctness.

use crate::cache::ImageCache;
use crate::codec::Image;
use crate::errors::CacheError;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Retrieves raw bytes for a source identifier, normally over the network.
pub trait Fetcher: Send + Sync + 'static {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<Vec<u8>, CacheError>> + Send;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoadFailure {
    Fetch(String),
    Decode(String),
}

impl LoadFailure {
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            LoadFailure::Fetch(m) | LoadFailure::Decode(m) => m,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum LoadState {
    Idle,
    Loading,
    Loaded(Image),
    Failed(LoadFailure),
}

impl LoadState {
    #[must_use]
    pub fn image(&self) -> Option<&Image> {
        match self {
            LoadState::Loaded(img) => Some(img),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self, LoadState::Failed(_))
    }
}

#[derive(Clone, Copy, Debug)]
pub struct LoaderOptions {
    /// Extra fetch attempts before settling in `Failed`.
    pub auto_retries: u32,
    pub retry_backoff: Duration,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self { auto_retries: 0, retry_backoff: Duration::from_millis(250) }
    }
}

pub struct ImageLoader<F: Fetcher> {
    url: String,
    cache: ImageCache,
    fetcher: Arc<F>,
    options: LoaderOptions,
    state: watch::Sender<LoadState>,
    fetches: u32,
}

impl<F: Fetcher> ImageLoader<F> {
    pub fn new(url: impl Into<String>, cache: ImageCache, fetcher: Arc<F>) -> Self {
        Self::with_options(url, cache, fetcher, LoaderOptions::default())
    }

    pub fn with_options(
        url: impl Into<String>,
        cache: ImageCache,
        fetcher: Arc<F>,
        options: LoaderOptions,
    ) -> Self {
        let (state, _) = watch::channel(LoadState::Idle);
        Self { url: url.into(), cache, fetcher, options, state, fetches: 0 }
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    #[must_use]
    pub fn state(&self) -> LoadState {
        self.state.borrow().clone()
    }

    /// Observe state transitions.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<LoadState> {
        self.state.subscribe()
    }

    /// Network fetches performed by this loader so far.
    #[must_use]
    pub fn fetch_count(&self) -> u32 {
        self.fetches
    }

    /// Start loading from `Idle`. In any other state the current state is
    /// returned unchanged; use [`retry`](Self::retry) after a failure.
    pub async fn load(&mut self) -> LoadState {
        if !matches!(*self.state.borrow(), LoadState::Idle) {
            return self.state();
        }
        self.run().await
    }

    /// Re-enter `Loading` after a failure. No-op in any other state.
    pub async fn retry(&mut self) -> LoadState {
        if !self.state.borrow().is_failed() {
            return self.state();
        }
        log::debug!(target: "imgtier::loader", "retrying {}", self.url);
        self.run().await
    }

    async fn run(&mut self) -> LoadState {
        self.state.send_replace(LoadState::Loading);

        if let Some(img) = self.cache.get_async(&self.url).await {
            return self.settle(LoadState::Loaded(img));
        }

        let mut attempt = 0;
        let outcome = loop {
            let failure = match self.fetch_once().await {
                Ok(img) => break LoadState::Loaded(img),
                Err(f) => f,
            };
            if attempt >= self.options.auto_retries {
                break LoadState::Failed(failure);
            }
            attempt += 1;
            log::debug!(
                target: "imgtier::loader",
                "{} failed ({}); attempt {} of {}",
                self.url,
                failure.message(),
                attempt,
                self.options.auto_retries
            );
            tokio::time::sleep(self.options.retry_backoff).await;
        };
        self.settle(outcome)
    }

    async fn fetch_once(&mut self) -> Result<Image, LoadFailure> {
        self.fetches += 1;
        let bytes = self
            .fetcher
            .fetch(&self.url)
            .await
            .map_err(|e| LoadFailure::Fetch(e.to_string()))?;
        let img = self.cache.codec().decode(&bytes).map_err(|e| LoadFailure::Decode(e.to_string()))?;
        self.cache.set(&self.url, img.clone());
        Ok(img)
    }

    fn settle(&self, outcome: LoadState) -> LoadState {
        if let LoadState::Failed(f) = &outcome {
            log::warn!(target: "imgtier::loader", "loading {} failed: {}", self.url, f.message());
        }
        self.state.send_replace(outcome.clone());
        outcome
    }
}
