//! Media engine capability and its process-wide loader.
//!
//! The engine is treated as a black box: it is loaded once, then used to
//! write a named input file, execute a command list, and read a named
//! output file while reporting progress. [`EngineLoader`] makes sure only
//! one load sequence ever runs for a loader, even with concurrent callers.

use async_trait::async_trait;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

pub mod ffmpeg;
pub mod progress;

#[cfg(test)]
pub(crate) mod testing;

pub use ffmpeg::FfmpegEngine;
pub use progress::ProgressTracker;

use crate::error::{EngineError, EngineLoadError};

/// Observer for fractional progress in `[0, 1]`
pub type ProgressCallback = Arc<dyn Fn(f64) + Send + Sync>;

/// The three fixed locators an engine is loaded from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineResources {
    /// Engine core (the ffmpeg executable)
    pub core: PathBuf,

    /// Media prober used for duration lookups (the ffprobe executable)
    pub probe: PathBuf,

    /// Directory the engine's private workspace is created under.
    /// Falls back to the system temp dir.
    pub scratch_dir: Option<PathBuf>,
}

impl Default for EngineResources {
    fn default() -> Self {
        Self {
            core: PathBuf::from("ffmpeg"),
            probe: PathBuf::from("ffprobe"),
            scratch_dir: None,
        }
    }
}

/// A media engine working on named files in its own namespace
#[async_trait]
pub trait MediaEngine: Send + Sync {
    /// Whether `load` has completed for this instance
    fn is_loaded(&self) -> bool;

    /// Fetch and initialize the engine from its resources
    async fn load(&self, resources: &EngineResources) -> Result<(), EngineLoadError>;

    /// Write `data` into the engine namespace under `name`
    async fn write_file(&self, name: &str, data: &[u8]) -> Result<(), EngineError>;

    /// Execute a command list against the engine namespace
    async fn exec(&self, args: &[String]) -> Result<(), EngineError>;

    /// Read the file stored under `name`
    async fn read_file(&self, name: &str) -> Result<Vec<u8>, EngineError>;

    /// Install the progress observer, replacing any previous one
    fn on_progress(&self, callback: ProgressCallback);
}

/// Shared reference to a loaded engine.
///
/// Only [`EngineLoader`] creates handles; callers borrow the engine through
/// `Deref` and never own it.
#[derive(Clone)]
pub struct EngineHandle {
    engine: Arc<dyn MediaEngine>,
}

impl EngineHandle {
    pub fn loaded(&self) -> bool {
        self.engine.is_loaded()
    }

    /// True when both handles point at the same engine instance
    pub fn same_engine(&self, other: &EngineHandle) -> bool {
        Arc::ptr_eq(&self.engine, &other.engine)
    }
}

impl std::ops::Deref for EngineHandle {
    type Target = dyn MediaEngine;

    fn deref(&self) -> &Self::Target {
        self.engine.as_ref()
    }
}

impl std::fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineHandle")
            .field("loaded", &self.loaded())
            .finish()
    }
}

type EngineFactory = Arc<dyn Fn() -> Arc<dyn MediaEngine> + Send + Sync>;
type PendingLoad = Shared<BoxFuture<'static, Result<EngineHandle, EngineLoadError>>>;

enum Slot {
    Empty,
    Loading(PendingLoad),
    Ready(EngineHandle),
}

/// Lazily loads a single engine instance and hands out handles to it.
///
/// The first caller installs a shared pending load; callers arriving while
/// it runs await that same load instead of starting another. A failed load
/// is reported to every waiter and leaves the loader empty so the next call
/// can try again.
pub struct EngineLoader {
    resources: EngineResources,
    factory: EngineFactory,
    slot: Mutex<Slot>,
    loads: Arc<AtomicUsize>,
}

impl EngineLoader {
    /// Create a loader that builds engines with `factory`
    pub fn new<F>(resources: EngineResources, factory: F) -> Self
    where
        F: Fn() -> Arc<dyn MediaEngine> + Send + Sync + 'static,
    {
        Self {
            resources,
            factory: Arc::new(factory),
            slot: Mutex::new(Slot::Empty),
            loads: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Create a loader backed by [`FfmpegEngine`]
    pub fn ffmpeg(resources: EngineResources) -> Self {
        Self::new(resources, || Arc::new(FfmpegEngine::new()))
    }

    pub fn resources(&self) -> &EngineResources {
        &self.resources
    }

    /// Number of load sequences started so far
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    /// Whether a handle is already cached
    pub fn is_ready(&self) -> bool {
        matches!(&*self.lock_slot(), Slot::Ready(_))
    }

    /// Return the engine, loading it first if no handle exists yet
    pub async fn acquire(&self) -> Result<EngineHandle, EngineLoadError> {
        let pending = {
            let mut slot = self.lock_slot();
            match &*slot {
                Slot::Ready(handle) => return Ok(handle.clone()),
                Slot::Loading(pending) => {
                    tracing::debug!("Waiting for in-flight engine load");
                    pending.clone()
                }
                Slot::Empty => {
                    let pending = self.start_load();
                    *slot = Slot::Loading(pending.clone());
                    pending
                }
            }
        };

        let result = pending.clone().await;

        // Every waiter resolves the slot; only the first one for this load changes it.
        let mut slot = self.lock_slot();
        if let Slot::Loading(current) = &*slot {
            if current.ptr_eq(&pending) {
                *slot = match &result {
                    Ok(handle) => Slot::Ready(handle.clone()),
                    Err(e) => {
                        tracing::warn!("Media engine load failed: {}", e);
                        Slot::Empty
                    }
                };
            }
        }

        result
    }

    fn start_load(&self) -> PendingLoad {
        let factory = Arc::clone(&self.factory);
        let resources = self.resources.clone();
        let loads = Arc::clone(&self.loads);

        async move {
            let engine = factory();
            if !engine.is_loaded() {
                let attempt = loads.fetch_add(1, Ordering::SeqCst) + 1;
                tracing::info!(
                    attempt,
                    core = %resources.core.display(),
                    "Loading media engine"
                );
                engine.load(&resources).await?;
            }
            Ok::<_, EngineLoadError>(EngineHandle { engine })
        }
        .boxed()
        .shared()
    }

    fn lock_slot(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

static GLOBAL_RESOURCES: OnceLock<EngineResources> = OnceLock::new();
static GLOBAL_LOADER: OnceLock<Arc<EngineLoader>> = OnceLock::new();

/// Record the locators used by the process-wide loader.
///
/// Only the first call before the loader is first used takes effect;
/// returns `false` when the resources were already fixed.
pub fn configure_global(resources: EngineResources) -> bool {
    if GLOBAL_LOADER.get().is_some() {
        return false;
    }
    GLOBAL_RESOURCES.set(resources).is_ok()
}

/// The process-wide ffmpeg-backed loader
pub fn global_loader() -> Arc<EngineLoader> {
    let loader = GLOBAL_LOADER.get_or_init(|| {
        let resources = GLOBAL_RESOURCES.get().cloned().unwrap_or_default();
        Arc::new(EngineLoader::ffmpeg(resources))
    });
    Arc::clone(loader)
}

/// Acquire the process-wide engine
pub async fn acquire_engine() -> Result<EngineHandle, EngineLoadError> {
    global_loader().acquire().await
}

#[cfg(test)]
mod tests {
    use super::testing::{counting_loader, MemoryEngine};
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn repeated_acquire_loads_once() {
        let (loader, created) = counting_loader(MemoryEngine::new);

        let first = assert_ok!(loader.acquire().await);
        let second = assert_ok!(loader.acquire().await);
        let third = assert_ok!(loader.acquire().await);

        assert!(first.loaded() && second.loaded() && third.loaded());
        assert!(first.same_engine(&second));
        assert!(second.same_engine(&third));
        assert_eq!(loader.load_count(), 1);
        assert_eq!(created.load(Ordering::SeqCst), 1);
        assert!(loader.is_ready());
    }

    #[tokio::test]
    async fn concurrent_acquire_shares_one_load() {
        let (loader, created) = counting_loader(MemoryEngine::new);

        let (a, b, c) = tokio::join!(loader.acquire(), loader.acquire(), loader.acquire());
        let (a, b, c) = (assert_ok!(a), assert_ok!(b), assert_ok!(c));

        assert!(a.same_engine(&b));
        assert!(b.same_engine(&c));
        assert_eq!(loader.load_count(), 1);
        assert_eq!(created.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_acquire_on_multi_thread_runtime() {
        let (loader, _) = counting_loader(MemoryEngine::new);
        let loader = Arc::new(loader);

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let loader = Arc::clone(&loader);
                tokio::spawn(async move { loader.acquire().await })
            })
            .collect();

        let mut handles = Vec::new();
        for task in tasks {
            handles.push(assert_ok!(task.await.expect("task panicked")));
        }

        assert!(handles.windows(2).all(|w| w[0].same_engine(&w[1])));
        assert_eq!(loader.load_count(), 1);
    }

    #[tokio::test]
    async fn failed_load_is_shared_and_retried_later() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&attempts);
        let (loader, _) = counting_loader(move || {
            // Only the first engine fails to load.
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                MemoryEngine::failing()
            } else {
                MemoryEngine::new()
            }
        });

        let (a, b) = tokio::join!(loader.acquire(), loader.acquire());
        assert_err!(a);
        assert_err!(b);
        assert_eq!(loader.load_count(), 1);
        assert!(!loader.is_ready());

        let handle = assert_ok!(loader.acquire().await);
        assert!(handle.loaded());
        assert_eq!(loader.load_count(), 2);
    }

    #[tokio::test]
    async fn preloaded_engine_skips_load() {
        let (loader, created) = counting_loader(MemoryEngine::preloaded);

        let handle = assert_ok!(loader.acquire().await);

        assert!(handle.loaded());
        assert_eq!(loader.load_count(), 0);
        assert_eq!(created.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn default_resources_point_at_ffmpeg() {
        let resources = EngineResources::default();
        assert_eq!(resources.core, PathBuf::from("ffmpeg"));
        assert_eq!(resources.probe, PathBuf::from("ffprobe"));
        assert!(resources.scratch_dir.is_none());
    }
}
