//! In-memory engine used by unit tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::{EngineLoader, EngineResources, MediaEngine, ProgressCallback};
use crate::error::{EngineError, EngineLoadError};

/// Marker every fake video with an audio track starts with
pub(crate) const VIDEO_MAGIC: &[u8] = b"VIDEO";

/// Engine that keeps files in a map and "transcodes" by reversing the
/// payload after [`VIDEO_MAGIC`].
pub(crate) struct MemoryEngine {
    loaded: AtomicBool,
    fail_load: bool,
    files: Mutex<HashMap<String, Vec<u8>>>,
    progress: Mutex<Option<ProgressCallback>>,
}

impl MemoryEngine {
    pub(crate) fn new() -> Self {
        Self {
            loaded: AtomicBool::new(false),
            fail_load: false,
            files: Mutex::new(HashMap::new()),
            progress: Mutex::new(None),
        }
    }

    pub(crate) fn failing() -> Self {
        Self {
            fail_load: true,
            ..Self::new()
        }
    }

    pub(crate) fn preloaded() -> Self {
        let engine = Self::new();
        engine.loaded.store(true, Ordering::SeqCst);
        engine
    }

    fn emit(&self, fraction: f64) {
        let callback = self.progress.lock().unwrap().clone();
        if let Some(callback) = callback {
            callback(fraction);
        }
    }
}

#[async_trait]
impl MediaEngine for MemoryEngine {
    fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::SeqCst)
    }

    async fn load(&self, _resources: &EngineResources) -> Result<(), EngineLoadError> {
        // Give concurrent callers a chance to arrive while loading.
        for _ in 0..3 {
            tokio::task::yield_now().await;
        }
        if self.fail_load {
            return Err(EngineLoadError::unavailable(
                "memory://core",
                "simulated resource fetch failure",
            ));
        }
        self.loaded.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn write_file(&self, name: &str, data: &[u8]) -> Result<(), EngineError> {
        if !self.is_loaded() {
            return Err(EngineError::NotLoaded);
        }
        self.files
            .lock()
            .unwrap()
            .insert(name.to_string(), data.to_vec());
        Ok(())
    }

    async fn exec(&self, args: &[String]) -> Result<(), EngineError> {
        let input_idx = args
            .iter()
            .position(|a| a == "-i")
            .ok_or_else(|| EngineError::ExecutionFailed("no input".to_string()))?;
        let input_name = &args[input_idx + 1];
        let output_name = args
            .last()
            .ok_or_else(|| EngineError::ExecutionFailed("no output".to_string()))?;

        let input = self
            .files
            .lock()
            .unwrap()
            .get(input_name)
            .cloned()
            .ok_or_else(|| EngineError::MissingFile(input_name.clone()))?;

        let Some(payload) = input.strip_prefix(VIDEO_MAGIC) else {
            return Err(EngineError::ExecutionFailed(
                "Stream map '0:a' matches no streams".to_string(),
            ));
        };

        for fraction in [0.25, 0.75, 0.5, 1.0] {
            self.emit(fraction);
        }

        let mut output = b"ID3".to_vec();
        output.extend(payload.iter().rev());
        self.files
            .lock()
            .unwrap()
            .insert(output_name.clone(), output);
        Ok(())
    }

    async fn read_file(&self, name: &str) -> Result<Vec<u8>, EngineError> {
        self.files
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::MissingFile(name.to_string()))
    }

    fn on_progress(&self, callback: ProgressCallback) {
        *self.progress.lock().unwrap() = Some(callback);
    }
}

/// Loader over engines built by `make`, plus a count of engines created
pub(crate) fn counting_loader<F, E>(make: F) -> (EngineLoader, Arc<AtomicUsize>)
where
    F: Fn() -> E + Send + Sync + 'static,
    E: MediaEngine + 'static,
{
    let created = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&created);
    let loader = EngineLoader::new(EngineResources::default(), move || {
        counter.fetch_add(1, Ordering::SeqCst);
        Arc::new(make()) as Arc<dyn MediaEngine>
    });
    (loader, created)
}

/// Loaded engine handle over a fresh [`MemoryEngine`]
pub(crate) async fn memory_engine() -> super::EngineHandle {
    let (loader, _) = counting_loader(MemoryEngine::new);
    loader.acquire().await.expect("memory engine loads")
}
