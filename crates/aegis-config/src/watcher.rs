//! Configuration hot-reload.
//!
//! [`ConfigWatcher`] reports changes to one configuration file;
//! [`ChainReloader`] turns each change into a freshly built [`Chain`]
//! published through a [`ChainHandle`].
//!
//! The parent directory is watched rather than the file itself, so editors
//! that save by writing a temporary file and renaming it are still seen.
//!
//! # Example
//!
//! ```no_run
//! use aegis_chain::ChainHandle;
//! use aegis_config::{ChainReloader, ConfigLoader};
//!
//! # async fn example() -> Result<(), aegis_config::ConfigError> {
//! let config = ConfigLoader::new().with_file("aegis.toml")?.load()?;
//! let handle = ChainHandle::new(config.build_chain()?);
//!
//! let reloader = ChainReloader::new("aegis.toml", handle.clone()).with_env_prefix("AEGIS");
//! tokio::spawn(async move { reloader.run().await });
//!
//! // Request handlers call handle.current() per request.
//! # Ok(())
//! # }
//! ```
//!
//! A reload that fails to parse, validate or build logs at `error` and keeps
//! the current chain.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use aegis_chain::{Chain, ChainHandle};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::{ConfigError, ConfigLoader};

/// Kind of file change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileChangeKind {
    /// File was created (or renamed into place).
    Created,
    /// File was modified.
    Modified,
    /// File was deleted.
    Deleted,
}

impl FileChangeKind {
    fn from_event_kind(kind: &EventKind) -> Option<Self> {
        match kind {
            EventKind::Create(_) => Some(Self::Created),
            EventKind::Modify(_) => Some(Self::Modified),
            EventKind::Remove(_) => Some(Self::Deleted),
            EventKind::Access(_) | EventKind::Other | EventKind::Any => None,
        }
    }
}

/// A change to the watched file.
#[derive(Debug, Clone)]
pub struct FileChangeEvent {
    /// Path of the changed file.
    pub path: PathBuf,
    /// Kind of change.
    pub kind: FileChangeKind,
    /// When the change was received.
    pub timestamp: Instant,
}

/// Debounces raw watcher events for one file.
///
/// A burst of events collapses into one change, reported after the file has
/// been quiet for the debounce window. The last event's kind wins, so an
/// editor that truncates and then writes is seen once, after the final write.
struct EventStream {
    rx: mpsc::Receiver<Event>,
    path: PathBuf,
    file_name: OsString,
    debounce: Duration,
}

impl EventStream {
    async fn next(&mut self) -> Option<FileChangeEvent> {
        let mut pending = loop {
            let event = self.rx.recv().await?;
            if let Some(change) = self.classify(&event) {
                break change;
            }
        };

        loop {
            match tokio::time::timeout(self.debounce, self.rx.recv()).await {
                Ok(Some(event)) => {
                    if let Some(change) = self.classify(&event) {
                        pending = change;
                    }
                }
                Ok(None) | Err(_) => return Some(pending),
            }
        }
    }

    fn classify(&self, event: &Event) -> Option<FileChangeEvent> {
        let kind = FileChangeKind::from_event_kind(&event.kind)?;

        if !event
            .paths
            .iter()
            .any(|p| p.file_name() == Some(self.file_name.as_os_str()))
        {
            return None;
        }

        Some(FileChangeEvent {
            path: self.path.clone(),
            kind,
            timestamp: Instant::now(),
        })
    }
}

/// Watches a single configuration file.
pub struct ConfigWatcher {
    _watcher: RecommendedWatcher,
    events: EventStream,
}

impl ConfigWatcher {
    /// Default debounce window.
    pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(250);

    /// Starts watching `path`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::FileNotFound` if the file does not exist, or
    /// `ConfigError::Watch` if the platform watcher cannot be created.
    pub fn new(path: impl AsRef<Path>, debounce: Duration) -> Result<Self, ConfigError> {
        let path = path.as_ref().to_path_buf();
        if !path.is_file() {
            return Err(ConfigError::file_not_found(path));
        }
        let file_name = path
            .file_name()
            .map(ToOwned::to_owned)
            .ok_or_else(|| ConfigError::watch(&path, "path has no file name"))?;
        let directory = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let (tx, rx) = mpsc::channel(64);
        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            if let Ok(event) = res {
                // The receiver is gone once the watcher is dropped.
                let _ = tx.blocking_send(event);
            }
        })
        .map_err(|e| ConfigError::watch(&path, e))?;

        watcher
            .watch(&directory, RecursiveMode::NonRecursive)
            .map_err(|e| ConfigError::watch(&directory, e))?;

        debug!(path = %path.display(), "watching configuration file");

        Ok(Self {
            _watcher: watcher,
            events: EventStream {
                rx,
                path,
                file_name,
                debounce,
            },
        })
    }

    /// Returns the watched file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.events.path
    }

    /// Waits for the next settled change to the watched file.
    ///
    /// Returns `None` once the underlying watcher stops.
    pub async fn next(&mut self) -> Option<FileChangeEvent> {
        self.events.next().await
    }
}

impl std::fmt::Debug for ConfigWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigWatcher")
            .field("path", &self.events.path)
            .field("debounce", &self.events.debounce)
            .finish_non_exhaustive()
    }
}

/// Rebuilds and publishes the chain whenever the configuration file changes.
#[derive(Debug, Clone)]
pub struct ChainReloader {
    path: PathBuf,
    handle: ChainHandle,
    env_prefix: Option<String>,
    debounce: Duration,
}

impl ChainReloader {
    /// Creates a reloader for `path` publishing into `handle`.
    pub fn new(path: impl Into<PathBuf>, handle: ChainHandle) -> Self {
        Self {
            path: path.into(),
            handle,
            env_prefix: None,
            debounce: ConfigWatcher::DEFAULT_DEBOUNCE,
        }
    }

    /// Applies environment overrides with this prefix on every reload.
    #[must_use]
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.to_string());
        self
    }

    /// Sets the debounce window for bursts of file events.
    #[must_use]
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Returns the handle chains are published through.
    #[must_use]
    pub fn handle(&self) -> &ChainHandle {
        &self.handle
    }

    /// Loads, validates and builds the configuration, then publishes the chain.
    ///
    /// On error the current chain stays in place.
    ///
    /// # Errors
    ///
    /// Returns the `ConfigError` that stopped the reload.
    pub fn reload_now(&self) -> Result<Arc<Chain>, ConfigError> {
        let mut loader = ConfigLoader::new().with_file(&self.path)?;
        if let Some(prefix) = &self.env_prefix {
            loader = loader.with_env_prefix(prefix);
        }
        let chain = loader.load()?.build_chain()?;

        self.handle.publish(chain);
        Ok(self.handle.current())
    }

    /// Watches the file and reloads on every change until the watcher stops.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` only if the watcher cannot be started. Reload
    /// failures are logged and do not end the loop.
    pub async fn run(self) -> Result<(), ConfigError> {
        let mut watcher = ConfigWatcher::new(&self.path, self.debounce)?;
        info!(path = %self.path.display(), "configuration reloader started");

        while let Some(event) = watcher.next().await {
            if event.kind == FileChangeKind::Deleted {
                warn!(
                    path = %event.path.display(),
                    "configuration file removed, keeping current chain"
                );
                continue;
            }

            match self.reload_now() {
                Ok(chain) => info!(
                    path = %event.path.display(),
                    stages = ?chain.stage_names(),
                    "configuration reloaded"
                ),
                Err(e) => error!(
                    path = %event.path.display(),
                    error = %e,
                    "configuration reload failed, keeping current chain"
                ),
            }
        }

        Ok(())
    }
}
