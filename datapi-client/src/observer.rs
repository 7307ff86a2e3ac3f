//! Command observers
//!
//! Observers are notified once per command with the finalized
//! [`ExecutionInfo`], whether the command succeeded or not. They are kept in
//! an [`ObserverRegistry`] keyed by name, so the same observer registered at
//! runner level and again in per-call overrides only fires once.
//!
//! Notification is asynchronous. [`ObserverRegistry::notify`] spawns one
//! supervising task, which runs every observer on the blocking pool and
//! waits for all of them. A panicking observer is logged and does not affect
//! the others or the command result.
//!
//! Closures work as observers:
//!
//! ```rust
//! use datapi_client::ObserverRegistry;
//! use datapi_core::ExecutionInfo;
//! use std::sync::Arc;
//!
//! let mut registry = ObserverRegistry::new();
//! registry.register("audit", Arc::new(|info: &ExecutionInfo| {
//!     println!("{} took {:?}", info.command_name(), info.execution_time());
//! }));
//! assert!(registry.contains("audit"));
//! ```

use datapi_core::ExecutionInfo;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tokio::task::{JoinHandle, JoinSet};

/// Receives the record of every executed command
pub trait CommandObserver: Send + Sync {
    /// Called once per command, on a blocking thread
    fn on_command(&self, info: &ExecutionInfo);
}

impl<F> CommandObserver for F
where
    F: Fn(&ExecutionInfo) + Send + Sync,
{
    fn on_command(&self, info: &ExecutionInfo) {
        self(info)
    }
}

/// Observer logging each execution at debug level
///
/// Headers are never logged; they carry the token.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingCommandObserver;

impl CommandObserver for LoggingCommandObserver {
    fn on_command(&self, info: &ExecutionInfo) {
        tracing::debug!(
            command = info.command_name(),
            url = info.request_url().unwrap_or("-"),
            status = info.http_response().map(|r| r.status),
            attempts = info.attempts(),
            elapsed_ms = info.execution_time().as_millis() as u64,
            success = info.is_success(),
            "Command executed"
        );
        if let Some(error) = info.error() {
            tracing::debug!(command = info.command_name(), error = %error, "Command failed");
        }
    }
}

/// Ordered observers keyed by name
#[derive(Clone, Default)]
pub struct ObserverRegistry {
    entries: Vec<(String, Arc<dyn CommandObserver>)>,
}

impl ObserverRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `observer` under `name`
    ///
    /// An existing observer with the same name is replaced in place.
    pub fn register(&mut self, name: impl Into<String>, observer: Arc<dyn CommandObserver>) {
        let name = name.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == name) {
            Some(entry) => entry.1 = observer,
            None => self.entries.push((name, observer)),
        }
    }

    /// Builder form of [`register`](Self::register)
    pub fn with(mut self, name: impl Into<String>, observer: Arc<dyn CommandObserver>) -> Self {
        self.register(name, observer);
        self
    }

    /// Whether an observer is registered under `name`
    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(existing, _)| existing == name)
    }

    /// Registered names, in registration order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    /// Number of observers
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no observer is registered
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Base entries followed by the entries of `overrides` not already present
    pub fn union(&self, overrides: &ObserverRegistry) -> ObserverRegistry {
        let mut merged = self.clone();
        for (name, observer) in &overrides.entries {
            if !merged.contains(name) {
                merged.entries.push((name.clone(), Arc::clone(observer)));
            }
        }
        merged
    }

    /// Notify every observer with `info`
    ///
    /// Inside a tokio runtime this returns at once with the handle of the
    /// supervising task. Outside a runtime the observers run inline and
    /// `None` is returned, as it is for an empty registry.
    pub fn notify(&self, info: Arc<ExecutionInfo>) -> Option<JoinHandle<()>> {
        if self.entries.is_empty() {
            return None;
        }

        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                for (name, observer) in &self.entries {
                    invoke(name, observer.as_ref(), &info);
                }
                return None;
            }
        };

        let entries = self.entries.clone();
        Some(handle.spawn(async move {
            let mut tasks = JoinSet::new();
            for (name, observer) in entries {
                let info = Arc::clone(&info);
                tasks.spawn_blocking(move || invoke(&name, observer.as_ref(), &info));
            }
            while let Some(joined) = tasks.join_next().await {
                if let Err(e) = joined {
                    tracing::warn!(error = %e, "Observer task did not complete");
                }
            }
        }))
    }
}

fn invoke(name: &str, observer: &dyn CommandObserver, info: &ExecutionInfo) {
    if catch_unwind(AssertUnwindSafe(|| observer.on_command(info))).is_err() {
        tracing::warn!(
            observer = name,
            command = info.command_name(),
            "Observer panicked"
        );
    }
}

impl fmt::Debug for ObserverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}
