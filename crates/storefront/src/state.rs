//! Application state shared across handlers.

use std::sync::Arc;

use crate::backend::SupabaseClient;
use crate::config::StorefrontConfig;
use crate::services::SubmissionLocks;

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to the
/// configuration, the backend client and the per-session checkout locks.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    backend: SupabaseClient,
    submission_locks: SubmissionLocks,
}

impl AppState {
    /// Create a new application state.
    #[must_use]
    pub fn new(config: StorefrontConfig) -> Self {
        let backend = SupabaseClient::new(&config.supabase);

        Self {
            inner: Arc::new(AppStateInner {
                config,
                backend,
                submission_locks: SubmissionLocks::new(),
            }),
        }
    }

    /// Get a reference to the storefront configuration.
    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    /// Get a reference to the backend client.
    #[must_use]
    pub fn backend(&self) -> &SupabaseClient {
        &self.inner.backend
    }

    /// Locks that keep one checkout submission per session in flight.
    #[must_use]
    pub fn submission_locks(&self) -> &SubmissionLocks {
        &self.inner.submission_locks
    }
}
