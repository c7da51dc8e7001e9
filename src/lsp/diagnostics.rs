// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! Diagnostics cache with freshness-gated waiters.
//!
//! Every `publishDiagnostics` notification overwrites the cache entry for
//! its URI and completes any waiters registered for that URI. A caller
//! asking for diagnostics either gets a fresh cached entry immediately
//! (within [`FRESHNESS_WINDOW`] of receipt) or registers a waiter that
//! resolves on the next publish or on timeout, whichever comes first.

use lsp_types::{Diagnostic, Uri};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, oneshot};

/// How close to "now" a cached entry must be to be returned without
/// waiting for a fresh publish.
pub const FRESHNESS_WINDOW: Duration = Duration::from_millis(500);

/// How long a diagnostics wait blocks before falling back to whatever is
/// cached (possibly nothing).
pub const WAIT_TIMEOUT: Duration = Duration::from_secs(10);

/// One cached diagnostics batch.
#[derive(Debug, Clone)]
struct Cached {
    diagnostics: Vec<Diagnostic>,
    received_at: Instant,
}

/// Cache of the latest diagnostics per URI, plus pending waiters.
#[derive(Default)]
pub struct DiagnosticsCache {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    cache: HashMap<Uri, Cached>,
    waiters: HashMap<Uri, Vec<oneshot::Sender<Vec<Diagnostic>>>>,
}

impl DiagnosticsCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a `publishDiagnostics` batch and resolves any waiters
    /// registered for `uri`.
    pub async fn publish(&self, uri: Uri, diagnostics: Vec<Diagnostic>) {
        let mut inner = self.inner.lock().await;
        inner.cache.insert(
            uri.clone(),
            Cached {
                diagnostics: diagnostics.clone(),
                received_at: Instant::now(),
            },
        );
        if let Some(waiters) = inner.waiters.remove(&uri) {
            for waiter in waiters {
                let _ = waiter.send(diagnostics.clone());
            }
        }
    }

    /// Waits for diagnostics on `uri`: returns the cached entry
    /// immediately if it is fresh, otherwise registers a waiter that
    /// resolves on the next publish or after [`WAIT_TIMEOUT`], whichever
    /// comes first — at which point the (possibly stale, possibly empty)
    /// cached value is returned.
    pub async fn wait(&self, uri: &Uri) -> Vec<Diagnostic> {
        let rx = {
            let mut inner = self.inner.lock().await;
            if let Some(cached) = inner.cache.get(uri)
                && cached.received_at.elapsed() < FRESHNESS_WINDOW
            {
                return cached.diagnostics.clone();
            }

            let (tx, rx) = oneshot::channel();
            inner.waiters.entry(uri.clone()).or_default().push(tx);
            rx
        };

        match tokio::time::timeout(WAIT_TIMEOUT, rx).await {
            Ok(Ok(diagnostics)) => diagnostics,
            Ok(Err(_)) | Err(_) => {
                let mut inner = self.inner.lock().await;
                if let Some(waiters) = inner.waiters.get_mut(uri) {
                    waiters.retain(|_| false);
                    if waiters.is_empty() {
                        inner.waiters.remove(uri);
                    }
                }
                inner.cache.get(uri).map(|c| c.diagnostics.clone()).unwrap_or_default()
            }
        }
    }

    /// Returns every cached entry with a non-empty diagnostics list.
    pub async fn all_nonempty(&self) -> HashMap<Uri, Vec<Diagnostic>> {
        let inner = self.inner.lock().await;
        inner
            .cache
            .iter()
            .filter(|(_, c)| !c.diagnostics.is_empty())
            .map(|(uri, c)| (uri.clone(), c.diagnostics.clone()))
            .collect()
    }

    /// Drops the cache entry for `uri`, e.g. when its document closes.
    pub async fn forget(&self, uri: &Uri) {
        let mut inner = self.inner.lock().await;
        inner.cache.remove(uri);
        inner.waiters.remove(uri);
    }
}
