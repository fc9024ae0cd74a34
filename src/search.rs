//! Debounced catalog search.
//!
//! Each keystroke restarts the debounce timer; only a query that stays
//! unchanged for the whole window and has at least the minimum length is
//! sent. Responses are tagged with a sequence number so an answer to an
//! older query never overwrites the results of a newer one. Accepting a new
//! query drops the results of the previous one, so "load more" can only
//! ever extend the list of the query it was displayed for.

use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::api::StockBackend;
use crate::error::ListError;
use crate::product::Product;
use crate::session::AuthFailureHook;
use crate::working_list::{AddOutcome, AddRequest, WorkingList};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);
pub const DEFAULT_MIN_CHARS: usize = 2;
pub const DEFAULT_PAGE_SIZE: u32 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchSettings {
    pub debounce: Duration,
    pub min_chars: usize,
    pub page_size: u32,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            min_chars: DEFAULT_MIN_CHARS,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// What the search panel displays.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchState {
    pub query: String,
    pub results: Vec<Product>,
    /// Last page loaded; 0 when nothing is displayed.
    pub page: u32,
    pub has_more: bool,
    pub loading: bool,
    /// Set when the last request failed; the panel shows a retry action.
    pub error: Option<String>,
    /// The last request was rejected for an invalid session.
    pub session_expired: bool,
}

#[derive(Default)]
struct Inner {
    state: SearchState,
    seq: u64,
    pending: Option<CancellationToken>,
}

pub struct SearchResolver<B: StockBackend + 'static> {
    backend: Arc<B>,
    settings: SearchSettings,
    inner: Arc<Mutex<Inner>>,
    on_auth_failure: Option<AuthFailureHook>,
}

impl<B: StockBackend + 'static> SearchResolver<B> {
    pub fn new(backend: Arc<B>, settings: SearchSettings) -> Self {
        Self {
            backend,
            settings,
            inner: Arc::new(Mutex::new(Inner::default())),
            on_auth_failure: None,
        }
    }

    /// Run `hook` whenever a search is rejected for an invalid session.
    pub fn with_auth_failure_hook(mut self, hook: AuthFailureHook) -> Self {
        self.on_auth_failure = Some(hook);
        self
    }

    pub fn settings(&self) -> SearchSettings {
        self.settings
    }

    pub fn snapshot(&self) -> SearchState {
        lock(&self.inner).state.clone()
    }

    /// Feed the current text of the search field. Must be called from within
    /// a tokio runtime.
    pub fn on_query_changed(&self, text: &str) {
        let query = text.trim().to_string();
        let (token, seq) = {
            let mut inner = lock(&self.inner);
            if let Some(pending) = inner.pending.take() {
                pending.cancel();
            }
            inner.seq += 1;

            let too_short = query.chars().count() < self.settings.min_chars;
            if too_short || inner.state.query != query {
                inner.state = SearchState {
                    query: query.clone(),
                    ..SearchState::default()
                };
            }
            if too_short {
                return;
            }

            let token = CancellationToken::new();
            inner.pending = Some(token.clone());
            (token, inner.seq)
        };

        let backend = self.backend.clone();
        let shared = self.inner.clone();
        let settings = self.settings;
        let hook = self.on_auth_failure.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(settings.debounce) => {}
            }
            {
                let mut inner = lock(&shared);
                if inner.seq == seq {
                    inner.pending = None;
                }
            }
            fetch_page(
                backend.as_ref(),
                &shared,
                settings,
                hook.as_ref(),
                query,
                1,
                seq,
            )
            .await;
        });
    }

    /// Append the next page of results for the current query.
    pub async fn load_more(&self) {
        let (query, page, seq) = {
            let inner = lock(&self.inner);
            let state = &inner.state;
            if !state.has_more
                || state.page == 0
                || state.loading
                || state.query.chars().count() < self.settings.min_chars
            {
                return;
            }
            (state.query.clone(), state.page + 1, inner.seq)
        };
        fetch_page(
            self.backend.as_ref(),
            &self.inner,
            self.settings,
            self.on_auth_failure.as_ref(),
            query,
            page,
            seq,
        )
        .await;
    }

    /// Re-issue the current query immediately, skipping the debounce window.
    pub async fn retry(&self) {
        let (query, seq) = {
            let mut inner = lock(&self.inner);
            if let Some(pending) = inner.pending.take() {
                pending.cancel();
            }
            inner.seq += 1;
            if inner.state.query.chars().count() < self.settings.min_chars {
                return;
            }
            (inner.state.query.clone(), inner.seq)
        };
        fetch_page(
            self.backend.as_ref(),
            &self.inner,
            self.settings,
            self.on_auth_failure.as_ref(),
            query,
            1,
            seq,
        )
        .await;
    }
}

/// Add a product picked from the results as a search-originated line.
pub fn add_to_list(
    list: &mut WorkingList,
    product: Product,
    quantity: f64,
) -> Result<AddOutcome, ListError> {
    list.add_product(product, AddRequest::searched(quantity))
}

fn lock(inner: &Mutex<Inner>) -> std::sync::MutexGuard<'_, Inner> {
    inner.lock().unwrap_or_else(|e| e.into_inner())
}

async fn fetch_page<B: StockBackend + ?Sized>(
    backend: &B,
    shared: &Mutex<Inner>,
    settings: SearchSettings,
    on_auth_failure: Option<&AuthFailureHook>,
    query: String,
    page: u32,
    seq: u64,
) {
    {
        let mut inner = lock(shared);
        if inner.seq != seq {
            return;
        }
        inner.state.loading = true;
    }

    let result = backend
        .search_products(&query, page, settings.page_size)
        .await;

    let expired = {
        let mut inner = lock(shared);
        if inner.seq != seq {
            debug!(query = %query, page, "stale search response dropped");
            return;
        }
        let state = &mut inner.state;
        state.loading = false;
        match result {
            Ok(found) => {
                debug!(query = %query, page, results = found.items.len(), "search page loaded");
                if page <= 1 {
                    state.results = found.items;
                } else {
                    state.results.extend(found.items);
                }
                state.page = page;
                state.has_more = found.has_more;
                state.error = None;
                state.session_expired = false;
                false
            }
            Err(e) => {
                warn!(query = %query, page, error = %e, "product search failed");
                if page <= 1 {
                    state.results.clear();
                    state.page = 0;
                    state.has_more = false;
                }
                state.session_expired = e.is_auth_failure();
                state.error = Some(e.to_string());
                state.session_expired
            }
        }
    };

    if expired {
        if let Some(hook) = on_auth_failure {
            hook();
        }
    }
}
