//! Barcode scan resolution.
//!
//! A scanned code is looked up on the backend, upgraded to the full product
//! record when possible, and handed to the working list as a scan-originated
//! line. Anything that cannot be resolved becomes an "unknown code" prompt;
//! lookup failures are reported the same way because a transient error and
//! a genuinely unknown code cannot be told apart reliably from here. A
//! rejected session token is the exception: it is reported as such and the
//! auth-failure hook, when set, ends the session.

use std::sync::{Arc, Mutex};
use tracing::{info, warn};

use crate::api::StockBackend;
use crate::error::{ApiError, ListError};
use crate::product::Product;
use crate::session::AuthFailureHook;
use crate::working_list::{AddOutcome, AddRequest, WorkingList};

/// Choices offered when a code could not be resolved. Neither touches the
/// working list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnknownCodeChoice {
    RetryScan,
    Dismiss,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownCode {
    pub code: String,
}

impl UnknownCode {
    pub fn choices(&self) -> [UnknownCodeChoice; 2] {
        [UnknownCodeChoice::RetryScan, UnknownCodeChoice::Dismiss]
    }

    pub fn message(&self) -> String {
        format!("Code {} is not linked to any product", self.code)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScanOutcome {
    Resolved(Product),
    Unknown(UnknownCode),
    /// The backend rejected the session token; the operator must log in again.
    SessionExpired,
}

/// Result of scanning straight into a list.
#[derive(Debug, Clone, PartialEq)]
pub enum ScanApplied {
    Added(AddOutcome),
    Rejected(ListError),
    Unknown(UnknownCode),
    SessionExpired,
}

pub struct ScanResolver<B: StockBackend> {
    backend: Arc<B>,
    on_auth_failure: Option<AuthFailureHook>,
}

impl<B: StockBackend> ScanResolver<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self {
            backend,
            on_auth_failure: None,
        }
    }

    /// Run `hook` whenever a lookup is rejected for an invalid session.
    pub fn with_auth_failure_hook(mut self, hook: AuthFailureHook) -> Self {
        self.on_auth_failure = Some(hook);
        self
    }

    fn session_expired(&self, code: &str, err: &ApiError) -> ScanOutcome {
        warn!(code, error = %err, "scan rejected, session expired");
        if let Some(hook) = &self.on_auth_failure {
            hook();
        }
        ScanOutcome::SessionExpired
    }

    /// Resolve a decoded barcode to a product.
    pub async fn resolve(&self, raw_code: &str) -> ScanOutcome {
        let code = raw_code.trim();
        let unknown = || {
            ScanOutcome::Unknown(UnknownCode {
                code: code.to_string(),
            })
        };
        if code.is_empty() {
            return unknown();
        }

        let hit = match self.backend.scan_product(code).await {
            Ok(Some(hit)) => hit,
            Ok(None) => {
                info!(code, "scanned code not found");
                return unknown();
            }
            Err(e) if e.is_auth_failure() => return self.session_expired(code, &e),
            Err(e) => {
                warn!(code, error = %e, "scan lookup failed");
                return unknown();
            }
        };

        if let Some(id) = hit.product_id {
            match self.backend.get_product(id).await {
                Ok(product) => return ScanOutcome::Resolved(product),
                Err(e) if e.is_auth_failure() => return self.session_expired(code, &e),
                Err(e) => {
                    warn!(code, product_id = id, error = %e, "product detail fetch failed, using scan payload");
                }
            }
        }

        match hit.partial {
            Some(product) => ScanOutcome::Resolved(product),
            None => unknown(),
        }
    }

    /// Resolve `code` and add the product to `list` as a scan-originated line.
    ///
    /// The list lock is not held during the lookup; the result is applied
    /// only if the list has not been closed in the meantime.
    pub async fn scan_into(
        &self,
        list: &Mutex<WorkingList>,
        code: &str,
        quantity: f64,
    ) -> ScanApplied {
        let ticket = list.lock().unwrap_or_else(|e| e.into_inner()).ticket();
        let product = match self.resolve(code).await {
            ScanOutcome::Resolved(p) => p,
            ScanOutcome::Unknown(unknown) => return ScanApplied::Unknown(unknown),
            ScanOutcome::SessionExpired => return ScanApplied::SessionExpired,
        };
        let mut guard = list.lock().unwrap_or_else(|e| e.into_inner());
        match guard.apply_resolved(ticket, product, AddRequest::scanned(quantity)) {
            Ok(outcome) => ScanApplied::Added(outcome),
            Err(e) => ScanApplied::Rejected(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::drafts::DraftStore;
    use crate::line_item::OriginTag;
    use crate::policy::DraftKind;
    use crate::product::sample;
    use crate::test_support::FakeBackend;

    fn list(kind: DraftKind) -> Mutex<WorkingList> {
        Mutex::new(WorkingList::open(
            kind,
            DraftStore::new(Arc::new(db::test_state())),
        ))
    }

    #[tokio::test]
    async fn test_resolve_prefers_detail_record() {
        let backend = FakeBackend::default();
        let mut detailed = sample(4, "Huile 1L", 30.0);
        detailed.category = Some("Épicerie".into());
        backend.with_product(detailed.clone());
        backend.with_scan("6131", Some(4), Some(sample(4, "Huile", 0.0)));

        let resolver = ScanResolver::new(Arc::new(backend));
        assert_eq!(resolver.resolve(" 6131 ").await, ScanOutcome::Resolved(detailed));
    }

    #[tokio::test]
    async fn test_resolve_falls_back_to_partial() {
        let backend = FakeBackend::default();
        let partial = sample(8, "Sucre", 3.0);
        backend.with_scan("777", Some(8), Some(partial.clone()));

        let resolver = ScanResolver::new(Arc::new(backend));
        assert_eq!(resolver.resolve("777").await, ScanOutcome::Resolved(partial));
    }

    #[tokio::test]
    async fn test_unknown_code_leaves_list_untouched() {
        let backend = Arc::new(FakeBackend::default());
        let resolver = ScanResolver::new(backend.clone());
        let list = list(DraftKind::Reception);

        let applied = resolver.scan_into(&list, "999", 1.0).await;
        let ScanApplied::Unknown(unknown) = applied else {
            panic!("expected unknown code, got {applied:?}");
        };
        assert_eq!(unknown.code, "999");
        assert_eq!(
            unknown.choices(),
            [UnknownCodeChoice::RetryScan, UnknownCodeChoice::Dismiss]
        );
        assert!(list.lock().unwrap().is_empty());
        assert_eq!(backend.scan_calls(), 1);
    }

    #[tokio::test]
    async fn test_lookup_error_reads_as_unknown_code() {
        let backend = FakeBackend::default();
        backend.fail_scans();
        let resolver = ScanResolver::new(Arc::new(backend));
        assert!(matches!(
            resolver.resolve("123").await,
            ScanOutcome::Unknown(_)
        ));
    }

    #[tokio::test]
    async fn test_empty_code_skips_backend() {
        let backend = Arc::new(FakeBackend::default());
        let resolver = ScanResolver::new(backend.clone());
        assert!(matches!(resolver.resolve("   ").await, ScanOutcome::Unknown(_)));
        assert_eq!(backend.scan_calls(), 0);
    }

    #[tokio::test]
    async fn test_scan_into_tags_line_as_scanned() {
        let backend = FakeBackend::default();
        backend.with_scan("42", None, Some(sample(42, "Beurre", 9.0)));
        let resolver = ScanResolver::new(Arc::new(backend));
        let list = list(DraftKind::Loss);

        let applied = resolver.scan_into(&list, "42", 2.0).await;
        assert!(matches!(applied, ScanApplied::Added(AddOutcome::Created { .. })));
        let guard = list.lock().unwrap();
        assert_eq!(guard.items()[0].origin, OriginTag::Scan);
        assert_eq!(guard.items()[0].quantity, 2.0);
    }

    #[tokio::test]
    async fn test_cart_rejection_is_reported() {
        let backend = FakeBackend::default();
        backend.with_scan("1", None, Some(sample(1, "Dernier", 0.0)));
        let resolver = ScanResolver::new(Arc::new(backend));
        let list = list(DraftKind::SalesCart);

        assert!(matches!(
            resolver.scan_into(&list, "1", 1.0).await,
            ScanApplied::Rejected(ListError::ExceedsAvailable { .. })
        ));
    }

    #[tokio::test]
    async fn test_rejected_session_is_reported_and_runs_hook() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let backend = FakeBackend::default();
        backend.with_scan("55", Some(55), Some(sample(55, "Farine", 4.0)));
        backend.reject_session();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let resolver = ScanResolver::new(Arc::new(backend)).with_auth_failure_hook(Arc::new(
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
            },
        ));
        let list = list(DraftKind::Inventory);

        assert_eq!(
            resolver.scan_into(&list, "55", 1.0).await,
            ScanApplied::SessionExpired
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(list.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_closed_during_lookup_discards_result() {
        let backend = Arc::new(FakeBackend::default());
        backend.with_scan("42", None, Some(sample(42, "Beurre", 9.0)));
        let gate = backend.hold_scans();
        let resolver = Arc::new(ScanResolver::new(backend.clone()));
        let list = Arc::new(list(DraftKind::Reception));

        let task = {
            let resolver = resolver.clone();
            let list = list.clone();
            tokio::spawn(async move { resolver.scan_into(&list, "42", 1.0).await })
        };
        while backend.scan_calls() == 0 {
            tokio::task::yield_now().await;
        }

        list.lock().unwrap().close();
        gate.notify_one();

        let applied = task.await.unwrap();
        assert_eq!(applied, ScanApplied::Added(AddOutcome::Stale));
        assert!(list.lock().unwrap().is_empty());
    }
}
