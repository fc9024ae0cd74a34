//! BoliBana Stock - native client core.
//!
//! Backs the reception, inventory, loss and sales-cart screens of the mobile
//! app: working lists built by scanning or searching, persisted as drafts
//! until they are submitted to the stock backend.

use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub mod api;
pub mod config;
pub mod db;
pub mod diagnostics;
pub mod drafts;
pub mod error;
pub mod line_item;
pub mod policy;
pub mod product;
pub mod scan;
pub mod search;
pub mod session;
pub mod storage;
pub mod submit;
pub mod working_list;

#[cfg(test)]
mod test_support;

pub use api::{ApiClient, StockBackend, StockMutation};
pub use config::AppConfig;
pub use drafts::DraftStore;
pub use error::{ApiError, AppError, ListError, SubmitError};
pub use line_item::{LineItem, OriginTag};
pub use policy::{DraftKind, ListPolicy, MergePolicy, StockOperation};
pub use product::{Product, ProductPage, ScanHit, UnitKind};
pub use scan::{ScanApplied, ScanOutcome, ScanResolver, UnknownCode, UnknownCodeChoice};
pub use search::{SearchResolver, SearchSettings, SearchState};
pub use session::{AuthFailureHook, Session, SessionManager};
pub use submit::{SubmissionContext, SubmissionSummary};
pub use working_list::{AddOutcome, AddRequest, CommitOutcome, ListTotals, WorkingList};

pub(crate) fn value_str(v: &serde_json::Value, keys: &[&str]) -> Option<String> {
    for key in keys {
        if let Some(s) = v.get(*key).and_then(|x| x.as_str()) {
            let trimmed = s.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
    }
    None
}

pub(crate) fn value_f64(v: &serde_json::Value, keys: &[&str]) -> Option<f64> {
    for key in keys {
        if let Some(n) = v.get(*key).and_then(|x| x.as_f64()) {
            return Some(n);
        }
    }
    None
}

// ============================================================================
// Logging
// ============================================================================

/// Install structured logging: console plus a daily rolling file under
/// `{data_dir}/logs`. `RUST_LOG` wins over `default_filter`.
///
/// Keep the returned guard alive for the lifetime of the app; dropping it
/// flushes and stops the file writer. Returns `None` when a global
/// subscriber is already installed.
pub fn init_logging(data_dir: &Path, default_filter: &str) -> Option<WorkerGuard> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let log_dir = diagnostics::get_log_dir(data_dir);
    diagnostics::prune_old_logs(&log_dir);
    std::fs::create_dir_all(&log_dir).ok();

    let file_appender = tracing_appender::rolling::daily(&log_dir, diagnostics::LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true);
    let console_layer = fmt::layer().with_target(true);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .ok()?;

    info!("Starting BoliBana Stock core v{}", env!("CARGO_PKG_VERSION"));
    Some(guard)
}

// ============================================================================
// Application bundle
// ============================================================================

/// Everything a screen needs: database, API client, session and drafts.
pub struct StockApp {
    config: AppConfig,
    api: Arc<ApiClient>,
    session: Arc<SessionManager>,
    drafts: DraftStore,
}

impl StockApp {
    /// Open the database, apply stored settings, build the API client and
    /// resume the stored session.
    pub fn init(config: AppConfig) -> Result<Self, AppError> {
        Self::init_with(config, true)
    }

    /// Like `init`; `persist_session` controls keyring use.
    pub fn init_with(mut config: AppConfig, persist_session: bool) -> Result<Self, AppError> {
        let db = Arc::new(db::init(&config.data_dir).map_err(AppError::Database)?);
        config.apply_settings(&db);

        let api = ApiClient::new(&config.api_base_url, config.request_timeout)
            .map_err(|e| AppError::HttpClient(e.to_string()))?;
        let api = Arc::new(api);

        let session = Arc::new(SessionManager::new(persist_session));
        if !session.restore(&api) {
            info!("no active session");
        }

        let drafts = DraftStore::new(db);
        for kind in DraftKind::ALL {
            if drafts.has_draft(kind) {
                info!(draft = kind.key(), "unfinished draft found");
            }
        }

        info!(api = %config.api_base_url, "stock core ready");
        Ok(Self {
            config,
            api,
            session,
            drafts,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn api(&self) -> &Arc<ApiClient> {
        &self.api
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    pub fn drafts(&self) -> &DraftStore {
        &self.drafts
    }

    /// Controller for a screen, resumed from its draft when present.
    pub fn open_list(&self, kind: DraftKind) -> WorkingList {
        WorkingList::open(kind, self.drafts.clone())
    }

    /// Logs the operator out; handed to the resolvers so a 401 from any
    /// lookup ends the session.
    fn auth_failure_hook(&self) -> AuthFailureHook {
        let session = self.session.clone();
        let api = self.api.clone();
        Arc::new(move || {
            session.handle_api_error(&ApiError::Unauthorized, &api);
        })
    }

    pub fn scan_resolver(&self) -> ScanResolver<ApiClient> {
        ScanResolver::new(self.api.clone()).with_auth_failure_hook(self.auth_failure_hook())
    }

    pub fn search_resolver(&self) -> SearchResolver<ApiClient> {
        SearchResolver::new(self.api.clone(), self.config.search)
            .with_auth_failure_hook(self.auth_failure_hook())
    }

    /// Submit a list; a rejected session during the batch logs the operator
    /// out (the draft is kept or cleared by the usual rules).
    pub async fn submit(
        &self,
        list: &mut WorkingList,
        ctx: &SubmissionContext,
    ) -> Result<SubmissionSummary, SubmitError> {
        let summary = submit::submit(self.api.as_ref(), list, ctx).await?;
        if summary.hit_auth_failure() {
            warn!("session rejected during submission");
            self.session
                .handle_api_error(&ApiError::Unauthorized, &self.api);
        }
        Ok(summary)
    }

    pub fn diagnostics(&self) -> serde_json::Value {
        diagnostics::snapshot(
            &self.drafts,
            &self.config.api_base_url,
            self.session.is_authenticated(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(data_dir: &Path, api: &str) -> AppConfig {
        AppConfig {
            api_base_url: api.to_string(),
            data_dir: data_dir.to_path_buf(),
            ..AppConfig::default()
        }
    }

    #[test]
    fn test_value_helpers_skip_blank_and_wrong_types() {
        let v = json!({ "a": "  ", "b": " x ", "n": "3", "f": 2.5 });
        assert_eq!(value_str(&v, &["a", "b"]), Some("x".to_string()));
        assert_eq!(value_f64(&v, &["n", "f"]), Some(2.5));
        assert_eq!(value_f64(&v, &["missing"]), None);
    }

    #[test]
    fn test_init_creates_database_and_resumes_drafts() {
        let dir = tempfile::tempdir().expect("tempdir");
        {
            let app = StockApp::init_with(test_config(dir.path(), "localhost:1"), false)
                .expect("init");
            assert_eq!(app.api().base_url(), "http://localhost:1");
            let mut list = app.open_list(DraftKind::Reception);
            list.add_product(product::sample(1, "Ciment", 50.0), AddRequest::scanned(10.0))
                .unwrap();
        }
        assert!(dir.path().join("bolibana.db").exists());

        let app =
            StockApp::init_with(test_config(dir.path(), "localhost:1"), false).expect("reinit");
        let list = app.open_list(DraftKind::Reception);
        assert!(list.was_resumed());
        assert_eq!(list.items()[0].quantity, 10.0);
        assert_eq!(app.diagnostics()["drafts"]["reception"], 1);
    }

    #[tokio::test]
    async fn test_submission_rejected_session_logs_out_and_keeps_draft() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/products/1/add_stock/"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().expect("tempdir");
        let app = StockApp::init_with(test_config(dir.path(), &server.uri()), false)
            .expect("init");
        app.session()
            .begin(Session::new("adama", "opaque", None), app.api());

        let mut list = app.open_list(DraftKind::Reception);
        list.add_product(product::sample(1, "Fer 12", 80.0), AddRequest::searched(5.0))
            .unwrap();
        let ctx = SubmissionContext {
            supplier: Some("Quincaillerie Traoré".into()),
            notes: None,
        };
        let summary = app.submit(&mut list, &ctx).await.unwrap();

        assert_eq!(summary.failed, 1);
        assert!(!app.session().is_authenticated());
        assert!(!app.api().has_token());
        assert_eq!(app.drafts().load(DraftKind::Reception).map(|l| l.len()), Some(1));
    }

    #[tokio::test]
    async fn test_rejected_scan_logs_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/products/scan/"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().expect("tempdir");
        let app = StockApp::init_with(test_config(dir.path(), &server.uri()), false)
            .expect("init");
        app.session()
            .begin(Session::new("adama", "opaque", None), app.api());

        let outcome = app.scan_resolver().resolve("123").await;
        assert_eq!(outcome, ScanOutcome::SessionExpired);
        assert!(!app.session().is_authenticated());
        assert!(!app.api().has_token());
    }

    #[tokio::test]
    async fn test_rejected_search_logs_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/products/"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().expect("tempdir");
        let mut config = test_config(dir.path(), &server.uri());
        config.search.debounce = std::time::Duration::from_millis(5);
        let app = StockApp::init_with(config, false).expect("init");
        app.session()
            .begin(Session::new("adama", "opaque", None), app.api());

        let search = app.search_resolver();
        search.on_query_changed("riz");
        for _ in 0..200 {
            if search.snapshot().session_expired {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }

        assert!(search.snapshot().session_expired);
        assert!(!app.session().is_authenticated());
        assert!(!app.api().has_token());
    }
}
