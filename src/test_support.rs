//! In-memory `StockBackend` used by the controller, scan, search and
//! submission tests.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

use crate::api::{StockBackend, StockMutation};
use crate::error::ApiError;
use crate::policy::StockOperation;
use crate::product::{Product, ProductPage, ScanHit};

#[derive(Default)]
pub(crate) struct FakeBackend {
    catalog: Mutex<Vec<Product>>,
    details: Mutex<HashMap<i64, Product>>,
    scans: Mutex<HashMap<String, ScanHit>>,
    failing_products: Mutex<HashSet<i64>>,
    applied: Mutex<Vec<(StockOperation, StockMutation)>>,
    searches: Mutex<Vec<(String, u32)>>,
    scan_calls: AtomicUsize,
    stock_calls: AtomicUsize,
    fail_scans: AtomicBool,
    fail_search: AtomicBool,
    unauthorized: AtomicBool,
    scan_gate: Mutex<Option<Arc<Notify>>>,
}

impl FakeBackend {
    pub fn with_product(&self, product: Product) {
        self.details.lock().unwrap().insert(product.id, product);
    }

    pub fn with_catalog(&self, products: Vec<Product>) {
        *self.catalog.lock().unwrap() = products;
    }

    pub fn with_scan(&self, code: &str, product_id: Option<i64>, partial: Option<Product>) {
        self.scans.lock().unwrap().insert(
            code.to_string(),
            ScanHit {
                product_id,
                partial,
            },
        );
    }

    pub fn fail_scans(&self) {
        self.fail_scans.store(true, Ordering::SeqCst);
    }

    pub fn fail_search(&self, fail: bool) {
        self.fail_search.store(fail, Ordering::SeqCst);
    }

    pub fn fail_stock_for(&self, product_id: i64) {
        self.failing_products.lock().unwrap().insert(product_id);
    }

    /// Every call answers 401 from now on.
    pub fn reject_session(&self) {
        self.unauthorized.store(true, Ordering::SeqCst);
    }

    /// Scan lookups wait for a notification on the returned handle before
    /// answering.
    pub fn hold_scans(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.scan_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    fn check_session(&self) -> Result<(), ApiError> {
        if self.unauthorized.load(Ordering::SeqCst) {
            return Err(ApiError::Unauthorized);
        }
        Ok(())
    }

    pub fn scan_calls(&self) -> usize {
        self.scan_calls.load(Ordering::SeqCst)
    }

    pub fn stock_calls(&self) -> usize {
        self.stock_calls.load(Ordering::SeqCst)
    }

    /// `(query, page)` of every search request, in call order.
    pub fn searches(&self) -> Vec<(String, u32)> {
        self.searches.lock().unwrap().clone()
    }

    pub fn applied(&self) -> Vec<(StockOperation, StockMutation)> {
        self.applied.lock().unwrap().clone()
    }
}

#[async_trait]
impl StockBackend for FakeBackend {
    async fn search_products(
        &self,
        query: &str,
        page: u32,
        page_size: u32,
    ) -> Result<ProductPage, ApiError> {
        self.searches
            .lock()
            .unwrap()
            .push((query.to_string(), page));
        self.check_session()?;
        if self.fail_search.load(Ordering::SeqCst) {
            return Err(ApiError::Timeout("fake".into()));
        }
        let needle = query.to_lowercase();
        let matches: Vec<Product> = self
            .catalog
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.name.to_lowercase().contains(&needle))
            .cloned()
            .collect();
        let start = ((page.max(1) - 1) * page_size) as usize;
        let items: Vec<Product> = matches
            .iter()
            .skip(start)
            .take(page_size as usize)
            .cloned()
            .collect();
        Ok(ProductPage {
            has_more: start + items.len() < matches.len(),
            total: Some(matches.len() as u64),
            items,
        })
    }

    async fn get_product(&self, id: i64) -> Result<Product, ApiError> {
        self.check_session()?;
        self.details
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(|| ApiError::NotFound(format!("product {id}")))
    }

    async fn scan_product(&self, code: &str) -> Result<Option<ScanHit>, ApiError> {
        self.scan_calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.scan_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.check_session()?;
        if self.fail_scans.load(Ordering::SeqCst) {
            return Err(ApiError::Unreachable("fake".into()));
        }
        Ok(self.scans.lock().unwrap().get(code).cloned())
    }

    async fn apply_stock(
        &self,
        operation: StockOperation,
        mutation: &StockMutation,
    ) -> Result<(), ApiError> {
        self.stock_calls.fetch_add(1, Ordering::SeqCst);
        self.check_session()?;
        if self
            .failing_products
            .lock()
            .unwrap()
            .contains(&mutation.product_id)
        {
            return Err(ApiError::Status {
                status: 400,
                message: "stock mutation refused".into(),
            });
        }
        self.applied
            .lock()
            .unwrap()
            .push((operation, mutation.clone()));
        Ok(())
    }
}
