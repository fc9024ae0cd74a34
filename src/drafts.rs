//! Draft persistence for in-progress working lists.
//!
//! Best effort: a lost draft is acceptable, a failing screen is not. Every
//! error is logged here and never returned to the caller, and an unreadable
//! draft is reported as "no draft".

use std::sync::Arc;
use tracing::{debug, warn};

use crate::db::{self, DbState};
use crate::line_item::LineItem;
use crate::policy::DraftKind;

#[derive(Clone)]
pub struct DraftStore {
    db: Arc<DbState>,
}

impl DraftStore {
    pub fn new(db: Arc<DbState>) -> Self {
        Self { db }
    }

    /// Serialize `items` and overwrite the draft for `kind`.
    pub fn save(&self, kind: DraftKind, items: &[LineItem]) {
        let payload = match serde_json::to_string(items) {
            Ok(p) => p,
            Err(e) => {
                warn!(draft = kind.key(), error = %e, "draft serialize failed, save skipped");
                return;
            }
        };
        let conn = match self.db.conn.lock() {
            Ok(c) => c,
            Err(e) => {
                warn!(draft = kind.key(), error = %e, "draft store lock poisoned, save skipped");
                return;
            }
        };
        match db::write_draft(&conn, kind.key(), &payload, items.len()) {
            Ok(()) => debug!(draft = kind.key(), items = items.len(), "draft saved"),
            Err(e) => warn!(draft = kind.key(), error = %e, "draft save failed"),
        }
    }

    /// Previously saved list, or `None` when absent or unreadable.
    pub fn load(&self, kind: DraftKind) -> Option<Vec<LineItem>> {
        let raw = {
            let conn = match self.db.conn.lock() {
                Ok(c) => c,
                Err(e) => {
                    warn!(draft = kind.key(), error = %e, "draft store lock poisoned");
                    return None;
                }
            };
            match db::read_draft(&conn, kind.key()) {
                Ok(raw) => raw?,
                Err(e) => {
                    warn!(draft = kind.key(), error = %e, "draft read failed");
                    return None;
                }
            }
        };
        match serde_json::from_str::<Vec<LineItem>>(&raw) {
            Ok(items) => Some(items),
            Err(e) => {
                warn!(draft = kind.key(), error = %e, "draft unreadable, treating as absent");
                None
            }
        }
    }

    /// Remove the draft for `kind`. No-op when nothing is stored.
    pub fn clear(&self, kind: DraftKind) {
        let conn = match self.db.conn.lock() {
            Ok(c) => c,
            Err(e) => {
                warn!(draft = kind.key(), error = %e, "draft store lock poisoned, clear skipped");
                return;
            }
        };
        if let Err(e) = db::delete_draft(&conn, kind.key()) {
            warn!(draft = kind.key(), error = %e, "draft clear failed");
        }
    }

    /// `true` when a non-empty draft is waiting to be resumed.
    pub fn has_draft(&self, kind: DraftKind) -> bool {
        self.load(kind).is_some_and(|items| !items.is_empty())
    }
}
