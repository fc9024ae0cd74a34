//! Working-list controller shared by the reception, inventory, loss and
//! sales-cart screens.
//!
//! Holds the in-memory lines, applies the screen's merge policy, stages
//! quantity text while the operator types, and writes the whole list to the
//! draft store after every mutation.

use std::collections::HashMap;
use tracing::{debug, info};

use crate::drafts::DraftStore;
use crate::error::ListError;
use crate::line_item::{clean_notes, parse_quantity, validate_quantity, LineItem, OriginTag};
use crate::policy::{DraftKind, ListPolicy, MergePolicy};
use crate::product::Product;

/// Identifies the screen instance a scan was started from. A result carrying
/// an outdated ticket is dropped instead of being applied to a later list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListTicket {
    kind: DraftKind,
    generation: u64,
}

/// A product the operator wants in the list.
#[derive(Debug, Clone, PartialEq)]
pub struct AddRequest {
    pub quantity: f64,
    pub notes: Option<String>,
    pub origin: OriginTag,
}

impl AddRequest {
    pub fn scanned(quantity: f64) -> Self {
        Self {
            quantity,
            notes: None,
            origin: OriginTag::Scan,
        }
    }

    pub fn searched(quantity: f64) -> Self {
        Self {
            quantity,
            notes: None,
            origin: OriginTag::Search,
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AddOutcome {
    Created { line_id: String },
    Merged { line_id: String, quantity: f64 },
    /// Product already counted; focus moved to its line, nothing changed.
    Focused { line_id: String },
    /// The screen the request came from is gone; nothing applied.
    Stale,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommitOutcome {
    pub line_id: String,
    pub quantity: f64,
    /// Re-open the scanner so the operator can keep the scan/count rhythm.
    pub resume_scanner: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ListTotals {
    pub lines: usize,
    pub quantity: f64,
    /// Sum of priced lines; `None` when no line carries a price.
    pub value: Option<f64>,
}

pub struct WorkingList {
    policy: ListPolicy,
    drafts: DraftStore,
    items: Vec<LineItem>,
    pending_text: HashMap<String, String>,
    focused: Option<String>,
    generation: u64,
    resumed: bool,
}

impl WorkingList {
    /// Open the list for a screen, resuming its draft when one exists.
    pub fn open(kind: DraftKind, drafts: DraftStore) -> Self {
        let items = drafts.load(kind).unwrap_or_default();
        let resumed = !items.is_empty();
        if resumed {
            info!(draft = kind.key(), lines = items.len(), "resuming working list from draft");
        }
        Self {
            policy: ListPolicy::for_kind(kind),
            drafts,
            items,
            pending_text: HashMap::new(),
            focused: None,
            generation: 0,
            resumed,
        }
    }

    pub fn kind(&self) -> DraftKind {
        self.policy.kind
    }

    pub fn policy(&self) -> &ListPolicy {
        &self.policy
    }

    pub fn items(&self) -> &[LineItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// `true` when the list was restored from an interrupted session.
    pub fn was_resumed(&self) -> bool {
        self.resumed
    }

    pub fn line(&self, line_id: &str) -> Option<&LineItem> {
        self.items.iter().find(|l| l.line_id == line_id)
    }

    pub fn focused(&self) -> Option<&str> {
        self.focused.as_deref()
    }

    pub fn ticket(&self) -> ListTicket {
        ListTicket {
            kind: self.policy.kind,
            generation: self.generation,
        }
    }

    /// The screen was left: outstanding tickets become stale and staged text
    /// is dropped. Lines and draft stay.
    pub fn close(&mut self) {
        self.generation += 1;
        self.pending_text.clear();
        self.focused = None;
    }

    /// Add a product, merging with an existing line per the screen policy.
    pub fn add_product(
        &mut self,
        product: Product,
        request: AddRequest,
    ) -> Result<AddOutcome, ListError> {
        let quantity = validate_quantity(request.quantity, product.unit)?;
        let notes = clean_notes(request.notes.as_deref());

        if let Some(idx) = self.items.iter().position(|l| l.product.id == product.id) {
            let outcome = match self.policy.merge {
                MergePolicy::FocusExisting => {
                    let line_id = self.items[idx].line_id.clone();
                    debug!(line_id = %line_id, product_id = product.id, "already counted, focusing line");
                    self.focused = Some(line_id.clone());
                    return Ok(AddOutcome::Focused { line_id });
                }
                MergePolicy::Increment => {
                    let line = &mut self.items[idx];
                    line.quantity += quantity;
                    if notes.is_some() {
                        line.notes = notes;
                    }
                    AddOutcome::Merged {
                        line_id: line.line_id.clone(),
                        quantity: line.quantity,
                    }
                }
                MergePolicy::IncrementBounded => {
                    let line = &mut self.items[idx];
                    let next = line.quantity + 1.0;
                    ensure_available(&product, next)?;
                    line.quantity = next;
                    if notes.is_some() {
                        line.notes = notes;
                    }
                    AddOutcome::Merged {
                        line_id: line.line_id.clone(),
                        quantity: line.quantity,
                    }
                }
            };
            if let AddOutcome::Merged { line_id, .. } = &outcome {
                self.focused = Some(line_id.clone());
            }
            self.persist();
            return Ok(outcome);
        }

        if self.policy.is_stock_bounded() {
            ensure_available(&product, quantity)?;
        }

        let mut line = LineItem::new(product, quantity, request.origin);
        line.unit_price = self.policy.default_price(&line.product);
        line.notes = notes;
        let line_id = line.line_id.clone();
        debug!(
            draft = self.policy.kind.key(),
            line_id = %line_id,
            product_id = line.product.id,
            quantity,
            "line added"
        );
        self.items.push(line);
        self.focused = Some(line_id.clone());
        self.persist();
        Ok(AddOutcome::Created { line_id })
    }

    /// Apply a product resolved asynchronously, unless the screen it was
    /// requested from has since been closed.
    pub fn apply_resolved(
        &mut self,
        ticket: ListTicket,
        product: Product,
        request: AddRequest,
    ) -> Result<AddOutcome, ListError> {
        if ticket != self.ticket() {
            debug!(
                draft = self.policy.kind.key(),
                product_id = product.id,
                "late lookup result discarded"
            );
            return Ok(AddOutcome::Stale);
        }
        self.add_product(product, request)
    }

    /// Keep the raw text of a quantity field while the operator is typing.
    pub fn stage_quantity_text(&mut self, line_id: &str, text: &str) -> Result<(), ListError> {
        self.index_of(line_id)?;
        self.pending_text
            .insert(line_id.to_string(), text.to_string());
        Ok(())
    }

    pub fn pending_text(&self, line_id: &str) -> Option<&str> {
        self.pending_text.get(line_id).map(String::as_str)
    }

    /// Commit staged text into the line's quantity (field blurred or
    /// submitted). Invalid text stays staged so it can be corrected.
    pub fn commit_quantity(&mut self, line_id: &str) -> Result<CommitOutcome, ListError> {
        let idx = self.index_of(line_id)?;
        if let Some(text) = self.pending_text.get(line_id) {
            let line = &self.items[idx];
            let quantity = parse_quantity(text, line.product.unit)?;
            if self.policy.is_stock_bounded() {
                ensure_available(&line.product, quantity)?;
            }
            self.pending_text.remove(line_id);
            self.items[idx].quantity = quantity;
            self.persist();
        }
        let line = &self.items[idx];
        Ok(CommitOutcome {
            line_id: line.line_id.clone(),
            quantity: line.quantity,
            resume_scanner: line.origin == OriginTag::Scan,
        })
    }

    pub fn set_quantity(&mut self, line_id: &str, quantity: f64) -> Result<(), ListError> {
        let idx = self.index_of(line_id)?;
        let line = &self.items[idx];
        let quantity = validate_quantity(quantity, line.product.unit)?;
        if self.policy.is_stock_bounded() {
            ensure_available(&line.product, quantity)?;
        }
        self.items[idx].quantity = quantity;
        self.pending_text.remove(line_id);
        self.persist();
        Ok(())
    }

    pub fn set_notes(&mut self, line_id: &str, notes: Option<&str>) -> Result<(), ListError> {
        let idx = self.index_of(line_id)?;
        self.items[idx].notes = clean_notes(notes);
        self.persist();
        Ok(())
    }

    pub fn set_unit_price(&mut self, line_id: &str, price: Option<f64>) -> Result<(), ListError> {
        let idx = self.index_of(line_id)?;
        if let Some(p) = price {
            if !p.is_finite() || p < 0.0 {
                return Err(ListError::InvalidPrice(p.to_string()));
            }
        }
        self.items[idx].unit_price = price;
        self.persist();
        Ok(())
    }

    /// Remove one line. Returns `false` when the line does not exist.
    pub fn remove(&mut self, line_id: &str) -> bool {
        let before = self.items.len();
        self.items.retain(|l| l.line_id != line_id);
        if self.items.len() == before {
            return false;
        }
        self.pending_text.remove(line_id);
        if self.focused.as_deref() == Some(line_id) {
            self.focused = None;
        }
        self.persist();
        true
    }

    /// Drop every line and the stored draft.
    pub fn clear(&mut self) {
        self.items.clear();
        self.pending_text.clear();
        self.focused = None;
        self.resumed = false;
        self.drafts.clear(self.policy.kind);
        info!(draft = self.policy.kind.key(), "working list cleared");
    }

    pub fn totals(&self) -> ListTotals {
        let mut totals = ListTotals {
            lines: self.items.len(),
            ..ListTotals::default()
        };
        for line in &self.items {
            totals.quantity += line.quantity;
            if let Some(t) = line.line_total() {
                totals.value = Some(totals.value.unwrap_or(0.0) + t);
            }
        }
        totals
    }

    fn index_of(&self, line_id: &str) -> Result<usize, ListError> {
        self.items
            .iter()
            .position(|l| l.line_id == line_id)
            .ok_or_else(|| ListError::LineNotFound(line_id.to_string()))
    }

    fn persist(&self) {
        self.drafts.save(self.policy.kind, &self.items);
    }
}

fn ensure_available(product: &Product, requested: f64) -> Result<(), ListError> {
    if requested > product.quantity {
        return Err(ListError::ExceedsAvailable {
            available: product.quantity,
            requested,
        });
    }
    Ok(())
}
