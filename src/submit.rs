//! Batch submission of a working list.
//!
//! Lines are sent one at a time, in list order, so backend stock changes
//! are applied in a predictable sequence and a failure is attributable to a
//! single line. A failed line never aborts the rest of the batch.

use tracing::{info, warn};

use crate::api::{StockBackend, StockMutation};
use crate::error::{ApiError, SubmitError};
use crate::line_item::clean_notes;
use crate::policy::{DraftKind, RequiredField};
use crate::working_list::WorkingList;

/// Screen-level fields that go with every line of the batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubmissionContext {
    pub supplier: Option<String>,
    /// Used for lines without their own notes.
    pub notes: Option<String>,
}

impl SubmissionContext {
    fn field(&self, field: RequiredField) -> Option<&str> {
        let raw = match field {
            RequiredField::Supplier => self.supplier.as_deref(),
        };
        raw.map(str::trim).filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LineFailure {
    pub line_id: String,
    pub product_name: String,
    pub error: ApiError,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubmissionSummary {
    pub succeeded: usize,
    pub failed: usize,
    /// Lines with a zero quantity, never sent.
    pub skipped: usize,
    /// Value of the successfully sent priced lines.
    pub total_value: Option<f64>,
    pub failures: Vec<LineFailure>,
    pub draft_cleared: bool,
}

impl SubmissionSummary {
    /// `true` when the backend rejected the session during the batch.
    pub fn hit_auth_failure(&self) -> bool {
        self.failures.iter().any(|f| f.error.is_auth_failure())
    }
}

/// Check the preconditions that block a submission before any request.
pub fn validate(list: &WorkingList, ctx: &SubmissionContext) -> Result<(), SubmitError> {
    if list.is_empty() {
        return Err(SubmitError::EmptyList);
    }
    for field in list.policy().required {
        if ctx.field(*field).is_none() {
            return Err(SubmitError::MissingField(field.label()));
        }
    }
    if !list.items().iter().any(|l| l.is_submittable()) {
        return Err(SubmitError::NothingToSubmit);
    }
    Ok(())
}

fn default_notes(kind: DraftKind, ctx: &SubmissionContext) -> String {
    if let Some(notes) = clean_notes(ctx.notes.as_deref()) {
        return notes;
    }
    match (kind, ctx.field(RequiredField::Supplier)) {
        (DraftKind::Reception, Some(supplier)) => format!("Réception - {supplier}"),
        (DraftKind::Reception, None) => "Réception".to_string(),
        (DraftKind::Inventory, _) => "Inventaire".to_string(),
        (DraftKind::Loss, _) => "Perte".to_string(),
        (DraftKind::SalesCart, _) => "Vente".to_string(),
    }
}

/// Send every line with a positive quantity, then clear the list and its
/// draft if at least one line went through. When every line fails the list
/// and draft are left untouched so the operator can retry.
pub async fn submit<B: StockBackend + ?Sized>(
    backend: &B,
    list: &mut WorkingList,
    ctx: &SubmissionContext,
) -> Result<SubmissionSummary, SubmitError> {
    validate(list, ctx)?;

    let kind = list.kind();
    let operation = list.policy().operation;
    let fallback_notes = default_notes(kind, ctx);
    let supplier = ctx.field(RequiredField::Supplier).map(str::to_string);
    let lines = list.items().to_vec();

    info!(draft = kind.key(), lines = lines.len(), "submitting working list");

    let mut summary = SubmissionSummary::default();
    for line in &lines {
        if !line.is_submittable() {
            summary.skipped += 1;
            continue;
        }
        let mutation = StockMutation {
            product_id: line.product.id,
            quantity: line.quantity,
            unit_price: line.unit_price,
            supplier: supplier.clone(),
            notes: line
                .notes
                .clone()
                .unwrap_or_else(|| fallback_notes.clone()),
        };
        match backend.apply_stock(operation, &mutation).await {
            Ok(()) => {
                summary.succeeded += 1;
                if let Some(value) = line.line_total() {
                    summary.total_value = Some(summary.total_value.unwrap_or(0.0) + value);
                }
            }
            Err(error) => {
                warn!(
                    draft = kind.key(),
                    line_id = %line.line_id,
                    product_id = line.product.id,
                    error = %error,
                    "line submission failed"
                );
                summary.failed += 1;
                summary.failures.push(LineFailure {
                    line_id: line.line_id.clone(),
                    product_name: line.product.name.clone(),
                    error,
                });
            }
        }
    }

    if summary.succeeded > 0 {
        list.clear();
        summary.draft_cleared = true;
    }

    info!(
        draft = kind.key(),
        succeeded = summary.succeeded,
        failed = summary.failed,
        skipped = summary.skipped,
        "submission finished"
    );
    Ok(summary)
}
