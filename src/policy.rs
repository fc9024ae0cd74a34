//! Per-screen behaviour of a working list.
//!
//! Reception, inventory, loss and the sales cart share one controller; the
//! differences live in a `ListPolicy` picked from the draft kind.

use serde::{Deserialize, Serialize};

use crate::product::Product;

/// Which screen a working list belongs to. Also the draft namespace key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DraftKind {
    Reception,
    Inventory,
    Loss,
    SalesCart,
}

impl DraftKind {
    pub const ALL: [DraftKind; 4] = [
        DraftKind::Reception,
        DraftKind::Inventory,
        DraftKind::Loss,
        DraftKind::SalesCart,
    ];

    /// Storage key of this kind's draft.
    pub fn key(self) -> &'static str {
        match self {
            DraftKind::Reception => "reception",
            DraftKind::Inventory => "inventory",
            DraftKind::Loss => "loss",
            DraftKind::SalesCart => "sales_cart",
        }
    }
}

/// What happens when a product already in the list is added again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergePolicy {
    /// Add the new quantity to the existing line.
    Increment,
    /// Leave the count alone and move focus to the existing line.
    FocusExisting,
    /// Add one unit, never beyond the product's known stock.
    IncrementBounded,
}

/// Backend stock mutation a submitted line turns into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockOperation {
    Reception,
    InventoryAdjustment,
    Loss,
    Sale,
}

/// Screen-level field that must be filled before submitting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequiredField {
    Supplier,
}

impl RequiredField {
    pub fn label(self) -> &'static str {
        match self {
            RequiredField::Supplier => "supplier",
        }
    }
}

/// Which catalog price a new line starts with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceSource {
    None,
    Purchase,
    Selling,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ListPolicy {
    pub kind: DraftKind,
    pub merge: MergePolicy,
    pub required: &'static [RequiredField],
    pub operation: StockOperation,
    pub price_source: PriceSource,
}

impl ListPolicy {
    pub fn for_kind(kind: DraftKind) -> Self {
        match kind {
            DraftKind::Reception => Self {
                kind,
                merge: MergePolicy::Increment,
                required: &[RequiredField::Supplier],
                operation: StockOperation::Reception,
                price_source: PriceSource::Purchase,
            },
            DraftKind::Inventory => Self {
                kind,
                merge: MergePolicy::FocusExisting,
                required: &[],
                operation: StockOperation::InventoryAdjustment,
                price_source: PriceSource::None,
            },
            DraftKind::Loss => Self {
                kind,
                merge: MergePolicy::Increment,
                required: &[],
                operation: StockOperation::Loss,
                price_source: PriceSource::None,
            },
            DraftKind::SalesCart => Self {
                kind,
                merge: MergePolicy::IncrementBounded,
                required: &[],
                operation: StockOperation::Sale,
                price_source: PriceSource::Selling,
            },
        }
    }

    pub fn default_price(&self, product: &Product) -> Option<f64> {
        match self.price_source {
            PriceSource::None => None,
            PriceSource::Purchase => product.purchase_price,
            PriceSource::Selling => product.selling_price,
        }
    }

    /// Whether quantities are capped by the product's known stock.
    pub fn is_stock_bounded(&self) -> bool {
        matches!(self.merge, MergePolicy::IncrementBounded)
    }
}
