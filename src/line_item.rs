//! Line items of a working list and quantity parsing.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ListError;
use crate::product::{Product, UnitKind};

/// How a line entered the list. Scan-originated lines re-open the scanner
/// once their quantity is committed; search-originated lines do not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OriginTag {
    Scan,
    Search,
}

/// One product entry in a reception, inventory, loss or cart list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub line_id: String,
    pub product: Product,
    pub quantity: f64,
    #[serde(default)]
    pub unit_price: Option<f64>,
    #[serde(default)]
    pub notes: Option<String>,
    pub origin: OriginTag,
    pub added_at: String,
}

impl LineItem {
    pub fn new(product: Product, quantity: f64, origin: OriginTag) -> Self {
        Self {
            line_id: Uuid::new_v4().to_string(),
            product,
            quantity,
            unit_price: None,
            notes: None,
            origin,
            added_at: Utc::now().to_rfc3339(),
        }
    }

    /// `unit_price * quantity`, when the line carries a price.
    pub fn line_total(&self) -> Option<f64> {
        self.unit_price.map(|price| price * self.quantity)
    }

    pub fn is_submittable(&self) -> bool {
        self.quantity > 0.0
    }
}

/// Normalize optional free text: trimmed, empty becomes `None`.
pub(crate) fn clean_notes(notes: Option<&str>) -> Option<String> {
    notes
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Parse a quantity typed by the operator.
///
/// Accepts `,` or `.` as decimal separator. Whole-unit products reject
/// fractional values instead of rounding them.
pub fn parse_quantity(text: &str, unit: UnitKind) -> Result<f64, ListError> {
    let normalized = text.trim().replace(',', ".");
    if normalized.is_empty() {
        return Err(ListError::InvalidQuantity("empty".into()));
    }
    let value: f64 = normalized
        .parse()
        .map_err(|_| ListError::InvalidQuantity(text.trim().to_string()))?;
    validate_quantity(value, unit)
}

pub(crate) fn validate_quantity(value: f64, unit: UnitKind) -> Result<f64, ListError> {
    if !value.is_finite() || value < 0.0 {
        return Err(ListError::InvalidQuantity(value.to_string()));
    }
    if !unit.allows_fraction() && value.fract() != 0.0 {
        return Err(ListError::FractionalQuantity {
            unit: "Piece".into(),
        });
    }
    Ok(value)
}
