//! Product records as returned by the stock backend.
//!
//! The backend has shipped several response shapes over time (fields renamed,
//! ids sent as strings, scan results wrapped or bare). Everything is read
//! through the `value_*` helpers here and defaulted once, so the rest of the
//! crate works with plain typed records.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::{value_f64, value_str};

/// How a product is sold: by the piece or by weight.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitKind {
    #[default]
    Piece,
    Weight,
}

impl UnitKind {
    fn from_raw(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "weight" | "poids" | "kg" | "kilogram" | "g" | "gram" => UnitKind::Weight,
            _ => UnitKind::Piece,
        }
    }

    pub fn allows_fraction(self) -> bool {
        matches!(self, UnitKind::Weight)
    }
}

/// Snapshot of a catalog product. Copied into line items; never refreshed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub code: Option<String>,
    /// Stock level known to the backend when the snapshot was taken.
    #[serde(default)]
    pub quantity: f64,
    #[serde(default)]
    pub unit: UnitKind,
    #[serde(default)]
    pub unit_label: Option<String>,
    #[serde(default)]
    pub purchase_price: Option<f64>,
    #[serde(default)]
    pub selling_price: Option<f64>,
    #[serde(default)]
    pub category: Option<String>,
}

impl Product {
    /// Build a product from a backend JSON object. Returns `None` when the
    /// record carries no usable id.
    pub fn from_value(v: &Value) -> Option<Self> {
        let id = product_id(v, &["id", "product_id", "pk"])?;
        let name = value_str(v, &["name", "title", "product_name"])
            .unwrap_or_else(|| format!("Product #{id}"));
        let unit = value_str(v, &["sale_unit_type", "unit_type", "unit_kind"])
            .map(|raw| UnitKind::from_raw(&raw))
            .unwrap_or_default();
        let category = value_str(v, &["category_name"]).or_else(|| {
            v.get("category")
                .and_then(|c| value_str(c, &["name"]).or_else(|| c.as_str().map(str::to_string)))
        });

        Some(Self {
            id,
            name,
            code: value_str(v, &["cug", "barcode", "ean", "code", "sku"]),
            quantity: number(v, &["quantity", "stock", "stock_quantity"])
                .unwrap_or(0.0)
                .max(0.0),
            unit,
            unit_label: value_str(v, &["unit_display", "unit_label", "unit"]),
            purchase_price: number(v, &["purchase_price", "cost_price"]),
            selling_price: number(v, &["selling_price", "sale_price", "price"]),
            category,
        })
    }
}

/// One page of catalog search results.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProductPage {
    pub items: Vec<Product>,
    pub total: Option<u64>,
    pub has_more: bool,
}

impl ProductPage {
    /// Parse a paginated (`{count, next, results}`) or bare-array response.
    pub fn from_value(v: &Value, page: u32, page_size: u32) -> Self {
        let rows = match v {
            Value::Array(arr) => arr.as_slice(),
            _ => ["results", "products", "data"]
                .iter()
                .find_map(|k| v.get(*k).and_then(Value::as_array))
                .map(Vec::as_slice)
                .unwrap_or(&[]),
        };

        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            match Product::from_value(row) {
                Some(p) => items.push(p),
                None => warn!("search result without product id skipped"),
            }
        }

        let total = v
            .get("count")
            .or_else(|| v.get("total"))
            .and_then(Value::as_u64);
        let has_more = match v.get("next") {
            Some(Value::Null) => false,
            Some(Value::String(s)) => !s.trim().is_empty(),
            _ => match total {
                Some(t) => u64::from(page) * u64::from(page_size) < t,
                None => items.len() as u32 >= page_size && page_size > 0,
            },
        };

        Self {
            items,
            total,
            has_more,
        }
    }
}

/// Raw result of the barcode lookup endpoint.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanHit {
    pub product_id: Option<i64>,
    /// Product embedded in the scan response, usually with fewer fields than
    /// the detail endpoint returns.
    pub partial: Option<Product>,
}

impl ScanHit {
    /// Parse `{product: {...}}`, `{product_id: n}` or a bare product object.
    /// Returns `None` for explicit misses (`{found: false}`) or shapes that
    /// carry no product at all.
    pub fn from_value(v: &Value) -> Option<Self> {
        if v.get("found").and_then(Value::as_bool) == Some(false) {
            return None;
        }
        let partial = v
            .get("product")
            .and_then(Product::from_value)
            .or_else(|| v.get("id").and_then(|_| Product::from_value(v)));
        let product_id = product_id(v, &["product_id"]).or(partial.as_ref().map(|p| p.id));
        if product_id.is_none() && partial.is_none() {
            return None;
        }
        Some(Self {
            product_id,
            partial,
        })
    }
}

fn product_id(v: &Value, keys: &[&str]) -> Option<i64> {
    for key in keys {
        match v.get(*key) {
            Some(Value::Number(n)) => {
                if let Some(id) = n.as_i64() {
                    return Some(id);
                }
            }
            Some(Value::String(s)) => {
                if let Ok(id) = s.trim().parse::<i64>() {
                    return Some(id);
                }
            }
            _ => {}
        }
    }
    None
}

/// Numbers come back as JSON numbers or as decimal strings ("1500.00").
fn number(v: &Value, keys: &[&str]) -> Option<f64> {
    value_f64(v, keys).or_else(|| {
        value_str(v, keys).and_then(|s| s.replace(',', ".").parse::<f64>().ok())
    })
}

#[cfg(test)]
pub(crate) fn sample(id: i64, name: &str, quantity: f64) -> Product {
    Product {
        id,
        name: name.to_string(),
        code: Some(format!("223{id:010}")),
        quantity,
        unit: UnitKind::Piece,
        unit_label: None,
        purchase_price: Some(1000.0),
        selling_price: Some(1500.0),
        category: None,
    }
}
