//! Typed views of the stored entities.
//!
//! The store and the sync path treat entities as opaque documents; these
//! types are for callers that want fields by name. Anything not modelled
//! lands in `extra` and survives a round trip.

use crate::error::CoreResult;
use crate::types::Document;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Fixed key of the business profile in the `business` collection.
pub const CURRENT_BUSINESS: &str = "current_business";

fn yes() -> bool {
    true
}

fn one() -> f64 {
    1.0
}

/// Whether a party buys from us, sells to us, or both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartyType {
    /// Buys from the business.
    #[default]
    Customer,
    /// Sells to the business.
    Supplier,
    /// Both.
    Both,
}

/// A customer or supplier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Party {
    /// Client-assigned identifier.
    #[serde(rename = "_id")]
    pub id: String,
    /// Display name.
    pub name: String,
    /// Relationship.
    #[serde(rename = "type", default)]
    pub party_type: PartyType,
    /// Phone number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    /// Email address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Postal address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    /// Positive when receivable, negative when payable.
    #[serde(default)]
    pub balance: f64,
    /// Soft-delete flag.
    #[serde(default = "yes")]
    pub is_active: bool,
    /// Creation time, RFC 3339.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    /// Last modification time, RFC 3339.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    /// Unmodelled fields.
    #[serde(flatten)]
    pub extra: Document,
}

/// One purchase lot of a product.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Batch {
    /// Lot code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_code: Option<String>,
    /// Quantity on hand.
    #[serde(default)]
    pub quantity: f64,
    /// Quantity when the lot was received.
    #[serde(default)]
    pub initial_quantity: f64,
    /// Expiry date.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<String>,
    /// Cost per unit.
    #[serde(default)]
    pub purchase_price: f64,
    /// Retail price per unit.
    #[serde(default)]
    pub sale_price: f64,
    /// Wholesale price per unit.
    #[serde(default)]
    pub wholesale_price: f64,
    /// Damaged units written off.
    #[serde(default)]
    pub damage: f64,
}

/// A stocked item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    /// Client-assigned identifier.
    #[serde(rename = "_id")]
    pub id: String,
    /// Display name.
    pub name: String,
    /// Name in Urdu.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_urdu: Option<String>,
    /// Image URL or small base64 payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Manufacturer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_id: Option<String>,
    /// Unit stock is counted in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_unit_id: Option<String>,
    /// Larger packing unit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary_unit_id: Option<String>,
    /// Base units per secondary unit.
    #[serde(default = "one")]
    pub conversion_rate: f64,
    /// Barcode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub barcode: Option<String>,
    /// Stock entered when the product was created.
    #[serde(default)]
    pub opening_stock: f64,
    /// Stock received through purchases.
    #[serde(default)]
    pub purchased_stock: f64,
    /// Stock sold at the till.
    #[serde(default)]
    pub sold_stock: f64,
    /// Stock written off.
    #[serde(default)]
    pub damaged_stock: f64,
    /// Cached stock on hand.
    #[serde(default)]
    pub total_quantity: f64,
    /// Purchase lots.
    #[serde(default)]
    pub batches: Vec<Batch>,
    /// Soft-delete flag.
    #[serde(default = "yes")]
    pub is_active: bool,
    /// Creation time, RFC 3339.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    /// Last modification time, RFC 3339.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    /// Unmodelled fields.
    #[serde(flatten)]
    pub extra: Document,
}

impl Product {
    /// Stock implied by the movement counters.
    #[must_use]
    pub fn derived_quantity(&self) -> f64 {
        self.opening_stock + self.purchased_stock - self.sold_stock - self.damaged_stock
    }
}

/// Reference data with just a name: units and companies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NamedRef {
    /// Client-assigned identifier.
    #[serde(rename = "_id")]
    pub id: String,
    /// Display name.
    pub name: String,
    /// Soft-delete flag.
    #[serde(default = "yes")]
    pub is_active: bool,
    /// Unmodelled fields.
    #[serde(flatten)]
    pub extra: Document,
}

/// A unit of measure, such as "Kg" or "Carton".
pub type Unit = NamedRef;

/// A manufacturer or brand.
pub type Company = NamedRef;

/// The business profile pulled during bootstrap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Business {
    /// Always [`CURRENT_BUSINESS`] locally.
    pub id: String,
    /// Trading name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub business_name: Option<String>,
    /// Distributor, wholesaler or retailer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub business_type: Option<String>,
    /// Enabled feature modules.
    #[serde(default)]
    pub modules: Vec<String>,
    /// Unmodelled fields.
    #[serde(flatten)]
    pub extra: Document,
}

/// Converts a stored document into a typed entity.
pub fn from_document<T: DeserializeOwned>(document: Document) -> CoreResult<T> {
    Ok(serde_json::from_value(Value::Object(document))?)
}
