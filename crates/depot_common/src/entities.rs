//! Entity snapshots stored locally and replayed to the backend
//!
//! These are plain value records. The sync core only needs them to be
//! serializable and to expose an id; it never inspects business fields.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::DepotError;

/// Logical entity-type name, also used as the storage key of its snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Clients,
    Products,
    Sales,
    StockMovements,
}

impl Collection {
    pub const ALL: [Collection; 4] = [
        Collection::Clients,
        Collection::Products,
        Collection::Sales,
        Collection::StockMovements,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Clients => "clients",
            Collection::Products => "products",
            Collection::Sales => "sales",
            Collection::StockMovements => "stock_movements",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Collection {
    type Err = DepotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Collection::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| DepotError::ValidationError(format!("unknown collection '{}'", s)))
    }
}

/// A record type that lives in one collection and is keyed by a string id
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const COLLECTION: Collection;

    fn id(&self) -> &str;
}

/// User who registered a sale or stock movement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedBy {
    pub uid: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Client {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    pub registered_at: DateTime<Utc>,
    #[serde(default)]
    pub total_purchases: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_purchase: Option<DateTime<Utc>>,
}

impl Client {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            last_name: None,
            email: None,
            phone: None,
            document_id: None,
            address: None,
            registered_at: Utc::now(),
            total_purchases: 0,
            last_purchase: None,
        }
    }
}

impl Entity for Client {
    const COLLECTION: Collection = Collection::Clients;

    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub price: f64,
    pub category: String,
    pub stock: i64,
    #[serde(default)]
    pub min_stock: i64,
    #[serde(default = "default_active")]
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

fn default_active() -> bool {
    true
}

impl Product {
    pub fn new(id: impl Into<String>, name: impl Into<String>, price: f64) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            price,
            category: String::new(),
            stock: 0,
            min_stock: 0,
            active: true,
            created_at: Utc::now(),
        }
    }

    pub fn is_low_stock(&self) -> bool {
        self.stock <= self.min_stock
    }
}

impl Entity for Product {
    const COLLECTION: Collection = Collection::Products;

    fn id(&self) -> &str {
        &self.id
    }
}

/// One product line of a sale
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleLine {
    pub product_id: String,
    pub name: String,
    pub quantity: u32,
    pub unit_price: f64,
    pub subtotal: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sale {
    pub id: String,
    pub client_id: String,
    pub lines: Vec<SaleLine>,
    pub total: f64,
    pub date: DateTime<Utc>,
    pub recorded_by: RecordedBy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl Entity for Sale {
    const COLLECTION: Collection = Collection::Sales;

    fn id(&self) -> &str {
        &self.id
    }
}

/// Direction of a stock movement; selects the backend endpoint on replay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementKind {
    Entry,
    Exit,
    DirectSale,
}

impl MovementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementKind::Entry => "entry",
            MovementKind::Exit => "exit",
            MovementKind::DirectSale => "direct_sale",
        }
    }
}

impl fmt::Display for MovementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MovementKind {
    type Err = DepotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "entry" => Ok(MovementKind::Entry),
            "exit" => Ok(MovementKind::Exit),
            "direct_sale" => Ok(MovementKind::DirectSale),
            other => Err(DepotError::ValidationError(format!(
                "unknown movement kind '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockMovement {
    pub id: String,
    pub product_id: String,
    pub kind: MovementKind,
    pub quantity: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub date: DateTime<Utc>,
    pub recorded_by: RecordedBy,
}

impl Entity for StockMovement {
    const COLLECTION: Collection = Collection::StockMovements;

    fn id(&self) -> &str {
        &self.id
    }
}
