use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Processing,
    Shipping,
    Delivered,
    Cancelled,
    /// Terminal state for point-of-sale transactions.
    Completed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub customer_id: String,
    pub vendor_id: String,
    #[serde(default)]
    pub total_amount: f64,
    pub status: OrderStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl Order {
    /// POS entries are recorded with the vendor as their own customer.
    pub fn is_self_service(&self) -> bool {
        self.customer_id == self.vendor_id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// Row change for the `orders` table, in database webhook shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderChange {
    #[serde(rename = "type")]
    pub kind: ChangeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    #[serde(default)]
    pub record: Option<Order>,
    #[serde(default)]
    pub old_record: Option<Order>,
}

impl OrderChange {
    pub fn inserted(order: Order) -> Self {
        Self {
            kind: ChangeKind::Insert,
            table: Some("orders".to_string()),
            record: Some(order),
            old_record: None,
        }
    }

    pub fn vendor_id(&self) -> Option<&str> {
        self.record
            .as_ref()
            .or(self.old_record.as_ref())
            .map(|order| order.vendor_id.as_str())
    }
}
