use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize, Serializer};

/// Timestamp layout used by the raw exports and the master sheet.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Sentinel product name for sessions that never converted.
pub const NO_PURCHASE: &str = "No Purchase";

/// One browsing visit exactly as it appears in the sessions export.
/// `created_at` stays a string until the normalizer parses it; full-row
/// equality drives deduplication.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionRow {
    pub session_id: u64,
    pub user_id: Option<u64>,
    pub created_at: String,
    pub device_type: String,
    pub http_referer: Option<String>,
    pub utm_source: Option<String>,
    pub utm_campaign: Option<String>,
    pub utm_content: Option<String>,
}

/// A session after normalization: timestamp parsed, attribution resolved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: u64,
    pub user_id: Option<u64>,
    pub created_at: NaiveDateTime,
    pub device_type: String,
    pub http_referer: Option<String>,
    pub utm_source: String,
    pub utm_campaign: String,
    pub utm_content: Option<String>,
}

/// One completed transaction as it appears in the orders export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRow {
    pub order_id: u64,
    pub created_at: String,
    pub session_id: u64,
    pub user_id: Option<u64>,
    pub primary_product_id: u64,
    pub items_purchased: u32,
    pub price_usd: Option<f64>,
    pub cogs_usd: Option<f64>,
}

/// An order after enrichment: identifiers repaired, financials imputed,
/// refunds rolled up to order granularity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub order_id: u64,
    pub created_at: NaiveDateTime,
    pub session_id: u64,
    pub user_id: Option<u64>,
    pub primary_product_id: u64,
    pub items_purchased: u32,
    pub price_usd: f64,
    pub cogs_usd: f64,
    pub refund_amount_usd: f64,
    pub is_refunded: bool,
}

/// One item-level refund event, many-to-one into an order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundLine {
    pub order_id: u64,
    pub refund_amount_usd: f64,
}

/// Static catalog entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub product_id: u64,
    pub product_name: String,
}

/// The master-sheet row: one per input session, left-joined with at most
/// one order and that order's product. Flags serialize as 0/1 and
/// timestamps in the export layout, matching what the dashboard reads.
#[derive(Debug, Clone, Serialize)]
pub struct ReconciledRecord {
    pub session_id: u64,
    pub user_id: Option<u64>,
    #[serde(serialize_with = "serialize_timestamp")]
    pub created_at: NaiveDateTime,
    pub device_type: String,
    pub http_referer: Option<String>,
    pub utm_source: String,
    pub utm_campaign: String,
    pub utm_content: Option<String>,
    pub order_id: Option<u64>,
    pub price_usd: f64,
    pub cogs_usd: f64,
    pub refund_amount_usd: f64,
    #[serde(serialize_with = "serialize_flag")]
    pub is_refunded: bool,
    pub items_purchased: u32,
    pub product_name: String,
    #[serde(serialize_with = "serialize_flag")]
    pub is_conversion: bool,
    pub adjusted_net_profit: f64,
    pub month_year: String,
}

fn serialize_flag<S: Serializer>(value: &bool, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u8(u8::from(*value))
}

fn serialize_timestamp<S: Serializer>(
    value: &NaiveDateTime,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&value.format(TIMESTAMP_FORMAT).to_string())
}
