use mongodb::bson::{DateTime, Decimal128};
use serde::{Deserialize, Serialize};

/// Stored field names, shared by the record type and the index definitions.
pub mod fields {
    pub const TRANSACTION_ID: &str = "transactionId";
    pub const TYPE: &str = "type";
    pub const STATUS: &str = "status";
    pub const FROM_CURRENCY_PREFIX: &str = "fromCurrencyPrefix";
    pub const TO_CURRENCY_PREFIX: &str = "toCurrencyPrefix";
    pub const KINGDOM_ID: &str = "kingdomId";
    pub const FROM_PRODUCT_ID: &str = "fromProductId";
    pub const TO_PRODUCT_ID: &str = "toProductId";
    pub const CREATED_AT: &str = "createdAt";
    pub const ORIGINAL_AMOUNT: &str = "originalAmount";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    /// Currency to currency
    Conversion,
    /// Product to product
    Exchange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Requested,
    Approved,
    NotApproved,
    Warning,
}

/// Document stored in the `transactions` collection.
///
/// The identifier is the primary key (`_id`). Databases without
/// `id_as_primary_key` keep a unique index on `transactionId`, so documents
/// written there must also carry the identifier in that field (see
/// [`Transaction::with_mirrored_id`]); otherwise every document indexes as
/// null and the second insert fails with a duplicate key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    #[serde(rename = "_id")]
    pub transaction_id: String,
    /// Copy of `_id` for databases that still index `transactionId`
    #[serde(
        rename = "transactionId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub mirrored_id: Option<String>,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub status: TransactionStatus,
    pub original_amount: Decimal128,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub converted_amount: Option<Decimal128>,
    pub from_currency_prefix: String,
    pub to_currency_prefix: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exchange_rate: Option<Decimal128>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_product_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_product_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_product_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_product_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kingdom_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kingdom_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime>,
}

impl Transaction {
    /// Mirror `_id` into `transactionId` for databases that keep the unique
    /// `transactionId` index.
    pub fn with_mirrored_id(mut self) -> Self {
        self.mirrored_id = Some(self.transaction_id.clone());
        self
    }
}
