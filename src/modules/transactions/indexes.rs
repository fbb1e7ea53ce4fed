//! Default index set for the `transactions` collection.
//!
//! Single-field indexes back the lookup filters; the compound ones back the
//! type/status, currency-pair, and kingdom/status queries.

use changeapp_kernel::{IndexKey, IndexSpec};

use super::models::fields;

const SINGLE_FIELD: &[&str] = &[
    fields::TYPE,
    fields::STATUS,
    fields::FROM_CURRENCY_PREFIX,
    fields::TO_CURRENCY_PREFIX,
    fields::KINGDOM_ID,
    fields::FROM_PRODUCT_ID,
    fields::TO_PRODUCT_ID,
    fields::CREATED_AT,
    fields::ORIGINAL_AMOUNT,
];

const COMPOUND: &[&[&str]] = &[
    &[fields::TYPE, fields::STATUS],
    &[fields::FROM_CURRENCY_PREFIX, fields::TO_CURRENCY_PREFIX],
    &[fields::KINGDOM_ID, fields::STATUS],
];

pub fn default_indexes() -> Vec<IndexSpec> {
    let mut indexes = vec![IndexSpec::single(fields::TRANSACTION_ID)
        .unique()
        .superseded_by_id()];

    indexes.extend(SINGLE_FIELD.iter().map(|field| IndexSpec::single(*field)));
    indexes.extend(COMPOUND.iter().map(|keys| {
        IndexSpec::compound(keys.iter().map(|field| IndexKey::asc(*field)).collect())
    }));

    indexes
}
