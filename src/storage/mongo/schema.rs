use mongodb::IndexModel;
use mongodb::bson::doc;
use mongodb::options::IndexOptions;

pub const HEADER_COLLECTION: &str = "header";
pub const BLOCK_COLLECTION: &str = "block";
pub const TRANSACTION_COLLECTION: &str = "transaction";

fn unique_index(field: &str, name: &str) -> IndexModel {
    IndexModel::builder()
        .keys(doc! { field: 1 })
        .options(
            IndexOptions::builder()
                .unique(true)
                .name(name.to_string())
                .build(),
        )
        .build()
}

/// Header documents are keyed by block number
pub fn header_indexes() -> Vec<IndexModel> {
    vec![unique_index("blockNumber", "header_block_number")]
}

/// Block documents are keyed by block number. The same index serves the
/// highest-stored-number lookup.
pub fn block_indexes() -> Vec<IndexModel> {
    vec![unique_index("blockNumber", "block_block_number")]
}

/// Transactions are keyed by hash and looked up by block for cleanup
pub fn transaction_indexes() -> Vec<IndexModel> {
    vec![
        unique_index("hash", "transaction_hash"),
        IndexModel::builder()
            .keys(doc! { "blockNumber": 1 })
            .options(
                IndexOptions::builder()
                    .name("transaction_block_number".to_string())
                    .build(),
            )
            .build(),
    ]
}
