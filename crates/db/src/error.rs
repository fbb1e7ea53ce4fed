//! Database administration error types

use changeapp_kernel::PlanError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("failed to connect to {uri}: {source}")]
    Connect {
        uri: String,
        #[source]
        source: mongodb::error::Error,
    },

    #[error("{operation} failed: {source}")]
    Mongo {
        operation: String,
        #[source]
        source: mongodb::error::Error,
    },

    #[error("index '{index}' on {database}.{collection} conflicts with an existing index")]
    IndexConflict {
        database: String,
        collection: String,
        index: String,
    },

    #[error("malformed server reply: {0}")]
    MalformedReply(String),

    #[error("invalid plan: {0}")]
    Plan(#[from] PlanError),

    #[error("backend error: {0}")]
    Backend(String),
}

impl DbError {
    pub(crate) fn mongo(operation: impl Into<String>, source: mongodb::error::Error) -> Self {
        Self::Mongo {
            operation: operation.into(),
            source,
        }
    }
}

pub type DbResult<T> = Result<T, DbError>;
