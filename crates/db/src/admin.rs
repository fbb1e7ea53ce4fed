use async_trait::async_trait;
use serde::Serialize;

use changeapp_kernel::{IndexKey, IndexSpec, RoleGrant, UserPlan};

use crate::error::DbResult;

/// Name of the index every collection carries on `_id`.
pub const ID_INDEX: &str = "_id_";

/// User as reported by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExistingUser {
    pub name: String,
    pub roles: Vec<RoleGrant>,
}

impl ExistingUser {
    /// Planned grants this user does not hold yet.
    pub fn missing_roles<'a>(&self, wanted: &'a [RoleGrant]) -> Vec<&'a RoleGrant> {
        wanted
            .iter()
            .filter(|grant| !self.roles.contains(grant))
            .collect()
    }
}

/// Index as reported by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExistingIndex {
    pub name: String,
    pub keys: Vec<IndexKey>,
    pub unique: bool,
    /// Options set beyond keys and uniqueness (`sparse`, `collation`, ...)
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
}

impl ExistingIndex {
    /// Planned indexes carry no extra options, so an index with any of them
    /// never matches.
    pub fn matches(&self, spec: &IndexSpec) -> bool {
        self.options.is_empty() && spec.same_definition(&self.keys, self.unique)
    }
}

impl From<&IndexSpec> for ExistingIndex {
    fn from(spec: &IndexSpec) -> Self {
        Self {
            name: spec.resolved_name(),
            keys: spec.keys.clone(),
            unique: spec.unique,
            options: Vec::new(),
        }
    }
}

/// Administrative command surface the provisioner relies on.
///
/// User commands run against `admin_db`; everything else targets a logical
/// database by name. Listing a database or collection that does not exist
/// yields an empty result rather than an error.
#[async_trait]
pub trait AdminClient: Send + Sync {
    async fn find_user(&self, admin_db: &str, name: &str) -> DbResult<Option<ExistingUser>>;

    async fn create_user(&self, admin_db: &str, user: &UserPlan) -> DbResult<()>;

    async fn grant_roles(&self, admin_db: &str, name: &str, roles: &[RoleGrant]) -> DbResult<()>;

    async fn list_collections(&self, database: &str) -> DbResult<Vec<String>>;

    async fn create_collection(&self, database: &str, collection: &str) -> DbResult<()>;

    async fn list_indexes(&self, database: &str, collection: &str)
        -> DbResult<Vec<ExistingIndex>>;

    async fn create_index(
        &self,
        database: &str,
        collection: &str,
        index: &IndexSpec,
    ) -> DbResult<()>;

    async fn drop_index(&self, database: &str, collection: &str, name: &str) -> DbResult<()>;
}
