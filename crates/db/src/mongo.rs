//! [`AdminClient`] backed by the official MongoDB driver.

use std::time::Duration;

use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{doc, Bson, Document};
use mongodb::error::ErrorKind;
use mongodb::options::{ClientOptions, IndexOptions};
use mongodb::{Client, IndexModel};

use changeapp_kernel::settings::MongoSettings;
use changeapp_kernel::{IndexKey, IndexSpec, RoleGrant, SortOrder, UserPlan};

use crate::admin::{AdminClient, ExistingIndex, ExistingUser};
use crate::error::{DbError, DbResult};

// Server error codes the admin layer treats specially.
const NAMESPACE_NOT_FOUND: i32 = 26;
const INDEX_NOT_FOUND: i32 = 27;
const NAMESPACE_EXISTS: i32 = 48;
const INDEX_OPTIONS_CONFLICT: i32 = 85;
const INDEX_KEY_SPECS_CONFLICT: i32 = 86;

pub struct MongoAdmin {
    client: Client,
}

impl MongoAdmin {
    /// Connect and ping the admin database so bad credentials fail early.
    pub async fn connect(settings: &MongoSettings) -> DbResult<Self> {
        let uri = redact_uri(&settings.uri);
        let connect_err = |source| DbError::Connect {
            uri: uri.clone(),
            source,
        };

        let mut options = ClientOptions::parse(settings.uri.as_str())
            .await
            .map_err(connect_err)?;
        options.app_name = Some(settings.app_name.clone());
        options.connect_timeout = Some(Duration::from_millis(settings.connect_timeout_ms));
        options.server_selection_timeout =
            Some(Duration::from_millis(settings.server_selection_timeout_ms));

        let client = Client::with_options(options).map_err(connect_err)?;
        client
            .database(&settings.admin_database)
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(connect_err)?;

        tracing::info!(target: "changeapp-db", uri = %uri, "connected to MongoDB");
        Ok(Self { client })
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl AdminClient for MongoAdmin {
    async fn find_user(&self, admin_db: &str, name: &str) -> DbResult<Option<ExistingUser>> {
        let reply = self
            .client
            .database(admin_db)
            .run_command(doc! { "usersInfo": { "user": name, "db": admin_db } })
            .await
            .map_err(|e| DbError::mongo("usersInfo", e))?;

        let users = reply
            .get_array("users")
            .map_err(|e| DbError::MalformedReply(format!("usersInfo: {e}")))?;
        let Some(user) = users.first() else {
            return Ok(None);
        };
        let user = user
            .as_document()
            .ok_or_else(|| DbError::MalformedReply("usersInfo: user is not a document".into()))?;

        let mut roles = Vec::new();
        if let Ok(granted) = user.get_array("roles") {
            for role in granted.iter().filter_map(Bson::as_document) {
                roles.push(RoleGrant {
                    role: role
                        .get_str("role")
                        .map_err(|e| DbError::MalformedReply(format!("usersInfo role: {e}")))?
                        .to_string(),
                    db: role
                        .get_str("db")
                        .map_err(|e| DbError::MalformedReply(format!("usersInfo role: {e}")))?
                        .to_string(),
                });
            }
        }

        Ok(Some(ExistingUser {
            name: name.to_string(),
            roles,
        }))
    }

    async fn create_user(&self, admin_db: &str, user: &UserPlan) -> DbResult<()> {
        let roles: Vec<Bson> = user.roles.iter().map(role_document).collect();
        self.client
            .database(admin_db)
            .run_command(doc! {
                "createUser": user.name.as_str(),
                "pwd": user.password.as_str(),
                "roles": roles,
            })
            .await
            .map_err(|e| DbError::mongo("createUser", e))?;
        Ok(())
    }

    async fn grant_roles(&self, admin_db: &str, name: &str, roles: &[RoleGrant]) -> DbResult<()> {
        let roles: Vec<Bson> = roles.iter().map(role_document).collect();
        self.client
            .database(admin_db)
            .run_command(doc! { "grantRolesToUser": name, "roles": roles })
            .await
            .map_err(|e| DbError::mongo("grantRolesToUser", e))?;
        Ok(())
    }

    async fn list_collections(&self, database: &str) -> DbResult<Vec<String>> {
        self.client
            .database(database)
            .list_collection_names()
            .await
            .map_err(|e| DbError::mongo(format!("listCollections on {database}"), e))
    }

    async fn create_collection(&self, database: &str, collection: &str) -> DbResult<()> {
        match self
            .client
            .database(database)
            .create_collection(collection)
            .await
        {
            Ok(()) => Ok(()),
            Err(e) if command_code(&e) == Some(NAMESPACE_EXISTS) => Ok(()),
            Err(e) => Err(DbError::mongo(
                format!("create collection {database}.{collection}"),
                e,
            )),
        }
    }

    async fn list_indexes(
        &self,
        database: &str,
        collection: &str,
    ) -> DbResult<Vec<ExistingIndex>> {
        let operation = || format!("listIndexes on {database}.{collection}");
        let coll = self
            .client
            .database(database)
            .collection::<Document>(collection);

        let cursor = match coll.list_indexes().await {
            Ok(cursor) => cursor,
            Err(e) if command_code(&e) == Some(NAMESPACE_NOT_FOUND) => return Ok(Vec::new()),
            Err(e) => return Err(DbError::mongo(operation(), e)),
        };
        let models: Vec<IndexModel> = cursor
            .try_collect()
            .await
            .map_err(|e| DbError::mongo(operation(), e))?;

        Ok(models.into_iter().filter_map(existing_index).collect())
    }

    async fn create_index(
        &self,
        database: &str,
        collection: &str,
        index: &IndexSpec,
    ) -> DbResult<()> {
        let mut keys = Document::new();
        for key in &index.keys {
            keys.insert(key.field.clone(), key.order.as_i32());
        }

        let mut options = IndexOptions::default();
        options.name = Some(index.resolved_name());
        if index.unique {
            options.unique = Some(true);
        }

        let model = IndexModel::builder().keys(keys).options(options).build();
        let result = self
            .client
            .database(database)
            .collection::<Document>(collection)
            .create_index(model)
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(e)
                if matches!(
                    command_code(&e),
                    Some(INDEX_OPTIONS_CONFLICT) | Some(INDEX_KEY_SPECS_CONFLICT)
                ) =>
            {
                Err(DbError::IndexConflict {
                    database: database.to_string(),
                    collection: collection.to_string(),
                    index: index.resolved_name(),
                })
            }
            Err(e) => Err(DbError::mongo(
                format!("createIndexes on {database}.{collection}"),
                e,
            )),
        }
    }

    async fn drop_index(&self, database: &str, collection: &str, name: &str) -> DbResult<()> {
        let result = self
            .client
            .database(database)
            .collection::<Document>(collection)
            .drop_index(name)
            .await;

        match result {
            Ok(()) => Ok(()),
            Err(e) if command_code(&e) == Some(INDEX_NOT_FOUND) => Ok(()),
            Err(e) => Err(DbError::mongo(
                format!("dropIndexes {name} on {database}.{collection}"),
                e,
            )),
        }
    }
}

fn role_document(grant: &RoleGrant) -> Bson {
    Bson::Document(doc! { "role": grant.role.as_str(), "db": grant.db.as_str() })
}

fn command_code(err: &mongodb::error::Error) -> Option<i32> {
    match err.kind.as_ref() {
        ErrorKind::Command(command) => Some(command.code),
        _ => None,
    }
}

/// Convert a server index description. Indexes with non-numeric keys (text,
/// hashed, geo) are not managed here and are skipped.
fn existing_index(model: IndexModel) -> Option<ExistingIndex> {
    let options = model.options.unwrap_or_default();
    let Some(name) = options.name.clone() else {
        tracing::debug!(target: "changeapp-db", keys = %model.keys, "skipping unnamed index");
        return None;
    };

    let mut keys = Vec::with_capacity(model.keys.len());
    for (field, value) in model.keys.iter() {
        let direction = match value {
            Bson::Int32(v) => i64::from(*v),
            Bson::Int64(v) => *v,
            Bson::Double(v) => *v as i64,
            _ => {
                tracing::debug!(target: "changeapp-db", index = %name, "skipping special index");
                return None;
            }
        };
        let order = SortOrder::try_from(direction.signum() as i32).ok()?;
        keys.push(IndexKey {
            field: field.clone(),
            order,
        });
    }

    Some(ExistingIndex {
        name,
        keys,
        unique: options.unique.unwrap_or(false),
        options: extra_options(&options),
    })
}

fn extra_options(options: &IndexOptions) -> Vec<String> {
    let flags = [
        ("sparse", options.sparse == Some(true)),
        ("partialFilterExpression", options.partial_filter_expression.is_some()),
        ("collation", options.collation.is_some()),
        ("expireAfterSeconds", options.expire_after.is_some()),
        ("hidden", options.hidden == Some(true)),
    ];
    flags
        .into_iter()
        .filter(|(_, set)| *set)
        .map(|(option, _)| option.to_string())
        .collect()
}

/// Hide credentials embedded in a connection string before logging it.
pub(crate) fn redact_uri(uri: &str) -> String {
    let Some(scheme_end) = uri.find("://") else {
        return uri.to_string();
    };
    let rest = &uri[scheme_end + 3..];
    let authority_end = rest.find('/').unwrap_or(rest.len());
    match rest[..authority_end].rfind('@') {
        Some(at) => format!("{}://***@{}", &uri[..scheme_end], &rest[at + 1..]),
        None => uri.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redact_uri_hides_credentials() {
        assert_eq!(
            redact_uri("mongodb://root:secret@db:27017/admin"),
            "mongodb://***@db:27017/admin"
        );
        assert_eq!(
            redact_uri("mongodb://localhost:27017"),
            "mongodb://localhost:27017"
        );
        assert_eq!(redact_uri("not a uri"), "not a uri");
    }

    #[test]
    fn existing_index_reads_compound_keys() {
        let mut options = IndexOptions::default();
        options.name = Some("kingdomId_1_status_-1".to_string());
        let model = IndexModel::builder()
            .keys(doc! { "kingdomId": 1, "status": -1.0 })
            .options(options)
            .build();

        let index = existing_index(model).unwrap();
        assert_eq!(index.name, "kingdomId_1_status_-1");
        assert_eq!(
            index.keys,
            vec![IndexKey::asc("kingdomId"), IndexKey::desc("status")]
        );
        assert!(!index.unique);
    }

    #[test]
    fn existing_index_skips_text_indexes() {
        let mut options = IndexOptions::default();
        options.name = Some("reason_text".to_string());
        let model = IndexModel::builder()
            .keys(doc! { "reason": "text" })
            .options(options)
            .build();

        assert!(existing_index(model).is_none());
    }

    #[test]
    fn existing_index_records_extra_options() {
        let mut options = IndexOptions::default();
        options.name = Some("status_1".to_string());
        options.sparse = Some(true);
        options.partial_filter_expression = Some(doc! { "status": { "$exists": true } });
        let model = IndexModel::builder()
            .keys(doc! { "status": 1 })
            .options(options)
            .build();

        let index = existing_index(model).unwrap();
        assert_eq!(index.options, vec!["sparse", "partialFilterExpression"]);
        assert!(!index.matches(&IndexSpec::single("status")));
    }
}
