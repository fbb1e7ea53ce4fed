//! In-process [`AdminClient`] with server-like semantics, selected by the
//! `mem://` URI scheme and used throughout the test suites.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use changeapp_kernel::{IndexKey, IndexSpec, RoleGrant, UserPlan};

use crate::admin::{AdminClient, ExistingIndex, ExistingUser, ID_INDEX};
use crate::error::{DbError, DbResult};

/// Count of mutating calls that reached the backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MutationCounts {
    pub users_created: usize,
    pub role_grants: usize,
    pub collections_created: usize,
    pub indexes_created: usize,
    pub indexes_dropped: usize,
}

impl MutationCounts {
    pub fn total(&self) -> usize {
        self.users_created
            + self.role_grants
            + self.collections_created
            + self.indexes_created
            + self.indexes_dropped
    }
}

#[derive(Default)]
struct State {
    // (admin database, user name)
    users: BTreeMap<(String, String), ExistingUser>,
    // database -> collection -> indexes
    databases: BTreeMap<String, BTreeMap<String, Vec<ExistingIndex>>>,
    counts: MutationCounts,
    fail_on: Option<String>,
}

#[derive(Default)]
pub struct MemoryAdmin {
    state: Mutex<State>,
}

impl MemoryAdmin {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counts(&self) -> MutationCounts {
        self.lock().counts
    }

    /// Make every call to `operation` (trait method name) fail.
    pub fn fail_on(&self, operation: &str) {
        self.lock().fail_on = Some(operation.to_string());
    }

    /// Seed an existing user, bypassing the mutation counters.
    pub fn insert_user(&self, admin_db: &str, user: ExistingUser) {
        self.lock()
            .users
            .insert((admin_db.to_string(), user.name.clone()), user);
    }

    /// Seed an existing index, creating the collection when needed.
    pub fn insert_index(&self, database: &str, collection: &str, index: ExistingIndex) {
        let mut state = self.lock();
        let indexes = collection_entry(&mut state, database, collection);
        indexes.retain(|existing| existing.name != index.name);
        indexes.push(index);
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A panic while holding the lock leaves plain data behind; keep going.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check(&self, state: &State, operation: &str) -> DbResult<()> {
        match &state.fail_on {
            Some(failing) if failing == operation => {
                Err(DbError::Backend(format!("{operation} rejected by backend")))
            }
            _ => Ok(()),
        }
    }
}

fn collection_entry<'a>(
    state: &'a mut State,
    database: &str,
    collection: &str,
) -> &'a mut Vec<ExistingIndex> {
    state
        .databases
        .entry(database.to_string())
        .or_default()
        .entry(collection.to_string())
        .or_insert_with(|| {
            vec![ExistingIndex {
                name: ID_INDEX.to_string(),
                keys: vec![IndexKey::asc("_id")],
                unique: true,
                options: Vec::new(),
            }]
        })
}

#[async_trait]
impl AdminClient for MemoryAdmin {
    async fn find_user(&self, admin_db: &str, name: &str) -> DbResult<Option<ExistingUser>> {
        let state = self.lock();
        self.check(&state, "find_user")?;
        Ok(state
            .users
            .get(&(admin_db.to_string(), name.to_string()))
            .cloned())
    }

    async fn create_user(&self, admin_db: &str, user: &UserPlan) -> DbResult<()> {
        let mut state = self.lock();
        self.check(&state, "create_user")?;

        let key = (admin_db.to_string(), user.name.clone());
        if state.users.contains_key(&key) {
            return Err(DbError::Backend(format!(
                "user \"{}@{}\" already exists",
                user.name, admin_db
            )));
        }
        state.users.insert(
            key,
            ExistingUser {
                name: user.name.clone(),
                roles: user.roles.clone(),
            },
        );
        state.counts.users_created += 1;
        Ok(())
    }

    async fn grant_roles(&self, admin_db: &str, name: &str, roles: &[RoleGrant]) -> DbResult<()> {
        let mut state = self.lock();
        self.check(&state, "grant_roles")?;

        let user = state
            .users
            .get_mut(&(admin_db.to_string(), name.to_string()))
            .ok_or_else(|| DbError::Backend(format!("could not find user \"{name}@{admin_db}\"")))?;
        for role in roles {
            if !user.roles.contains(role) {
                user.roles.push(role.clone());
            }
        }
        state.counts.role_grants += 1;
        Ok(())
    }

    async fn list_collections(&self, database: &str) -> DbResult<Vec<String>> {
        let state = self.lock();
        self.check(&state, "list_collections")?;
        Ok(state
            .databases
            .get(database)
            .map(|collections| collections.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn create_collection(&self, database: &str, collection: &str) -> DbResult<()> {
        let mut state = self.lock();
        self.check(&state, "create_collection")?;

        let exists = state
            .databases
            .get(database)
            .is_some_and(|collections| collections.contains_key(collection));
        if !exists {
            collection_entry(&mut state, database, collection);
            state.counts.collections_created += 1;
        }
        Ok(())
    }

    async fn list_indexes(
        &self,
        database: &str,
        collection: &str,
    ) -> DbResult<Vec<ExistingIndex>> {
        let state = self.lock();
        self.check(&state, "list_indexes")?;
        Ok(state
            .databases
            .get(database)
            .and_then(|collections| collections.get(collection))
            .cloned()
            .unwrap_or_default())
    }

    async fn create_index(
        &self,
        database: &str,
        collection: &str,
        index: &IndexSpec,
    ) -> DbResult<()> {
        let mut state = self.lock();
        self.check(&state, "create_index")?;

        let name = index.resolved_name();
        let indexes = collection_entry(&mut state, database, collection);

        if indexes.iter().any(|existing| existing.matches(index)) {
            // Same keys and options under any name is a server-side no-op,
            // unless the names differ, which the server rejects.
            if indexes.iter().any(|existing| existing.name == name) {
                return Ok(());
            }
            return Err(DbError::IndexConflict {
                database: database.to_string(),
                collection: collection.to_string(),
                index: name,
            });
        }
        if indexes.iter().any(|existing| existing.name == name) {
            return Err(DbError::IndexConflict {
                database: database.to_string(),
                collection: collection.to_string(),
                index: name,
            });
        }

        indexes.push(ExistingIndex::from(index));
        state.counts.indexes_created += 1;
        Ok(())
    }

    async fn drop_index(&self, database: &str, collection: &str, name: &str) -> DbResult<()> {
        let mut state = self.lock();
        self.check(&state, "drop_index")?;

        if name == ID_INDEX {
            return Err(DbError::Backend("cannot drop _id index".to_string()));
        }

        let Some(indexes) = state
            .databases
            .get_mut(database)
            .and_then(|collections| collections.get_mut(collection))
        else {
            return Ok(());
        };

        let before = indexes.len();
        indexes.retain(|existing| existing.name != name);
        if indexes.len() != before {
            state.counts.indexes_dropped += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn collection_starts_with_id_index() {
        let admin = MemoryAdmin::new();
        admin.create_collection("app", "orders").await.unwrap();
        admin.create_collection("app", "orders").await.unwrap();

        let indexes = admin.list_indexes("app", "orders").await.unwrap();
        assert_eq!(indexes.len(), 1);
        assert_eq!(indexes[0].name, ID_INDEX);
        assert_eq!(admin.counts().collections_created, 1);
    }

    #[tokio::test]
    async fn create_index_is_idempotent_and_detects_conflicts() {
        let admin = MemoryAdmin::new();
        let status = IndexSpec::single("status");
        admin.create_index("app", "orders", &status).await.unwrap();
        admin.create_index("app", "orders", &status).await.unwrap();
        assert_eq!(admin.counts().indexes_created, 1);

        let unique_status = IndexSpec::single("status").unique();
        let err = admin
            .create_index("app", "orders", &unique_status)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::IndexConflict { .. }));

        let renamed = IndexSpec::single("status").named("by_status");
        let err = admin.create_index("app", "orders", &renamed).await.unwrap_err();
        assert!(matches!(err, DbError::IndexConflict { .. }));
    }

    #[tokio::test]
    async fn missing_database_lists_nothing() {
        let admin = MemoryAdmin::new();
        assert!(admin.list_collections("nope").await.unwrap().is_empty());
        assert!(admin.list_indexes("nope", "orders").await.unwrap().is_empty());
        admin.drop_index("nope", "orders", "status_1").await.unwrap();
        assert_eq!(admin.counts().total(), 0);
    }

    #[tokio::test]
    async fn duplicate_user_is_rejected() {
        let admin = MemoryAdmin::new();
        let user = UserPlan {
            name: "app".to_string(),
            password: "secret".to_string(),
            roles: vec![],
            sync_roles: false,
        };
        admin.create_user("admin", &user).await.unwrap();
        assert!(admin.create_user("admin", &user).await.is_err());
        assert!(admin.find_user("admin", "app").await.unwrap().is_some());
        assert!(admin.find_user("other", "app").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn fail_on_rejects_named_operation() {
        let admin = MemoryAdmin::new();
        admin.fail_on("create_collection");
        let err = admin.create_collection("app", "orders").await.unwrap_err();
        assert!(matches!(err, DbError::Backend(_)));
        assert!(admin.list_collections("app").await.unwrap().is_empty());
    }
}
