//! Applies a [`ProvisionPlan`] idempotently: absent resources are created,
//! present ones are left alone, and retired indexes are dropped.

use serde::Serialize;
use tracing::Instrument;

use changeapp_kernel::{CollectionPlan, DatabasePlan, ProvisionPlan, RoleGrant, UserPlan};

use crate::admin::AdminClient;
use crate::error::{DbError, DbResult};

/// What happened to the application user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum UserOutcome {
    Created,
    Unchanged,
    RolesGranted { roles: Vec<RoleGrant> },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CollectionReport {
    pub name: String,
    pub created: bool,
    pub indexes_created: Vec<String>,
    pub indexes_unchanged: Vec<String>,
    pub indexes_dropped: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatabaseReport {
    pub name: String,
    pub collections: Vec<CollectionReport>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProvisionReport {
    pub dry_run: bool,
    pub user: UserOutcome,
    pub databases: Vec<DatabaseReport>,
}

impl ProvisionReport {
    /// Number of mutations applied (or, in a dry run, that would be applied).
    pub fn changes(&self) -> usize {
        let user = usize::from(self.user != UserOutcome::Unchanged);
        let collections: usize = self
            .databases
            .iter()
            .flat_map(|db| db.collections.iter())
            .map(|c| usize::from(c.created) + c.indexes_created.len() + c.indexes_dropped.len())
            .sum();
        user + collections
    }

    pub fn is_noop(&self) -> bool {
        self.changes() == 0
    }
}

pub struct Provisioner<'a> {
    client: &'a dyn AdminClient,
    dry_run: bool,
}

impl<'a> Provisioner<'a> {
    pub fn new(client: &'a dyn AdminClient) -> Self {
        Self {
            client,
            dry_run: false,
        }
    }

    /// Read state and report, but issue no mutating commands.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub async fn apply(&self, plan: &ProvisionPlan) -> DbResult<ProvisionReport> {
        plan.validate()?;

        tracing::info!(
            dry_run = self.dry_run,
            databases = plan.databases.len(),
            "provisioning started"
        );

        let user = self.ensure_user(&plan.admin_database, &plan.user).await?;

        let mut databases = Vec::with_capacity(plan.databases.len());
        for database in &plan.databases {
            let span = tracing::info_span!(
                "database",
                name = %database.name,
                environment = %database.environment
            );
            databases.push(self.ensure_database(database).instrument(span).await?);
        }

        let report = ProvisionReport {
            dry_run: self.dry_run,
            user,
            databases,
        };

        tracing::info!(
            dry_run = self.dry_run,
            changes = report.changes(),
            "provisioning finished"
        );
        Ok(report)
    }

    async fn ensure_user(&self, admin_db: &str, user: &UserPlan) -> DbResult<UserOutcome> {
        let Some(existing) = self.client.find_user(admin_db, &user.name).await? else {
            if !self.dry_run {
                self.client.create_user(admin_db, user).await?;
            }
            tracing::info!(user = %user.name, roles = user.roles.len(), "application user created");
            return Ok(UserOutcome::Created);
        };

        let missing: Vec<RoleGrant> = existing
            .missing_roles(&user.roles)
            .into_iter()
            .cloned()
            .collect();

        if missing.is_empty() {
            tracing::info!(user = %user.name, "application user already exists");
            return Ok(UserOutcome::Unchanged);
        }

        if !user.sync_roles {
            tracing::warn!(
                user = %user.name,
                missing = missing.len(),
                "application user exists without all planned roles; enable sync_roles to grant them"
            );
            return Ok(UserOutcome::Unchanged);
        }

        if !self.dry_run {
            self.client
                .grant_roles(admin_db, &user.name, &missing)
                .await?;
        }
        tracing::info!(user = %user.name, granted = missing.len(), "granted missing roles");
        Ok(UserOutcome::RolesGranted { roles: missing })
    }

    async fn ensure_database(&self, database: &DatabasePlan) -> DbResult<DatabaseReport> {
        let existing = self.client.list_collections(&database.name).await?;

        let mut collections = Vec::with_capacity(database.collections.len());
        for collection in &database.collections {
            let exists = existing.iter().any(|name| name == &collection.name);
            collections.push(
                self.ensure_collection(&database.name, collection, exists)
                    .await?,
            );
        }

        Ok(DatabaseReport {
            name: database.name.clone(),
            collections,
        })
    }

    async fn ensure_collection(
        &self,
        database: &str,
        collection: &CollectionPlan,
        exists: bool,
    ) -> DbResult<CollectionReport> {
        let mut report = CollectionReport {
            name: collection.name.clone(),
            ..Default::default()
        };

        if !exists {
            if !self.dry_run {
                self.client
                    .create_collection(database, &collection.name)
                    .await?;
            }
            report.created = true;
            tracing::info!(database, collection = %collection.name, "collection created");
        }

        let mut current = self.client.list_indexes(database, &collection.name).await?;

        for retired in &collection.retired_indexes {
            if current.iter().any(|index| &index.name == retired) {
                if !self.dry_run {
                    self.client
                        .drop_index(database, &collection.name, retired)
                        .await?;
                }
                current.retain(|index| &index.name != retired);
                report.indexes_dropped.push(retired.clone());
                tracing::info!(database, collection = %collection.name, index = %retired, "retired index dropped");
            }
        }

        for index in &collection.indexes {
            let name = index.resolved_name();

            if let Some(existing) = current.iter().find(|existing| existing.matches(index)) {
                tracing::debug!(
                    database,
                    collection = %collection.name,
                    index = %name,
                    existing = %existing.name,
                    "index already present"
                );
                report.indexes_unchanged.push(name);
                continue;
            }

            if current.iter().any(|existing| existing.name == name) {
                return Err(DbError::IndexConflict {
                    database: database.to_string(),
                    collection: collection.name.clone(),
                    index: name,
                });
            }

            if !self.dry_run {
                self.client
                    .create_index(database, &collection.name, index)
                    .await?;
            }
            tracing::info!(database, collection = %collection.name, index = %index, "index created");
            current.push(index.into());
            report.indexes_created.push(name);
        }

        Ok(report)
    }
}
