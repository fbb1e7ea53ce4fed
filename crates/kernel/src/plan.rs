//! Provisioning plan: the desired end state of user, databases, collections,
//! and indexes, resolved from settings and module declarations.

use std::collections::HashSet;
use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::index::IndexSpec;
use crate::module::CollectionSpec;
use crate::settings::{Environment, Settings};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    #[error("no databases configured")]
    NoDatabases,

    #[error("database name must not be empty")]
    EmptyDatabaseName,

    #[error("database '{0}' is listed more than once")]
    DuplicateDatabase(String),

    #[error("application user name and password must not be empty")]
    InvalidUser,

    #[error("collection '{collection}' is declared by both '{first}' and '{second}'")]
    DuplicateCollection {
        collection: String,
        first: String,
        second: String,
    },

    #[error("index '{index}' on '{collection}' has no keys")]
    EmptyIndex { collection: String, index: String },

    #[error("index '{index}' on '{collection}' uses invalid field name '{field}'")]
    InvalidField {
        collection: String,
        index: String,
        field: String,
    },

    #[error("index '{index}' on '{collection}' is declared more than once")]
    DuplicateIndex { collection: String, index: String },

    #[error("index '{index}' on '{collection}' is both planned and retired")]
    RetiredIndexPlanned { collection: String, index: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoleGrant {
    pub role: String,
    pub db: String,
}

#[derive(Clone, Serialize)]
pub struct UserPlan {
    pub name: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub roles: Vec<RoleGrant>,
    pub sync_roles: bool,
}

impl fmt::Debug for UserPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserPlan")
            .field("name", &self.name)
            .field("password", &"<redacted>")
            .field("roles", &self.roles)
            .field("sync_roles", &self.sync_roles)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CollectionPlan {
    pub name: String,
    pub indexes: Vec<IndexSpec>,
    pub retired_indexes: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DatabasePlan {
    pub name: String,
    pub environment: Environment,
    pub collections: Vec<CollectionPlan>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProvisionPlan {
    pub admin_database: String,
    pub user: UserPlan,
    pub databases: Vec<DatabasePlan>,
}

impl ProvisionPlan {
    /// Resolve settings and module-declared collections into a validated plan.
    ///
    /// `collections` pairs each collection with the name of the module that
    /// declared it. Configured overrides replace a collection's default index
    /// set; databases with `id_as_primary_key` drop and retire indexes marked
    /// `superseded_by_id`.
    pub fn build(
        settings: &Settings,
        collections: &[(&'static str, CollectionSpec)],
    ) -> Result<Self, PlanError> {
        let mut owners: Vec<(&str, &str)> = Vec::new();
        for (module, spec) in collections {
            if let Some((_, first)) = owners.iter().find(|(name, _)| *name == spec.name) {
                return Err(PlanError::DuplicateCollection {
                    collection: spec.name.to_string(),
                    first: first.to_string(),
                    second: module.to_string(),
                });
            }
            owners.push((spec.name, module));
        }

        let provision = &settings.provision;
        let roles = provision
            .databases
            .iter()
            .map(|target| RoleGrant {
                role: provision.user.role.clone(),
                db: target.name.clone(),
            })
            .collect();

        let user = UserPlan {
            name: provision.user.name.clone(),
            password: provision.user.password.clone(),
            roles,
            sync_roles: provision.user.sync_roles,
        };

        let databases = provision
            .databases
            .iter()
            .map(|target| DatabasePlan {
                name: target.name.clone(),
                environment: target.environment,
                collections: collections
                    .iter()
                    .map(|(_, spec)| {
                        let overrides = provision.collections.get(spec.name);
                        let declared = overrides
                            .and_then(|o| o.indexes.clone())
                            .unwrap_or_else(|| spec.indexes.clone());
                        let mut retired = overrides
                            .map(|o| o.retired_indexes.clone())
                            .unwrap_or_default();

                        let indexes = if target.id_as_primary_key {
                            let (superseded, kept): (Vec<_>, Vec<_>) =
                                declared.into_iter().partition(|index| index.superseded_by_id);
                            retired.extend(superseded.iter().map(IndexSpec::resolved_name));
                            kept
                        } else {
                            declared
                        };

                        CollectionPlan {
                            name: spec.name.to_string(),
                            indexes,
                            retired_indexes: retired,
                        }
                    })
                    .collect(),
            })
            .collect();

        let plan = ProvisionPlan {
            admin_database: settings.mongo.admin_database.clone(),
            user,
            databases,
        };
        plan.validate()?;
        Ok(plan)
    }

    /// Keep only the databases labelled with `environment`. User roles still
    /// cover every configured database so a partial run never narrows access.
    pub fn only(mut self, environment: Environment) -> Self {
        self.databases.retain(|db| db.environment == environment);
        self
    }

    pub fn validate(&self) -> Result<(), PlanError> {
        if self.user.name.trim().is_empty() || self.user.password.is_empty() {
            return Err(PlanError::InvalidUser);
        }
        if self.databases.is_empty() {
            return Err(PlanError::NoDatabases);
        }

        let mut seen = HashSet::new();
        for database in &self.databases {
            if database.name.trim().is_empty() {
                return Err(PlanError::EmptyDatabaseName);
            }
            if !seen.insert(database.name.as_str()) {
                return Err(PlanError::DuplicateDatabase(database.name.clone()));
            }
            for collection in &database.collections {
                validate_indexes(collection)?;
            }
        }

        Ok(())
    }

    /// Number of indexes the plan wants across all databases.
    pub fn index_count(&self) -> usize {
        self.databases
            .iter()
            .flat_map(|db| db.collections.iter())
            .map(|collection| collection.indexes.len())
            .sum()
    }
}

fn validate_indexes(collection: &CollectionPlan) -> Result<(), PlanError> {
    let mut names = HashSet::new();
    for index in &collection.indexes {
        let name = index.resolved_name();
        if index.keys.is_empty() {
            return Err(PlanError::EmptyIndex {
                collection: collection.name.clone(),
                index: name,
            });
        }

        let mut fields = HashSet::new();
        for key in &index.keys {
            if key.field.is_empty() || key.field.starts_with('$') || !fields.insert(&key.field) {
                return Err(PlanError::InvalidField {
                    collection: collection.name.clone(),
                    index: name,
                    field: key.field.clone(),
                });
            }
        }

        if !names.insert(name.clone()) {
            return Err(PlanError::DuplicateIndex {
                collection: collection.name.clone(),
                index: name,
            });
        }
    }

    if let Some(index) = collection
        .retired_indexes
        .iter()
        .find(|retired| names.contains(*retired))
    {
        return Err(PlanError::RetiredIndexPlanned {
            collection: collection.name.clone(),
            index: index.clone(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::IndexKey;
    use crate::settings::{CollectionOverride, DatabaseTarget};

    fn orders() -> CollectionSpec {
        CollectionSpec {
            name: "orders",
            indexes: vec![
                IndexSpec::single("orderId").unique().superseded_by_id(),
                IndexSpec::single("status"),
                IndexSpec::compound(vec![IndexKey::asc("status"), IndexKey::asc("region")]),
            ],
        }
    }

    #[test]
    fn default_settings_plan_every_database() {
        let plan = ProvisionPlan::build(&Settings::default(), &[("orders", orders())]).unwrap();

        assert_eq!(plan.admin_database, "admin");
        assert_eq!(plan.databases.len(), 4);
        assert_eq!(plan.user.roles.len(), 4);
        assert!(plan.user.roles.iter().all(|grant| grant.role == "readWrite"));
        assert_eq!(plan.index_count(), 12);
        assert!(plan
            .databases
            .iter()
            .all(|db| db.collections[0].retired_indexes.is_empty()));
    }

    #[test]
    fn primary_key_target_retires_superseded_index() {
        let mut settings = Settings::default();
        settings.provision.databases = vec![DatabaseTarget {
            name: "orders_dev".to_string(),
            environment: Environment::Development,
            id_as_primary_key: true,
        }];

        let plan = ProvisionPlan::build(&settings, &[("orders", orders())]).unwrap();
        let collection = &plan.databases[0].collections[0];

        assert_eq!(collection.indexes.len(), 2);
        assert!(collection.indexes.iter().all(|index| !index.unique));
        assert_eq!(collection.retired_indexes, vec!["orderId_1".to_string()]);
    }

    #[test]
    fn override_replaces_default_indexes() {
        let mut settings = Settings::default();
        settings.provision.collections.insert(
            "orders".to_string(),
            CollectionOverride {
                indexes: Some(vec![IndexSpec::single("createdAt")]),
                retired_indexes: vec!["status_1".to_string()],
            },
        );

        let plan = ProvisionPlan::build(&settings, &[("orders", orders())]).unwrap();
        let collection = &plan.databases[0].collections[0];
        assert_eq!(collection.indexes, vec![IndexSpec::single("createdAt")]);
        assert_eq!(collection.retired_indexes, vec!["status_1".to_string()]);
    }

    #[test]
    fn only_keeps_matching_databases_and_all_roles() {
        let plan = ProvisionPlan::build(&Settings::default(), &[("orders", orders())])
            .unwrap()
            .only(Environment::Staging);

        assert_eq!(plan.databases.len(), 1);
        assert_eq!(plan.databases[0].name, "changeapp_transactions_hm");
        assert_eq!(plan.user.roles.len(), 4);
    }

    #[test]
    fn duplicate_collection_owners_are_rejected() {
        let err = ProvisionPlan::build(
            &Settings::default(),
            &[("orders", orders()), ("billing", orders())],
        )
        .unwrap_err();
        assert!(matches!(err, PlanError::DuplicateCollection { .. }));
    }

    #[test]
    fn duplicate_database_is_rejected() {
        let mut settings = Settings::default();
        settings
            .provision
            .databases
            .push(DatabaseTarget::new("changeapp_transactions", Environment::Test));

        let err = ProvisionPlan::build(&settings, &[]).unwrap_err();
        assert_eq!(
            err,
            PlanError::DuplicateDatabase("changeapp_transactions".to_string())
        );
    }

    #[test]
    fn invalid_indexes_are_rejected() {
        let mut spec = orders();
        spec.indexes.push(IndexSpec::single("status"));
        let err = ProvisionPlan::build(&Settings::default(), &[("orders", spec)]).unwrap_err();
        assert!(matches!(err, PlanError::DuplicateIndex { .. }));

        let spec = CollectionSpec {
            name: "orders",
            indexes: vec![IndexSpec::single("$where")],
        };
        let err = ProvisionPlan::build(&Settings::default(), &[("orders", spec)]).unwrap_err();
        assert!(matches!(err, PlanError::InvalidField { .. }));

        let spec = CollectionSpec {
            name: "orders",
            indexes: vec![IndexSpec::compound(vec![])],
        };
        let err = ProvisionPlan::build(&Settings::default(), &[("orders", spec)]).unwrap_err();
        assert!(matches!(err, PlanError::EmptyIndex { .. }));
    }

    #[test]
    fn retiring_a_planned_index_is_rejected() {
        let mut settings = Settings::default();
        settings.provision.collections.insert(
            "orders".to_string(),
            CollectionOverride {
                indexes: Some(vec![IndexSpec::single("status")]),
                retired_indexes: vec!["status_1".to_string()],
            },
        );

        let err = ProvisionPlan::build(&settings, &[("orders", orders())]).unwrap_err();
        assert_eq!(
            err,
            PlanError::RetiredIndexPlanned {
                collection: "orders".to_string(),
                index: "status_1".to_string(),
            }
        );
    }

    #[test]
    fn empty_database_list_is_rejected() {
        let mut settings = Settings::default();
        settings.provision.databases.clear();
        let err = ProvisionPlan::build(&settings, &[]).unwrap_err();
        assert_eq!(err, PlanError::NoDatabases);
    }

    #[test]
    fn serialized_plan_omits_password() {
        let plan = ProvisionPlan::build(&Settings::default(), &[("orders", orders())]).unwrap();
        let json = serde_json::to_string(&plan).unwrap();
        assert!(!json.contains("changeapp123"));
        assert!(json.contains("\"name\":\"changeapp\""));
    }
}
