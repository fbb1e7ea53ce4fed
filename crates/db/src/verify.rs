//! Compares live state against a [`ProvisionPlan`] without changing anything.

use std::fmt;

use serde::Serialize;

use changeapp_kernel::ProvisionPlan;

use crate::admin::{AdminClient, ID_INDEX};
use crate::error::DbResult;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Discrepancy {
    MissingUser {
        user: String,
    },
    MissingRole {
        user: String,
        role: String,
        db: String,
    },
    MissingCollection {
        database: String,
        collection: String,
    },
    MissingIndex {
        database: String,
        collection: String,
        index: String,
    },
    /// An index exists under the planned name with other keys or options
    MismatchedIndex {
        database: String,
        collection: String,
        index: String,
    },
    RetiredIndexPresent {
        database: String,
        collection: String,
        index: String,
    },
    UnexpectedIndex {
        database: String,
        collection: String,
        index: String,
    },
}

impl fmt::Display for Discrepancy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Discrepancy::MissingUser { user } => write!(f, "user '{user}' does not exist"),
            Discrepancy::MissingRole { user, role, db } => {
                write!(f, "user '{user}' lacks role '{role}' on '{db}'")
            }
            Discrepancy::MissingCollection {
                database,
                collection,
            } => write!(f, "collection {database}.{collection} does not exist"),
            Discrepancy::MissingIndex {
                database,
                collection,
                index,
            } => write!(f, "index '{index}' missing on {database}.{collection}"),
            Discrepancy::MismatchedIndex {
                database,
                collection,
                index,
            } => write!(
                f,
                "index '{index}' on {database}.{collection} differs from its definition"
            ),
            Discrepancy::RetiredIndexPresent {
                database,
                collection,
                index,
            } => write!(
                f,
                "retired index '{index}' still present on {database}.{collection}"
            ),
            Discrepancy::UnexpectedIndex {
                database,
                collection,
                index,
            } => write!(f, "unexpected index '{index}' on {database}.{collection}"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VerifyReport {
    pub databases_checked: usize,
    pub indexes_checked: usize,
    pub discrepancies: Vec<Discrepancy>,
}

impl VerifyReport {
    pub fn is_clean(&self) -> bool {
        self.discrepancies.is_empty()
    }
}

/// Check that the user, collections, and index sets match the plan.
///
/// Planned indexes count as present when an index with the same definition
/// exists under any name. Indexes outside the plan (other than `_id_`) are
/// reported as unexpected.
pub async fn verify(client: &dyn AdminClient, plan: &ProvisionPlan) -> DbResult<VerifyReport> {
    plan.validate()?;

    let mut report = VerifyReport::default();

    match client.find_user(&plan.admin_database, &plan.user.name).await? {
        None => report.discrepancies.push(Discrepancy::MissingUser {
            user: plan.user.name.clone(),
        }),
        Some(existing) => {
            for grant in existing.missing_roles(&plan.user.roles) {
                report.discrepancies.push(Discrepancy::MissingRole {
                    user: plan.user.name.clone(),
                    role: grant.role.clone(),
                    db: grant.db.clone(),
                });
            }
        }
    }

    for database in &plan.databases {
        report.databases_checked += 1;
        let collections = client.list_collections(&database.name).await?;

        for collection in &database.collections {
            if !collections.iter().any(|name| name == &collection.name) {
                report.discrepancies.push(Discrepancy::MissingCollection {
                    database: database.name.clone(),
                    collection: collection.name.clone(),
                });
                continue;
            }

            let current = client.list_indexes(&database.name, &collection.name).await?;
            let mut accounted = vec![false; current.len()];
            let issue = |index: &str| {
                (
                    database.name.clone(),
                    collection.name.clone(),
                    index.to_string(),
                )
            };

            for index in &collection.indexes {
                report.indexes_checked += 1;
                let name = index.resolved_name();

                if let Some(position) = current
                    .iter()
                    .position(|existing| existing.matches(index))
                {
                    accounted[position] = true;
                    continue;
                }

                let (database, collection, index) = issue(&name);
                match current.iter().position(|existing| existing.name == name) {
                    Some(position) => {
                        accounted[position] = true;
                        report.discrepancies.push(Discrepancy::MismatchedIndex {
                            database,
                            collection,
                            index,
                        });
                    }
                    None => report.discrepancies.push(Discrepancy::MissingIndex {
                        database,
                        collection,
                        index,
                    }),
                }
            }

            for (position, existing) in current.iter().enumerate() {
                if accounted[position] || existing.name == ID_INDEX {
                    continue;
                }
                let retired = collection.retired_indexes.contains(&existing.name);
                let (database, collection, index) = issue(&existing.name);
                report.discrepancies.push(if retired {
                    Discrepancy::RetiredIndexPresent {
                        database,
                        collection,
                        index,
                    }
                } else {
                    Discrepancy::UnexpectedIndex {
                        database,
                        collection,
                        index,
                    }
                });
            }
        }
    }

    tracing::info!(
        databases = report.databases_checked,
        indexes = report.indexes_checked,
        discrepancies = report.discrepancies.len(),
        "verification finished"
    );

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admin::ExistingIndex;
    use crate::memory::MemoryAdmin;
    use crate::provisioner::Provisioner;
    use changeapp_kernel::settings::{DatabaseTarget, Environment, Settings};
    use changeapp_kernel::{CollectionSpec, IndexKey, IndexSpec};

    fn plan_for(settings: &Settings) -> ProvisionPlan {
        let orders = CollectionSpec {
            name: "orders",
            indexes: vec![
                IndexSpec::single("orderId").unique().superseded_by_id(),
                IndexSpec::compound(vec![IndexKey::asc("status"), IndexKey::asc("region")]),
            ],
        };
        ProvisionPlan::build(settings, &[("orders", orders)]).unwrap()
    }

    #[tokio::test]
    async fn empty_server_reports_everything_missing() {
        let admin = MemoryAdmin::new();
        let report = verify(&admin, &plan_for(&Settings::default()))
            .await
            .unwrap();

        assert!(!report.is_clean());
        assert_eq!(report.databases_checked, 4);
        assert_eq!(
            report.discrepancies[0],
            Discrepancy::MissingUser {
                user: "changeapp".to_string()
            }
        );
        let missing_collections = report
            .discrepancies
            .iter()
            .filter(|d| matches!(d, Discrepancy::MissingCollection { .. }))
            .count();
        assert_eq!(missing_collections, 4);
    }

    #[tokio::test]
    async fn provisioned_state_verifies_clean() {
        let admin = MemoryAdmin::new();
        let plan = plan_for(&Settings::default());
        Provisioner::new(&admin).apply(&plan).await.unwrap();

        let report = verify(&admin, &plan).await.unwrap();
        assert!(report.is_clean(), "{:?}", report.discrepancies);
        assert_eq!(report.indexes_checked, 8);
    }

    #[tokio::test]
    async fn retired_and_unexpected_indexes_are_reported() {
        let admin = MemoryAdmin::new();
        Provisioner::new(&admin)
            .apply(&plan_for(&Settings::default()))
            .await
            .unwrap();
        admin.insert_index(
            "changeapp_transactions_dev",
            "orders",
            ExistingIndex {
                name: "scratch_1".to_string(),
                keys: vec![IndexKey::asc("scratch")],
                unique: false,
                options: Vec::new(),
            },
        );

        let mut settings = Settings::default();
        settings.provision.databases = vec![DatabaseTarget {
            name: "changeapp_transactions_dev".to_string(),
            environment: Environment::Development,
            id_as_primary_key: true,
        }];
        let report = verify(&admin, &plan_for(&settings)).await.unwrap();

        assert_eq!(
            report.discrepancies,
            vec![
                Discrepancy::RetiredIndexPresent {
                    database: "changeapp_transactions_dev".to_string(),
                    collection: "orders".to_string(),
                    index: "orderId_1".to_string(),
                },
                Discrepancy::UnexpectedIndex {
                    database: "changeapp_transactions_dev".to_string(),
                    collection: "orders".to_string(),
                    index: "scratch_1".to_string(),
                },
            ]
        );
    }

    #[tokio::test]
    async fn mismatched_index_is_reported() {
        let admin = MemoryAdmin::new();
        admin.insert_index(
            "changeapp_transactions",
            "orders",
            ExistingIndex {
                name: "orderId_1".to_string(),
                keys: vec![IndexKey::asc("orderId")],
                unique: false,
                options: Vec::new(),
            },
        );

        let report = verify(&admin, &plan_for(&Settings::default()))
            .await
            .unwrap();
        assert!(report.discrepancies.contains(&Discrepancy::MismatchedIndex {
            database: "changeapp_transactions".to_string(),
            collection: "orders".to_string(),
            index: "orderId_1".to_string(),
        }));
        assert_eq!(
            report.discrepancies[0].to_string(),
            "user 'changeapp' does not exist"
        );
    }

    #[tokio::test]
    async fn index_with_extra_options_is_mismatched() {
        let admin = MemoryAdmin::new();
        let plan = plan_for(&Settings::default());
        Provisioner::new(&admin).apply(&plan).await.unwrap();
        admin.insert_index(
            "changeapp_transactions",
            "orders",
            ExistingIndex {
                name: "status_1_region_1".to_string(),
                keys: vec![IndexKey::asc("status"), IndexKey::asc("region")],
                unique: false,
                options: vec!["sparse".to_string()],
            },
        );

        let report = verify(&admin, &plan).await.unwrap();
        assert_eq!(
            report.discrepancies,
            vec![Discrepancy::MismatchedIndex {
                database: "changeapp_transactions".to_string(),
                collection: "orders".to_string(),
                index: "status_1_region_1".to_string(),
            }]
        );
    }
}
