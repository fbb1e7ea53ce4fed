//! Wiring between settings, registered modules, and the db layer.

use anyhow::Context;
use changeapp_db::{verify, AdminClient, ProvisionReport, Provisioner, VerifyReport};
use changeapp_kernel::settings::{Environment, Settings};
use changeapp_kernel::{InitCtx, ModuleRegistry, ProvisionPlan};

use crate::modules;

/// Registry with every project module, ready to plan against settings.
pub struct Bootstrap {
    registry: ModuleRegistry,
    settings: Settings,
}

impl Bootstrap {
    pub fn new(settings: Settings) -> Self {
        let mut registry = ModuleRegistry::new();
        modules::register_all(&mut registry);
        Self { registry, settings }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    /// Initialize modules and resolve the plan, optionally narrowed to one
    /// environment's databases.
    pub async fn plan(&self, only: Option<Environment>) -> anyhow::Result<ProvisionPlan> {
        let ctx = InitCtx {
            settings: &self.settings,
        };
        self.registry.init_modules(&ctx).await?;

        let plan = self.registry.plan(&self.settings)?;
        let plan = match only {
            Some(environment) => {
                let plan = plan.only(environment);
                if plan.databases.is_empty() {
                    anyhow::bail!("no databases configured for environment '{environment}'");
                }
                plan
            }
            None => plan,
        };

        Ok(plan)
    }

    pub async fn apply(
        &self,
        client: &dyn AdminClient,
        only: Option<Environment>,
        dry_run: bool,
    ) -> anyhow::Result<ProvisionReport> {
        let plan = self.plan(only).await?;
        Provisioner::new(client)
            .dry_run(dry_run)
            .apply(&plan)
            .await
            .with_context(|| "provisioning failed")
    }

    pub async fn verify(
        &self,
        client: &dyn AdminClient,
        only: Option<Environment>,
    ) -> anyhow::Result<VerifyReport> {
        let plan = self.plan(only).await?;
        verify(client, &plan)
            .await
            .with_context(|| "verification failed")
    }
}
