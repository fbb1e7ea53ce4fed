use anyhow::Context;
use std::sync::Arc;

use crate::module::{CollectionSpec, InitCtx, Module};
use crate::plan::ProvisionPlan;
use crate::settings::Settings;

/// Module registry: owns the modules whose collections get provisioned
pub struct ModuleRegistry {
    modules: Vec<Arc<dyn Module>>,
}

impl ModuleRegistry {
    /// Create a new module registry
    pub fn new() -> Self {
        Self {
            modules: Vec::new(),
        }
    }

    /// Register a module with the registry
    pub fn register(&mut self, module: Arc<dyn Module>) {
        self.modules.push(module);
    }

    /// Get all registered modules in registration order
    pub fn modules(&self) -> &[Arc<dyn Module>] {
        &self.modules
    }

    /// Get a module by name
    pub fn get_module(&self, name: &str) -> Option<&Arc<dyn Module>> {
        self.modules.iter().find(|module| module.name() == name)
    }

    /// Initialize modules in registration order
    pub async fn init_modules(&self, ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        tracing::info!("initializing {} modules", self.modules.len());

        for module in &self.modules {
            tracing::info!(module = module.name(), "initializing module");

            module
                .init(ctx)
                .await
                .with_context(|| format!("failed to initialize module '{}'", module.name()))?;
        }

        Ok(())
    }

    /// Collect all collections from all modules, tagged with their owner
    pub fn collect_collections(&self) -> Vec<(&'static str, CollectionSpec)> {
        let mut collections = Vec::new();

        for module in &self.modules {
            for collection in module.collections() {
                collections.push((module.name(), collection));
            }
        }

        // Sort by module name and collection name for deterministic ordering
        collections.sort_by(|a, b| a.0.cmp(b.0).then_with(|| a.1.name.cmp(b.1.name)));

        collections
    }

    /// Build the provisioning plan for the given settings
    pub fn plan(&self, settings: &Settings) -> anyhow::Result<ProvisionPlan> {
        let collections = self.collect_collections();
        let plan = ProvisionPlan::build(settings, &collections)
            .with_context(|| "failed to build provisioning plan")?;

        tracing::debug!(
            databases = plan.databases.len(),
            indexes = plan.index_count(),
            "provisioning plan built"
        );

        Ok(plan)
    }
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}
