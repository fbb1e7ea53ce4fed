pub mod indexes;
pub mod models;

use async_trait::async_trait;
use changeapp_kernel::{CollectionSpec, InitCtx, Module};

pub const COLLECTION: &str = "transactions";

/// Owns the `transactions` collection in every logical database
pub struct TransactionsModule;

impl TransactionsModule {
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Module for TransactionsModule {
    fn name(&self) -> &'static str {
        "transactions"
    }

    async fn init(&self, ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        let overridden = ctx.settings.provision.collections.contains_key(COLLECTION);
        tracing::info!(
            module = self.name(),
            environment = %ctx.settings.environment,
            index_override = overridden,
            "transactions module initialized"
        );
        Ok(())
    }

    fn collections(&self) -> Vec<CollectionSpec> {
        vec![CollectionSpec {
            name: COLLECTION,
            indexes: indexes::default_indexes(),
        }]
    }
}

/// Create a new instance of the transactions module
pub fn create_module() -> std::sync::Arc<dyn Module> {
    std::sync::Arc::new(TransactionsModule::new())
}
