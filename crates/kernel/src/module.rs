use async_trait::async_trait;

use crate::index::IndexSpec;

/// Context provided to modules during initialization
pub struct InitCtx<'a> {
    pub settings: &'a crate::settings::Settings,
}

/// Collection owned by a module, with the indexes it needs by default
#[derive(Debug, Clone)]
pub struct CollectionSpec {
    pub name: &'static str,
    pub indexes: Vec<IndexSpec>,
}

/// Unit of provisioning: a module owns collections and declares their indexes
#[async_trait]
pub trait Module: Sync + Send {
    /// Unique name for this module
    fn name(&self) -> &'static str;

    /// Initialize the module with the provided context
    /// Called before the provisioning plan is assembled
    async fn init(&self, _ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    /// Collections this module owns in every logical database
    fn collections(&self) -> Vec<CollectionSpec> {
        vec![]
    }
}
