pub mod index;
pub mod module;
pub mod plan;
pub mod registry;
pub mod settings;

pub use index::{IndexKey, IndexSpec, SortOrder};
pub use module::{CollectionSpec, InitCtx, Module};
pub use plan::{CollectionPlan, DatabasePlan, PlanError, ProvisionPlan, RoleGrant, UserPlan};
pub use registry::ModuleRegistry;
