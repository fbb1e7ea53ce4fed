//! MongoDB administration layer: connects to the admin interface, applies a
//! [`ProvisionPlan`](changeapp_kernel::ProvisionPlan), and verifies the result.

pub mod admin;
pub mod error;
pub mod memory;
pub mod mongo;
pub mod provisioner;
pub mod verify;

use changeapp_kernel::settings::MongoSettings;

pub use admin::{AdminClient, ExistingIndex, ExistingUser};
pub use error::{DbError, DbResult};
pub use memory::MemoryAdmin;
pub use mongo::MongoAdmin;
pub use provisioner::{ProvisionReport, Provisioner, UserOutcome};
pub use verify::{verify, Discrepancy, VerifyReport};

/// URI scheme that selects the in-process backend.
pub const MEMORY_SCHEME: &str = "mem://";

/// Open an admin client for the configured URI.
pub async fn connect(settings: &MongoSettings) -> DbResult<Box<dyn AdminClient>> {
    if settings.uri.starts_with(MEMORY_SCHEME) {
        tracing::info!(target: "changeapp-db", "using in-memory admin backend");
        return Ok(Box::new(MemoryAdmin::new()));
    }

    let admin = MongoAdmin::connect(settings).await?;
    Ok(Box::new(admin))
}
