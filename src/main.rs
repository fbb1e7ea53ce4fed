use anyhow::Context;
use changeapp_kernel::settings::Settings;
use changeapp_provision::Bootstrap;

/// One-shot deployment bootstrap: user, databases, collections, indexes.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load().with_context(|| "failed to load changeapp settings")?;
    changeapp_telemetry::init(&settings.telemetry)?;

    tracing::info!(
        env = %settings.environment,
        admin_db = %settings.mongo.admin_database,
        "changeapp-provision bootstrap starting"
    );

    let client = changeapp_db::connect(&settings.mongo)
        .await
        .with_context(|| "failed to connect to MongoDB")?;

    let bootstrap = Bootstrap::new(settings);
    let report = bootstrap.apply(client.as_ref(), None, false).await?;

    let databases: Vec<_> = report.databases.iter().map(|db| db.name.as_str()).collect();
    tracing::info!(
        databases = ?databases,
        user = %bootstrap.settings().provision.user.name,
        user_outcome = ?report.user,
        changes = report.changes(),
        "changeapp-provision bootstrap complete"
    );
    Ok(())
}
