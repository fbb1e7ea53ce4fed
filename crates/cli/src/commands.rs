//! Subcommand handlers

use std::process::ExitCode;

use anyhow::Context;
use changeapp_db::{ProvisionReport, UserOutcome, VerifyReport};
use changeapp_kernel::ProvisionPlan;
use changeapp_provision::Bootstrap;
use serde::Serialize;

use crate::{Cli, Commands, OutputFormat};

/// Exit code for a verification run that found discrepancies.
const EXIT_DRIFT: u8 = 2;

pub async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let settings = cli.load_settings()?;
    changeapp_telemetry::init(&settings.telemetry)?;

    tracing::debug!(env = %settings.environment, "changeapp cli starting");
    let bootstrap = Bootstrap::new(settings);

    match cli.command {
        Commands::Plan { only, format } => {
            let plan = bootstrap.plan(only).await?;
            emit(format, &plan, render_plan)?;
            Ok(ExitCode::SUCCESS)
        }

        Commands::Apply {
            only,
            dry_run,
            format,
        } => {
            let client = changeapp_db::connect(&bootstrap.settings().mongo)
                .await
                .with_context(|| "failed to connect to MongoDB")?;
            let report = bootstrap.apply(client.as_ref(), only, dry_run).await?;
            emit(format, &report, render_report)?;
            Ok(ExitCode::SUCCESS)
        }

        Commands::Verify { only, format } => {
            let client = changeapp_db::connect(&bootstrap.settings().mongo)
                .await
                .with_context(|| "failed to connect to MongoDB")?;
            let report = bootstrap.verify(client.as_ref(), only).await?;
            emit(format, &report, render_verify)?;

            if report.is_clean() {
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::from(EXIT_DRIFT))
            }
        }
    }
}

fn emit<T: Serialize>(format: OutputFormat, value: &T, text: fn(&T) -> String) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value).context("failed to encode output")?;
            println!("{json}");
        }
        OutputFormat::Text => print!("{}", text(value)),
    }
    Ok(())
}

fn render_plan(plan: &ProvisionPlan) -> String {
    let mut out = String::new();
    let roles = plan
        .user
        .roles
        .iter()
        .map(|grant| format!("{}@{}", grant.role, grant.db))
        .collect::<Vec<_>>()
        .join(", ");
    out.push_str(&format!(
        "user {} on {} [{}]\n",
        plan.user.name, plan.admin_database, roles
    ));

    for database in &plan.databases {
        out.push_str(&format!("database {} ({})\n", database.name, database.environment));
        for collection in &database.collections {
            out.push_str(&format!("  collection {}\n", collection.name));
            for index in &collection.indexes {
                out.push_str(&format!("    index {index}\n"));
            }
            for retired in &collection.retired_indexes {
                out.push_str(&format!("    retire {retired}\n"));
            }
        }
    }
    out
}

fn render_report(report: &ProvisionReport) -> String {
    let mut out = String::new();
    if report.dry_run {
        out.push_str("dry run: no changes were made\n");
    }

    let user = match &report.user {
        UserOutcome::Created => "created".to_string(),
        UserOutcome::Unchanged => "unchanged".to_string(),
        UserOutcome::RolesGranted { roles } => format!("granted {} roles", roles.len()),
    };
    out.push_str(&format!("user: {user}\n"));

    for database in &report.databases {
        for collection in &database.collections {
            out.push_str(&format!(
                "{}.{}: collection {}, {} indexes created, {} unchanged, {} dropped\n",
                database.name,
                collection.name,
                if collection.created { "created" } else { "present" },
                collection.indexes_created.len(),
                collection.indexes_unchanged.len(),
                collection.indexes_dropped.len(),
            ));
        }
    }
    out.push_str(&format!("{} changes\n", report.changes()));
    out
}

fn render_verify(report: &VerifyReport) -> String {
    let mut out = String::new();
    for discrepancy in &report.discrepancies {
        out.push_str(&format!("- {discrepancy}\n"));
    }
    if report.is_clean() {
        out.push_str(&format!(
            "ok: {} databases, {} indexes match the plan\n",
            report.databases_checked, report.indexes_checked
        ));
    } else {
        out.push_str(&format!("{} discrepancies found\n", report.discrepancies.len()));
    }
    out
}
