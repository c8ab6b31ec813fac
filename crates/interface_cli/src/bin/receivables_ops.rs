//! Receivables Operator CLI
//!
//! Runs one engine operation against PostgreSQL and prints the result as
//! JSON on stdout. Logs go to stderr.
//!
//! # Usage
//!
//! ```bash
//! receivables-ops migrate
//! receivables-ops auto-match --tenant TEN-6f1c...
//! receivables-ops suggest-escalations --tenant TEN-6f1c... --as-of 2024-03-17
//! receivables-ops close-settled-notices --tenant TEN-6f1c...
//! ```
//!
//! # Environment Variables
//!
//! * `OPS_DATABASE_URL` / `DATABASE_URL` - PostgreSQL connection string
//! * `OPS_MAX_CONNECTIONS` - Pool size (default: 5)
//! * `OPS_LOG_LEVEL` - Level used when `RUST_LOG` is unset (default: info)
//! * `OPS_JSON_LOGS` - `true` for JSON log lines
//! * `OPS_CONFIG_FILE` - Engine configuration file
//! * `RECEIVABLES_*` - Engine settings, e.g. `RECEIVABLES_MATCH_WINDOW_DAYS=45`

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use serde::Serialize;

use core_kernel::HealthCheckable;
use domain_receivables::TracingAuditSink;
use infra_db::{create_pool, run_migrations, PostgresLedgerStore, PostgresTenancyDirectory};
use interface_cli::{
    health_report, init_tracing, Cli, Command, MigrationReport, Operations, OpsConfig, OpsError,
};

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file if present (useful for local development)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!("Command failed: {:#}", error);
            eprintln!("error: {:#}", error);
            let code = error
                .downcast_ref::<OpsError>()
                .map(OpsError::exit_code)
                .unwrap_or(1);
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let ops = OpsConfig::from_env()
        .map_err(OpsError::from)
        .context("loading OPS_* settings")?;
    init_tracing(&ops.log_level, cli.json_logs || ops.json_logs);

    let receivables = ops.receivables(cli.config.as_deref()).map_err(OpsError::from)?;
    tracing::info!(
        command = ?cli.command,
        tenant = ?cli.command.tenant(),
        "Starting receivables-ops"
    );

    let pool = create_pool(ops.database())
        .await
        .map_err(OpsError::from)
        .context("connecting to the database")?;

    let store = Arc::new(PostgresLedgerStore::new(pool.clone()));
    let directory = Arc::new(PostgresTenancyDirectory::new(pool.clone()));

    match cli.command {
        Command::Migrate => {
            run_migrations(&pool).await.map_err(OpsError::from)?;
            print(
                &MigrationReport {
                    versions: infra_db::migrate::embedded_versions(),
                },
                cli.pretty,
            )
        }
        Command::Health => {
            let report =
                health_report(vec![store.health_check().await, directory.health_check().await]);
            print(&report, cli.pretty)
        }
        Command::AutoMatch { tenant } => {
            let operations =
                Operations::new(store, directory, Arc::new(TracingAuditSink), &receivables);
            print(&operations.auto_match(tenant).await?, cli.pretty)
        }
        Command::SuggestEscalations { tenant, as_of } => {
            let operations =
                Operations::new(store, directory, Arc::new(TracingAuditSink), &receivables);
            let as_of = as_of.unwrap_or_else(|| chrono::Utc::now().date_naive());
            print(&operations.suggest_escalations(tenant, as_of).await?, cli.pretty)
        }
        Command::CloseSettledNotices { tenant } => {
            let operations =
                Operations::new(store, directory, Arc::new(TracingAuditSink), &receivables);
            print(&operations.close_settled_notices(tenant).await?, cli.pretty)
        }
    }
}

fn print<T: Serialize>(value: &T, pretty: bool) -> anyhow::Result<()> {
    let json = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    }
    .map_err(OpsError::from)?;
    println!("{}", json);
    Ok(())
}
