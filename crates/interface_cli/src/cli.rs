//! Command line definition

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};

use core_kernel::TenantId;

/// Operator tool for the receivables engine
#[derive(Debug, Parser)]
#[command(name = "receivables-ops", version, about)]
pub struct Cli {
    /// Engine configuration file, layered under `RECEIVABLES_*` variables
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Pretty-print the JSON result
    #[arg(long, global = true)]
    pub pretty: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Apply pending schema migrations
    Migrate,

    /// Check database connectivity of the ledger and directory adapters
    Health,

    /// Run the auto-match rules over every unclear payment of a tenant
    AutoMatch {
        #[arg(long, value_name = "TENANT_ID")]
        tenant: TenantId,
    },

    /// List contracts whose dunning stage should be raised
    SuggestEscalations {
        #[arg(long, value_name = "TENANT_ID")]
        tenant: TenantId,

        /// Evaluation date (YYYY-MM-DD); defaults to today
        #[arg(long, value_name = "DATE")]
        as_of: Option<NaiveDate>,
    },

    /// Mark active notices of fully settled contracts as paid
    CloseSettledNotices {
        #[arg(long, value_name = "TENANT_ID")]
        tenant: TenantId,
    },
}

impl Command {
    /// Tenant the command runs for, if it is tenant-scoped
    pub fn tenant(&self) -> Option<TenantId> {
        match self {
            Command::Migrate | Command::Health => None,
            Command::AutoMatch { tenant }
            | Command::SuggestEscalations { tenant, .. }
            | Command::CloseSettledNotices { tenant } => Some(*tenant),
        }
    }
}
