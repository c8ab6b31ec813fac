//! Tests for the operator CLI: argument parsing and the commands run
//! against the in-memory adapters

use chrono::NaiveDate;
use clap::Parser;
use rust_decimal_macros::dec;

use core_kernel::{ContractId, HealthCheckResult, TenantId};
use domain_receivables::{
    ChargeQuery, ChargeType, DunningStage, LedgerStore, NoticeStatus, PaymentStatus,
};
use interface_cli::{health_report, Cli, Command, Operations, OpsError};
use test_utils::{
    eur, ChargeBuilder, DateFixtures, LedgerHarness, PaymentBuilder, StringFixtures,
};

fn operations(h: &LedgerHarness) -> Operations {
    Operations::new(h.store.clone(), h.directory.clone(), h.audit.clone(), &h.config)
}

/// A contract with one flat rent charge of 1000 due on January 3rd
async fn overdue_contract(h: &LedgerHarness) -> ContractId {
    let (_, _, contract) = h.seed_tenancy("EG-Links", "Kowalski").await;
    h.seed_charge(
        ChargeBuilder::new(h.tenant)
            .with_contract(contract.id)
            .flat(ChargeType::RecurringRent, eur(dec!(1000)))
            .build(),
    )
    .await;
    contract.id
}

// ============================================================================
// Argument parsing
// ============================================================================

mod parse_tests {
    use super::*;

    #[test]
    fn test_auto_match_takes_prefixed_tenant() {
        let tenant = TenantId::new();
        let cli = Cli::try_parse_from([
            "receivables-ops",
            "auto-match",
            "--tenant",
            &tenant.to_string(),
        ])
        .unwrap();
        assert_eq!(cli.command, Command::AutoMatch { tenant });
        assert_eq!(cli.command.tenant(), Some(tenant));
    }

    #[test]
    fn test_suggest_escalations_with_date_and_global_flags() {
        let tenant = TenantId::new();
        let uuid = tenant.as_uuid().to_string();
        let cli = Cli::try_parse_from([
            "receivables-ops",
            "suggest-escalations",
            "--tenant",
            &uuid,
            "--as-of",
            "2024-03-17",
            "--json-logs",
            "--pretty",
        ])
        .unwrap();

        assert!(cli.json_logs);
        assert!(cli.pretty);
        assert_eq!(
            cli.command,
            Command::SuggestEscalations {
                tenant,
                as_of: NaiveDate::from_ymd_opt(2024, 3, 17),
            }
        );
    }

    #[test]
    fn test_migrate_is_not_tenant_scoped() {
        let cli =
            Cli::try_parse_from(["receivables-ops", "migrate", "--config", "ops.toml"]).unwrap();
        assert_eq!(cli.command, Command::Migrate);
        assert_eq!(cli.command.tenant(), None);
        assert_eq!(cli.config.unwrap().to_str(), Some("ops.toml"));
    }

    #[test]
    fn test_missing_or_malformed_tenant_is_rejected() {
        assert!(Cli::try_parse_from(["receivables-ops", "close-settled-notices"]).is_err());
        assert!(
            Cli::try_parse_from(["receivables-ops", "auto-match", "--tenant", "nope"]).is_err()
        );
        assert!(Cli::try_parse_from([
            "receivables-ops",
            "suggest-escalations",
            "--tenant",
            &TenantId::new().to_string(),
            "--as-of",
            "17.03.2024",
        ])
        .is_err());
    }
}

// ============================================================================
// Commands
// ============================================================================

mod command_tests {
    use super::*;

    #[tokio::test]
    async fn test_auto_match_reports_summary() {
        let h = LedgerHarness::new();
        let (_, _, contract) = h.seed_tenancy("EG-Links", "Kowalski").await;
        h.seed_charge(ChargeBuilder::new(h.tenant).with_contract(contract.id).build())
            .await;
        h.seed_payment(
            PaymentBuilder::new(h.tenant)
                .with_memo(StringFixtures::rent_memo())
                .build(),
        )
        .await;

        let summary = operations(&h).auto_match(h.tenant).await.unwrap();

        assert_eq!(summary.processed, 1);
        assert_eq!(summary.matched, 1);
        assert!(h
            .store
            .find_payments_by_status(h.tenant, PaymentStatus::Unclear)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_suggest_escalations_report() {
        let h = LedgerHarness::new();
        let contract_id = overdue_contract(&h).await;
        let as_of = DateFixtures::ymd(2024, 1, 23);

        let report = operations(&h).suggest_escalations(h.tenant, as_of).await.unwrap();

        assert_eq!(report.tenant, h.tenant);
        assert_eq!(report.as_of, as_of);
        assert_eq!(report.suggestions.len(), 1);
        assert_eq!(report.suggestions[0].contract_id, contract_id);
        assert_eq!(report.suggestions[0].recommended_stage, DunningStage::Notice1);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["suggestions"][0]["recommended_stage"], "NOTICE_1");
    }

    #[tokio::test]
    async fn test_close_settled_notices_report() {
        let h = LedgerHarness::new();
        let contract_id = overdue_contract(&h).await;
        let notice = h
            .dunning_service()
            .create_notice(
                &h.ctx,
                contract_id,
                DunningStage::Reminder,
                DateFixtures::ymd(2024, 1, 15),
            )
            .await
            .unwrap();

        let ops = operations(&h);
        assert!(ops.close_settled_notices(h.tenant).await.unwrap().closed.is_empty());

        let allocation = h.allocation_service();
        for charge in h
            .store
            .find_charges(h.tenant, &ChargeQuery::open().for_contract(contract_id))
            .await
            .unwrap()
        {
            let payment = h
                .seed_payment(
                    PaymentBuilder::new(h.tenant).with_amount(charge.outstanding()).build(),
                )
                .await;
            allocation
                .allocate(&h.ctx, payment.id, charge.id, charge.outstanding())
                .await
                .unwrap();
        }

        let report = ops.close_settled_notices(h.tenant).await.unwrap();
        assert_eq!(report.closed.len(), 1);
        assert_eq!(report.closed[0].notice_id, notice.id);
        assert_eq!(report.closed[0].contract_id, contract_id);
        assert_eq!(
            h.store.get_notice(h.tenant, notice.id).await.unwrap().status,
            NoticeStatus::Paid
        );
    }

    #[tokio::test]
    async fn test_unknown_tenant_yields_empty_reports() {
        let h = LedgerHarness::new();
        let other = TenantId::new();
        overdue_contract(&h).await;

        let ops = operations(&h);
        assert_eq!(ops.auto_match(other).await.unwrap().processed, 0);
        assert!(ops
            .suggest_escalations(other, DateFixtures::ymd(2024, 3, 1))
            .await
            .unwrap()
            .suggestions
            .is_empty());
    }

    #[test]
    fn test_health_report_is_unhealthy_if_any_adapter_is() {
        let failing = HealthCheckResult::unhealthy("postgres-ledger-store", "connection refused");

        let report = health_report(vec![
            HealthCheckResult::healthy("postgres-tenancy-directory"),
            failing,
        ]);
        assert!(!report.healthy);
        assert!(health_report(vec![HealthCheckResult::healthy("memory")]).healthy);
    }

    #[test]
    fn test_receivables_errors_keep_their_exit_code() {
        let error = OpsError::from(domain_receivables::ReceivablesError::from(
            core_kernel::PortError::conflict("charge version moved"),
        ));
        assert_eq!(error.exit_code(), 75);
    }
}
