//! Integration tests for the dunning engine

use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal_macros::dec;

use core_kernel::ContractId;

use domain_receivables::{
    AuditAction, ChargeOrigin, ChargeQuery, ChargeStatus, ChargeType, DunningStage, ErrorKind,
    LedgerStore, NoticeChargeKind, NoticeStatus, TenancyDirectory,
};
use test_utils::{
    eur, ChargeBuilder, DateFixtures, FailingDocumentGenerator, LedgerHarness, PaymentBuilder,
    RecordingDocumentGenerator,
};

fn jan(day: u32) -> NaiveDate {
    DateFixtures::ymd(2024, 1, day)
}

/// A contract with one flat charge of 1000 due on January 3rd
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

/// Pays every open charge of the contract in full
async fn settle_contract(h: &LedgerHarness, contract_id: ContractId) {
    let charges = h
        .store
        .find_charges(h.tenant, &ChargeQuery::open().for_contract(contract_id))
        .await
        .unwrap();
    let service = h.allocation_service();
    for charge in charges {
        let payment = h
            .seed_payment(PaymentBuilder::new(h.tenant).with_amount(charge.outstanding()).build())
            .await;
        service
            .allocate(&h.ctx, payment.id, charge.id, charge.outstanding())
            .await
            .unwrap();
    }
}

// ============================================================================
// Notice creation
// ============================================================================

mod create_notice_tests {
    use super::*;

    #[tokio::test]
    async fn test_notice_books_fee_and_interest_charges() {
        let h = LedgerHarness::new();
        let contract_id = overdue_contract(&h).await;

        let notice = h
            .dunning_service()
            .create_notice(
                &h.ctx,
                contract_id,
                DunningStage::Notice1,
                DateFixtures::ymd(2024, 3, 17),
            )
            .await
            .unwrap();

        assert_eq!(notice.status, NoticeStatus::Open);
        assert_eq!(notice.outstanding, eur(dec!(1000)));
        assert_eq!(notice.late_fee, eur(dec!(5)));
        assert_eq!(notice.interest, eur(dec!(10.00)));

        let fee = h.charge(notice.fee_charge_id.unwrap()).await;
        assert_eq!(fee.charge_type, ChargeType::LateFee);
        assert_eq!(fee.total, eur(dec!(5)));
        assert_eq!(fee.due_date, DateFixtures::ymd(2024, 3, 17));
        assert_eq!(fee.title, "Late fee NOTICE_1");
        assert_eq!(
            fee.origin,
            Some(ChargeOrigin::DunningNotice {
                notice_id: notice.id,
                kind: NoticeChargeKind::LateFee
            })
        );

        let interest = h.charge(notice.interest_charge_id.unwrap()).await;
        assert_eq!(interest.charge_type, ChargeType::Interest);
        assert_eq!(interest.total, eur(dec!(10.00)));

        assert_eq!(h.audit.events_with_action(AuditAction::NoticeCreated).len(), 1);
        assert_eq!(h.audit.events_with_action(AuditAction::ChargeCreated).len(), 2);
    }

    #[tokio::test]
    async fn test_reminder_has_no_fee_charge() {
        let h = LedgerHarness::new();
        let contract_id = overdue_contract(&h).await;

        let notice = h
            .dunning_service()
            .create_notice(&h.ctx, contract_id, DunningStage::Reminder, jan(3))
            .await
            .unwrap();

        assert!(notice.late_fee.is_zero());
        assert!(notice.interest.is_zero());
        assert!(notice.fee_charge_id.is_none());
        assert!(notice.interest_charge_id.is_none());
    }

    #[tokio::test]
    async fn test_stages_only_move_forward() {
        let h = LedgerHarness::new();
        let contract_id = overdue_contract(&h).await;
        let service = h.dunning_service();
        service
            .create_notice(&h.ctx, contract_id, DunningStage::Notice1, jan(20))
            .await
            .unwrap();

        for stage in [DunningStage::Reminder, DunningStage::Notice1] {
            let err = service
                .create_notice(&h.ctx, contract_id, stage, jan(25))
                .await
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::PreconditionFailed);
        }

        let next = service
            .create_notice(
                &h.ctx,
                contract_id,
                DunningStage::Notice2,
                DateFixtures::ymd(2024, 2, 7),
            )
            .await
            .unwrap();
        assert_eq!(next.stage, DunningStage::Notice2);
    }

    #[tokio::test]
    async fn test_cancelled_notice_does_not_block() {
        let h = LedgerHarness::new();
        let contract_id = overdue_contract(&h).await;
        let service = h.dunning_service();
        let first = service
            .create_notice(&h.ctx, contract_id, DunningStage::Notice1, jan(20))
            .await
            .unwrap();
        service.cancel_notice(&h.ctx, first.id).await.unwrap();

        service
            .create_notice(&h.ctx, contract_id, DunningStage::Reminder, jan(21))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_nothing_outstanding_is_precondition_failure() {
        let h = LedgerHarness::new();
        let contract_id = overdue_contract(&h).await;
        settle_contract(&h, contract_id).await;

        let err = h
            .dunning_service()
            .create_notice(&h.ctx, contract_id, DunningStage::Reminder, jan(20))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PreconditionFailed);
    }

    #[tokio::test]
    async fn test_unknown_contract_is_not_found() {
        let h = LedgerHarness::new();
        let err = h
            .dunning_service()
            .create_notice(&h.ctx, ContractId::new(), DunningStage::Reminder, jan(20))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_document_generator_receives_notice() {
        let h = LedgerHarness::new();
        let contract_id = overdue_contract(&h).await;
        let documents = Arc::new(RecordingDocumentGenerator::new());

        let notice = h
            .dunning_service()
            .with_documents(documents.clone())
            .create_notice(&h.ctx, contract_id, DunningStage::Reminder, jan(12))
            .await
            .unwrap();

        let generated = documents.generated();
        assert_eq!(generated.len(), 1);
        assert_eq!(generated[0].id, notice.id);
    }

    #[tokio::test]
    async fn test_document_failure_keeps_notice() {
        let h = LedgerHarness::new();
        let contract_id = overdue_contract(&h).await;

        let notice = h
            .dunning_service()
            .with_documents(Arc::new(FailingDocumentGenerator))
            .create_notice(&h.ctx, contract_id, DunningStage::Notice1, jan(20))
            .await
            .unwrap();

        let stored = h.store.get_notice(h.tenant, notice.id).await.unwrap();
        assert_eq!(stored.status, NoticeStatus::Open);
        assert!(h.charge(notice.fee_charge_id.unwrap()).await.is_open());
    }
}

// ============================================================================
// Notice lifecycle
// ============================================================================

mod lifecycle_tests {
    use super::*;

    #[tokio::test]
    async fn test_cancel_notice_cancels_its_charges() {
        let h = LedgerHarness::new();
        let contract_id = overdue_contract(&h).await;
        let service = h.dunning_service();
        let notice = service
            .create_notice(
                &h.ctx,
                contract_id,
                DunningStage::Notice2,
                DateFixtures::ymd(2024, 3, 17),
            )
            .await
            .unwrap();

        let cancelled = service.cancel_notice(&h.ctx, notice.id).await.unwrap();

        assert_eq!(cancelled.status, NoticeStatus::Cancelled);
        assert_eq!(h.charge(notice.fee_charge_id.unwrap()).await.status, ChargeStatus::Cancelled);
        assert_eq!(
            h.charge(notice.interest_charge_id.unwrap()).await.status,
            ChargeStatus::Cancelled
        );

        let again = service.cancel_notice(&h.ctx, notice.id).await.unwrap();
        assert_eq!(again.version, cancelled.version);
        assert_eq!(h.audit.events_with_action(AuditAction::NoticeCancelled).len(), 1);
    }

    #[tokio::test]
    async fn test_mark_sent_once() {
        let h = LedgerHarness::new();
        let contract_id = overdue_contract(&h).await;
        let service = h.dunning_service();
        let notice = service
            .create_notice(&h.ctx, contract_id, DunningStage::Reminder, jan(12))
            .await
            .unwrap();

        let sent = service.mark_sent(&h.ctx, notice.id).await.unwrap();
        assert_eq!(sent.status, NoticeStatus::Sent);

        let err = service.mark_sent(&h.ctx, notice.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PreconditionFailed);
    }

    #[tokio::test]
    async fn test_close_settled_notices() {
        let h = LedgerHarness::new();
        let contract_id = overdue_contract(&h).await;
        let open_contract = {
            let (_, _, contract) = h.seed_tenancy("OG-Rechts", "Nguyen").await;
            h.seed_charge(ChargeBuilder::new(h.tenant).with_contract(contract.id).build())
                .await;
            contract.id
        };
        let service = h.dunning_service();
        let settled_notice = service
            .create_notice(&h.ctx, contract_id, DunningStage::Notice1, jan(20))
            .await
            .unwrap();
        service.mark_sent(&h.ctx, settled_notice.id).await.unwrap();
        let open_notice = service
            .create_notice(&h.ctx, open_contract, DunningStage::Reminder, jan(12))
            .await
            .unwrap();

        settle_contract(&h, contract_id).await;
        let closed = service.close_settled_notices(&h.ctx).await.unwrap();

        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].id, settled_notice.id);
        assert_eq!(closed[0].status, NoticeStatus::Paid);
        let untouched = h.store.get_notice(h.tenant, open_notice.id).await.unwrap();
        assert_eq!(untouched.status, NoticeStatus::Open);

        let err = service.cancel_notice(&h.ctx, settled_notice.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PreconditionFailed);

        assert!(service.close_settled_notices(&h.ctx).await.unwrap().is_empty());
    }
}

// ============================================================================
// Escalation suggestions
// ============================================================================

mod escalation_tests {
    use super::*;

    #[tokio::test]
    async fn test_suggestions_follow_thresholds() {
        let h = LedgerHarness::new();
        let contract_id = overdue_contract(&h).await;
        let service = h.dunning_service();

        let suggestions = service.suggest_escalations(&h.ctx, jan(23)).await.unwrap();
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].contract_id, contract_id);
        assert_eq!(suggestions[0].current_stage, None);
        assert_eq!(suggestions[0].recommended_stage, DunningStage::Notice1);
        assert_eq!(suggestions[0].days_overdue, 20);
        assert_eq!(suggestions[0].outstanding, eur(dec!(1000)));

        service
            .create_notice(&h.ctx, contract_id, DunningStage::Notice1, jan(23))
            .await
            .unwrap();

        let suggestions = service
            .suggest_escalations(&h.ctx, DateFixtures::ymd(2024, 2, 7))
            .await
            .unwrap();
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].current_stage, Some(DunningStage::Notice1));
        assert_eq!(suggestions[0].recommended_stage, DunningStage::Notice2);
        assert_eq!(suggestions[0].days_overdue, 35);
    }

    #[tokio::test]
    async fn test_grace_period_and_reminder() {
        let h = LedgerHarness::new();
        overdue_contract(&h).await;
        let service = h.dunning_service();

        assert!(service.suggest_escalations(&h.ctx, jan(10)).await.unwrap().is_empty());

        let suggestions = service.suggest_escalations(&h.ctx, jan(11)).await.unwrap();
        assert_eq!(suggestions[0].recommended_stage, DunningStage::Reminder);
    }

    #[tokio::test]
    async fn test_no_suggestion_between_thresholds() {
        let h = LedgerHarness::new();
        let contract_id = overdue_contract(&h).await;
        let service = h.dunning_service();
        service
            .create_notice(&h.ctx, contract_id, DunningStage::Notice1, jan(23))
            .await
            .unwrap();

        assert!(service.suggest_escalations(&h.ctx, jan(25)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_longest_overdue_first() {
        let h = LedgerHarness::new();
        overdue_contract(&h).await;
        let (_, _, older) = h.seed_tenancy("OG-Rechts", "Nguyen").await;
        h.seed_charge(
            ChargeBuilder::new(h.tenant)
                .with_contract(older.id)
                .with_due_date(DateFixtures::ymd(2023, 12, 3))
                .build(),
        )
        .await;

        let suggestions = h
            .dunning_service()
            .suggest_escalations(&h.ctx, jan(23))
            .await
            .unwrap();

        assert_eq!(suggestions.len(), 2);
        assert_eq!(suggestions[0].contract_id, older.id);
        assert_eq!(suggestions[0].days_overdue, 51);
    }

    #[tokio::test]
    async fn test_moved_out_contracts_are_skipped() {
        let h = LedgerHarness::new();
        let contract_id = overdue_contract(&h).await;
        let mut contract = h
            .directory
            .get_contract(h.tenant, contract_id)
            .await
            .unwrap();
        contract.move_out_date = Some(DateFixtures::ymd(2023, 12, 31));
        h.directory.update_contract(contract).await;

        assert!(h
            .dunning_service()
            .suggest_escalations(&h.ctx, jan(23))
            .await
            .unwrap()
            .is_empty());
    }
}
