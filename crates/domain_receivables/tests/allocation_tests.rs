//! Integration tests for the allocation engine

use rust_decimal_macros::dec;

use core_kernel::{AllocationId, ChargeId, Currency, Money, PaymentId};

use domain_receivables::{
    AllocationService, AllocationSource, AuditAction, ChargeComponent, ChargeStatus, ChargeType,
    CreditBalance, ErrorKind, LedgerChangeSet, LedgerStore, PaymentStatus, ReceivablesError,
    SplitPart,
};
use test_utils::{
    assert_charge_invariants, assert_payment_invariants, eur, ChargeBuilder, FailingAuditSink,
    LedgerHarness, PaymentBuilder,
};

fn rent_components() -> Vec<(ChargeComponent, Money)> {
    vec![
        (ChargeComponent::ColdRent, eur(dec!(800))),
        (ChargeComponent::UtilityAdvance, eur(dec!(100))),
        (ChargeComponent::HeatingAdvance, eur(dec!(50))),
    ]
}

async fn check_invariants(harness: &LedgerHarness, payment_id: PaymentId, charge_ids: &[ChargeId]) {
    let payment = harness.payment(payment_id).await;
    let allocations = harness
        .store
        .allocations_for_payment(harness.tenant, payment_id)
        .await
        .unwrap();
    assert_payment_invariants(&payment, &allocations);
    for id in charge_ids {
        assert_charge_invariants(&harness.charge(*id).await);
    }
}

// ============================================================================
// Allocate
// ============================================================================

mod allocate_tests {
    use super::*;

    #[tokio::test]
    async fn test_waterfall_fills_advances_first() {
        let h = LedgerHarness::new();
        let charge = h
            .seed_charge(ChargeBuilder::new(h.tenant).with_components(rent_components()).build())
            .await;
        let payment = h
            .seed_payment(PaymentBuilder::new(h.tenant).with_amount(eur(dec!(120))).build())
            .await;

        let allocation = h
            .allocation_service()
            .allocate(&h.ctx, payment.id, charge.id, eur(dec!(120)))
            .await
            .unwrap();

        let charge = h.charge(charge.id).await;
        assert_eq!(charge.covered_component(ChargeComponent::UtilityAdvance), Some(eur(dec!(100))));
        assert_eq!(charge.covered_component(ChargeComponent::HeatingAdvance), Some(eur(dec!(20))));
        assert_eq!(charge.covered_component(ChargeComponent::ColdRent), Some(eur(dec!(0))));
        assert_eq!(charge.status, ChargeStatus::PartiallyPaid);
        assert_eq!(charge.covered_total, eur(dec!(120)));

        let payment = h.payment(payment.id).await;
        assert_eq!(payment.status, PaymentStatus::Allocated);
        assert_eq!(allocation.source, AllocationSource::Manual);
        assert_eq!(allocation.amount, eur(dec!(120)));
        check_invariants(&h, payment.id, &[charge.id]).await;
    }

    #[tokio::test]
    async fn test_partial_allocation_leaves_payment_partially_allocated() {
        let h = LedgerHarness::new();
        let charge = h.seed_charge(ChargeBuilder::new(h.tenant).build()).await;
        let payment = h
            .seed_payment(PaymentBuilder::new(h.tenant).with_amount(eur(dec!(1000))).build())
            .await;

        h.allocation_service()
            .allocate(&h.ctx, payment.id, charge.id, eur(dec!(950)))
            .await
            .unwrap();

        let payment = h.payment(payment.id).await;
        assert_eq!(payment.status, PaymentStatus::PartiallyAllocated);
        assert_eq!(payment.unallocated(), eur(dec!(50)));
        assert_eq!(h.charge(charge.id).await.status, ChargeStatus::Paid);
    }

    #[tokio::test]
    async fn test_flat_charge_has_no_component_shares() {
        let h = LedgerHarness::new();
        let charge = h
            .seed_charge(
                ChargeBuilder::new(h.tenant)
                    .flat(ChargeType::Deposit, eur(dec!(1500)))
                    .build(),
            )
            .await;
        let payment = h
            .seed_payment(PaymentBuilder::new(h.tenant).with_amount(eur(dec!(500))).build())
            .await;

        let allocation = h
            .allocation_service()
            .allocate(&h.ctx, payment.id, charge.id, eur(dec!(500)))
            .await
            .unwrap();

        assert!(allocation.components.is_empty());
        assert_eq!(h.charge(charge.id).await.outstanding(), eur(dec!(1000)));
    }

    #[tokio::test]
    async fn test_insufficient_payment_balance_states_amounts() {
        let h = LedgerHarness::new();
        let charge = h.seed_charge(ChargeBuilder::new(h.tenant).build()).await;
        let payment = h
            .seed_payment(PaymentBuilder::new(h.tenant).with_amount(eur(dec!(100))).build())
            .await;

        let err = h
            .allocation_service()
            .allocate(&h.ctx, payment.id, charge.id, eur(dec!(150)))
            .await
            .unwrap_err();

        match err {
            ReceivablesError::InsufficientPaymentBalance {
                requested,
                available,
                shortfall,
                ..
            } => {
                assert_eq!(requested, eur(dec!(150)));
                assert_eq!(available, eur(dec!(100)));
                assert_eq!(shortfall, eur(dec!(50)));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(h.charge(charge.id).await.covered_total, eur(dec!(0)));
    }

    #[tokio::test]
    async fn test_exceeding_outstanding_is_rejected() {
        let h = LedgerHarness::new();
        let charge = h.seed_charge(ChargeBuilder::new(h.tenant).build()).await;
        let payment = h
            .seed_payment(PaymentBuilder::new(h.tenant).with_amount(eur(dec!(2000))).build())
            .await;

        let err = h
            .allocation_service()
            .allocate(&h.ctx, payment.id, charge.id, eur(dec!(1000)))
            .await
            .unwrap_err();

        match err {
            ReceivablesError::ExceedsOutstandingCharge { outstanding, excess, .. } => {
                assert_eq!(outstanding, eur(dec!(950)));
                assert_eq!(excess, eur(dec!(50)));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_non_positive_amount_is_validation_error() {
        let h = LedgerHarness::new();
        let charge = h.seed_charge(ChargeBuilder::new(h.tenant).build()).await;
        let payment = h.seed_payment(PaymentBuilder::new(h.tenant).build()).await;

        let err = h
            .allocation_service()
            .allocate(&h.ctx, payment.id, charge.id, eur(dec!(0)))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_currency_mismatch_is_rejected() {
        let h = LedgerHarness::new();
        let charge = h.seed_charge(ChargeBuilder::new(h.tenant).build()).await;
        let payment = h
            .seed_payment(
                PaymentBuilder::new(h.tenant)
                    .with_amount(Money::new(dec!(100), Currency::CHF))
                    .build(),
            )
            .await;

        let err = h
            .allocation_service()
            .allocate(&h.ctx, payment.id, charge.id, Money::new(dec!(100), Currency::CHF))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(h.payment(payment.id).await.status, PaymentStatus::Unclear);
    }

    #[tokio::test]
    async fn test_cancelled_charge_is_precondition_failure() {
        let h = LedgerHarness::new();
        let charge = h.seed_charge(ChargeBuilder::new(h.tenant).build()).await;
        let payment = h.seed_payment(PaymentBuilder::new(h.tenant).build()).await;
        let service = h.allocation_service();
        service.cancel_charge(&h.ctx, charge.id).await.unwrap();

        let err = service
            .allocate(&h.ctx, payment.id, charge.id, eur(dec!(100)))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PreconditionFailed);
    }

    #[tokio::test]
    async fn test_ignored_payment_cannot_be_allocated() {
        let h = LedgerHarness::new();
        let charge = h.seed_charge(ChargeBuilder::new(h.tenant).build()).await;
        let payment = h.seed_payment(PaymentBuilder::new(h.tenant).build()).await;
        h.auto_match_service().ignore_payment(&h.ctx, payment.id).await.unwrap();

        let err = h
            .allocation_service()
            .allocate(&h.ctx, payment.id, charge.id, eur(dec!(100)))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PreconditionFailed);
    }

    #[tokio::test]
    async fn test_other_tenant_rows_are_not_found() {
        let h = LedgerHarness::new();
        let other = LedgerHarness::new();
        let charge = h.seed_charge(ChargeBuilder::new(h.tenant).build()).await;
        let payment = h.seed_payment(PaymentBuilder::new(h.tenant).build()).await;

        let service = AllocationService::new(h.store.clone(), h.audit.clone(), Default::default());
        let err = service
            .allocate(&other.ctx, payment.id, charge.id, eur(dec!(100)))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_allocation_is_audited() {
        let h = LedgerHarness::new();
        let charge = h.seed_charge(ChargeBuilder::new(h.tenant).build()).await;
        let payment = h.seed_payment(PaymentBuilder::new(h.tenant).build()).await;

        let allocation = h
            .allocation_service()
            .allocate(&h.ctx, payment.id, charge.id, eur(dec!(950)))
            .await
            .unwrap();

        let events = h.audit.events_with_action(AuditAction::AllocationCreated);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].entity_id, allocation.id.to_string());
        assert_eq!(events[0].tenant_id, h.tenant);
        assert!(events[0].after.is_some());
    }

    #[tokio::test]
    async fn test_audit_failure_does_not_fail_operation() {
        let h = LedgerHarness::new();
        let charge = h.seed_charge(ChargeBuilder::new(h.tenant).build()).await;
        let payment = h.seed_payment(PaymentBuilder::new(h.tenant).build()).await;
        let service = AllocationService::new(
            h.store.clone(),
            std::sync::Arc::new(FailingAuditSink),
            Default::default(),
        );

        service
            .allocate(&h.ctx, payment.id, charge.id, eur(dec!(950)))
            .await
            .unwrap();

        assert_eq!(h.charge(charge.id).await.status, ChargeStatus::Paid);
    }
}

// ============================================================================
// Reverse
// ============================================================================

mod reverse_tests {
    use super::*;

    #[tokio::test]
    async fn test_allocate_then_reverse_restores_state() {
        let h = LedgerHarness::new();
        let charge = h
            .seed_charge(ChargeBuilder::new(h.tenant).with_components(rent_components()).build())
            .await;
        let payment = h
            .seed_payment(PaymentBuilder::new(h.tenant).with_amount(eur(dec!(500))).build())
            .await;
        let service = h.allocation_service();

        let allocation = service
            .allocate(&h.ctx, payment.id, charge.id, eur(dec!(300)))
            .await
            .unwrap();
        service.reverse(&h.ctx, allocation.id).await.unwrap();

        let charge_after = h.charge(charge.id).await;
        assert_eq!(charge_after.covered_total, charge.covered_total);
        assert_eq!(charge_after.components, charge.components);
        assert_eq!(charge_after.status, ChargeStatus::Open);

        let payment_after = h.payment(payment.id).await;
        assert_eq!(payment_after.allocated_total, eur(dec!(0)));
        assert_eq!(payment_after.status, PaymentStatus::Unclear);
        check_invariants(&h, payment.id, &[charge.id]).await;
        assert_eq!(h.audit.events_with_action(AuditAction::AllocationReversed).len(), 1);
    }

    #[tokio::test]
    async fn test_reversing_twice_is_not_found() {
        let h = LedgerHarness::new();
        let charge = h.seed_charge(ChargeBuilder::new(h.tenant).build()).await;
        let payment = h.seed_payment(PaymentBuilder::new(h.tenant).build()).await;
        let service = h.allocation_service();

        let allocation = service
            .allocate(&h.ctx, payment.id, charge.id, eur(dec!(100)))
            .await
            .unwrap();
        service.reverse(&h.ctx, allocation.id).await.unwrap();

        let err = service.reverse(&h.ctx, allocation.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_reverse_unknown_allocation() {
        let h = LedgerHarness::new();
        let err = h
            .allocation_service()
            .reverse(&h.ctx, AllocationId::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_reverse_one_of_two_allocations() {
        let h = LedgerHarness::new();
        let charge = h.seed_charge(ChargeBuilder::new(h.tenant).build()).await;
        let payment = h
            .seed_payment(PaymentBuilder::new(h.tenant).with_amount(eur(dec!(950))).build())
            .await;
        let service = h.allocation_service();

        let first = service
            .allocate(&h.ctx, payment.id, charge.id, eur(dec!(150)))
            .await
            .unwrap();
        service
            .allocate(&h.ctx, payment.id, charge.id, eur(dec!(400)))
            .await
            .unwrap();
        service.reverse(&h.ctx, first.id).await.unwrap();

        let charge = h.charge(charge.id).await;
        assert_eq!(charge.covered_total, eur(dec!(400)));
        assert_eq!(charge.status, ChargeStatus::PartiallyPaid);
        check_invariants(&h, payment.id, &[charge.id]).await;
    }
}

// ============================================================================
// Split
// ============================================================================

mod split_tests {
    use super::*;

    async fn setup(h: &LedgerHarness) -> (PaymentId, ChargeId, ChargeId) {
        let c1 = h.seed_charge(ChargeBuilder::new(h.tenant).build()).await;
        let c2 = h.seed_charge(ChargeBuilder::new(h.tenant).build()).await;
        let payment = h
            .seed_payment(PaymentBuilder::new(h.tenant).with_amount(eur(dec!(300))).build())
            .await;
        (payment.id, c1.id, c2.id)
    }

    #[tokio::test]
    async fn test_split_creates_one_allocation_per_part() {
        let h = LedgerHarness::new();
        let (payment_id, c1, c2) = setup(&h).await;

        let allocations = h
            .allocation_service()
            .split(
                &h.ctx,
                payment_id,
                vec![SplitPart::new(c1, eur(dec!(100))), SplitPart::new(c2, eur(dec!(200)))],
            )
            .await
            .unwrap();

        assert_eq!(allocations.len(), 2);
        assert!(allocations.iter().all(|a| a.source == AllocationSource::Split));
        assert_eq!(h.payment(payment_id).await.status, PaymentStatus::Split);
        assert_eq!(h.charge(c1).await.covered_total, eur(dec!(100)));
        assert_eq!(h.charge(c2).await.covered_total, eur(dec!(200)));
        check_invariants(&h, payment_id, &[c1, c2]).await;
        assert_eq!(h.audit.events_with_action(AuditAction::PaymentSplit).len(), 1);
    }

    #[tokio::test]
    async fn test_split_with_wrong_sum_writes_nothing() {
        for second in [dec!(199), dec!(201)] {
            let h = LedgerHarness::new();
            let (payment_id, c1, c2) = setup(&h).await;

            let err = h
                .allocation_service()
                .split(
                    &h.ctx,
                    payment_id,
                    vec![SplitPart::new(c1, eur(dec!(100))), SplitPart::new(c2, eur(second))],
                )
                .await
                .unwrap_err();

            match err {
                ReceivablesError::SplitMismatch { expected, actual, difference } => {
                    assert_eq!(expected, eur(dec!(300)));
                    assert_eq!(actual, eur(dec!(100) + second));
                    assert_eq!(difference, eur(dec!(100) + second - dec!(300)));
                }
                other => panic!("unexpected error: {other}"),
            }
            assert!(h
                .store
                .allocations_for_payment(h.tenant, payment_id)
                .await
                .unwrap()
                .is_empty());
            assert_eq!(h.payment(payment_id).await.status, PaymentStatus::Unclear);
        }
    }

    #[tokio::test]
    async fn test_split_part_failure_writes_nothing() {
        let h = LedgerHarness::new();
        let small = h
            .seed_charge(
                ChargeBuilder::new(h.tenant)
                    .flat(ChargeType::Other, eur(dec!(50)))
                    .build(),
            )
            .await;
        let c1 = h.seed_charge(ChargeBuilder::new(h.tenant).build()).await;
        let payment = h
            .seed_payment(PaymentBuilder::new(h.tenant).with_amount(eur(dec!(300))).build())
            .await;

        let err = h
            .allocation_service()
            .split(
                &h.ctx,
                payment.id,
                vec![
                    SplitPart::new(c1.id, eur(dec!(200))),
                    SplitPart::new(small.id, eur(dec!(100))),
                ],
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ReceivablesError::ExceedsOutstandingCharge { .. }));
        assert_eq!(h.charge(c1.id).await.covered_total, eur(dec!(0)));
        assert_eq!(h.payment(payment.id).await.allocated_total, eur(dec!(0)));
    }

    #[tokio::test]
    async fn test_split_two_parts_on_same_charge() {
        let h = LedgerHarness::new();
        let (payment_id, c1, _) = setup(&h).await;

        h.allocation_service()
            .split(
                &h.ctx,
                payment_id,
                vec![SplitPart::new(c1, eur(dec!(100))), SplitPart::new(c1, eur(dec!(200)))],
            )
            .await
            .unwrap();

        assert_eq!(h.charge(c1).await.covered_total, eur(dec!(300)));
        check_invariants(&h, payment_id, &[c1]).await;
    }

    #[tokio::test]
    async fn test_empty_split_is_rejected() {
        let h = LedgerHarness::new();
        let (payment_id, _, _) = setup(&h).await;
        let err = h
            .allocation_service()
            .split(&h.ctx, payment_id, Vec::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}

// ============================================================================
// Credit balances
// ============================================================================

mod credit_balance_tests {
    use super::*;

    /// Seeds a payment of 300 of which 200 sit as credit for the contract
    async fn seed_credit(h: &LedgerHarness, contract: core_kernel::ContractId) -> CreditBalance {
        let mut payment = PaymentBuilder::new(h.tenant).with_amount(eur(dec!(300))).build();
        payment.record_credit(eur(dec!(200))).unwrap();
        let credit = CreditBalance::new(h.tenant, contract, payment.id, eur(dec!(200))).unwrap();

        let mut changes = LedgerChangeSet::new();
        changes.insert_payment(payment);
        changes.insert_credit(credit.clone());
        h.store.commit(h.tenant, changes).await.unwrap();
        credit
    }

    #[tokio::test]
    async fn test_apply_credit_settles_charge_of_same_contract() {
        let h = LedgerHarness::new();
        let charge = h.seed_charge(ChargeBuilder::new(h.tenant).build()).await;
        let credit = seed_credit(&h, charge.contract_id.unwrap()).await;

        let allocation = h
            .allocation_service()
            .apply_credit_balance(&h.ctx, credit.id, charge.id, None)
            .await
            .unwrap();

        assert_eq!(allocation.amount, eur(dec!(200)));
        assert_eq!(allocation.source, AllocationSource::CreditBalance { credit_id: credit.id });
        let credit = h.store.get_credit_balance(h.tenant, credit.id).await.unwrap();
        assert!(credit.consumed);
        assert_eq!(credit.remaining, eur(dec!(0)));

        let payment = h.payment(credit.payment_id).await;
        assert_eq!(payment.credited_total, eur(dec!(0)));
        assert_eq!(payment.allocated_total, eur(dec!(200)));
        check_invariants(&h, payment.id, &[charge.id]).await;
    }

    #[tokio::test]
    async fn test_partial_credit_application_and_reversal() {
        let h = LedgerHarness::new();
        let charge = h.seed_charge(ChargeBuilder::new(h.tenant).build()).await;
        let credit = seed_credit(&h, charge.contract_id.unwrap()).await;
        let service = h.allocation_service();

        let allocation = service
            .apply_credit_balance(&h.ctx, credit.id, charge.id, Some(eur(dec!(80))))
            .await
            .unwrap();
        let stored = h.store.get_credit_balance(h.tenant, credit.id).await.unwrap();
        assert_eq!(stored.remaining, eur(dec!(120)));
        assert!(!stored.consumed);

        service.reverse(&h.ctx, allocation.id).await.unwrap();
        let stored = h.store.get_credit_balance(h.tenant, credit.id).await.unwrap();
        assert_eq!(stored.remaining, eur(dec!(200)));
        let payment = h.payment(credit.payment_id).await;
        assert_eq!(payment.credited_total, eur(dec!(200)));
        assert_eq!(payment.allocated_total, eur(dec!(0)));
    }

    #[tokio::test]
    async fn test_credit_cannot_settle_other_contract() {
        let h = LedgerHarness::new();
        let charge = h.seed_charge(ChargeBuilder::new(h.tenant).build()).await;
        let credit = seed_credit(&h, core_kernel::ContractId::new()).await;

        let err = h
            .allocation_service()
            .apply_credit_balance(&h.ctx, credit.id, charge.id, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PreconditionFailed);
    }

    #[tokio::test]
    async fn test_credit_amount_above_remaining_is_rejected() {
        let h = LedgerHarness::new();
        let charge = h.seed_charge(ChargeBuilder::new(h.tenant).build()).await;
        let credit = seed_credit(&h, charge.contract_id.unwrap()).await;

        let err = h
            .allocation_service()
            .apply_credit_balance(&h.ctx, credit.id, charge.id, Some(eur(dec!(250))))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(h.charge(charge.id).await.covered_total, eur(dec!(0)));
    }
}

// ============================================================================
// Charge lifecycle and concurrency
// ============================================================================

mod charge_lifecycle_tests {
    use super::*;

    #[tokio::test]
    async fn test_create_and_cancel_charge() {
        let h = LedgerHarness::new();
        let service = h.allocation_service();
        let charge = service
            .create_charge(&h.ctx, ChargeBuilder::new(h.tenant).build())
            .await
            .unwrap();

        let cancelled = service.cancel_charge(&h.ctx, charge.id).await.unwrap();
        assert_eq!(cancelled.status, ChargeStatus::Cancelled);
        assert_eq!(cancelled.version, 1);

        let again = service.cancel_charge(&h.ctx, charge.id).await.unwrap();
        assert_eq!(again.version, 1);
        assert_eq!(h.audit.events_with_action(AuditAction::ChargeCancelled).len(), 1);
    }

    #[tokio::test]
    async fn test_create_charge_for_other_tenant_is_rejected() {
        let h = LedgerHarness::new();
        let other = LedgerHarness::new();
        let err = h
            .allocation_service()
            .create_charge(&h.ctx, ChargeBuilder::new(other.tenant).build())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_stale_version_is_conflict() {
        let h = LedgerHarness::new();
        let charge = h.seed_charge(ChargeBuilder::new(h.tenant).build()).await;
        let payment = h.seed_payment(PaymentBuilder::new(h.tenant).build()).await;
        let stale = h.charge(charge.id).await;

        h.allocation_service()
            .allocate(&h.ctx, payment.id, charge.id, eur(dec!(100)))
            .await
            .unwrap();

        let mut changes = LedgerChangeSet::new();
        let mut stale = stale;
        stale.cancel();
        changes.update_charge(stale);
        let err: ReceivablesError = h.store.commit(h.tenant, changes).await.unwrap_err().into();

        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert!(err.is_retryable());
        assert_eq!(h.charge(charge.id).await.status, ChargeStatus::PartiallyPaid);
    }
}
