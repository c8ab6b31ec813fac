//! Credit balances: overpaid money held against a contract

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use core_kernel::{ContractId, CreditBalanceId, Money, PaymentId, TenantId};

use crate::error::{ReceivablesError, ReceivablesResult};

/// Residual overpayment tied to a contract and its originating payment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditBalance {
    pub id: CreditBalanceId,
    pub tenant_id: TenantId,
    pub contract_id: ContractId,
    pub payment_id: PaymentId,
    /// Amount originally booked
    pub amount: Money,
    /// Amount still available
    pub remaining: Money,
    pub consumed: bool,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CreditBalance {
    pub fn new(
        tenant_id: TenantId,
        contract_id: ContractId,
        payment_id: PaymentId,
        amount: Money,
    ) -> ReceivablesResult<Self> {
        if !amount.is_positive() {
            return Err(ReceivablesError::validation(format!(
                "credit balance must be positive, got {}",
                amount
            )));
        }
        let now = Utc::now();
        Ok(Self {
            id: CreditBalanceId::new_v7(),
            tenant_id,
            contract_id,
            payment_id,
            amount,
            remaining: amount,
            consumed: false,
            version: 0,
            created_at: now,
            updated_at: now,
        })
    }

    /// Takes `amount` out of the remaining balance
    ///
    /// # Errors
    ///
    /// * `PreconditionFailed` if the balance is already consumed
    /// * `Validation` stating the shortfall if `amount` exceeds what remains
    pub fn consume(&mut self, amount: Money) -> ReceivablesResult<()> {
        if self.consumed {
            return Err(ReceivablesError::precondition(format!(
                "credit balance {} is already consumed",
                self.id
            )));
        }
        let remaining = self.remaining.checked_sub(&amount)?;
        if remaining.is_negative() {
            return Err(ReceivablesError::validation(format!(
                "credit balance {} has {} left, requested {}, short by {}",
                self.id,
                self.remaining,
                amount,
                Money::new(-remaining.amount(), remaining.currency())
            )));
        }
        self.remaining = remaining;
        self.consumed = remaining.is_zero();
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Puts `amount` back, e.g. when a credit-funded allocation is reversed
    pub fn restore(&mut self, amount: Money) -> ReceivablesResult<()> {
        let remaining = self.remaining.checked_add(&amount)?;
        if remaining > self.amount {
            return Err(ReceivablesError::invariant(format!(
                "credit balance {} would exceed its amount: remaining {}, restoring {}, amount {}",
                self.id, self.remaining, amount, self.amount
            )));
        }
        self.remaining = remaining;
        self.consumed = remaining.is_zero();
        self.updated_at = Utc::now();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_kernel::Currency;
    use rust_decimal_macros::dec;

    #[test]
    fn test_consume_and_restore() {
        let mut credit = CreditBalance::new(
            TenantId::new(),
            ContractId::new(),
            PaymentId::new(),
            Money::new(dec!(200), Currency::EUR),
        )
        .unwrap();

        credit.consume(Money::new(dec!(150), Currency::EUR)).unwrap();
        assert!(!credit.consumed);

        assert!(credit.consume(Money::new(dec!(60), Currency::EUR)).is_err());

        credit.consume(Money::new(dec!(50), Currency::EUR)).unwrap();
        assert!(credit.consumed);
        assert!(matches!(
            credit.consume(Money::new(dec!(1), Currency::EUR)),
            Err(ReceivablesError::PreconditionFailed(_))
        ));

        credit.restore(Money::new(dec!(200), Currency::EUR)).unwrap();
        assert!(!credit.consumed);
        assert!(credit.restore(Money::new(dec!(0.01), Currency::EUR)).is_err());
    }
}
