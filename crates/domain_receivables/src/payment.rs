//! Incoming bank payments awaiting reconciliation
//!
//! Payments are created by bank import outside this crate. The ledger only
//! tracks how much of each payment has been allocated to charges or parked
//! as a credit balance, and derives the payment status from that.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use core_kernel::{Currency, Money, PaymentId, TenantId};

use crate::error::{ReceivablesError, ReceivablesResult};

/// Reconciliation state of a payment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    /// Not yet attributed to anything
    Unclear,
    Allocated,
    PartiallyAllocated,
    /// Deliberately excluded from reconciliation (e.g. internal transfer)
    Ignored,
    /// Distributed over several charges in one split
    Split,
    /// Returned by the bank; terminal
    Bounced,
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PaymentStatus::Unclear => "UNCLEAR",
            PaymentStatus::Allocated => "ALLOCATED",
            PaymentStatus::PartiallyAllocated => "PARTIALLY_ALLOCATED",
            PaymentStatus::Ignored => "IGNORED",
            PaymentStatus::Split => "SPLIT",
            PaymentStatus::Bounced => "BOUNCED",
        };
        f.write_str(s)
    }
}

/// An incoming payment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub tenant_id: TenantId,
    pub booking_date: NaiveDate,
    pub amount: Money,
    /// Free-text remittance information
    pub memo: String,
    /// IBAN or account number of the payer, if the bank supplied one
    pub account_identifier: Option<String>,
    pub status: PaymentStatus,
    /// Sum of live allocations
    pub allocated_total: Money,
    /// Part of the payment currently held as credit balance
    pub credited_total: Money,
    pub last_allocated_at: Option<DateTime<Utc>>,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    /// Creates an unclear payment
    ///
    /// # Errors
    ///
    /// Returns `Validation` if `amount` is not positive
    pub fn new(
        tenant_id: TenantId,
        booking_date: NaiveDate,
        amount: Money,
        memo: impl Into<String>,
    ) -> ReceivablesResult<Self> {
        if !amount.is_positive() {
            return Err(ReceivablesError::validation(format!(
                "payment amount must be positive, got {}",
                amount
            )));
        }
        let now = Utc::now();
        Ok(Self {
            id: PaymentId::new_v7(),
            tenant_id,
            booking_date,
            amount,
            memo: memo.into(),
            account_identifier: None,
            status: PaymentStatus::Unclear,
            allocated_total: Money::zero(amount.currency()),
            credited_total: Money::zero(amount.currency()),
            last_allocated_at: None,
            version: 0,
            created_at: now,
            updated_at: now,
        })
    }

    /// Sets the payer's account identifier
    pub fn with_account_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.account_identifier = Some(identifier.into());
        self
    }

    pub fn currency(&self) -> Currency {
        self.amount.currency()
    }

    /// Allocated plus credited
    pub fn settled(&self) -> Money {
        Money::new(
            self.allocated_total.amount() + self.credited_total.amount(),
            self.currency(),
        )
    }

    /// Amount minus allocated minus credited
    pub fn unallocated(&self) -> Money {
        Money::new(
            self.amount.amount() - self.allocated_total.amount() - self.credited_total.amount(),
            self.currency(),
        )
    }

    /// Fails unless money from this payment may still be allocated
    pub fn ensure_allocatable(&self) -> ReceivablesResult<()> {
        match self.status {
            PaymentStatus::Bounced | PaymentStatus::Ignored => Err(ReceivablesError::precondition(
                format!("payment {} is {} and cannot be allocated", self.id, self.status),
            )),
            _ => Ok(()),
        }
    }

    /// Books a new allocation against the unallocated remainder
    pub fn record_allocation(&mut self, amount: Money, at: DateTime<Utc>) -> ReceivablesResult<()> {
        let allocated = self.allocated_total.checked_add(&amount)?;
        self.set_totals(allocated, self.credited_total)?;
        self.last_allocated_at = Some(at);
        Ok(())
    }

    /// Undoes an allocation booked with [`Payment::record_allocation`]
    pub fn release_allocation(&mut self, amount: Money) -> ReceivablesResult<()> {
        let allocated = self.allocated_total.checked_sub(&amount)?;
        self.set_totals(allocated, self.credited_total)
    }

    /// Parks part of the unallocated remainder as credit balance
    pub fn record_credit(&mut self, amount: Money) -> ReceivablesResult<()> {
        let credited = self.credited_total.checked_add(&amount)?;
        self.set_totals(self.allocated_total, credited)
    }

    /// Moves credited money onto a charge allocation
    pub fn apply_credit(&mut self, amount: Money, at: DateTime<Utc>) -> ReceivablesResult<()> {
        let credited = self.credited_total.checked_sub(&amount)?;
        let allocated = self.allocated_total.checked_add(&amount)?;
        self.set_totals(allocated, credited)?;
        self.last_allocated_at = Some(at);
        Ok(())
    }

    /// Moves an allocation that was funded from credit back into credit
    pub fn restore_credit(&mut self, amount: Money) -> ReceivablesResult<()> {
        let allocated = self.allocated_total.checked_sub(&amount)?;
        let credited = self.credited_total.checked_add(&amount)?;
        self.set_totals(allocated, credited)
    }

    fn set_totals(&mut self, allocated: Money, credited: Money) -> ReceivablesResult<()> {
        if allocated.is_negative() || credited.is_negative() {
            return Err(ReceivablesError::invariant(format!(
                "payment {} would carry negative totals: allocated {}, credited {}",
                self.id, allocated, credited
            )));
        }
        let settled = allocated.checked_add(&credited)?;
        if settled > self.amount {
            return Err(ReceivablesError::invariant(format!(
                "payment {} would be over-allocated: settled {}, amount {}",
                self.id, settled, self.amount
            )));
        }
        self.allocated_total = allocated;
        self.credited_total = credited;
        self.refresh_status();
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Re-derives the status from the settled amount
    ///
    /// BOUNCED and IGNORED are left alone. A fully settled SPLIT payment stays
    /// SPLIT. Dropping back to zero returns the payment to UNCLEAR.
    pub fn refresh_status(&mut self) {
        if matches!(self.status, PaymentStatus::Bounced | PaymentStatus::Ignored) {
            return;
        }
        let settled = self.settled();
        self.status = if settled == self.amount {
            if self.status == PaymentStatus::Split {
                PaymentStatus::Split
            } else {
                PaymentStatus::Allocated
            }
        } else if settled.is_positive() {
            PaymentStatus::PartiallyAllocated
        } else {
            PaymentStatus::Unclear
        };
    }

    /// Marks the payment as distributed by a split
    pub fn mark_split(&mut self) {
        self.status = PaymentStatus::Split;
        self.updated_at = Utc::now();
    }

    /// Flips the payment to BOUNCED
    ///
    /// # Errors
    ///
    /// Returns `PreconditionFailed` if the payment already bounced
    pub fn mark_bounced(&mut self) -> ReceivablesResult<()> {
        if self.status == PaymentStatus::Bounced {
            return Err(ReceivablesError::precondition(format!(
                "payment {} has already bounced",
                self.id
            )));
        }
        self.status = PaymentStatus::Bounced;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Excludes an unclear payment from reconciliation
    ///
    /// # Errors
    ///
    /// Returns `PreconditionFailed` unless the payment is UNCLEAR
    pub fn ignore(&mut self) -> ReceivablesResult<()> {
        if self.status != PaymentStatus::Unclear {
            return Err(ReceivablesError::precondition(format!(
                "only UNCLEAR payments can be ignored; {} is {}",
                self.id, self.status
            )));
        }
        self.status = PaymentStatus::Ignored;
        self.updated_at = Utc::now();
        Ok(())
    }
}
