//! Dunning notices, fees, default interest and escalation rules
//!
//! Everything in this module is pure: the dunning service reads the ledger,
//! calls these functions and commits the result.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;

use core_kernel::{ChargeId, ContractId, Currency, DunningNoticeId, Money, TenantId};

use crate::charge::Charge;
use crate::error::{ReceivablesError, ReceivablesResult};

/// Escalation stage, strictly ordered
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DunningStage {
    #[serde(rename = "REMINDER")]
    Reminder,
    #[serde(rename = "NOTICE_1")]
    Notice1,
    #[serde(rename = "NOTICE_2")]
    Notice2,
    #[serde(rename = "NOTICE_3")]
    Notice3,
}

impl DunningStage {
    pub const ALL: [DunningStage; 4] = [
        DunningStage::Reminder,
        DunningStage::Notice1,
        DunningStage::Notice2,
        DunningStage::Notice3,
    ];

    /// The following stage, if any
    pub fn next(&self) -> Option<DunningStage> {
        match self {
            DunningStage::Reminder => Some(DunningStage::Notice1),
            DunningStage::Notice1 => Some(DunningStage::Notice2),
            DunningStage::Notice2 => Some(DunningStage::Notice3),
            DunningStage::Notice3 => None,
        }
    }
}

impl fmt::Display for DunningStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DunningStage::Reminder => "REMINDER",
            DunningStage::Notice1 => "NOTICE_1",
            DunningStage::Notice2 => "NOTICE_2",
            DunningStage::Notice3 => "NOTICE_3",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for DunningStage {
    type Err = ReceivablesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().replace('-', "_").as_str() {
            "REMINDER" => Ok(DunningStage::Reminder),
            "NOTICE_1" => Ok(DunningStage::Notice1),
            "NOTICE_2" => Ok(DunningStage::Notice2),
            "NOTICE_3" => Ok(DunningStage::Notice3),
            other => Err(ReceivablesError::validation(format!(
                "unknown dunning stage '{}'",
                other
            ))),
        }
    }
}

/// Lifecycle of a notice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NoticeStatus {
    Open,
    Sent,
    Paid,
    Cancelled,
}

impl NoticeStatus {
    /// Notices that still count for escalation
    pub const ACTIVE_STATES: [NoticeStatus; 2] = [NoticeStatus::Open, NoticeStatus::Sent];

    pub fn is_active(&self) -> bool {
        matches!(self, NoticeStatus::Open | NoticeStatus::Sent)
    }
}

impl fmt::Display for NoticeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NoticeStatus::Open => "OPEN",
            NoticeStatus::Sent => "SENT",
            NoticeStatus::Paid => "PAID",
            NoticeStatus::Cancelled => "CANCELLED",
        };
        f.write_str(s)
    }
}

/// A formal demand for overdue payment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DunningNotice {
    pub id: DunningNoticeId,
    pub tenant_id: TenantId,
    pub contract_id: ContractId,
    pub stage: DunningStage,
    pub notice_date: NaiveDate,
    /// Outstanding balance of the contract when the notice was created
    pub outstanding: Money,
    pub late_fee: Money,
    pub interest: Money,
    pub fee_charge_id: Option<ChargeId>,
    pub interest_charge_id: Option<ChargeId>,
    pub status: NoticeStatus,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DunningNotice {
    /// Creates an open notice without charge links
    pub fn new(
        tenant_id: TenantId,
        contract_id: ContractId,
        stage: DunningStage,
        notice_date: NaiveDate,
        outstanding: Money,
        late_fee: Money,
        interest: Money,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: DunningNoticeId::new_v7(),
            tenant_id,
            contract_id,
            stage,
            notice_date,
            outstanding,
            late_fee,
            interest,
            fee_charge_id: None,
            interest_charge_id: None,
            status: NoticeStatus::Open,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    /// OPEN → SENT
    pub fn mark_sent(&mut self) -> ReceivablesResult<()> {
        self.transition(NoticeStatus::Open, NoticeStatus::Sent)
    }

    /// OPEN/SENT → PAID
    pub fn mark_paid(&mut self) -> ReceivablesResult<()> {
        if !self.is_active() {
            return Err(self.invalid_transition(NoticeStatus::Paid));
        }
        self.set_status(NoticeStatus::Paid);
        Ok(())
    }

    /// Cancels the notice
    ///
    /// Returns `Ok(false)` if it was already cancelled.
    ///
    /// # Errors
    ///
    /// Returns `PreconditionFailed` for a paid notice
    pub fn cancel(&mut self) -> ReceivablesResult<bool> {
        match self.status {
            NoticeStatus::Cancelled => Ok(false),
            NoticeStatus::Paid => Err(self.invalid_transition(NoticeStatus::Cancelled)),
            NoticeStatus::Open | NoticeStatus::Sent => {
                self.set_status(NoticeStatus::Cancelled);
                Ok(true)
            }
        }
    }

    fn transition(&mut self, from: NoticeStatus, to: NoticeStatus) -> ReceivablesResult<()> {
        if self.status != from {
            return Err(self.invalid_transition(to));
        }
        self.set_status(to);
        Ok(())
    }

    fn set_status(&mut self, status: NoticeStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }

    fn invalid_transition(&self, to: NoticeStatus) -> ReceivablesError {
        ReceivablesError::precondition(format!(
            "notice {} cannot move from {} to {}",
            self.id, self.status, to
        ))
    }
}

/// Flat late fee per stage, in the ledger currency
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LateFeeSchedule {
    pub reminder: Decimal,
    pub notice_1: Decimal,
    pub notice_2: Decimal,
    pub notice_3: Decimal,
}

impl Default for LateFeeSchedule {
    fn default() -> Self {
        Self {
            reminder: dec!(0),
            notice_1: dec!(5),
            notice_2: dec!(10),
            notice_3: dec!(15),
        }
    }
}

impl LateFeeSchedule {
    pub fn fee_for(&self, stage: DunningStage, currency: Currency) -> Money {
        let amount = match stage {
            DunningStage::Reminder => self.reminder,
            DunningStage::Notice1 => self.notice_1,
            DunningStage::Notice2 => self.notice_2,
            DunningStage::Notice3 => self.notice_3,
        };
        Money::new_rounded(amount, currency)
    }

    /// All fees, in stage order
    pub fn fees(&self) -> [Decimal; 4] {
        [self.reminder, self.notice_1, self.notice_2, self.notice_3]
    }
}

/// Simple daily default interest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterestTerms {
    /// Annual rate as a fraction (0.05 = 5 %)
    pub annual_rate: Decimal,
    pub day_count_basis: u32,
}

impl Default for InterestTerms {
    fn default() -> Self {
        Self {
            annual_rate: dec!(0.05),
            day_count_basis: 365,
        }
    }
}

/// Days of default: counting starts the day after the due date
pub fn days_in_default(due_date: NaiveDate, notice_date: NaiveDate) -> i64 {
    let first_day = due_date + Duration::days(1);
    (notice_date - first_day).num_days().max(0)
}

/// Interest accrued on the given charges up to `notice_date`
///
/// Per charge `outstanding × rate × days / basis`; the sum is rounded once
/// to the currency's minor unit, half away from zero.
///
/// # Errors
///
/// * `Validation` for a zero day-count basis
/// * `Money` if the charges mix currencies
pub fn accrued_interest(
    charges: &[Charge],
    notice_date: NaiveDate,
    terms: &InterestTerms,
    currency: Currency,
) -> ReceivablesResult<Money> {
    if terms.day_count_basis == 0 {
        return Err(ReceivablesError::validation("day-count basis must be positive"));
    }
    let basis = Decimal::from(terms.day_count_basis);

    let mut total = Decimal::ZERO;
    for charge in charges {
        let outstanding = charge.outstanding();
        if outstanding.currency() != currency {
            return Err(core_kernel::MoneyError::CurrencyMismatch(
                currency.to_string(),
                outstanding.currency().to_string(),
            )
            .into());
        }
        let days = Decimal::from(days_in_default(charge.due_date, notice_date));
        total += outstanding.amount() * terms.annual_rate * days / basis;
    }
    Ok(Money::new_rounded(total, currency))
}

/// Day thresholds that drive escalation suggestions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationThresholds {
    /// Overdue days at or below which nothing is suggested
    pub grace_days: i64,
    pub notice_1_days: i64,
    pub notice_2_days: i64,
    pub notice_3_days: i64,
}

impl Default for EscalationThresholds {
    fn default() -> Self {
        Self {
            grace_days: 7,
            notice_1_days: 14,
            notice_2_days: 28,
            notice_3_days: 42,
        }
    }
}

/// Next stage for a contract, given its latest active notice
///
/// Returns `None` inside the grace period, when the next threshold has not
/// been reached, or after NOTICE_3.
pub fn recommend_stage(
    current: Option<DunningStage>,
    days_overdue: i64,
    thresholds: &EscalationThresholds,
) -> Option<DunningStage> {
    if days_overdue <= thresholds.grace_days {
        return None;
    }
    match current {
        None if days_overdue >= thresholds.notice_1_days => Some(DunningStage::Notice1),
        None => Some(DunningStage::Reminder),
        Some(DunningStage::Reminder) if days_overdue >= thresholds.notice_1_days => {
            Some(DunningStage::Notice1)
        }
        Some(DunningStage::Notice1) if days_overdue >= thresholds.notice_2_days => {
            Some(DunningStage::Notice2)
        }
        Some(DunningStage::Notice2) if days_overdue >= thresholds.notice_3_days => {
            Some(DunningStage::Notice3)
        }
        _ => None,
    }
}

/// A proposed escalation for one contract
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationSuggestion {
    pub contract_id: ContractId,
    pub current_stage: Option<DunningStage>,
    pub recommended_stage: DunningStage,
    pub days_overdue: i64,
    pub outstanding: Money,
}
