//! Auto-match rules
//!
//! Each rule looks at one payment and the candidate charges around its
//! booking date and may name the single charge the payment belongs to.
//! Rules are evaluated in a fixed order; the first hit wins. A hit always
//! requires an exact amount: the charge's outstanding remainder or its full
//! total must equal the payment amount.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use tracing::{debug, error};

use core_kernel::{ChargeId, ContractId};

use crate::charge::Charge;
use crate::directory::{
    normalize_account_identifier, AllocationOrder, Contract, Renter, TenantPreferences, Unit,
};
use crate::payment::Payment;

/// Which rule produced a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchRuleKind {
    UnitReference,
    RenterName,
    AccountIdentifier,
}

impl fmt::Display for MatchRuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MatchRuleKind::UnitReference => "unit_reference",
            MatchRuleKind::RenterName => "renter_name",
            MatchRuleKind::AccountIdentifier => "account_identifier",
        };
        f.write_str(s)
    }
}

/// Everything a rule may look at
#[derive(Debug, Clone, Default)]
pub struct MatchContext {
    /// Open charges due within the match window, any order
    pub candidates: Vec<Charge>,
    pub units: Vec<Unit>,
    pub renters: Vec<Renter>,
    pub contracts: Vec<Contract>,
    pub preferences: TenantPreferences,
}

impl MatchContext {
    fn contracts_where(&self, predicate: impl Fn(&Contract) -> bool) -> HashSet<ContractId> {
        self.contracts
            .iter()
            .filter(|c| predicate(c))
            .map(|c| c.id)
            .collect()
    }

    /// Candidates of the given contracts, earliest due first
    fn candidates_for(&self, contracts: &HashSet<ContractId>) -> Vec<&Charge> {
        let mut charges: Vec<&Charge> = self
            .candidates
            .iter()
            .filter(|c| c.contract_id.is_some_and(|id| contracts.contains(&id)))
            .collect();
        charges.sort_by(|a, b| a.due_date.cmp(&b.due_date).then(a.id.cmp(&b.id)));
        charges
    }
}

/// A rule's verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuleMatch {
    pub rule: MatchRuleKind,
    pub charge_id: ChargeId,
    /// Whether an amount above the charge's outstanding becomes a credit
    /// balance on the charge's contract
    pub book_excess_as_credit: bool,
}

/// One matching strategy
pub trait MatchRule: Send + Sync {
    fn kind(&self) -> MatchRuleKind;

    /// Returns the charge `payment` belongs to, if this rule can tell
    fn try_match(&self, payment: &Payment, context: &MatchContext) -> Option<RuleMatch>;
}

/// The standard rule order: unit reference, renter name, account identifier
pub fn default_rules() -> Vec<Box<dyn MatchRule>> {
    vec![
        Box::new(UnitReferenceRule),
        Box::new(RenterNameRule),
        Box::new(AccountIdentifierRule),
    ]
}

/// True when the payment amount equals the remainder or the full total
pub fn is_exact_amount(charge: &Charge, payment: &Payment) -> bool {
    charge.outstanding() == payment.amount || charge.total == payment.amount
}

fn first_exact<'a>(
    charges: impl IntoIterator<Item = &'a Charge>,
    payment: &Payment,
) -> Option<&'a Charge> {
    charges.into_iter().find(|c| is_exact_amount(c, payment))
}

const UNIT_TOKEN_PATTERN: &str = r"(?i)\bunit[\s:#\-]*([a-z0-9](?:[a-z0-9./\-]*[a-z0-9])?)";

static UNIT_TOKEN: Lazy<Option<Regex>> = Lazy::new(|| match Regex::new(UNIT_TOKEN_PATTERN) {
    Ok(regex) => Some(regex),
    Err(e) => {
        error!(error = %e, "unit reference pattern does not compile, unit rule disabled");
        None
    }
});

/// Extracts the identifier following "unit" in a memo
///
/// The separator is optional: "Unit EG-Links", "unit: 3.2/a" and
/// "Unit12" all yield a token.
pub fn unit_token(memo: &str) -> Option<&str> {
    UNIT_TOKEN
        .as_ref()?
        .captures(memo)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// Finds "Unit EG-Links" style references in the memo
#[derive(Debug, Default, Clone, Copy)]
pub struct UnitReferenceRule;

impl MatchRule for UnitReferenceRule {
    fn kind(&self) -> MatchRuleKind {
        MatchRuleKind::UnitReference
    }

    fn try_match(&self, payment: &Payment, context: &MatchContext) -> Option<RuleMatch> {
        let token = unit_token(&payment.memo)?.to_lowercase();

        let mut units: Vec<&Unit> = context.units.iter().collect();
        units.sort_by(|a, b| a.unit_number.cmp(&b.unit_number));
        let unit = units
            .into_iter()
            .find(|u| u.unit_number.to_lowercase().contains(&token))?;
        debug!(
            payment_id = %payment.id,
            token = %token,
            unit = %unit.unit_number,
            "unit reference found"
        );

        let contracts = context.contracts_where(|c| c.unit_id == unit.id);
        let charge = first_exact(context.candidates_for(&contracts), payment)?;
        Some(RuleMatch {
            rule: self.kind(),
            charge_id: charge.id,
            book_excess_as_credit: false,
        })
    }
}

/// Looks for a renter's last name or company name in the memo
#[derive(Debug, Default, Clone, Copy)]
pub struct RenterNameRule;

impl MatchRule for RenterNameRule {
    fn kind(&self) -> MatchRuleKind {
        MatchRuleKind::RenterName
    }

    fn try_match(&self, payment: &Payment, context: &MatchContext) -> Option<RuleMatch> {
        let memo = payment.memo.to_lowercase();

        let mut renters: Vec<&Renter> = context.renters.iter().collect();
        renters.sort_by(|a, b| a.last_name.cmp(&b.last_name));

        for renter in renters {
            let named = [Some(renter.last_name.as_str()), renter.company_name.as_deref()]
                .into_iter()
                .flatten()
                .map(|n| n.trim().to_lowercase())
                .any(|n| !n.is_empty() && memo.contains(&n));
            if !named {
                continue;
            }

            let contracts = context.contracts_where(|c| c.renter_id == renter.id);
            if let Some(charge) = first_exact(context.candidates_for(&contracts), payment) {
                debug!(payment_id = %payment.id, renter_id = %renter.id, "renter name found");
                return Some(RuleMatch {
                    rule: self.kind(),
                    charge_id: charge.id,
                    book_excess_as_credit: false,
                });
            }
        }
        None
    }
}

/// Attributes the payment through the payer's bank account
///
/// The only rule that books an overpayment as credit balance.
#[derive(Debug, Default, Clone, Copy)]
pub struct AccountIdentifierRule;

impl MatchRule for AccountIdentifierRule {
    fn kind(&self) -> MatchRuleKind {
        MatchRuleKind::AccountIdentifier
    }

    fn try_match(&self, payment: &Payment, context: &MatchContext) -> Option<RuleMatch> {
        let identifier = normalize_account_identifier(payment.account_identifier.as_deref()?);
        if identifier.is_empty() {
            return None;
        }

        let renter = context.renters.iter().find(|r| r.owns_account(&identifier))?;
        let contract = context
            .contracts
            .iter()
            .filter(|c| c.renter_id == renter.id && c.is_active())
            .max_by(|a, b| a.move_in_date.cmp(&b.move_in_date).then(a.id.cmp(&b.id)))?;
        debug!(payment_id = %payment.id, contract_id = %contract.id, "account identifier found");

        let mut charges = context.candidates_for(&HashSet::from([contract.id]));
        if context.preferences.allocation_order == AllocationOrder::NewestDueFirst {
            charges.reverse();
        }
        let charge = first_exact(charges, payment)?;
        Some(RuleMatch {
            rule: self.kind(),
            charge_id: charge.id,
            book_excess_as_credit: true,
        })
    }
}
