//! Receivables engine services
//!
//! Services own no state of their own. Each operation reads what it needs
//! through the ports, computes the new ledger rows on working copies and
//! commits them as one change set. Audit events are recorded after the
//! commit.

pub mod allocation;
pub mod dunning;
pub mod matching;

pub use allocation::{AllocationService, SplitPart};
pub use dunning::DunningService;
pub use matching::{
    AutoMatchFailure, AutoMatchOutcome, AutoMatchService, AutoMatchSummary, ChargebackOutcome,
};
