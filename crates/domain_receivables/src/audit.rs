//! Audit trail of ledger mutations
//!
//! Every mutating operation records one [`AuditEvent`] after its commit.
//! Recording is fire-and-forget: a failing sink is logged and never undoes
//! the ledger change.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Mutex;
use tracing::{info, warn};

use core_kernel::{ActorId, AuditEventId, DomainPort, PortError, TenantId};

use crate::context::RequestContext;

/// What happened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    AllocationCreated,
    AllocationReversed,
    PaymentSplit,
    PaymentAutoMatched,
    PaymentBounced,
    PaymentIgnored,
    CreditBalanceCreated,
    CreditBalanceApplied,
    ChargeCreated,
    ChargeCancelled,
    NoticeCreated,
    NoticeSent,
    NoticeCancelled,
    NoticePaid,
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AuditAction::AllocationCreated => "allocation_created",
            AuditAction::AllocationReversed => "allocation_reversed",
            AuditAction::PaymentSplit => "payment_split",
            AuditAction::PaymentAutoMatched => "payment_auto_matched",
            AuditAction::PaymentBounced => "payment_bounced",
            AuditAction::PaymentIgnored => "payment_ignored",
            AuditAction::CreditBalanceCreated => "credit_balance_created",
            AuditAction::CreditBalanceApplied => "credit_balance_applied",
            AuditAction::ChargeCreated => "charge_created",
            AuditAction::ChargeCancelled => "charge_cancelled",
            AuditAction::NoticeCreated => "notice_created",
            AuditAction::NoticeSent => "notice_sent",
            AuditAction::NoticeCancelled => "notice_cancelled",
            AuditAction::NoticePaid => "notice_paid",
        };
        f.write_str(s)
    }
}

/// One audit record with optional JSON snapshots
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: AuditEventId,
    pub tenant_id: TenantId,
    pub actor_id: Option<ActorId>,
    pub action: AuditAction,
    pub entity_type: String,
    pub entity_id: String,
    pub before: Option<Value>,
    pub after: Option<Value>,
    pub correlation_id: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(
        ctx: &RequestContext,
        action: AuditAction,
        entity_type: impl Into<String>,
        entity_id: impl fmt::Display,
    ) -> Self {
        Self {
            id: AuditEventId::new_v7(),
            tenant_id: ctx.tenant_id,
            actor_id: ctx.actor_id,
            action,
            entity_type: entity_type.into(),
            entity_id: entity_id.to_string(),
            before: None,
            after: None,
            correlation_id: ctx.metadata.correlation_id.clone(),
            occurred_at: Utc::now(),
        }
    }

    /// Attaches the state before the change
    pub fn with_before<T: Serialize>(mut self, state: &T) -> Self {
        self.before = serde_json::to_value(state).ok();
        self
    }

    /// Attaches the state after the change
    pub fn with_after<T: Serialize>(mut self, state: &T) -> Self {
        self.after = serde_json::to_value(state).ok();
        self
    }
}

/// Append-only destination for audit events
///
/// Implementations must not block; heavy sinks should hand the event off
/// to their own channel.
pub trait AuditSink: DomainPort {
    fn record(&self, event: AuditEvent) -> Result<(), PortError>;
}

/// Writes audit events as structured log lines on target `audit`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl DomainPort for TracingAuditSink {}

impl AuditSink for TracingAuditSink {
    fn record(&self, event: AuditEvent) -> Result<(), PortError> {
        let before = event.before.as_ref().map(Value::to_string);
        let after = event.after.as_ref().map(Value::to_string);
        info!(
            target: "audit",
            event_id = %event.id,
            tenant = %event.tenant_id,
            actor = ?event.actor_id.map(|a| a.to_string()),
            action = %event.action,
            entity_type = %event.entity_type,
            entity_id = %event.entity_id,
            correlation_id = ?event.correlation_id,
            before = ?before,
            after = ?after,
            "audit event"
        );
        Ok(())
    }
}

/// Keeps audit events in memory
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies of all recorded events, oldest first
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Recorded events with the given action
    pub fn events_with_action(&self, action: AuditAction) -> Vec<AuditEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.action == action)
            .collect()
    }
}

impl DomainPort for MemoryAuditSink {}

impl AuditSink for MemoryAuditSink {
    fn record(&self, event: AuditEvent) -> Result<(), PortError> {
        self.events
            .lock()
            .map_err(|_| PortError::internal("audit buffer lock poisoned"))?
            .push(event);
        Ok(())
    }
}

/// Records `event`, logging instead of failing when the sink errors
pub fn emit(sink: &dyn AuditSink, event: AuditEvent) {
    let action = event.action;
    let entity_id = event.entity_id.clone();
    if let Err(error) = sink.record(event) {
        warn!(%action, %entity_id, error = %error, "failed to record audit event");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BrokenSink;

    impl DomainPort for BrokenSink {}

    impl AuditSink for BrokenSink {
        fn record(&self, _event: AuditEvent) -> Result<(), PortError> {
            Err(PortError::internal("disk full"))
        }
    }

    #[test]
    fn test_memory_sink_records_snapshots() {
        let ctx = RequestContext::new(TenantId::new()).with_actor(ActorId::new());
        let sink = MemoryAuditSink::new();

        emit(
            &sink,
            AuditEvent::new(&ctx, AuditAction::ChargeCancelled, "Charge", "CHG-1")
                .with_before(&serde_json::json!({"status": "OPEN"}))
                .with_after(&serde_json::json!({"status": "CANCELLED"})),
        );

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].actor_id, ctx.actor_id);
        assert_eq!(events[0].before.as_ref().unwrap()["status"], "OPEN");
        assert_eq!(sink.events_with_action(AuditAction::ChargeCancelled).len(), 1);
    }

    #[test]
    fn test_failing_sink_is_swallowed() {
        let ctx = RequestContext::new(TenantId::new());
        emit(&BrokenSink, AuditEvent::new(&ctx, AuditAction::NoticeSent, "DunningNotice", "DUN-1"));
    }
}
