//! Per-request caller context

use core_kernel::{ActorId, OperationMetadata, TenantId};

/// Who is calling, on behalf of which tenant
///
/// Every engine operation takes a context; all reads and writes are scoped
/// to `tenant_id`.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub tenant_id: TenantId,
    pub actor_id: Option<ActorId>,
    pub metadata: OperationMetadata,
}

impl RequestContext {
    /// Context for a system caller (scheduler, bank import)
    pub fn new(tenant_id: TenantId) -> Self {
        Self {
            tenant_id,
            actor_id: None,
            metadata: OperationMetadata::default(),
        }
    }

    pub fn with_actor(mut self, actor_id: ActorId) -> Self {
        self.actor_id = Some(actor_id);
        self
    }

    pub fn with_metadata(mut self, metadata: OperationMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}
