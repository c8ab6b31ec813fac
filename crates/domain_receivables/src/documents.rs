//! Notice document generation port
//!
//! Rendering the letter for a dunning notice happens outside the engine.
//! The dunning service calls the generator after a notice is committed; a
//! failure is logged and leaves the notice in place.

use async_trait::async_trait;

use core_kernel::{DomainPort, PortError, TenantId};

use crate::dunning::DunningNotice;

#[async_trait]
pub trait NoticeDocumentGenerator: DomainPort {
    async fn generate(&self, tenant: TenantId, notice: &DunningNotice) -> Result<(), PortError>;
}
