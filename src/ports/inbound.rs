//! Inbound port. The HTTP surface (adapter) calls into the application.

use crate::domain::DomainError;

/// API port: the transport adapter serves requests and invokes use cases.
#[async_trait::async_trait]
pub trait ApiPort: Send + Sync {
    /// Bind and serve until shutdown.
    async fn serve(&self) -> Result<(), DomainError>;
}
