//! Fire-and-forget eviction notification boundary.

use async_trait::async_trait;
use tracing::{info, warn};

use classcast_core::error::AppError;
use classcast_core::events::{AdmissionEvent, DomainEvent, EventPayload};

/// Informs a human supervisor when a device is displaced by an eviction.
///
/// Strictly best-effort: the admission controller spawns the notification
/// off the admission path and a failure is logged, never propagated.
#[async_trait]
pub trait EvictionNotifier: Send + Sync + std::fmt::Debug {
    /// Delivers an admission event to the supervisor channel.
    async fn notify(&self, event: &AdmissionEvent) -> Result<(), AppError>;
}

/// Default notifier that records events through tracing.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl EvictionNotifier for LogNotifier {
    async fn notify(&self, event: &AdmissionEvent) -> Result<(), AppError> {
        let envelope = DomainEvent::new(EventPayload::Admission(event.clone()));
        match serde_json::to_string(&envelope) {
            Ok(json) => info!(event_id = %envelope.id, event = %json, "Admission notification"),
            Err(e) => warn!(error = %e, "Failed to serialize admission event"),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_log_notifier_never_fails() {
        let notifier = LogNotifier;
        let event = AdmissionEvent::Evicted {
            session_id: Uuid::new_v4(),
            displaced_session_id: Uuid::new_v4(),
            credential_id: Uuid::new_v4(),
        };
        assert!(notifier.notify(&event).await.is_ok());
    }
}
