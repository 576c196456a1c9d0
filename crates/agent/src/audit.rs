use tarla_core::audit::{AuditEvent, AuditOutcome, AuditSink};
use tracing::{info, warn};

/// Forwards audit events to `tracing`, so they land wherever the process logs go.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn emit(&self, event: AuditEvent) {
        let turn_id = event.turn_id.map(|id| id.to_string()).unwrap_or_default();
        let conversation_id = event.conversation_id.clone().unwrap_or_default();
        match event.outcome {
            AuditOutcome::Success => info!(
                event_name = %event.event_type,
                turn_id = %turn_id,
                conversation_id = %conversation_id,
                correlation_id = %event.correlation_id,
                category = event.category.as_str(),
                metadata = ?event.metadata,
                "audit"
            ),
            AuditOutcome::Rejected | AuditOutcome::Degraded | AuditOutcome::Failed => warn!(
                event_name = %event.event_type,
                turn_id = %turn_id,
                conversation_id = %conversation_id,
                correlation_id = %event.correlation_id,
                category = event.category.as_str(),
                outcome = ?event.outcome,
                metadata = ?event.metadata,
                "audit"
            ),
        }
    }
}
