use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Policy identifiers affected by one action of a grant/revoke batch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AuditedPolicy {
    pub action_id: String,
    pub policy_id: Option<Uuid>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AuditRecord {
    pub request_id: Option<String>,
    pub app_code: String,
    pub operate: String,
    pub subject: String,
    pub system: String,
    pub policies: Vec<AuditedPolicy>,
}

/// Request snapshot captured when a request fails.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DebugTrace {
    pub request_id: Option<String>,
    pub method: String,
    pub path: String,
    pub code: &'static str,
    pub unexpected: bool,
    pub rollback: bool,
}

/// Notification for the external error monitor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ErrorReport {
    pub request_id: Option<String>,
    pub method: String,
    pub path: String,
    pub error: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OpsEvent {
    Audit(AuditRecord),
    DebugTrace(DebugTrace),
    ErrorReport(ErrorReport),
}

pub type EventStream = mpsc::UnboundedReceiver<OpsEvent>;

/// Write-only handle for emitting ops events. Sending never blocks and never
/// fails the caller.
#[derive(Clone, Debug)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<OpsEvent>,
}

impl EventSink {
    pub fn channel() -> (Self, EventStream) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn emit(&self, event: OpsEvent) {
        if self.tx.send(event).is_err() {
            warn!("ops event dropped: drain is gone");
        }
    }
}

/// Render ops events as structured tracing records until every sink is dropped.
pub async fn drain(mut events: EventStream) {
    while let Some(event) = events.recv().await {
        record(&event);
    }
    debug!("ops event stream closed");
}

fn record(event: &OpsEvent) {
    let payload = serde_json::to_string(event).unwrap_or_default();
    match event {
        OpsEvent::Audit(audit) => info!(
            target: "audit",
            request_id = audit.request_id.as_deref().unwrap_or("-"),
            operate = %audit.operate,
            subject = %audit.subject,
            system = %audit.system,
            %payload,
            "policy change"
        ),
        OpsEvent::DebugTrace(trace) => debug!(
            target: "debug_trace",
            request_id = trace.request_id.as_deref().unwrap_or("-"),
            code = trace.code,
            unexpected = trace.unexpected,
            %payload,
            "api error trace"
        ),
        OpsEvent::ErrorReport(report) => error!(
            target: "error_report",
            request_id = report.request_id.as_deref().unwrap_or("-"),
            path = %report.path,
            %payload,
            "unexpected failure reported"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn emitted_events_reach_the_stream() {
        let (sink, mut stream) = EventSink::channel();
        sink.emit(OpsEvent::ErrorReport(ErrorReport {
            request_id: Some("r-1".into()),
            method: "POST".into(),
            path: "/api/v1/open/authorization/instance/".into(),
            error: "boom".into(),
        }));
        let event = stream.recv().await.unwrap();
        assert!(matches!(event, OpsEvent::ErrorReport(ref r) if r.error == "boom"));
    }

    #[tokio::test]
    async fn drain_finishes_when_sinks_drop() {
        let (sink, stream) = EventSink::channel();
        sink.emit(OpsEvent::DebugTrace(DebugTrace {
            request_id: None,
            method: "POST".into(),
            path: "/x".into(),
            code: "SYSTEM_ERROR",
            unexpected: true,
            rollback: false,
        }));
        drop(sink);
        drain(stream).await;
    }

    #[test]
    fn emitting_after_drain_stopped_is_harmless() {
        let (sink, stream) = EventSink::channel();
        drop(stream);
        sink.emit(OpsEvent::Audit(AuditRecord {
            request_id: None,
            app_code: "bk_cmdb".into(),
            operate: "grant".into(),
            subject: "user:alice".into(),
            system: "bk_cmdb".into(),
            policies: Vec::new(),
        }));
    }

    #[test]
    fn events_serialize_with_kind_tag() {
        let event = OpsEvent::Audit(AuditRecord {
            request_id: Some("r-2".into()),
            app_code: "bk_cmdb".into(),
            operate: "revoke".into(),
            subject: "user:bob".into(),
            system: "bk_cmdb".into(),
            policies: vec![AuditedPolicy {
                action_id: "view".into(),
                policy_id: None,
            }],
        });
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["kind"], "audit");
        assert_eq!(value["policies"][0]["action_id"], "view");
    }
}
