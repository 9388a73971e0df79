//! Appointment events published through the outbox.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::appointment::{TOPIC_COMPENSATED, TOPIC_CREATED};

/// Events the coordinator hands to the outbox.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AppointmentEvent {
    /// The provider created an appointment.
    Created(AppointmentCreatedData),

    /// A created appointment was cancelled after a later step failed.
    Compensated(AppointmentCompensatedData),
}

/// Data for the Created event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppointmentCreatedData {
    pub appointment_id: String,
    pub idempotency_key: String,
    pub correlation_id: String,
    /// Request payload with sensitive fields masked.
    pub payload: Map<String, Value>,
    pub created_at: DateTime<Utc>,
}

/// Data for the Compensated event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppointmentCompensatedData {
    pub appointment_id: String,
    pub idempotency_key: String,
    pub correlation_id: String,
    /// The failure that triggered compensation.
    pub reason: String,
    pub compensated_at: DateTime<Utc>,
}

impl AppointmentEvent {
    pub fn created(
        appointment_id: impl Into<String>,
        idempotency_key: impl Into<String>,
        correlation_id: impl Into<String>,
        payload: Map<String, Value>,
    ) -> Self {
        AppointmentEvent::Created(AppointmentCreatedData {
            appointment_id: appointment_id.into(),
            idempotency_key: idempotency_key.into(),
            correlation_id: correlation_id.into(),
            payload,
            created_at: Utc::now(),
        })
    }

    pub fn compensated(
        appointment_id: impl Into<String>,
        idempotency_key: impl Into<String>,
        correlation_id: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        AppointmentEvent::Compensated(AppointmentCompensatedData {
            appointment_id: appointment_id.into(),
            idempotency_key: idempotency_key.into(),
            correlation_id: correlation_id.into(),
            reason: reason.into(),
            compensated_at: Utc::now(),
        })
    }

    /// The outbox topic this event is published on.
    pub fn topic(&self) -> &'static str {
        match self {
            AppointmentEvent::Created(_) => TOPIC_CREATED,
            AppointmentEvent::Compensated(_) => TOPIC_COMPENSATED,
        }
    }

    /// Serializes the event data as the outbox payload.
    pub fn to_payload(&self) -> serde_json::Result<Value> {
        match self {
            AppointmentEvent::Created(data) => serde_json::to_value(data),
            AppointmentEvent::Compensated(data) => serde_json::to_value(data),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_topics() {
        let created = AppointmentEvent::created("APT-1", "k", "c", Map::new());
        let compensated = AppointmentEvent::compensated("APT-1", "k", "c", "outbox down");
        assert_eq!(created.topic(), "appointments.created");
        assert_eq!(compensated.topic(), "appointments.compensated");
    }

    #[test]
    fn test_payload_contains_event_data_only() {
        let mut fields = Map::new();
        fields.insert("patient".into(), json!("Ada"));
        let payload = AppointmentEvent::created("APT-1", "k", "c", fields)
            .to_payload()
            .unwrap();

        assert_eq!(payload["appointment_id"], "APT-1");
        assert_eq!(payload["idempotency_key"], "k");
        assert_eq!(payload["payload"]["patient"], "Ada");
        assert!(payload.get("type").is_none());
    }
}
