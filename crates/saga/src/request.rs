//! Coordinator request and response shapes.

use common::IdempotencyKey;
use domain::{ActionEvent, WorkState};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use store::IdempotencyRecord;

/// Request payload: business fields plus two control fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestPayload {
    /// Attribute to read the action label from; defaults to `data-action`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,

    /// Per-request attempt budget for the provider call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,

    /// Everything else, forwarded to the provider after masking.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

/// One inbound request to the coordinator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppointmentRequest {
    #[serde(default)]
    pub event: Option<ActionEvent>,
    #[serde(default)]
    pub payload: RequestPayload,
    #[serde(default)]
    pub idempotency_key: Option<String>,
    #[serde(default)]
    pub correlation_id: Option<String>,
}

impl AppointmentRequest {
    pub fn new(event: ActionEvent) -> Self {
        Self {
            event: Some(event),
            ..Self::default()
        }
    }

    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    pub fn with_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.payload.attribute = Some(attribute.into());
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.payload.max_attempts = Some(max_attempts);
        self
    }

    /// Adds a business field to the payload.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload.fields.insert(key.into(), value.into());
        self
    }
}

/// Coordinator answer for one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppointmentResponse {
    pub state: WorkState,
    pub idempotency_key: IdempotencyKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub retries: u32,
}

impl AppointmentResponse {
    /// Renders a ledger record as a response.
    ///
    /// Fresh outcomes and replays both go through here, so a replay returns
    /// exactly what the first call returned.
    pub fn from_record(record: &IdempotencyRecord) -> Self {
        Self {
            state: record.status,
            idempotency_key: record.key.clone(),
            response: record.response.clone(),
            error: record.error.clone(),
            retries: record.retries,
        }
    }

    /// The created appointment's ID, when the response carries one.
    pub fn appointment_id(&self) -> Option<&str> {
        self.response
            .as_ref()
            .and_then(|r| r.get("appointment_id"))
            .and_then(Value::as_str)
    }

    pub fn is_completed(&self) -> bool {
        self.state == WorkState::Completed
    }

    pub fn is_failed(&self) -> bool {
        self.state == WorkState::Failed
    }
}
