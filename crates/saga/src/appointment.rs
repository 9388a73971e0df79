//! Appointment saga constants and routing.

/// The saga type identifier for appointment booking.
pub const SAGA_TYPE: &str = "AppointmentBooking";

/// Action labels recognised as "create appointment".
pub const CREATE_APPOINTMENT_ACTIONS: &[&str] = &["create-appointment", "createAppointment"];

/// Outbox topic: an appointment was created upstream.
pub const TOPIC_CREATED: &str = "appointments.created";

/// Outbox topic: a created appointment was cancelled by compensation.
pub const TOPIC_COMPENSATED: &str = "appointments.compensated";

/// Flow selected by an action label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    CreateAppointment,
}

impl Route {
    /// Resolves a label to a flow, or `None` if the label is not recognised.
    pub fn from_label(label: &str) -> Option<Self> {
        if CREATE_APPOINTMENT_ACTIONS.contains(&label) {
            Some(Route::CreateAppointment)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Route::CreateAppointment => "create_appointment",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_synonyms_route_to_create() {
        assert_eq!(
            Route::from_label("create-appointment"),
            Some(Route::CreateAppointment)
        );
        assert_eq!(
            Route::from_label("createAppointment"),
            Some(Route::CreateAppointment)
        );
    }

    #[test]
    fn test_other_labels_are_unrouted() {
        assert_eq!(Route::from_label("delete-appointment"), None);
        assert_eq!(Route::from_label("Create-Appointment"), None);
        assert_eq!(Route::from_label(""), None);
    }
}
