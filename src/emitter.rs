//! Alert and notification policy.
//!
//! Turns violations into the records that persistence and responders need.
//! Nothing here performs I/O; the pipeline hands the output to its
//! collaborators.

use crate::model::{
    AlertRequest, AlertSeverity, AlertType, LocationSample, NotificationKind, NotificationMetadata,
    NotificationRequest, Violation, ZoneType,
};

/// Alerts and notifications produced for one sample.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Emission {
    pub alerts: Vec<AlertRequest>,
    pub notifications: Vec<NotificationRequest>,
}

impl Emission {
    pub fn is_empty(&self) -> bool {
        self.alerts.is_empty() && self.notifications.is_empty()
    }

    /// Append another emission, keeping order.
    pub fn extend(&mut self, other: Emission) {
        self.alerts.extend(other.alerts);
        self.notifications.extend(other.notifications);
    }
}

/// Severity of the alert raised when a subject enters a zone of this type.
///
/// `None` means the zone type does not raise alerts at all.
pub fn severity_for(zone_type: &ZoneType) -> Option<AlertSeverity> {
    match zone_type {
        ZoneType::HighRisk => Some(AlertSeverity::Critical),
        ZoneType::Restricted => Some(AlertSeverity::High),
        ZoneType::Safe | ZoneType::Other(_) => None,
    }
}

/// Build one alert and one notification per alerting violation.
///
/// There is no deduplication: two restricted zones entered by the same
/// sample produce two alert/notification pairs.
pub fn emit(subject_id: &str, sample: &LocationSample, violations: &[Violation]) -> Emission {
    let mut emission = Emission::default();

    for violation in violations {
        let Some(severity) = severity_for(&violation.zone_type) else {
            continue;
        };

        emission.alerts.push(AlertRequest {
            subject_id: subject_id.to_string(),
            message: format!(
                "Alert: You have entered {}. {}",
                violation.zone_name, violation.description
            ),
            alert_type: AlertType::Geofence,
            severity,
            location_latitude: sample.latitude,
            location_longitude: sample.longitude,
        });

        emission.notifications.push(NotificationRequest {
            kind: NotificationKind::EmergencyAlert,
            title: format!("Tourist in {} zone", violation.zone_type),
            message: format!(
                "Tourist {} has entered {} ({} m from center)",
                subject_id, violation.zone_name, violation.distance_meters
            ),
            severity: AlertSeverity::Critical,
            subject_id: subject_id.to_string(),
            metadata: NotificationMetadata {
                zone_id: Some(violation.zone_id),
                zone_name: Some(violation.zone_name.clone()),
                location: sample.point(),
                distance_meters: Some(violation.distance_meters),
            },
        });
    }

    emission
}

/// Build the alert pair for a panic-button sample.
///
/// Returns an empty emission when the sample is not flagged as an emergency.
pub fn emit_panic(sample: &LocationSample) -> Emission {
    if !sample.is_emergency {
        return Emission::default();
    }

    Emission {
        alerts: vec![AlertRequest {
            subject_id: sample.subject_id.clone(),
            message: format!(
                "Emergency: panic button pressed at ({:.5}, {:.5})",
                sample.latitude, sample.longitude
            ),
            alert_type: AlertType::Panic,
            severity: AlertSeverity::Critical,
            location_latitude: sample.latitude,
            location_longitude: sample.longitude,
        }],
        notifications: vec![NotificationRequest {
            kind: NotificationKind::EmergencyAlert,
            title: "Emergency: panic button pressed".to_string(),
            message: format!(
                "Tourist {} triggered a panic alert and needs immediate assistance",
                sample.subject_id
            ),
            severity: AlertSeverity::Critical,
            subject_id: sample.subject_id.clone(),
            metadata: NotificationMetadata {
                zone_id: None,
                zone_name: None,
                location: sample.point(),
                distance_meters: None,
            },
        }],
    }
}
