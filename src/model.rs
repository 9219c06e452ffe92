//! Data models for Waypost.
//!
//! Types fall into three groups:
//!
//! - Core inputs: [`LocationSample`] and [`Zone`]
//! - Core outputs: [`Violation`], [`AlertRequest`], [`NotificationRequest`]
//! - API and storage shapes: request bodies, query parameters, stored records
//!
//! Core types are plain values. They carry no database handles and can be
//! built by hand in tests.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::WaypostError;
use crate::geo::GeoPoint;

/// The kind of a geofence zone.
///
/// The set is open: zone types this service does not recognise are kept
/// verbatim and never trigger alerts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ZoneType {
    /// A zone where tourists are expected and safe.
    Safe,
    /// A zone with elevated danger. Entry raises a critical alert.
    HighRisk,
    /// A zone tourists may not enter. Entry raises a high alert.
    Restricted,
    /// Any other label supplied by zone management.
    Other(String),
}

impl ZoneType {
    pub fn as_str(&self) -> &str {
        match self {
            ZoneType::Safe => "safe",
            ZoneType::HighRisk => "high_risk",
            ZoneType::Restricted => "restricted",
            ZoneType::Other(label) => label,
        }
    }
}

impl From<String> for ZoneType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "safe" => ZoneType::Safe,
            "high_risk" => ZoneType::HighRisk,
            "restricted" => ZoneType::Restricted,
            _ => ZoneType::Other(value),
        }
    }
}

impl From<&str> for ZoneType {
    fn from(value: &str) -> Self {
        ZoneType::from(value.to_string())
    }
}

impl From<ZoneType> for String {
    fn from(value: ZoneType) -> Self {
        match value {
            ZoneType::Other(label) => label,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for ZoneType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A circular geofence zone.
///
/// Zones are owned by zone management. The evaluator only ever reads a
/// snapshot of them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub center_latitude: f64,
    pub center_longitude: f64,

    /// Radius in meters. Non-positive radii are stored as-is; see
    /// [`crate::geofence::evaluate`] for how they behave.
    pub radius_meters: f64,

    pub zone_type: ZoneType,

    /// Inactive zones are never evaluated.
    pub is_active: bool,
}

impl Zone {
    /// The zone's center as a point.
    pub fn center(&self) -> GeoPoint {
        GeoPoint::new(self.center_latitude, self.center_longitude)
    }
}

/// Request body for `POST /zones`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateZoneRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub center_latitude: f64,
    pub center_longitude: f64,
    pub radius_meters: f64,
    pub zone_type: ZoneType,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

impl CreateZoneRequest {
    /// Check the zone definition before it is stored.
    ///
    /// Zone management is stricter than the evaluator: a new zone must have
    /// a name, an in-range center and a positive radius.
    pub fn validate(&self) -> Result<(), WaypostError> {
        if self.name.trim().is_empty() {
            return Err(WaypostError::InvalidInput("name is required".into()));
        }
        if !(-90.0..=90.0).contains(&self.center_latitude) {
            return Err(WaypostError::InvalidInput(
                "center_latitude must be between -90 and 90".into(),
            ));
        }
        if !(-180.0..=180.0).contains(&self.center_longitude) {
            return Err(WaypostError::InvalidInput(
                "center_longitude must be between -180 and 180".into(),
            ));
        }
        if !(self.radius_meters > 0.0 && self.radius_meters.is_finite()) {
            return Err(WaypostError::InvalidInput(
                "radius_meters must be a positive number".into(),
            ));
        }
        Ok(())
    }
}

/// Request body for `PUT /zones/:id/active`.
#[derive(Debug, Clone, Deserialize)]
pub struct SetZoneActiveRequest {
    pub is_active: bool,
}

/// A single location fix for a tracked subject.
///
/// Coordinates are not range-checked. Out-of-range values simply produce
/// whatever geometry the distance formula yields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationSample {
    pub subject_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy_meters: Option<f64>,
    pub altitude_meters: Option<f64>,
    pub speed_mps: Option<f64>,
    pub heading_degrees: Option<f64>,
    pub battery_level: Option<u8>,
    pub timestamp: DateTime<Utc>,

    /// Set by the caller (panic button). Has no effect on geofence evaluation.
    pub is_emergency: bool,
}

impl LocationSample {
    /// Build a sample with only the required fields.
    pub fn new(subject_id: &str, latitude: f64, longitude: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            subject_id: subject_id.to_string(),
            latitude,
            longitude,
            accuracy_meters: None,
            altitude_meters: None,
            speed_mps: None,
            heading_degrees: None,
            battery_level: None,
            timestamp,
            is_emergency: false,
        }
    }

    pub fn point(&self) -> GeoPoint {
        GeoPoint::new(self.latitude, self.longitude)
    }
}

/// Request body for `POST /locations` and `POST /emergency`.
///
/// Required fields are optional here so that a missing field surfaces as an
/// `InvalidInput` error naming it, rather than a generic body rejection.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LocationRequest {
    pub subject_id: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub accuracy_meters: Option<f64>,
    pub altitude_meters: Option<f64>,
    pub speed_mps: Option<f64>,
    pub heading_degrees: Option<f64>,
    pub battery_level: Option<i64>,
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_emergency: bool,
}

impl LocationRequest {
    /// Validate the request shape and turn it into a sample.
    ///
    /// `now` fills in the timestamp when the client did not send one.
    pub fn into_sample(self, now: DateTime<Utc>) -> Result<LocationSample, WaypostError> {
        let subject_id = self
            .subject_id
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| WaypostError::InvalidInput("subject_id is required".into()))?;

        let latitude = self
            .latitude
            .ok_or_else(|| WaypostError::InvalidInput("latitude is required".into()))?;
        let longitude = self
            .longitude
            .ok_or_else(|| WaypostError::InvalidInput("longitude is required".into()))?;

        if !latitude.is_finite() || !longitude.is_finite() {
            return Err(WaypostError::InvalidInput(
                "coordinates must be finite numbers".into(),
            ));
        }

        let battery_level = match self.battery_level {
            None => None,
            Some(level) => Some(u8::try_from(level).ok().filter(|l| *l <= 100).ok_or_else(
                || WaypostError::InvalidInput("battery_level must be between 0 and 100".into()),
            )?),
        };

        Ok(LocationSample {
            subject_id,
            latitude,
            longitude,
            accuracy_meters: self.accuracy_meters,
            altitude_meters: self.altitude_meters,
            speed_mps: self.speed_mps,
            heading_degrees: self.heading_degrees,
            battery_level,
            timestamp: self.timestamp.unwrap_or(now),
            is_emergency: self.is_emergency,
        })
    }
}

/// The fact that a sample fell inside an active zone.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Violation {
    pub zone_id: i64,
    pub zone_name: String,
    pub zone_type: ZoneType,

    /// Distance from the sample to the zone center, rounded to whole meters.
    pub distance_meters: i64,

    pub description: String,
}

/// Alert severity levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    High,
    Critical,
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::High => "high",
            AlertSeverity::Critical => "critical",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "high" => Some(AlertSeverity::High),
            "critical" => Some(AlertSeverity::Critical),
            _ => None,
        }
    }
}

/// What raised an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertType {
    /// The subject entered a high-risk or restricted zone.
    Geofence,
    /// The subject pressed the panic button.
    Panic,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::Geofence => "geofence",
            AlertType::Panic => "panic",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "geofence" => Some(AlertType::Geofence),
            "panic" => Some(AlertType::Panic),
            _ => None,
        }
    }
}

/// An alert to be persisted for the subject and the authorities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRequest {
    pub subject_id: String,
    pub message: String,
    pub alert_type: AlertType,
    pub severity: AlertSeverity,
    pub location_latitude: f64,
    pub location_longitude: f64,
}

/// Notification kinds. Only emergency alerts exist today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    EmergencyAlert,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::EmergencyAlert => "emergency_alert",
        }
    }
}

/// Context attached to a notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone_name: Option<String>,
    pub location: GeoPoint,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance_meters: Option<i64>,
}

/// A notification to be persisted and delivered to responders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationRequest {
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub severity: AlertSeverity,
    pub subject_id: String,
    pub metadata: NotificationMetadata,
}

/// An alert as stored.
#[derive(Debug, Clone, Serialize)]
pub struct StoredAlert {
    pub id: i64,
    #[serde(flatten)]
    pub alert: AlertRequest,
    pub is_resolved: bool,
    pub created_at: DateTime<Utc>,
}

/// A notification as stored.
#[derive(Debug, Clone, Serialize)]
pub struct StoredNotification {
    pub id: i64,
    #[serde(flatten)]
    pub notification: NotificationRequest,
    pub created_at: DateTime<Utc>,
}

/// A location sample as stored.
#[derive(Debug, Clone, Serialize)]
pub struct LocationRecord {
    pub id: i64,
    #[serde(flatten)]
    pub sample: LocationSample,
}

/// Result of ingesting one sample; also the body of `POST /locations`
/// and `POST /emergency` responses.
#[derive(Debug, Clone, Serialize)]
pub struct IngestResponse {
    pub subject_id: String,
    pub violations: Vec<Violation>,
    pub alerts: Vec<AlertRequest>,
    pub notifications: Vec<NotificationRequest>,

    /// How many alerts the persistence collaborator accepted.
    pub persisted_alerts: usize,

    /// How many notifications the persistence collaborator accepted.
    pub persisted_notifications: usize,

    /// How many notifications the webhook accepted.
    pub delivered_notifications: usize,
}

/// Response for `GET /alerts/recent`.
#[derive(Debug, Clone, Serialize)]
pub struct AlertsResponse {
    pub alerts: Vec<StoredAlert>,
    pub lookback_minutes: u32,
}

/// Response for `GET /notifications/recent`.
#[derive(Debug, Clone, Serialize)]
pub struct NotificationsResponse {
    pub notifications: Vec<StoredNotification>,
    pub lookback_minutes: u32,
}

/// Query parameters for `GET /alerts/recent`.
#[derive(Debug, Deserialize)]
pub struct AlertsQuery {
    /// Lookback window in minutes (default: 60).
    #[serde(default = "default_lookback_minutes")]
    pub minutes: u32,

    /// Only return alerts for this subject.
    pub subject_id: Option<String>,
}

/// Query parameters for `GET /notifications/recent`.
#[derive(Debug, Deserialize)]
pub struct NotificationsQuery {
    #[serde(default = "default_lookback_minutes")]
    pub minutes: u32,
}

fn default_lookback_minutes() -> u32 {
    60
}
