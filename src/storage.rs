//! SQLite storage layer for Waypost.
//!
//! Acts as both collaborators of the pipeline: it is the zone catalog
//! (active zones only) and the persistence sink for locations, alerts and
//! notifications.
//!
//! Zone geometry is stored as plain numeric columns (center latitude,
//! center longitude, radius). Nothing is ever parsed back out of a
//! serialized point string.

use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};

use crate::catalog::ZoneCatalog;
use crate::model::{
    AlertRequest, AlertSeverity, AlertType, CreateZoneRequest, LocationRecord, LocationSample,
    NotificationKind, NotificationRequest, StoredAlert, StoredNotification, Zone, ZoneType,
};
use crate::pipeline::Persistence;

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Storage {
    pool: SqlitePool,
}

/// Timestamps are stored as unix milliseconds.
fn from_millis(ts: i64) -> anyhow::Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ts).ok_or_else(|| anyhow::anyhow!("timestamp out of range: {ts}"))
}

fn window_start(minutes: u32, now: DateTime<Utc>) -> i64 {
    now.timestamp_millis() - i64::from(minutes) * 60_000
}

impl Storage {
    /// Create a new storage instance and initialize the schema.
    ///
    /// # Arguments
    ///
    /// * `database_url` - SQLite connection string (e.g., "sqlite:waypost.db" or "sqlite::memory:")
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        // Every connection to an in-memory database gets its own empty database
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        let storage = Self { pool };
        storage.initialize_schema().await?;

        Ok(storage)
    }

    /// Create the database schema if it doesn't exist.
    async fn initialize_schema(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS zones (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                center_latitude REAL NOT NULL,
                center_longitude REAL NOT NULL,
                radius_meters REAL NOT NULL,
                zone_type TEXT NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 1
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS locations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                subject_id TEXT NOT NULL,
                latitude REAL NOT NULL,
                longitude REAL NOT NULL,
                accuracy_meters REAL,
                altitude_meters REAL,
                speed_mps REAL,
                heading_degrees REAL,
                battery_level INTEGER,
                ts INTEGER NOT NULL,
                is_emergency INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_locations_subject_ts
            ON locations(subject_id, ts)
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS alerts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                subject_id TEXT NOT NULL,
                message TEXT NOT NULL,
                alert_type TEXT NOT NULL,
                severity TEXT NOT NULL,
                location_latitude REAL NOT NULL,
                location_longitude REAL NOT NULL,
                is_resolved INTEGER NOT NULL DEFAULT 0,
                ts INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_alerts_ts
            ON alerts(ts)
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS notifications (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                kind TEXT NOT NULL,
                title TEXT NOT NULL,
                message TEXT NOT NULL,
                severity TEXT NOT NULL,
                subject_id TEXT NOT NULL,
                metadata TEXT NOT NULL,
                ts INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // ------------------------------------------------------------------
    // Zones
    // ------------------------------------------------------------------

    /// Store a new zone and return it with its assigned id.
    ///
    /// The request is expected to have been validated already.
    pub async fn create_zone(&self, request: &CreateZoneRequest) -> anyhow::Result<Zone> {
        let result = sqlx::query(
            r#"
            INSERT INTO zones
                (name, description, center_latitude, center_longitude, radius_meters, zone_type, is_active)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&request.name)
        .bind(&request.description)
        .bind(request.center_latitude)
        .bind(request.center_longitude)
        .bind(request.radius_meters)
        .bind(request.zone_type.as_str())
        .bind(request.is_active)
        .execute(&self.pool)
        .await?;

        Ok(Zone {
            id: result.last_insert_rowid(),
            name: request.name.clone(),
            description: request.description.clone(),
            center_latitude: request.center_latitude,
            center_longitude: request.center_longitude,
            radius_meters: request.radius_meters,
            zone_type: request.zone_type.clone(),
            is_active: request.is_active,
        })
    }

    /// All zones, active or not, in id order.
    pub async fn list_zones(&self) -> anyhow::Result<Vec<Zone>> {
        let rows = sqlx::query("SELECT * FROM zones ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.iter().map(zone_from_row).collect())
    }

    /// Active zones in id order. This is the evaluator's view of the catalog.
    pub async fn active_zones(&self) -> anyhow::Result<Vec<Zone>> {
        let rows = sqlx::query("SELECT * FROM zones WHERE is_active = 1 ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.iter().map(zone_from_row).collect())
    }

    pub async fn get_zone(&self, id: i64) -> anyhow::Result<Option<Zone>> {
        let row = sqlx::query("SELECT * FROM zones WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(zone_from_row))
    }

    /// Activate or deactivate a zone.
    ///
    /// # Returns
    ///
    /// `false` if no zone has this id.
    pub async fn set_zone_active(&self, id: i64, is_active: bool) -> anyhow::Result<bool> {
        let result = sqlx::query("UPDATE zones SET is_active = ? WHERE id = ?")
            .bind(is_active)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    // ------------------------------------------------------------------
    // Locations
    // ------------------------------------------------------------------

    pub async fn insert_location(&self, sample: &LocationSample) -> anyhow::Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO locations
                (subject_id, latitude, longitude, accuracy_meters, altitude_meters,
                 speed_mps, heading_degrees, battery_level, ts, is_emergency)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&sample.subject_id)
        .bind(sample.latitude)
        .bind(sample.longitude)
        .bind(sample.accuracy_meters)
        .bind(sample.altitude_meters)
        .bind(sample.speed_mps)
        .bind(sample.heading_degrees)
        .bind(sample.battery_level.map(i64::from))
        .bind(sample.timestamp.timestamp_millis())
        .bind(sample.is_emergency)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// The most recent stored sample for a subject.
    pub async fn latest_location(&self, subject_id: &str) -> anyhow::Result<Option<LocationRecord>> {
        let row = sqlx::query(
            r#"
            SELECT * FROM locations
            WHERE subject_id = ?
            ORDER BY ts DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(subject_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(location_from_row).transpose()
    }

    // ------------------------------------------------------------------
    // Alerts
    // ------------------------------------------------------------------

    pub async fn insert_alert(
        &self,
        alert: &AlertRequest,
        now: DateTime<Utc>,
    ) -> anyhow::Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO alerts
                (subject_id, message, alert_type, severity, location_latitude, location_longitude, ts)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&alert.subject_id)
        .bind(&alert.message)
        .bind(alert.alert_type.as_str())
        .bind(alert.severity.as_str())
        .bind(alert.location_latitude)
        .bind(alert.location_longitude)
        .bind(now.timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Alerts raised within the last `minutes`, newest first.
    ///
    /// # Arguments
    ///
    /// * `minutes` - Lookback window in minutes
    /// * `subject_id` - Restrict to one subject when given
    /// * `now` - The reference timestamp
    pub async fn recent_alerts(
        &self,
        minutes: u32,
        subject_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Vec<StoredAlert>> {
        let start_ts = window_start(minutes, now);

        let rows = sqlx::query(
            r#"
            SELECT * FROM alerts
            WHERE ts >= ? AND (? IS NULL OR subject_id = ?)
            ORDER BY ts DESC, id DESC
            "#,
        )
        .bind(start_ts)
        .bind(subject_id)
        .bind(subject_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(alert_from_row).collect()
    }

    /// Mark an alert as resolved.
    ///
    /// # Returns
    ///
    /// `false` if no alert has this id.
    pub async fn resolve_alert(&self, id: i64) -> anyhow::Result<bool> {
        let result = sqlx::query("UPDATE alerts SET is_resolved = 1 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    // ------------------------------------------------------------------
    // Notifications
    // ------------------------------------------------------------------

    pub async fn insert_notification(
        &self,
        notification: &NotificationRequest,
        now: DateTime<Utc>,
    ) -> anyhow::Result<i64> {
        let metadata = serde_json::to_string(&notification.metadata)?;

        let result = sqlx::query(
            r#"
            INSERT INTO notifications
                (kind, title, message, severity, subject_id, metadata, ts)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(notification.kind.as_str())
        .bind(&notification.title)
        .bind(&notification.message)
        .bind(notification.severity.as_str())
        .bind(&notification.subject_id)
        .bind(metadata)
        .bind(now.timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Notifications created within the last `minutes`, newest first.
    pub async fn recent_notifications(
        &self,
        minutes: u32,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Vec<StoredNotification>> {
        let start_ts = window_start(minutes, now);

        let rows = sqlx::query(
            r#"
            SELECT * FROM notifications
            WHERE ts >= ?
            ORDER BY ts DESC, id DESC
            "#,
        )
        .bind(start_ts)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(notification_from_row).collect()
    }
}

fn zone_from_row(row: &SqliteRow) -> Zone {
    Zone {
        id: row.get("id"),
        name: row.get("name"),
        description: row.get("description"),
        center_latitude: row.get("center_latitude"),
        center_longitude: row.get("center_longitude"),
        radius_meters: row.get("radius_meters"),
        zone_type: ZoneType::from(row.get::<String, _>("zone_type")),
        is_active: row.get("is_active"),
    }
}

fn location_from_row(row: &SqliteRow) -> anyhow::Result<LocationRecord> {
    let battery: Option<i64> = row.get("battery_level");

    Ok(LocationRecord {
        id: row.get("id"),
        sample: LocationSample {
            subject_id: row.get("subject_id"),
            latitude: row.get("latitude"),
            longitude: row.get("longitude"),
            accuracy_meters: row.get("accuracy_meters"),
            altitude_meters: row.get("altitude_meters"),
            speed_mps: row.get("speed_mps"),
            heading_degrees: row.get("heading_degrees"),
            battery_level: battery.and_then(|b| u8::try_from(b).ok()),
            timestamp: from_millis(row.get("ts"))?,
            is_emergency: row.get("is_emergency"),
        },
    })
}

fn alert_from_row(row: &SqliteRow) -> anyhow::Result<StoredAlert> {
    let alert_type: String = row.get("alert_type");
    let severity: String = row.get("severity");

    Ok(StoredAlert {
        id: row.get("id"),
        alert: AlertRequest {
            subject_id: row.get("subject_id"),
            message: row.get("message"),
            alert_type: AlertType::parse(&alert_type)
                .ok_or_else(|| anyhow::anyhow!("unknown alert type: {alert_type}"))?,
            severity: AlertSeverity::parse(&severity)
                .ok_or_else(|| anyhow::anyhow!("unknown severity: {severity}"))?,
            location_latitude: row.get("location_latitude"),
            location_longitude: row.get("location_longitude"),
        },
        is_resolved: row.get("is_resolved"),
        created_at: from_millis(row.get("ts"))?,
    })
}

fn notification_from_row(row: &SqliteRow) -> anyhow::Result<StoredNotification> {
    let severity: String = row.get("severity");
    let metadata: String = row.get("metadata");

    Ok(StoredNotification {
        id: row.get("id"),
        notification: NotificationRequest {
            kind: NotificationKind::EmergencyAlert,
            title: row.get("title"),
            message: row.get("message"),
            severity: AlertSeverity::parse(&severity)
                .ok_or_else(|| anyhow::anyhow!("unknown severity: {severity}"))?,
            subject_id: row.get("subject_id"),
            metadata: serde_json::from_str(&metadata)?,
        },
        created_at: from_millis(row.get("ts"))?,
    })
}

impl ZoneCatalog for Storage {
    async fn zones(&self) -> anyhow::Result<Vec<Zone>> {
        self.active_zones().await
    }
}

impl Persistence for Storage {
    async fn record_location(&self, sample: &LocationSample) -> anyhow::Result<()> {
        self.insert_location(sample).await.map(|_| ())
    }

    async fn record_alert(&self, alert: &AlertRequest) -> anyhow::Result<()> {
        self.insert_alert(alert, Utc::now()).await.map(|_| ())
    }

    async fn record_notification(&self, notification: &NotificationRequest) -> anyhow::Result<()> {
        self.insert_notification(notification, Utc::now())
            .await
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::GeoPoint;
    use crate::model::NotificationMetadata;

    async fn setup_test_storage() -> Storage {
        Storage::new("sqlite::memory:").await.unwrap()
    }

    fn zone_request(name: &str, zone_type: ZoneType, is_active: bool) -> CreateZoneRequest {
        CreateZoneRequest {
            name: name.to_string(),
            description: format!("{name} description"),
            center_latitude: 26.5775,
            center_longitude: 93.1717,
            radius_meters: 5000.0,
            zone_type,
            is_active,
        }
    }

    fn alert(subject_id: &str) -> AlertRequest {
        AlertRequest {
            subject_id: subject_id.to_string(),
            message: "Alert: You have entered Zone. Careful.".into(),
            alert_type: AlertType::Geofence,
            severity: AlertSeverity::High,
            location_latitude: 1.5,
            location_longitude: 2.5,
        }
    }

    #[tokio::test]
    async fn test_create_and_list_zones() {
        let storage = setup_test_storage().await;

        let created = storage
            .create_zone(&zone_request("Kaziranga", ZoneType::HighRisk, true))
            .await
            .unwrap();
        storage
            .create_zone(&zone_request("Old Fort", ZoneType::from("heritage"), false))
            .await
            .unwrap();

        let all = storage.list_zones().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0], created);
        assert_eq!(all[1].zone_type, ZoneType::Other("heritage".into()));
        assert!(!all[1].is_active);

        let fetched = storage.get_zone(created.id).await.unwrap();
        assert_eq!(fetched, Some(created));
        assert!(storage.get_zone(999).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_catalog_returns_active_zones_only() {
        let storage = setup_test_storage().await;

        for (name, active) in [("a", true), ("b", false), ("c", true)] {
            storage
                .create_zone(&zone_request(name, ZoneType::Restricted, active))
                .await
                .unwrap();
        }

        let names: Vec<String> = storage
            .zones()
            .await
            .unwrap()
            .into_iter()
            .map(|z| z.name)
            .collect();
        assert_eq!(names, vec!["a", "c"]);
    }

    #[tokio::test]
    async fn test_set_zone_active() {
        let storage = setup_test_storage().await;
        let zone = storage
            .create_zone(&zone_request("a", ZoneType::Safe, true))
            .await
            .unwrap();

        assert!(storage.set_zone_active(zone.id, false).await.unwrap());
        assert!(storage.active_zones().await.unwrap().is_empty());

        assert!(!storage.set_zone_active(12345, true).await.unwrap());
    }

    #[tokio::test]
    async fn test_latest_location() {
        let storage = setup_test_storage().await;
        let now = Utc::now();

        assert!(storage.latest_location("tourist-1").await.unwrap().is_none());

        let mut older = LocationSample::new("tourist-1", 1.0, 1.0, now - chrono::Duration::minutes(5));
        older.battery_level = Some(80);
        storage.insert_location(&older).await.unwrap();

        let mut newer = LocationSample::new("tourist-1", 2.0, 2.0, now);
        newer.accuracy_meters = Some(12.5);
        newer.is_emergency = true;
        storage.insert_location(&newer).await.unwrap();

        storage
            .insert_location(&LocationSample::new("tourist-2", 9.0, 9.0, now))
            .await
            .unwrap();

        let latest = storage.latest_location("tourist-1").await.unwrap().unwrap();
        assert_eq!(latest.sample.latitude, 2.0);
        assert_eq!(latest.sample.accuracy_meters, Some(12.5));
        assert_eq!(latest.sample.battery_level, None);
        assert!(latest.sample.is_emergency);
        assert_eq!(latest.sample.timestamp.timestamp_millis(), now.timestamp_millis());
    }

    #[tokio::test]
    async fn test_location_keeps_milliseconds() {
        let storage = setup_test_storage().await;
        let taken_at = DateTime::from_timestamp_millis(1_700_000_000_123).unwrap();

        storage
            .insert_location(&LocationSample::new("tourist-1", 1.0, 1.0, taken_at))
            .await
            .unwrap();

        let latest = storage.latest_location("tourist-1").await.unwrap().unwrap();
        assert_eq!(latest.sample.timestamp, taken_at);
    }

    #[tokio::test]
    async fn test_alert_window_edge_is_millisecond_precise() {
        let storage = setup_test_storage().await;
        let now = DateTime::from_timestamp_millis(1_700_000_600_500).unwrap();
        let edge = now - chrono::Duration::minutes(10);

        storage.insert_alert(&alert("inside"), edge).await.unwrap();
        storage
            .insert_alert(&alert("outside"), edge - chrono::Duration::milliseconds(1))
            .await
            .unwrap();

        let recent = storage.recent_alerts(10, None, now).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].alert.subject_id, "inside");
        assert_eq!(recent[0].created_at, edge);
    }

    #[tokio::test]
    async fn test_recent_alerts_window_and_filter() {
        let storage = setup_test_storage().await;
        let now = Utc::now();

        storage.insert_alert(&alert("a"), now).await.unwrap();
        storage.insert_alert(&alert("b"), now).await.unwrap();
        storage
            .insert_alert(&alert("a"), now - chrono::Duration::hours(3))
            .await
            .unwrap();

        let all = storage.recent_alerts(60, None, now).await.unwrap();
        assert_eq!(all.len(), 2);
        // Newest first; equal timestamps fall back to id
        assert_eq!(all[0].alert.subject_id, "b");

        let only_a = storage.recent_alerts(60, Some("a"), now).await.unwrap();
        assert_eq!(only_a.len(), 1);
        assert_eq!(only_a[0].alert, alert("a"));
        assert!(!only_a[0].is_resolved);

        let wide = storage.recent_alerts(24 * 60, Some("a"), now).await.unwrap();
        assert_eq!(wide.len(), 2);
    }

    #[tokio::test]
    async fn test_resolve_alert() {
        let storage = setup_test_storage().await;
        let now = Utc::now();
        let id = storage.insert_alert(&alert("a"), now).await.unwrap();

        assert!(storage.resolve_alert(id).await.unwrap());
        assert!(!storage.resolve_alert(id + 100).await.unwrap());

        let alerts = storage.recent_alerts(60, None, now).await.unwrap();
        assert!(alerts[0].is_resolved);
    }

    #[tokio::test]
    async fn test_notification_metadata_round_trip() {
        let storage = setup_test_storage().await;
        let now = Utc::now();

        let notification = NotificationRequest {
            kind: NotificationKind::EmergencyAlert,
            title: "Tourist in restricted zone".into(),
            message: "Tourist t-1 has entered Border Area".into(),
            severity: AlertSeverity::Critical,
            subject_id: "t-1".into(),
            metadata: NotificationMetadata {
                zone_id: Some(4),
                zone_name: Some("Border Area".into()),
                location: GeoPoint::new(27.0, 92.0),
                distance_meters: Some(310),
            },
        };

        storage.insert_notification(&notification, now).await.unwrap();

        let stored = storage.recent_notifications(60, now).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].notification, notification);
    }
}
