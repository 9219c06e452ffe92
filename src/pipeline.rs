//! The ingestion pipeline: catalog snapshot, evaluation, emission, hand-off.
//!
//! [`GeofencePipeline`] is built once per process with its collaborators
//! injected and then shared by reference across requests. Each call to
//! [`GeofencePipeline::ingest`] is independent of every other call.
//!
//! # Delivery semantics
//!
//! Alerts and notifications are persisted and delivered **at most once, best
//! effort**. A failed insert or webhook call is logged and counted in the
//! outcome, never retried and never turned into an error for the caller.
//! Webhook calls are bounded by the notifier's own timeout.
//!
//! Only a failed catalog read or a failed location insert aborts ingestion.
//! Emergency samples are the exception to the first: when the catalog is
//! unavailable they are evaluated against no zones, so the panic alert is
//! still stored and delivered.

use std::future::Future;

use tracing::{info, instrument, warn};

use crate::catalog::ZoneCatalog;
use crate::emitter::{Emission, emit, emit_panic};
use crate::geofence::evaluate;
use crate::model::{AlertRequest, IngestResponse, LocationSample, NotificationRequest};
use crate::notify::Notifier;

/// Where locations, alerts and notifications are stored.
pub trait Persistence: Send + Sync {
    fn record_location(
        &self,
        sample: &LocationSample,
    ) -> impl Future<Output = anyhow::Result<()>> + Send;

    fn record_alert(&self, alert: &AlertRequest) -> impl Future<Output = anyhow::Result<()>> + Send;

    fn record_notification(
        &self,
        notification: &NotificationRequest,
    ) -> impl Future<Output = anyhow::Result<()>> + Send;
}

/// Geofence ingestion with injected collaborators.
pub struct GeofencePipeline<C, P, N> {
    catalog: C,
    persistence: P,
    notifier: N,
}

impl<C, P, N> GeofencePipeline<C, P, N>
where
    C: ZoneCatalog,
    P: Persistence,
    N: Notifier,
{
    pub fn new(catalog: C, persistence: P, notifier: N) -> Self {
        Self {
            catalog,
            persistence,
            notifier,
        }
    }

    pub fn catalog(&self) -> &C {
        &self.catalog
    }

    /// Evaluate one sample and hand the results to the collaborators.
    ///
    /// # Errors
    ///
    /// Fails if the zone catalog cannot be read for a non-emergency sample,
    /// in which case nothing is persisted, or if the location sample cannot
    /// be stored.
    #[instrument(skip(self, sample), fields(subject_id = %sample.subject_id))]
    pub async fn ingest(&self, sample: LocationSample) -> anyhow::Result<IngestResponse> {
        let zones = match self.catalog.zones().await {
            Ok(zones) => zones,
            Err(e) if sample.is_emergency => {
                warn!(
                    error = %e,
                    "Zone catalog unavailable; raising panic alert without geofence check"
                );
                Vec::new()
            }
            Err(e) => return Err(e),
        };

        let violations = evaluate(&sample, &zones);
        let mut emission = emit(&sample.subject_id, &sample, &violations);
        emission.extend(emit_panic(&sample));

        self.persistence.record_location(&sample).await?;

        let (persisted_alerts, persisted_notifications) = self.persist(&emission).await;
        let delivered_notifications = self.deliver(&emission.notifications).await;

        info!(
            zone_count = zones.len(),
            violation_count = violations.len(),
            alert_count = emission.alerts.len(),
            is_emergency = sample.is_emergency,
            "Location ingested"
        );

        Ok(IngestResponse {
            subject_id: sample.subject_id,
            violations,
            alerts: emission.alerts,
            notifications: emission.notifications,
            persisted_alerts,
            persisted_notifications,
            delivered_notifications,
        })
    }

    /// Store every alert and notification once. Returns how many of each stuck.
    async fn persist(&self, emission: &Emission) -> (usize, usize) {
        let mut alerts = 0;
        for alert in &emission.alerts {
            match self.persistence.record_alert(alert).await {
                Ok(()) => alerts += 1,
                Err(e) => warn!(
                    subject_id = %alert.subject_id,
                    severity = alert.severity.as_str(),
                    error = %e,
                    "Failed to record alert"
                ),
            }
        }

        let mut notifications = 0;
        for notification in &emission.notifications {
            match self.persistence.record_notification(notification).await {
                Ok(()) => notifications += 1,
                Err(e) => warn!(
                    subject_id = %notification.subject_id,
                    error = %e,
                    "Failed to record notification"
                ),
            }
        }

        (alerts, notifications)
    }

    async fn deliver(&self, notifications: &[NotificationRequest]) -> usize {
        let mut delivered = 0;
        for notification in notifications {
            match self.notifier.notify(notification).await {
                Ok(true) => delivered += 1,
                Ok(false) => {}
                Err(e) => warn!(
                    subject_id = %notification.subject_id,
                    error = %e,
                    "Failed to deliver notification"
                ),
            }
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WaypostError;
    use crate::model::{AlertSeverity, AlertType, Zone, ZoneType};
    use crate::notify::WebhookNotifier;
    use chrono::Utc;
    use std::time::Duration;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct StaticCatalog(Vec<Zone>);

    impl ZoneCatalog for StaticCatalog {
        async fn zones(&self) -> anyhow::Result<Vec<Zone>> {
            Ok(self.0.clone())
        }
    }

    struct BrokenCatalog;

    impl ZoneCatalog for BrokenCatalog {
        async fn zones(&self) -> anyhow::Result<Vec<Zone>> {
            anyhow::bail!("catalog unavailable")
        }
    }

    #[derive(Default)]
    struct MemoryPersistence {
        locations: Mutex<Vec<LocationSample>>,
        alerts: Mutex<Vec<AlertRequest>>,
        notifications: Mutex<Vec<NotificationRequest>>,
        fail_alerts: AtomicBool,
        fail_locations: AtomicBool,
    }

    impl Persistence for MemoryPersistence {
        async fn record_location(&self, sample: &LocationSample) -> anyhow::Result<()> {
            if self.fail_locations.load(Ordering::SeqCst) {
                anyhow::bail!("locations table locked");
            }
            self.locations.lock().unwrap().push(sample.clone());
            Ok(())
        }

        async fn record_alert(&self, alert: &AlertRequest) -> anyhow::Result<()> {
            if self.fail_alerts.load(Ordering::SeqCst) {
                anyhow::bail!("alerts table locked");
            }
            self.alerts.lock().unwrap().push(alert.clone());
            Ok(())
        }

        async fn record_notification(
            &self,
            notification: &NotificationRequest,
        ) -> anyhow::Result<()> {
            self.notifications.lock().unwrap().push(notification.clone());
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<String>>,
        fail: bool,
    }

    impl Notifier for RecordingNotifier {
        async fn notify(&self, notification: &NotificationRequest) -> Result<bool, WaypostError> {
            if self.fail {
                return Err(WaypostError::Notify("webhook down".into()));
            }
            self.sent.lock().unwrap().push(notification.title.clone());
            Ok(true)
        }
    }

    fn kaziranga() -> Zone {
        Zone {
            id: 1,
            name: "Kaziranga High Risk".into(),
            description: "Wild animals roam freely.".into(),
            center_latitude: 26.5775,
            center_longitude: 93.1717,
            radius_meters: 5000.0,
            zone_type: ZoneType::HighRisk,
            is_active: true,
        }
    }

    fn pipeline(
        zones: Vec<Zone>,
    ) -> GeofencePipeline<StaticCatalog, MemoryPersistence, RecordingNotifier> {
        GeofencePipeline::new(
            StaticCatalog(zones),
            MemoryPersistence::default(),
            RecordingNotifier::default(),
        )
    }

    #[tokio::test]
    async fn test_sample_outside_zone() {
        let pipeline = pipeline(vec![kaziranga()]);
        let sample = LocationSample::new("tourist-1", 26.1445, 91.7362, Utc::now());

        let outcome = pipeline.ingest(sample).await.unwrap();

        assert!(outcome.violations.is_empty());
        assert!(outcome.alerts.is_empty());
        assert!(outcome.notifications.is_empty());
        assert_eq!(pipeline.persistence.locations.lock().unwrap().len(), 1);
        assert!(pipeline.persistence.alerts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sample_inside_high_risk_zone() {
        let pipeline = pipeline(vec![kaziranga()]);
        let sample = LocationSample::new("tourist-1", 26.5780, 93.1720, Utc::now());

        let outcome = pipeline.ingest(sample).await.unwrap();

        assert_eq!(outcome.violations.len(), 1);
        assert_eq!(outcome.alerts.len(), 1);
        assert_eq!(outcome.alerts[0].severity, AlertSeverity::Critical);
        assert_eq!(outcome.notifications.len(), 1);
        assert_eq!(outcome.notifications[0].title, "Tourist in high_risk zone");
        assert_eq!(outcome.persisted_alerts, 1);
        assert_eq!(outcome.persisted_notifications, 1);
        assert_eq!(outcome.delivered_notifications, 1);

        assert_eq!(
            *pipeline.notifier.sent.lock().unwrap(),
            vec!["Tourist in high_risk zone".to_string()]
        );
    }

    #[tokio::test]
    async fn test_empty_catalog_still_records_location() {
        let pipeline = pipeline(vec![]);
        let sample = LocationSample::new("tourist-1", 0.0, 0.0, Utc::now());

        let outcome = pipeline.ingest(sample).await.unwrap();

        assert!(outcome.violations.is_empty());
        assert!(outcome.alerts.is_empty());
        assert_eq!(pipeline.persistence.locations.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_emergency_adds_panic_pair() {
        let pipeline = pipeline(vec![kaziranga()]);
        let mut sample = LocationSample::new("tourist-1", 26.5780, 93.1720, Utc::now());
        sample.is_emergency = true;

        let outcome = pipeline.ingest(sample).await.unwrap();

        // One geofence pair plus one panic pair, geofence first
        assert_eq!(outcome.violations.len(), 1);
        assert_eq!(outcome.alerts.len(), 2);
        assert_eq!(outcome.notifications.len(), 2);
        assert_eq!(outcome.alerts[1].alert_type, AlertType::Panic);
    }

    #[tokio::test]
    async fn test_catalog_failure_persists_nothing() {
        let pipeline = GeofencePipeline::new(
            BrokenCatalog,
            MemoryPersistence::default(),
            RecordingNotifier::default(),
        );
        let sample = LocationSample::new("tourist-1", 0.0, 0.0, Utc::now());

        assert!(pipeline.ingest(sample).await.is_err());
        assert!(pipeline.persistence.locations.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_emergency_survives_catalog_failure() {
        let pipeline = GeofencePipeline::new(
            BrokenCatalog,
            MemoryPersistence::default(),
            RecordingNotifier::default(),
        );
        let mut sample = LocationSample::new("tourist-1", 26.5780, 93.1720, Utc::now());
        sample.is_emergency = true;

        let outcome = pipeline.ingest(sample).await.unwrap();

        assert!(outcome.violations.is_empty());
        assert_eq!(outcome.persisted_alerts, 1);
        assert_eq!(outcome.delivered_notifications, 1);

        let alerts = pipeline.persistence.alerts.lock().unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].alert_type, AlertType::Panic);
        assert_eq!(pipeline.persistence.locations.lock().unwrap().len(), 1);
        assert_eq!(
            *pipeline.notifier.sent.lock().unwrap(),
            vec!["Emergency: panic button pressed".to_string()]
        );
    }

    #[tokio::test]
    async fn test_stalled_webhook_does_not_block_ingest() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let notifier = WebhookNotifier::new(&format!("http://{addr}/hook"))
            .with_timeout(Duration::from_millis(200));
        let pipeline = GeofencePipeline::new(
            StaticCatalog(vec![kaziranga()]),
            MemoryPersistence::default(),
            notifier,
        );
        let sample = LocationSample::new("tourist-1", 26.5780, 93.1720, Utc::now());

        let outcome = tokio::time::timeout(Duration::from_secs(5), pipeline.ingest(sample))
            .await
            .expect("ingest waited on the webhook")
            .unwrap();

        assert_eq!(outcome.alerts.len(), 1);
        assert_eq!(outcome.persisted_notifications, 1);
        assert_eq!(outcome.delivered_notifications, 0);
    }

    #[tokio::test]
    async fn test_location_failure_is_an_error() {
        let pipeline = pipeline(vec![kaziranga()]);
        pipeline.persistence.fail_locations.store(true, Ordering::SeqCst);
        let sample = LocationSample::new("tourist-1", 26.5780, 93.1720, Utc::now());

        assert!(pipeline.ingest(sample).await.is_err());
        assert!(pipeline.persistence.alerts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_alert_failures_are_best_effort() {
        let pipeline = pipeline(vec![kaziranga()]);
        pipeline.persistence.fail_alerts.store(true, Ordering::SeqCst);
        let sample = LocationSample::new("tourist-1", 26.5780, 93.1720, Utc::now());

        let outcome = pipeline.ingest(sample).await.unwrap();

        assert_eq!(outcome.alerts.len(), 1);
        assert_eq!(outcome.persisted_alerts, 0);
        assert_eq!(outcome.persisted_notifications, 1);
    }

    #[tokio::test]
    async fn test_notifier_failure_is_best_effort() {
        let pipeline = GeofencePipeline::new(
            StaticCatalog(vec![kaziranga()]),
            MemoryPersistence::default(),
            RecordingNotifier {
                fail: true,
                ..Default::default()
            },
        );
        let sample = LocationSample::new("tourist-1", 26.5780, 93.1720, Utc::now());

        let outcome = pipeline.ingest(sample).await.unwrap();

        assert_eq!(outcome.persisted_notifications, 1);
        assert_eq!(outcome.delivered_notifications, 0);
    }

    #[tokio::test]
    async fn test_concurrent_subjects_match_sequential() {
        let zones = vec![
            kaziranga(),
            Zone {
                id: 2,
                name: "Border Area".into(),
                description: "Permit required.".into(),
                center_latitude: 27.0,
                center_longitude: 92.0,
                radius_meters: 20_000.0,
                zone_type: ZoneType::Restricted,
                is_active: true,
            },
        ];
        let pipeline = pipeline(zones);

        let samples = [
            LocationSample::new("a", 26.5780, 93.1720, Utc::now()),
            LocationSample::new("b", 27.01, 92.01, Utc::now()),
            LocationSample::new("c", 26.1445, 91.7362, Utc::now()),
        ];

        let mut sequential = Vec::new();
        for sample in samples.clone() {
            sequential.push(pipeline.ingest(sample).await.unwrap().violations);
        }

        let [a, b, c] = samples;
        let (ra, rb, rc) = tokio::join!(pipeline.ingest(a), pipeline.ingest(b), pipeline.ingest(c));
        let concurrent = vec![
            ra.unwrap().violations,
            rb.unwrap().violations,
            rc.unwrap().violations,
        ];

        assert_eq!(sequential, concurrent);
        assert_eq!(concurrent[1][0].zone_type, ZoneType::Restricted);
    }
}
