//! Waypost - geofence violation detection and alerting for tracked tourists.
//!
//! # Overview
//!
//! Waypost takes location samples from tourists' devices, tests them against
//! a catalog of circular geofence zones, and raises alerts and notifications
//! when a tourist enters a high-risk or restricted zone.
//!
//! The core is pure: [`geo`], [`geofence`] and [`emitter`] take plain values
//! and return plain values. Everything that touches the outside world sits
//! behind the ports in [`catalog`], [`pipeline`] and [`notify`], with SQLite
//! ([`storage`]) and HTTP ([`api`]) as the adapters.
//!
//! # Modules
//!
//! - [`model`]: Samples, zones, violations, alert and notification records
//! - [`geo`]: Haversine distance
//! - [`geofence`]: Zone membership evaluation
//! - [`emitter`]: Severity policy and alert/notification construction
//! - [`catalog`]: Zone catalog port and read-through cache
//! - [`pipeline`]: Ingestion entry point with injected collaborators
//! - [`storage`]: SQLite storage layer
//! - [`notify`]: Webhook notification delivery
//! - [`api`]: HTTP API handlers
//! - [`config`]: Environment configuration
//! - [`error`]: Error types

pub mod api;
pub mod catalog;
pub mod config;
pub mod emitter;
pub mod error;
pub mod geo;
pub mod geofence;
pub mod model;
pub mod notify;
pub mod pipeline;
pub mod storage;
