//! Room Controller (RC) Service Library
//!
//! Core functionality for the Room Controller - a stateful WebSocket
//! signaling server for synchronized group video playback:
//!
//! - Per-room membership with single-host authority and host recovery
//! - Buffering consensus gate with bounded auto-recovery
//! - Drift-corrected playback synchronization protocol
//! - Host-mutable ordered playlist
//! - Per-connection rate limiting and liveness sweeping
//! - Opaque voice signaling relay
//!
//! # Architecture
//!
//! A singleton `CoordinatorActor` fronts all client traffic and supervises
//! one `RoomActor` per active room; see [`actors`] for the full hierarchy.
//! Playback positions are persisted fire-and-forget through the
//! [`persist::SnapshotStore`] boundary.
//!
//! # Modules
//!
//! - [`actors`] - Actor model implementation
//! - [`config`] - Service configuration from environment
//! - [`errors`] - Error types
//! - [`persist`] - Playback snapshot persistence boundary
//! - [`ratelimit`] - Per-connection fixed-window rate limiter
//! - [`server`] - axum WebSocket transport
//! - [`state`] - Pure per-room state
//! - [`sync`] - Receiver-side drift policy helpers
//! - [`validate`] - Inbound payload validation

pub mod actors;
pub mod config;
pub mod errors;
pub mod persist;
pub mod ratelimit;
pub mod server;
pub mod state;
pub mod sync;
pub mod validate;
