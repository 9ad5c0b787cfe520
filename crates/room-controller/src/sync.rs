//! Receiver-side drift policy for the playback synchronization protocol.
//!
//! The host is the single authoritative clock. Guests receive host positions
//! through three channels with progressively tighter tolerances:
//!
//! - periodic `sync-check` heartbeats (loosest, corrections are routine)
//! - directed `sync-response` replies after a join
//! - direct `play`/`pause`/`seek` commands (tightest, the host just acted)
//!
//! These helpers are pure; the server uses them in tests and ships them for
//! protocol clients built on this crate.

/// Drift tolerance for periodic `sync-check` heartbeats, in seconds.
pub const HEARTBEAT_DRIFT_TOLERANCE: f64 = 1.5;

/// Drift tolerance for directed `sync-response` replies, in seconds.
pub const SYNC_RESPONSE_DRIFT_TOLERANCE: f64 = 1.0;

/// Drift tolerance for direct host commands, in seconds.
pub const COMMAND_DRIFT_TOLERANCE: f64 = 0.5;

/// Delay-compensated target position for a host report.
///
/// `sent_at_ms` is the server wall-clock stamp attached to the event and
/// `now_ms` the receiver's current wall clock. Transit delay is added to the
/// reported position so that a paused comparison is still apples-to-apples.
#[must_use]
pub fn compensated_target(reported_time: f64, sent_at_ms: i64, now_ms: i64) -> f64 {
    let transit_secs = (now_ms.saturating_sub(sent_at_ms)).max(0) as f64 / 1000.0;
    reported_time + transit_secs
}

/// Absolute drift between a local position and a target position.
#[must_use]
pub fn drift(local_time: f64, target_time: f64) -> f64 {
    (local_time - target_time).abs()
}

/// Whether the local position has drifted beyond the given tolerance and the
/// receiver should snap to the target.
#[must_use]
pub fn should_resync(local_time: f64, target_time: f64, tolerance: f64) -> bool {
    drift(local_time, target_time) > tolerance
}
