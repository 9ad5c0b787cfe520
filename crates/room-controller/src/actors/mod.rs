//! Actor model implementation.
//!
//! ```text
//! CoordinatorActor (singleton)
//! ├── connection registry (outbound sender + last-seen per connection)
//! ├── per-connection rate limiter
//! ├── supervises N RoomActors
//! │   └── RoomActor (one per active room)
//! │       ├── owns RoomState (host, members, buffer flags, playlist)
//! │       └── owns the buffering auto-recovery deadline
//! └── direct relays (voice signaling, sync-response)
//! ```
//!
//! All mutation flows through mailboxes; handles are cheap clones holding an
//! `mpsc::Sender` and a `CancellationToken`.

pub mod coordinator;
pub mod messages;
pub mod room;

pub use coordinator::{CoordinatorActor, CoordinatorActorHandle, CoordinatorSettings};
pub use messages::{ClientCommand, CoordinatorStatus, OutboundSender, RoomSnapshot, ServerEvent};
pub use room::{RoomActor, RoomActorHandle};
