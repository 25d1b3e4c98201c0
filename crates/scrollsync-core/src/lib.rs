//! scrollsync core - mirrored scroll surfaces over a simulated lossy link
//!
//! This crate provides the event-synchronization and offset-computation core:
//! - Gesture samples and per-axis scroll deltas
//! - An impaired channel: delayed, lossy, order-preserving in-process delivery
//! - A per-surface scroll controller with axis gating and bounds clamping
//! - Topologies wiring controllers into mirrored pairs or a shared bus
//!
//! The presentation layer feeds raw pointer samples in and reads the computed
//! offset out; rendering, layout, and tuning UI live outside this crate.
//! Local drag feedback is always instant; only replication to peers goes
//! through the impaired link.

pub mod channel;
pub mod controller;
pub mod error;
pub mod events;
pub mod geometry;
pub mod topology;

// Re-exports for convenience
pub use channel::{ChannelConfig, ImpairedChannel, Subscription};
pub use controller::{ControllerState, ScrollController};
pub use error::ConfigError;
pub use events::{DeltaEvent, DragEvent, DragSample, EndEvent, InstanceId, SyncMessage};
pub use geometry::{Axis, AxisSet, Extent, Position};
pub use topology::{shared, LinkDirection, MirrorPair, SharedBus, SharedController};
