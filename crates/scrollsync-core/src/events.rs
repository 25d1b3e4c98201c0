//! Gesture samples and the messages exchanged between mirrored surfaces

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geometry::{Extent, Position};

/// One pointer sample of an in-progress drag gesture
///
/// Immutable; the presentation layer creates one per pointer-move tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DragSample {
    pub start_position: Position,
    pub current_position: Position,
}

impl DragSample {
    pub fn new(start_position: Position, current_position: Position) -> Self {
        Self {
            start_position,
            current_position,
        }
    }

    /// Displacement since the gesture started
    pub fn delta(&self) -> Position {
        self.current_position - self.start_position
    }
}

/// An in-progress gesture update: the (axis-filtered) delta plus the sender's
/// viewport size at the moment of sending
///
/// The receiver gates against this recorded viewport, not its own layout,
/// so per-axis gating is independent of the receiver's layout timing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeltaEvent {
    pub delta: Position,
    pub outer_extent: Extent,
}

/// The terminal sample of a gesture, after which the in-flight delta is
/// committed into the settled offset
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EndEvent {
    pub delta: Position,
    pub outer_extent: Extent,
}

/// The two phases a surface replicates to its peers
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum DragEvent {
    Changed(DeltaEvent),
    Ended(EndEvent),
}

/// Identifier of the controller instance that originated a message
///
/// Used to suppress self-echo on a shared-bus topology. Pairwise links are
/// strictly unidirectional and never consult it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstanceId(String);

impl InstanceId {
    /// Wrap a caller-chosen name
    pub fn named(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Generate a fresh random id
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A gesture event in transit between surfaces
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncMessage {
    pub event: DragEvent,
    /// Originating controller, for echo suppression on shared buses
    pub origin: Option<InstanceId>,
}

impl SyncMessage {
    pub fn changed(event: DeltaEvent, origin: InstanceId) -> Self {
        Self {
            event: DragEvent::Changed(event),
            origin: Some(origin),
        }
    }

    pub fn ended(event: EndEvent, origin: InstanceId) -> Self {
        Self {
            event: DragEvent::Ended(event),
            origin: Some(origin),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drag_sample_delta() {
        let sample = DragSample::new(Position::new(10.0, 20.0), Position::new(4.0, 50.0));
        assert_eq!(sample.delta(), Position::new(-6.0, 30.0));
    }

    #[test]
    fn test_instance_ids_distinct() {
        assert_ne!(InstanceId::generate(), InstanceId::generate());
        assert_eq!(InstanceId::named("left"), InstanceId::named("left"));
    }
}
