//! Scroll controller - per-surface offset state machine
//!
//! Owns one surface's settled and in-flight scroll offsets and computes the
//! single source-of-truth offset for rendering, whether the driving event was
//! a local gesture or a remote delivery. Two logical states: Idle (transient
//! offset is zero) and Dragging (a gesture is in progress). `Changed` events
//! update the transient offset only; `Ended` events clamp-and-commit into the
//! settled offset and return to Idle.
//!
//! Local feedback is always instant; only the replication to peers goes
//! through the impaired channel.

use tracing::{debug, trace};

use crate::channel::ImpairedChannel;
use crate::events::{DeltaEvent, DragEvent, DragSample, EndEvent, InstanceId, SyncMessage};
use crate::geometry::{Axis, AxisSet, Extent, Position};

/// Snapshot of a controller's scroll state
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControllerState {
    /// Committed offset; only ever changed by `Ended` events
    pub settled_offset: Position,
    /// In-flight gesture offset; nonzero only between `Changed` and `Ended`
    pub transient_offset: Position,
    /// Measured size of the scrollable content ("inner")
    pub content_extent: Extent,
    /// Measured size of the viewport ("outer")
    pub viewport_extent: Extent,
    /// Axes this surface reacts to
    pub enabled_axes: AxisSet,
}

/// Per-surface scroll state machine
///
/// Created once per surface and mutated on every gesture tick (local) and
/// every received message (remote), always from the single event loop.
pub struct ScrollController {
    instance: InstanceId,
    enabled_axes: AxisSet,
    settled_offset: Position,
    transient_offset: Position,
    content_extent: Extent,
    viewport_extent: Extent,
    outbound: Option<ImpairedChannel>,
}

impl ScrollController {
    pub fn new(instance: InstanceId, enabled_axes: AxisSet) -> Self {
        Self {
            instance,
            enabled_axes,
            settled_offset: Position::ZERO,
            transient_offset: Position::ZERO,
            content_extent: Extent::ZERO,
            viewport_extent: Extent::ZERO,
            outbound: None,
        }
    }

    pub fn instance(&self) -> &InstanceId {
        &self.instance
    }

    /// Channel this controller replicates its local gestures onto
    pub fn attach_outbound(&mut self, channel: ImpairedChannel) {
        self.outbound = Some(channel);
    }

    /// Observed content ("inner") size; supplied by the presentation layer
    /// whenever layout changes
    pub fn set_content_extent(&mut self, extent: Extent) {
        self.content_extent = extent;
    }

    /// Observed viewport ("outer") size
    pub fn set_viewport_extent(&mut self, extent: Extent) {
        self.viewport_extent = extent;
    }

    pub fn settled_offset(&self) -> Position {
        self.settled_offset
    }

    pub fn transient_offset(&self) -> Position {
        self.transient_offset
    }

    pub fn state(&self) -> ControllerState {
        ControllerState {
            settled_offset: self.settled_offset,
            transient_offset: self.transient_offset,
            content_extent: self.content_extent,
            viewport_extent: self.viewport_extent,
            enabled_axes: self.enabled_axes,
        }
    }

    /// Local gesture update: apply instantly, then replicate the gated delta
    ///
    /// Display-only; never touches the settled offset. Peers are sent the
    /// axis-filtered delta, never the raw one, so they only see movement on
    /// axes this sender actually allows.
    pub fn on_drag_changed(&mut self, sample: &DragSample, outer_extent: Extent) {
        let gated = self.gated_delta(sample.delta(), outer_extent);
        self.apply_changed(gated);
        if let Some(channel) = &self.outbound {
            channel.publish(SyncMessage::changed(
                DeltaEvent {
                    delta: gated,
                    outer_extent,
                },
                self.instance.clone(),
            ));
        }
    }

    /// Local gesture end: commit instantly, then replicate the gated delta
    /// with the viewport extent in effect at gesture end
    pub fn on_drag_ended(&mut self, sample: &DragSample, outer_extent: Extent) {
        let gated = self.gated_delta(sample.delta(), outer_extent);
        self.apply_ended(gated, outer_extent);
        if let Some(channel) = &self.outbound {
            channel.publish(SyncMessage::ended(
                EndEvent {
                    delta: gated,
                    outer_extent,
                },
                self.instance.clone(),
            ));
        }
    }

    /// Remote gesture update: identical math, never republished
    pub fn on_remote_changed(&mut self, event: &DeltaEvent) {
        let gated = self.gated_delta(event.delta, event.outer_extent);
        self.apply_changed(gated);
    }

    /// Remote gesture end: identical math, never republished
    pub fn on_remote_ended(&mut self, event: &EndEvent) {
        let gated = self.gated_delta(event.delta, event.outer_extent);
        self.apply_ended(gated, event.outer_extent);
    }

    /// Apply a delivered message, discarding this controller's own echoes
    ///
    /// Shared-bus topologies deliver every message to every subscriber,
    /// including the sender; the origin tag identifies and drops those.
    pub fn on_remote_message(&mut self, message: &SyncMessage) {
        if message.origin.as_ref() == Some(&self.instance) {
            trace!(instance = %self.instance, "discarding self-echo");
            return;
        }
        match &message.event {
            DragEvent::Changed(event) => self.on_remote_changed(event),
            DragEvent::Ended(event) => self.on_remote_ended(event),
        }
    }

    /// The offset the presentation layer should draw at
    ///
    /// Per axis: settled plus transient on enabled axes, then a centering
    /// correction so content smaller than the viewport sits centered rather
    /// than pinned to an edge. Pure read, safe at any render frequency.
    pub fn render_offset(&self) -> Position {
        let mut total = Position::ZERO;
        for axis in Axis::BOTH {
            if self.enabled_axes.contains(axis) {
                *total.axis_mut(axis) =
                    self.settled_offset.axis(axis) + self.transient_offset.axis(axis);
            }
            *total.axis_mut(axis) -=
                (self.viewport_extent.axis(axis) - self.content_extent.axis(axis)) / 2.0;
        }
        total
    }

    /// Axis filter applied to every event, local or remote: a component
    /// participates only if its axis is enabled and the content recorded by
    /// the sender overflows the viewport recorded in the event.
    fn gated_delta(&self, delta: Position, outer_extent: Extent) -> Position {
        let mut gated = Position::ZERO;
        for axis in Axis::BOTH {
            if self.enabled_axes.contains(axis)
                && self.content_extent.axis(axis) > outer_extent.axis(axis)
            {
                *gated.axis_mut(axis) = delta.axis(axis);
            }
        }
        gated
    }

    fn apply_changed(&mut self, gated: Position) {
        self.transient_offset = gated;
        trace!(
            instance = %self.instance,
            x = gated.x,
            y = gated.y,
            "transient offset updated"
        );
    }

    fn apply_ended(&mut self, gated: Position, outer_extent: Extent) {
        for axis in Axis::BOTH {
            if self.enabled_axes.contains(axis) {
                let committed = self.commit_axis(axis, gated.axis(axis), outer_extent);
                *self.settled_offset.axis_mut(axis) = committed;
            }
        }
        // The gesture is over on every axis, whichever axis moved.
        self.transient_offset = Position::ZERO;
        debug!(
            instance = %self.instance,
            x = self.settled_offset.x,
            y = self.settled_offset.y,
            "gesture committed"
        );
    }

    /// Clamp-and-commit one axis against the extents in effect at gesture end
    ///
    /// An axis where the viewport covers the content cannot scroll at all and
    /// is forced to zero outright.
    fn commit_axis(&self, axis: Axis, gated_delta: f64, outer_extent: Extent) -> f64 {
        let content = self.content_extent.axis(axis);
        let outer = outer_extent.axis(axis);
        if outer >= content {
            return 0.0;
        }
        let lower = -(content - outer);
        let committed = (self.settled_offset.axis(axis) + gated_delta).clamp(lower, 0.0);
        // Out-of-bounds settled state is a programming defect; the clamp above
        // already bounds the result, so only the inputs can be bad.
        debug_assert!(
            (lower..=0.0).contains(&committed),
            "settled offset {committed} outside [{lower}, 0] on {axis:?}"
        );
        committed
    }
}
