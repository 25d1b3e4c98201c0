//! Mirror topologies - wiring controllers through impaired channels
//!
//! Two shapes: a strictly unidirectional pairwise link (two channels, no
//! origin tags consulted) and a shared bus (one channel, everyone subscribed,
//! origin tags suppress self-echo). Prefer the pairwise link for two
//! surfaces; it rules out echo loops structurally.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::channel::{ChannelConfig, ImpairedChannel, Subscription};
use crate::controller::ScrollController;
use crate::error::ConfigError;

/// A controller shared between the caller and channel delivery handlers
///
/// Delivery callbacks run back-to-back on the single-threaded timeline, so
/// the lock never contends; it exists to satisfy `Send` on the handlers.
pub type SharedController = Arc<Mutex<ScrollController>>;

/// Wrap a controller for topology wiring
pub fn shared(controller: ScrollController) -> SharedController {
    Arc::new(Mutex::new(controller))
}

/// One direction of a pairwise link, or both at once
///
/// A symmetric control tuning both directions must update both channels;
/// `Both` does exactly that, one channel at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkDirection {
    AToB,
    BToA,
    Both,
}

/// Two controllers cross-connected through two unidirectional channels
///
/// A's outbound channel is B's inbound and vice versa. Each channel has a
/// single producer, so no origin tagging is needed. Dropping the pair
/// releases both subscriptions; the controllers outlive it.
pub struct MirrorPair {
    a_to_b: ImpairedChannel,
    b_to_a: ImpairedChannel,
    _subscriptions: [Subscription; 2],
}

impl MirrorPair {
    /// Wire `a` and `b` together, both directions starting from `config`
    pub fn wire(a: &SharedController, b: &SharedController, config: ChannelConfig) -> Self {
        let a_to_b = ImpairedChannel::new(config);
        let b_to_a = ImpairedChannel::new(config);

        a.lock().attach_outbound(a_to_b.clone());
        b.lock().attach_outbound(b_to_a.clone());

        let receiver_b = Arc::clone(b);
        let sub_b = a_to_b.subscribe(move |message| receiver_b.lock().on_remote_message(message));
        let receiver_a = Arc::clone(a);
        let sub_a = b_to_a.subscribe(move |message| receiver_a.lock().on_remote_message(message));

        Self {
            a_to_b,
            b_to_a,
            _subscriptions: [sub_b, sub_a],
        }
    }

    pub fn a_to_b(&self) -> &ImpairedChannel {
        &self.a_to_b
    }

    pub fn b_to_a(&self) -> &ImpairedChannel {
        &self.b_to_a
    }

    /// Retune delivery delay; applies only to the chosen direction(s) and
    /// only to messages published after the call
    pub fn set_latency(&self, direction: LinkDirection, latency: Duration) {
        match direction {
            LinkDirection::AToB => self.a_to_b.set_latency(latency),
            LinkDirection::BToA => self.b_to_a.set_latency(latency),
            LinkDirection::Both => {
                self.a_to_b.set_latency(latency);
                self.b_to_a.set_latency(latency);
            }
        }
    }

    /// Slider-facing latency retune; rejects negative or non-finite seconds
    /// before touching either direction
    pub fn set_latency_secs(&self, direction: LinkDirection, seconds: f64) -> Result<(), ConfigError> {
        if !seconds.is_finite() {
            return Err(ConfigError::NonFiniteLatency(seconds));
        }
        if seconds < 0.0 {
            return Err(ConfigError::NegativeLatency(seconds));
        }
        self.set_latency(direction, Duration::from_secs_f64(seconds));
        Ok(())
    }

    /// Retune delivery percentage; validates before touching either direction
    pub fn set_reliability(&self, direction: LinkDirection, percent: u8) -> Result<(), ConfigError> {
        if percent > 100 {
            return Err(ConfigError::ReliabilityOutOfRange(percent as i64));
        }
        match direction {
            LinkDirection::AToB => self.a_to_b.set_reliability(percent)?,
            LinkDirection::BToA => self.b_to_a.set_reliability(percent)?,
            LinkDirection::Both => {
                self.a_to_b.set_reliability(percent)?;
                self.b_to_a.set_reliability(percent)?;
            }
        }
        Ok(())
    }
}

/// N controllers on one bidirectional bus
///
/// Every attached controller publishes onto the same channel and subscribes
/// to it; outgoing messages carry the sender's instance id and each receiver
/// discards its own echoes.
pub struct SharedBus {
    channel: ImpairedChannel,
    subscriptions: Vec<Subscription>,
}

impl SharedBus {
    pub fn new(config: ChannelConfig) -> Self {
        Self {
            channel: ImpairedChannel::new(config),
            subscriptions: Vec::new(),
        }
    }

    /// Put a controller on the bus: it both publishes and receives
    pub fn attach(&mut self, controller: &SharedController) {
        controller.lock().attach_outbound(self.channel.clone());
        let receiver = Arc::clone(controller);
        let subscription = self
            .channel
            .subscribe(move |message| receiver.lock().on_remote_message(message));
        self.subscriptions.push(subscription);
    }

    /// The bus itself, for retuning
    pub fn channel(&self) -> &ImpairedChannel {
        &self.channel
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::events::{DragSample, InstanceId};
    use crate::geometry::{AxisSet, Extent, Position};

    fn vertical_surface(name: &str) -> SharedController {
        let mut controller =
            ScrollController::new(InstanceId::named(name), AxisSet::vertical());
        controller.set_content_extent(Extent::new(400.0, 1200.0));
        controller.set_viewport_extent(Extent::new(400.0, 500.0));
        shared(controller)
    }

    fn drag(dy: f64) -> DragSample {
        DragSample::new(Position::ZERO, Position::new(0.0, dy))
    }

    async fn drain() {
        tokio::time::sleep(Duration::from_secs(10)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_pairwise_directions_are_independent() {
        let a = vertical_surface("a");
        let b = vertical_surface("b");
        let pair = MirrorPair::wire(&a, &b, ChannelConfig::ideal());

        // Degrade only B -> A; A -> B stays pristine.
        pair.set_reliability(LinkDirection::BToA, 0).unwrap();
        pair.set_latency(LinkDirection::BToA, Duration::from_secs(1));

        let viewport = Extent::new(400.0, 500.0);
        a.lock().on_drag_ended(&drag(-50.0), viewport);
        b.lock().on_drag_ended(&drag(-30.0), viewport);
        drain().await;

        assert_eq!(b.lock().settled_offset().y, -80.0, "A's -50 reached B");
        assert_eq!(a.lock().settled_offset().y, -50.0, "B's -30 was dropped");
    }

    #[tokio::test(start_paused = true)]
    async fn test_both_direction_retunes_both_channels() {
        let a = vertical_surface("a");
        let b = vertical_surface("b");
        let pair = MirrorPair::wire(&a, &b, ChannelConfig::ideal());

        pair.set_latency(LinkDirection::Both, Duration::from_millis(300));
        pair.set_reliability(LinkDirection::Both, 75).unwrap();

        assert_eq!(pair.a_to_b().latency(), Duration::from_millis(300));
        assert_eq!(pair.b_to_a().latency(), Duration::from_millis(300));
        assert_eq!(pair.a_to_b().reliability(), 75);
        assert_eq!(pair.b_to_a().reliability(), 75);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shared_bus_applies_to_peers_not_sender() {
        let a = vertical_surface("a");
        let b = vertical_surface("b");
        let c = vertical_surface("c");
        let mut bus = SharedBus::new(ChannelConfig::ideal());
        bus.attach(&a);
        bus.attach(&b);
        bus.attach(&c);

        let viewport = Extent::new(400.0, 500.0);
        a.lock().on_drag_ended(&drag(-40.0), viewport);
        drain().await;

        assert_eq!(a.lock().settled_offset().y, -40.0, "local apply, no echo");
        assert_eq!(b.lock().settled_offset().y, -40.0);
        assert_eq!(c.lock().settled_offset().y, -40.0);
    }
}
