//! Impaired delivery channel
//!
//! A one-directional in-process event bus that models an imperfect network:
//! every published message is delivered after a configurable latency and
//! survives a per-message Bernoulli reliability trial. Delivery is FIFO per
//! channel regardless of latency changes between publishes; a single task
//! drains the pending queue in publish order.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use rand::Rng;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::trace;

use crate::error::ConfigError;
use crate::events::SyncMessage;

/// Latency and reliability settings for one channel direction
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelConfig {
    /// Delivery delay applied to each message
    pub latency: Duration,
    /// Percentage of messages that survive delivery, in [0, 100]
    pub reliability: u8,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            latency: Duration::ZERO,
            reliability: 100,
        }
    }
}

impl ChannelConfig {
    /// Validated constructor; rejects reliability above 100
    pub fn new(latency: Duration, reliability: u8) -> Result<Self, ConfigError> {
        if reliability > 100 {
            return Err(ConfigError::ReliabilityOutOfRange(reliability as i64));
        }
        Ok(Self {
            latency,
            reliability,
        })
    }

    /// Instant, lossless delivery
    pub fn ideal() -> Self {
        Self::default()
    }

    /// A noticeably bad link: quarter-second delay, one in five messages lost
    pub fn degraded() -> Self {
        Self {
            latency: Duration::from_millis(250),
            reliability: 80,
        }
    }
}

type Handler = Box<dyn FnMut(&SyncMessage) + Send>;

/// A message waiting for its delivery deadline, with the tuning parameters
/// captured at publish time. Retuning the channel never touches these.
struct Pending {
    message: SyncMessage,
    deadline: Instant,
    reliability: u8,
}

struct Shared {
    subscribers: Mutex<Vec<(u64, Handler)>>,
    next_subscriber_id: AtomicU64,
    latency: Mutex<Duration>,
    reliability: AtomicU8,
}

/// One-directional lossy, delayed, order-preserving event bus
///
/// Exactly one logical publisher and any number of subscribers. Cloning the
/// handle shares the same underlying channel. Must be created inside a tokio
/// runtime; delivery runs on a spawned task.
#[derive(Clone)]
pub struct ImpairedChannel {
    shared: Arc<Shared>,
    queue: mpsc::UnboundedSender<Pending>,
}

impl ImpairedChannel {
    /// Create a channel with the given tuning and spawn its delivery task
    pub fn new(config: ChannelConfig) -> Self {
        let shared = Arc::new(Shared {
            subscribers: Mutex::new(Vec::new()),
            next_subscriber_id: AtomicU64::new(0),
            latency: Mutex::new(config.latency),
            reliability: AtomicU8::new(config.reliability.min(100)),
        });
        let (queue, rx) = mpsc::unbounded_channel();
        tokio::spawn(deliver(Arc::clone(&shared), rx));
        Self { shared, queue }
    }

    /// Enqueue a message for delayed, lossy delivery
    ///
    /// Never blocks and never fails; the sender gets no acknowledgement and
    /// must not assume delivery. Latency and reliability are captured now, so
    /// later retuning does not affect this message.
    pub fn publish(&self, message: SyncMessage) {
        let latency = *self.shared.latency.lock();
        let pending = Pending {
            message,
            deadline: Instant::now() + latency,
            reliability: self.shared.reliability.load(Ordering::Relaxed),
        };
        trace!(latency_ms = latency.as_millis() as u64, "publishing message");
        // Send only fails when the delivery task is gone, i.e. the runtime is
        // shutting down; at that point there is nobody left to deliver to.
        let _ = self.queue.send(pending);
    }

    /// Register a handler invoked once per delivered message
    ///
    /// The returned handle deregisters on `cancel()` or on drop; after that
    /// the handler is never invoked again. The handler runs on the delivery
    /// task and must not subscribe to or cancel on this same channel.
    pub fn subscribe(&self, handler: impl FnMut(&SyncMessage) + Send + 'static) -> Subscription {
        let id = self.shared.next_subscriber_id.fetch_add(1, Ordering::Relaxed);
        self.shared.subscribers.lock().push((id, Box::new(handler)));
        Subscription {
            id,
            shared: Arc::downgrade(&self.shared),
        }
    }

    /// Current delivery delay
    pub fn latency(&self) -> Duration {
        *self.shared.latency.lock()
    }

    /// Current delivery percentage
    pub fn reliability(&self) -> u8 {
        self.shared.reliability.load(Ordering::Relaxed)
    }

    /// Change the delivery delay for messages published from now on
    pub fn set_latency(&self, latency: Duration) {
        *self.shared.latency.lock() = latency;
    }

    /// Slider-facing latency setter; rejects negative or non-finite seconds
    pub fn set_latency_secs(&self, seconds: f64) -> Result<(), ConfigError> {
        if !seconds.is_finite() {
            return Err(ConfigError::NonFiniteLatency(seconds));
        }
        if seconds < 0.0 {
            return Err(ConfigError::NegativeLatency(seconds));
        }
        self.set_latency(Duration::from_secs_f64(seconds));
        Ok(())
    }

    /// Change the delivery percentage for messages published from now on
    ///
    /// Out-of-range input is rejected, not clamped.
    pub fn set_reliability(&self, percent: u8) -> Result<(), ConfigError> {
        if percent > 100 {
            return Err(ConfigError::ReliabilityOutOfRange(percent as i64));
        }
        self.shared.reliability.store(percent, Ordering::Relaxed);
        Ok(())
    }
}

/// Handle for releasing a channel subscription
///
/// Deregisters the handler on `cancel()` or on drop. Messages already in
/// flight are not retracted; with no remaining subscriber they are delivered
/// to nobody.
pub struct Subscription {
    id: u64,
    shared: Weak<Shared>,
}

impl Subscription {
    /// Stop all future handler invocations
    pub fn cancel(self) {
        // Drop does the work.
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.upgrade() {
            shared.subscribers.lock().retain(|(id, _)| *id != self.id);
        }
    }
}

/// One Bernoulli trial per delivered candidate; 100 never drops, 0 always does
fn survives(reliability: u8) -> bool {
    if reliability >= 100 {
        return true;
    }
    rand::thread_rng().gen_range(1..=100) <= reliability
}

/// Delivery loop: drains the pending queue in publish order, sleeping until
/// each message's deadline. A message whose deadline already passed (latency
/// was lowered after it was published) goes out immediately after its
/// predecessor; publish order always wins over wall-clock deadlines.
async fn deliver(shared: Arc<Shared>, mut rx: mpsc::UnboundedReceiver<Pending>) {
    while let Some(pending) = rx.recv().await {
        tokio::time::sleep_until(pending.deadline).await;
        if !survives(pending.reliability) {
            trace!("message dropped by reliability filter");
            continue;
        }
        let mut subscribers = shared.subscribers.lock();
        for (_, handler) in subscribers.iter_mut() {
            handler(&pending.message);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use parking_lot::Mutex;

    use super::*;
    use crate::events::{DeltaEvent, InstanceId, SyncMessage};
    use crate::geometry::{Extent, Position};

    fn message(x: f64) -> SyncMessage {
        SyncMessage::changed(
            DeltaEvent {
                delta: Position::new(x, 0.0),
                outer_extent: Extent::new(100.0, 100.0),
            },
            InstanceId::named("test"),
        )
    }

    fn delta_x(message: &SyncMessage) -> f64 {
        match message.event {
            crate::events::DragEvent::Changed(e) => e.delta.x,
            crate::events::DragEvent::Ended(e) => e.delta.x,
        }
    }

    /// Let the paused clock run far enough for every pending delivery
    async fn drain() {
        tokio::time::sleep(Duration::from_secs(10)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_delivers_in_publish_order_under_varying_latency() {
        let channel = ImpairedChannel::new(ChannelConfig::ideal());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _sub = channel.subscribe(move |m| sink.lock().push(delta_x(m)));

        channel.set_latency(Duration::from_millis(500));
        channel.publish(message(1.0));
        channel.set_latency(Duration::from_millis(100));
        channel.publish(message(2.0));
        channel.set_latency(Duration::ZERO);
        channel.publish(message(3.0));

        drain().await;
        assert_eq!(*seen.lock(), vec![1.0, 2.0, 3.0]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_latency_delays_delivery() {
        let channel = ImpairedChannel::new(ChannelConfig {
            latency: Duration::from_millis(200),
            reliability: 100,
        });
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _sub = channel.subscribe(move |m| sink.lock().push(delta_x(m)));

        channel.publish(message(1.0));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(seen.lock().is_empty());
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(*seen.lock(), vec![1.0]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retune_leaves_scheduled_messages_alone() {
        let channel = ImpairedChannel::new(ChannelConfig {
            latency: Duration::from_millis(300),
            reliability: 100,
        });
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _sub = channel.subscribe(move |m| sink.lock().push(delta_x(m)));

        channel.publish(message(1.0));
        // Retuning after publish must not reschedule the in-flight message.
        channel.set_latency(Duration::ZERO);
        channel.set_reliability(0).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(seen.lock().is_empty());
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(*seen.lock(), vec![1.0]);

        // The new reliability applies to the next publish.
        channel.publish(message(2.0));
        drain().await;
        assert_eq!(*seen.lock(), vec![1.0]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_subscription_stops_deliveries() {
        let channel = ImpairedChannel::new(ChannelConfig::ideal());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let sub = channel.subscribe(move |m| sink.lock().push(delta_x(m)));

        channel.publish(message(1.0));
        drain().await;
        sub.cancel();
        channel.publish(message(2.0));
        drain().await;
        assert_eq!(*seen.lock(), vec![1.0]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_reliability_drops_everything() {
        let channel = ImpairedChannel::new(ChannelConfig {
            latency: Duration::ZERO,
            reliability: 0,
        });
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _sub = channel.subscribe(move |m| sink.lock().push(delta_x(m)));

        for i in 0..50 {
            channel.publish(message(i as f64));
        }
        drain().await;
        assert!(seen.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reliability_statistics() {
        let channel = ImpairedChannel::new(ChannelConfig {
            latency: Duration::ZERO,
            reliability: 90,
        });
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _sub = channel.subscribe(move |m| sink.lock().push(delta_x(m)));

        for i in 0..1000 {
            channel.publish(message(i as f64));
        }
        drain().await;

        // Binomial(1000, 0.9): +/-5 points is well beyond five standard
        // deviations, so this is stable despite being probabilistic.
        let delivered = seen.lock().len();
        assert!(
            (850..=950).contains(&delivered),
            "delivered {delivered} of 1000 at reliability 90"
        );
    }

    #[tokio::test]
    async fn test_tuning_validation() {
        let channel = ImpairedChannel::new(ChannelConfig::ideal());
        assert_eq!(
            channel.set_reliability(101),
            Err(ConfigError::ReliabilityOutOfRange(101))
        );
        assert_eq!(
            channel.set_latency_secs(-0.5),
            Err(ConfigError::NegativeLatency(-0.5))
        );
        assert!(matches!(
            channel.set_latency_secs(f64::NAN),
            Err(ConfigError::NonFiniteLatency(_))
        ));
        // Rejected input leaves the previous tuning in place.
        assert_eq!(channel.reliability(), 100);
        assert_eq!(channel.latency(), Duration::ZERO);

        channel.set_latency_secs(0.25).unwrap();
        assert_eq!(channel.latency(), Duration::from_millis(250));
        channel.set_reliability(0).unwrap();
        assert_eq!(channel.reliability(), 0);

        assert!(ChannelConfig::new(Duration::ZERO, 130).is_err());
    }
}
