//! Scripted scenarios driving the sync core end-to-end
//!
//! Each scenario wires real controllers and channels on the current-thread
//! runtime, replays a canned gesture, waits out the configured latency, and
//! returns a serializable report.

use std::time::Duration;

use serde::Serialize;
use tracing::info;

use scrollsync_core::{
    shared, AxisSet, ChannelConfig, DeltaEvent, DragSample, Extent, ImpairedChannel, InstanceId,
    LinkDirection, MirrorPair, Position, ScrollController, SharedController, SyncMessage,
};

const VIEWPORT: Extent = Extent {
    width: 400.0,
    height: 500.0,
};
const CONTENT: Extent = Extent {
    width: 400.0,
    height: 1200.0,
};

/// One surface's offsets after a scenario ran
#[derive(Debug, Serialize)]
pub struct SurfaceReport {
    pub instance: String,
    pub settled_x: f64,
    pub settled_y: f64,
    pub render_x: f64,
    pub render_y: f64,
}

impl SurfaceReport {
    fn capture(controller: &SharedController) -> Self {
        let guard = controller.lock();
        let settled = guard.settled_offset();
        let render = guard.render_offset();
        Self {
            instance: guard.instance().to_string(),
            settled_x: settled.x,
            settled_y: settled.y,
            render_x: render.x,
            render_y: render.y,
        }
    }
}

/// Outcome of the `mirror` and `retune` scenarios
#[derive(Debug, Serialize)]
pub struct MirrorReport {
    pub latency_secs: f64,
    pub reliability: u8,
    pub surfaces: Vec<SurfaceReport>,
}

/// Outcome of the `stats` scenario
#[derive(Debug, Serialize)]
pub struct StatsReport {
    pub reliability: u8,
    pub published: usize,
    pub delivered: usize,
    pub delivered_fraction: f64,
}

fn vertical_surface(name: &str) -> SharedController {
    let mut controller = ScrollController::new(InstanceId::named(name), AxisSet::vertical());
    controller.set_content_extent(CONTENT);
    controller.set_viewport_extent(VIEWPORT);
    shared(controller)
}

fn drag_to(dy: f64) -> DragSample {
    DragSample::new(Position::ZERO, Position::new(0.0, dy))
}

/// Wait out the configured latency plus a margin so deliveries land
async fn settle(config: ChannelConfig) {
    tokio::time::sleep(config.latency + Duration::from_millis(50)).await;
}

/// Replay one downward drag on surface A and report both surfaces
pub async fn mirror(config: ChannelConfig, ticks: u32, step: f64) -> MirrorReport {
    let a = vertical_surface("left");
    let b = vertical_surface("right");
    let _pair = MirrorPair::wire(&a, &b, config);

    info!(ticks, step, "replaying drag gesture on surface 'left'");
    let mut dy = 0.0;
    for _ in 0..ticks {
        dy += step;
        a.lock().on_drag_changed(&drag_to(dy), VIEWPORT);
    }
    a.lock().on_drag_ended(&drag_to(dy), VIEWPORT);
    settle(config).await;

    MirrorReport {
        latency_secs: config.latency.as_secs_f64(),
        reliability: config.reliability,
        surfaces: vec![SurfaceReport::capture(&a), SurfaceReport::capture(&b)],
    }
}

/// Run one gesture under the given tuning, then retune the link to perfect
/// and run a second gesture; already-scheduled messages keep the old tuning
pub async fn retune(config: ChannelConfig) -> MirrorReport {
    let a = vertical_surface("left");
    let b = vertical_surface("right");
    let pair = MirrorPair::wire(&a, &b, config);

    a.lock().on_drag_ended(&drag_to(-200.0), VIEWPORT);

    info!("retuning link to ideal between gestures");
    pair.set_latency(LinkDirection::Both, Duration::ZERO);
    pair.set_reliability(LinkDirection::Both, 100)
        .expect("100 is in range");

    a.lock().on_drag_ended(&drag_to(-100.0), VIEWPORT);
    settle(config).await;

    MirrorReport {
        latency_secs: config.latency.as_secs_f64(),
        reliability: config.reliability,
        surfaces: vec![SurfaceReport::capture(&a), SurfaceReport::capture(&b)],
    }
}

/// Publish `count` messages through one channel and measure the delivered
/// fraction against the configured reliability
pub async fn stats(config: ChannelConfig, count: usize) -> StatsReport {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    let channel = ImpairedChannel::new(ChannelConfig {
        latency: Duration::ZERO,
        reliability: config.reliability,
    });
    let delivered = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&delivered);
    let _subscription = channel.subscribe(move |_message: &SyncMessage| {
        counter.fetch_add(1, Ordering::Relaxed);
    });

    info!(count, reliability = config.reliability, "measuring delivery rate");
    for i in 0..count {
        channel.publish(SyncMessage::changed(
            DeltaEvent {
                delta: Position::new(0.0, -(i as f64)),
                outer_extent: VIEWPORT,
            },
            InstanceId::named("stats"),
        ));
    }
    settle(ChannelConfig::ideal()).await;

    let delivered = delivered.load(Ordering::Relaxed);
    StatsReport {
        reliability: config.reliability,
        published: count,
        delivered,
        delivered_fraction: delivered as f64 / count as f64,
    }
}
