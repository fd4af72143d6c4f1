use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use timelapse_common::config::CollectorConfig;
use timelapse_common::frame::Screenshot;

use crate::errors::CollectorError;
use crate::filter::{FrameFilter, NearDuplicateFilter};
use crate::source::{CaptureSource, NavigationSource};

/// Where a capture attempt came from. Timer and navigation triggers are
/// dropped while another capture is in flight; manual submissions queue.
#[derive(Debug, Clone, Copy)]
enum Trigger {
    Timer,
    Navigation,
    Manual,
}

struct State {
    /// Accepted screenshots, insertion order = capture order, bounded by
    /// `max_screenshots` (FIFO eviction past that).
    retained: VecDeque<Screenshot>,
    filter: Box<dyn FrameFilter>,
    next_seq: u64,
}

struct Shared {
    config: CollectorConfig,
    source: Arc<dyn CaptureSource>,
    state: Mutex<State>,
    /// Single-flight gate: at most one capture algorithm run at a time.
    capture_gate: AsyncMutex<()>,
    stopped: AtomicBool,
}

impl Shared {
    /// Run one capture attempt unless another is already in flight.
    async fn capture_once(&self, trigger: Trigger) {
        let Ok(_in_flight) = self.capture_gate.try_lock() else {
            debug!(?trigger, "capture already in flight, dropping trigger");
            return;
        };

        match self.source.capture().await {
            Ok(bytes) => self.submit(bytes, trigger),
            Err(e) => {
                warn!(
                    error = %e,
                    ?trigger,
                    source = self.source.name(),
                    "frame capture failed, skipping"
                );
            }
        }
    }

    /// Filter decision plus retention. Callers must hold the capture gate.
    fn submit(&self, bytes: Vec<u8>, trigger: Trigger) {
        let mut state = self.state.lock().unwrap();

        if !state.filter.should_store(&bytes) {
            debug!(?trigger, "near-duplicate frame discarded");
            return;
        }

        let seq = state.next_seq;
        state.next_seq += 1;
        state
            .retained
            .push_back(Screenshot::new(bytes, Utc::now().timestamp_millis(), seq));
        if state.retained.len() > self.config.max_screenshots {
            if let Some(evicted) = state.retained.pop_front() {
                debug!(seq = evicted.seq, "evicted oldest screenshot");
            }
        }
        debug!(?trigger, seq, retained = state.retained.len(), "screenshot retained");
    }
}

/// Samples a capture source at a fixed interval and/or on navigation
/// events, suppresses near-duplicate frames, and retains a bounded FIFO
/// sequence of accepted screenshots — a time-lapse of the session.
pub struct ScreenshotCollector {
    shared: Arc<Shared>,
    navigation: Option<Arc<dyn NavigationSource>>,
    running: AtomicBool,
    shutdown_tx: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ScreenshotCollector {
    /// Fails fast on a non-functional configuration (zero interval or zero
    /// capacity); steady-state capture failures are never surfaced here.
    pub fn new(
        config: CollectorConfig,
        source: Arc<dyn CaptureSource>,
    ) -> Result<Self, CollectorError> {
        config
            .validate()
            .map_err(CollectorError::InvalidConfiguration)?;

        let filter = Box::new(NearDuplicateFilter::new(
            config.mse_threshold,
            config.ssim_threshold,
        ));
        debug!(
            filter = filter.name(),
            mse_threshold = config.mse_threshold,
            ssim_threshold = config.ssim_threshold,
            "duplicate filter configured"
        );
        let (shutdown_tx, _) = watch::channel(false);
        Ok(Self {
            shared: Arc::new(Shared {
                config,
                source,
                state: Mutex::new(State {
                    retained: VecDeque::new(),
                    filter,
                    next_seq: 0,
                }),
                capture_gate: AsyncMutex::new(()),
                stopped: AtomicBool::new(false),
            }),
            navigation: None,
            running: AtomicBool::new(false),
            shutdown_tx,
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Attach a navigation-event feed. Only consulted when
    /// `capture_on_navigation` is enabled in the config.
    pub fn with_navigation(mut self, navigation: Arc<dyn NavigationSource>) -> Self {
        self.navigation = Some(navigation);
        self
    }

    /// Begin periodic sampling, plus navigation-triggered captures when
    /// configured. Logs and returns if already started or already stopped.
    pub fn start(&self) {
        if self.shared.stopped.load(Ordering::SeqCst) {
            warn!("collector already stopped, ignoring start");
            return;
        }
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("collector already started, ignoring start");
            return;
        }

        let mut tasks = self.tasks.lock().unwrap();

        let interval = Duration::from_millis(self.shared.config.interval_ms);
        let shared = Arc::clone(&self.shared);
        let mut shutdown = self.shutdown_tx.subscribe();
        tasks.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                // Biased, shutdown first: a tick pending at stop time never
                // starts one more capture.
                tokio::select! {
                    biased;
                    _ = shutdown.changed() => break,
                    _ = ticker.tick() => {}
                }
                // Outside the select: a shutdown signal never cancels a
                // capture that has already begun.
                shared.capture_once(Trigger::Timer).await;
            }
        }));

        if self.shared.config.capture_on_navigation {
            if let Some(navigation) = &self.navigation {
                let shared = Arc::clone(&self.shared);
                let mut shutdown = self.shutdown_tx.subscribe();
                let mut events = navigation.subscribe();
                tasks.push(tokio::spawn(async move {
                    loop {
                        tokio::select! {
                            biased;
                            _ = shutdown.changed() => break,
                            event = events.recv() => match event {
                                Ok(event) => {
                                    debug!(url = event.url, "navigation event, capturing");
                                    shared.capture_once(Trigger::Navigation).await;
                                }
                                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                                    debug!(skipped, "navigation event stream lagged");
                                }
                                Err(broadcast::error::RecvError::Closed) => break,
                            },
                        }
                    }
                }));
            } else {
                warn!("capture_on_navigation set but no navigation source attached");
            }
        }

        info!(
            interval_ms = self.shared.config.interval_ms,
            max_screenshots = self.shared.config.max_screenshots,
            source = self.shared.source.name(),
            "screenshot collector started"
        );
    }

    /// Halt sampling, wait for any in-flight capture to complete, and
    /// return the retained sequence. Idempotent: a second call returns the
    /// same, now-frozen, sequence.
    pub async fn stop(&self) -> Vec<Screenshot> {
        if !self.shared.stopped.swap(true, Ordering::SeqCst) {
            self.running.store(false, Ordering::SeqCst);
            let _ = self.shutdown_tx.send(true);

            let handles: Vec<_> = self.tasks.lock().unwrap().drain(..).collect();
            for handle in handles {
                if let Err(e) = handle.await {
                    debug!(error = %e, "collector task ended abnormally");
                }
            }

            // Any submission still queued on the gate drains here before we
            // snapshot; it will observe `stopped` and drop its frame.
            let _in_flight = self.shared.capture_gate.lock().await;

            info!(
                retained = self.screenshot_count(),
                "screenshot collector stopped"
            );
        }
        self.screenshots()
    }

    /// Manually submit a candidate frame, bypassing the live capture
    /// source. Same acceptance rule as timer- and navigation-driven
    /// captures; serialized behind any in-flight capture.
    pub async fn add_screenshot(&self, image_data: Vec<u8>) {
        if self.shared.stopped.load(Ordering::SeqCst) {
            warn!("collector stopped, dropping manually submitted frame");
            return;
        }
        let _in_flight = self.shared.capture_gate.lock().await;
        // Re-check under the gate: stop() may have finalized its snapshot
        // while this submission was queued, and that sequence stays frozen.
        if self.shared.stopped.load(Ordering::SeqCst) {
            warn!("collector stopped while submission was queued, dropping frame");
            return;
        }
        self.shared.submit(image_data, Trigger::Manual);
    }

    /// Read-only snapshot of the retained sequence, oldest first.
    pub fn screenshots(&self) -> Vec<Screenshot> {
        self.shared
            .state
            .lock()
            .unwrap()
            .retained
            .iter()
            .cloned()
            .collect()
    }

    pub fn screenshot_count(&self) -> usize {
        self.shared.state.lock().unwrap().retained.len()
    }

    /// Empty the retained sequence and reset the comparison baseline; the
    /// sampling timer keeps running.
    pub fn clear(&self) {
        let mut state = self.shared.state.lock().unwrap();
        state.retained.clear();
        state.filter.reset();
        debug!("retained screenshots and comparison state cleared");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::CaptureError;
    use crate::source::NavigationEvent;
    use async_trait::async_trait;
    use image::{ImageBuffer, Rgb, RgbImage};
    use std::io::Cursor;
    use std::sync::atomic::AtomicU32;

    fn png(width: u32, height: u32, color: [u8; 3]) -> Vec<u8> {
        let img: RgbImage = ImageBuffer::from_pixel(width, height, Rgb(color));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        buf
    }

    fn test_config(max_screenshots: usize) -> CollectorConfig {
        CollectorConfig {
            interval_ms: 100,
            max_screenshots,
            capture_on_navigation: false,
            ..CollectorConfig::default()
        }
    }

    /// Only byte-identical frames count as duplicates.
    fn exact_config(max_screenshots: usize) -> CollectorConfig {
        CollectorConfig {
            mse_threshold: 1e-6,
            ssim_threshold: 0.9999,
            ..test_config(max_screenshots)
        }
    }

    /// Returns a visibly distinct solid-color frame on every call.
    struct ColorCycleSource {
        counter: AtomicU32,
    }

    impl ColorCycleSource {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                counter: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl CaptureSource for ColorCycleSource {
        async fn capture(&self) -> Result<Vec<u8>, CaptureError> {
            let n = self.counter.fetch_add(1, Ordering::SeqCst);
            Ok(png(32, 32, [(n * 40 % 256) as u8, (n * 90 % 256) as u8, 0]))
        }

        fn name(&self) -> &str {
            "color-cycle"
        }
    }

    /// Like `ColorCycleSource`, but each capture takes `delay_ms` of tokio
    /// time before returning.
    struct SlowSource {
        inner: Arc<ColorCycleSource>,
        delay_ms: u64,
    }

    #[async_trait]
    impl CaptureSource for SlowSource {
        async fn capture(&self) -> Result<Vec<u8>, CaptureError> {
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
            self.inner.capture().await
        }
    }

    struct FailingSource;

    #[async_trait]
    impl CaptureSource for FailingSource {
        async fn capture(&self) -> Result<Vec<u8>, CaptureError> {
            Err(CaptureError::Unavailable("page went away".into()))
        }
    }

    struct FakeNavigation {
        tx: broadcast::Sender<NavigationEvent>,
    }

    impl FakeNavigation {
        fn new() -> Arc<Self> {
            let (tx, _) = broadcast::channel(16);
            Arc::new(Self { tx })
        }

        fn navigate(&self, url: &str) {
            let _ = self.tx.send(NavigationEvent {
                url: url.to_string(),
                occurred_at_ms: Utc::now().timestamp_millis(),
            });
        }
    }

    impl NavigationSource for FakeNavigation {
        fn subscribe(&self) -> broadcast::Receiver<NavigationEvent> {
            self.tx.subscribe()
        }
    }

    #[test]
    fn zero_interval_fails_construction() {
        let config = CollectorConfig {
            interval_ms: 0,
            ..CollectorConfig::default()
        };
        let result = ScreenshotCollector::new(config, ColorCycleSource::new());
        assert!(matches!(
            result,
            Err(CollectorError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn zero_capacity_fails_construction() {
        let config = CollectorConfig {
            max_screenshots: 0,
            ..CollectorConfig::default()
        };
        let result = ScreenshotCollector::new(config, ColorCycleSource::new());
        assert!(matches!(
            result,
            Err(CollectorError::InvalidConfiguration(_))
        ));
    }

    #[tokio::test]
    async fn identical_consecutive_submission_rejected() {
        let collector =
            ScreenshotCollector::new(test_config(10), ColorCycleSource::new()).unwrap();
        let frame = png(32, 32, [10, 20, 30]);
        collector.add_screenshot(frame.clone()).await;
        collector.add_screenshot(frame).await;
        assert_eq!(collector.screenshot_count(), 1);
    }

    #[tokio::test]
    async fn differing_dimensions_always_accepted() {
        let collector =
            ScreenshotCollector::new(test_config(10), ColorCycleSource::new()).unwrap();
        collector.add_screenshot(png(32, 32, [10, 20, 30])).await;
        collector.add_screenshot(png(64, 32, [10, 20, 30])).await;
        assert_eq!(collector.screenshot_count(), 2);
    }

    #[tokio::test]
    async fn capacity_never_exceeded() {
        let collector =
            ScreenshotCollector::new(exact_config(3), ColorCycleSource::new()).unwrap();
        for n in 0u8..10 {
            collector.add_screenshot(png(32, 32, [n * 20, 0, 0])).await;
            assert!(collector.screenshot_count() <= 3);
        }
        assert_eq!(collector.screenshot_count(), 3);
    }

    #[tokio::test]
    async fn dedup_then_fifo_eviction() {
        // maxScreenshots=3, byte-identical-only thresholds:
        // A, A, B, C, D -> A deduped once, then evicted -> [B, C, D].
        let collector =
            ScreenshotCollector::new(exact_config(3), ColorCycleSource::new()).unwrap();
        let a = png(32, 32, [0, 0, 0]);
        let b = png(32, 32, [80, 0, 0]);
        let c = png(32, 32, [160, 0, 0]);
        let d = png(32, 32, [240, 0, 0]);
        for frame in [&a, &a, &b, &c, &d] {
            collector.add_screenshot(frame.clone()).await;
        }

        let retained = collector.screenshots();
        let data: Vec<&[u8]> = retained.iter().map(|s| s.data.as_slice()).collect();
        assert_eq!(data, vec![b.as_slice(), c.as_slice(), d.as_slice()]);
        // Relative order preserved: seq strictly increasing.
        assert!(retained.windows(2).all(|w| w[0].seq < w[1].seq));
    }

    #[tokio::test]
    async fn clear_resets_comparison_state() {
        let collector =
            ScreenshotCollector::new(test_config(10), ColorCycleSource::new()).unwrap();
        let frame = png(32, 32, [10, 20, 30]);
        collector.add_screenshot(frame.clone()).await;
        collector.clear();
        assert_eq!(collector.screenshot_count(), 0);
        // A duplicate of the pre-clear last frame is accepted again.
        collector.add_screenshot(frame).await;
        assert_eq!(collector.screenshot_count(), 1);
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let collector =
            ScreenshotCollector::new(exact_config(10), ColorCycleSource::new()).unwrap();
        collector.add_screenshot(png(32, 32, [0, 0, 0])).await;
        collector.add_screenshot(png(32, 32, [128, 0, 0])).await;

        let first = collector.stop().await;
        let second = collector.stop().await;
        assert_eq!(first.len(), 2);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn stopped_collector_drops_manual_submissions() {
        let collector =
            ScreenshotCollector::new(test_config(10), ColorCycleSource::new()).unwrap();
        collector.add_screenshot(png(32, 32, [10, 20, 30])).await;
        collector.stop().await;
        collector.add_screenshot(png(32, 32, [200, 20, 30])).await;
        assert_eq!(collector.screenshot_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn interval_sampling_collects_bounded_count() {
        // interval=100ms, run ~250ms, distinct frame every capture:
        // ticks at 0/100/200 -> 2..=3 retained, never 0, never unbounded.
        let collector =
            ScreenshotCollector::new(test_config(50), ColorCycleSource::new()).unwrap();
        collector.start();
        tokio::time::sleep(Duration::from_millis(250)).await;
        let retained = collector.stop().await;
        assert!(
            (2..=3).contains(&retained.len()),
            "retained {} frames",
            retained.len()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn start_twice_is_harmless() {
        let collector =
            ScreenshotCollector::new(test_config(50), ColorCycleSource::new()).unwrap();
        collector.start();
        collector.start();
        tokio::time::sleep(Duration::from_millis(50)).await;
        let retained = collector.stop().await;
        // A duplicated sampler would have captured twice at t=0.
        assert_eq!(retained.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn capture_failures_are_skipped_not_fatal() {
        let collector =
            ScreenshotCollector::new(test_config(50), Arc::new(FailingSource)).unwrap();
        collector.start();
        tokio::time::sleep(Duration::from_millis(350)).await;
        let retained = collector.stop().await;
        assert!(retained.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn navigation_event_triggers_capture() {
        let navigation = FakeNavigation::new();
        let config = CollectorConfig {
            interval_ms: 60_000,
            capture_on_navigation: true,
            ..test_config(50)
        };
        let collector = ScreenshotCollector::new(config, ColorCycleSource::new())
            .unwrap()
            .with_navigation(navigation.clone());
        collector.start();
        // First timer tick fires immediately.
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(collector.screenshot_count(), 1);

        navigation.navigate("https://example.com/next");
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(collector.screenshot_count(), 2);

        collector.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn stop_immediately_after_start_captures_nothing() {
        let collector =
            ScreenshotCollector::new(test_config(50), ColorCycleSource::new()).unwrap();
        collector.start();
        // The first tick is already pending; shutdown must win over it.
        let retained = collector.stop().await;
        assert!(retained.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn submission_racing_stop_never_extends_frozen_sequence() {
        let source = Arc::new(SlowSource {
            inner: ColorCycleSource::new(),
            delay_ms: 100,
        });
        let config = CollectorConfig {
            interval_ms: 60_000,
            ..test_config(50)
        };
        let collector = Arc::new(ScreenshotCollector::new(config, source).unwrap());
        collector.start();

        // t=10: the t=0 capture holds the gate; a manual submission passes
        // the stopped check and queues behind it.
        tokio::time::sleep(Duration::from_millis(10)).await;
        let submitter = {
            let collector = Arc::clone(&collector);
            tokio::spawn(async move {
                collector.add_screenshot(png(32, 32, [200, 10, 10])).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        let first = collector.stop().await;
        submitter.await.unwrap();

        // The queued submission must not land after the frozen snapshot.
        assert_eq!(first.len(), 1);
        assert_eq!(first, collector.screenshots());
        assert_eq!(first, collector.stop().await);
    }

    #[tokio::test(start_paused = true)]
    async fn trigger_during_in_flight_capture_is_dropped() {
        let navigation = FakeNavigation::new();
        let source = Arc::new(SlowSource {
            inner: ColorCycleSource::new(),
            delay_ms: 100,
        });
        let config = CollectorConfig {
            interval_ms: 60_000,
            capture_on_navigation: true,
            ..test_config(50)
        };
        let collector = ScreenshotCollector::new(config, source)
            .unwrap()
            .with_navigation(navigation.clone());
        collector.start();

        // t=10: the t=0 timer capture is still in flight; the navigation
        // trigger must be dropped, not queued.
        tokio::time::sleep(Duration::from_millis(10)).await;
        navigation.navigate("https://example.com/mid-capture");
        tokio::time::sleep(Duration::from_millis(200)).await;

        let retained = collector.stop().await;
        assert_eq!(retained.len(), 1);
    }
}
