//! Live stream statistics.
//!
//! The bridge records every normalized log here; a periodic task snapshots
//! the windows and publishes a `metric_tick` event to the metrics topic.
//! Windows are pruned lazily on record and snapshot, so an idle stream
//! costs nothing between ticks.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use pulse_core::event::{EventKind, LogLevel, MetricSnapshot, SourceCount};
use pulse_core::Event;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::topics::TOPIC_METRICS;
use crate::websocket::registry::TopicRegistry;

/// How many entries `top_sources` reports.
const TOP_SOURCES_LIMIT: usize = 10;

/// Counts events inside a trailing time window.
pub struct SlidingWindowCounter {
    window: Duration,
    hits: Mutex<VecDeque<Instant>>,
}

impl SlidingWindowCounter {
    /// Create a counter with the given trailing window.
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            hits: Mutex::new(VecDeque::new()),
        }
    }

    /// Record one hit at the current time.
    pub fn record(&self) {
        let now = Instant::now();
        let mut hits = self.hits.lock();
        hits.push_back(now);
        Self::prune(&mut hits, now, self.window);
    }

    /// Hits inside the window right now.
    pub fn count(&self) -> usize {
        let mut hits = self.hits.lock();
        Self::prune(&mut hits, Instant::now(), self.window);
        hits.len()
    }

    fn prune(hits: &mut VecDeque<Instant>, now: Instant, window: Duration) {
        while let Some(oldest) = hits.front() {
            if now.duration_since(*oldest) > window {
                let _ = hits.pop_front();
            } else {
                break;
            }
        }
    }
}

struct RecentLog {
    at: Instant,
    level: LogLevel,
    source: Option<String>,
}

/// Aggregates the recent log stream into snapshot statistics.
///
/// Throughput uses a short window (logs per second averaged over 10s);
/// level counts and top sources use a one-minute window.
pub struct LiveStats {
    throughput_window: Duration,
    rate_window: Duration,
    throughput: SlidingWindowCounter,
    recent: Mutex<VecDeque<RecentLog>>,
}

impl LiveStats {
    /// Stats with the standard windows (10s throughput, 60s rates).
    #[must_use]
    pub fn new() -> Self {
        Self::with_windows(Duration::from_secs(10), Duration::from_secs(60))
    }

    /// Stats with explicit windows.
    #[must_use]
    pub fn with_windows(throughput_window: Duration, rate_window: Duration) -> Self {
        Self {
            throughput_window,
            rate_window,
            throughput: SlidingWindowCounter::new(throughput_window),
            recent: Mutex::new(VecDeque::new()),
        }
    }

    /// Record one normalized log line.
    pub fn record(&self, record: &pulse_core::event::LogRecord) {
        self.throughput.record();
        let now = Instant::now();
        let mut recent = self.recent.lock();
        recent.push_back(RecentLog {
            at: now,
            level: record.level,
            source: record.source.clone(),
        });
        while let Some(oldest) = recent.front() {
            if now.duration_since(oldest.at) > self.rate_window {
                let _ = recent.pop_front();
            } else {
                break;
            }
        }
    }

    /// Snapshot the windows into a wire-ready [`MetricSnapshot`].
    #[must_use]
    pub fn snapshot(&self, connected_clients: usize) -> MetricSnapshot {
        #[allow(clippy::cast_precision_loss)]
        let logs_per_second =
            self.throughput.count() as f64 / self.throughput_window.as_secs_f64();

        let now = Instant::now();
        let mut level_distribution: BTreeMap<String, u64> = BTreeMap::new();
        let mut by_source: HashMap<String, u64> = HashMap::new();
        {
            let recent = self.recent.lock();
            for entry in recent.iter() {
                if now.duration_since(entry.at) > self.rate_window {
                    continue;
                }
                *level_distribution
                    .entry(entry.level.as_str().to_string())
                    .or_insert(0) += 1;
                if let Some(source) = &entry.source {
                    *by_source.entry(source.clone()).or_insert(0) += 1;
                }
            }
        }

        let mut top_sources: Vec<SourceCount> = by_source
            .into_iter()
            .map(|(source, count)| SourceCount { source, count })
            .collect();
        // Descending by count, name breaks ties so the order is stable
        top_sources.sort_by(|a, b| b.count.cmp(&a.count).then(a.source.cmp(&b.source)));
        top_sources.truncate(TOP_SOURCES_LIMIT);

        let per_minute = |level: LogLevel| {
            level_distribution
                .get(level.as_str())
                .copied()
                .unwrap_or(0)
        };

        MetricSnapshot {
            logs_per_second,
            errors_per_minute: per_minute(LogLevel::Error),
            warnings_per_minute: per_minute(LogLevel::Warning),
            criticals_per_minute: per_minute(LogLevel::Critical),
            level_distribution,
            top_sources,
            connected_clients,
        }
    }
}

impl Default for LiveStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Publish a `metric_tick` event to the metrics topic every `interval`
/// until cancelled.
#[instrument(skip_all, name = "metrics_loop")]
pub async fn run_metrics_loop(
    stats: Arc<LiveStats>,
    registry: Arc<TopicRegistry>,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut tick = tokio::time::interval(interval);
    // Skip the immediate first tick
    let _ = tick.tick().await;
    loop {
        tokio::select! {
            _ = tick.tick() => {
                let snapshot = stats.snapshot(registry.connection_count());
                debug!(
                    logs_per_second = snapshot.logs_per_second,
                    connected = snapshot.connected_clients,
                    "metric tick"
                );
                let _ = registry.publish(&Event::now(
                    TOPIC_METRICS,
                    EventKind::MetricTick(snapshot),
                ));
            }
            () = cancel.cancelled() => break,
        }
    }
    info!("metrics loop stopped");
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
