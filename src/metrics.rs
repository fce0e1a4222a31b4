//! Process-wide counters exposed over `/metrics`.
//!
//! Plain atomics behind `Arc`, shared through the API state. Request
//! durations keep a bounded window for percentile estimates.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::RwLock;

use crate::game::engine::GameResult;

const DURATION_WINDOW: usize = 1000;

/// Prometheus-compatible metrics registry
#[derive(Clone)]
pub struct MetricsRegistry {
    started_at: Instant,

    /// HTTP request metrics
    pub http_requests_total: Arc<AtomicU64>,
    pub http_requests_active: Arc<AtomicU64>,
    pub http_request_duration_seconds: Arc<RwLock<Vec<f64>>>,
    pub errors_total: Arc<AtomicU64>,

    /// Table metrics
    pub games_dealt_total: Arc<AtomicU64>,
    pub naturals_dealt_total: Arc<AtomicU64>,
    pub games_won_total: Arc<AtomicU64>,
    pub games_lost_total: Arc<AtomicU64>,
    pub games_pushed_total: Arc<AtomicU64>,
    pub games_forfeited_total: Arc<AtomicU64>,

    /// Chip-flow metrics
    pub chips_wagered_total: Arc<AtomicU64>,
    pub chips_paid_out_total: Arc<AtomicU64>,
    pub chips_purchased_total: Arc<AtomicU64>,

    /// Concurrency metrics
    pub version_conflicts_total: Arc<AtomicU64>,
    pub conflict_retries_total: Arc<AtomicU64>,

    /// Cache metrics
    pub cache_hits_total: Arc<AtomicU64>,
    pub cache_misses_total: Arc<AtomicU64>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),

            http_requests_total: Arc::new(AtomicU64::new(0)),
            http_requests_active: Arc::new(AtomicU64::new(0)),
            http_request_duration_seconds: Arc::new(RwLock::new(Vec::new())),
            errors_total: Arc::new(AtomicU64::new(0)),

            games_dealt_total: Arc::new(AtomicU64::new(0)),
            naturals_dealt_total: Arc::new(AtomicU64::new(0)),
            games_won_total: Arc::new(AtomicU64::new(0)),
            games_lost_total: Arc::new(AtomicU64::new(0)),
            games_pushed_total: Arc::new(AtomicU64::new(0)),
            games_forfeited_total: Arc::new(AtomicU64::new(0)),

            chips_wagered_total: Arc::new(AtomicU64::new(0)),
            chips_paid_out_total: Arc::new(AtomicU64::new(0)),
            chips_purchased_total: Arc::new(AtomicU64::new(0)),

            version_conflicts_total: Arc::new(AtomicU64::new(0)),
            conflict_retries_total: Arc::new(AtomicU64::new(0)),

            cache_hits_total: Arc::new(AtomicU64::new(0)),
            cache_misses_total: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Record a finished HTTP request
    pub async fn record_http_request(&self, duration: Duration, success: bool) {
        self.http_requests_total.fetch_add(1, Ordering::SeqCst);

        let mut durations = self.http_request_duration_seconds.write().await;
        durations.push(duration.as_secs_f64());
        if durations.len() > DURATION_WINDOW {
            let excess = durations.len() - DURATION_WINDOW;
            durations.drain(0..excess);
        }

        if !success {
            self.errors_total.fetch_add(1, Ordering::SeqCst);
        }
    }

    pub fn record_deal(&self, bet_amount: u64, natural: bool) {
        self.games_dealt_total.fetch_add(1, Ordering::SeqCst);
        self.chips_wagered_total.fetch_add(bet_amount, Ordering::SeqCst);
        if natural {
            self.naturals_dealt_total.fetch_add(1, Ordering::SeqCst);
        }
    }

    pub fn record_settlement(&self, result: GameResult, winnings: u64) {
        match result {
            GameResult::Win => self.games_won_total.fetch_add(1, Ordering::SeqCst),
            GameResult::Lose => self.games_lost_total.fetch_add(1, Ordering::SeqCst),
            GameResult::Push => self.games_pushed_total.fetch_add(1, Ordering::SeqCst),
            GameResult::Forfeit => self.games_forfeited_total.fetch_add(1, Ordering::SeqCst),
        };
        self.chips_paid_out_total.fetch_add(winnings, Ordering::SeqCst);
    }

    pub fn record_chip_purchase(&self, amount: u64) {
        self.chips_purchased_total.fetch_add(amount, Ordering::SeqCst);
    }

    pub fn record_version_conflict(&self) {
        self.version_conflicts_total.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_conflict_retry(&self) {
        self.conflict_retries_total.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_cache_hit(&self, hit: bool) {
        if hit {
            self.cache_hits_total.fetch_add(1, Ordering::SeqCst);
        } else {
            self.cache_misses_total.fetch_add(1, Ordering::SeqCst);
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    /// Generate Prometheus metrics format
    pub async fn to_prometheus_format(&self) -> String {
        let mut output = String::new();

        output.push_str(&format!(
            "# HELP pontoon_uptime_seconds Seconds since the server started\n\
             # TYPE pontoon_uptime_seconds gauge\n\
             pontoon_uptime_seconds {}\n\n",
            self.uptime_seconds()
        ));

        output.push_str(&format!(
            "# HELP pontoon_http_requests_total Total number of HTTP requests\n\
             # TYPE pontoon_http_requests_total counter\n\
             pontoon_http_requests_total {}\n\n",
            self.http_requests_total.load(Ordering::SeqCst)
        ));

        output.push_str(&format!(
            "# HELP pontoon_http_requests_active Currently active HTTP requests\n\
             # TYPE pontoon_http_requests_active gauge\n\
             pontoon_http_requests_active {}\n\n",
            self.http_requests_active.load(Ordering::SeqCst)
        ));

        let durations = self.http_request_duration_seconds.read().await;
        if !durations.is_empty() {
            let mut sorted = durations.clone();
            sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

            let p50_idx = (sorted.len() as f64 * 0.50) as usize;
            let p95_idx = (sorted.len() as f64 * 0.95) as usize;
            let p99_idx = (sorted.len() as f64 * 0.99) as usize;

            output.push_str(&format!(
                "# HELP pontoon_http_request_duration_seconds HTTP request duration percentiles\n\
                 # TYPE pontoon_http_request_duration_seconds gauge\n\
                 pontoon_http_request_duration_seconds{{quantile=\"0.50\"}} {}\n\
                 pontoon_http_request_duration_seconds{{quantile=\"0.95\"}} {}\n\
                 pontoon_http_request_duration_seconds{{quantile=\"0.99\"}} {}\n\n",
                sorted.get(p50_idx).unwrap_or(&0.0),
                sorted.get(p95_idx).unwrap_or(&0.0),
                sorted.get(p99_idx).unwrap_or(&0.0)
            ));
        }
        drop(durations);

        output.push_str(&format!(
            "# HELP pontoon_games_dealt_total Total games dealt\n\
             # TYPE pontoon_games_dealt_total counter\n\
             pontoon_games_dealt_total {}\n\n",
            self.games_dealt_total.load(Ordering::SeqCst)
        ));

        output.push_str(&format!(
            "# HELP pontoon_naturals_dealt_total Games decided by a two-card 21 at the deal\n\
             # TYPE pontoon_naturals_dealt_total counter\n\
             pontoon_naturals_dealt_total {}\n\n",
            self.naturals_dealt_total.load(Ordering::SeqCst)
        ));

        output.push_str(&format!(
            "# HELP pontoon_games_won_total Settled games the player won\n\
             # TYPE pontoon_games_won_total counter\n\
             pontoon_games_won_total {}\n\n",
            self.games_won_total.load(Ordering::SeqCst)
        ));

        output.push_str(&format!(
            "# HELP pontoon_games_lost_total Settled games the player lost\n\
             # TYPE pontoon_games_lost_total counter\n\
             pontoon_games_lost_total {}\n\n",
            self.games_lost_total.load(Ordering::SeqCst)
        ));

        output.push_str(&format!(
            "# HELP pontoon_games_pushed_total Settled games that tied\n\
             # TYPE pontoon_games_pushed_total counter\n\
             pontoon_games_pushed_total {}\n\n",
            self.games_pushed_total.load(Ordering::SeqCst)
        ));

        output.push_str(&format!(
            "# HELP pontoon_games_forfeited_total Games abandoned and forfeited\n\
             # TYPE pontoon_games_forfeited_total counter\n\
             pontoon_games_forfeited_total {}\n\n",
            self.games_forfeited_total.load(Ordering::SeqCst)
        ));

        output.push_str(&format!(
            "# HELP pontoon_chips_wagered_total Chips staked across all games\n\
             # TYPE pontoon_chips_wagered_total counter\n\
             pontoon_chips_wagered_total {}\n\n",
            self.chips_wagered_total.load(Ordering::SeqCst)
        ));

        output.push_str(&format!(
            "# HELP pontoon_chips_paid_out_total Chips returned by settlements\n\
             # TYPE pontoon_chips_paid_out_total counter\n\
             pontoon_chips_paid_out_total {}\n\n",
            self.chips_paid_out_total.load(Ordering::SeqCst)
        ));

        output.push_str(&format!(
            "# HELP pontoon_chips_purchased_total Chips added through purchases\n\
             # TYPE pontoon_chips_purchased_total counter\n\
             pontoon_chips_purchased_total {}\n\n",
            self.chips_purchased_total.load(Ordering::SeqCst)
        ));

        output.push_str(&format!(
            "# HELP pontoon_version_conflicts_total Optimistic concurrency conflicts observed\n\
             # TYPE pontoon_version_conflicts_total counter\n\
             pontoon_version_conflicts_total {}\n\n",
            self.version_conflicts_total.load(Ordering::SeqCst)
        ));

        output.push_str(&format!(
            "# HELP pontoon_conflict_retries_total Operations retried after a conflict\n\
             # TYPE pontoon_conflict_retries_total counter\n\
             pontoon_conflict_retries_total {}\n\n",
            self.conflict_retries_total.load(Ordering::SeqCst)
        ));

        let cache_hits = self.cache_hits_total.load(Ordering::SeqCst);
        let cache_misses = self.cache_misses_total.load(Ordering::SeqCst);
        let cache_hit_ratio = if cache_hits + cache_misses > 0 {
            cache_hits as f64 / (cache_hits + cache_misses) as f64
        } else {
            0.0
        };

        output.push_str(&format!(
            "# HELP pontoon_cache_hits_total Total cache hits\n\
             # TYPE pontoon_cache_hits_total counter\n\
             pontoon_cache_hits_total {}\n\n",
            cache_hits
        ));

        output.push_str(&format!(
            "# HELP pontoon_cache_misses_total Total cache misses\n\
             # TYPE pontoon_cache_misses_total counter\n\
             pontoon_cache_misses_total {}\n\n",
            cache_misses
        ));

        output.push_str(&format!(
            "# HELP pontoon_cache_hit_ratio Cache hit ratio (0-1)\n\
             # TYPE pontoon_cache_hit_ratio gauge\n\
             pontoon_cache_hit_ratio {}\n\n",
            cache_hit_ratio
        ));

        output.push_str(&format!(
            "# HELP pontoon_errors_total Requests that ended in an error response\n\
             # TYPE pontoon_errors_total counter\n\
             pontoon_errors_total {}\n\n",
            self.errors_total.load(Ordering::SeqCst)
        ));

        output
    }

    /// Get current metrics snapshot
    pub async fn snapshot(&self) -> MetricsSnapshot {
        let durations = self.http_request_duration_seconds.read().await;
        let avg_response_time_ms = if durations.is_empty() {
            0.0
        } else {
            durations.iter().sum::<f64>() / durations.len() as f64 * 1000.0
        };
        drop(durations);

        let cache_hits = self.cache_hits_total.load(Ordering::SeqCst);
        let cache_misses = self.cache_misses_total.load(Ordering::SeqCst);

        MetricsSnapshot {
            uptime_seconds: self.uptime_seconds(),
            http_requests_total: self.http_requests_total.load(Ordering::SeqCst),
            http_requests_active: self.http_requests_active.load(Ordering::SeqCst),
            avg_response_time_ms,

            games_dealt: self.games_dealt_total.load(Ordering::SeqCst),
            naturals_dealt: self.naturals_dealt_total.load(Ordering::SeqCst),
            games_won: self.games_won_total.load(Ordering::SeqCst),
            games_lost: self.games_lost_total.load(Ordering::SeqCst),
            games_pushed: self.games_pushed_total.load(Ordering::SeqCst),
            games_forfeited: self.games_forfeited_total.load(Ordering::SeqCst),

            chips_wagered: self.chips_wagered_total.load(Ordering::SeqCst),
            chips_paid_out: self.chips_paid_out_total.load(Ordering::SeqCst),
            chips_purchased: self.chips_purchased_total.load(Ordering::SeqCst),

            version_conflicts: self.version_conflicts_total.load(Ordering::SeqCst),
            conflict_retries: self.conflict_retries_total.load(Ordering::SeqCst),

            cache_hits,
            cache_misses,
            cache_hit_ratio: if cache_hits + cache_misses > 0 {
                cache_hits as f64 / (cache_hits + cache_misses) as f64
            } else {
                0.0
            },

            errors_total: self.errors_total.load(Ordering::SeqCst),
        }
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Metrics snapshot for API responses
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub uptime_seconds: u64,

    pub http_requests_total: u64,
    pub http_requests_active: u64,
    pub avg_response_time_ms: f64,

    pub games_dealt: u64,
    pub naturals_dealt: u64,
    pub games_won: u64,
    pub games_lost: u64,
    pub games_pushed: u64,
    pub games_forfeited: u64,

    pub chips_wagered: u64,
    pub chips_paid_out: u64,
    pub chips_purchased: u64,

    pub version_conflicts: u64,
    pub conflict_retries: u64,

    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_hit_ratio: f64,

    pub errors_total: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn settlement_counters_follow_the_result() {
        let metrics = MetricsRegistry::new();
        metrics.record_deal(100, false);
        metrics.record_deal(50, true);
        metrics.record_settlement(GameResult::Win, 200);
        metrics.record_settlement(GameResult::Forfeit, 0);

        let snapshot = metrics.snapshot().await;
        assert_eq!(snapshot.games_dealt, 2);
        assert_eq!(snapshot.naturals_dealt, 1);
        assert_eq!(snapshot.games_won, 1);
        assert_eq!(snapshot.games_forfeited, 1);
        assert_eq!(snapshot.chips_wagered, 150);
        assert_eq!(snapshot.chips_paid_out, 200);
    }

    #[tokio::test]
    async fn prometheus_output_carries_the_counter_values() {
        let metrics = MetricsRegistry::new();
        metrics.record_deal(100, false);
        metrics.record_cache_hit(true);
        metrics.record_cache_hit(false);
        metrics
            .record_http_request(Duration::from_millis(5), true)
            .await;

        let text = metrics.to_prometheus_format().await;
        assert!(text.contains("pontoon_games_dealt_total 1"));
        assert!(text.contains("pontoon_chips_wagered_total 100"));
        assert!(text.contains("pontoon_cache_hit_ratio 0.5"));
        assert!(text.contains("pontoon_http_requests_total 1"));
        assert!(text.contains("quantile=\"0.95\""));
    }

    #[tokio::test]
    async fn duration_window_stays_bounded() {
        let metrics = MetricsRegistry::new();
        for _ in 0..(DURATION_WINDOW + 50) {
            metrics
                .record_http_request(Duration::from_micros(10), true)
                .await;
        }

        let durations = metrics.http_request_duration_seconds.read().await;
        assert_eq!(durations.len(), DURATION_WINDOW);
    }
}
