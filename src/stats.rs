//! Statistics collection for a link endpoint.
//!
//! Latency is aggregated with a single-pass streaming algorithm (Welford's
//! method) so no per-packet history is kept; throughput and stall counters
//! are plain accumulators. Everything exports to JSON for analysis.

use serde::{Deserialize, Serialize};

use crate::types::SimTime;

/// Streaming min/max/mean/variance aggregate over packet latencies.
///
/// Updated once per received packet; never reset during a run.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct LatencyStats {
    /// Number of samples folded in.
    pub count: u64,
    /// Smallest observed latency.
    pub min: SimTime,
    /// Largest observed latency.
    pub max: SimTime,
    mean: f64,
    m2: f64,
}

impl LatencyStats {
    /// Creates an empty aggregate.
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one latency sample into the aggregate.
    pub fn record(&mut self, latency: SimTime) {
        self.count += 1;
        let x = latency as f64;

        if self.count == 1 {
            self.min = latency;
            self.max = latency;
            self.mean = x;
            self.m2 = 0.0;
            return;
        }

        self.min = self.min.min(latency);
        self.max = self.max.max(latency);

        // Welford's incremental update.
        let old_mean = self.mean;
        self.mean = old_mean + (x - old_mean) / self.count as f64;
        self.m2 += (x - old_mean) * (x - self.mean);
    }

    /// Returns the running mean, or 0 when no samples exist.
    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Returns the population variance, or 0 with fewer than two samples.
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / self.count as f64
        }
    }

    /// Returns the population standard deviation.
    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }
}

/// Counters collected by one link endpoint over a run.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct LinkStats {
    /// Total bits handed to the transport.
    pub send_bit_count: u64,
    /// Packets transmitted by the output arbiter.
    pub packets_sent: u64,
    /// Packets delivered to the owning endpoint.
    pub packets_received: u64,
    /// Total time the output port was blocked with packets pending.
    pub output_port_stalls: SimTime,
    /// Delivery latency aggregate.
    pub latency: LatencyStats,
}

impl LinkStats {
    /// Creates an empty counter set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Exports the statistics as a JSON value.
    pub fn export(&self) -> serde_json::Value {
        serde_json::json!({
            "send_bit_count": self.send_bit_count,
            "packets_sent": self.packets_sent,
            "packets_received": self.packets_received,
            "output_port_stalls": self.output_port_stalls,
            "latency": {
                "count": self.latency.count,
                "min": self.latency.min,
                "max": self.latency.max,
                "mean": self.latency.mean(),
                "variance": self.latency.variance(),
            },
        })
    }
}
