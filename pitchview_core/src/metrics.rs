//! Per-view detection accuracy against annotated ground truth.
//!
//! Every frame falls in exactly one bucket:
//! - **TP**: ball annotated and reported within `accuracy_distance`
//! - **TN**: ball annotated but reported too far away, or not reported
//! - **FP**: no ball annotated, something reported
//! - **FN**: no ball annotated, nothing reported
//!
//! Distances feed a short rolling window so the summary shows recent
//! drift rather than a whole-match average.

use std::collections::VecDeque;

use pitchview_env::Pixel;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone)]
pub struct AccuracyMetric {
    pub tp: u32,
    pub tn: u32,
    pub fp: u32,
    pub fn_: u32,

    /// Frames that carried a ground-truth annotation
    pub total: u32,

    /// Fraction of the main candidate's life spent tracking
    pub track_ratio: f64,

    threshold: f64,
    window: usize,
    distances: VecDeque<f64>,
}

/// Serializable snapshot of an [`AccuracyMetric`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccuracySummary {
    pub tp: u32,
    pub tn: u32,
    pub fp: u32,
    pub fn_: u32,
    pub total: u32,

    /// TP / (TP + TN) in percent
    pub recall: f64,

    /// Mean of the rolling distance window in pixels
    pub mean_distance: f64,

    pub track_ratio: f64,
}

impl AccuracyMetric {
    pub fn new(threshold: f64, window: usize) -> Self {
        Self {
            tp: 0,
            tn: 0,
            fp: 0,
            fn_: 0,
            total: 0,
            track_ratio: 0.0,
            threshold,
            window: window.max(1),
            distances: VecDeque::with_capacity(window),
        }
    }

    /// Scores one frame. `tracking` tells whether the report came from a
    /// candidate in the Tracking state; only those contribute a distance.
    pub fn record(&mut self, truth: Option<Pixel>, reported: Option<Pixel>, tracking: bool) {
        match (truth, reported) {
            (Some(t), Some(r)) => {
                self.total += 1;
                let dist = nalgebra::distance(&t, &r);
                self.push_distance(if tracking { dist } else { 0.0 });
                if dist < self.threshold {
                    self.tp += 1;
                } else {
                    self.tn += 1;
                }
            }
            (Some(_), None) => {
                self.total += 1;
                self.push_distance(0.0);
                self.tn += 1;
            }
            (None, Some(_)) => {
                self.push_distance(0.0);
                self.fp += 1;
            }
            (None, None) => {
                self.push_distance(0.0);
                self.fn_ += 1;
            }
        }
    }

    fn push_distance(&mut self, d: f64) {
        self.distances.push_back(d);
        while self.distances.len() > self.window {
            self.distances.pop_front();
        }
    }

    pub fn mean_distance(&self) -> f64 {
        if self.distances.is_empty() {
            return 0.0;
        }
        self.distances.iter().sum::<f64>() / self.distances.len() as f64
    }

    pub fn recall(&self) -> f64 {
        if self.tp + self.tn == 0 {
            return 0.0;
        }
        self.tp as f64 / (self.tp + self.tn) as f64 * 100.0
    }

    pub fn summary(&self) -> AccuracySummary {
        AccuracySummary {
            tp: self.tp,
            tn: self.tn,
            fp: self.fp,
            fn_: self.fn_,
            total: self.total,
            recall: self.recall(),
            mean_distance: self.mean_distance(),
            track_ratio: self.track_ratio,
        }
    }
}

impl std::fmt::Display for AccuracyMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "TP: {} / {} (R {:.1}%, D {:.1}px)",
            self.tp,
            self.total,
            self.recall(),
            self.mean_distance()
        )
    }
}
