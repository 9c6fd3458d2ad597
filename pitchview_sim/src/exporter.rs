//! JSON exporter for offline inspection of a run.
//!
//! One [`SimFrame`] per fusion round: truth, the fused estimate and what
//! each view reported.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use nalgebra::{Point2, Point3};
use serde::{Deserialize, Serialize};

use crate::error::SimError;
use crate::runner::{ScenarioMetrics, ScenarioRun};

/// A point in field metres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl From<Point3<f64>> for Position {
    fn from(p: Point3<f64>) -> Self {
        Self { x: p.x, y: p.y, z: p.z }
    }
}

/// A point in image pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImagePosition {
    pub x: f64,
    pub y: f64,
}

impl From<Point2<f64>> for ImagePosition {
    fn from(p: Point2<f64>) -> Self {
        Self { x: p.x, y: p.y }
    }
}

/// What one view reported in a round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewFrame {
    pub view: usize,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub ball: Option<ImagePosition>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub ground_truth: Option<ImagePosition>,

    pub players: usize,
}

/// A single frame of simulation data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimFrame {
    pub frame: u64,

    /// Simulation time in seconds
    pub time_sec: f64,

    /// True ball centre
    pub ball: Position,

    /// Fused estimate committed this round
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fused: Option<Position>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub landing: Option<Position>,

    /// Views confirmed by cross-view agreement
    pub real_views: Vec<usize>,

    pub views: Vec<ViewFrame>,
}

/// Complete simulation export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimExport {
    /// Scenario name
    pub scenario: String,

    /// Seed used
    pub seed: u64,

    /// Duration in seconds
    pub duration_sec: f64,

    /// All frames
    pub frames: Vec<SimFrame>,

    /// Final results
    pub passed: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<ScenarioMetrics>,
}

impl SimExport {
    /// Creates a new export container.
    pub fn new(scenario: &str, seed: u64) -> Self {
        Self {
            scenario: scenario.to_string(),
            seed,
            duration_sec: 0.0,
            frames: Vec::new(),
            passed: false,
            metrics: None,
        }
    }

    /// Builds the export of a finished run.
    pub fn from_run(run: &ScenarioRun) -> Self {
        let mut export = Self::new(run.result.scenario.name(), run.result.seed);
        for report in &run.reports {
            let Some(truth) = run.world.get(report.frame as usize) else {
                continue;
            };
            export.add_frame(SimFrame {
                frame: report.frame,
                time_sec: truth.time_sec,
                ball: truth.ball.position.into(),
                fused: report.position.map(Position::from),
                landing: report.landing.map(Position::from),
                real_views: report.real_views.iter().map(|v| v.index()).collect(),
                views: report
                    .snapshots
                    .iter()
                    .map(|s| ViewFrame {
                        view: s.view.index(),
                        ball: s.ball.as_ref().map(|b| b.position.into()),
                        ground_truth: s.ground_truth.map(ImagePosition::from),
                        players: s.players.len(),
                    })
                    .collect(),
            });
        }
        export.finalize(run.result.passed, Some(run.result.metrics.clone()));
        export
    }

    /// Adds a frame.
    pub fn add_frame(&mut self, frame: SimFrame) {
        self.duration_sec = frame.time_sec;
        self.frames.push(frame);
    }

    /// Finalizes the export.
    pub fn finalize(&mut self, passed: bool, metrics: Option<ScenarioMetrics>) {
        self.passed = passed;
        self.metrics = metrics;
    }

    /// Writes to a JSON file.
    pub fn write_to_file(&self, path: impl AsRef<Path>) -> Result<(), SimError> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}
