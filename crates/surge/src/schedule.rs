//! Ramp scheduler: target concurrency as a function of elapsed time.
//!
//! Stages are control points of a piecewise-linear curve. A positive-duration
//! stage interpolates from the previous target to its own; a zero-duration
//! stage jumps instantly and holds until the next stage begins.

use crate::scenario::Stage;
use serde::Serialize;
use std::time::Duration;

/// Stateless mapping from elapsed time to desired concurrency
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RampScheduler {
    start: u32,
    stages: Vec<Stage>,
}

/// One row of the stage plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StagePlan {
    /// Stage index
    pub index: usize,
    /// Offset from run start
    pub starts_at: Duration,
    /// Stage length
    pub duration: Duration,
    /// Target at the start of the stage
    pub from: u32,
    /// Target at the end of the stage
    pub to: u32,
}

impl RampScheduler {
    /// Scheduler starting from zero
    pub fn new(stages: Vec<Stage>) -> Self {
        Self::with_start(0, stages)
    }

    /// Scheduler starting from `start` concurrency
    pub fn with_start(start: u32, stages: Vec<Stage>) -> Self {
        Self { start, stages }
    }

    /// Desired concurrency at `elapsed`, or `None` once the schedule is over
    pub fn target_at(&self, elapsed: Duration) -> Option<u32> {
        let mut prev = self.start;
        let mut stage_start = Duration::ZERO;
        for stage in &self.stages {
            let stage_end = stage_start + stage.duration;
            if stage.duration.is_zero() {
                prev = stage.target;
                continue;
            }
            if elapsed < stage_end {
                let progress = (elapsed - stage_start).as_secs_f64() / stage.duration.as_secs_f64();
                let value = f64::from(prev) + (f64::from(stage.target) - f64::from(prev)) * progress;
                return Some(value.round().max(0.0) as u32);
            }
            prev = stage.target;
            stage_start = stage_end;
        }
        None
    }

    /// Sum of stage durations
    pub fn total_duration(&self) -> Duration {
        self.stages.iter().map(|s| s.duration).sum()
    }

    /// Highest concurrency the schedule reaches
    pub fn peak_target(&self) -> u32 {
        self.stages
            .iter()
            .map(|s| s.target)
            .fold(self.start, u32::max)
    }

    /// Start offset and from/to targets for each stage
    pub fn plan(&self) -> Vec<StagePlan> {
        let mut prev = self.start;
        let mut at = Duration::ZERO;
        self.stages
            .iter()
            .enumerate()
            .map(|(index, stage)| {
                let row = StagePlan {
                    index,
                    starts_at: at,
                    duration: stage.duration,
                    from: prev,
                    to: stage.target,
                };
                prev = stage.target;
                at += stage.duration;
                row
            })
            .collect()
    }
}
