//! Confusion-matrix accumulation and derived classification metrics.

use chrono::{DateTime, Local};
use serde::{Serialize, Serializer};
use std::fmt;
use std::time::Duration;

use crate::error::InvalidStateError;

/// Lifecycle of a [`MetricsAccumulator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AccumulatorState {
    Idle,
    Accumulating,
    Finalized,
}

impl fmt::Display for AccumulatorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AccumulatorState::Idle => "idle",
            AccumulatorState::Accumulating => "accumulating",
            AccumulatorState::Finalized => "finalized",
        })
    }
}

/// Confusion-matrix cell for one verified pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Tp,
    Tn,
    Fp,
    Fn,
}

impl Outcome {
    pub fn classify(ground_truth: bool, predicted: bool) -> Self {
        match (predicted, ground_truth) {
            (true, true) => Outcome::Tp,
            (true, false) => Outcome::Fp,
            (false, true) => Outcome::Fn,
            (false, false) => Outcome::Tn,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Outcome::Tp => "tp",
            Outcome::Tn => "tn",
            Outcome::Fp => "fp",
            Outcome::Fn => "fn",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A metric that may be undefined because its denominator is zero.
///
/// Undefined is its own value: it is never reported as 0, which would read
/// as a perfect negative score on an empty sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Measure {
    Value(f64),
    NotApplicable,
}

impl Measure {
    /// `numerator / denominator`, or N/A when the denominator is zero.
    pub fn ratio(numerator: u64, denominator: u64) -> Self {
        if denominator == 0 {
            Measure::NotApplicable
        } else {
            Measure::Value(numerator as f64 / denominator as f64)
        }
    }

    pub fn value(self) -> Option<f64> {
        match self {
            Measure::Value(v) => Some(v),
            Measure::NotApplicable => None,
        }
    }
}

impl fmt::Display for Measure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Measure::Value(v) => write!(f, "{v}"),
            Measure::NotApplicable => f.write_str("N/A"),
        }
    }
}

impl Serialize for Measure {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Measure::Value(v) => serializer.serialize_f64(*v),
            Measure::NotApplicable => serializer.serialize_none(),
        }
    }
}

fn serialize_secs<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(d.as_secs_f64())
}

/// Raw counts for one race.
///
/// Only [`ConfusionCounters::add`] mutates them, so `total_count` always equals
/// the sum of the four cells.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConfusionCounters {
    true_positive: u64,
    true_negative: u64,
    false_positive: u64,
    false_negative: u64,
    total_count: u64,
    #[serde(rename = "total_time_secs", serialize_with = "serialize_secs")]
    total_time: Duration,
}

impl ConfusionCounters {
    pub fn add(&mut self, outcome: Outcome, elapsed: Duration) {
        match outcome {
            Outcome::Tp => self.true_positive += 1,
            Outcome::Tn => self.true_negative += 1,
            Outcome::Fp => self.false_positive += 1,
            Outcome::Fn => self.false_negative += 1,
        }
        self.total_count += 1;
        self.total_time += elapsed;
    }

    pub fn true_positive(&self) -> u64 {
        self.true_positive
    }

    pub fn true_negative(&self) -> u64 {
        self.true_negative
    }

    pub fn false_positive(&self) -> u64 {
        self.false_positive
    }

    pub fn false_negative(&self) -> u64 {
        self.false_negative
    }

    pub fn total_count(&self) -> u64 {
        self.total_count
    }

    pub fn total_time(&self) -> Duration {
        self.total_time
    }

    /// Pairs whose ground truth is genuine (TP + FN).
    pub fn positive_count(&self) -> u64 {
        self.true_positive + self.false_negative
    }

    /// Pairs whose ground truth is impostor (TN + FP).
    pub fn negative_count(&self) -> u64 {
        self.true_negative + self.false_positive
    }
}

/// Metrics derived from a finished set of counters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DerivedMetrics {
    pub precision: Measure,
    pub recall: Measure,
    pub f1: Measure,
    pub accuracy: Measure,
    pub specificity: Measure,
    /// Mean seconds per verified pair.
    pub average_time_secs: Measure,
}

impl DerivedMetrics {
    pub fn from_counters(c: &ConfusionCounters) -> Self {
        let tp = c.true_positive;
        let tn = c.true_negative;
        let fp = c.false_positive;
        let fn_ = c.false_negative;

        let precision = Measure::ratio(tp, tp + fp);
        let recall = Measure::ratio(tp, tp + fn_);
        let f1 = match (precision, recall) {
            (Measure::Value(p), Measure::Value(r)) if p + r > 0.0 => {
                Measure::Value(2.0 * p * r / (p + r))
            }
            _ => Measure::NotApplicable,
        };

        let average_time_secs = if c.total_count == 0 {
            Measure::NotApplicable
        } else {
            Measure::Value(c.total_time.as_secs_f64() / c.total_count as f64)
        };

        Self {
            precision,
            recall,
            f1,
            accuracy: Measure::ratio(tp + tn, c.total_count),
            specificity: Measure::ratio(tn, tn + fp),
            average_time_secs,
        }
    }
}

/// Per-race accumulator: `Idle -> Accumulating -> Finalized`.
#[derive(Debug, Clone)]
pub struct MetricsAccumulator {
    race: String,
    state: AccumulatorState,
    counters: ConfusionCounters,
    started_at: Option<DateTime<Local>>,
    finished_at: Option<DateTime<Local>>,
    derived: Option<DerivedMetrics>,
}

impl MetricsAccumulator {
    pub fn new(race: impl Into<String>) -> Self {
        Self {
            race: race.into(),
            state: AccumulatorState::Idle,
            counters: ConfusionCounters::default(),
            started_at: None,
            finished_at: None,
            derived: None,
        }
    }

    pub fn start(&mut self) -> Result<(), InvalidStateError> {
        self.expect_state(AccumulatorState::Idle, "start")?;
        self.state = AccumulatorState::Accumulating;
        self.started_at = Some(Local::now());
        Ok(())
    }

    /// Fold one verified pair into the counters.
    pub fn record(
        &mut self,
        ground_truth: bool,
        predicted: bool,
        elapsed: Duration,
    ) -> Result<Outcome, InvalidStateError> {
        self.expect_state(AccumulatorState::Accumulating, "record")?;
        let outcome = Outcome::classify(ground_truth, predicted);
        self.counters.add(outcome, elapsed);
        Ok(outcome)
    }

    /// Close the accumulator and compute derived metrics.
    ///
    /// Repeated calls return the cached result.
    pub fn finalize(&mut self) -> Result<DerivedMetrics, InvalidStateError> {
        match self.state {
            AccumulatorState::Finalized => {
                if let Some(derived) = self.derived {
                    return Ok(derived);
                }
            }
            AccumulatorState::Idle => {
                return Err(InvalidStateError {
                    state: self.state,
                    operation: "finalize",
                })
            }
            AccumulatorState::Accumulating => {}
        }

        let derived = DerivedMetrics::from_counters(&self.counters);
        self.state = AccumulatorState::Finalized;
        self.finished_at = Some(Local::now());
        self.derived = Some(derived);
        Ok(derived)
    }

    pub fn race(&self) -> &str {
        &self.race
    }

    pub fn state(&self) -> AccumulatorState {
        self.state
    }

    pub fn counters(&self) -> &ConfusionCounters {
        &self.counters
    }

    pub fn started_at(&self) -> Option<DateTime<Local>> {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Local>> {
        self.finished_at
    }

    fn expect_state(
        &self,
        expected: AccumulatorState,
        operation: &'static str,
    ) -> Result<(), InvalidStateError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(InvalidStateError {
                state: self.state,
                operation,
            })
        }
    }
}
