//! Text and JSON reports for a benchmark run.
//!
//! Output lands under `<output>/<model>/`:
//!
//! - `<race>_results.txt`: one tab-separated line per verified pair
//! - `race_results.txt` / `race_results.json`: per-race summary
//! - `exceptions.txt`: the exception ledger

use chrono::{DateTime, Local};
use serde::Serialize;
use std::fmt::Write as _;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::enumerate::Pair;
use crate::error::HarnessError;
use crate::index::PairMode;
use crate::ledger::ExceptionLedger;
use crate::metrics::{ConfusionCounters, DerivedMetrics, MetricsAccumulator, Outcome};
use crate::verify::{DetectorId, DistanceMetric, ModelId};

const INTRA_HEADER: &str = "Folder\tTemplate\tTest\tDifficult\tPredict\tResult\tTest Time";
const CROSS_HEADER: &str = "Template Folder\tTemplate\tTest Folder\tTest\tPredict\tResult\tTest Time";

/// Output file locations for one model.
#[derive(Debug, Clone)]
pub struct ReportPaths {
    dir: PathBuf,
}

impl ReportPaths {
    pub fn new(output_root: &Path, model: &ModelId) -> Self {
        Self {
            dir: output_root.join(model.as_str()),
        }
    }

    /// Create the output directory if needed.
    pub fn prepare(&self) -> Result<(), HarnessError> {
        std::fs::create_dir_all(&self.dir).map_err(|source| HarnessError::WriteReport {
            path: self.dir.clone(),
            source,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn results(&self, race: &str) -> PathBuf {
        self.dir.join(format!("{race}_results.txt"))
    }

    pub fn summary_text(&self) -> PathBuf {
        self.dir.join("race_results.txt")
    }

    pub fn summary_json(&self) -> PathBuf {
        self.dir.join("race_results.json")
    }

    pub fn exceptions(&self) -> PathBuf {
        self.dir.join("exceptions.txt")
    }
}

/// Per-pair results file for one race. Closed when dropped.
pub struct ResultsWriter {
    path: PathBuf,
    out: BufWriter<File>,
    mode: PairMode,
}

impl ResultsWriter {
    /// Create (truncating) the results file and write its header.
    pub fn create(path: &Path, mode: PairMode) -> Result<Self, HarnessError> {
        let file = File::create(path).map_err(|source| HarnessError::WriteReport {
            path: path.to_path_buf(),
            source,
        })?;
        let mut writer = Self {
            path: path.to_path_buf(),
            out: BufWriter::new(file),
            mode,
        };
        let header = match mode {
            PairMode::Intra => INTRA_HEADER,
            PairMode::Cross => CROSS_HEADER,
        };
        writer.write_line(header)?;
        Ok(writer)
    }

    pub fn write_pair(
        &mut self,
        pair: &Pair<'_>,
        predicted: bool,
        outcome: Outcome,
        elapsed: Duration,
    ) -> Result<(), HarnessError> {
        let line = format_pair_line(self.mode, pair, predicted, outcome, elapsed);
        self.write_line(&line)
    }

    /// Flush buffered lines to disk.
    pub fn finish(mut self) -> Result<(), HarnessError> {
        let path = self.path.clone();
        self.out
            .flush()
            .map_err(|source| HarnessError::WriteReport { path, source })
    }

    fn write_line(&mut self, line: &str) -> Result<(), HarnessError> {
        writeln!(self.out, "{line}").map_err(|source| HarnessError::WriteReport {
            path: self.path.clone(),
            source,
        })
    }
}

fn format_pair_line(
    mode: PairMode,
    pair: &Pair<'_>,
    predicted: bool,
    outcome: Outcome,
    elapsed: Duration,
) -> String {
    let secs = elapsed.as_secs_f64();
    match mode {
        PairMode::Intra => format!(
            "{}\t{}\t{}\t{}\t{}\t{}\t{secs:.3}",
            pair.template.folder,
            pair.template.index,
            pair.test.index,
            u8::from(pair.genuine),
            u8::from(predicted),
            outcome,
        ),
        PairMode::Cross => format!(
            "{}\t{}\t{}\t{}\t{}\t{}\t{secs:.3}",
            pair.template.folder,
            pair.template.index,
            pair.test.folder,
            pair.test.index,
            u8::from(predicted),
            outcome,
        ),
    }
}

/// Finished metrics for one race.
#[derive(Debug, Clone, Serialize)]
pub struct PartitionReport {
    pub race: String,
    pub mode: PairMode,
    pub counters: ConfusionCounters,
    pub positive_count: u64,
    pub negative_count: u64,
    pub metrics: DerivedMetrics,
    pub started_at: Option<DateTime<Local>>,
    pub finished_at: Option<DateTime<Local>>,
    /// Pairs the verifier failed on; excluded from the counters.
    pub skipped_pairs: usize,
    /// Malformed index lines skipped while loading.
    pub parse_warnings: usize,
}

impl PartitionReport {
    pub fn new(
        accumulator: &MetricsAccumulator,
        metrics: DerivedMetrics,
        mode: PairMode,
        skipped_pairs: usize,
        parse_warnings: usize,
    ) -> Self {
        let counters = *accumulator.counters();
        Self {
            race: accumulator.race().to_string(),
            mode,
            counters,
            positive_count: counters.positive_count(),
            negative_count: counters.negative_count(),
            metrics,
            started_at: accumulator.started_at(),
            finished_at: accumulator.finished_at(),
            skipped_pairs,
            parse_warnings,
        }
    }
}

/// Everything a run produced, for every race.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub model: ModelId,
    pub detector: DetectorId,
    pub distance_metric: Option<DistanceMetric>,
    pub partitions: Vec<PartitionReport>,
}

impl RunReport {
    /// Human-readable summary, also used for `race_results.txt`.
    pub fn format_summary(&self) -> String {
        let mut s = String::new();
        let _ = writeln!(s, "Model: {}", self.model);
        let _ = writeln!(s, "Detector: {}", self.detector);
        if let Some(metric) = self.distance_metric {
            let _ = writeln!(s, "Distance Metric: {metric}");
        }

        for p in &self.partitions {
            let c = &p.counters;
            let m = &p.metrics;
            let _ = writeln!(s, "\n{}", p.race);
            let _ = writeln!(s, "\tTrue Positive: {}", c.true_positive());
            let _ = writeln!(s, "\tTrue Negative: {}", c.true_negative());
            let _ = writeln!(s, "\tFalse Positive: {}", c.false_positive());
            let _ = writeln!(s, "\tFalse Negative: {}", c.false_negative());
            let _ = writeln!(s, "\tPositive Test Count: {}", p.positive_count);
            let _ = writeln!(s, "\tNegative Test Count: {}", p.negative_count);
            let _ = writeln!(s, "\tTotal Test Count: {}", c.total_count());
            let _ = writeln!(s, "\tStart Time: {}", format_time(p.started_at));
            let _ = writeln!(s, "\tEnd Time: {}", format_time(p.finished_at));
            let _ = writeln!(s, "\n\tTotal Test Time: {:.3}", c.total_time().as_secs_f64());
            let _ = writeln!(s, "\tAvg Test Time: {}\n", m.average_time_secs);
            let _ = writeln!(s, "\tF1 Score: {}", m.f1);
            let _ = writeln!(s, "\tAccuracy: {}", m.accuracy);
            let _ = writeln!(s, "\tRecall: {}", m.recall);
            let _ = writeln!(s, "\tPrecision: {}", m.precision);
            let _ = writeln!(s, "\tSpecificity: {}", m.specificity);
            let _ = writeln!(s, "\tSkipped Pairs: {}", p.skipped_pairs);
            let _ = writeln!(s, "\tMalformed Index Lines: {}", p.parse_warnings);
        }
        s
    }

    /// Write `race_results.txt` and `race_results.json`.
    pub fn write_summary(&self, paths: &ReportPaths) -> Result<(), HarnessError> {
        write_file(&paths.summary_text(), &self.format_summary())?;
        let json = serde_json::to_string_pretty(self)?;
        write_file(&paths.summary_json(), &json)
    }
}

fn format_time(t: Option<DateTime<Local>>) -> String {
    t.map(|t| t.format("%Y-%m-%d %H:%M:%S%.3f").to_string())
        .unwrap_or_default()
}

/// Write the ledger, one entry per line.
pub fn write_ledger(path: &Path, ledger: &ExceptionLedger) -> Result<(), HarnessError> {
    let mut text = String::new();
    for entry in ledger.entries() {
        let _ = writeln!(text, "{entry}");
    }
    write_file(path, &text)
}

fn write_file(path: &Path, contents: &str) -> Result<(), HarnessError> {
    std::fs::write(path, contents).map_err(|source| HarnessError::WriteReport {
        path: path.to_path_buf(),
        source,
    })
}
