//! Sequential benchmark loop: one race, one pair at a time.

use std::path::Path;
use std::time::Instant;

use crate::enumerate::{EnumerationLimits, PairEnumerator};
use crate::error::HarnessError;
use crate::index::{PairIndex, PairMode};
use crate::layout::DatasetLayout;
use crate::ledger::ExceptionLedger;
use crate::metrics::MetricsAccumulator;
use crate::report::{write_ledger, PartitionReport, ReportPaths, ResultsWriter, RunReport};
use crate::verify::{DetectorId, DistanceMetric, ModelId, Verifier, VerifyRequest};

/// What to run: the model under test and how pairs are chosen.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub model: ModelId,
    pub detector: DetectorId,
    pub distance_metric: Option<DistanceMetric>,
    pub mode: PairMode,
    pub limits: EnumerationLimits,
}

/// Drives a [`Verifier`] over RFW races and writes the reports.
pub struct Harness<V> {
    verifier: V,
    layout: DatasetLayout,
    paths: ReportPaths,
    settings: RunSettings,
}

impl<V: Verifier> Harness<V> {
    pub fn new(verifier: V, layout: DatasetLayout, output_root: &Path, settings: RunSettings) -> Self {
        let paths = ReportPaths::new(output_root, &settings.model);
        Self {
            verifier,
            layout,
            paths,
            settings,
        }
    }

    pub fn paths(&self) -> &ReportPaths {
        &self.paths
    }

    /// Run every race in order, then write the summary and the ledger.
    ///
    /// The ledger file is rewritten after each race. If a race fails, the
    /// summary and ledger of the races already finished are still written
    /// before the error is returned. A summary that cannot be written is
    /// logged to the ledger rather than aborting; a ledger that cannot be
    /// written is fatal.
    pub fn run<S: AsRef<str>>(
        &mut self,
        races: &[S],
    ) -> Result<(RunReport, ExceptionLedger), HarnessError> {
        self.paths.prepare()?;

        let mut ledger = ExceptionLedger::new();
        let mut partitions = Vec::with_capacity(races.len());
        for race in races {
            let race = race.as_ref();
            match self.run_partition(race, &mut ledger) {
                Ok(partition) => partitions.push(partition),
                Err(error) => {
                    tracing::error!(race, %error, "race aborted; saving finished races");
                    let report = self.report(partitions);
                    if let Err(save_error) = self.save(&report, &mut ledger) {
                        tracing::error!(error = %save_error, "failed to save partial results");
                    }
                    return Err(error);
                }
            }
            write_ledger(&self.paths.exceptions(), &ledger)?;
        }

        let report = self.report(partitions);
        self.save(&report, &mut ledger)?;
        tracing::info!(
            dir = %self.paths.dir().display(),
            exceptions = ledger.len(),
            "run complete"
        );

        Ok((report, ledger))
    }

    fn report(&self, partitions: Vec<PartitionReport>) -> RunReport {
        RunReport {
            model: self.settings.model.clone(),
            detector: self.settings.detector.clone(),
            distance_metric: self.settings.distance_metric,
            partitions,
        }
    }

    fn save(&self, report: &RunReport, ledger: &mut ExceptionLedger) -> Result<(), HarnessError> {
        if let Err(error) = report.write_summary(&self.paths) {
            tracing::error!(%error, "failed to write run summary");
            for p in &report.partitions {
                ledger.record_other(
                    &error,
                    &p.race,
                    vec![report.model.to_string(), report.detector.to_string()],
                );
            }
        }
        write_ledger(&self.paths.exceptions(), ledger)
    }

    /// Test every enumerated pair of one race.
    ///
    /// Verification failures go to `ledger` and are left out of the metrics.
    /// The race's results file is closed before this returns, on every path.
    pub fn run_partition(
        &mut self,
        race: &str,
        ledger: &mut ExceptionLedger,
    ) -> Result<PartitionReport, HarnessError> {
        let settings = &self.settings;
        let index = PairIndex::load(
            &self.layout.people_file(race),
            &self.layout.pairs_file(race),
            settings.mode,
        )?;

        let enumerator = PairEnumerator::new(&index, settings.limits);
        tracing::info!(
            race,
            mode = %settings.mode,
            model = %settings.model,
            detector = %settings.detector,
            planned = enumerator.planned(),
            "testing race"
        );

        let mut accumulator = MetricsAccumulator::new(race);
        accumulator.start()?;
        let mut results = ResultsWriter::create(&self.paths.results(race), settings.mode)?;
        let mut skipped = 0usize;

        for pair in enumerator {
            let template = self
                .layout
                .image_path(race, pair.template.folder, pair.template.index);
            let test = self.layout.image_path(race, pair.test.folder, pair.test.index);

            let request = VerifyRequest {
                image_a: &template,
                image_b: &test,
                model: &settings.model,
                detector: &settings.detector,
                distance_metric: settings.distance_metric,
            };

            let started = Instant::now();
            match self.verifier.verify(&request) {
                Ok(verdict) => {
                    let elapsed = started.elapsed();
                    let outcome = accumulator.record(pair.genuine, verdict.verified, elapsed)?;
                    results.write_pair(&pair, verdict.verified, outcome, elapsed)?;
                    tracing::debug!(
                        race,
                        seq = pair.sequence,
                        template = %template.display(),
                        test = %test.display(),
                        genuine = pair.genuine,
                        verified = verdict.verified,
                        distance = verdict.distance,
                        %outcome,
                        elapsed_ms = elapsed.as_millis() as u64,
                        "pair verified"
                    );
                }
                Err(error) => {
                    tracing::warn!(
                        race,
                        seq = pair.sequence,
                        template = %template.display(),
                        test = %test.display(),
                        %error,
                        "verification failed; pair skipped"
                    );
                    ledger.record_pair(
                        &error,
                        race,
                        pair.sequence,
                        pair.template.folder,
                        template,
                        test,
                    );
                    skipped += 1;
                }
            }
        }

        results.finish()?;
        let metrics = accumulator.finalize()?;
        let counters = accumulator.counters();
        tracing::info!(
            race,
            tp = counters.true_positive(),
            tn = counters.true_negative(),
            fp = counters.false_positive(),
            fn_ = counters.false_negative(),
            skipped,
            accuracy = %metrics.accuracy,
            "race finished"
        );

        Ok(PartitionReport::new(
            &accumulator,
            metrics,
            settings.mode,
            skipped,
            index.skipped(),
        ))
    }
}
