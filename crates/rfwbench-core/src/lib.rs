//! rfwbench-core: benchmarking harness for face verification on RFW.
//!
//! Parses the per-race people/pairs index files, enumerates test pairs,
//! drives a [`Verifier`] over them and folds every outcome into per-race
//! confusion-matrix metrics. The verifier itself lives outside this crate.

pub mod enumerate;
pub mod error;
pub mod index;
pub mod layout;
pub mod ledger;
pub mod metrics;
pub mod report;
pub mod runner;
pub mod verify;

pub use enumerate::{EnumerationLimits, Pair, PairEnumerator, PhotoRef};
pub use error::{HarnessError, InvalidStateError, ParseError, VerificationFailure};
pub use index::{
    CrossGroupPair, GenuinePairSet, GroupSizes, PairIndex, PairMode, PairRecords, ParseWarning,
};
pub use layout::DatasetLayout;
pub use ledger::{ExceptionLedger, LedgerEntry};
pub use metrics::{
    AccumulatorState, ConfusionCounters, DerivedMetrics, Measure, MetricsAccumulator, Outcome,
};
pub use report::{PartitionReport, ReportPaths, ResultsWriter, RunReport};
pub use runner::{Harness, RunSettings};
pub use verify::{DetectorId, DistanceMetric, ModelId, Verdict, Verifier, VerifyRequest};

/// The four RFW demographic partitions.
pub const RFW_RACES: [&str; 4] = ["African", "Asian", "Caucasian", "Indian"];
