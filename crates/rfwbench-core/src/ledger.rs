//! Exception ledger: pairs (and reports) that could not be evaluated.

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

/// One skipped pair or failed report write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerEntry {
    pub error: String,
    pub race: String,
    /// Position of the pair in the race's enumeration order.
    pub index_in_loop: Option<u64>,
    /// Template folder, or the model/detector pair for report failures.
    pub context: Vec<String>,
    pub paths: Vec<PathBuf>,
}

impl fmt::Display for LedgerEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\t{}", self.error.replace(['\n', '\t'], " "), self.race)?;
        if let Some(index) = self.index_in_loop {
            write!(f, "\t{index}")?;
        }
        for item in &self.context {
            write!(f, "\t{item}")?;
        }
        for path in &self.paths {
            write!(f, "\t{}", path.display())?;
        }
        Ok(())
    }
}

/// Append-only record of failures for one run.
///
/// Owned by the caller and passed into each race run, so nothing here is
/// process-global.
#[derive(Debug, Clone, Default)]
pub struct ExceptionLedger {
    entries: Vec<LedgerEntry>,
}

impl ExceptionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a verification failure for one pair.
    pub fn record_pair(
        &mut self,
        error: impl fmt::Display,
        race: &str,
        index_in_loop: u64,
        folder: &str,
        template: PathBuf,
        test: PathBuf,
    ) {
        self.entries.push(LedgerEntry {
            error: error.to_string(),
            race: race.to_string(),
            index_in_loop: Some(index_in_loop),
            context: vec![folder.to_string()],
            paths: vec![template, test],
        });
    }

    /// Record a failure that is not tied to a single pair, such as a summary
    /// report that could not be written.
    pub fn record_other(&mut self, error: impl fmt::Display, race: &str, context: Vec<String>) {
        self.entries.push(LedgerEntry {
            error: error.to_string(),
            race: race.to_string(),
            index_in_loop: None,
            context,
            paths: Vec::new(),
        });
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries recorded for one race.
    pub fn count_for(&self, race: &str) -> usize {
        self.entries.iter().filter(|e| e.race == race).count()
    }
}
