//! RFW people/pairs index files.
//!
//! Each race ships two tab-separated files:
//!
//! ```text
//! <race>_people.txt   m.0c7mh2\t5
//! <race>_pairs.txt    m.0c7mh2\t1\t4               (same identity)
//!                     m.0c7mh2\t2\tm.0dg3p5\t1     (different identities)
//! ```
//!
//! The pairs file mixes both shapes. A load selects one [`PairMode`] up front
//! and keeps only lines of that shape; lines of the other shape are counted
//! but never reinterpreted.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{HarnessError, ParseError};

/// Which pair shape a run consumes from the pairs file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PairMode {
    /// 3-field lines: genuine pairs within one folder; every in-folder
    /// combination is tested.
    ///
    /// Combinations the pairs file does not list count as impostor pairs,
    /// even though both photos come from one folder. That matches RFW's
    /// pairs file, which lists only selected genuine pairs; other datasets
    /// may need different ground truth.
    #[serde(alias = "intra-group")]
    Intra,
    /// 4-field lines: explicit pairs across two folders, all impostors.
    #[serde(alias = "cross-group")]
    Cross,
}

impl fmt::Display for PairMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PairMode::Intra => f.write_str("intra"),
            PairMode::Cross => f.write_str("cross"),
        }
    }
}

impl FromStr for PairMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "intra" | "intra-group" => Ok(PairMode::Intra),
            "cross" | "cross-group" => Ok(PairMode::Cross),
            other => Err(format!("unknown pair mode {other:?} (expected intra or cross)")),
        }
    }
}

/// Photo count per folder, in people-file order.
#[derive(Debug, Clone, Default)]
pub struct GroupSizes {
    entries: Vec<(String, u32)>,
    positions: HashMap<String, usize>,
}

impl GroupSizes {
    /// Insert or overwrite a folder's photo count. A repeated folder keeps its
    /// first position so enumeration order stays stable.
    pub fn insert(&mut self, group: impl Into<String>, count: u32) {
        let group = group.into();
        match self.positions.get(&group) {
            Some(&pos) => self.entries[pos].1 = count,
            None => {
                self.positions.insert(group.clone(), self.entries.len());
                self.entries.push((group, count));
            }
        }
    }

    pub fn get(&self, group: &str) -> Option<u32> {
        self.positions.get(group).map(|&pos| self.entries[pos].1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.entries.iter().map(|(g, n)| (g.as_str(), *n))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total number of photos across all folders.
    pub fn total_photos(&self) -> u64 {
        self.entries.iter().map(|(_, n)| u64::from(*n)).sum()
    }
}

/// Listed same-identity index pairs, per folder, in file order.
#[derive(Debug, Clone, Default)]
pub struct GenuinePairSet {
    pairs: HashMap<String, Vec<(u32, u32)>>,
}

impl GenuinePairSet {
    pub fn insert(&mut self, group: impl Into<String>, index_a: u32, index_b: u32) {
        self.pairs
            .entry(group.into())
            .or_default()
            .push((index_a, index_b));
    }

    pub fn get(&self, group: &str) -> &[(u32, u32)] {
        self.pairs.get(group).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Whether (a, b) or (b, a) is listed for `group`.
    pub fn contains(&self, group: &str, a: u32, b: u32) -> bool {
        self.get(group)
            .iter()
            .any(|&(x, y)| (x == a && y == b) || (x == b && y == a))
    }

    /// Total listed pairs over all folders.
    pub fn len(&self) -> usize {
        self.pairs.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One 4-field pairs line: two photos from different folders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrossGroupPair {
    pub template_group: String,
    pub template_index: u32,
    pub test_group: String,
    pub test_index: u32,
}

/// Pair records kept for the selected mode.
#[derive(Debug, Clone)]
pub enum PairRecords {
    Intra(GenuinePairSet),
    Cross(Vec<CrossGroupPair>),
}

impl PairRecords {
    pub fn mode(&self) -> PairMode {
        match self {
            PairRecords::Intra(_) => PairMode::Intra,
            PairRecords::Cross(_) => PairMode::Cross,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            PairRecords::Intra(set) => set.len(),
            PairRecords::Cross(list) => list.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A skipped line, with enough context to find it again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseWarning {
    pub path: PathBuf,
    /// 1-based line number.
    pub line: usize,
    pub error: ParseError,
}

impl fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}: {}", self.path.display(), self.line, self.error)
    }
}

/// A classified pairs-file line.
#[derive(Debug, Clone, PartialEq, Eq)]
enum PairLine {
    Intra { group: String, index_a: u32, index_b: u32 },
    Cross(CrossGroupPair),
}

/// Parsed index for one race.
#[derive(Debug, Clone)]
pub struct PairIndex {
    pub sizes: GroupSizes,
    pub records: PairRecords,
    pub warnings: Vec<ParseWarning>,
    /// Well-formed pairs lines of the shape the selected mode ignores.
    pub other_shape: usize,
}

impl PairIndex {
    /// Load a race's people and pairs files.
    ///
    /// Malformed lines are skipped and recorded in `warnings`; only I/O
    /// failures abort the load.
    pub fn load(people_path: &Path, pairs_path: &Path, mode: PairMode) -> Result<Self, HarnessError> {
        let people = open(people_path)?;
        let pairs = open(pairs_path)?;
        let index = Self::from_readers(people, people_path, pairs, pairs_path, mode)?;

        tracing::info!(
            people = %people_path.display(),
            pairs = %pairs_path.display(),
            %mode,
            groups = index.sizes.len(),
            records = index.records.len(),
            skipped = index.skipped(),
            other_shape = index.other_shape,
            "loaded pair index"
        );

        Ok(index)
    }

    /// Parse from already-open readers. The paths only label warnings and
    /// I/O errors.
    pub fn from_readers(
        people: impl BufRead,
        people_path: &Path,
        pairs: impl BufRead,
        pairs_path: &Path,
        mode: PairMode,
    ) -> Result<Self, HarnessError> {
        let mut warnings = Vec::new();

        let mut sizes = GroupSizes::default();
        for_each_line(people, people_path, |line_no, line| {
            match parse_people_line(line) {
                Ok((group, count)) => sizes.insert(group, count),
                Err(error) => warnings.push(warn(people_path, line_no, error)),
            }
        })?;

        let mut genuine = GenuinePairSet::default();
        let mut cross = Vec::new();
        let mut other_shape = 0usize;
        for_each_line(pairs, pairs_path, |line_no, line| {
            match (parse_pair_line(line), mode) {
                (Ok(PairLine::Intra { group, index_a, index_b }), PairMode::Intra) => {
                    genuine.insert(group, index_a, index_b)
                }
                (Ok(PairLine::Cross(pair)), PairMode::Cross) => cross.push(pair),
                (Ok(_), _) => other_shape += 1,
                (Err(error), _) => warnings.push(warn(pairs_path, line_no, error)),
            }
        })?;

        let records = match mode {
            PairMode::Intra => PairRecords::Intra(genuine),
            PairMode::Cross => PairRecords::Cross(cross),
        };

        Ok(Self {
            sizes,
            records,
            warnings,
            other_shape,
        })
    }

    pub fn mode(&self) -> PairMode {
        self.records.mode()
    }

    /// Number of malformed lines skipped across both files.
    pub fn skipped(&self) -> usize {
        self.warnings.len()
    }
}

fn open(path: &Path) -> Result<BufReader<File>, HarnessError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|source| HarnessError::ReadIndex {
            path: path.to_path_buf(),
            source,
        })
}

/// Feed every non-blank line (1-based numbering) to `f`.
fn for_each_line(
    reader: impl BufRead,
    path: &Path,
    mut f: impl FnMut(usize, &str),
) -> Result<(), HarnessError> {
    for (i, line) in reader.lines().enumerate() {
        let line = line.map_err(|source| HarnessError::ReadIndex {
            path: path.to_path_buf(),
            source,
        })?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        f(i + 1, line);
    }
    Ok(())
}

fn warn(path: &Path, line: usize, error: ParseError) -> ParseWarning {
    tracing::warn!(path = %path.display(), line, %error, "skipping malformed index line");
    ParseWarning {
        path: path.to_path_buf(),
        line,
        error,
    }
}

/// Parse `"<group>\t<count>"`.
pub fn parse_people_line(line: &str) -> Result<(String, u32), ParseError> {
    let fields: Vec<&str> = line.trim().split('\t').collect();
    let [group, count] = fields.as_slice() else {
        return Err(ParseError::FieldCount {
            expected: "2",
            actual: fields.len(),
        });
    };
    Ok((group_id(group)?, number("photo count", count)?))
}

fn parse_pair_line(line: &str) -> Result<PairLine, ParseError> {
    let fields: Vec<&str> = line.trim().split('\t').collect();
    match fields.as_slice() {
        [group, a, b] => Ok(PairLine::Intra {
            group: group_id(group)?,
            index_a: number("image index", a)?,
            index_b: number("image index", b)?,
        }),
        [group_a, a, group_b, b] => Ok(PairLine::Cross(CrossGroupPair {
            template_group: group_id(group_a)?,
            template_index: number("image index", a)?,
            test_group: group_id(group_b)?,
            test_index: number("image index", b)?,
        })),
        _ => Err(ParseError::FieldCount {
            expected: "3 or 4",
            actual: fields.len(),
        }),
    }
}

fn group_id(field: &str) -> Result<String, ParseError> {
    let field = field.trim();
    if field.is_empty() {
        return Err(ParseError::EmptyGroup);
    }
    Ok(field.to_string())
}

fn number(field: &'static str, value: &str) -> Result<u32, ParseError> {
    value.trim().parse().map_err(|_| ParseError::InvalidNumber {
        field,
        value: value.to_string(),
    })
}
