//! Test-pair enumeration.
//!
//! Intra mode walks every unordered `(i, j)`, `1 <= i < j <= N`, of each
//! folder in people-file order. A pair is genuine only if the pairs file lists
//! it (in either order); every other in-folder pair counts as an impostor.
//! That follows the dataset's protocol, where the pairs file alone asserts
//! identity, and is applied literally even though two unlisted photos from
//! one folder may well show the same person.
//!
//! Cross mode replays the 4-field records in file order, all impostors.
//!
//! Limits truncate in iteration order, never by sampling, so a rerun with the
//! same limits tests the same pairs.

use serde::Deserialize;

use crate::index::{CrossGroupPair, GenuinePairSet, GroupSizes, PairIndex, PairMode, PairRecords};

/// Caps on how many pairs a race run attempts. `None` means unlimited.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EnumerationLimits {
    /// Pairs per folder (intra mode only).
    pub per_group: Option<usize>,
    /// Folders visited, in people-file order (intra mode only).
    pub max_groups: Option<usize>,
    /// Pairs per race, both modes.
    pub per_partition: Option<usize>,
}

/// One photo: folder plus 1-based image index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhotoRef<'a> {
    pub folder: &'a str,
    pub index: u32,
}

/// A test pair with its ground truth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pair<'a> {
    /// 0-based position in this race's enumeration.
    pub sequence: u64,
    pub template: PhotoRef<'a>,
    pub test: PhotoRef<'a>,
    /// Ground truth: same identity.
    pub genuine: bool,
    pub mode: PairMode,
}

struct IntraCursor<'a> {
    groups: Vec<(&'a str, u32)>,
    genuine: &'a GenuinePairSet,
    per_group: Option<usize>,
    group: usize,
    i: u32,
    j: u32,
    taken_in_group: usize,
}

impl<'a> IntraCursor<'a> {
    fn next_pair(&mut self) -> Option<(&'a str, u32, u32, bool)> {
        loop {
            let &(folder, size) = self.groups.get(self.group)?;
            let group_full = self.per_group.is_some_and(|max| self.taken_in_group >= max);

            if group_full || self.i >= size {
                self.group += 1;
                self.i = 1;
                self.j = 2;
                self.taken_in_group = 0;
                continue;
            }
            if self.j > size {
                self.i += 1;
                self.j = self.i + 1;
                continue;
            }

            let (i, j) = (self.i, self.j);
            self.j += 1;
            self.taken_in_group += 1;
            return Some((folder, i, j, self.genuine.contains(folder, i, j)));
        }
    }
}

enum Source<'a> {
    Intra(IntraCursor<'a>),
    Cross(std::slice::Iter<'a, CrossGroupPair>),
}

/// Lazily yields the test pairs for one race.
pub struct PairEnumerator<'a> {
    source: Source<'a>,
    per_partition: Option<usize>,
    emitted: u64,
    planned: u64,
}

impl<'a> PairEnumerator<'a> {
    /// Enumerate in whichever mode `index` was loaded with.
    pub fn new(index: &'a PairIndex, limits: EnumerationLimits) -> Self {
        match &index.records {
            PairRecords::Intra(genuine) => Self::intra(&index.sizes, genuine, limits),
            PairRecords::Cross(pairs) => Self::cross(pairs, limits),
        }
    }

    pub fn intra(sizes: &'a GroupSizes, genuine: &'a GenuinePairSet, limits: EnumerationLimits) -> Self {
        let groups: Vec<(&'a str, u32)> = sizes
            .iter()
            .take(limits.max_groups.unwrap_or(usize::MAX))
            .collect();

        let planned: u64 = groups
            .iter()
            .map(|&(_, n)| {
                let all = combinations(n);
                limits.per_group.map_or(all, |max| all.min(max as u64))
            })
            .sum();

        Self {
            source: Source::Intra(IntraCursor {
                groups,
                genuine,
                per_group: limits.per_group,
                group: 0,
                i: 1,
                j: 2,
                taken_in_group: 0,
            }),
            per_partition: limits.per_partition,
            emitted: 0,
            planned: cap(planned, limits.per_partition),
        }
    }

    pub fn cross(pairs: &'a [CrossGroupPair], limits: EnumerationLimits) -> Self {
        Self {
            source: Source::Cross(pairs.iter()),
            per_partition: limits.per_partition,
            emitted: 0,
            planned: cap(pairs.len() as u64, limits.per_partition),
        }
    }

    /// Number of pairs this enumerator will yield in total.
    pub fn planned(&self) -> u64 {
        self.planned
    }
}

impl<'a> Iterator for PairEnumerator<'a> {
    type Item = Pair<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self
            .per_partition
            .is_some_and(|max| self.emitted >= max as u64)
        {
            return None;
        }

        let pair = match &mut self.source {
            Source::Intra(cursor) => {
                let (folder, i, j, genuine) = cursor.next_pair()?;
                Pair {
                    sequence: self.emitted,
                    template: PhotoRef { folder, index: i },
                    test: PhotoRef { folder, index: j },
                    genuine,
                    mode: PairMode::Intra,
                }
            }
            Source::Cross(iter) => {
                let record = iter.next()?;
                Pair {
                    sequence: self.emitted,
                    template: PhotoRef {
                        folder: &record.template_group,
                        index: record.template_index,
                    },
                    test: PhotoRef {
                        folder: &record.test_group,
                        index: record.test_index,
                    },
                    genuine: false,
                    mode: PairMode::Cross,
                }
            }
        };

        self.emitted += 1;
        Some(pair)
    }
}

/// C(n, 2)
fn combinations(n: u32) -> u64 {
    let n = u64::from(n);
    n * n.saturating_sub(1) / 2
}

fn cap(total: u64, limit: Option<usize>) -> u64 {
    limit.map_or(total, |max| total.min(max as u64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn sizes(entries: &[(&str, u32)]) -> GroupSizes {
        let mut sizes = GroupSizes::default();
        for &(g, n) in entries {
            sizes.insert(g, n);
        }
        sizes
    }

    fn indices(pairs: &[Pair<'_>]) -> Vec<(String, u32, u32)> {
        pairs
            .iter()
            .map(|p| (p.template.folder.to_string(), p.template.index, p.test.index))
            .collect()
    }

    #[test]
    fn test_intra_yields_every_combination_once() {
        for n in 0..8u32 {
            let sizes = sizes(&[("A", n)]);
            let genuine = GenuinePairSet::default();
            let pairs: Vec<Pair<'_>> =
                PairEnumerator::intra(&sizes, &genuine, EnumerationLimits::default()).collect();

            assert_eq!(pairs.len() as u64, u64::from(n) * u64::from(n.saturating_sub(1)) / 2);

            let unique: HashSet<(u32, u32)> =
                pairs.iter().map(|p| (p.template.index, p.test.index)).collect();
            assert_eq!(unique.len(), pairs.len());
            assert!(pairs.iter().all(|p| p.template.index < p.test.index));
            assert!(pairs.iter().all(|p| p.template.index >= 1 && p.test.index <= n));
        }
    }

    #[test]
    fn test_intra_order_and_sequence() {
        let sizes = sizes(&[("A", 3), ("B", 2)]);
        let genuine = GenuinePairSet::default();
        let pairs: Vec<Pair<'_>> =
            PairEnumerator::intra(&sizes, &genuine, EnumerationLimits::default()).collect();

        assert_eq!(
            indices(&pairs),
            vec![
                ("A".to_string(), 1, 2),
                ("A".to_string(), 1, 3),
                ("A".to_string(), 2, 3),
                ("B".to_string(), 1, 2),
            ]
        );
        let seq: Vec<u64> = pairs.iter().map(|p| p.sequence).collect();
        assert_eq!(seq, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_genuine_only_when_listed_either_order() {
        let sizes = sizes(&[("A", 4)]);
        let mut genuine = GenuinePairSet::default();
        genuine.insert("A", 1, 3);
        genuine.insert("A", 4, 2);

        let flagged: Vec<(u32, u32)> =
            PairEnumerator::intra(&sizes, &genuine, EnumerationLimits::default())
                .filter(|p| p.genuine)
                .map(|p| (p.template.index, p.test.index))
                .collect();
        assert_eq!(flagged, vec![(1, 3), (2, 4)]);
    }

    #[test]
    fn test_per_group_limit() {
        let sizes = sizes(&[("A", 4), ("B", 3)]);
        let genuine = GenuinePairSet::default();
        let limits = EnumerationLimits {
            per_group: Some(2),
            ..Default::default()
        };
        let enumerator = PairEnumerator::intra(&sizes, &genuine, limits);
        assert_eq!(enumerator.planned(), 4);
        let pairs: Vec<Pair<'_>> = enumerator.collect();
        assert_eq!(
            indices(&pairs),
            vec![
                ("A".to_string(), 1, 2),
                ("A".to_string(), 1, 3),
                ("B".to_string(), 1, 2),
                ("B".to_string(), 1, 3),
            ]
        );
    }

    #[test]
    fn test_max_groups_and_partition_limit() {
        let sizes = sizes(&[("A", 3), ("B", 3), ("C", 3)]);
        let genuine = GenuinePairSet::default();

        let limits = EnumerationLimits {
            max_groups: Some(2),
            ..Default::default()
        };
        assert_eq!(PairEnumerator::intra(&sizes, &genuine, limits).count(), 6);

        let limits = EnumerationLimits {
            per_partition: Some(4),
            ..Default::default()
        };
        let enumerator = PairEnumerator::intra(&sizes, &genuine, limits);
        assert_eq!(enumerator.planned(), 4);
        let pairs: Vec<Pair<'_>> = enumerator.collect();
        assert_eq!(pairs.len(), 4);
        assert_eq!(pairs[3].template.folder, "B");
    }

    #[test]
    fn test_limits_are_deterministic() {
        let sizes = sizes(&[("A", 5), ("B", 4)]);
        let genuine = GenuinePairSet::default();
        let limits = EnumerationLimits {
            per_group: Some(3),
            per_partition: Some(5),
            ..Default::default()
        };
        let first: Vec<Pair<'_>> = PairEnumerator::intra(&sizes, &genuine, limits).collect();
        let second: Vec<Pair<'_>> = PairEnumerator::intra(&sizes, &genuine, limits).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_cross_pairs_are_impostors_in_file_order() {
        let records = vec![
            CrossGroupPair {
                template_group: "A".into(),
                template_index: 2,
                test_group: "B".into(),
                test_index: 1,
            },
            CrossGroupPair {
                template_group: "C".into(),
                template_index: 1,
                test_group: "A".into(),
                test_index: 4,
            },
        ];
        let pairs: Vec<Pair<'_>> =
            PairEnumerator::cross(&records, EnumerationLimits::default()).collect();
        assert_eq!(pairs.len(), 2);
        assert!(pairs.iter().all(|p| !p.genuine && p.mode == PairMode::Cross));
        assert_eq!(pairs[1].template, PhotoRef { folder: "C", index: 1 });
        assert_eq!(pairs[1].test, PhotoRef { folder: "A", index: 4 });

        let limits = EnumerationLimits {
            per_partition: Some(1),
            ..Default::default()
        };
        assert_eq!(PairEnumerator::cross(&records, limits).count(), 1);
    }

    #[test]
    fn test_new_follows_index_mode() {
        let index = PairIndex::from_readers(
            "A\t3\n".as_bytes(),
            std::path::Path::new("people"),
            "A\t1\t2\nA\t1\tB\t2\n".as_bytes(),
            std::path::Path::new("pairs"),
            PairMode::Cross,
        )
        .unwrap();
        let pairs: Vec<Pair<'_>> = PairEnumerator::new(&index, EnumerationLimits::default()).collect();
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].test.folder, "B");
    }
}
