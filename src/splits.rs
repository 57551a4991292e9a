use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::constants::splits::{ALL_SPLITS, SUBJECT_SEPARATOR};
use crate::errors::ShardError;
use crate::types::SubjectId;

/// Logical dataset partitions written by the pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitLabel {
    /// Training split.
    Train,
    /// Test split.
    Test,
    /// Evaluation split.
    Evaluation,
}

impl SplitLabel {
    /// Name used in output file names and logs.
    pub fn name(self) -> &'static str {
        match self {
            SplitLabel::Train => "train",
            SplitLabel::Test => "test",
            SplitLabel::Evaluation => "evaluation",
        }
    }
}

impl fmt::Display for SplitLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SplitLabel {
    type Err = ShardError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        ALL_SPLITS
            .into_iter()
            .find(|label| label.name() == raw)
            .ok_or_else(|| ShardError::Config(format!("unknown split '{raw}'")))
    }
}

/// What to do when a test/evaluation split ends up with no files.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptySplitPolicy {
    /// An empty identifier set means an empty split.
    #[default]
    Allow,
    /// Empty test/evaluation identifier sets or file lists are a partition error.
    Reject,
}

/// Subject identifier for a source file: the file-name token before the first `_`.
///
/// A name without a separator is its own identifier.
pub fn subject_id(path: &Path) -> Option<&str> {
    let name = path.file_name()?.to_str()?;
    name.split(SUBJECT_SEPARATOR).next()
}

/// Subject-level split assignment.
///
/// Test and evaluation membership is explicit; every other subject is train.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitAssignment {
    test_ids: BTreeSet<SubjectId>,
    eval_ids: BTreeSet<SubjectId>,
    policy: EmptySplitPolicy,
}

impl SplitAssignment {
    /// Create an assignment; rejects a subject listed in both test and evaluation.
    pub fn new<T, E>(test_ids: T, eval_ids: E) -> Result<Self, ShardError>
    where
        T: IntoIterator,
        T::Item: Into<SubjectId>,
        E: IntoIterator,
        E::Item: Into<SubjectId>,
    {
        let test_ids: BTreeSet<SubjectId> = test_ids.into_iter().map(Into::into).collect();
        let eval_ids: BTreeSet<SubjectId> = eval_ids.into_iter().map(Into::into).collect();
        let shared: Vec<&str> = test_ids
            .intersection(&eval_ids)
            .map(String::as_str)
            .collect();
        if !shared.is_empty() {
            return Err(ShardError::Partition(format!(
                "subjects assigned to both test and evaluation: {}",
                shared.join(", ")
            )));
        }
        Ok(Self {
            test_ids,
            eval_ids,
            policy: EmptySplitPolicy::default(),
        })
    }

    /// Override the empty-split policy.
    pub fn with_policy(mut self, policy: EmptySplitPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Configured test identifiers.
    pub fn test_ids(&self) -> &BTreeSet<SubjectId> {
        &self.test_ids
    }

    /// Configured evaluation identifiers.
    pub fn eval_ids(&self) -> &BTreeSet<SubjectId> {
        &self.eval_ids
    }

    /// Configured empty-split policy.
    pub fn policy(&self) -> EmptySplitPolicy {
        self.policy
    }

    /// Split that owns `subject`.
    pub fn label_for(&self, subject: &str) -> SplitLabel {
        if self.test_ids.contains(subject) {
            SplitLabel::Test
        } else if self.eval_ids.contains(subject) {
            SplitLabel::Evaluation
        } else {
            SplitLabel::Train
        }
    }

    /// Train subjects among `all`: `all - (test ∪ eval)`.
    pub fn train_subjects<'a, I>(&self, all: I) -> BTreeSet<SubjectId>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let held_out: BTreeSet<&str> = self
            .test_ids
            .union(&self.eval_ids)
            .map(String::as_str)
            .collect();
        all.into_iter()
            .filter(|id| !held_out.contains(id))
            .map(str::to_string)
            .collect()
    }

    /// Files belonging to `split`, in sorted path order.
    ///
    /// Test and evaluation select by identifier membership; train selects
    /// the subjects returned by `train_subjects` over every file's subject.
    pub fn partition(&self, files: &[PathBuf], split: SplitLabel) -> Result<Vec<PathBuf>, ShardError> {
        self.check_ids(split)?;
        let subjects = files
            .iter()
            .map(|path| {
                subject_id(path).ok_or_else(|| {
                    ShardError::Partition(format!(
                        "cannot derive subject identifier from '{}'",
                        path.display()
                    ))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let train;
        let members = match split {
            SplitLabel::Train => {
                train = self.train_subjects(subjects.iter().copied());
                &train
            }
            SplitLabel::Test => &self.test_ids,
            SplitLabel::Evaluation => &self.eval_ids,
        };
        let mut selected: Vec<PathBuf> = files
            .iter()
            .zip(&subjects)
            .filter(|(_, subject)| members.contains(**subject))
            .map(|(path, _)| path.clone())
            .collect();
        selected.sort();
        if selected.is_empty() && split != SplitLabel::Train && self.policy == EmptySplitPolicy::Reject {
            return Err(ShardError::Partition(format!(
                "no source files matched the {split} identifiers"
            )));
        }
        Ok(selected)
    }

    /// Partition `files` into every split at once.
    pub fn partition_all(&self, files: &[PathBuf]) -> Result<SplitPlan, ShardError> {
        let mut splits = BTreeMap::new();
        for label in ALL_SPLITS {
            splits.insert(label, self.partition(files, label)?);
        }
        Ok(SplitPlan { splits })
    }

    fn check_ids(&self, split: SplitLabel) -> Result<(), ShardError> {
        if self.policy != EmptySplitPolicy::Reject {
            return Ok(());
        }
        let ids = match split {
            SplitLabel::Train => return Ok(()),
            SplitLabel::Test => &self.test_ids,
            SplitLabel::Evaluation => &self.eval_ids,
        };
        if ids.is_empty() {
            return Err(ShardError::Partition(format!(
                "no {split} subject identifiers configured"
            )));
        }
        Ok(())
    }
}

/// File lists for every split.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SplitPlan {
    splits: BTreeMap<SplitLabel, Vec<PathBuf>>,
}

impl SplitPlan {
    /// Files assigned to `split`.
    pub fn files(&self, split: SplitLabel) -> &[PathBuf] {
        self.splits.get(&split).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Total files across all splits.
    pub fn total_files(&self) -> usize {
        self.splits.values().map(Vec::len).sum()
    }

    /// Iterate splits in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = (SplitLabel, &[PathBuf])> {
        ALL_SPLITS
            .into_iter()
            .map(move |label| (label, self.files(label)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn paths(names: &[&str]) -> Vec<PathBuf> {
        names.iter().map(|name| PathBuf::from("/src").join(name)).collect()
    }

    #[test]
    fn subject_id_is_prefix_before_first_separator() {
        assert_eq!(
            subject_id(Path::new("/x/d847614e-4_walk_01.bin")),
            Some("d847614e-4")
        );
        assert_eq!(subject_id(Path::new("plain.bin")), Some("plain.bin"));
        assert_eq!(subject_id(Path::new("/")), None);
    }

    #[test]
    fn split_label_round_trips_through_name() {
        for label in ALL_SPLITS {
            assert_eq!(label.name().parse::<SplitLabel>().unwrap(), label);
        }
        assert!("validation".parse::<SplitLabel>().is_err());
    }

    #[test]
    fn overlapping_identifier_sets_are_rejected() {
        let err = SplitAssignment::new(["a", "b"], ["b"]).unwrap_err();
        assert!(matches!(err, ShardError::Partition(ref msg) if msg.contains('b')));
    }

    #[test]
    fn partition_is_total_and_disjoint() {
        let files = paths(&[
            "s3_a.bin", "s1_a.bin", "s2_a.bin", "s1_b.bin", "s4_a.bin", "s2_b.bin",
        ]);
        let assignment = SplitAssignment::new(["s2"], ["s3"]).unwrap();
        let plan = assignment.partition_all(&files).unwrap();

        let mut seen = HashSet::new();
        for (_, split_files) in plan.iter() {
            for path in split_files {
                assert!(seen.insert(path.clone()), "{} claimed twice", path.display());
            }
        }
        assert_eq!(seen.len(), files.len());
        assert_eq!(plan.total_files(), files.len());

        assert_eq!(plan.files(SplitLabel::Test), paths(&["s2_a.bin", "s2_b.bin"]).as_slice());
        assert_eq!(plan.files(SplitLabel::Evaluation), paths(&["s3_a.bin"]).as_slice());
        assert_eq!(
            plan.files(SplitLabel::Train),
            paths(&["s1_a.bin", "s1_b.bin", "s4_a.bin"]).as_slice()
        );
    }

    #[test]
    fn empty_sets_yield_empty_held_out_splits() {
        let files = paths(&["s1_a.bin", "s2_a.bin"]);
        let assignment = SplitAssignment::default();
        assert!(assignment.partition(&files, SplitLabel::Test).unwrap().is_empty());
        assert!(assignment.partition(&files, SplitLabel::Evaluation).unwrap().is_empty());
        assert_eq!(assignment.partition(&files, SplitLabel::Train).unwrap().len(), 2);
    }

    #[test]
    fn reject_policy_flags_missing_identifiers() {
        let files = paths(&["s1_a.bin"]);
        let assignment = SplitAssignment::new(Vec::<String>::new(), ["s9"])
            .unwrap()
            .with_policy(EmptySplitPolicy::Reject);
        let err = assignment.partition(&files, SplitLabel::Test).unwrap_err();
        assert!(matches!(err, ShardError::Partition(ref msg) if msg.contains("test")));
        // Identifiers configured but no matching files.
        let err = assignment.partition(&files, SplitLabel::Evaluation).unwrap_err();
        assert!(matches!(err, ShardError::Partition(ref msg) if msg.contains("no source files")));
        assert_eq!(assignment.partition(&files, SplitLabel::Train).unwrap().len(), 1);
    }

    #[test]
    fn train_subjects_excludes_union_of_held_out_sets() {
        let assignment = SplitAssignment::new(["b"], ["c"]).unwrap();
        let train = assignment.train_subjects(["a", "b", "c", "d"]);
        assert_eq!(
            train.into_iter().collect::<Vec<_>>(),
            vec!["a".to_string(), "d".to_string()]
        );
    }

    #[test]
    fn train_partition_matches_train_subjects() {
        let files = paths(&["s5_a.bin", "s1_a.bin", "s2_a.bin", "s3_a.bin", "s1_b.bin"]);
        let assignment = SplitAssignment::new(["s2", "s9"], ["s3"]).unwrap();
        let subjects = files.iter().filter_map(|path| subject_id(path));
        let train = assignment.train_subjects(subjects);

        let selected = assignment.partition(&files, SplitLabel::Train).unwrap();
        let selected_subjects: BTreeSet<SubjectId> = selected
            .iter()
            .filter_map(|path| subject_id(path))
            .map(str::to_string)
            .collect();
        assert_eq!(selected_subjects, train);
        assert_eq!(selected, paths(&["s1_a.bin", "s1_b.bin", "s5_a.bin"]));
    }

    #[test]
    fn unparseable_file_name_is_a_partition_error() {
        let files = vec![PathBuf::from("/")];
        let err = SplitAssignment::default()
            .partition(&files, SplitLabel::Train)
            .unwrap_err();
        assert!(matches!(err, ShardError::Partition(_)));
    }
}
