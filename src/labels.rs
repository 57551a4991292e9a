use indexmap::IndexMap;
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::constants::labels::{FULL_PROFILE, REDUCED_PROFILE};
use crate::errors::ShardError;
use crate::types::LabelCode;

/// Label encoding profiles.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelProfile {
    /// 18-class full-resolution table.
    Full,
    /// 10-class reduced-resolution table.
    #[default]
    Reduced,
}

impl LabelProfile {
    /// Declared `(name, code)` table for this profile.
    pub fn table(self) -> &'static [(&'static str, LabelCode)] {
        match self {
            LabelProfile::Full => FULL_PROFILE,
            LabelProfile::Reduced => REDUCED_PROFILE,
        }
    }

    /// Stable lowercase profile name.
    pub fn name(self) -> &'static str {
        match self {
            LabelProfile::Full => "full",
            LabelProfile::Reduced => "reduced",
        }
    }
}

impl fmt::Display for LabelProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Bidirectional mapping between label names and dense integer codes.
///
/// The table is checked once at construction: codes must cover `0..K` with
/// no gaps and no duplicates, and names must be unique. Encoding afterwards
/// is a single lookup.
#[derive(Clone, Debug)]
pub struct LabelEncoder {
    codes: IndexMap<&'static str, LabelCode>,
    names: Vec<&'static str>,
}

impl LabelEncoder {
    /// Build the encoder for a built-in profile.
    pub fn for_profile(profile: LabelProfile) -> Result<Self, ShardError> {
        Self::from_table(profile.table())
    }

    /// Build an encoder from an explicit `(name, code)` table.
    pub fn from_table(table: &[(&'static str, LabelCode)]) -> Result<Self, ShardError> {
        if table.is_empty() {
            return Err(ShardError::Config("label table is empty".into()));
        }
        let mut codes = IndexMap::with_capacity(table.len());
        let mut names: Vec<Option<&'static str>> = vec![None; table.len()];
        for &(name, code) in table {
            let slot = usize::try_from(code)
                .ok()
                .filter(|idx| *idx < table.len())
                .ok_or_else(|| {
                    ShardError::Config(format!(
                        "label '{name}' has code {code} outside 0..{}",
                        table.len()
                    ))
                })?;
            if let Some(existing) = names[slot] {
                return Err(ShardError::Config(format!(
                    "label code {code} assigned to both '{existing}' and '{name}'"
                )));
            }
            if codes.insert(name, code).is_some() {
                return Err(ShardError::Config(format!(
                    "label '{name}' declared more than once"
                )));
            }
            names[slot] = Some(name);
        }
        // Every slot is filled: `table.len()` distinct codes in `0..table.len()`.
        let names = names.into_iter().flatten().collect();
        Ok(Self {
            codes,
            names,
        })
    }

    /// Number of classes `K`.
    pub fn num_classes(&self) -> usize {
        self.names.len()
    }

    /// Encode a label name.
    pub fn encode(&self, label: &str) -> Result<LabelCode, ShardError> {
        self.codes
            .get(label)
            .copied()
            .ok_or_else(|| ShardError::UnknownLabel(label.to_string()))
    }

    /// Label name for `code`, if it is in range.
    pub fn decode(&self, code: LabelCode) -> Option<&'static str> {
        usize::try_from(code)
            .ok()
            .and_then(|idx| self.names.get(idx))
            .copied()
    }

    /// Expand `code` to a one-hot vector of width `K`.
    pub fn one_hot(&self, code: LabelCode) -> Result<Array1<f32>, ShardError> {
        let idx = usize::try_from(code)
            .ok()
            .filter(|idx| *idx < self.num_classes())
            .ok_or_else(|| ShardError::ShapeMismatch {
                context: "one-hot label".into(),
                expected: format!("code in 0..{}", self.num_classes()),
                actual: code.to_string(),
            })?;
        let mut vector = Array1::zeros(self.num_classes());
        vector[idx] = 1.0;
        Ok(vector)
    }

    /// Label names in declaration order.
    pub fn labels(&self) -> impl Iterator<Item = (&'static str, LabelCode)> + '_ {
        self.codes.iter().map(|(name, code)| (*name, *code))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn builtin_profiles_are_dense() {
        for (profile, expected) in [(LabelProfile::Full, 18), (LabelProfile::Reduced, 10)] {
            let encoder = LabelEncoder::for_profile(profile).unwrap();
            assert_eq!(encoder.num_classes(), expected);
            let codes: HashSet<LabelCode> = encoder.labels().map(|(_, code)| code).collect();
            assert_eq!(codes.len(), expected);
            for code in 0..expected as LabelCode {
                assert!(codes.contains(&code), "{profile} missing code {code}");
                let name = encoder.decode(code).unwrap();
                assert_eq!(encoder.encode(name).unwrap(), code);
            }
        }
    }

    #[test]
    fn reduced_profile_matches_writer_codes() {
        let encoder = LabelEncoder::for_profile(LabelProfile::Reduced).unwrap();
        assert_eq!(encoder.encode("backpack_activity_step").unwrap(), 0);
        assert_eq!(encoder.encode("texting_activity_step").unwrap(), 9);
        let full = LabelEncoder::for_profile(LabelProfile::Full).unwrap();
        assert_eq!(full.encode("texting_activity_step").unwrap(), 10);
        assert_eq!(full.encode("listening_voice_message_activity_step").unwrap(), 17);
    }

    #[test]
    fn unknown_label_is_an_error() {
        let encoder = LabelEncoder::for_profile(LabelProfile::Reduced).unwrap();
        // Present in the full table only.
        let err = encoder.encode("back_right_pocket_activity_step").unwrap_err();
        assert!(matches!(
            err,
            ShardError::UnknownLabel(ref label) if label == "back_right_pocket_activity_step"
        ));
    }

    #[test]
    fn table_with_gap_is_rejected() {
        let err = LabelEncoder::from_table(&[("a", 0), ("b", 2)]).unwrap_err();
        assert!(matches!(err, ShardError::Config(ref msg) if msg.contains("outside")));
    }

    #[test]
    fn table_with_duplicate_code_is_rejected() {
        let err = LabelEncoder::from_table(&[("a", 0), ("b", 0)]).unwrap_err();
        assert!(matches!(err, ShardError::Config(ref msg) if msg.contains("both")));
    }

    #[test]
    fn table_with_duplicate_name_is_rejected() {
        let err = LabelEncoder::from_table(&[("a", 0), ("a", 1)]).unwrap_err();
        assert!(matches!(err, ShardError::Config(ref msg) if msg.contains("more than once")));
    }

    #[test]
    fn one_hot_marks_single_position() {
        let encoder = LabelEncoder::for_profile(LabelProfile::Reduced).unwrap();
        let vector = encoder.one_hot(3).unwrap();
        assert_eq!(vector.len(), 10);
        assert_eq!(vector.sum(), 1.0);
        assert_eq!(vector[3], 1.0);
        assert!(encoder.one_hot(10).is_err());
        assert!(encoder.one_hot(-1).is_err());
    }
}
