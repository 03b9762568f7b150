//! Label files: one record per line, whitespace separated.
//!
//! ```text
//! 3 patient3/img-01.png COVID-19
//! 17 person17_virus.jpeg pneumonia
//! ```
//!
//! Only the first three tokens are read; extra columns are ignored.

use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{CovidNetError, Result};

pub const NUM_CLASSES: usize = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClassLabel {
    Normal,
    Pneumonia,
    Covid19,
}

impl ClassLabel {
    pub const ALL: [ClassLabel; NUM_CLASSES] =
        [ClassLabel::Normal, ClassLabel::Pneumonia, ClassLabel::Covid19];

    pub fn index(self) -> usize {
        match self {
            ClassLabel::Normal => 0,
            ClassLabel::Pneumonia => 1,
            ClassLabel::Covid19 => 2,
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Name as it appears in label files.
    pub fn as_str(self) -> &'static str {
        match self {
            ClassLabel::Normal => "normal",
            ClassLabel::Pneumonia => "pneumonia",
            ClassLabel::Covid19 => "COVID-19",
        }
    }

    /// Capitalized name used in metric reports.
    pub fn display_name(self) -> &'static str {
        match self {
            ClassLabel::Normal => "Normal",
            ClassLabel::Pneumonia => "Pneumonia",
            ClassLabel::Covid19 => "COVID-19",
        }
    }
}

impl FromStr for ClassLabel {
    type Err = CovidNetError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "normal" => Ok(ClassLabel::Normal),
            "pneumonia" => Ok(ClassLabel::Pneumonia),
            "COVID-19" => Ok(ClassLabel::Covid19),
            other => Err(CovidNetError::UnknownClass(other.to_string())),
        }
    }
}

impl fmt::Display for ClassLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelRecord {
    pub file_id: String,
    pub relative_path: String,
    pub class: ClassLabel,
}

impl LabelRecord {
    /// Parse one non-empty line. `line_no` is 1-based and only used for errors.
    pub fn parse_line(line: &str, line_no: usize) -> Result<Self> {
        let mut fields = line.split_whitespace();
        let (Some(file_id), Some(relative_path), Some(class)) =
            (fields.next(), fields.next(), fields.next())
        else {
            return Err(CovidNetError::LabelParse {
                line: line_no,
                reason: format!("expected 3 fields, got '{}'", line.trim()),
            });
        };

        let class = class.parse().map_err(|e: CovidNetError| CovidNetError::LabelParse {
            line: line_no,
            reason: e.to_string(),
        })?;

        Ok(Self {
            file_id: file_id.to_string(),
            relative_path: relative_path.to_string(),
            class,
        })
    }
}

/// Parse the contents of a label file, skipping blank lines.
pub fn parse_records(contents: &str) -> Result<Vec<LabelRecord>> {
    contents
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| LabelRecord::parse_line(line, i + 1))
        .collect()
}

pub fn read_label_file(path: impl AsRef<Path>) -> Result<Vec<LabelRecord>> {
    let contents = fs::read_to_string(path)?;
    parse_records(&contents)
}

/// Per-class record counts, indexed by [`ClassLabel::index`].
pub fn class_counts(records: &[LabelRecord]) -> [usize; NUM_CLASSES] {
    let mut counts = [0; NUM_CLASSES];
    for record in records {
        counts[record.class.index()] += 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_three_classes() {
        let records = parse_records(
            "1 a.png normal\n2 b.png pneumonia\n\n3 c.png COVID-19 extra cols\n",
        )
        .unwrap();

        assert_eq!(records.len(), 3);
        assert_eq!(records[0].class, ClassLabel::Normal);
        assert_eq!(records[1].relative_path, "b.png");
        assert_eq!(records[2].class, ClassLabel::Covid19);
        assert_eq!(records[2].file_id, "3");
        assert_eq!(class_counts(&records), [1, 1, 1]);
    }

    #[test]
    fn test_short_line_reports_line_number() {
        let err = parse_records("1 a.png normal\n2 b.png\n").unwrap_err();
        match err {
            CovidNetError::LabelParse { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_unknown_class_rejected() {
        let err = parse_records("1 a.png covid\n").unwrap_err();
        assert!(err.to_string().contains("covid"));
    }

    #[test]
    fn test_index_round_trip() {
        for class in ClassLabel::ALL {
            assert_eq!(ClassLabel::from_index(class.index()), Some(class));
            assert_eq!(class.as_str().parse::<ClassLabel>().unwrap(), class);
        }
        assert_eq!(ClassLabel::from_index(3), None);
    }

    #[test]
    fn test_empty_file() {
        assert!(parse_records("").unwrap().is_empty());
    }
}
