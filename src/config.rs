// Feature-extraction settings shared by the train, evaluate and predict commands.
use chrono::NaiveDate;

use crate::variant::FeatureVariant;

/// Window length and column policy for one feature matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureConfig {
    /// Number of prior games averaged per team.
    pub period: usize,
    pub variant: FeatureVariant,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        FeatureConfig {
            period: 5,
            variant: FeatureVariant::PointDiffOnly,
        }
    }
}

/// Inclusive date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        DateRange {
            start: start.unwrap_or(NaiveDate::MIN),
            end: end.unwrap_or(NaiveDate::MAX),
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

impl Default for DateRange {
    fn default() -> Self {
        DateRange::new(None, None)
    }
}

/// How bulk extraction maps over anchors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Sequencing {
    #[default]
    Parallel,
    Sequential,
}
