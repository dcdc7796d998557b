// Feature variants: named column selections applied the same way to every feature row.
use std::fmt;
use std::str::FromStr;

use crate::features::FeatureRow;

/// Shooting-detail columns dropped by `FeatureVariant::Compact`, per side.
const SHOOTING_DETAIL: [&str; 9] = ["FGM", "FGA", "3PM", "3PA", "FTM", "FTA", "OREB", "DREB", "PF"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FeatureVariant {
    /// 0: columns as built.
    #[default]
    Identity,
    /// 1: add `PTS_DIFF`.
    PointDiff,
    /// 2: drop `PTS_A`, `PTS_B`.
    NoPoints,
    /// 3: add `PTS_DIFF`, drop `PTS_A`, `PTS_B`.
    PointDiffOnly,
    /// 4: add `PTS_DIFF` and `STL+BLK` per side, drop shooting detail,
    /// points, steals and blocks.
    Compact,
}

impl FeatureVariant {
    pub const ALL: [FeatureVariant; 5] = [
        FeatureVariant::Identity,
        FeatureVariant::PointDiff,
        FeatureVariant::NoPoints,
        FeatureVariant::PointDiffOnly,
        FeatureVariant::Compact,
    ];

    pub fn id(self) -> u8 {
        match self {
            FeatureVariant::Identity => 0,
            FeatureVariant::PointDiff => 1,
            FeatureVariant::NoPoints => 2,
            FeatureVariant::PointDiffOnly => 3,
            FeatureVariant::Compact => 4,
        }
    }

    pub fn from_id(id: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|v| v.id() == id)
    }

    /// Apply this variant to a row carrying `_A`/`_B` stat columns.
    pub fn apply(self, mut row: FeatureRow) -> FeatureRow {
        match self {
            FeatureVariant::Identity => {}
            FeatureVariant::PointDiff => add_point_diff(&mut row),
            FeatureVariant::NoPoints => row.drop_columns(&["PTS_A", "PTS_B"]),
            FeatureVariant::PointDiffOnly => {
                add_point_diff(&mut row);
                row.drop_columns(&["PTS_A", "PTS_B"]);
            }
            FeatureVariant::Compact => {
                add_point_diff(&mut row);
                for side in ["_A", "_B"] {
                    let combined = row.value(&format!("STL{side}")) + row.value(&format!("BLK{side}"));
                    row.push(format!("STL+BLK{side}"), combined);
                }
                let mut dropped: Vec<String> = ["_A", "_B"]
                    .iter()
                    .flat_map(|side| SHOOTING_DETAIL.iter().map(move |c| format!("{c}{side}")))
                    .collect();
                for c in ["PTS", "STL", "BLK"] {
                    dropped.push(format!("{c}_A"));
                    dropped.push(format!("{c}_B"));
                }
                let dropped: Vec<&str> = dropped.iter().map(String::as_str).collect();
                row.drop_columns(&dropped);
            }
        }
        row
    }
}

fn add_point_diff(row: &mut FeatureRow) {
    let diff = row.value("PTS_A") - row.value("PTS_B");
    row.push("PTS_DIFF", diff);
}

impl fmt::Display for FeatureVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id())
    }
}

impl FromStr for FeatureVariant {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u8>()
            .ok()
            .and_then(FeatureVariant::from_id)
            .ok_or_else(|| format!("Unknown feature variant: {} (expected 0-4)", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn points_row(pts_a: f64, pts_b: f64) -> FeatureRow {
        let mut row = FeatureRow::default();
        row.push("Home/Away_A", 1.0);
        for (side, pts) in [("_A", pts_a), ("_B", pts_b)] {
            for c in SHOOTING_DETAIL {
                row.push(format!("{c}{side}"), 1.0);
            }
            row.push(format!("STL{side}"), 7.0);
            row.push(format!("BLK{side}"), 4.0);
            row.push(format!("PTS{side}"), pts);
        }
        row
    }

    #[test]
    fn point_diff_only_replaces_points() {
        let row = FeatureVariant::PointDiffOnly.apply(points_row(110.0, 102.0));
        assert_eq!(row.get("PTS_DIFF"), Some(8.0));
        assert_eq!(row.get("PTS_A"), None);
        assert_eq!(row.get("PTS_B"), None);
    }

    #[test]
    fn each_variant_shapes_columns() {
        let base = points_row(100.0, 90.0);
        let n = base.len();
        assert_eq!(FeatureVariant::Identity.apply(base.clone()), base);

        let diff = FeatureVariant::PointDiff.apply(base.clone());
        assert_eq!(diff.len(), n + 1);
        assert_eq!(diff.get("PTS_DIFF"), Some(10.0));
        assert_eq!(diff.get("PTS_A"), Some(100.0));

        let no_pts = FeatureVariant::NoPoints.apply(base.clone());
        assert_eq!(no_pts.len(), n - 2);
        assert_eq!(no_pts.get("PTS_DIFF"), None);

        let compact = FeatureVariant::Compact.apply(base);
        assert_eq!(compact.get("STL+BLK_A"), Some(11.0));
        assert_eq!(compact.get("STL+BLK_B"), Some(11.0));
        assert_eq!(compact.get("PTS_DIFF"), Some(10.0));
        assert_eq!(
            compact.columns().to_vec(),
            vec!["Home/Away_A", "PTS_DIFF", "STL+BLK_A", "STL+BLK_B"]
        );
    }

    #[test]
    fn parses_ids() {
        for v in FeatureVariant::ALL {
            assert_eq!(v.to_string().parse::<FeatureVariant>(), Ok(v));
        }
        assert!("5".parse::<FeatureVariant>().is_err());
        assert!("x".parse::<FeatureVariant>().is_err());
    }
}
