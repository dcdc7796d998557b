// Row cleaning: drop box-score rows with unusable numbers or an unparsable score.
use crate::error::PredictError;
use crate::io::BoxScoreRecord;
use chrono::NaiveDate;
use tracing::{debug, info};

/// Numeric box-score columns, in file order.
pub const STAT_COLUMNS: [&str; 18] = [
    "FG%", "FGM", "FGA", "3P%", "3PM", "3PA", "FT%", "FTM", "FTA",
    "REB", "OREB", "DREB", "AST", "STL", "BLK", "TOV", "PF", "PTS",
];
pub const STAT_COUNT: usize = STAT_COLUMNS.len();

/// One team's line for one game, after cleaning.
#[derive(Debug, Clone, PartialEq)]
pub struct TeamGameRow {
    pub team: String,
    pub date: NaiveDate,
    pub win: bool,
    pub home: bool,
    pub score: String,
    pub opponent: String,
    pub stats: [f64; STAT_COUNT],
}

impl TeamGameRow {
    /// Look up a stat by its column name.
    #[cfg(test)]
    pub fn stat(&self, name: &str) -> Option<f64> {
        STAT_COLUMNS
            .iter()
            .position(|&c| c == name)
            .map(|i| self.stats[i])
    }
}

/// What the cleaner threw away, by reason.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CleanReport {
    pub non_finite: usize,
    pub bad_score: usize,
    pub bad_outcome: usize,
}

impl CleanReport {
    pub fn dropped(&self) -> usize {
        self.non_finite + self.bad_score + self.bad_outcome
    }
}

/// Opponent code encoded in the first three characters of a score string
/// such as `NYK102-110BOS`. Placeholder scores (`NAN...`) yield `None`.
pub fn opponent_code(score: &str) -> Option<&str> {
    let code = score.get(..3)?;
    if !code.bytes().all(|b| b.is_ascii_uppercase()) || code == "NAN" {
        return None;
    }
    Some(code)
}

fn parse_flag(value: &str, yes: &str, no: &str) -> Option<bool> {
    match value.trim() {
        v if v == yes => Some(true),
        v if v == no => Some(false),
        _ => None,
    }
}

/// Clean raw `BoxScoreRecord`s into `TeamGameRow`s, keeping input order.
pub fn clean(records: &[BoxScoreRecord]) -> (Vec<TeamGameRow>, CleanReport) {
    let mut report = CleanReport::default();
    let mut cleaned = Vec::with_capacity(records.len());

    for (idx, r) in records.iter().enumerate() {
        // any missing, NaN or infinite stat drops the row
        let mut stats = [0.0; STAT_COUNT];
        let mut finite = true;
        for (slot, value) in stats.iter_mut().zip(r.stats()) {
            match value {
                Some(v) if v.is_finite() => *slot = v,
                _ => {
                    finite = false;
                    break;
                }
            }
        }
        if !finite {
            report.non_finite += 1;
            continue;
        }

        let opponent = match opponent_code(&r.score) {
            Some(code) => code.to_string(),
            None => {
                report.bad_score += 1;
                continue;
            }
        };

        let (win, home) = match (
            parse_flag(&r.win_loss, "W", "L"),
            parse_flag(&r.home_away, "Home", "Away"),
        ) {
            (Some(w), Some(h)) => (w, h),
            _ => {
                let err = PredictError::MalformedRow {
                    line: idx as u64,
                    reason: format!("W/L={:?} Home/Away={:?}", r.win_loss, r.home_away),
                };
                debug!(%err, "dropping row");
                report.bad_outcome += 1;
                continue;
            }
        };

        cleaned.push(TeamGameRow {
            team: r.team.trim().to_string(),
            date: r.date,
            win,
            home,
            score: r.score.clone(),
            opponent,
            stats,
        });
    }

    info!(
        kept = cleaned.len(),
        non_finite = report.non_finite,
        bad_score = report.bad_score,
        bad_outcome = report.bad_outcome,
        "cleaned box scores"
    );
    (cleaned, report)
}
