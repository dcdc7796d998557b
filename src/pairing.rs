// Game pairing: join each team's row with its opponent's row for the same game.
use std::collections::HashMap;

use chrono::NaiveDate;
use tracing::{debug, info, warn};

use crate::error::PredictError;
use crate::preprocess::TeamGameRow;

/// One real-world game seen from `team`'s side (`_A` columns) against
/// `opponent` (`_B` columns).
#[derive(Debug, Clone, PartialEq)]
pub struct PairedGame {
    pub team: TeamGameRow,
    pub opponent: TeamGameRow,
}

impl PairedGame {
    pub fn date(&self) -> NaiveDate {
        self.team.date
    }

    /// Check the four pairing invariants.
    pub fn check(&self) -> Result<(), &'static str> {
        let (a, b) = (&self.team, &self.opponent);
        if a.date != b.date {
            return Err("dates differ");
        }
        if a.opponent != b.team || b.opponent != a.team {
            return Err("teams do not face each other");
        }
        if a.win == b.win {
            return Err("both or neither side won");
        }
        if a.home == b.home {
            return Err("both or neither side at home");
        }
        Ok(())
    }
}

/// Audit trail of one pairing pass. Indices refer to the input rows.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PairingReport {
    /// Rows with no opponent row on the same date.
    pub not_found: Vec<usize>,
    /// Rows whose pair broke an invariant.
    pub inconsistent: Vec<usize>,
    /// Extra candidate rows passed over in favour of the first match.
    pub duplicates: Vec<usize>,
    /// Rows that had more than one candidate.
    pub conflicts: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Pairing {
    pub games: Vec<PairedGame>,
    /// Every input row that did not produce a game, ascending.
    pub invalid: Vec<usize>,
    pub report: PairingReport,
}

/// Pair every row with the first row (in input order) that played it on the
/// same date. One game is produced per valid row, so a real game normally
/// appears twice: once from each side.
pub fn pair_games(rows: &[TeamGameRow]) -> Pairing {
    let mut by_date: HashMap<NaiveDate, Vec<usize>> = HashMap::new();
    for (idx, row) in rows.iter().enumerate() {
        by_date.entry(row.date).or_default().push(idx);
    }

    let mut games = Vec::with_capacity(rows.len());
    let mut invalid = Vec::new();
    let mut report = PairingReport::default();

    for (idx, row) in rows.iter().enumerate() {
        let candidates: Vec<usize> = by_date
            .get(&row.date)
            .map(|same_day| {
                same_day
                    .iter()
                    .copied()
                    .filter(|&j| rows[j].opponent == row.team)
                    .collect()
            })
            .unwrap_or_default();

        let Some((&first, rest)) = candidates.split_first() else {
            debug!(index = idx, team = %row.team, date = %row.date, "opponent not found");
            report.not_found.push(idx);
            invalid.push(idx);
            continue;
        };

        if !rest.is_empty() {
            let err = PredictError::PairingConflict {
                team: row.team.clone(),
                date: row.date,
                candidates: candidates.len(),
            };
            warn!(%err, kept = first, "keeping first candidate");
            report.conflicts += 1;
            report.duplicates.extend_from_slice(rest);
        }

        let game = PairedGame {
            team: row.clone(),
            opponent: rows[first].clone(),
        };
        if let Err(reason) = game.check() {
            let err = PredictError::InvalidPair { index: idx, reason };
            debug!(%err, "dropping pair");
            report.inconsistent.push(idx);
            invalid.push(idx);
            continue;
        }
        games.push(game);
    }

    info!(
        games = games.len(),
        not_found = report.not_found.len(),
        inconsistent = report.inconsistent.len(),
        conflicts = report.conflicts,
        "paired box scores"
    );
    Pairing { games, invalid, report }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::preprocess::STAT_COUNT;

    pub(crate) fn row(team: &str, date: &str, opponent: &str, win: bool, home: bool, pts: f64) -> TeamGameRow {
        let mut stats = [1.0; STAT_COUNT];
        stats[STAT_COUNT - 1] = pts;
        TeamGameRow {
            team: team.into(),
            date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            win,
            home,
            score: format!("{opponent}0-0{team}"),
            opponent: opponent.into(),
            stats,
        }
    }

    #[test]
    fn pairs_both_sides_of_a_game() {
        let rows = vec![
            row("BOS", "2018-01-01", "NYK", true, true, 110.0),
            row("NYK", "2018-01-01", "BOS", false, false, 102.0),
        ];
        let pairing = pair_games(&rows);
        assert_eq!(pairing.games.len(), 2);
        assert!(pairing.invalid.is_empty());

        let g = &pairing.games[0];
        assert_eq!(g.team.team, "BOS");
        assert_eq!(g.opponent.team, "NYK");
        assert_ne!(g.team.home, g.opponent.home);
        assert_ne!(g.team.win, g.opponent.win);
        for g in &pairing.games {
            assert!(g.check().is_ok());
        }
    }

    #[test]
    fn unmatched_rows_are_invalid() {
        let rows = vec![
            row("BOS", "2018-01-01", "NYK", true, true, 110.0),
            // NYK's row is on another day
            row("NYK", "2018-01-02", "BOS", false, false, 102.0),
        ];
        let pairing = pair_games(&rows);
        assert!(pairing.games.is_empty());
        assert_eq!(pairing.invalid, vec![0, 1]);
        assert_eq!(pairing.report.not_found, vec![0, 1]);
    }

    #[test]
    fn inconsistent_pairs_are_dropped() {
        let rows = vec![
            // both claim the win
            row("BOS", "2018-01-01", "NYK", true, true, 110.0),
            row("NYK", "2018-01-01", "BOS", true, false, 102.0),
            // both at home
            row("LAL", "2018-01-01", "GSW", true, true, 99.0),
            row("GSW", "2018-01-01", "LAL", false, true, 97.0),
            // a clean game
            row("MIA", "2018-01-01", "CHI", true, true, 99.0),
            row("CHI", "2018-01-01", "MIA", false, false, 90.0),
        ];
        let pairing = pair_games(&rows);
        assert_eq!(pairing.invalid, vec![0, 1, 2, 3]);
        assert_eq!(pairing.report.inconsistent, vec![0, 1, 2, 3]);
        assert_eq!(pairing.games.len(), 2);
        assert!(pairing.games.iter().all(|g| g.team.team == "MIA" || g.team.team == "CHI"));
    }

    #[test]
    fn duplicate_candidates_keep_first_in_row_order() {
        let rows = vec![
            row("BOS", "2018-01-01", "NYK", true, true, 110.0),
            row("NYK", "2018-01-01", "BOS", false, false, 102.0),
            // scraped twice with different numbers
            row("NYK", "2018-01-01", "BOS", false, false, 999.0),
        ];
        let pairing = pair_games(&rows);
        let bos = &pairing.games[0];
        assert_eq!(bos.team.team, "BOS");
        assert_eq!(bos.opponent.stat("PTS"), Some(102.0));
        assert_eq!(pairing.report.conflicts, 1);
        assert_eq!(pairing.report.duplicates, vec![2]);
    }

    #[test]
    fn pairing_is_idempotent() {
        let rows = vec![
            row("BOS", "2018-01-01", "NYK", true, true, 110.0),
            row("NYK", "2018-01-01", "BOS", false, false, 102.0),
            row("NYK", "2018-01-01", "BOS", false, false, 101.0),
            row("LAL", "2018-01-02", "GSW", true, true, 99.0),
            row("MIA", "2018-01-03", "CHI", true, true, 99.0),
            row("CHI", "2018-01-03", "MIA", true, false, 90.0),
        ];
        let first = pair_games(&rows);
        let second = pair_games(&rows);
        assert_eq!(first, second);
        assert_eq!(first.invalid, vec![3, 4, 5]);
    }
}
