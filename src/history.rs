//! Per-team game history ordered by date.
//!
//! `prior_games` is the leakage boundary of the whole pipeline: a row dated
//! on or after the reference date is never returned.

use std::cmp::Reverse;
use std::collections::HashMap;

use chrono::NaiveDate;

use crate::pairing::PairedGame;
use crate::preprocess::TeamGameRow;

#[derive(Debug, Clone, Default)]
pub struct HistoryIndex {
    rows: Vec<TeamGameRow>,
    /// Row indices per team, most recent first, ties in input order.
    by_team: HashMap<String, Vec<usize>>,
}

impl HistoryIndex {
    pub fn new(rows: Vec<TeamGameRow>) -> Self {
        let mut by_team: HashMap<String, Vec<usize>> = HashMap::new();
        for (idx, row) in rows.iter().enumerate() {
            by_team.entry(row.team.clone()).or_default().push(idx);
        }
        for indices in by_team.values_mut() {
            // stable: same-day rows keep input order
            indices.sort_by_key(|&i| Reverse(rows[i].date));
        }
        HistoryIndex { rows, by_team }
    }

    /// Index the team side of every paired game.
    pub fn from_paired(games: &[PairedGame]) -> Self {
        Self::new(games.iter().map(|g| g.team.clone()).collect())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Up to `limit` games of `team` dated strictly before `before`, most
    /// recent first.
    pub fn prior_games(&self, team: &str, before: NaiveDate, limit: usize) -> Vec<&TeamGameRow> {
        let Some(indices) = self.by_team.get(team) else {
            return Vec::new();
        };
        let start = indices.partition_point(|&i| self.rows[i].date >= before);
        indices[start..]
            .iter()
            .take(limit)
            .map(|&i| &self.rows[i])
            .collect()
    }

    /// The row of `team` playing `opponent` on `date`, first in input order.
    pub fn find_game(&self, date: NaiveDate, team: &str, opponent: &str) -> Option<&TeamGameRow> {
        let indices = self.by_team.get(team)?;
        indices
            .iter()
            .copied()
            .filter(|&i| self.rows[i].date == date && self.rows[i].opponent == opponent)
            .min()
            .map(|i| &self.rows[i])
    }

    /// Team codes present in the index, sorted.
    pub fn teams(&self) -> Vec<&str> {
        let mut teams: Vec<&str> = self.by_team.keys().map(String::as_str).collect();
        teams.sort_unstable();
        teams
    }
}
