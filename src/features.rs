//! Recent-form features for a matchup.
//!
//! Every feature row is built from games strictly before the anchor date,
//! fetched through [`HistoryIndex::prior_games`]. The row layout is
//! `Home/Away_A`, then team A's averaged stats (`<stat>_A`), then team B's
//! (`<stat>_B`), then whatever the [`FeatureVariant`] adds or removes.

use std::collections::HashSet;

use chrono::NaiveDate;
use ndarray::{Array1, Array2};
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::config::{DateRange, FeatureConfig, Sequencing};
use crate::error::{PredictError, Result};
use crate::history::HistoryIndex;
use crate::pairing::PairedGame;
use crate::preprocess::{TeamGameRow, STAT_COLUMNS, STAT_COUNT};
use crate::variant::FeatureVariant;

pub const HOME_AWAY_COLUMN: &str = "Home/Away_A";

/// A named row of feature values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureRow {
    columns: Vec<String>,
    values: Vec<f64>,
}

impl FeatureRow {
    pub fn push(&mut self, name: impl Into<String>, value: f64) {
        self.columns.push(name.into());
        self.values.push(value);
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.columns
            .iter()
            .position(|c| c == name)
            .map(|i| self.values[i])
    }

    /// Value of `name`, NaN when the column is absent.
    pub fn value(&self, name: &str) -> f64 {
        self.get(name).unwrap_or(f64::NAN)
    }

    pub fn drop_columns(&mut self, names: &[&str]) {
        let (columns, values): (Vec<String>, Vec<f64>) = self
            .columns
            .drain(..)
            .zip(self.values.drain(..))
            .filter(|(c, _)| !names.contains(&c.as_str()))
            .unzip();
        self.columns = columns;
        self.values = values;
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True when no value is NaN or infinite.
    pub fn is_complete(&self) -> bool {
        self.values.iter().all(|v| v.is_finite())
    }
}

/// Column-wise mean of a window. An empty window gives all NaN.
pub fn window_mean(window: &[&TeamGameRow]) -> [f64; STAT_COUNT] {
    if window.is_empty() {
        return [f64::NAN; STAT_COUNT];
    }
    let mut sums = [0.0; STAT_COUNT];
    for row in window {
        for (s, v) in sums.iter_mut().zip(row.stats) {
            *s += v;
        }
    }
    let n = window.len() as f64;
    sums.map(|s| s / n)
}

fn assemble(home: bool, team_a: &[f64; STAT_COUNT], team_b: &[f64; STAT_COUNT], variant: FeatureVariant) -> FeatureRow {
    let mut row = FeatureRow::default();
    row.push(HOME_AWAY_COLUMN, if home { 1.0 } else { 0.0 });
    for (suffix, stats) in [("_A", team_a), ("_B", team_b)] {
        for (name, &v) in STAT_COLUMNS.iter().zip(stats) {
            row.push(format!("{name}{suffix}"), v);
        }
    }
    variant.apply(row)
}

/// Columns every row of `variant` carries, in order.
pub fn feature_columns(variant: FeatureVariant) -> Vec<String> {
    assemble(false, &[f64::NAN; STAT_COUNT], &[f64::NAN; STAT_COUNT], variant)
        .columns
}

/// One game to be described: `team_a` against `team_b` on `date`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Matchup {
    pub date: NaiveDate,
    pub team_a: String,
    pub team_b: String,
}

impl Matchup {
    fn of(game: &PairedGame) -> Self {
        Matchup {
            date: game.date(),
            team_a: game.team.team.clone(),
            team_b: game.opponent.team.clone(),
        }
    }
}

/// Feature row of a prediction query plus the window sizes behind it.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub row: FeatureRow,
    pub games_a: usize,
    pub games_b: usize,
}

impl Query {
    /// `InsufficientHistory` for the first team with an empty window.
    fn empty_window(&self, matchup: &Matchup, period: usize) -> Option<PredictError> {
        let (team, found) = if self.games_a == 0 {
            (&matchup.team_a, self.games_a)
        } else if self.games_b == 0 {
            (&matchup.team_b, self.games_b)
        } else {
            return None;
        };
        Some(PredictError::InsufficientHistory {
            team: team.clone(),
            date: matchup.date,
            found,
            wanted: period,
        })
    }
}

/// Builds feature rows against one history.
pub struct FeatureBuilder<'a> {
    history: &'a HistoryIndex,
    config: FeatureConfig,
}

impl<'a> FeatureBuilder<'a> {
    pub fn new(history: &'a HistoryIndex, config: FeatureConfig) -> Self {
        FeatureBuilder { history, config }
    }

    /// Features for `team_a` against `team_b` as of `date`. Without `home`,
    /// the home flag is read from the game itself, which must be in the
    /// history.
    pub fn query(&self, date: NaiveDate, team_a: &str, team_b: &str, home: Option<bool>) -> Result<Query> {
        let home = match home {
            Some(h) => h,
            None => self
                .history
                .find_game(date, team_a, team_b)
                .map(|g| g.home)
                .ok_or_else(|| PredictError::NotFound {
                    date,
                    team_a: team_a.to_string(),
                    team_b: team_b.to_string(),
                })?,
        };

        let period = self.config.period;
        let window_a = self.history.prior_games(team_a, date, period);
        let window_b = self.history.prior_games(team_b, date, period);
        if window_a.len() < period || window_b.len() < period {
            debug!(
                %date, team_a, team_b,
                games_a = window_a.len(),
                games_b = window_b.len(),
                period,
                "partial window"
            );
        }

        Ok(Query {
            row: assemble(home, &window_mean(&window_a), &window_mean(&window_b), self.config.variant),
            games_a: window_a.len(),
            games_b: window_b.len(),
        })
    }
}

/// The stored (not averaged) values of a played game in feature layout,
/// with team A's result as label.
pub fn ground_truth(
    games: &[PairedGame],
    date: NaiveDate,
    team_a: &str,
    team_b: &str,
    variant: FeatureVariant,
) -> Result<(FeatureRow, f64)> {
    let game = games
        .iter()
        .find(|g| g.date() == date && g.team.team == team_a && g.opponent.team == team_b)
        .ok_or_else(|| PredictError::NotFound {
            date,
            team_a: team_a.to_string(),
            team_b: team_b.to_string(),
        })?;
    let row = assemble(game.team.home, &game.team.stats, &game.opponent.stats, variant);
    Ok((row, label(game)))
}

fn label(game: &PairedGame) -> f64 {
    if game.team.win {
        1.0
    } else {
        0.0
    }
}

/// Games in `range`, optionally restricted to `team_a` and/or `team_b`.
/// With no team given, a game listed from both sides is kept once, from the
/// side that comes first.
pub fn select_matchups(
    games: &[PairedGame],
    range: DateRange,
    team_a: Option<&str>,
    team_b: Option<&str>,
) -> Vec<Matchup> {
    let in_range = games.iter().filter(|g| range.contains(g.date()));
    match (team_a, team_b) {
        (Some(a), Some(b)) => in_range
            .filter(|g| g.team.team == a && g.opponent.team == b)
            .map(Matchup::of)
            .collect(),
        (Some(a), None) => in_range.filter(|g| g.team.team == a).map(Matchup::of).collect(),
        (None, Some(b)) => in_range.filter(|g| g.opponent.team == b).map(Matchup::of).collect(),
        (None, None) => {
            let mut seen: HashSet<(NaiveDate, String, String)> = HashSet::new();
            in_range
                .map(Matchup::of)
                .filter(|m| {
                    let (lo, hi) = if m.team_a <= m.team_b {
                        (&m.team_a, &m.team_b)
                    } else {
                        (&m.team_b, &m.team_a)
                    };
                    seen.insert((m.date, lo.clone(), hi.clone()))
                })
                .collect()
        }
    }
}

/// Feature matrix with labels, one row per usable anchor.
#[derive(Debug)]
pub struct FeatureMatrix {
    pub columns: Vec<String>,
    pub x: Array2<f64>,
    pub y: Array1<f64>,
    pub anchors: Vec<Matchup>,
    /// Anchors left out, with the reason.
    pub skipped: Vec<PredictError>,
}

impl FeatureMatrix {
    pub fn len(&self) -> usize {
        self.y.len()
    }

    pub fn is_empty(&self) -> bool {
        self.y.is_empty()
    }
}

fn map_anchors<T, R, F>(items: &[T], f: F, sequencing: Sequencing) -> Vec<R>
where
    T: Sync,
    F: Fn(&T) -> R + Sync + Send,
    R: Send,
{
    match sequencing {
        Sequencing::Parallel => items.par_iter().map(f).collect(),
        Sequencing::Sequential => items.iter().map(f).collect(),
    }
}

type Labelled = Result<(Matchup, FeatureRow, f64)>;

fn collect_matrix(variant: FeatureVariant, results: Vec<Labelled>) -> Result<FeatureMatrix> {
    let columns = feature_columns(variant);
    let mut flat = Vec::with_capacity(results.len() * columns.len());
    let mut labels = Vec::with_capacity(results.len());
    let mut anchors = Vec::with_capacity(results.len());
    let mut skipped = Vec::new();

    for result in results {
        match result {
            Ok((matchup, row, y)) => {
                debug_assert_eq!(row.columns(), columns.as_slice());
                flat.extend_from_slice(row.values());
                labels.push(y);
                anchors.push(matchup);
            }
            Err(err) => {
                debug!(%err, "anchor skipped");
                skipped.push(err);
            }
        }
    }

    let x = Array2::from_shape_vec((labels.len(), columns.len()), flat)
        .map_err(|e| PredictError::Model(e.to_string()))?;
    info!(rows = labels.len(), skipped = skipped.len(), columns = columns.len(), "built feature matrix");
    Ok(FeatureMatrix {
        columns,
        x,
        y: Array1::from(labels),
        anchors,
        skipped,
    })
}

/// Training features: every game in `range` is an anchor whose own date is
/// the boundary, so the anchor never sits in its own window. History is the
/// whole of `games`. Anchors where a team has no earlier game are skipped.
pub fn historical_features(
    games: &[PairedGame],
    range: DateRange,
    config: FeatureConfig,
    sequencing: Sequencing,
) -> Result<FeatureMatrix> {
    let anchors: Vec<&PairedGame> = games.iter().filter(|g| range.contains(g.date())).collect();
    if anchors.is_empty() {
        return Err(PredictError::EmptyDataset(format!("games from {} to {}", range.start, range.end)));
    }

    let history = HistoryIndex::from_paired(games);
    let builder = FeatureBuilder::new(&history, config);
    let results = map_anchors(
        &anchors,
        |game| -> Labelled {
            let matchup = Matchup::of(game);
            let query = builder.query(matchup.date, &matchup.team_a, &matchup.team_b, Some(game.team.home))?;
            if let Some(err) = query.empty_window(&matchup, config.period) {
                return Err(err);
            }
            Ok((matchup, query.row, label(game)))
        },
        sequencing,
    );
    collect_matrix(config.variant, results)
}

/// Evaluation features: predictive rows for the selected matchups with the
/// played result as label. A matchup that can't be resolved is skipped, not
/// fatal.
pub fn evaluation_features(
    games: &[PairedGame],
    range: DateRange,
    team_a: Option<&str>,
    team_b: Option<&str>,
    config: FeatureConfig,
    sequencing: Sequencing,
) -> Result<FeatureMatrix> {
    let matchups = select_matchups(games, range, team_a, team_b);
    if matchups.is_empty() {
        return Err(PredictError::EmptyDataset(format!(
            "matchups from {} to {} (team A {:?}, team B {:?})",
            range.start, range.end, team_a, team_b
        )));
    }

    let history = HistoryIndex::from_paired(games);
    let builder = FeatureBuilder::new(&history, config);
    let results = map_anchors(
        &matchups,
        |m| -> Labelled {
            let query = builder.query(m.date, &m.team_a, &m.team_b, None)?;
            if let Some(err) = query.empty_window(m, config.period) {
                return Err(err);
            }
            let (_, y) = ground_truth(games, m.date, &m.team_a, &m.team_b, config.variant)?;
            Ok((m.clone(), query.row, y))
        },
        sequencing,
    );
    let matrix = collect_matrix(config.variant, results)?;
    if !matrix.skipped.is_empty() {
        warn!(skipped = matrix.skipped.len(), "some matchups have no usable features");
    }
    Ok(matrix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pairing::{pair_games, tests::row};

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    /// Four games, each seen from both sides.
    fn season() -> Vec<PairedGame> {
        let rows = vec![
            row("BOS", "2018-01-01", "NYK", true, true, 110.0),
            row("NYK", "2018-01-01", "BOS", false, false, 100.0),
            row("BOS", "2018-01-03", "LAL", false, false, 95.0),
            row("LAL", "2018-01-03", "BOS", true, true, 105.0),
            row("NYK", "2018-01-05", "LAL", true, true, 120.0),
            row("LAL", "2018-01-05", "NYK", false, false, 90.0),
            row("BOS", "2018-01-07", "NYK", true, true, 100.0),
            row("NYK", "2018-01-07", "BOS", false, false, 98.0),
        ];
        let pairing = pair_games(&rows);
        assert!(pairing.invalid.is_empty());
        pairing.games
    }

    fn config(period: usize, variant: FeatureVariant) -> FeatureConfig {
        FeatureConfig { period, variant }
    }

    #[test]
    fn query_averages_prior_games() -> Result<()> {
        let games = season();
        let history = HistoryIndex::from_paired(&games);
        let builder = FeatureBuilder::new(&history, config(5, FeatureVariant::Identity));

        let q = builder.query(day("2018-01-07"), "BOS", "NYK", None)?;
        assert_eq!((q.games_a, q.games_b), (2, 2));
        assert_eq!(q.row.columns()[0], HOME_AWAY_COLUMN);
        assert_eq!(q.row.get(HOME_AWAY_COLUMN), Some(1.0));
        // the 01-07 game itself (BOS 100) stays out of the window
        assert_eq!(q.row.get("PTS_A"), Some(102.5));
        assert_eq!(q.row.get("PTS_B"), Some(110.0));
        assert_eq!(q.row.get("REB_A"), Some(1.0));
        assert_eq!(q.row.len(), 1 + 2 * STAT_COUNT);
        Ok(())
    }

    #[test]
    fn query_window_respects_period() -> Result<()> {
        let games = season();
        let history = HistoryIndex::from_paired(&games);
        let builder = FeatureBuilder::new(&history, config(1, FeatureVariant::Identity));
        let q = builder.query(day("2018-01-07"), "BOS", "NYK", Some(false))?;
        assert_eq!(q.row.get(HOME_AWAY_COLUMN), Some(0.0));
        assert_eq!(q.row.get("PTS_A"), Some(95.0));
        assert_eq!(q.row.get("PTS_B"), Some(120.0));
        Ok(())
    }

    #[test]
    fn no_prior_games_gives_missing_slice() -> Result<()> {
        let games = season();
        let history = HistoryIndex::from_paired(&games);
        let builder = FeatureBuilder::new(&history, config(3, FeatureVariant::Identity));
        let q = builder.query(day("2018-01-01"), "BOS", "NYK", Some(true))?;
        assert_eq!((q.games_a, q.games_b), (0, 0));
        assert!(!q.row.is_complete());
        assert!(q.row.get("PTS_A").is_some_and(f64::is_nan));
        assert_eq!(q.row.get(HOME_AWAY_COLUMN), Some(1.0));
        assert!(window_mean(&[]).iter().all(|v| v.is_nan()));
        Ok(())
    }

    #[test]
    fn unknown_game_is_not_found() {
        let games = season();
        let history = HistoryIndex::from_paired(&games);
        let builder = FeatureBuilder::new(&history, FeatureConfig::default());
        let err = builder.query(day("2018-01-02"), "BOS", "NYK", None).unwrap_err();
        assert!(matches!(err, PredictError::NotFound { .. }));
        assert!(matches!(
            ground_truth(&games, day("2018-01-02"), "BOS", "NYK", FeatureVariant::Identity),
            Err(PredictError::NotFound { .. })
        ));
    }

    #[test]
    fn ground_truth_reads_stored_values() -> Result<()> {
        let games = season();
        let (row, y) = ground_truth(&games, day("2018-01-07"), "BOS", "NYK", FeatureVariant::PointDiffOnly)?;
        assert_eq!(y, 1.0);
        assert_eq!(row.get("PTS_DIFF"), Some(2.0));
        assert_eq!(row.get("PTS_A"), None);
        let (_, y) = ground_truth(&games, day("2018-01-07"), "NYK", "BOS", FeatureVariant::Identity)?;
        assert_eq!(y, 0.0);
        Ok(())
    }

    #[test]
    fn historical_features_skip_empty_windows() -> Result<()> {
        let games = season();
        let m = historical_features(&games, DateRange::default(), config(5, FeatureVariant::Identity), Sequencing::Sequential)?;
        assert_eq!(m.len(), 4);
        assert_eq!(m.skipped.len(), 4);
        assert!(m
            .skipped
            .iter()
            .all(|e| matches!(e, PredictError::InsufficientHistory { found: 0, wanted: 5, .. })));
        assert_eq!(m.y.to_vec(), vec![1.0, 0.0, 1.0, 0.0]);
        assert_eq!(m.anchors[2].team_a, "BOS");
        assert_eq!(m.anchors[2].date, day("2018-01-07"));

        let pts = m.columns.iter().position(|c| c == "PTS_A").unwrap();
        assert_eq!(m.x[(2, pts)], 102.5);
        assert!(m.x.iter().all(|v| v.is_finite()));
        Ok(())
    }

    #[test]
    fn historical_features_respect_range() -> Result<()> {
        let games = season();
        let range = DateRange::new(Some(day("2018-01-06")), None);
        let m = historical_features(&games, range, config(5, FeatureVariant::Identity), Sequencing::Sequential)?;
        assert_eq!(m.len(), 2);
        // windows still reach back before the range start
        let pts = m.columns.iter().position(|c| c == "PTS_B").unwrap();
        assert_eq!(m.x[(0, pts)], 110.0);

        let empty = DateRange::new(Some(day("2019-01-01")), None);
        assert!(matches!(
            historical_features(&games, empty, FeatureConfig::default(), Sequencing::Sequential),
            Err(PredictError::EmptyDataset(_))
        ));
        Ok(())
    }

    #[test]
    fn parallel_matches_sequential() -> Result<()> {
        let games = season();
        let cfg = config(2, FeatureVariant::Compact);
        let par = historical_features(&games, DateRange::default(), cfg, Sequencing::Parallel)?;
        let seq = historical_features(&games, DateRange::default(), cfg, Sequencing::Sequential)?;
        assert_eq!(par.x, seq.x);
        assert_eq!(par.y, seq.y);
        assert_eq!(par.anchors, seq.anchors);
        Ok(())
    }

    #[test]
    fn column_sets_agree_on_every_path() -> Result<()> {
        let games = season();
        let history = HistoryIndex::from_paired(&games);
        for variant in FeatureVariant::ALL {
            let cfg = config(3, variant);
            let expected = feature_columns(variant);

            let training = historical_features(&games, DateRange::default(), cfg, Sequencing::Sequential)?;
            let predicted = FeatureBuilder::new(&history, cfg).query(day("2018-01-07"), "BOS", "NYK", None)?;
            let (truth, _) = ground_truth(&games, day("2018-01-07"), "BOS", "NYK", variant)?;
            let evaluated = evaluation_features(&games, DateRange::default(), None, None, cfg, Sequencing::Sequential)?;

            assert_eq!(training.columns, expected, "variant {variant}");
            assert_eq!(predicted.row.columns(), expected.as_slice(), "variant {variant}");
            assert_eq!(truth.columns(), expected.as_slice(), "variant {variant}");
            assert_eq!(evaluated.columns, expected, "variant {variant}");
            assert_eq!(training.x.ncols(), expected.len());
        }
        Ok(())
    }

    #[test]
    fn symmetric_matchups_counted_once() {
        let games = season();
        let all = select_matchups(&games, DateRange::default(), None, None);
        assert_eq!(all.len(), 4);
        let on_first_day: Vec<&Matchup> = all.iter().filter(|m| m.date == day("2018-01-01")).collect();
        assert_eq!(on_first_day.len(), 1);
        assert_eq!(on_first_day[0].team_a, "BOS");

        let bos = select_matchups(&games, DateRange::default(), Some("BOS"), None);
        assert_eq!(bos.len(), 3);
        let vs_bos = select_matchups(&games, DateRange::default(), None, Some("BOS"));
        assert!(vs_bos.iter().all(|m| m.team_b == "BOS"));
        let pair = select_matchups(&games, DateRange::default(), Some("NYK"), Some("BOS"));
        assert_eq!(pair.len(), 2);
    }

    #[test]
    fn evaluation_uses_played_results() -> Result<()> {
        let games = season();
        let m = evaluation_features(
            &games,
            DateRange::default(),
            Some("BOS"),
            Some("NYK"),
            config(5, FeatureVariant::Identity),
            Sequencing::Sequential,
        )?;
        // 01-01 has no history; 01-07 remains
        assert_eq!(m.len(), 1);
        assert_eq!(m.y[0], 1.0);
        assert_eq!(m.skipped.len(), 1);
        Ok(())
    }
}
