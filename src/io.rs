// Module for loading and writing box-score tables. Reads the raw per-team csv, and reads/writes the paired csv.
use std::collections::HashSet;
use std::path::Path;

use chrono::NaiveDate;
use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use serde::Deserialize;
use tracing::{info, warn};

use crate::error::{PredictError, Result};
use crate::pairing::PairedGame;
use crate::preprocess::{opponent_code, TeamGameRow, STAT_COLUMNS, STAT_COUNT};

const DATE_FMT: &str = "%Y-%m-%d";

mod date_format {
    use chrono::NaiveDate;
    use serde::{self, Deserialize, Deserializer};
    const FMT: &str = "%Y-%m-%d";

    pub fn deserialize<'de, D>(d: D) -> Result<NaiveDate, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(d)?;
        NaiveDate::parse_from_str(s.trim(), FMT).map_err(serde::de::Error::custom)
    }
}

/// Matches the 23 columns of the raw box-score csv.
#[derive(Debug, Clone, Deserialize)]
pub struct BoxScoreRecord {
    #[serde(rename = "Team")]      pub team: String,
    #[serde(rename = "Date", deserialize_with = "date_format::deserialize")]
                                   pub date: NaiveDate,
    #[serde(rename = "W/L")]       pub win_loss: String,
    #[serde(rename = "Home/Away")] pub home_away: String,
    #[serde(rename = "Score")]     pub score: String,
    #[serde(rename = "FG%")]  pub fg_pct: Option<f64>,
    #[serde(rename = "FGM")]  pub fgm: Option<f64>,
    #[serde(rename = "FGA")]  pub fga: Option<f64>,
    #[serde(rename = "3P%")]  pub fg3_pct: Option<f64>,
    #[serde(rename = "3PM")]  pub fg3m: Option<f64>,
    #[serde(rename = "3PA")]  pub fg3a: Option<f64>,
    #[serde(rename = "FT%")]  pub ft_pct: Option<f64>,
    #[serde(rename = "FTM")]  pub ftm: Option<f64>,
    #[serde(rename = "FTA")]  pub fta: Option<f64>,
    #[serde(rename = "REB")]  pub reb: Option<f64>,
    #[serde(rename = "OREB")] pub oreb: Option<f64>,
    #[serde(rename = "DREB")] pub dreb: Option<f64>,
    #[serde(rename = "AST")]  pub ast: Option<f64>,
    #[serde(rename = "STL")]  pub stl: Option<f64>,
    #[serde(rename = "BLK")]  pub blk: Option<f64>,
    #[serde(rename = "TOV")]  pub tov: Option<f64>,
    #[serde(rename = "PF")]   pub pf: Option<f64>,
    #[serde(rename = "PTS")]  pub pts: Option<f64>,
}

impl BoxScoreRecord {
    /// Stats in `STAT_COLUMNS` order.
    pub fn stats(&self) -> [Option<f64>; STAT_COUNT] {
        [
            self.fg_pct, self.fgm, self.fga, self.fg3_pct, self.fg3m, self.fg3a,
            self.ft_pct, self.ftm, self.fta, self.reb, self.oreb, self.dreb,
            self.ast, self.stl, self.blk, self.tov, self.pf, self.pts,
        ]
    }

    #[cfg(test)]
    pub(crate) fn from_parts(
        team: &str,
        date: NaiveDate,
        win_loss: &str,
        home_away: &str,
        score: &str,
        s: [Option<f64>; STAT_COUNT],
    ) -> Self {
        BoxScoreRecord {
            team: team.into(),
            date,
            win_loss: win_loss.into(),
            home_away: home_away.into(),
            score: score.into(),
            fg_pct: s[0], fgm: s[1], fga: s[2], fg3_pct: s[3], fg3m: s[4], fg3a: s[5],
            ft_pct: s[6], ftm: s[7], fta: s[8], reb: s[9], oreb: s[10], dreb: s[11],
            ast: s[12], stl: s[13], blk: s[14], tov: s[15], pf: s[16], pts: s[17],
        }
    }
}

/// Load the raw per-team csv. Lines that don't deserialize are skipped;
/// a file with no usable line is an error.
pub fn load_box_scores(path: impl AsRef<Path>) -> Result<Vec<BoxScoreRecord>> {
    let path = path.as_ref();
    let mut rdr = ReaderBuilder::new()
        .delimiter(b',')
        .flexible(true)
        .has_headers(true)
        .from_path(path)?;

    let headers = rdr.headers()?.clone();
    let expected_len = headers.len();

    let mut out = Vec::new();
    for result in rdr.records() {
        let raw: StringRecord = result?;
        let line = raw.position().map(|p| p.line()).unwrap_or(0);

        // blank lines carry nothing
        if raw.iter().all(|f| f.trim().is_empty()) {
            continue;
        }

        if raw.len() != expected_len {
            let err = PredictError::MalformedRow {
                line,
                reason: format!("expected {} fields, found {}", expected_len, raw.len()),
            };
            warn!(%err, "skipping line");
            continue;
        }

        match raw.deserialize::<BoxScoreRecord>(Some(&headers)) {
            Ok(rec) => out.push(rec),
            Err(e) => {
                let err = PredictError::MalformedRow { line, reason: e.to_string() };
                warn!(%err, "skipping line");
            }
        }
    }

    if out.is_empty() {
        return Err(PredictError::EmptyDataset(path.display().to_string()));
    }
    info!(rows = out.len(), path = %path.display(), "loaded box scores");
    Ok(out)
}

/// Column names of one side of a paired row, without suffix.
fn side_columns() -> impl Iterator<Item = &'static str> {
    ["Team", "Date", "W/L", "Home/Away", "Score"]
        .into_iter()
        .chain(STAT_COLUMNS)
        .chain(["Opponent"])
}

/// Header of the paired csv: every team column with `_A`, then with `_B`.
pub fn paired_headers() -> Vec<String> {
    ["_A", "_B"]
        .iter()
        .flat_map(|suffix| side_columns().map(move |c| format!("{c}{suffix}")))
        .collect()
}

/// Positions of one side's columns inside a paired csv.
struct SideLayout {
    team: usize,
    date: usize,
    win: usize,
    home: usize,
    score: usize,
    stats: [usize; STAT_COUNT],
    opponent: Option<usize>,
}

impl SideLayout {
    fn locate(headers: &StringRecord, suffix: &str) -> Result<Self> {
        let find = |name: &str| -> Result<usize> {
            let wanted = format!("{name}{suffix}");
            headers
                .iter()
                .position(|h| h.trim() == wanted)
                .ok_or_else(|| PredictError::MalformedRow {
                    line: 1,
                    reason: format!("missing column {wanted}"),
                })
        };
        let mut stats = [0; STAT_COUNT];
        for (slot, name) in stats.iter_mut().zip(STAT_COLUMNS) {
            *slot = find(name)?;
        }
        Ok(SideLayout {
            team: find("Team")?,
            date: find("Date")?,
            win: find("W/L")?,
            home: find("Home/Away")?,
            score: find("Score")?,
            stats,
            opponent: find("Opponent").ok(),
        })
    }

    fn read(&self, rec: &StringRecord) -> std::result::Result<TeamGameRow, String> {
        let field = |i: usize| rec.get(i).map(str::trim).ok_or_else(|| format!("no field {i}"));
        let number = |i: usize| -> std::result::Result<f64, String> {
            let s = field(i)?;
            s.parse::<f64>().map_err(|e| format!("{s:?}: {e}"))
        };

        let date = NaiveDate::parse_from_str(field(self.date)?, DATE_FMT).map_err(|e| e.to_string())?;
        let score = field(self.score)?.to_string();
        let opponent = match self.opponent {
            Some(i) => field(i)?.to_string(),
            None => opponent_code(&score).ok_or("unparsable score")?.to_string(),
        };
        let mut stats = [0.0; STAT_COUNT];
        for (slot, &i) in stats.iter_mut().zip(&self.stats) {
            *slot = number(i)?;
            if !slot.is_finite() {
                return Err(format!("non-finite value in column {i}"));
            }
        }
        Ok(TeamGameRow {
            team: field(self.team)?.to_string(),
            date,
            win: number(self.win)? != 0.0,
            home: number(self.home)? != 0.0,
            score,
            opponent,
            stats,
        })
    }
}

fn side_fields(row: &TeamGameRow) -> impl Iterator<Item = String> + '_ {
    let flag = |b: bool| (if b { "1" } else { "0" }).to_string();
    [
        row.team.clone(),
        row.date.format(DATE_FMT).to_string(),
        flag(row.win),
        flag(row.home),
        row.score.clone(),
    ]
    .into_iter()
    .chain(row.stats.iter().map(|v| format!("{v:.3}")))
    .chain([row.opponent.clone()])
}

/// Load the paired csv produced by `write_paired`.
pub fn load_paired(path: impl AsRef<Path>) -> Result<Vec<PairedGame>> {
    let path = path.as_ref();
    let mut rdr = ReaderBuilder::new()
        .flexible(true)
        .has_headers(true)
        .from_path(path)?;
    let headers = rdr.headers()?.clone();
    let team_side = SideLayout::locate(&headers, "_A")?;
    let oppo_side = SideLayout::locate(&headers, "_B")?;

    let mut out = Vec::new();
    for result in rdr.records() {
        let raw = result?;
        let line = raw.position().map(|p| p.line()).unwrap_or(0);
        match (team_side.read(&raw), oppo_side.read(&raw)) {
            (Ok(team), Ok(opponent)) => out.push(PairedGame { team, opponent }),
            (Err(reason), _) | (_, Err(reason)) => {
                let err = PredictError::MalformedRow { line, reason };
                warn!(%err, "skipping paired line");
            }
        }
    }

    if out.is_empty() {
        return Err(PredictError::EmptyDataset(path.display().to_string()));
    }
    info!(games = out.len(), path = %path.display(), "loaded paired games");
    Ok(out)
}

/// Write paired games sorted by date. With `append`, rows already in the
/// file come first and win over new rows with the same `(Team_A, Date_A)`.
/// Returns the number of rows written.
pub fn write_paired(path: impl AsRef<Path>, games: &[PairedGame], append: bool) -> Result<usize> {
    let path = path.as_ref();
    let mut merged = if append && path.exists() {
        match load_paired(path) {
            Ok(old) => old,
            Err(PredictError::EmptyDataset(_)) => Vec::new(),
            Err(e) => return Err(e),
        }
    } else {
        Vec::new()
    };
    let old_len = merged.len();
    merged.extend_from_slice(games);

    if append {
        let mut seen = HashSet::new();
        merged.retain(|g| seen.insert((g.team.team.clone(), g.team.date)));
    }
    merged.sort_by_key(|g| g.team.date);

    let mut wtr = WriterBuilder::new().from_path(path)?;
    wtr.write_record(paired_headers())?;
    for game in &merged {
        wtr.write_record(side_fields(&game.team).chain(side_fields(&game.opponent)))?;
    }
    wtr.flush()?;

    info!(
        written = merged.len(),
        previous = old_len,
        path = %path.display(),
        "wrote paired games"
    );
    Ok(merged.len())
}

/// Write `(feature, coefficient)` pairs as a two-column csv.
pub fn write_coefficients(path: impl AsRef<Path>, coefficients: &[(String, f64)]) -> Result<()> {
    let mut wtr = WriterBuilder::new().from_path(path)?;
    wtr.write_record(["feature", "coefficient"])?;
    for (name, coef) in coefficients {
        wtr.write_record([name.clone(), format!("{coef:.6}")])?;
    }
    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{fs::File, io::Write};

    const RAW_HEADER: &str = "Team,Date,W/L,Home/Away,Score,FG%,FGM,FGA,3P%,3PM,3PA,FT%,FTM,FTA,REB,OREB,DREB,AST,STL,BLK,TOV,PF,PTS";

    #[test]
    fn loads_raw_rows_and_skips_garbage() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("box.csv");
        let mut f = File::create(&path)?;
        writeln!(f, "{RAW_HEADER}")?;
        writeln!(f, "BOS,2018-01-01,W,Home,NYK100-110BOS,0.5,40,80,0.4,10,25,0.8,20,25,45,10,35,25,8,5,12,20,110")?;
        // short line
        writeln!(f, "NYK,2018-01-01,L,Away")?;
        // unparsable date
        writeln!(f, "NYK,01/01/2018,L,Away,BOS110-100NYK,0.5,40,80,0.4,10,25,0.8,20,25,45,10,35,25,8,5,12,20,100")?;
        // empty stat survives loading as None
        writeln!(f, "NYK,2018-01-01,L,Away,BOS110-100NYK,0.5,40,80,0.4,10,25,0.8,20,25,,10,35,25,8,5,12,20,100")?;
        drop(f);

        let recs = load_box_scores(&path)?;
        assert_eq!(recs.len(), 2);
        assert_eq!(recs[0].team, "BOS");
        assert_eq!(recs[0].date, NaiveDate::from_ymd_opt(2018, 1, 1).unwrap());
        assert_eq!(recs[0].pts, Some(110.0));
        assert_eq!(recs[1].reb, None);
        Ok(())
    }

    #[test]
    fn empty_raw_file_is_fatal() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("empty.csv");
        std::fs::write(&path, format!("{RAW_HEADER}\n"))?;
        assert!(matches!(load_box_scores(&path), Err(PredictError::EmptyDataset(_))));
        Ok(())
    }

    #[test]
    fn paired_headers_are_suffixed() {
        let headers = paired_headers();
        assert_eq!(headers.len(), 48);
        assert_eq!(headers[0], "Team_A");
        assert_eq!(headers[23], "Opponent_A");
        assert_eq!(headers[24], "Team_B");
        assert_eq!(headers[47], "Opponent_B");
    }
}
