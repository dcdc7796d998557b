// Command-line entry: pair box scores, train on recent-form features, evaluate, predict.
use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use plotters::prelude::*;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod error;
mod features;
mod history;
mod io;
mod model;
mod pairing;
mod preprocess;
mod variant;

use config::{DateRange, FeatureConfig, Sequencing};
use error::{PredictError, Result};
use features::{evaluation_features, historical_features, FeatureBuilder};
use history::HistoryIndex;
use io::{load_box_scores, load_paired, write_coefficients, write_paired};
use model::{accuracy, cross_validate, Classifier, LogisticClassifier, ModelKind};
use pairing::pair_games;
use preprocess::clean;
use variant::FeatureVariant;

#[derive(Parser)]
#[command(name = "hoops_form")]
#[command(about = "Pair NBA box scores and predict games from recent form", long_about = None)]
struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Map anchors on one thread
    #[arg(long, global = true)]
    sequential: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Clean a raw box-score csv and write the paired-game csv
    Pair {
        #[arg(long)]
        in_file: PathBuf,
        #[arg(long, default_value = "paired_games.csv")]
        out_file: PathBuf,
        /// Replace the output instead of merging into it
        #[arg(long)]
        overwrite: bool,
    },
    /// Fit a classifier on historical features and report cross-validated accuracy
    Train {
        #[arg(long, default_value = "paired_games.csv")]
        in_file: PathBuf,
        #[arg(long)]
        start: Option<NaiveDate>,
        #[arg(long)]
        end: Option<NaiveDate>,
        #[command(flatten)]
        features: FeatureArgs,
        #[arg(long, value_enum, default_value = "logistic")]
        model: ModelKind,
        #[arg(long, default_value_t = 10)]
        folds: usize,
        #[arg(long, default_value_t = 0)]
        seed: u64,
        #[arg(long, default_value = "trained")]
        out_dir: PathBuf,
    },
    /// Fit on one date range and score predictions on another
    Evaluate {
        #[arg(long, default_value = "paired_games.csv")]
        in_file: PathBuf,
        #[arg(long)]
        train_start: Option<NaiveDate>,
        #[arg(long)]
        train_end: Option<NaiveDate>,
        #[arg(long)]
        start: Option<NaiveDate>,
        #[arg(long)]
        end: Option<NaiveDate>,
        #[arg(long)]
        team_a: Option<String>,
        #[arg(long)]
        team_b: Option<String>,
        #[command(flatten)]
        features: FeatureArgs,
        #[arg(long, value_enum, value_delimiter = ',', default_values_t = [ModelKind::Logistic, ModelKind::Majority])]
        models: Vec<ModelKind>,
    },
    /// Predict one matchup from games before its date
    Predict {
        #[arg(long, default_value = "paired_games.csv")]
        in_file: PathBuf,
        #[arg(long)]
        date: NaiveDate,
        #[arg(long)]
        team_a: String,
        #[arg(long)]
        team_b: String,
        /// Team A plays at home (looked up from the data when neither flag is given)
        #[arg(long, conflicts_with = "away")]
        home: bool,
        /// Team A plays away
        #[arg(long)]
        away: bool,
        #[command(flatten)]
        features: FeatureArgs,
        #[arg(long, value_enum, default_value = "logistic")]
        model: ModelKind,
    },
}

#[derive(clap::Args, Clone, Copy)]
struct FeatureArgs {
    /// Prior games averaged per team
    #[arg(long, default_value_t = 5)]
    period: usize,
    /// Feature variant 0-4
    #[arg(long, default_value = "3")]
    variant: FeatureVariant,
}

impl From<FeatureArgs> for FeatureConfig {
    fn from(args: FeatureArgs) -> Self {
        FeatureConfig {
            period: args.period,
            variant: args.variant,
        }
    }
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let sequencing = if cli.sequential {
        Sequencing::Sequential
    } else {
        Sequencing::Parallel
    };
    if let Err(e) = run(cli.command, sequencing) {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

fn run(command: Commands, sequencing: Sequencing) -> Result<()> {
    match command {
        Commands::Pair { in_file, out_file, overwrite } => {
            let written = pair_file(&in_file, &out_file, !overwrite)?;
            println!("Wrote {} paired games to {}", written, out_file.display());
        }
        Commands::Train { in_file, start, end, features, model, folds, seed, out_dir } => {
            let config = FeatureConfig::from(features);
            let summary = train_file(&in_file, start, end, config, model, folds, seed, &out_dir, sequencing)?;
            if let Some(score) = summary.accuracy {
                println!("{}-fold accuracy ({}) = {:.3}", folds, model.name(), score);
            }
            if let Some((csv_path, png_path)) = &summary.written {
                println!("\nCoefficients:");
                for (name, coef) in &summary.coefficients {
                    println!("{:<30} {:>8.4}", name, coef);
                }
                println!("Wrote {} and {}", csv_path.display(), png_path.display());
            }
        }
        Commands::Evaluate {
            in_file,
            train_start,
            train_end,
            start,
            end,
            team_a,
            team_b,
            features,
            models,
        } => {
            let config = FeatureConfig::from(features);
            let games = load_paired(&in_file)?;
            let range = DateRange::new(start, end);
            let train_range = training_range(train_start, train_end, start);
            let train = historical_features(&games, train_range, config, sequencing)?;
            let eval = evaluation_features(&games, range, team_a.as_deref(), team_b.as_deref(), config, sequencing)?;
            if eval.is_empty() {
                return Err(PredictError::EmptyDataset("evaluation matchups".into()));
            }

            println!("---------- Accuracy Report ----------");
            println!("feature variant = {}, period = {}", config.variant, config.period);
            println!("predict from {} to {}", range.start, range.end);
            println!("team A = {}", team_a.as_deref().unwrap_or("all"));
            println!("team B = {}", team_b.as_deref().unwrap_or("all"));
            println!("games = {} (skipped {})", eval.len(), eval.skipped.len());
            for kind in models {
                let mut classifier = kind.build();
                classifier.fit(&train.x, &train.y)?;
                let predicted = classifier.predict(&eval.x)?;
                for (m, (p, t)) in eval.anchors.iter().zip(predicted.iter().zip(eval.y.iter())) {
                    debug!(model = kind.name(), date = %m.date, team_a = %m.team_a, team_b = %m.team_b, predicted = p, truth = t, "scored");
                }
                println!("{:<10} = {:.3}", kind.name(), accuracy(&eval.y, &predicted));
            }
        }
        Commands::Predict {
            in_file,
            date,
            team_a,
            team_b,
            home,
            away,
            features,
            model,
        } => {
            let config = FeatureConfig::from(features);
            let games = load_paired(&in_file)?;
            let home_flag = match (home, away) {
                (true, _) => Some(true),
                (_, true) => Some(false),
                _ => None,
            };
            let (won, games_a, games_b) =
                predict_game(&games, date, &team_a, &team_b, home_flag, config, model, sequencing)?;
            println!(
                "{} vs {} on {}: {} {} (from {} and {} prior games)",
                team_a,
                team_b,
                date,
                team_a,
                if won { "wins" } else { "loses" },
                games_a,
                games_b
            );
        }
    }
    Ok(())
}

/// Clean, pair and write one raw box-score file. Returns rows in the output.
fn pair_file(in_file: &Path, out_file: &Path, append: bool) -> Result<usize> {
    let raw = load_box_scores(in_file)?;
    let (rows, report) = clean(&raw);
    if rows.is_empty() {
        return Err(PredictError::EmptyDataset(in_file.display().to_string()));
    }
    info!(dropped = report.dropped(), "cleaning done");

    let pairing = pair_games(&rows);
    if !pairing.invalid.is_empty() {
        warn!(invalid = ?pairing.invalid, duplicates = ?pairing.report.duplicates, "rows left unpaired");
    }
    write_paired(out_file, &pairing.games, append)
}

/// What one `train` run produced.
struct TrainSummary {
    accuracy: Option<f64>,
    coefficients: Vec<(String, f64)>,
    /// Coefficient csv and chart, written for the logistic model only.
    written: Option<(PathBuf, PathBuf)>,
}

/// Build historical features from a paired file, cross-validate `model`, and
/// for the logistic model write its coefficients to `out_dir`.
#[allow(clippy::too_many_arguments)]
fn train_file(
    in_file: &Path,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    config: FeatureConfig,
    model: ModelKind,
    folds: usize,
    seed: u64,
    out_dir: &Path,
    sequencing: Sequencing,
) -> Result<TrainSummary> {
    let games = load_paired(in_file)?;
    let matrix = historical_features(&games, DateRange::new(start, end), config, sequencing)?;
    if matrix.is_empty() {
        return Err(PredictError::EmptyDataset(in_file.display().to_string()));
    }

    let accuracy = if folds >= 2 && folds <= matrix.len() {
        Some(cross_validate(model, &matrix.x, &matrix.y, folds, seed)?)
    } else {
        warn!(folds, rows = matrix.len(), "skipping cross-validation");
        None
    };

    let mut summary = TrainSummary {
        accuracy,
        coefficients: Vec::new(),
        written: None,
    };
    if model != ModelKind::Logistic {
        return Ok(summary);
    }

    let mut logistic = LogisticClassifier::default();
    logistic.fit(&matrix.x, &matrix.y)?;
    summary.coefficients = logistic.coefficients(&matrix.columns);

    fs::create_dir_all(out_dir)?;
    let bound = |d: Option<NaiveDate>, open: &str| d.map_or(open.to_string(), |d| d.to_string());
    let train_id = format!(
        "{}_to_{}_feature{}_period{}",
        bound(start, "first"),
        bound(end, "last"),
        config.variant,
        config.period
    );
    let csv_path = out_dir.join(format!("{train_id}_coefficients.csv"));
    write_coefficients(&csv_path, &summary.coefficients)?;
    let png_path = out_dir.join(format!("{train_id}_coefficients.png"));
    plot_coefficients(&summary.coefficients, &png_path).map_err(|e| PredictError::Plot(e.to_string()))?;
    info!(csv = %csv_path.display(), png = %png_path.display(), "coefficients written");
    summary.written = Some((csv_path, png_path));
    Ok(summary)
}

/// Training dates for `evaluate`. Without an explicit end, training stops the
/// day before the first scored game.
fn training_range(train_start: Option<NaiveDate>, train_end: Option<NaiveDate>, start: Option<NaiveDate>) -> DateRange {
    let end = train_end.or_else(|| start.and_then(|d| d.pred_opt()));
    if end.is_none() {
        warn!("no training end or evaluation start; training anchors overlap the scored games");
    }
    DateRange::new(train_start, end)
}

/// Train on every game before `date` and predict whether `team_a` beats `team_b`.
#[allow(clippy::too_many_arguments)]
fn predict_game(
    games: &[pairing::PairedGame],
    date: NaiveDate,
    team_a: &str,
    team_b: &str,
    home: Option<bool>,
    config: FeatureConfig,
    kind: ModelKind,
    sequencing: Sequencing,
) -> Result<(bool, usize, usize)> {
    let history = HistoryIndex::from_paired(games);
    info!(rows = history.len(), teams = history.teams().len(), "history indexed");
    let query = FeatureBuilder::new(&history, config).query(date, team_a, team_b, home)?;
    if !query.row.is_complete() {
        let (team, found) = if query.games_a == 0 { (team_a, query.games_a) } else { (team_b, query.games_b) };
        return Err(PredictError::InsufficientHistory {
            team: team.to_string(),
            date,
            found,
            wanted: config.period,
        });
    }

    let before = DateRange::new(None, date.pred_opt());
    let train = historical_features(games, before, config, sequencing)?;
    let mut classifier = kind.build();
    classifier.fit(&train.x, &train.y)?;

    let x = ndarray::Array2::from_shape_vec((1, query.row.len()), query.row.values().to_vec())
        .map_err(|e| PredictError::Model(e.to_string()))?;
    let predicted = classifier.predict(&x)?;
    Ok((predicted[0] >= 0.5, query.games_a, query.games_b))
}

/// Horizontal bar chart of classifier coefficients, saved as a PNG at `path`.
fn plot_coefficients(results: &[(String, f64)], path: &Path) -> std::result::Result<(), Box<dyn std::error::Error>> {
    if results.is_empty() {
        return Ok(());
    }
    let names: Vec<&str> = results.iter().map(|(n, _)| n.as_str()).collect();
    let coefs: Vec<f64> = results.iter().map(|(_, c)| *c).collect();
    let count = results.len();

    // X axis range with padding, never empty
    let min_x = coefs.iter().cloned().fold(0.0_f64, f64::min);
    let max_x = coefs.iter().cloned().fold(0.0_f64, f64::max);
    let pad = ((max_x - min_x) * 0.1).max(1e-3);
    let x_range = (min_x - pad)..(max_x + pad);

    let root = BitMapBackend::new(path, (1000, 600)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Feature Coefficients", ("sans-serif", 24))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(200)
        .build_cartesian_2d(x_range, 0..count)?;

    chart
        .configure_mesh()
        .disable_mesh()
        .y_labels(count)
        .y_label_formatter(&|idx| {
            let i = *idx;
            if i < count {
                names[i].to_string()
            } else {
                String::new()
            }
        })
        .x_desc("Coefficient")
        .y_desc("Feature")
        .draw()?;

    chart.draw_series(coefs.iter().enumerate().map(|(i, &coef)| {
        let start = 0.0_f64.min(coef);
        let end = 0.0_f64.max(coef);
        Rectangle::new([(start, i), (end, i + 1)], BLUE.mix(0.5).filled())
    }))?;

    root.present()?;
    Ok(())
}
