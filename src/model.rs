// Classifiers behind a `fit`/`predict` interface, plus accuracy and cross-validation.
use clap::ValueEnum;
use linfa::prelude::*;
use linfa_logistic::{FittedLogisticRegression, LogisticRegression};
use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::{debug, info};

use crate::error::{PredictError, Result};

/// A binary classifier over feature rows; labels are 1.0 (win) / 0.0 (loss).
pub trait Classifier: Send {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()>;
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>>;
}

/// Column means and spreads of the training rows. Constant columns keep unit spread.
#[derive(Debug, Clone)]
struct Scaling {
    mean: Array1<f64>,
    std: Array1<f64>,
}

impl Scaling {
    fn fit(x: &Array2<f64>) -> Result<Self> {
        let mean = x
            .mean_axis(Axis(0))
            .ok_or_else(|| PredictError::Model("no rows to fit".into()))?;
        let std = x.std_axis(Axis(0), 0.0).mapv(|s| if s > 1e-12 { s } else { 1.0 });
        Ok(Self { mean, std })
    }

    fn apply(&self, x: &Array2<f64>) -> Array2<f64> {
        (x - &self.mean) / &self.std
    }
}

/// L2-penalised logistic regression on standardised columns.
///
/// Box-score columns are linearly dependent (REB = OREB + DREB); the penalty
/// keeps the weights finite.
pub struct LogisticClassifier {
    alpha: f64,
    max_iterations: u64,
    fitted: Option<(Scaling, FittedLogisticRegression<f64, bool>)>,
}

impl Default for LogisticClassifier {
    fn default() -> Self {
        Self {
            alpha: 1.0,
            max_iterations: 200,
            fitted: None,
        }
    }
}

impl LogisticClassifier {
    /// `(feature, coefficient)` sorted by magnitude, largest first. Weights are
    /// per standard deviation of the feature; positive favours a win.
    pub fn coefficients(&self, names: &[String]) -> Vec<(String, f64)> {
        let Some((_, model)) = &self.fitted else {
            return Vec::new();
        };
        let mut out: Vec<(String, f64)> = names.iter().cloned().zip(model.params().iter().copied()).collect();
        out.sort_by(|a, b| b.1.abs().total_cmp(&a.1.abs()));
        out
    }
}

impl Classifier for LogisticClassifier {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        let scaling = Scaling::fit(x)?;
        let ds = Dataset::new(scaling.apply(x), y.mapv(|v| v >= 0.5));
        let model = LogisticRegression::default()
            .alpha(self.alpha)
            .max_iterations(self.max_iterations)
            .fit(&ds)
            .map_err(|e| PredictError::Model(e.to_string()))?;
        debug!(intercept = model.intercept(), "logistic fit");
        self.fitted = Some((scaling, model));
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let (scaling, model) = self
            .fitted
            .as_ref()
            .ok_or_else(|| PredictError::Model("logistic classifier is not fitted".into()))?;
        if x.ncols() != scaling.mean.len() {
            return Err(PredictError::Model(format!(
                "expected {} features, got {}",
                scaling.mean.len(),
                x.ncols()
            )));
        }
        let won: Array1<bool> = model.predict(&scaling.apply(x));
        Ok(won.mapv(|w| if w { 1.0 } else { 0.0 }))
    }
}

/// Always predicts the most frequent training label. Ties go to 1.0.
#[derive(Debug, Clone, Default)]
pub struct MajorityClassifier {
    class: Option<f64>,
}

impl Classifier for MajorityClassifier {
    fn fit(&mut self, _x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        if y.is_empty() {
            return Err(PredictError::Model("no labels to fit".into()));
        }
        let wins = y.iter().filter(|&&v| v >= 0.5).count();
        self.class = Some(if 2 * wins >= y.len() { 1.0 } else { 0.0 });
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let class = self
            .class
            .ok_or_else(|| PredictError::Model("majority classifier is not fitted".into()))?;
        Ok(Array1::from_elem(x.nrows(), class))
    }
}

/// Named classifier variants selectable from the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModelKind {
    Logistic,
    Majority,
}

impl ModelKind {
    pub fn build(self) -> Box<dyn Classifier> {
        match self {
            ModelKind::Logistic => Box::new(LogisticClassifier::default()),
            ModelKind::Majority => Box::new(MajorityClassifier::default()),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ModelKind::Logistic => "logistic",
            ModelKind::Majority => "majority",
        }
    }
}

/// Share of predictions equal to the truth.
pub fn accuracy(truth: &Array1<f64>, predicted: &Array1<f64>) -> f64 {
    if truth.is_empty() {
        return 0.0;
    }
    let hits = truth
        .iter()
        .zip(predicted.iter())
        .filter(|(t, p)| (*t - *p).abs() < 0.5)
        .count();
    hits as f64 / truth.len() as f64
}

/// Mean accuracy over `folds` shuffled folds.
pub fn cross_validate(kind: ModelKind, x: &Array2<f64>, y: &Array1<f64>, folds: usize, seed: u64) -> Result<f64> {
    let n = y.len();
    if folds < 2 || folds > n {
        return Err(PredictError::Model(format!("cannot split {n} rows into {folds} folds")));
    }
    let mut order: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    order.shuffle(&mut rng);

    let mut total = 0.0;
    for fold in 0..folds {
        let (test, train): (Vec<(usize, usize)>, Vec<(usize, usize)>) =
            order.iter().copied().enumerate().partition(|(pos, _)| pos % folds == fold);
        let test: Vec<usize> = test.into_iter().map(|(_, i)| i).collect();
        let train: Vec<usize> = train.into_iter().map(|(_, i)| i).collect();

        let mut model = kind.build();
        model.fit(&x.select(Axis(0), &train), &y.select(Axis(0), &train))?;
        let predicted = model.predict(&x.select(Axis(0), &test))?;
        let score = accuracy(&y.select(Axis(0), &test), &predicted);
        debug!(fold, score, "fold scored");
        total += score;
    }
    let mean = total / folds as f64;
    info!(model = kind.name(), folds, accuracy = mean, "cross-validated");
    Ok(mean)
}
