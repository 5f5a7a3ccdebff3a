//! Aggregation of judge scores into one running confidence value.

/// Scores of exactly zero are lifted to this floor before multiplying.
pub const SCORE_FLOOR: f64 = 1e-10;

/// Aggregate reported before any judge has scored.
pub const NEUTRAL_SCORE: f64 = 50.0;

/// Geometric mean of `scores`, or `None` for an empty slice.
///
/// Computed in log space so long debates cannot overflow the product.
pub fn geometric_mean(scores: &[f64]) -> Option<f64> {
    if scores.is_empty() {
        return None;
    }
    let log_sum: f64 = scores.iter().map(|s| s.max(SCORE_FLOOR).ln()).sum();
    Some((log_sum / scores.len() as f64).exp())
}

/// Every parsed score of a session, pooled across judges and epochs.
#[derive(Debug, Clone)]
pub struct ScoreBoard {
    scores: Vec<f64>,
    aggregate: f64,
}

impl Default for ScoreBoard {
    fn default() -> Self {
        Self {
            scores: Vec::new(),
            aggregate: NEUTRAL_SCORE,
        }
    }
}

impl ScoreBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a score and re-derive the aggregate from the full record.
    pub fn record(&mut self, score: f64) -> f64 {
        self.scores.push(score);
        self.aggregate = geometric_mean(&self.scores).unwrap_or(NEUTRAL_SCORE);
        self.aggregate
    }

    pub fn scores(&self) -> &[f64] {
        &self.scores
    }

    pub fn aggregate(&self) -> f64 {
        self.aggregate
    }
}
