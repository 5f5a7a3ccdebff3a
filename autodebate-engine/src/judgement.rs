//! Parsing of judge output of the form `"<score> <justification>"`.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::DebateError;

static JUDGEMENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^(\d+(?:\.\d+)?)\s+(.+)$").expect("judgement pattern is valid")
});

/// A parsed judge verdict.
#[derive(Debug, Clone, PartialEq)]
pub struct Judgement {
    pub score: f64,
    pub justification: String,
}

/// Extract the leading score and the justification that follows it.
///
/// The score must lie in `[0, 100]`; surrounding whitespace is ignored.
pub fn parse_judgement(text: &str) -> Result<Judgement, DebateError> {
    let trimmed = text.trim();
    let caps = JUDGEMENT_RE.captures(trimmed).ok_or_else(|| {
        DebateError::JudgementFormat(format!(
            "expected '<score> <justification>', got {trimmed:?}"
        ))
    })?;
    let score: f64 = caps[1]
        .parse()
        .map_err(|_| DebateError::JudgementFormat(format!("unreadable score {:?}", &caps[1])))?;
    if !(0.0..=100.0).contains(&score) {
        return Err(DebateError::JudgementFormat(format!(
            "score {score} is out of range [0, 100]"
        )));
    }
    Ok(Judgement {
        score,
        justification: caps[2].to_string(),
    })
}
