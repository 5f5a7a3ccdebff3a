//! Turn-taking state machines for simple, judged and panel debates.
//!
//! A [`Debate`] is driven one message at a time through
//! [`Debate::next_message`]. Each call performs at most one participant turn,
//! so the caller decides when to persist, publish or stop.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::dialogue::{History, Message, Role, Stance};
use crate::error::DebateError;
use crate::judgement::parse_judgement;
use crate::participant::{Debater, Judge, Moderator, Participant};
use crate::prompts;
use crate::scoring::ScoreBoard;

/// Speaker name used for synthetic moderator lines when no moderator is seated.
pub const PLACEHOLDER_MODERATOR: &str = "mod";

/// Which state machine a session runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DebateKind {
    Simple,
    #[default]
    Judged,
    Panel,
}

impl DebateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DebateKind::Simple => "simple",
            DebateKind::Judged => "judged",
            DebateKind::Panel => "panel",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "simple" => Some(DebateKind::Simple),
            "judged" => Some(DebateKind::Judged),
            "panel" => Some(DebateKind::Panel),
            _ => None,
        }
    }

    fn is_scored(&self) -> bool {
        !matches!(self, DebateKind::Simple)
    }
}

impl std::fmt::Display for DebateKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Session id for a motion: a digest prefix of the motion plus the creation
/// time, so re-running the same motion does not overwrite the old transcript.
pub fn derive_session_id(motion: &str, created_at: DateTime<Utc>) -> String {
    let digest = hex::encode(Sha256::digest(motion.as_bytes()));
    format!("{}-{:x}", &digest[..12], created_at.timestamp_millis())
}

/// A judge's closing verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub judge: String,
    pub score: f64,
    pub justification: String,
}

fn moderator_line(session_id: &str, name: &str, text: impl Into<String>) -> Message {
    Message::new(name, Role::Moderator, text, session_id)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Opening,
    Speak,
    Judge(usize),
    Status,
    Question,
    Closing,
    Finished,
}

/// One debate session's participants, history and progress.
#[derive(Debug)]
pub struct Debate {
    kind: DebateKind,
    session_id: String,
    motion: String,
    epochs: usize,
    debaters: Vec<Debater>,
    judges: Vec<Judge>,
    moderator: Option<Moderator>,
    history: History,
    board: ScoreBoard,
    phase: Phase,
    /// Completed speaking turns.
    turn: usize,
    /// What the next speaker responds to.
    context: Option<Message>,
    /// The statement judges are currently scoring.
    statement: Option<Message>,
}

impl Debate {
    pub fn new(
        kind: DebateKind,
        session_id: impl Into<String>,
        motion: impl Into<String>,
        epochs: usize,
    ) -> Self {
        Self {
            kind,
            session_id: session_id.into(),
            motion: motion.into(),
            epochs,
            debaters: Vec::new(),
            judges: Vec::new(),
            moderator: None,
            history: History::new(),
            board: ScoreBoard::new(),
            phase: Phase::Opening,
            turn: 0,
            context: None,
            statement: None,
        }
    }

    pub fn add_debater(&mut self, debater: Debater) -> Result<(), DebateError> {
        self.claim_name(debater.name())?;
        self.debaters.push(debater);
        Ok(())
    }

    pub fn add_judge(&mut self, judge: Judge) -> Result<(), DebateError> {
        if !self.kind.is_scored() {
            return Err(DebateError::Config(format!(
                "{} debates take no judges",
                self.kind
            )));
        }
        self.claim_name(judge.name())?;
        self.judges.push(judge);
        Ok(())
    }

    pub fn set_moderator(&mut self, moderator: Moderator) -> Result<(), DebateError> {
        if !self.kind.is_scored() {
            return Err(DebateError::Config(format!(
                "{} debates take no moderator",
                self.kind
            )));
        }
        self.claim_name(moderator.name())?;
        self.moderator = Some(moderator);
        Ok(())
    }

    fn claim_name(&self, name: &str) -> Result<(), DebateError> {
        let taken = name == PLACEHOLDER_MODERATOR
            || self.debaters.iter().any(|d| d.name() == name)
            || self.judges.iter().any(|j| j.name() == name)
            || self.moderator.as_ref().is_some_and(|m| m.name() == name);
        if taken {
            return Err(DebateError::Config(format!(
                "participant name '{name}' is already taken"
            )));
        }
        Ok(())
    }

    pub fn kind(&self) -> DebateKind {
        self.kind
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn motion(&self) -> &str {
        &self.motion
    }

    pub fn epochs(&self) -> usize {
        self.epochs
    }

    pub fn debaters(&self) -> &[Debater] {
        &self.debaters
    }

    pub fn judges(&self) -> &[Judge] {
        &self.judges
    }

    pub fn moderator(&self) -> Option<&Moderator> {
        self.moderator.as_ref()
    }

    /// Every emitted message except the synthetic score status lines.
    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn scores(&self) -> &[f64] {
        self.board.scores()
    }

    pub fn aggregate(&self) -> f64 {
        self.board.aggregate()
    }

    pub fn is_finished(&self) -> bool {
        self.phase == Phase::Finished
    }

    fn total_turns(&self) -> usize {
        self.epochs * self.debaters.len()
    }

    fn after_turns(&self) -> Phase {
        if self.turn < self.total_turns() {
            Phase::Speak
        } else if self.kind.is_scored() {
            Phase::Closing
        } else {
            Phase::Finished
        }
    }

    /// Produce the next message, or `None` once the debate is over.
    ///
    /// An error ends the debate; later calls return `Ok(None)`.
    pub async fn next_message(&mut self) -> Result<Option<Message>, DebateError> {
        loop {
            let step = match self.phase {
                Phase::Finished => return Ok(None),
                Phase::Opening => self.opening().await,
                Phase::Speak => self.speak().await,
                Phase::Judge(index) => self.judge(index).await,
                Phase::Status => Ok(Some(self.status())),
                Phase::Question => self.question().await,
                Phase::Closing => self.closing().await,
            };
            match step {
                Ok(Some(msg)) => return Ok(Some(msg)),
                // The phase produced nothing and moved on.
                Ok(None) => continue,
                Err(e) => {
                    tracing::error!(session_id = %self.session_id, error = %e, "debate aborted");
                    self.phase = Phase::Finished;
                    return Err(e);
                }
            }
        }
    }

    fn record(&mut self, msg: Message) -> Message {
        self.history.append(msg.clone());
        msg
    }

    async fn opening(&mut self) -> Result<Option<Message>, DebateError> {
        tracing::info!(
            session_id = %self.session_id,
            kind = %self.kind,
            debaters = self.debaters.len(),
            judges = self.judges.len(),
            epochs = self.epochs,
            "debate starting"
        );
        let msg = match (self.kind, self.moderator.as_mut()) {
            (DebateKind::Simple, _) => {
                moderator_line(&self.session_id, PLACEHOLDER_MODERATOR, "Please begin")
            }
            (_, Some(moderator)) => {
                let text = moderator.opening_statement().await?;
                let name = moderator.name().to_string();
                moderator_line(&self.session_id, &name, text)
            }
            (_, None) => {
                let text = match self.debaters.first() {
                    Some(first) => format!("{} - please begin", first.name()),
                    None => "please begin".to_string(),
                };
                moderator_line(&self.session_id, PLACEHOLDER_MODERATOR, text)
            }
        };
        self.context = Some(msg.clone());
        self.phase = self.after_turns();
        Ok(Some(self.record(msg)))
    }

    async fn speak(&mut self) -> Result<Option<Message>, DebateError> {
        let n = self.debaters.len();
        let speaker = &mut self.debaters[self.turn % n];
        let context: Vec<Message> = self.context.iter().cloned().collect();
        let text = speaker.respond(&context).await?;
        let msg = Message::new(speaker.name(), speaker.role(), text, &self.session_id)
            .with_stance(speaker.stance());
        tracing::debug!(session_id = %self.session_id, speaker = %msg.name, turn = self.turn, "turn complete");

        self.context = Some(msg.clone());
        if self.kind.is_scored() {
            self.statement = Some(msg.clone());
            self.phase = if self.judges.is_empty() {
                Phase::Status
            } else {
                Phase::Judge(0)
            };
        } else {
            self.turn += 1;
            self.phase = self.after_turns();
        }
        Ok(Some(self.record(msg)))
    }

    /// Score the current statement with one judge, retrying once on bad format.
    async fn judge(&mut self, index: usize) -> Result<Option<Message>, DebateError> {
        let statement: Vec<Message> = self.statement.iter().cloned().collect();
        let judge = &mut self.judges[index];
        let first = judge.respond(&statement).await?;
        let (text, judgement) = match parse_judgement(&first) {
            Ok(j) => (first, j),
            Err(err) => {
                tracing::warn!(
                    session_id = %self.session_id,
                    judge = %judge.name(),
                    error = %err,
                    "malformed judgement, retrying once"
                );
                let correction = Message::new(
                    PLACEHOLDER_MODERATOR,
                    Role::Moderator,
                    prompts::JUDGEMENT_CORRECTION,
                    &self.session_id,
                );
                let second = judge.respond(&[correction]).await?;
                let judgement = parse_judgement(&second)?;
                (second, judgement)
            }
        };

        let msg = Message::new(judge.name(), Role::Judge, text, &self.session_id)
            .with_stance(Stance::Neutral)
            .with_judgement(judgement.score);
        let aggregate = self.board.record(judgement.score);
        tracing::debug!(
            session_id = %self.session_id,
            judge = %msg.name,
            score = judgement.score,
            aggregate,
            "judgement recorded"
        );

        self.phase = if index + 1 < self.judges.len() {
            Phase::Judge(index + 1)
        } else {
            Phase::Status
        };
        Ok(Some(self.record(msg)))
    }

    /// The running score line. Not part of the history.
    fn status(&mut self) -> Message {
        let msg = moderator_line(
            &self.session_id,
            PLACEHOLDER_MODERATOR,
            format!("Current Score is {:.1}", self.board.aggregate()),
        );
        self.turn += 1;
        self.statement = None;
        let n = self.debaters.len();
        let epoch_done = self.turn % n == 0;
        self.phase = if self.moderator.is_some() && epoch_done && self.turn / n < self.epochs {
            Phase::Question
        } else {
            self.after_turns()
        };
        msg
    }

    async fn question(&mut self) -> Result<Option<Message>, DebateError> {
        self.phase = Phase::Speak;
        let Some(moderator) = self.moderator.as_mut() else {
            return Ok(None);
        };
        let text = moderator.generate_question(&self.history).await?;
        let name = moderator.name().to_string();
        let msg = moderator_line(&self.session_id, &name, text);
        self.context = Some(msg.clone());
        Ok(Some(self.record(msg)))
    }

    async fn closing(&mut self) -> Result<Option<Message>, DebateError> {
        self.phase = Phase::Finished;
        let Some(moderator) = self.moderator.as_mut() else {
            return Ok(None);
        };
        let text = moderator.closing_statement(&self.history).await?;
        let name = moderator.name().to_string();
        let msg = moderator_line(&self.session_id, &name, text);
        tracing::info!(session_id = %self.session_id, aggregate = self.board.aggregate(), "debate closed");
        Ok(Some(self.record(msg)))
    }

    /// Ask every judge for a closing verdict, parsed like any judgement.
    pub async fn final_verdicts(&mut self) -> Result<Vec<Verdict>, DebateError> {
        let mut verdicts = Vec::with_capacity(self.judges.len());
        for judge in &mut self.judges {
            let summary = judge.summarize_judgement().await?;
            let parsed = parse_judgement(&summary)?;
            verdicts.push(Verdict {
                judge: judge.name().to_string(),
                score: parsed.score,
                justification: parsed.justification,
            });
        }
        Ok(verdicts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_ids_differ_per_run() {
        let t0 = Utc::now();
        let t1 = t0 + chrono::Duration::milliseconds(5);
        let a = derive_session_id("Cats are better than dogs", t0);
        let b = derive_session_id("Cats are better than dogs", t1);
        assert_ne!(a, b);
        assert_eq!(&a[..12], &b[..12]);
    }

    #[test]
    fn kind_round_trips_through_str() {
        for kind in [DebateKind::Simple, DebateKind::Judged, DebateKind::Panel] {
            assert_eq!(DebateKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(DebateKind::parse("duel"), None);
    }

    #[tokio::test]
    async fn empty_simple_debate_only_opens() {
        let mut debate = Debate::new(DebateKind::Simple, "s", "m", 3);
        let opening = debate.next_message().await.unwrap().unwrap();
        assert_eq!(opening.text, "Please begin");
        assert_eq!(opening.name, PLACEHOLDER_MODERATOR);
        assert!(debate.next_message().await.unwrap().is_none());
        assert!(debate.next_message().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn judged_without_debaters_says_please_begin() {
        let mut debate = Debate::new(DebateKind::Judged, "s", "m", 2);
        let opening = debate.next_message().await.unwrap().unwrap();
        assert_eq!(opening.text, "please begin");
        assert!(debate.next_message().await.unwrap().is_none());
        assert!(debate.is_finished());
    }
}
