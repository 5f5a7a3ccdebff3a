//! Session builders: turn a [`DebateRequest`] into a seated [`Debate`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::debate::{Debate, DebateKind};
use crate::dialogue::Stance;
use crate::error::DebateError;
use crate::llm::{ModelParams, Provider, TextGenerator};
use crate::names::NameRegistry;
use crate::participant::{Debater, Judge, JudgeKind, Moderator, ModeratorScript};
use crate::prompts;
use crate::tools::Toolbox;

pub const DEFAULT_EPOCHS: usize = 2;

/// Panel domains used when a request names none.
pub const DEFAULT_DOMAINS: &[&str] = &["economics", "ethics", "technology"];

fn default_epochs() -> usize {
    DEFAULT_EPOCHS
}

/// Parameters for creating a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebateRequest {
    pub motion: String,
    #[serde(default)]
    pub mode: DebateKind,
    /// Provider override; the server default applies when absent.
    #[serde(default)]
    pub llm: Option<Provider>,
    #[serde(default = "default_epochs")]
    pub epochs: usize,
    /// Debater framing override with `{motion}` and `{stance}` placeholders.
    #[serde(default)]
    pub debater_prompt: Option<String>,
    /// Judge role override with a `{motion}` placeholder.
    #[serde(default)]
    pub judge_prompt: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
    /// `None` means tools on for panels and off for debates.
    #[serde(default)]
    pub use_tools: Option<bool>,
    #[serde(default)]
    pub domains: Option<Vec<String>>,
    /// Background context; replaces the stored profile when given.
    #[serde(default)]
    pub context: Option<String>,
}

impl DebateRequest {
    pub fn new(motion: impl Into<String>, mode: DebateKind) -> Self {
        Self {
            motion: motion.into(),
            mode,
            llm: None,
            epochs: DEFAULT_EPOCHS,
            debater_prompt: None,
            judge_prompt: None,
            model: None,
            temperature: None,
            use_tools: None,
            domains: None,
            context: None,
        }
    }

    pub fn uses_tools(&self) -> bool {
        self.use_tools.unwrap_or(self.mode == DebateKind::Panel)
    }

    pub fn model_params(&self) -> ModelParams {
        ModelParams {
            model: self.model.clone(),
            temperature: self.temperature,
        }
    }

    pub fn validate(&self) -> Result<(), DebateError> {
        if self.motion.trim().is_empty() {
            return Err(DebateError::Config("motion must not be empty".into()));
        }
        match self.temperature {
            Some(t) if !(0.0..=2.0).contains(&t) => Err(DebateError::Config(format!(
                "temperature {t} is outside [0, 2]"
            ))),
            _ => Ok(()),
        }
    }

    fn domains(&self) -> Vec<String> {
        match &self.domains {
            Some(d) if !d.is_empty() => d.clone(),
            _ => DEFAULT_DOMAINS.iter().map(|d| d.to_string()).collect(),
        }
    }
}

/// Seats participants for each session kind.
pub struct Runner {
    generator: Arc<dyn TextGenerator>,
    toolbox: Toolbox,
}

impl Runner {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            generator,
            toolbox: Toolbox::web_lookup(),
        }
    }

    pub fn with_toolbox(mut self, toolbox: Toolbox) -> Self {
        self.toolbox = toolbox;
        self
    }

    pub fn build(&self, request: &DebateRequest, session_id: &str) -> Result<Debate, DebateError> {
        request.validate()?;
        let mut names = NameRegistry::new();
        let mut debate = Debate::new(request.mode, session_id, &request.motion, request.epochs);
        match request.mode {
            DebateKind::Simple => self.seat_debaters(&mut debate, request, &mut names)?,
            DebateKind::Judged => self.seat_judged(&mut debate, request, &mut names)?,
            DebateKind::Panel => self.seat_panel(&mut debate, request, &mut names)?,
        }
        tracing::info!(
            session_id,
            kind = %request.mode,
            tools = request.uses_tools(),
            "session seated"
        );
        Ok(debate)
    }

    fn maybe_tools(&self, debater: Debater, request: &DebateRequest) -> Debater {
        if request.uses_tools() {
            debater.with_tools(self.toolbox.clone())
        } else {
            debater
        }
    }

    /// One debater for and one against the motion.
    fn seat_debaters(
        &self,
        debate: &mut Debate,
        request: &DebateRequest,
        names: &mut NameRegistry,
    ) -> Result<(), DebateError> {
        let template = request.debater_prompt.as_deref().unwrap_or(prompts::DEBATER);
        for stance in [Stance::For, Stance::Against] {
            let framing = prompts::with_context(
                prompts::fill(
                    template,
                    &[("motion", request.motion.as_str()), ("stance", stance.as_str())],
                ),
                request.context.as_deref(),
            );
            let debater = Debater::new(names.next(), stance, framing, self.generator.clone());
            debate.add_debater(self.maybe_tools(debater, request))?;
        }
        Ok(())
    }

    /// Two debaters, a dynamic expert judge, a fact-checking judge and a moderator.
    fn seat_judged(
        &self,
        debate: &mut Debate,
        request: &DebateRequest,
        names: &mut NameRegistry,
    ) -> Result<(), DebateError> {
        self.seat_debaters(debate, request, names)?;
        let motion = request.motion.as_str();
        let context = request.context.as_deref();

        let expert = match &request.judge_prompt {
            Some(role) => Judge::new(
                names.next(),
                judge_framing(role, motion, context),
                self.generator.clone(),
            ),
            None => Judge::dynamic_expert(
                names.next(),
                motion,
                request.context.clone(),
                self.generator.clone(),
            ),
        };
        debate.add_judge(expert)?;

        let detector_role = request
            .judge_prompt
            .as_deref()
            .unwrap_or(prompts::BULLSHIT_DETECTOR);
        debate.add_judge(Judge::with_kind(
            names.next(),
            JudgeKind::BullshitDetector,
            judge_framing(detector_role, motion, context),
            self.generator.clone(),
        ))?;

        debate.set_moderator(Moderator::new(
            names.next(),
            motion,
            prompts::with_context(
                prompts::fill(prompts::MODERATOR_SYSTEM, &[("motion", motion)]),
                context,
            ),
            ModeratorScript::debate(),
            self.generator.clone(),
        ))
    }

    /// One panelist per domain, a convergence judge and a panel chair.
    fn seat_panel(
        &self,
        debate: &mut Debate,
        request: &DebateRequest,
        names: &mut NameRegistry,
    ) -> Result<(), DebateError> {
        let motion = request.motion.as_str();
        let context = request.context.as_deref();
        for domain in request.domains() {
            let framing = prompts::with_context(
                prompts::fill(
                    prompts::PANEL_PARTICIPANT,
                    &[("motion", motion), ("domain", domain.as_str())],
                ),
                context,
            );
            let panelist = Debater::panelist(names.next(), domain, framing, self.generator.clone());
            debate.add_debater(self.maybe_tools(panelist, request))?;
        }

        debate.add_judge(Judge::with_kind(
            names.next(),
            JudgeKind::Panel,
            prompts::with_context(
                prompts::fill(prompts::PANEL_JUDGE, &[("motion", motion)]),
                context,
            ),
            self.generator.clone(),
        ))?;

        debate.set_moderator(Moderator::new(
            names.next(),
            motion,
            prompts::with_context(
                prompts::fill(prompts::PANEL_MODERATOR_SYSTEM, &[("motion", motion)]),
                context,
            ),
            ModeratorScript::panel(),
            self.generator.clone(),
        ))
    }
}

fn judge_framing(role: &str, motion: &str, context: Option<&str>) -> String {
    prompts::with_context(
        prompts::judge_framing(&prompts::fill(role, &[("motion", motion)])),
        context,
    )
}
