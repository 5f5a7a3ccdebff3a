//! Debate participants: debaters, panelists, judges and the moderator.
//!
//! Each participant owns its private [`Conversation`] and a handle to the
//! text generator. Variants carry only their own state; there is no shared
//! base type beyond [`Persona`].

use std::sync::Arc;

use async_trait::async_trait;

use crate::conversation::Conversation;
use crate::dialogue::{History, Message, Role, Stance};
use crate::error::ProviderError;
use crate::llm::{
    ChatMessage, ChatTurn, ContentBlock, MessageContent, TextGenerator, ToolResultBlock,
    split_turns,
};
use crate::prompts;
use crate::tools::Toolbox;

/// Upper bound on generate/tool round trips in one tool-enabled turn.
pub const MAX_TOOL_ITERATIONS: usize = 5;

/// The capability every rotating participant offers.
#[async_trait]
pub trait Participant: Send {
    fn name(&self) -> &str;
    fn role(&self) -> Role;
    fn stance(&self) -> Stance {
        Stance::Neutral
    }

    /// Absorb `recent` into memory, generate once, remember and return the reply.
    async fn respond(&mut self, recent: &[Message]) -> Result<String, ProviderError>;
}

/// Identity, memory and generator shared by every participant kind.
pub struct Persona {
    name: String,
    role: Role,
    conversation: Conversation,
    generator: Arc<dyn TextGenerator>,
}

impl Persona {
    pub fn new(
        name: impl Into<String>,
        role: Role,
        system_prompt: impl Into<String>,
        generator: Arc<dyn TextGenerator>,
    ) -> Self {
        Self {
            name: name.into(),
            role,
            conversation: Conversation::new(system_prompt),
            generator,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    async fn complete(&mut self) -> Result<String, ProviderError> {
        let response = self.generator.generate(self.conversation.turns()).await?;
        self.conversation.push_assistant(response.clone());
        Ok(response)
    }

    async fn respond(&mut self, recent: &[Message]) -> Result<String, ProviderError> {
        self.conversation.absorb(&self.name, recent);
        self.complete().await
    }

    async fn instruct(&mut self, instruction: &str) -> Result<String, ProviderError> {
        self.conversation.push_user(instruction);
        self.complete().await
    }
}

impl std::fmt::Debug for Persona {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Persona")
            .field("name", &self.name)
            .field("role", &self.role)
            .field("turns", &self.conversation.len())
            .finish()
    }
}

// ── Debaters and panelists ─────────────────────────────────────────────

/// What a rotating speaker represents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Position {
    /// Argues for or against the motion.
    Side(Stance),
    /// Contributes a domain perspective without a side.
    Domain(String),
}

/// A speaker in the turn rotation.
#[derive(Debug)]
pub struct Debater {
    persona: Persona,
    position: Position,
    tools: Option<Toolbox>,
}

impl Debater {
    pub fn new(
        name: impl Into<String>,
        stance: Stance,
        system_prompt: impl Into<String>,
        generator: Arc<dyn TextGenerator>,
    ) -> Self {
        Self {
            persona: Persona::new(name, Role::Debater, system_prompt, generator),
            position: Position::Side(stance),
            tools: None,
        }
    }

    /// A stance-free panelist framed by a domain label.
    pub fn panelist(
        name: impl Into<String>,
        domain: impl Into<String>,
        system_prompt: impl Into<String>,
        generator: Arc<dyn TextGenerator>,
    ) -> Self {
        Self {
            persona: Persona::new(name, Role::Panelist, system_prompt, generator),
            position: Position::Domain(domain.into()),
            tools: None,
        }
    }

    /// Enable the tool-augmented answer loop.
    pub fn with_tools(mut self, tools: Toolbox) -> Self {
        self.tools = Some(tools);
        self
    }

    pub fn position(&self) -> &Position {
        &self.position
    }

    pub fn domain(&self) -> Option<&str> {
        match &self.position {
            Position::Domain(d) => Some(d),
            Position::Side(_) => None,
        }
    }

    pub fn uses_tools(&self) -> bool {
        self.tools.as_ref().is_some_and(|t| !t.is_empty())
    }

    pub fn conversation(&self) -> &Conversation {
        self.persona.conversation()
    }

    /// ReAct-style loop: generate, run requested tools, feed results back.
    ///
    /// A step that requests tools is never the final answer. When the
    /// iteration cap is hit the last generated text is returned instead, or,
    /// if every step was a bare tool request, one plain completion without
    /// tools.
    async fn respond_with_tools(&mut self, tools: &Toolbox) -> Result<String, ProviderError> {
        let (system, mut messages) = split_turns(self.persona.conversation.turns());
        let defs = tools.definitions();
        let mut last_text = String::new();

        for iteration in 0..MAX_TOOL_ITERATIONS {
            let reply = self.persona.generator.chat(&system, &messages, &defs).await?;
            if !reply.text.trim().is_empty() {
                last_text = reply.text.clone();
            }
            if !reply.wants_tools() {
                self.persona.conversation.push_assistant(reply.text.clone());
                return Ok(reply.text);
            }

            messages.push(reply.to_assistant_message());
            let mut results = Vec::with_capacity(reply.tool_uses.len());
            for tu in &reply.tool_uses {
                tracing::debug!(debater = %self.persona.name, tool = %tu.name, iteration, "tool call");
                let block = match tools.execute(&tu.name, &tu.input).await {
                    Ok(out) => ToolResultBlock {
                        tool_use_id: tu.id.clone(),
                        content: out,
                        is_error: None,
                    },
                    Err(e) => {
                        tracing::warn!(debater = %self.persona.name, tool = %tu.name, error = %e, "tool failed");
                        ToolResultBlock {
                            tool_use_id: tu.id.clone(),
                            content: format!("Tool error: {e}"),
                            is_error: Some(true),
                        }
                    }
                };
                results.push(ContentBlock::ToolResult(block));
            }
            messages.push(ChatMessage {
                role: "user".to_string(),
                content: MessageContent::Blocks(results),
            });
        }

        tracing::warn!(
            debater = %self.persona.name,
            "tool loop hit {MAX_TOOL_ITERATIONS} iterations without a final answer"
        );
        if last_text.is_empty() {
            return self.persona.complete().await;
        }
        self.persona.conversation.push_assistant(last_text.clone());
        Ok(last_text)
    }
}

#[async_trait]
impl Participant for Debater {
    fn name(&self) -> &str {
        self.persona.name()
    }

    fn role(&self) -> Role {
        self.persona.role
    }

    fn stance(&self) -> Stance {
        match self.position {
            Position::Side(stance) => stance,
            Position::Domain(_) => Stance::Neutral,
        }
    }

    async fn respond(&mut self, recent: &[Message]) -> Result<String, ProviderError> {
        match self.tools.clone().filter(|t| !t.is_empty()) {
            Some(tools) => {
                self.persona.conversation.absorb(&self.persona.name, recent);
                self.respond_with_tools(&tools).await
            }
            None => self.persona.respond(recent).await,
        }
    }
}

// ── Judges ─────────────────────────────────────────────────────────────

/// The judging variants. Mechanics are shared; framing differs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JudgeKind {
    Expert,
    /// Expertise is discovered lazily on the first `respond`.
    DynamicExpert {
        motion: String,
        context: Option<String>,
        expertise: Option<String>,
    },
    BullshitDetector,
    /// Scores panel convergence rather than for/against persuasion.
    Panel,
}

/// A participant that scores every statement it hears.
#[derive(Debug)]
pub struct Judge {
    persona: Persona,
    kind: JudgeKind,
}

impl Judge {
    pub fn new(
        name: impl Into<String>,
        system_prompt: impl Into<String>,
        generator: Arc<dyn TextGenerator>,
    ) -> Self {
        Self::with_kind(name, JudgeKind::Expert, system_prompt, generator)
    }

    pub fn with_kind(
        name: impl Into<String>,
        kind: JudgeKind,
        system_prompt: impl Into<String>,
        generator: Arc<dyn TextGenerator>,
    ) -> Self {
        Self {
            persona: Persona::new(name, Role::Judge, system_prompt, generator),
            kind,
        }
    }

    /// A judge whose domain framing is decided on first use.
    ///
    /// Construction performs no generator calls.
    pub fn dynamic_expert(
        name: impl Into<String>,
        motion: impl Into<String>,
        context: Option<String>,
        generator: Arc<dyn TextGenerator>,
    ) -> Self {
        let motion = motion.into();
        let framing = prompts::with_context(
            prompts::judge_framing(&prompts::fill(prompts::EXPERT_JUDGE, &[("motion", motion.as_str())])),
            context.as_deref(),
        );
        Self::with_kind(
            name,
            JudgeKind::DynamicExpert {
                motion,
                context,
                expertise: None,
            },
            framing,
            generator,
        )
    }

    pub fn kind(&self) -> &JudgeKind {
        &self.kind
    }

    /// The discovered expertise phrase, once known.
    pub fn expertise(&self) -> Option<&str> {
        match &self.kind {
            JudgeKind::DynamicExpert { expertise, .. } => expertise.as_deref(),
            _ => None,
        }
    }

    pub fn system_prompt(&self) -> &str {
        self.persona.conversation().system_prompt()
    }

    pub fn conversation(&self) -> &Conversation {
        self.persona.conversation()
    }

    /// Ask for a final verdict under the same `<score> <justification>` contract.
    pub async fn summarize_judgement(&mut self) -> Result<String, ProviderError> {
        self.persona.instruct(prompts::JUDGE_SUMMARY).await
    }

    async fn discover_expertise(&mut self) -> Result<(), ProviderError> {
        let JudgeKind::DynamicExpert {
            motion,
            context,
            expertise,
        } = &mut self.kind
        else {
            return Ok(());
        };
        if expertise.is_some() {
            return Ok(());
        }

        let question = [
            ChatTurn::system(prompts::EXPERTISE_DISCOVERY_SYSTEM),
            ChatTurn::user(prompts::fill(
                prompts::EXPERTISE_DISCOVERY,
                &[("motion", motion.as_str())],
            )),
        ];
        let phrase = self.persona.generator.generate(&question).await?.trim().to_string();
        tracing::info!(judge = %self.persona.name, expertise = %phrase, "dynamic judge expertise discovered");

        let framing = prompts::with_context(
            prompts::judge_framing(&prompts::fill(
                prompts::DYNAMIC_EXPERT_JUDGE,
                &[("motion", motion.as_str()), ("expertise", phrase.as_str())],
            )),
            context.as_deref(),
        );
        self.persona.conversation.set_system_prompt(framing);
        *expertise = Some(phrase);
        Ok(())
    }
}

#[async_trait]
impl Participant for Judge {
    fn name(&self) -> &str {
        self.persona.name()
    }

    fn role(&self) -> Role {
        Role::Judge
    }

    async fn respond(&mut self, recent: &[Message]) -> Result<String, ProviderError> {
        self.discover_expertise().await?;
        self.persona.respond(recent).await
    }
}

// ── Moderator ──────────────────────────────────────────────────────────

/// Instruction templates a moderator works from.
#[derive(Debug, Clone)]
pub struct ModeratorScript {
    pub opening: String,
    pub question: String,
    pub closing: String,
}

impl ModeratorScript {
    pub fn debate() -> Self {
        Self {
            opening: prompts::MODERATOR_OPENING.to_string(),
            question: prompts::MODERATOR_QUESTION.to_string(),
            closing: prompts::MODERATOR_CLOSING.to_string(),
        }
    }

    pub fn panel() -> Self {
        Self {
            opening: prompts::PANEL_MODERATOR_OPENING.to_string(),
            question: prompts::PANEL_MODERATOR_QUESTION.to_string(),
            closing: prompts::PANEL_MODERATOR_CLOSING.to_string(),
        }
    }
}

/// Frames the debate; never part of the speaking rotation.
#[derive(Debug)]
pub struct Moderator {
    persona: Persona,
    motion: String,
    script: ModeratorScript,
    /// How much of the session history is already in memory.
    replayed: usize,
}

impl Moderator {
    pub fn new(
        name: impl Into<String>,
        motion: impl Into<String>,
        system_prompt: impl Into<String>,
        script: ModeratorScript,
        generator: Arc<dyn TextGenerator>,
    ) -> Self {
        Self {
            persona: Persona::new(name, Role::Moderator, system_prompt, generator),
            motion: motion.into(),
            script,
            replayed: 0,
        }
    }

    pub fn name(&self) -> &str {
        self.persona.name()
    }

    pub fn conversation(&self) -> &Conversation {
        self.persona.conversation()
    }

    pub async fn opening_statement(&mut self) -> Result<String, ProviderError> {
        let prompt = prompts::fill(&self.script.opening, &[("motion", self.motion.as_str())]);
        self.persona.instruct(&prompt).await
    }

    pub async fn generate_question(&mut self, history: &History) -> Result<String, ProviderError> {
        self.replay(history);
        let prompt = self.script.question.clone();
        self.persona.instruct(&prompt).await
    }

    pub async fn closing_statement(&mut self, history: &History) -> Result<String, ProviderError> {
        self.replay(history);
        let prompt = self.script.closing.clone();
        self.persona.instruct(&prompt).await
    }

    /// Bring memory up to date with the session history.
    ///
    /// The moderator's own statements are already in memory as assistant turns.
    fn replay(&mut self, history: &History) {
        let start = self.replayed.min(history.len());
        let fresh: Vec<Message> = history.messages()[start..]
            .iter()
            .filter(|m| m.name != self.persona.name)
            .cloned()
            .collect();
        let name = self.persona.name.clone();
        self.persona.conversation.absorb(&name, &fresh);
        self.replayed = history.len();
    }
}
