pub mod prompt;

use std::thread;
use std::time::Duration;

use thiserror::Error;
use todo_common::AgentConfig;
use todo_core::{Envelope, EnvelopeError, Message, Transcript};
use todo_model::{ChatBackend, ModelError};
use todo_store::{StoreError, TodoStore};
use todo_tools::{ToolCall, ToolError, ToolExecutor, ToolRegistry};
use tracing::{debug, info, warn};

pub use prompt::build_system_prompt;

const STORE_RETRY_DELAY: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnOutcome {
    pub output: String,
    pub model_calls: u32,
    pub tool_calls: u32,
}

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("could not parse the model reply: {0}")]
    Parse(#[from] EnvelopeError),
    #[error("model replied with a '{kind}' envelope; expected plan, action or output")]
    UnexpectedEnvelope { kind: &'static str },
    #[error("model made an invalid tool call: {0}")]
    Tool(#[source] ToolError),
    #[error("model call failed: {0}")]
    ModelCall(#[from] ModelError),
    #[error("todo store failed: {0}")]
    Store(#[source] StoreError),
    #[error("failed to encode tool result: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("no output after {0} model calls")]
    StepLimit(u32),
}

/// Drives one conversation: model round-trips, tool dispatch and transcript bookkeeping.
pub struct Agent<B> {
    backend: B,
    store: TodoStore,
    registry: ToolRegistry,
    transcript: Transcript,
    config: AgentConfig,
}

impl<B: ChatBackend> Agent<B> {
    pub fn new(backend: B, store: TodoStore, config: AgentConfig) -> Self {
        let registry = ToolRegistry::with_defaults();
        let transcript = Transcript::with_system_prompt(build_system_prompt(&registry));
        Self {
            backend,
            store,
            registry,
            transcript,
            config,
        }
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn store(&self) -> &TodoStore {
        &self.store
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Handles one user request until the model produces an `output` envelope.
    ///
    /// A failed turn leaves the agent usable: the transcript keeps everything
    /// exchanged so far and committed store changes stay committed.
    pub fn run_turn(&mut self, input: &str) -> Result<TurnOutcome, AgentError> {
        self.transcript.push_envelope(&Envelope::user(input.trim()));

        let mut parse_corrections = 0_u32;
        let mut tool_corrections = 0_u32;
        let mut tool_calls = 0_u32;

        for step in 1..=self.config.max_steps_per_turn {
            let reply = self.backend.complete(self.transcript.messages())?;

            let envelope = match Envelope::parse_reply(&reply) {
                Ok(envelope) => envelope,
                Err(err) => {
                    self.transcript.push(Message::raw_assistant(reply));
                    self.correct(&mut parse_corrections, AgentError::Parse(err))?;
                    continue;
                }
            };
            debug!(step, kind = envelope.kind(), "model envelope");

            match &envelope {
                Envelope::Output { output } => {
                    self.transcript.push_envelope(&envelope);
                    return Ok(TurnOutcome {
                        output: output.clone(),
                        model_calls: step,
                        tool_calls,
                    });
                }
                Envelope::Plan { plan } => {
                    debug!(plan = %plan, "model plan");
                    self.transcript.push_envelope(&envelope);
                }
                Envelope::Action { function, input } => {
                    self.transcript.push_envelope(&envelope);
                    let call = match ToolCall::parse(function, input) {
                        Ok(call) => call,
                        Err(err) => {
                            self.correct(&mut tool_corrections, AgentError::Tool(err))?;
                            continue;
                        }
                    };
                    let observation = match self.dispatch(&call) {
                        Ok(observation) => observation,
                        Err(err) if err.is_correctable() => {
                            self.correct(&mut tool_corrections, AgentError::Tool(err))?;
                            continue;
                        }
                        Err(ToolError::Store(err)) => return Err(AgentError::Store(err)),
                        Err(ToolError::Encode(err)) => return Err(AgentError::Encode(err)),
                        Err(err) => return Err(AgentError::Tool(err)),
                    };
                    tool_calls += 1;
                    self.transcript
                        .push_envelope(&Envelope::observation(observation));
                }
                Envelope::User { .. } | Envelope::Observation { .. } => {
                    self.transcript.push(Message::raw_assistant(reply));
                    self.correct(
                        &mut parse_corrections,
                        AgentError::UnexpectedEnvelope {
                            kind: envelope.kind(),
                        },
                    )?;
                }
            }
        }

        Err(AgentError::StepLimit(self.config.max_steps_per_turn))
    }

    fn dispatch(&self, call: &ToolCall) -> Result<String, ToolError> {
        let max_attempts = self.config.store_attempts.max(1);
        let mut attempt = 0_u32;
        loop {
            attempt += 1;
            match ToolExecutor::execute(call, &self.store) {
                Ok(observation) => {
                    info!(tool = call.name(), "tool executed");
                    return Ok(observation);
                }
                Err(ToolError::Store(err)) if !err.is_validation() && attempt < max_attempts => {
                    warn!(tool = call.name(), attempt, error = %err, "store call failed, retrying");
                    thread::sleep(STORE_RETRY_DELAY * attempt);
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Feeds an error back to the model, or fails the turn once the budget is spent.
    fn correct(&mut self, used: &mut u32, failure: AgentError) -> Result<(), AgentError> {
        if *used >= self.config.max_corrections {
            return Err(failure);
        }
        *used += 1;
        warn!(error = %failure, correction = *used, "asking model to correct its reply");
        self.transcript.push_envelope(&Envelope::observation(format!(
            "error: {failure}. Available tools: {}. Reply with exactly one JSON object of type plan, action or output.",
            self.registry.names().join(", ")
        )));
        Ok(())
    }
}
