//! # Agent
//!
//! The orchestrator. An [`Agent`] owns one [`Session`] bound to a working directory and
//! drives the model/tool alternation for each request. A request is consumed as a lazy
//! sequence of [`Turn`]s through [`Run`]; [`Agent::run_sync`] drains it and returns the
//! final answer.
//!
//! The model call is the only point where a run waits on the outside world, and the only
//! point where it observes cancellation. Tool calls of a turn always run to completion,
//! so every tool call in the log is followed by its result.

use crate::config::Config;
use crate::error::AgentError;
use crate::model::{Model, ModelRequest};
use crate::session::{Message, Session, ToolCall};
use crate::tool_executor::{Approval, ToolExecutor, ToolResult};
use crate::tools;
use anyhow::Result;
use console::style;
use futures::Stream;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// How the sequence continues after a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    /// Tool results were appended; the model will be consulted again.
    Continue,
    /// The model answered without tool calls. Last turn of the run.
    Finished,
    /// The turn budget is spent. Last turn of the run.
    BudgetExceeded,
}

/// One model invocation plus the tool calls it triggered and their results.
#[derive(Debug, Clone)]
pub struct Turn {
    /// 1-based position within the run.
    pub index: usize,
    pub response: Message,
    pub tool_results: Vec<ToolResult>,
    pub outcome: TurnOutcome,
}

impl Turn {
    pub fn finished(&self) -> bool {
        self.outcome == TurnOutcome::Finished
    }

    pub fn tool_calls(&self) -> &[ToolCall] {
        &self.response.tool_calls
    }
}

pub fn default_system_prompt(workdir: &Path) -> String {
    format!(
        "You are a software engineering agent working in the directory {}.
Complete the user's task by calling the available tools:
- shell: run a command in the working directory
- read_file: read a file
- write_file: create or overwrite a file
- list_files: list a directory
- apply_patch: apply a unified diff (--- a/path, +++ b/path, @@ -l,n +l,n @@)
All paths are relative to the working directory; paths outside it are rejected.
Prefer apply_patch for small edits to existing files. Context lines must match exactly.
If a tool fails, read the error and try again differently.
When the task is done, reply with a short summary and no tool calls.",
        workdir.display()
    )
}

pub struct Agent {
    config: Config,
    model: Arc<dyn Model>,
    executor: ToolExecutor,
    session: Session,
}

impl Agent {
    pub fn new(workdir: impl AsRef<Path>, config: Config, model: Arc<dyn Model>) -> Result<Self> {
        config.validate()?;
        let executor = ToolExecutor::new(workdir, config.shell_timeout())?;
        let system_prompt = config
            .system_prompt
            .clone()
            .unwrap_or_else(|| default_system_prompt(executor.workdir()));
        let session = Session::new(executor.workdir(), Some(system_prompt));
        Ok(Self {
            config,
            model,
            executor,
            session,
        })
    }

    /// Routes every tool call through `approval` before it runs.
    pub fn with_approval(mut self, approval: Arc<dyn Approval>) -> Self {
        self.executor = self.executor.with_approval(approval);
        self
    }

    /// Continues a previously saved session. Its working directory must match this agent's.
    pub fn with_session(mut self, session: Session) -> Result<Self> {
        if session.working_dir() != self.executor.workdir() {
            anyhow::bail!(
                "session belongs to {}, not {}",
                session.working_dir().display(),
                self.executor.workdir().display()
            );
        }
        self.session = session;
        Ok(self)
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn reset(&mut self) {
        self.session.reset();
    }

    /// Starts processing `request`. Nothing happens until the returned [`Run`] is polled.
    pub fn run(&mut self, request: impl Into<String>, cancel: CancellationToken) -> Run<'_> {
        Run {
            agent: self,
            request: Some(request.into()),
            cancel,
            turns: 0,
            done: false,
        }
    }

    /// Drains a run and returns the final answer.
    pub async fn run_sync(&mut self, request: impl Into<String>, cancel: CancellationToken) -> Result<String, AgentError> {
        let mut run = self.run(request, cancel);
        let mut answer = String::new();
        while let Some(turn) = run.next_turn().await {
            let turn = turn?;
            if turn.outcome == TurnOutcome::BudgetExceeded {
                return Err(AgentError::BudgetExceeded { max_turns: turn.index });
            }
            answer = turn.response.content;
        }
        Ok(answer)
    }

    fn model_request(&self) -> ModelRequest {
        ModelRequest {
            model: self.config.model.clone(),
            system_prompt: self.session.system_prompt().map(str::to_string),
            messages: self.session.snapshot(),
            tools: tools::manifest(),
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        }
    }

    fn print_request(request: &ModelRequest) {
        println!();
        println!("{}", style("Messages being sent to the model:").yellow().bold());
        for message in &request.messages {
            let message_json = serde_json::to_string_pretty(message)
                .unwrap_or_else(|e| format!("Failed to serialize message: {e}"));
            println!("{message_json}");
        }
        println!();
    }
}

/// A request in progress: a lazy, finite sequence of turns.
pub struct Run<'a> {
    agent: &'a mut Agent,
    /// Appended to the session right before the first model call.
    request: Option<String>,
    cancel: CancellationToken,
    turns: usize,
    done: bool,
}

impl<'a> Run<'a> {
    /// Produces the next turn, or `None` once the run has ended.
    ///
    /// A run ends after a finished turn, after a budget-exceeded turn, or after the first
    /// error. Errors leave the session without a partial message.
    pub async fn next_turn(&mut self) -> Option<Result<Turn, AgentError>> {
        if self.done {
            return None;
        }
        let result = self.step().await;
        match &result {
            Ok(turn) => self.done = turn.outcome != TurnOutcome::Continue,
            Err(e) => {
                warn!(err = %e, "run ended with an error");
                self.done = true;
            }
        }
        Some(result)
    }

    /// Adapts the run into a [`Stream`] of turns.
    pub fn into_stream(self) -> impl Stream<Item = Result<Turn, AgentError>> + 'a {
        futures::stream::unfold(self, |mut run| async move {
            let item = run.next_turn().await?;
            Some((item, run))
        })
    }

    async fn step(&mut self) -> Result<Turn, AgentError> {
        if self.cancel.is_cancelled() {
            return Err(AgentError::Cancelled);
        }
        if let Some(request) = self.request.take() {
            self.agent.session.append(Message::user(request));
        }

        let index = self.turns + 1;
        let request = self.agent.model_request();
        if self.agent.config.print_messages {
            Agent::print_request(&request);
        }
        debug!(turn = index, messages = request.messages.len(), "calling model");

        let model = Arc::clone(&self.agent.model);
        let response = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                info!(turn = index, "model call cancelled");
                return Err(AgentError::Cancelled);
            }
            response = model.complete(request) => response.map_err(AgentError::ModelCallFailed)?,
        };
        self.turns = index;

        self.agent.session.append(response.clone());
        if response.tool_calls.is_empty() {
            info!(turn = index, "model produced a final answer");
            return Ok(Turn {
                index,
                response,
                tool_results: Vec::new(),
                outcome: TurnOutcome::Finished,
            });
        }

        let mut tool_results = Vec::with_capacity(response.tool_calls.len());
        for call in &response.tool_calls {
            let result = self.agent.executor.execute(call).await;
            self.agent
                .session
                .append(Message::tool_result(call, result.message_content()));
            tool_results.push(result);
        }

        let outcome = if index >= self.agent.config.max_turns {
            warn!(max_turns = self.agent.config.max_turns, "turn budget exhausted");
            TurnOutcome::BudgetExceeded
        } else {
            TurnOutcome::Continue
        };
        Ok(Turn {
            index,
            response,
            tool_results,
            outcome,
        })
    }
}
