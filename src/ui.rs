//! Terminal front end: prints the transcript of a run and hosts the interactive loop.

use crate::agent::{Agent, Turn, TurnOutcome};
use crate::session::{Message, Role, ToolCall};
use crate::tool_executor::{Approval, ToolResult};
use anyhow::Result;
use console::style;
use std::io::{self, Write};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;

/// Lines read from stdin; `None` means end of input.
pub type StdinReceiver = Arc<Mutex<mpsc::Receiver<Option<String>>>>;

const MAX_DISPLAYED_OUTPUT_LINES: usize = 20;

pub struct App {
    agent: Agent,
    stdin: StdinReceiver,
}

impl App {
    pub fn new(agent: Agent, stdin: StdinReceiver) -> Self {
        Self { agent, stdin }
    }

    /// Runs one request to completion. Ctrl+C cancels the in-flight model call.
    pub async fn process(&mut self, prompt: &str) -> Result<()> {
        println!("[{}]", style("user").blue());
        println!("{}", style(prompt).cyan());

        let cancel = CancellationToken::new();
        let ctrl_c = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    cancel.cancel();
                }
            })
        };

        let mut run = self.agent.run(prompt, cancel);
        let result = loop {
            println!("[{}]", style("assistant").green());
            match run.next_turn().await {
                Some(Ok(turn)) => {
                    display_turn(&turn);
                    match turn.outcome {
                        TurnOutcome::Continue => continue,
                        TurnOutcome::Finished => break Ok(()),
                        TurnOutcome::BudgetExceeded => {
                            eprintln!(
                                "{}",
                                style(format!("Stopped after {} turns without a final answer.", turn.index)).yellow()
                            );
                            break Ok(());
                        }
                    }
                }
                Some(Err(e)) => break Err(e),
                None => break Ok(()),
            }
        };
        ctrl_c.abort();
        result.map_err(Into::into)
    }

    pub async fn run_interactive(&mut self) -> Result<()> {
        let mut ctrl_c_pressed = false;
        loop {
            println!("{}", style(self.agent.session().summary()).dim());
            print!("\x07{} ", style("user>").cyan().bold());
            io::stdout().flush()?;

            let line = tokio::select! {
                biased;
                _ = tokio::signal::ctrl_c() => {
                    if ctrl_c_pressed {
                        break;
                    }
                    println!("\nPress Ctrl+C again to exit.");
                    ctrl_c_pressed = true;
                    continue;
                }
                line = async { self.stdin.lock().await.recv().await } => line.flatten(),
            };
            ctrl_c_pressed = false;

            let Some(input) = line else {
                // Ctrl+D
                println!();
                break;
            };
            match input.as_str() {
                "" => {}
                "exit" | "quit" => break,
                "reset" => {
                    self.agent.reset();
                    println!("{}", style("History cleared.").dim());
                }
                "history" => display_history(self.agent.session().snapshot().iter()),
                prompt => {
                    if let Err(e) = self.process(prompt).await {
                        eprintln!("{}", style(format!("{e:#}")).red());
                    }
                }
            }
        }
        println!("\nShutting down...");
        Ok(())
    }
}

/// Asks on the terminal before each tool call. Anything but `n` approves.
pub fn terminal_approval(stdin: StdinReceiver) -> Arc<dyn Approval> {
    Arc::new(move |call: &ToolCall, preview: &str| {
        println!("[{}]", style(format!("tool: {}", call.name)).magenta());
        println!("{preview}");
        print!("\x07{} ", style("Execute this tool? [Y/n]").dim());
        if io::stdout().flush().is_err() {
            return false;
        }
        let answer = tokio::task::block_in_place(|| Handle::current().block_on(async { stdin.lock().await.recv().await }));
        match answer.flatten() {
            Some(answer) => !answer.eq_ignore_ascii_case("n"),
            None => false,
        }
    })
}

/// Model text has already been streamed to stdout by the time a turn completes.
fn display_turn(turn: &Turn) {
    for (call, result) in turn.tool_calls().iter().zip(&turn.tool_results) {
        display_tool_result(call, result);
    }
}

fn display_tool_result(call: &ToolCall, result: &ToolResult) {
    println!("[{}] {}", style(format!("tool: {}", call.name)).magenta(), style(&call.arguments).dim());
    let content = result.message_content();
    let lines: Vec<&str> = content.lines().collect();
    let shown = lines.len().min(MAX_DISPLAYED_OUTPUT_LINES);
    for line in &lines[..shown] {
        if result.success {
            println!("{}", style(line).dim());
        } else {
            println!("{}", style(line).red());
        }
    }
    if lines.len() > shown {
        println!("{}", style(format!("... ({} more lines)", lines.len() - shown)).dim());
    }
}

fn display_history<'a>(messages: impl Iterator<Item = &'a Message>) {
    for message in messages {
        let label = match message.role {
            Role::User => style("user").blue(),
            Role::Model => style("assistant").green(),
            Role::Tool => style("tool").magenta(),
        };
        println!("[{label}]");
        if !message.content.is_empty() {
            println!("{}", message.content);
        }
        for call in &message.tool_calls {
            println!("{}", style(format!("-> {} {}", call.name, call.arguments)).dim());
        }
    }
}

pub fn spawn_stdin_channel() -> StdinReceiver {
    let (tx, rx) = mpsc::channel(1);
    tokio::spawn(async move {
        loop {
            let result = tokio::task::spawn_blocking(|| {
                let mut buffer = String::new();
                match io::stdin().read_line(&mut buffer) {
                    Ok(0) => Ok(None), // EOF (Ctrl+D)
                    Ok(_) => Ok(Some(buffer.trim().to_string())),
                    Err(e) => Err(e),
                }
            })
            .await;

            match result {
                Ok(Ok(line_opt)) => {
                    if tx.send(line_opt).await.is_err() {
                        break;
                    }
                }
                _ => {
                    tx.send(None).await.ok();
                    break;
                }
            }
        }
    });
    Arc::new(Mutex::new(rx))
}
