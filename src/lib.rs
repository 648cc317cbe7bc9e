pub mod agent;
pub mod backend;
pub mod cli;
pub mod client;
pub mod config;
pub mod diff;
pub mod error;
pub mod logging;
pub mod model;
pub mod patch;
pub mod sandbox;
pub mod session;
pub mod streaming_executor;
pub mod tool_executor;
pub mod tools;
pub mod ui;

pub use agent::{Agent, Turn, TurnOutcome};
pub use config::Config;
pub use error::{AgentError, PatchError, ToolError};
pub use tool_executor::{ToolExecutor, ToolResult};
