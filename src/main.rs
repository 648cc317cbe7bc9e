use anyhow::Result;
use clap::Parser;
use console::style;
use std::sync::Arc;
use taskloop::agent::Agent;
use taskloop::streaming_executor::OpenRouterModel;
use taskloop::{cli, client, config, logging, ui};

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();
    let cli = cli::Cli::parse();
    let config = config::load(&cli.overrides)?;

    let client = client::initialize_client(&config)?;
    let model = Arc::new(OpenRouterModel::new(client).with_print_stream(true));

    println!("Backend: {:?}", config.backend);
    println!("Model: {}", config.model);

    let stdin = ui::spawn_stdin_channel();
    let auto_approve = config.auto_approve;
    let mut agent = Agent::new(&cli.directory, config, model)?;
    if !auto_approve {
        agent = agent.with_approval(ui::terminal_approval(Arc::clone(&stdin)));
    }
    println!("{}", style(format!("Working directory: {}", agent.session().working_dir().display())).dim());

    let mut app = ui::App::new(agent, stdin);
    match cli.prompt {
        Some(prompt) => app.process(&prompt).await,
        None => app.run_interactive().await,
    }
}
