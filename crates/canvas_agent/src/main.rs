use std::io::{self, BufRead, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use agent_store::{new_session_id, FileStore};
use anyhow::Context;
use canvas_agent::agent::{Agent, Mode};
use canvas_agent::commands::{parse_slash_command, SlashCommand, HELP_TEXT};
use canvas_agent::config::AgentConfig;
use canvas_agent::persist::Persistence;
use canvas_agent::providers::provider_from_config;
use canvas_agent::runtime::RuntimeController;
use canvas_core::{ChatHistoryItem, MemoryCanvas};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_LOG_FILTER: &str = "canvas_agent=info,canvas_core=info";
const TURN_TIMEOUT: Duration = Duration::from_secs(300);

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let (session, prompt) = parse_args(std::env::args().skip(1));
    let config = AgentConfig::from_env().context("failed to load configuration")?;
    let provider = provider_from_config(&config).context("failed to initialize provider")?;
    let profile = provider.profile();

    let session = session.unwrap_or_else(new_session_id);
    let persistence = Persistence::new(Box::new(FileStore::new(&config.store_dir)), &session);
    let agent = Agent::new(MemoryCanvas::new(), profile.models.clone())
        .with_settings(config.settings.clone())
        .with_persistence(persistence);
    info!(
        session = %session,
        provider = %profile.provider_id,
        store = %config.store_dir.display(),
        "canvas agent ready"
    );

    let controller = RuntimeController::new(Arc::new(Mutex::new(agent)), provider);

    if let Some(prompt) = prompt {
        run_prompt(&controller, &prompt);
        return Ok(());
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    write!(stdout, "> ")?;
    stdout.flush()?;
    for line in stdin.lock().lines() {
        let line = line.context("failed to read stdin")?;
        match parse_slash_command(&line) {
            Some(SlashCommand::Quit) => break,
            Some(command) => run_command(&controller, command),
            None if line.trim().is_empty() => {}
            None => run_prompt(&controller, &line),
        }
        write!(stdout, "> ")?;
        stdout.flush()?;
    }

    controller.with_agent(|agent, host| agent.cancel(host));
    Ok(())
}

/// `[--session <id>] [prompt words...]`
fn parse_args(mut args: impl Iterator<Item = String>) -> (Option<String>, Option<String>) {
    let mut session = None;
    let mut words = Vec::new();
    while let Some(arg) = args.next() {
        if arg == "--session" {
            session = args.next();
        } else {
            words.push(arg);
        }
    }
    let prompt = Some(words.join(" ")).filter(|prompt| !prompt.trim().is_empty());
    (session, prompt)
}

fn run_prompt(controller: &Arc<RuntimeController>, prompt: &str) {
    let start = controller.with_agent(|agent, host| {
        let before = agent.history().get().len();
        agent.prompt(prompt, host).map(|_| before)
    });
    let before = match start {
        Ok(before) => before,
        Err(error) => {
            eprintln!("{error}");
            return;
        }
    };

    if !controller.wait_until_idle(TURN_TIMEOUT) {
        warn!("turn did not finish in time; cancelling");
        controller.with_agent(|agent, host| agent.cancel(host));
    }

    controller.with_agent(|agent, _| {
        for item in agent.history().get().iter().skip(before + 1) {
            print_history_item(item);
        }
        if let Mode::Error(error) = agent.mode().get() {
            eprintln!("turn failed: {error}");
        }
    });
}

fn run_command(controller: &Arc<RuntimeController>, command: SlashCommand) {
    controller.with_agent(|agent, host| match command {
        SlashCommand::Help => println!("{HELP_TEXT}"),
        SlashCommand::Reset => {
            agent.reset(host);
            println!("conversation cleared");
        }
        SlashCommand::Cancel => {
            if !agent.cancel(host) {
                println!("no active turn");
            }
        }
        SlashCommand::Model(None) => println!("model: {}", agent.cycle_model()),
        SlashCommand::Model(Some(name)) => match agent.set_model(&name) {
            Ok(()) => println!("model: {name}"),
            Err(error) => println!("{error}; available: {}", agent.models().join(", ")),
        },
        SlashCommand::Shapes => {
            for shape in agent.canvas().page_shapes() {
                let bounds = shape.bounds();
                println!(
                    "{} {} at ({}, {}) {}x{}",
                    shape.id.simple(),
                    shape.type_name(),
                    bounds.x,
                    bounds.y,
                    bounds.w,
                    bounds.h
                );
            }
        }
        SlashCommand::Accept(index) => {
            if let Err(error) = agent.accept(index) {
                println!("{error}");
            }
        }
        SlashCommand::Reject(index) => match agent.reject(index) {
            Ok(report) if report.skipped.is_empty() => println!("rejected"),
            Ok(report) => println!(
                "rejected; left {} shape(s) edited since untouched",
                report.skipped.len()
            ),
            Err(error) => println!("{error}"),
        },
        SlashCommand::Quit => {}
        SlashCommand::Unknown(command) => println!("unknown command: {command}"),
    });
}

fn print_history_item(item: &ChatHistoryItem) {
    match item {
        ChatHistoryItem::Action { action, info, .. } if action.kind() == Some("message") => {
            let text = action
                .get("text")
                .and_then(|value| value.as_str())
                .unwrap_or(info.description.as_str());
            println!("agent: {text}");
        }
        ChatHistoryItem::Action { info, .. } => println!("  - {}", info.description),
        ChatHistoryItem::Continuation { message } => println!("(follow-up) {message}"),
        ChatHistoryItem::Prompt { message, .. } => println!("you: {message}"),
    }
}
