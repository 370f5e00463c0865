//! Interactive chat with persistent, per-agent conversations.
//!
//! # Usage
//!
//! ```bash
//! # Chat with an agent, creating it on first use
//! agentchat --agent-id research --model gpt-5-mini
//!
//! # One run at high effort without streaming
//! agentchat --agent-id research --effort high --no-stream
//!
//! # List agents, inspect one, export one
//! agentchat --list
//! agentchat --info research
//! agentchat --agent-id research --export html
//!
//! # Walk through the agent's settings
//! agentchat --agent-id research --config
//! ```
//!
//! While chatting, `/help` lists the slash commands and `{filename}` in a
//! message inlines that file.

use std::error::Error;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use arrrg::CommandLine;
use futures::StreamExt;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use time::macros::format_description;
use tokio::sync::Notify;

use agentchat::agents::{self, AgentPaths};
use agentchat::backup::BackupRotation;
use agentchat::chat::{
    ChatAction, ChatArgs, ChatCommand, PlainTextRenderer, Renderer, help_text, parse_command,
};
use agentchat::config::{AgentConfig, ConfigOverrides, ReasoningSummary};
use agentchat::credentials::{self, KeySource};
use agentchat::export::{self, Conversation};
use agentchat::history::{self, DEFAULT_SEARCH_LIMIT, History};
use agentchat::models::{self, ReasoningEffort};
use agentchat::utils::time::{capture_local_offset, display, elapsed, now};
use agentchat::{Message, Session, logging};

/// Files shown by `/files` before the rest are summarized.
const MAX_LISTED_FILES: usize = 20;

type AppResult<T> = Result<T, Box<dyn Error>>;

fn main() -> AppResult<()> {
    capture_local_offset();
    tokio::runtime::Runtime::new()?.block_on(run())
}

async fn run() -> AppResult<()> {
    let (args, _) = ChatArgs::from_command_line_relaxed("agentchat [OPTIONS]");
    let mut renderer = PlainTextRenderer::with_color(args.use_color());
    let workspace = args.workspace();

    let action = match args.action() {
        Ok(action) => action,
        Err(err) => {
            renderer.print_error(&err.to_string());
            renderer.print_info("Use --list to see available agents or --agent-id ID to start one.");
            std::process::exit(1);
        }
    };

    match action {
        ChatAction::List => print_agents(&workspace, &mut renderer),
        ChatAction::Info(id) => print_agent_info(&workspace, &id, &mut renderer),
        ChatAction::Configure(id) => {
            let paths = open_paths(&workspace, &id)?;
            let _guard = logging::init(&paths.logs)?;
            configure(&paths, args.model.as_deref(), &mut renderer)
        }
        ChatAction::Export(id, format) => {
            let paths = open_paths(&workspace, &id)?;
            let _guard = logging::init(&paths.logs)?;
            let mut config = AgentConfig::load_or_create(&paths.config, args.model.as_deref());
            config.repair();
            let history = History::load(
                &paths.history,
                BackupRotation::new(&paths.backups),
                config.max_history_size,
            );
            let conversation = Conversation {
                agent_id: &paths.id,
                config: &config,
                messages: history.messages(),
                statistics: history.statistics(),
                exported_at: now(),
            };
            let path = export::export(&paths.exports, format, &conversation)?;
            renderer.print_success(&format!("Exported to: {}", path.display()));
            Ok(())
        }
        ChatAction::Chat(id) => {
            let overrides = args.overrides()?;
            let paths = open_paths(&workspace, &id)?;
            let _guard = logging::init(&paths.logs)?;
            chat(&workspace, &paths, &args, overrides, renderer).await
        }
    }
}

fn open_paths(workspace: &Path, id: &str) -> AppResult<AgentPaths> {
    agents::validate_agent_id(id)?;
    let paths = AgentPaths::new(workspace, id);
    paths.create_dirs()?;
    Ok(paths)
}

async fn chat(
    workspace: &Path,
    paths: &AgentPaths,
    args: &ChatArgs,
    overrides: ConfigOverrides,
    mut renderer: PlainTextRenderer,
) -> AppResult<()> {
    let mut rl = DefaultEditor::new()?;
    let model = match &args.model {
        Some(model) => model.clone(),
        None => AgentConfig::load(&paths.config)
            .map(|c| c.model)
            .unwrap_or_else(|_| models::DEFAULT_MODEL.to_string()),
    };
    let api_key = match credentials::resolve_api_key(&paths.secrets, &model) {
        Some((key, source)) => {
            if source == KeySource::Environment {
                renderer.print_info("Using API key from environment.");
            }
            key
        }
        None => {
            let key = rl.readline("Enter your OpenAI API key: ")?.trim().to_string();
            credentials::save_api_key(
                &paths.secrets,
                &workspace.join(".gitignore"),
                &model,
                &key,
            )?;
            renderer.print_success(&format!(
                "API key saved ({})",
                credentials::mask_key(&key)
            ));
            key
        }
    };
    let mut session = Session::open(workspace, &paths.id, args.model.as_deref(), &api_key)?;

    let interrupted = Arc::new(AtomicBool::new(false));
    let wake = Arc::new(Notify::new());
    {
        let interrupted = Arc::clone(&interrupted);
        let wake = Arc::clone(&wake);
        ctrlc::set_handler(move || {
            interrupted.store(true, Ordering::Relaxed);
            wake.notify_one();
        })?;
    }

    print_header(&session, &overrides, &mut renderer);

    loop {
        interrupted.store(false, Ordering::Relaxed);
        let line = match rl.readline(&renderer.prompt()) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => {
                renderer.print_warning("Use /quit to exit.");
                continue;
            }
            Err(ReadlineError::Eof) => {
                renderer.print_info("Goodbye!");
                break;
            }
            Err(err) => {
                renderer.print_error(&format!("Input error: {err}"));
                break;
            }
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let _ = rl.add_history_entry(line);

        if let Some(command) = parse_command(line) {
            if command == ChatCommand::Quit {
                renderer.print_success("Goodbye! Chat session ended.");
                break;
            }
            run_command(command, workspace, &mut session, &mut rl, &mut renderer);
            continue;
        }

        renderer.start_response();
        let mut reply = session.send(line, &overrides);
        let mut abandoned = false;
        loop {
            tokio::select! {
                chunk = reply.next() => match chunk {
                    Some(text) => renderer.print_text(&text),
                    None => break,
                },
                _ = wake.notified() => {
                    if interrupted.swap(false, Ordering::Relaxed) {
                        abandoned = true;
                        break;
                    }
                }
            }
        }
        drop(reply);
        if abandoned {
            renderer.print_interrupted();
        } else {
            renderer.finish_response();
        }
    }
    Ok(())
}

fn run_command(
    command: ChatCommand,
    workspace: &Path,
    session: &mut Session,
    rl: &mut DefaultEditor,
    renderer: &mut PlainTextRenderer,
) {
    match command {
        ChatCommand::Help => {
            renderer.print_heading("Commands");
            for line in help_text().lines() {
                println!("    {line}");
            }
            print_model_details(&session.config().model, renderer);
        }
        ChatCommand::History(n) => {
            let recent = session.history().recent(n);
            if recent.is_empty() {
                renderer.print_info("No messages in history.");
                return;
            }
            renderer.print_heading(&format!("Last {} messages:", recent.len()));
            for message in recent {
                print_message(message, &history::preview(&message.content), renderer);
            }
        }
        ChatCommand::Search(term) => {
            let hits = session.search(&term, DEFAULT_SEARCH_LIMIT);
            if hits.is_empty() {
                renderer.print_info(&format!("No matches found for '{term}'."));
                return;
            }
            renderer.print_heading(&format!("Found {} matches for '{term}':", hits.len()));
            for hit in &hits {
                print_message(&hit.message, &hit.preview, renderer);
            }
        }
        ChatCommand::Stats => print_statistics(session, renderer),
        ChatCommand::ShowConfig => print_config(session.config(), renderer),
        ChatCommand::Export(format) => match session.export(format) {
            Ok(path) => renderer.print_success(&format!("Exported to: {}", path.display())),
            Err(err) => renderer.print_error(&format!("Export failed: {err}")),
        },
        ChatCommand::Clear => {
            let confirmed = rl
                .readline("Clear conversation history? (y/N): ")
                .map(|answer| matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
                .unwrap_or(false);
            if confirmed {
                session.clear_history();
                renderer.print_success("Conversation history cleared.");
            }
        }
        ChatCommand::Files => {
            let files = session.list_includable_files();
            if files.is_empty() {
                renderer.print_info("No supported files found for inclusion.");
            } else {
                renderer.print_heading("Available files for inclusion:");
                for file in files.iter().take(MAX_LISTED_FILES) {
                    println!("   {file}");
                }
                if files.len() > MAX_LISTED_FILES {
                    println!("   ... and {} more files", files.len() - MAX_LISTED_FILES);
                }
            }
            renderer.print_info("Use {filename} in your message to include file contents.");
        }
        ChatCommand::Info => {
            if let Err(err) = print_agent_info(workspace, session.agent_id(), renderer) {
                renderer.print_error(&err.to_string());
            }
        }
        ChatCommand::Effort(effort) => {
            if apply(session, renderer, |c| c.reasoning_effort = effort) {
                let timeout = session.timeout().as_secs();
                renderer.print_success(&format!(
                    "Reasoning effort set to {effort} (timeout: {timeout}s)"
                ));
            }
        }
        ChatCommand::Temperature(value) => {
            if apply(session, renderer, |c| c.temperature = value) {
                renderer.print_success(&format!("Temperature set to {value}"));
            }
        }
        ChatCommand::Stream(on) => {
            if apply(session, renderer, |c| c.stream = on) {
                renderer.print_success(if on {
                    "Streaming enabled."
                } else {
                    "Streaming disabled."
                });
            }
        }
        ChatCommand::System(prompt) => {
            let cleared = prompt.is_none();
            if apply(session, renderer, |c| c.system_prompt = prompt) {
                renderer.print_success(if cleared {
                    "System prompt cleared."
                } else {
                    "System prompt set."
                });
            }
        }
        ChatCommand::Invalid(message) => {
            renderer.print_error(&message);
            renderer.print_info("Type /help for available commands.");
        }
        ChatCommand::Quit => {}
    }
}

fn apply<F>(session: &mut Session, renderer: &mut PlainTextRenderer, update: F) -> bool
where
    F: FnOnce(&mut AgentConfig),
{
    match session.update_config(update) {
        Ok(()) => true,
        Err(err) => {
            renderer.print_error(&err.to_string());
            false
        }
    }
}

fn print_header(session: &Session, overrides: &ConfigOverrides, renderer: &mut PlainTextRenderer) {
    let effective = session.config().merged(overrides);
    renderer.print_heading("Interactive Chat Session");
    renderer.print_field(
        "Model",
        &format!(
            "{} ({})",
            models::display_name(&effective.model),
            effective.model
        ),
    );
    renderer.print_field("Agent", session.agent_id());
    renderer.print_field("Temperature", &effective.temperature.to_string());
    renderer.print_field("Reasoning", effective.reasoning_effort.as_str());
    renderer.print_field("Streaming", if effective.stream { "on" } else { "off" });
    renderer.print_field("Messages", &session.history().len().to_string());
    renderer.print_info("\nType /help for commands, /quit to exit.\n");
}

fn print_model_details(model: &str, renderer: &mut PlainTextRenderer) {
    let Ok(descriptor) = models::lookup(model) else {
        return;
    };
    renderer.print_heading("Current model:");
    renderer.print_field(descriptor.name, descriptor.id);
    renderer.print_field("Description", descriptor.description);
    let timeouts: Vec<String> = ReasoningEffort::ALL
        .iter()
        .map(|e| format!("{e}={}s", descriptor.timeout(*e).as_secs()))
        .collect();
    renderer.print_field("Timeouts", &timeouts.join(", "));
}

fn print_message(message: &Message, text: &str, renderer: &mut PlainTextRenderer) {
    let time = message
        .timestamp
        .format(format_description!("[hour]:[minute]:[second]"))
        .unwrap_or_default();
    renderer.print_message_line(&time, message.role.as_str(), text);
}

fn print_statistics(session: &Session, renderer: &mut PlainTextRenderer) {
    let stats = session.statistics();
    let model = &session.config().model;
    renderer.print_heading("Conversation Statistics:");
    renderer.print_field(
        "Model",
        &format!("{model} ({})", models::display_name(model)),
    );
    renderer.print_field("Total messages", &stats.total_messages.to_string());
    renderer.print_field("User messages", &stats.user_messages.to_string());
    renderer.print_field("Assistant messages", &stats.assistant_messages.to_string());
    renderer.print_field("Total characters", &stats.total_characters.to_string());
    renderer.print_field(
        "Average message length",
        &stats.average_message_length.to_string(),
    );
    if let (Some(first), Some(last)) = (stats.first_message, stats.last_message) {
        renderer.print_field("First message", &display(&first));
        renderer.print_field("Last message", &display(&last));
    }
    if let Some(duration) = stats.duration {
        renderer.print_field("Duration", &elapsed(duration));
    }
}

fn print_config(config: &AgentConfig, renderer: &mut PlainTextRenderer) {
    renderer.print_heading("Current Configuration:");
    renderer.print_field(
        "model",
        &format!("{} ({})", config.model, models::display_name(&config.model)),
    );
    renderer.print_field("temperature", &config.temperature.to_string());
    renderer.print_field(
        "reasoning_effort",
        &format!(
            "{} (timeout: {}s)",
            config.reasoning_effort,
            models::timeout_for(&config.model, config.reasoning_effort).as_secs()
        ),
    );
    renderer.print_field("reasoning_summary", &config.reasoning_summary.to_string());
    renderer.print_field(
        "max_output_tokens",
        &config
            .max_output_tokens
            .map(|t| t.to_string())
            .unwrap_or_else(|| "unset".to_string()),
    );
    renderer.print_field("max_history_size", &config.max_history_size.to_string());
    renderer.print_field("stream", &config.stream.to_string());
    renderer.print_field(
        "system_prompt",
        config.system_prompt.as_deref().unwrap_or("(none)"),
    );
    renderer.print_field("text_verbosity", &config.text_verbosity.to_string());
    renderer.print_field("top_p", &config.top_p.to_string());
}

fn print_agents(workspace: &Path, renderer: &mut PlainTextRenderer) -> AppResult<()> {
    let agents = agents::list_agents(workspace)?;
    if agents.is_empty() {
        renderer.print_info("No agents found. Start one with --agent-id ID.");
        return Ok(());
    }
    renderer.print_heading(&format!("Available Agents ({}):", agents.len()));
    for agent in &agents {
        println!();
        renderer.print_field("Agent", &agent.id);
        renderer.print_field(
            "Model",
            &format!("{} ({})", models::display_name(&agent.model), agent.model),
        );
        renderer.print_field(
            "Messages",
            &format!("{} ({} bytes)", agent.message_count, agent.history_size),
        );
        renderer.print_field(
            "Settings",
            &format!(
                "temperature {}, effort {}",
                agent.temperature, agent.reasoning_effort
            ),
        );
        if let Some(updated) = agent.updated_at {
            renderer.print_field("Updated", &display(&updated));
        }
    }
    Ok(())
}

fn print_agent_info(workspace: &Path, id: &str, renderer: &mut PlainTextRenderer) -> AppResult<()> {
    let info = agents::agent_info(workspace, id)?;
    renderer.print_heading(&format!("Agent Information: {id}"));
    renderer.print_field("Directory", &info.paths.root.display().to_string());
    match &info.config {
        Some(config) => {
            renderer.print_field(
                "Model",
                &format!("{} ({})", models::display_name(&config.model), config.model),
            );
            renderer.print_field("Created", &display(&config.created_at));
            renderer.print_field("Updated", &display(&config.updated_at));
            renderer.print_field("Temperature", &config.temperature.to_string());
            renderer.print_field("Reasoning effort", config.reasoning_effort.as_str());
            renderer.print_field("Streaming", &config.stream.to_string());
        }
        None => renderer.print_warning("   No readable config."),
    }
    let stats = &info.statistics;
    renderer.print_field("Messages", &stats.total_messages.to_string());
    renderer.print_field(
        "User / assistant",
        &format!("{} / {}", stats.user_messages, stats.assistant_messages),
    );
    renderer.print_field("History size", &format!("{} bytes", info.history_size));
    if !info.files.is_empty() {
        renderer.print_heading("Files:");
        for (path, size) in &info.files {
            println!("   {} ({size} bytes)", path.display());
        }
    }
    Ok(())
}

fn configure(paths: &AgentPaths, model: Option<&str>, renderer: &mut PlainTextRenderer) -> AppResult<()> {
    let mut rl = DefaultEditor::new()?;
    let model = model.unwrap_or(models::DEFAULT_MODEL);
    let mut config = AgentConfig::for_model(model);
    renderer.print_heading("Creating Agent Configuration");
    renderer.print_info("Press Enter to keep the default shown in brackets.");
    print_model_details(model, renderer);
    println!();

    let answer = rl.readline(&format!("Temperature (0.0-2.0) [{}]: ", config.temperature))?;
    if !answer.trim().is_empty() {
        match answer.trim().parse::<f64>() {
            Ok(value) if (0.0..=2.0).contains(&value) => config.temperature = value,
            _ => renderer.print_warning("   Temperature must be between 0.0 and 2.0, using default"),
        }
    }

    let answer = rl.readline(&format!(
        "Reasoning effort (low/medium/high) [{}]: ",
        config.reasoning_effort
    ))?;
    if let Ok(effort) = answer.trim().parse::<ReasoningEffort>() {
        config.reasoning_effort = effort;
        let timeout = models::timeout_for(model, effort).as_secs();
        renderer.print_success(&format!(
            "   Timeout for {effort} effort: {timeout}s ({}min {}s)",
            timeout / 60,
            timeout % 60
        ));
    }

    let answer = rl.readline(&format!(
        "Reasoning summary (auto/detailed/none) [{}]: ",
        config.reasoning_summary
    ))?;
    if let Ok(summary) = answer.trim().parse::<ReasoningSummary>() {
        config.reasoning_summary = summary;
    }

    let answer = rl.readline("System prompt (optional): ")?;
    if !answer.trim().is_empty() {
        config.system_prompt = Some(answer.trim().to_string());
    }

    let answer = rl.readline("Max output tokens (optional): ")?;
    if !answer.trim().is_empty() {
        match answer.trim().parse::<u32>() {
            Ok(tokens) => config.max_output_tokens = Some(tokens),
            Err(_) => renderer.print_warning("   Invalid token count, leaving unset"),
        }
    }

    let answer = rl.readline(&format!(
        "Enable streaming (y/n) [{}]: ",
        if config.stream { "y" } else { "n" }
    ))?;
    match answer.trim().to_lowercase().as_str() {
        "n" | "no" | "false" => config.stream = false,
        "y" | "yes" | "true" => config.stream = true,
        _ => {}
    }

    config.validate()?;
    config.save(&paths.config);
    renderer.print_success("Configuration saved successfully.");
    Ok(())
}
