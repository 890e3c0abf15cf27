mod repl;

use std::io;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use todo_agent::Agent;
use todo_common::config::{AssistantConfig, ModelProvider};
use todo_common::{APP_NAME, logging};
use todo_model::ChatCompletionsClient;
use todo_store::{Task, TodoStore};
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "todo", about = "To-Do list assistant driven by an LLM", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Talk to the assistant at an interactive prompt (the default).
    Chat,
    /// Validate local setup and generate default config if missing.
    Doctor,
    /// Manage todos directly, without the model.
    Task {
        #[command(subcommand)]
        command: TaskCommand,
    },
    /// LLM model configuration commands.
    Model {
        #[command(subcommand)]
        command: ModelCommand,
    },
}

#[derive(Debug, Subcommand)]
enum TaskCommand {
    /// List every todo.
    List,
    /// Add a todo.
    Add {
        #[arg(required = true)]
        text: Vec<String>,
    },
    /// Case-insensitive substring search.
    Search { query: String },
    /// Delete a todo by id.
    Rm { id: i64 },
    /// Replace the text of a todo.
    Edit {
        id: i64,
        #[arg(required = true)]
        text: Vec<String>,
    },
}

#[derive(Debug, Subcommand)]
enum ModelCommand {
    /// Show the configured model provider and id.
    Show,
    /// Configure model provider and model id.
    Set {
        provider: String,
        model: String,
        #[arg(long)]
        endpoint: Option<String>,
        #[arg(long)]
        api_key_env: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        None | Some(Command::Chat) => chat(),
        Some(Command::Doctor) => doctor(),
        Some(Command::Task { command }) => task(command),
        Some(Command::Model { command }) => model(command),
    }
}

fn load_initialized_config() -> Result<AssistantConfig> {
    let (config, _, _) = AssistantConfig::load_or_create()?;
    config.validate_and_prepare()?;
    logging::init(&config.log_level);
    Ok(config)
}

fn chat() -> Result<()> {
    let config = load_initialized_config()?;
    // Fail before showing the prompt rather than on the first request.
    let api_key = config.model.resolve_api_key()?;
    let backend = ChatCompletionsClient::new(&config.model, api_key)?;
    let store = TodoStore::open(&config.db_path())?;
    info!(
        model = backend.model_id(),
        db = %config.db_path().display(),
        "assistant ready"
    );

    let mut agent = Agent::new(backend, store, config.agent.clone());
    repl::run(&mut agent, io::stdin().lock(), io::stdout(), io::stderr())
        .context("interactive prompt failed")?;
    Ok(())
}

fn doctor() -> Result<()> {
    let (config, path, created) = AssistantConfig::load_or_create()?;
    config.validate_and_prepare()?;
    logging::init(&config.log_level);

    let store = TodoStore::open(&config.db_path())?;
    let api_key = match config.model.resolve_api_key() {
        Ok(Some(_)) => "present".to_string(),
        Ok(None) => "not required".to_string(),
        Err(err) => err.to_string(),
    };

    println!("{} doctor: OK", APP_NAME);
    println!("config: {}", path.display());
    println!("created_config: {created}");
    println!("database: {}", config.db_path().display());
    println!("todos: {}", store.count()?);
    println!("provider: {}", config.model.provider.as_str());
    println!("model: {}", config.model.model_id);
    println!("api_key: {api_key}");

    Ok(())
}

fn task(command: TaskCommand) -> Result<()> {
    let config = load_initialized_config()?;
    let store = TodoStore::open(&config.db_path())?;

    match command {
        TaskCommand::List => print_tasks(&store.list_all()?),
        TaskCommand::Add { text } => {
            let id = store.create(&text.join(" "))?;
            println!("created: {id}");
        }
        TaskCommand::Search { query } => print_tasks(&store.search(&query)?),
        TaskCommand::Rm { id } => {
            if store.delete_by_id(id)? {
                println!("deleted: {id}");
            } else {
                println!("not_found: {id}");
            }
        }
        TaskCommand::Edit { id, text } => {
            if !store.update_text(id, &text.join(" "))? {
                return Err(anyhow!("no todo with id {id}"));
            }
            println!("updated: {id}");
        }
    }
    Ok(())
}

fn print_tasks(tasks: &[Task]) {
    println!("todos: {}", tasks.len());
    for task in tasks {
        println!("- {} | {} | {}", task.id, task.todo, task.updated_at);
    }
}

fn model(command: ModelCommand) -> Result<()> {
    let (mut config, path, _) = AssistantConfig::load_or_create()?;
    config.validate_and_prepare()?;
    logging::init(&config.log_level);

    match command {
        ModelCommand::Show => {
            println!("provider: {}", config.model.provider.as_str());
            println!("model: {}", config.model.model_id);
            println!(
                "endpoint: {}",
                config
                    .model
                    .base_url()
                    .unwrap_or_else(|| "<none>".to_string())
            );
            println!(
                "api_key_env: {}",
                config
                    .model
                    .api_key_env
                    .clone()
                    .unwrap_or_else(|| "<none>".to_string())
            );
        }
        ModelCommand::Set {
            provider,
            model,
            endpoint,
            api_key_env,
        } => {
            let parsed = ModelProvider::parse(&provider)
                .ok_or_else(|| anyhow!("unsupported model provider: {provider}"))?;
            config.model.endpoint =
                endpoint.or_else(|| parsed.default_endpoint().map(str::to_string));
            config.model.api_key_env =
                api_key_env.or_else(|| parsed.default_api_key_env().map(str::to_string));
            config.model.provider = parsed;
            config.model.model_id = model;
            config.validate_and_prepare()?;
            config.save(&path)?;
            println!("model_config_saved: true");
            println!("provider: {}", config.model.provider.as_str());
            println!("model: {}", config.model.model_id);
        }
    }

    Ok(())
}
