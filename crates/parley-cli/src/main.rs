use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(name = "parley")]
#[command(about = "Parley CLI - local chat sessions with streamed answers", long_about = None)]
struct Cli {
    /// Settings file (defaults to the platform config path)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Data directory (overrides the settings file)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List chat sessions grouped by recency
    List {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Print every message of a session
    Show { id: String },
    /// Print the most recently edited session
    Newest,
    /// Rename a session; an empty name restores the placeholder
    Rename { id: String, name: String },
    /// Mark or unmark a session as favorite
    Favorite {
        id: String,
        /// Remove the mark instead of setting it
        #[arg(long)]
        off: bool,
    },
    /// Delete a session
    Delete { id: String },
    /// Drop messages back to and including the last one asked as USER
    Rollback { id: String, user: String },
    /// Remove the last message of a session
    Pop { id: String },
    /// Ask a question, stream the answer and store it
    Ask {
        /// The question; words are joined with spaces
        #[arg(required = true)]
        question: Vec<String>,
        /// Continue this session instead of starting a new one
        #[arg(long)]
        session: Option<String>,
        /// Request one complete answer instead of a stream
        #[arg(long)]
        no_stream: bool,
        #[arg(long)]
        model: Option<String>,
        #[arg(long)]
        system: Option<String>,
    },
    /// Manage custom assistants
    Assistants {
        #[command(subcommand)]
        action: AssistantAction,
    },
    /// Inspect or create the settings file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum AssistantAction {
    /// List assistants
    List,
    /// Create or update an assistant
    Save {
        owner: String,
        name: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long, default_value = "")]
        system: String,
    },
    /// List the sessions of an assistant
    Sessions { owner: String },
    /// Ask an assistant, using its settings, and store the answer in its session
    Ask {
        owner: String,
        #[arg(required = true)]
        question: Vec<String>,
        /// Continue this session of the assistant
        #[arg(long)]
        session: Option<String>,
        #[arg(long)]
        no_stream: bool,
    },
    /// Remove the last message of an assistant session
    Pop { owner: String, session: String },
    /// Drop messages of an assistant session back to a question
    Rollback {
        owner: String,
        session: String,
        user: String,
    },
    /// Delete an assistant and all of its sessions
    Delete { owner: String },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective settings
    Show,
    /// Print the settings file path
    Path,
    /// Write the default settings file if none exists
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Config { action } = &cli.command {
        let service = commands::settings_service(cli.config.as_deref())?;
        return match action {
            ConfigAction::Show => commands::config::show(&service),
            ConfigAction::Path => commands::config::path(&service),
            ConfigAction::Init => commands::config::init(&service),
        };
    }

    let ctx = commands::Context::open(cli.config.as_deref(), cli.data_dir)?;

    match cli.command {
        Commands::List { json } => commands::sessions::list(&ctx, json).await?,
        Commands::Show { id } => commands::sessions::show(&ctx, &id).await?,
        Commands::Newest => commands::sessions::newest(&ctx).await?,
        Commands::Rename { id, name } => commands::sessions::rename(&ctx, &id, &name).await?,
        Commands::Favorite { id, off } => commands::sessions::favorite(&ctx, &id, !off).await?,
        Commands::Delete { id } => commands::sessions::delete(&ctx, &id).await?,
        Commands::Rollback { id, user } => commands::sessions::rollback(&ctx, &id, &user).await?,
        Commands::Pop { id } => commands::sessions::pop(&ctx, &id).await?,
        Commands::Ask {
            question,
            session,
            no_stream,
            model,
            system,
        } => {
            let options = commands::ask::AskOptions {
                question: question.join(" "),
                session,
                stream: !no_stream,
                model,
                system,
            };
            commands::ask::run(&ctx, options).await?
        }
        Commands::Assistants { action } => match action {
            AssistantAction::List => commands::assistants::list(&ctx).await?,
            AssistantAction::Save {
                owner,
                name,
                description,
                system,
            } => commands::assistants::save(&ctx, &owner, name, description, system).await?,
            AssistantAction::Sessions { owner } => commands::assistants::sessions(&ctx, &owner).await?,
            AssistantAction::Ask {
                owner,
                question,
                session,
                no_stream,
            } => {
                commands::assistants::ask(&ctx, &owner, &question.join(" "), session.as_deref(), !no_stream)
                    .await?
            }
            AssistantAction::Pop { owner, session } => {
                commands::assistants::pop(&ctx, &owner, &session).await?
            }
            AssistantAction::Rollback {
                owner,
                session,
                user,
            } => commands::assistants::rollback(&ctx, &owner, &session, &user).await?,
            AssistantAction::Delete { owner } => commands::assistants::delete(&ctx, &owner).await?,
        },
        Commands::Config { .. } => {}
    }

    Ok(())
}
