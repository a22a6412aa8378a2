//! Taskboard command-line front end
//!
//! Every invocation signs in, performs one operation through the board store
//! and prints the resulting state.

mod render;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use taskboard_core::auth::{AuthProvider, MemoryAuth, RestAuth};
use taskboard_core::board::{parse_labels, BoardStore, NewBoard, NewColumn, NewTask, Priority};
use taskboard_core::config::Backend;
use taskboard_core::remote::{MemoryStore, RemoteStore, RestClient, RestStore};
use taskboard_core::Config;

/// Kanban boards from the terminal
#[derive(Parser, Debug)]
#[command(name = "taskboard", author, version, about, long_about = None)]
struct Cli {
    /// Account email
    #[arg(long, env = "TASKBOARD_EMAIL", global = true)]
    email: Option<String>,

    /// Account password
    #[arg(long, env = "TASKBOARD_PASSWORD", hide_env_values = true, global = true)]
    password: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Register a new account
    SignUp {
        #[arg(long)]
        full_name: Option<String>,
    },
    /// List boards, newest first
    Boards,
    /// Create a board with the default columns
    CreateBoard {
        name: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        color: Option<String>,
    },
    /// Delete a board with its columns and tasks
    DeleteBoard {
        board: Uuid,
    },
    /// Print a board with its columns and tasks
    Show {
        board: Uuid,
    },
    /// Append a column to a board
    AddColumn {
        board: Uuid,
        title: String,
        #[arg(long)]
        color: Option<String>,
    },
    /// Append a task to a column
    AddTask {
        board: Uuid,
        column: Uuid,
        title: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long, default_value = "medium")]
        priority: Priority,
        /// Comma separated
        #[arg(long)]
        labels: Option<String>,
        /// RFC 3339 timestamp
        #[arg(long)]
        due: Option<DateTime<Utc>>,
        /// User id of the assignee
        #[arg(long)]
        assignee: Option<Uuid>,
    },
    /// Move a task to a column at a zero-based index
    MoveTask {
        board: Uuid,
        task: Uuid,
        column: Uuid,
        index: usize,
    },
    /// Delete a task and close the gap in its column
    DeleteTask {
        board: Uuid,
        task: Uuid,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "taskboard=info,taskboard_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = Config::from_env().context("Invalid configuration")?;
    let (remote, auth) = connect(&config).await?;

    let (email, password) = match (&cli.email, &cli.password) {
        (Some(email), Some(password)) => (email.as_str(), password.as_str()),
        _ => bail!("--email and --password are required"),
    };

    if let Command::SignUp { full_name } = &cli.command {
        auth.sign_up(email, password, full_name.clone())
            .await
            .context("Sign up failed")?;
        println!("Account created for {}", email);
        return Ok(());
    }

    auth.sign_in(email, password)
        .await
        .context("Sign in failed")?;
    let store = BoardStore::new(remote, auth.clone()).with_default_color(&config.default_color);

    let result = run(&store, cli.command).await;
    if let Some(error) = store.error().await {
        tracing::warn!("{}", error);
    }
    if let Err(err) = auth.sign_out().await {
        tracing::debug!("sign out failed: {}", err);
    }
    result
}

async fn connect(config: &Config) -> Result<(Arc<dyn RemoteStore>, Arc<dyn AuthProvider>)> {
    match &config.backend {
        Backend::Rest { url, anon_key } => {
            tracing::info!("Using backend at {}", url);
            let client = RestClient::new(url.as_str(), anon_key.as_str());
            let remote: Arc<dyn RemoteStore> = Arc::new(RestStore::new(client.clone()));
            let auth: Arc<dyn AuthProvider> = Arc::new(RestAuth::new(client));
            Ok((remote, auth))
        }
        Backend::Memory { data_dir } => {
            tracing::info!("Using data directory: {:?}", data_dir);
            let remote: Arc<dyn RemoteStore> = Arc::new(
                MemoryStore::open(Backend::store_path(data_dir))
                    .await
                    .context("Failed to open board store")?,
            );
            let auth = MemoryAuth::open(remote.clone(), Backend::accounts_path(data_dir))
                .await
                .context("Failed to open account store")?
                .with_secret(config.auth_secret.as_str())
                .with_session_ttl(config.session_ttl_seconds);
            let auth: Arc<dyn AuthProvider> = Arc::new(auth);
            Ok((remote, auth))
        }
    }
}

async fn open_board(store: &BoardStore, board_id: Uuid) -> Result<()> {
    store.fetch_boards().await?;
    store
        .select_board(Some(board_id))
        .await
        .with_context(|| format!("Board {} is not available", board_id))?;
    Ok(())
}

async fn run(store: &BoardStore, command: Command) -> Result<()> {
    match command {
        // Handled before sign-in
        Command::SignUp { .. } => {}
        Command::Boards => {
            let boards = store.fetch_boards().await?;
            print!("{}", render::boards(&boards));
        }
        Command::CreateBoard {
            name,
            description,
            color,
        } => {
            let mut draft = NewBoard::new(name);
            draft.description = description;
            draft.color = color;
            let board = store.create_board(draft).await?;
            store.select_board(Some(board.id)).await?;
            print!("{}", render::board(&store.snapshot().await));
        }
        Command::DeleteBoard { board } => {
            open_board(store, board).await?;
            store.delete_board(board).await?;
            println!("Deleted board {}", board);
        }
        Command::Show { board } => {
            open_board(store, board).await?;
            print!("{}", render::board(&store.snapshot().await));
        }
        Command::AddColumn {
            board,
            title,
            color,
        } => {
            open_board(store, board).await?;
            let mut draft = NewColumn::new(board, title);
            draft.color = color;
            store.create_column(draft).await?;
            print!("{}", render::board(&store.snapshot().await));
        }
        Command::AddTask {
            board,
            column,
            title,
            description,
            priority,
            labels,
            due,
            assignee,
        } => {
            open_board(store, board).await?;
            let mut draft = NewTask::new(column, title).with_priority(priority);
            draft.description = description;
            if let Some(due) = due {
                draft = draft.with_due_date(due);
            }
            if let Some(assignee) = assignee {
                draft = draft.with_assignee(assignee);
            }
            draft.labels = labels.as_deref().map(parse_labels).unwrap_or_default();
            store.create_task(draft).await?;
            print!("{}", render::board(&store.snapshot().await));
        }
        Command::MoveTask {
            board,
            task,
            column,
            index,
        } => {
            open_board(store, board).await?;
            store.move_task(task, column, index).await?;
            print!("{}", render::board(&store.snapshot().await));
        }
        Command::DeleteTask { board, task } => {
            open_board(store, board).await?;
            store.delete_task(task).await?;
            print!("{}", render::board(&store.snapshot().await));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_add_task() {
        let (column, assignee) = (Uuid::new_v4(), Uuid::new_v4());
        let (board_arg, column_arg) = (Uuid::new_v4().to_string(), column.to_string());
        let assignee_arg = assignee.to_string();
        let cli = Cli::try_parse_from([
            "taskboard",
            "--email",
            "owner@example.com",
            "--password",
            "secret-pw",
            "add-task",
            board_arg.as_str(),
            column_arg.as_str(),
            "Write docs",
            "--priority",
            "high",
            "--labels",
            "docs, ui",
            "--due",
            "2024-06-01T09:00:00Z",
            "--assignee",
            assignee_arg.as_str(),
        ])
        .unwrap();

        match cli.command {
            Command::AddTask {
                column: parsed,
                priority,
                labels,
                due,
                assignee: parsed_assignee,
                ..
            } => {
                assert_eq!(parsed, column);
                assert_eq!(priority, Priority::High);
                assert_eq!(labels.as_deref(), Some("docs, ui"));
                assert_eq!(due.unwrap().to_rfc3339(), "2024-06-01T09:00:00+00:00");
                assert_eq!(parsed_assignee, Some(assignee));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_rejects_unknown_priority() {
        let id = Uuid::new_v4().to_string();
        let result = Cli::try_parse_from([
            "taskboard",
            "add-task",
            id.as_str(),
            id.as_str(),
            "Task",
            "--priority",
            "critical",
        ]);
        assert!(result.is_err());
    }
}
