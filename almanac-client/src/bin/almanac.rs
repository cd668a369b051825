use almanac_client::{
    Client, ClientConfig, LocalStorage, MemoryRemote, RemoteStore, RestRemote, SyncCommand,
    SyncGate,
};
use almanac_core::fingerprint::TaskDraft;
use almanac_core::models::{Task, TaskId};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

// Retained outbox entries are retried at least this often while watching.
const RESYNC_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Parser)]
#[command(name = "almanac")]
#[command(about = "Offline-first task list for the calendar widget", long_about = None)]
struct Cli {
    /// SQLite database URL for local storage
    #[arg(long, env = "ALMANAC_DATABASE_URL")]
    database_url: Option<String>,

    /// Never contact the remote store, even when it is configured
    #[arg(long)]
    offline: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Tasks for a day (defaults to today)
    List {
        #[arg(short, long)]
        date: Option<NaiveDate>,
    },
    Add {
        text: String,
        #[arg(short, long)]
        date: Option<NaiveDate>,
    },
    /// Flip completion of a task
    Toggle { id: String },
    Edit { id: String, text: String },
    Delete { id: String },
    /// Import a JSON array of `{text, targetDate, completed?}` rows
    Import { file: PathBuf },
    /// Completed tasks by month
    History,
    Search { query: String },
    /// Push the outbox and merge the remote snapshot
    Sync,
    /// Show unconfirmed outbox entries
    Pending,
    /// Stay connected and follow remote changes until Ctrl-C
    Watch,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let mut config = ClientConfig::from_env()?;
    if let Some(url) = cli.database_url {
        config.database_url = url;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_filter.as_str()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let storage = Arc::new(LocalStorage::open(&config.database_url).await?);

    match config.remote.filter(|_| !cli.offline) {
        Some(remote_config) => {
            tracing::info!("CLI: Syncing with {}", remote_config.url);
            let remote = Arc::new(RestRemote::new(remote_config)?);
            let client = Client::open(storage, remote, SyncGate::new(true, true)).await?;
            run_command(Arc::new(client), cli.command).await
        }
        None => {
            tracing::info!("CLI: No remote configured, changes stay in the outbox");
            let remote = Arc::new(MemoryRemote::new());
            let client = Client::open(storage, remote, SyncGate::closed()).await?;
            run_command(Arc::new(client), cli.command).await
        }
    }
}

async fn run_command<R: RemoteStore>(
    client: Arc<Client<R>>,
    command: Command,
) -> Result<(), Box<dyn std::error::Error>> {
    let today = Local::now().date_naive();

    match command {
        Command::List { date } => {
            let date = date.unwrap_or(today);
            println!("Tasks for {}:", date);
            for task in client.tasks_for_date(date, today).await {
                print_task(&task);
            }
        }
        Command::Add { text, date } => {
            let task = client.add_task(&text, date.unwrap_or(today)).await?;
            println!("Created {}", task.id);
        }
        Command::Toggle { id } => {
            let task = client.toggle_task(&TaskId::from(id), today).await?;
            print_task(&task);
        }
        Command::Edit { id, text } => {
            let task = client.edit_task(&TaskId::from(id), &text).await?;
            print_task(&task);
        }
        Command::Delete { id } => {
            let id = TaskId::from(id);
            client.delete_task(&id).await?;
            println!("Deleted {}", id);
        }
        Command::Import { file } => {
            let raw = tokio::fs::read_to_string(&file).await?;
            let drafts: Vec<TaskDraft> = serde_json::from_str(&raw)?;
            let summary = client.import_tasks(drafts).await?;
            println!(
                "Imported {} tasks, skipped {} duplicates",
                summary.imported, summary.skipped
            );
        }
        Command::History => {
            for (month, tasks) in client.history().await {
                println!("{}", month);
                for task in tasks {
                    print_task(&task);
                }
            }
        }
        Command::Search { query } => {
            for task in client.search(&query).await {
                print_task(&task);
            }
        }
        Command::Sync => {
            if !client.gate().is_open() {
                println!("Remote sync is not configured; nothing to do");
                return Ok(());
            }
            let drained = client.drain().await;
            println!(
                "Pushed {} change(s), {} still pending",
                drained.confirmed, drained.retained
            );
            match client.reconcile().await {
                Some(report) => println!(
                    "Merged remote snapshot: {} adopted, {} updated, {} removed",
                    report.adopted, report.updated_from_remote, report.dropped
                ),
                None => println!("Remote snapshot unavailable, try again later"),
            }
        }
        Command::Pending => {
            let pending = client.pending_actions().await;
            println!("{} pending action(s)", pending.len());
            for action in pending {
                println!("  {} {} @ {}", action.kind(), action.id(), action.timestamp());
            }
        }
        Command::Watch => watch(client).await?,
    }

    Ok(())
}

async fn watch<R: RemoteStore>(client: Arc<Client<R>>) -> Result<(), Box<dyn std::error::Error>> {
    let (tx, rx) = mpsc::channel(32);
    let runner = {
        let client = client.clone();
        tokio::spawn(async move { client.run(rx).await })
    };

    tx.send(SyncCommand::RemoteChanged).await?;
    let forwarder = match client.connect_realtime(tx.clone()).await {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::warn!("CLI: Live updates unavailable: {}", e);
            None
        }
    };

    println!("Watching for changes, press Ctrl-C to stop");
    let mut resync = tokio::time::interval(RESYNC_INTERVAL);
    resync.tick().await;
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal?;
                break;
            }
            _ = resync.tick() => tx.send(SyncCommand::RemoteChanged).await?,
        }
    }

    tx.send(SyncCommand::Shutdown).await?;
    runner.await?;
    if let Some(forwarder) = forwarder {
        forwarder.abort();
    }
    Ok(())
}

fn print_task(task: &Task) {
    let mark = if task.completed { "x" } else { " " };
    println!("  [{}] {} {} {}", mark, task.target_date, task.text, task.id);
}
