//! `wasbot` operator binary.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio_stream::StreamExt;
use tracing_subscriber::EnvFilter;

use wasbot::agent::{Replayer, ScanOutcome, StallScanner, spawn_stall_scanner};
use wasbot::channels::{BroadcastNotifier, WebhookTransport};
use wasbot::config::{Config, DatabaseConfig, tenant_offset_from_env};
use wasbot::db::{Database, MemoryStore, Store};
use wasbot::models::AccountContext;
use wasbot::tools::ToolRegistry;

#[derive(Parser, Debug)]
#[command(name = "wasbot", version, about = "Stalled-conversation reprocessing for the support desk")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the stall scanner on its interval until Ctrl-C
    Run,

    /// Run a single scan pass and print its report
    Scan,

    /// Apply database migrations
    Migrate,

    /// Print the function declarations handed to the assistant
    Functions,

    /// Dispatch one function call and print its result
    Call {
        /// Function name (e.g. find_customer)
        function: String,

        /// Arguments as a JSON object
        #[arg(default_value = "{}")]
        args: String,

        #[arg(long)]
        ticket: i64,

        #[arg(long)]
        company: i64,

        #[arg(long)]
        contact: Option<i64>,

        #[arg(long)]
        user: Option<i64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Command::Migrate => {
            let store = Store::new(&DatabaseConfig::from_env()?).await?;
            store.run_migrations().await?;
            println!("Migrations applied");
        }
        Command::Functions => {
            let registry = ToolRegistry::with_builtins(
                Arc::new(MemoryStore::new()),
                Arc::new(BroadcastNotifier::new()),
                tenant_offset_from_env()?,
            );
            println!("{}", serde_json::to_string_pretty(&registry.schemas())?);
        }
        Command::Call {
            function,
            args,
            ticket,
            company,
            contact,
            user,
        } => {
            let config = Config::from_env()?;
            let db: Arc<dyn Database> = Arc::new(Store::new(&config.database).await?);
            let notifier = Arc::new(BroadcastNotifier::new());
            let registry = ToolRegistry::with_builtins(db, notifier, config.tenant_offset);

            let mut ctx = AccountContext::new(ticket, company);
            if let Some(contact) = contact {
                ctx = ctx.with_contact(contact);
            }
            if let Some(user) = user {
                ctx = ctx.with_user(user);
            }

            let result = registry.dispatch_raw(&function, &args, &ctx).await?;
            println!("{}", result);
        }
        Command::Scan => {
            let config = Config::from_env()?;
            let scanner = build_scanner(&config).await?;
            match scanner.run_stall_scan().await? {
                ScanOutcome::AlreadyRunning => println!("Scan already running"),
                ScanOutcome::Completed(report) => println!("{:#?}", report),
            }
        }
        Command::Run => {
            let config = Config::from_env()?;
            let scanner = Arc::new(build_scanner(&config).await?);

            let recovered = scanner.recover_abandoned_markers().await?;
            if recovered > 0 {
                tracing::warn!(recovered, "Released in-progress markers left by a dead process");
            }

            tracing::info!(
                interval = ?config.scan.interval,
                batch_size = config.scan.batch_size,
                "wasbot started"
            );
            let handle = spawn_stall_scanner(Arc::clone(&scanner), config.scan.interval);

            tokio::signal::ctrl_c().await?;
            tracing::info!("Shutting down");
            handle.abort();
        }
    }

    Ok(())
}

/// Connect, migrate and assemble the scanner.
async fn build_scanner(config: &Config) -> anyhow::Result<StallScanner> {
    let store = Store::new(&config.database).await?;
    store.run_migrations().await?;

    let db: Arc<dyn Database> = Arc::new(store);
    let transport = Arc::new(WebhookTransport::new(&config.engine)?);
    let notifier = Arc::new(BroadcastNotifier::new());

    let mut notifications = Box::pin(notifier.subscribe());
    tokio::spawn(async move {
        while let Some(notification) = notifications.next().await {
            tracing::info!(
                event = %notification.event,
                rooms = ?notification.rooms,
                "Notification published"
            );
        }
    });

    let replayer = Replayer::new(Arc::clone(&db), transport, notifier);
    Ok(StallScanner::new(db, replayer, config.scan.clone()))
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("wasbot=info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
