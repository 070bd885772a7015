//! Depot CLI - offline-first warehouse client
//!
//! Usage: depot <command> [options]

mod commands;

use clap::{Parser, Subcommand};
use depot_common::telemetry::LogFormat;
use depot_common::{DepotError, MovementKind, EXIT_CONFIG_ERROR, EXIT_ERROR};

#[derive(Parser)]
#[command(
    name = "depot",
    version,
    about = "Depot offline-first warehouse client"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose/debug logging
    #[arg(long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// Skip the backend probe and act as if it were unreachable
    #[arg(long, global = true)]
    offline: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new Depot workspace
    Init,

    /// Show connectivity, pending mutations and last sync time
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Replay pending mutations against the backend
    Sync {
        /// Output the drain report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Inspect or discard the outbox
    Queue {
        #[command(subcommand)]
        action: QueueAction,
    },

    /// Manage clients
    Clients {
        #[command(subcommand)]
        action: ClientAction,
    },

    /// Manage products
    Products {
        #[command(subcommand)]
        action: ProductAction,
    },

    /// Browse sales
    Sales {
        #[command(subcommand)]
        action: SaleAction,
    },

    /// Record and browse stock movements
    Movements {
        #[command(subcommand)]
        action: MovementAction,
    },

    /// Seed local collections from the backend
    Pull,

    /// Stream realtime stock events to stdout
    Listen {
        /// Only print these events (comma-separated, e.g. "stock.entry,stock.exit")
        #[arg(long, value_delimiter = ',')]
        events: Option<Vec<String>>,
    },
}

#[derive(Subcommand)]
pub enum QueueAction {
    /// List pending mutations, oldest first
    List {
        #[arg(long)]
        json: bool,
    },

    /// Discard every pending mutation
    Clear,
}

#[derive(Subcommand)]
pub enum ClientAction {
    List {
        #[arg(long)]
        json: bool,
    },

    /// Register a client locally and queue it for sync
    Add {
        name: String,

        #[arg(long)]
        last_name: Option<String>,

        #[arg(long)]
        email: Option<String>,

        #[arg(long)]
        phone: Option<String>,

        /// National id / tax document
        #[arg(long)]
        document: Option<String>,

        #[arg(long)]
        address: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum ProductAction {
    List {
        #[arg(long)]
        json: bool,
    },

    /// Register a product locally and queue it for sync
    Add {
        name: String,

        #[arg(long)]
        price: f64,

        #[arg(long, default_value = "")]
        category: String,

        #[arg(long, default_value = "0")]
        stock: i64,

        #[arg(long, default_value = "0")]
        min_stock: i64,

        #[arg(long)]
        description: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum SaleAction {
    List {
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
pub enum MovementAction {
    List {
        #[arg(long)]
        json: bool,
    },

    /// Record a stock movement locally and queue it for sync
    Add {
        product_id: String,

        /// entry, exit or direct_sale
        #[arg(long)]
        kind: MovementKind,

        #[arg(long)]
        quantity: u32,

        #[arg(long)]
        reason: Option<String>,

        /// Email of the user recording the movement
        #[arg(long, default_value = "cli@depot.local")]
        by: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    depot_common::telemetry::init_tracing(cli.verbose, LogFormat::from_flag(cli.log_json));
    tracing::debug!("Depot CLI started");

    let offline = cli.offline;
    let result = match cli.command {
        Commands::Init => commands::sync::cmd_init().await,
        Commands::Status { json } => commands::sync::cmd_status(offline, json).await,
        Commands::Sync { json } => commands::sync::cmd_sync(offline, json).await,
        Commands::Queue { action } => commands::sync::cmd_queue(action).await,
        Commands::Pull => commands::sync::cmd_pull(offline).await,
        Commands::Clients { action } => commands::entities::cmd_clients(action).await,
        Commands::Products { action } => commands::entities::cmd_products(action).await,
        Commands::Sales { action } => commands::entities::cmd_sales(action).await,
        Commands::Movements { action } => commands::entities::cmd_movements(action).await,
        Commands::Listen { events } => commands::listen::cmd_listen(offline, events).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        let code = match e.downcast_ref::<DepotError>() {
            Some(DepotError::ConfigError(_)) => EXIT_CONFIG_ERROR,
            _ => EXIT_ERROR,
        };
        std::process::exit(code);
    }
}
