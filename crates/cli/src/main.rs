//! Shardstore CLI - schema bootstrap and user operations.
//!
//! # Usage
//!
//! ```bash
//! # Create the user table on every shard
//! shardstore init
//!
//! # Create a user (published when the queue is configured)
//! shardstore create --first-name Ada --last-name Lovelace --login ada --password p1
//!
//! # Read a user by id, skipping the cache
//! shardstore get 7 --no-cache
//!
//! # List, search and authenticate
//! shardstore list
//! shardstore search --first-name Ad --last-name Lov
//! shardstore auth --login ada --password p1
//! ```
//!
//! Configuration comes from the environment; see `shardstore::config`.

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};
use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use shardstore::StoreState;
use shardstore::config::StoreConfig;
use shardstore_core::UserId;

mod commands;

#[derive(Parser)]
#[command(name = "shardstore")]
#[command(author, version, about = "Sharded user store tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the user table and indexes on every shard
    Init,
    /// Create a user on the shard its credentials route to
    Create {
        /// Given name
        #[arg(long)]
        first_name: String,

        /// Family name
        #[arg(long)]
        last_name: String,

        /// Login name
        #[arg(long)]
        login: String,

        /// Password
        #[arg(long)]
        password: String,

        /// Email address
        #[arg(long)]
        email: Option<String>,

        /// Gender
        #[arg(long)]
        gender: Option<String>,
    },
    /// Read a user by id
    Get {
        /// User id
        id: UserId,

        /// Skip the cache and ask the shards directly
        #[arg(long)]
        no_cache: bool,
    },
    /// List every user on every shard
    List,
    /// Find users by first and last name prefix
    Search {
        /// First name prefix
        #[arg(long, default_value = "")]
        first_name: String,

        /// Last name prefix
        #[arg(long, default_value = "")]
        last_name: String,
    },
    /// Check a login and password
    Auth {
        /// Login name
        #[arg(long)]
        login: String,

        /// Password
        #[arg(long)]
        password: String,
    },
}

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &StoreConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

fn init_tracing() {
    // Defaults to info level for our crates if RUST_LOG is not set
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "shardstore=info,shardstore_cli=info".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match StoreConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing_subscriber::fmt::init();
            tracing::error!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    // Initialize Sentry (must be done before tracing subscriber)
    let _sentry_guard = init_sentry(&config);
    init_tracing();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli, config).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli, config: StoreConfig) -> Result<(), Box<dyn std::error::Error>> {
    let state = StoreState::connect(config)?;
    let store = state.store();

    match cli.command {
        Commands::Init => commands::schema::init(store).await?,
        Commands::Create {
            first_name,
            last_name,
            login,
            password,
            email,
            gender,
        } => {
            let input = commands::users::NewUser {
                first_name,
                last_name,
                login,
                password,
                email,
                gender,
            };
            commands::users::create(store, input).await?;
        }
        Commands::Get { id, no_cache } => commands::users::get(store, id, !no_cache).await?,
        Commands::List => commands::users::list(store).await?,
        Commands::Search {
            first_name,
            last_name,
        } => commands::users::search(store, &first_name, &last_name).await?,
        Commands::Auth { login, password } => {
            commands::users::authenticate(store, &login, &password).await?;
        }
    }
    Ok(())
}
