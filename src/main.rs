//! Tallyho - account credentials, session tokens and interaction tallies

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tallyho::{
    accounts::{AccountRegistry, RegisterRequest},
    auth::{extract_token_from_header, Claims, CredentialStore},
    clock::SystemClock,
    config::{Args, LogFormat},
    db::{
        AccountStore, InMemoryAccountStore, InMemoryInteractionLedger, InMemoryResourceStore,
        InteractionLedger, MongoAccountStore, MongoClient, MongoInteractionLedger,
        MongoResourceStore, ResourceStore,
    },
    interactions::InteractionCoordinator,
    notify::{LogNotifier, MailgunNotifier, NotificationQueue, Notifier},
    types::{AccountId, InteractionKind, ResourceId},
    Result, TallyError,
};

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("GIT_COMMIT_SHORT"),
    ", built ",
    env!("BUILD_TIMESTAMP"),
    ")"
);

/// How long pending emails get to go out before the process exits
const NOTIFICATION_DRAIN_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Parser, Debug)]
#[command(name = "tallyho", version, long_version = LONG_VERSION)]
#[command(about = "Account credentials, session tokens and like/strike tallies")]
struct Cli {
    #[command(flatten)]
    args: Args,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create an account and print a session
    Register {
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: Option<String>,
        #[arg(long, env = "TALLYHO_PASSWORD", hide_env_values = true)]
        password: String,
        /// Defaults to the password
        #[arg(long)]
        password_confirmation: Option<String>,
    },
    /// Check credentials and print a session
    Login {
        #[arg(long)]
        username: String,
        #[arg(long, env = "TALLYHO_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Show an account; only the token's own account is visible
    Account {
        /// Session token, raw or as "Bearer <token>"
        #[arg(long, env = "TALLYHO_TOKEN", hide_env_values = true)]
        token: String,
        /// Account to fetch; defaults to the token's account
        #[arg(long)]
        id: Option<String>,
    },
    /// Like a resource as the token's account
    Like {
        #[arg(long, env = "TALLYHO_TOKEN", hide_env_values = true)]
        token: String,
        resource: String,
    },
    /// Strike a resource as the token's account
    Strike {
        #[arg(long, env = "TALLYHO_TOKEN", hide_env_values = true)]
        token: String,
        resource: String,
    },
    /// Show a resource's counters
    Resource { resource: String },
    /// Verify a session token and print its claims
    VerifyToken { token: String },
}

/// Everything a command needs
struct Services {
    registry: AccountRegistry,
    interactions: InteractionCoordinator,
    resources: Arc<dyn ResourceStore>,
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Self::Register { .. } => "register",
            Self::Login { .. } => "login",
            Self::Account { .. } => "account",
            Self::Like { .. } => "like",
            Self::Strike { .. } => "strike",
            Self::Resource { .. } => "resource",
            Self::VerifyToken { .. } => "verify-token",
        }
    }

    /// Whether the command depends on an account registered in an earlier run
    fn needs_earlier_state(&self) -> bool {
        matches!(
            self,
            Self::Login { .. } | Self::Account { .. } | Self::Like { .. } | Self::Strike { .. }
        )
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let args = &cli.args;

    // Logs go to stderr so stdout stays machine readable
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("tallyho={},info", args.log_level).into());
    let subscriber = tracing_subscriber::registry().with(filter);
    match args.log_format {
        LogFormat::Json => subscriber
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        LogFormat::Pretty => subscriber
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
    }

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!("======================================");
    info!("  Tallyho {}", env!("CARGO_PKG_VERSION"));
    info!("======================================");
    info!("Build: {} ({})", env!("GIT_COMMIT_SHORT"), env!("BUILD_TIMESTAMP"));
    info!("Mode: {}", if args.dev_mode { "DEVELOPMENT" } else { "PRODUCTION" });
    if args.dev_mode {
        info!("Storage: in-memory (not persisted between runs)");
    } else {
        info!("MongoDB: {} / {}", args.mongodb_uri, args.mongodb_db);
    }
    info!("Token expiry: {}", args.token_expiry);
    info!(
        "Mail: {}",
        if args.mailgun_api_key.is_some() { "mailgun" } else { "log only" }
    );
    info!("======================================");

    if cli.command.needs_earlier_state() {
        if let Err(e) = args.require_persistent_stores(cli.command.name()) {
            report_error(&e);
            std::process::exit(1);
        }
    }

    let (services, delivery) = match build_services(args).await {
        Ok(built) => built,
        Err(e) => {
            error!("Startup failed: {}", e);
            report_error(&e);
            std::process::exit(1);
        }
    };

    let outcome = execute(&services, cli.command).await;

    // Dropping the registry closes the notification queue; give the
    // delivery task a bounded window to flush
    drop(services);
    if tokio::time::timeout(NOTIFICATION_DRAIN_TIMEOUT, delivery).await.is_err() {
        warn!("Pending notifications not delivered within {:?}", NOTIFICATION_DRAIN_TIMEOUT);
    }

    match outcome {
        Ok(value) => {
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(())
        }
        Err(e) => {
            report_error(&e);
            std::process::exit(1);
        }
    }
}

async fn build_services(args: &Args) -> Result<(Services, JoinHandle<()>)> {
    let settings = args.settings();
    let tokens = args.token_service()?;
    let credentials = CredentialStore::new(settings.hash_cost)?;

    let (accounts, resources, ledger): (
        Arc<dyn AccountStore>,
        Arc<dyn ResourceStore>,
        Arc<dyn InteractionLedger>,
    ) = if args.dev_mode {
        (
            Arc::new(InMemoryAccountStore::new()),
            Arc::new(InMemoryResourceStore::new()),
            Arc::new(InMemoryInteractionLedger::with_clock(
                settings.claim_lease,
                Arc::new(SystemClock),
            )),
        )
    } else {
        let mongo = MongoClient::new(&args.mongodb_uri, &args.mongodb_db).await?;
        info!("MongoDB connected successfully");
        (
            Arc::new(MongoAccountStore::open(&mongo).await?),
            Arc::new(MongoResourceStore::open(&mongo).await?),
            Arc::new(MongoInteractionLedger::open(&mongo, settings.claim_lease).await?),
        )
    };

    let notifier: Arc<dyn Notifier> = match &args.mailgun_api_key {
        Some(key) if !args.dev_mode => Arc::new(
            MailgunNotifier::new(&args.mailgun_api_base, &args.mail_domain, key.clone())
                .map_err(|e| TallyError::Config(e.to_string()))?,
        ),
        _ => Arc::new(LogNotifier),
    };
    let (notifications, delivery) =
        NotificationQueue::spawn(notifier, settings.notification_queue_size);

    let registry = AccountRegistry::new(
        accounts.clone(),
        credentials,
        tokens,
        settings.policies,
        settings.welcome,
        notifications,
    );
    let interactions = InteractionCoordinator::new(accounts, resources.clone(), ledger);

    Ok((
        Services {
            registry,
            interactions,
            resources,
        },
        delivery,
    ))
}

async fn execute(services: &Services, command: Command) -> Result<Value> {
    match command {
        Command::Register {
            username,
            email,
            password,
            password_confirmation,
        } => {
            let password_confirmation = password_confirmation.unwrap_or_else(|| password.clone());
            let session = services
                .registry
                .register(RegisterRequest {
                    username,
                    email,
                    password,
                    password_confirmation,
                })
                .await?;
            Ok(serde_json::to_value(session)?)
        }
        Command::Login { username, password } => {
            let session = services.registry.login(&username, &password).await?;
            Ok(serde_json::to_value(session)?)
        }
        Command::Account { token, id } => {
            let requester = authenticated_account(services, &token)?;
            let target = match id {
                Some(id) => AccountId::new(id)?,
                None => requester.clone(),
            };
            let account = services.registry.get_one_auth(&requester, &target).await?;
            Ok(serde_json::to_value(account)?)
        }
        Command::Like { token, resource } => {
            interact(services, InteractionKind::Like, &token, resource).await
        }
        Command::Strike { token, resource } => {
            interact(services, InteractionKind::Strike, &token, resource).await
        }
        Command::Resource { resource } => {
            let id = ResourceId::new(resource)?;
            let counters = services
                .resources
                .find_by_id(&id)
                .await?
                .ok_or_else(|| TallyError::NotFound(format!("resource {id} not found")))?;
            Ok(serde_json::to_value(counters)?)
        }
        Command::VerifyToken { token } => {
            let claims = verified_claims(services, &token)?;
            Ok(serde_json::to_value(claims)?)
        }
    }
}

async fn interact(
    services: &Services,
    kind: InteractionKind,
    token: &str,
    resource: String,
) -> Result<Value> {
    let acting = authenticated_account(services, token)?;
    let resource = ResourceId::new(resource)?;

    let outcome = services.interactions.record(kind, &resource, &acting).await?;
    Ok(serde_json::to_value(outcome)?)
}

fn verified_claims(services: &Services, token: &str) -> Result<Claims> {
    let token = extract_token_from_header(Some(token))
        .ok_or_else(|| TallyError::TokenInvalid("missing token".into()))?;
    services.registry.authenticate(token)
}

fn authenticated_account(services: &Services, token: &str) -> Result<AccountId> {
    let claims = verified_claims(services, token)?;
    AccountId::new(claims.sub)
}

fn report_error(e: &TallyError) {
    let body = json!({
        "error": e.code(),
        "message": e.to_string(),
        "retryable": e.is_retryable(),
    });
    eprintln!("{body:#}");
}
