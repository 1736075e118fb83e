use anyhow::{Context, Result};
use armtree::arm::{format_arm_error, ArmCredentials, ArmHttpClient};
use armtree::config::Config;
use armtree::resource::{HierarchyResolver, Release, ResourceNode};
use armtree::terraform::{self, Export, SaveOutcome};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Navigate an Azure resource-manager hierarchy
#[derive(Parser, Debug)]
#[command(name = "armtree", version, about, long_about = None)]
struct Args {
    /// Subscription used for provider api-version listings
    #[arg(short, long)]
    subscription: Option<String>,

    /// Resource-manager endpoint
    #[arg(long)]
    endpoint: Option<String>,

    /// Output format for nodes
    #[arg(short, long, value_enum, default_value = "json")]
    output: OutputFormat,

    /// Log level for debugging
    #[arg(long, value_enum, default_value = "off")]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Resolve a resource id and print the node
    Show { id: String },
    /// Print a node's path and its direct children
    Tree { id: String },
    /// Re-fetch a single resource, bypassing the cache
    Update { id: String },
    /// Export a management group as Terraform
    Export {
        id: String,
        /// Write to this file instead of stdout (never overwrites)
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Remember a default subscription in the config file
    SetSubscription { subscription_id: String },
    /// Show the api-version selected for a resource type
    Versions {
        /// `<namespace>/<resourceType>`
        resource_type: String,
        #[arg(long, value_enum, default_value = "stable")]
        release: ReleaseArg,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Json,
    Yaml,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ReleaseArg {
    Stable,
    Latest,
}

impl From<ReleaseArg> for Release {
    fn from(value: ReleaseArg) -> Self {
        match value {
            ReleaseArg::Stable => Release::Stable,
            ReleaseArg::Latest => Release::Latest,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Option<Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Trace => Some(Level::TRACE),
        }
    }
}

fn setup_logging(level: LogLevel) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let Some(tracing_level) = level.to_tracing_level() else {
        return Ok(None);
    };

    let log_path = get_log_path();

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("Failed to open log file {:?}", log_path))?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    tracing_subscriber::fmt()
        .with_max_level(tracing_level)
        .with_writer(non_blocking.with_max_level(tracing_level))
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("armtree started with log level: {:?}", level);
    tracing::info!("Log file: {:?}", log_path);

    Ok(Some(guard))
}

fn get_log_path() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("armtree").join("armtree.log");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".armtree").join("armtree.log");
    }
    PathBuf::from("armtree.log")
}

fn print_node(node: &ResourceNode, format: OutputFormat) -> Result<()> {
    let text = match format {
        OutputFormat::Json => serde_json::to_string_pretty(node)?,
        OutputFormat::Yaml => serde_yaml::to_string(node)?,
    };
    println!("{}", text);
    Ok(())
}

fn print_tree(node: &ResourceNode) {
    println!("{}", node.resource_path);
    let count = node.children.len();
    for (i, child) in node.children.iter().enumerate() {
        let branch = if i + 1 == count { "└──" } else { "├──" };
        println!("{} {} ({})", branch, child.name, child.resource_type);
    }
}

async fn run(args: Args) -> Result<()> {
    let mut config = Config::load();

    let subscription = args
        .subscription
        .clone()
        .unwrap_or_else(|| config.effective_subscription());
    let endpoint = args
        .endpoint
        .clone()
        .unwrap_or_else(|| config.effective_endpoint());

    if subscription.is_empty() {
        tracing::warn!("No subscription configured, api-version lookups will fail");
    }

    let http = ArmHttpClient::new(&endpoint, ArmCredentials::from_env(), config.effective_timeout())?;
    let mut resolver =
        HierarchyResolver::new(http, &subscription).with_max_depth(config.effective_max_depth());

    match args.command {
        Command::Show { id } => {
            let node = resolver.resolve(&id).await?;
            print_node(&node, args.output)?;
        }
        Command::Tree { id } => {
            let node = resolver.resolve(&id).await?;
            print_tree(&node);
        }
        Command::Update { id } => {
            let node = resolver.update(&id).await?;
            print_node(&node, args.output)?;
        }
        Command::Export { id, out } => {
            let node = resolver.resolve(&id).await?;
            match out {
                Some(path) => match terraform::save_to_path(&node, &path)? {
                    SaveOutcome::Written => eprintln!("Wrote {}", path.display()),
                    SaveOutcome::AlreadyExists => {
                        eprintln!("{} already exists, nothing written", path.display())
                    }
                    SaveOutcome::Unsupported => {
                        eprintln!("Export not supported for {}", node.resource_type)
                    }
                },
                None => match terraform::export(&node) {
                    Export::Rendered(text) => print!("{}", text),
                    Export::Unsupported { resource_type } => {
                        eprintln!("Export not supported for {}", resource_type)
                    }
                },
            }
        }
        Command::SetSubscription { subscription_id } => {
            config.set_subscription(&subscription_id)?;
            match Config::config_path() {
                Some(path) => eprintln!("Saved subscription to {}", path.display()),
                None => eprintln!("No config directory, subscription not saved"),
            }
        }
        Command::Versions {
            resource_type,
            release,
        } => {
            let version = resolver.get_version(&resource_type, release.into()).await;
            if version.is_empty() {
                eprintln!("No {} api-version known for {}", Release::from(release), resource_type);
            } else {
                println!("{}", version);
            }
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let _log_guard = match setup_logging(args.log_level) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("Logging disabled: {err:#}");
            None
        }
    };

    if let Err(err) = run(args).await {
        tracing::error!("{:#}", err);
        eprintln!("Error: {}", format_arm_error(&err));
        std::process::exit(1);
    }
}
