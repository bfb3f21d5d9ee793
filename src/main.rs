use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use wita::config::DEFAULT_ROSTER_PATH;
use wita::{RosterFile, RosterSource, Settings, Shutdown, Wita, WitaError};

#[derive(Parser)]
#[command(name = "wita")]
#[command(about = "Health-checking PowerDNS pipe backend for database server groups")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(author = "Wita Team")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve PowerDNS queries on stdin/stdout
    Run {
        /// Path to roster file
        #[arg(short, long, default_value = DEFAULT_ROSTER_PATH)]
        config: PathBuf,
        /// Path to daemon settings (TOML)
        #[arg(short, long)]
        settings: Option<PathBuf>,
    },
    /// Load and resolve a roster file, then print it
    Validate {
        /// Path to roster file to validate
        #[arg(short, long, default_value = DEFAULT_ROSTER_PATH)]
        config: PathBuf,
    },
    /// Generate an example settings file
    ExampleSettings {
        /// Output file path
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Show version information
    Version,
}

fn main() {
    let cli = Cli::parse();

    let code = match cli.command {
        Commands::Run { config, settings } => run_wita(config, settings),
        Commands::Validate { config } => report(validate_roster(&config)),
        Commands::ExampleSettings { output } => report(generate_settings(&output)),
        Commands::Version => {
            show_version();
            0
        }
    };

    // The stdin reader sits in a blocking read that runtime shutdown would
    // wait on forever.
    process::exit(code);
}

fn report(result: Result<()>) -> i32 {
    match result {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("✗ {:#}", e);
            1
        }
    }
}

fn run_wita(config: PathBuf, settings_path: Option<PathBuf>) -> i32 {
    let settings = match settings_path {
        Some(path) => match Settings::load_from_file(&path) {
            Ok(settings) => settings,
            Err(e) => {
                eprintln!("Failed to load settings from {:?}: {}", path, e);
                return 1;
            }
        },
        None => Settings::default(),
    };

    init_logging(&settings);

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "cannot start runtime");
            return 1;
        }
    };

    info!(
        "Starting wita v{} with roster {:?}",
        env!("CARGO_PKG_VERSION"),
        config
    );

    let wita = Wita::new(settings, Box::new(RosterFile::new(config)));
    match runtime.block_on(wita.run()) {
        Ok(Shutdown::Terminated) | Ok(Shutdown::FrontendClosed) => 0,
        Err(e) => {
            if e.is_state_inconsistency() {
                error!(error = %e, "fatal state inconsistency (lost server), exiting");
            } else {
                error!(error = %e, severity = %e.severity(), "fatal error, exiting");
            }
            1
        }
    }
}

fn validate_roster(config: &Path) -> Result<()> {
    println!("Validating roster file: {:?}", config);

    let roster = RosterFile::new(config)
        .load()
        .map_err(WitaError::from)
        .with_context(|| format!("cannot load {}", config.display()))?;

    println!("✓ Roster file is valid");
    println!("  Servers: {}", roster.servers().len());
    for server in roster.servers() {
        println!("    {}", server);
    }

    println!("  Groups: {}", roster.groups().len());
    for group in roster.groups() {
        let members: Vec<String> = group
            .members()
            .iter()
            .filter_map(|m| {
                roster.server(m.server).map(|server| {
                    let prefix = if m.backup { "!" } else { "" };
                    format!("{}{}:{}", prefix, server.host(), server.port())
                })
            })
            .collect();
        println!("    {}: {}", group.name(), members.join(" "));
    }

    Ok(())
}

fn generate_settings(output: &Path) -> Result<()> {
    println!("Generating settings file: {:?}", output);

    Settings::create_example_config(output)
        .with_context(|| format!("cannot write {}", output.display()))?;

    println!("Settings file generated successfully!");
    println!("Edit the file to match your environment and run:");
    println!("  wita run --settings {:?}", output);

    Ok(())
}

fn show_version() {
    println!("wita v{}", env!("CARGO_PKG_VERSION"));
    println!("Health-checking PowerDNS pipe backend for database server groups");
    println!();
    println!(
        "Built with Rust {}",
        option_env!("CARGO_PKG_RUST_VERSION").unwrap_or("unknown")
    );
    println!("Target: {}", std::env::consts::ARCH);
}

/// Logs go to stderr; stdout belongs to the resolver.
fn init_logging(settings: &Settings) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.logging.level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if settings.logging.format == "compact" {
        subscriber.compact().init();
    } else {
        subscriber.init();
    }

    info!("Logging initialized at level: {}", settings.logging.level);
}
