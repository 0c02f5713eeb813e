use clap::{Parser, Subcommand};
use console::style;
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::runtime::Runtime;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use allm::cli::commands::generate::{GenerateOptions, SchemaKind};
use allm::cli::ui::Output;
use allm::config::ModelKind;

#[derive(Parser)]
#[command(name = "allm")]
#[command(
    version,
    about = "Batch prompting over hosted and self-deployed LLM endpoints"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, short, global = true, help = "Config file (default: layered lookup)")]
    config: Option<PathBuf>,

    #[arg(long, global = true)]
    verbose: bool,

    #[arg(long, short, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a prompt over a batch of examples
    Generate {
        #[arg(long, short, help = "Prompt text, or @file to read it from a file")]
        prompt: String,
        #[arg(long, short, help = "Examples as JSON Lines (one object with an id per line)")]
        input: Option<PathBuf>,
        #[arg(long, help = "Only process the first N examples")]
        limit: Option<usize>,
        #[arg(long, short, help = "System prompt (no placeholders)")]
        system: Option<String>,
        #[arg(long, value_enum, help = "Parse responses into a built-in schema")]
        schema: Option<SchemaKind>,
        #[arg(long, help = "Model kind override (e.g. azure_openai, vertex_gemini)")]
        model: Option<ModelKind>,
        #[arg(long = "long-text", help = "Split over-long inputs and reduce the chunk outputs")]
        long_text: bool,
        #[arg(long, short, help = "Write JSON Lines here instead of stdout")]
        output: Option<PathBuf>,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration (merged from all sources)
    Show {
        #[arg(
            short = 'f',
            long,
            default_value = "toml",
            help = "Output format: toml, json"
        )]
        format: String,
    },
    /// Show configuration file paths
    Path,
    /// Initialize configuration
    Init {
        #[arg(long, short, help = "Initialize global config")]
        global: bool,
        #[arg(long, help = "Overwrite existing config")]
        force: bool,
    },
}

/// Report panics as a readable message before the default hook runs
fn setup_panic_handler() {
    let default_hook = std::panic::take_hook();

    std::panic::set_hook(Box::new(move |panic_info| {
        let message = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };

        eprintln!();
        eprintln!("{}", style("allm hit an unexpected internal error:").red().bold());
        eprintln!("  {}", message);
        if let Some(location) = panic_info.location() {
            eprintln!(
                "{}",
                style(format!(
                    "Location: {}:{}:{}",
                    location.file(),
                    location.line(),
                    location.column()
                ))
                .dim()
            );
        }
        eprintln!();

        // Backtrace when RUST_BACKTRACE=1
        default_hook(panic_info);
    }));
}

fn main() -> ExitCode {
    setup_panic_handler();

    match run_cli() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            Output::new().error(&format!("{:#}", e));
            ExitCode::FAILURE
        }
    }
}

fn run_cli() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Commands::Generate {
            prompt,
            input,
            limit,
            system,
            schema,
            model,
            long_text,
            output,
        } => {
            let rt = Runtime::new()?;
            rt.block_on(allm::cli::commands::generate::run(GenerateOptions {
                prompt,
                input,
                limit,
                system,
                schema,
                long_text,
                output,
                config: cli.config,
                kind: model,
            }))?;
        }
        Commands::Config { action } => match action {
            ConfigAction::Show { format } => {
                allm::cli::commands::config::show(&format)?;
            }
            ConfigAction::Path => {
                allm::cli::commands::config::path()?;
            }
            ConfigAction::Init { global, force } => {
                allm::cli::commands::config::init(global, force)?;
            }
        },
    }

    Ok(())
}
