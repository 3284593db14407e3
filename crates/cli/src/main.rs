//! hbt: offline driver for the header-bidding transformation engine.
//!
//! Reads ad unit requests, auction context and exchange responses from JSON
//! files and prints what the engine produces. Nothing is sent over the
//! network.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod error;
mod logging;
mod transform;

use error::CliError;
use transform::{BuildInputs, RtdInputs};

#[derive(Parser)]
#[command(name = "hbt")]
#[command(about = "Build exchange requests and interpret exchange responses offline", long_about = None)]
#[command(version)]
struct Cli {
    /// Settings file
    #[arg(short, long, global = true, default_value = "hb-transform.toml", env = "HB_TRANSFORM_CONFIG")]
    config: PathBuf,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pretty: bool,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build wire payloads from ad unit requests
    Build {
        /// JSON array of ad unit requests
        #[arg(short, long)]
        requests: PathBuf,

        /// JSON auction context
        #[arg(long)]
        context: Option<PathBuf>,

        /// Include diagnostics in the output instead of logging them
        #[arg(long)]
        diagnostics: bool,
    },

    /// Interpret exchange responses into normalized bids
    Interpret {
        /// JSON array of ad unit requests the responses answer
        #[arg(short, long)]
        requests: PathBuf,

        /// JSON auction context
        #[arg(long)]
        context: Option<PathBuf>,

        /// JSON array of exchange responses, one per built payload
        #[arg(long)]
        responses: PathBuf,

        /// Include diagnostics in the output instead of logging them
        #[arg(long)]
        diagnostics: bool,
    },

    /// Run real-time data providers over a request configuration
    Rtd {
        /// JSON request bids configuration
        #[arg(long)]
        request_bids: PathBuf,

        /// JSON auction session carried over from earlier auctions
        #[arg(long)]
        session: Option<PathBuf>,

        /// JSON consent signals
        #[arg(long)]
        consent: Option<PathBuf>,

        /// Floors file served to the floors provider
        #[arg(long)]
        floors: Option<PathBuf>,
    },

    /// Resolve user ids against a cookie jar
    UserIds {
        /// JSON object of cookie name to value
        #[arg(long)]
        cookies: Option<PathBuf>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Validate the settings file and list registered integrations
    Validate,

    /// Print the merged settings as TOML
    Show,
}

fn main() {
    let cli = Cli::parse();
    logging::init_logger(cli.verbose);

    if let Err(e) = run(&cli) {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

fn run(cli: &Cli) -> Result<(), CliError> {
    let settings = transform::load_settings(&cli.config, cli.verbose)?;

    let output = match &cli.command {
        Commands::Build {
            requests,
            context,
            diagnostics,
        } => transform::build(
            &settings,
            &BuildInputs {
                requests,
                context: context.as_deref(),
                diagnostics: *diagnostics,
            },
        )?,
        Commands::Interpret {
            requests,
            context,
            responses,
            diagnostics,
        } => transform::interpret(
            &settings,
            &BuildInputs {
                requests,
                context: context.as_deref(),
                diagnostics: *diagnostics,
            },
            responses,
        )?,
        Commands::Rtd {
            request_bids,
            session,
            consent,
            floors,
        } => transform::rtd(
            &settings,
            &RtdInputs {
                request_bids,
                session: session.as_deref(),
                consent: consent.as_deref(),
                floors: floors.as_deref(),
            },
        )?,
        Commands::UserIds { cookies } => transform::user_ids(&settings, cookies.as_deref())?,
        Commands::Config { action } => match action {
            ConfigAction::Validate => {
                log::info!("Settings in {} are valid", cli.config.display());
                transform::describe(&settings)
            }
            ConfigAction::Show => {
                let rendered = toml::to_string_pretty(&settings)
                    .map_err(|e| CliError::Config(format!("Failed to render settings: {e}")))?;
                println!("{}", rendered);
                return Ok(());
            }
        },
    };

    let rendered = if cli.pretty {
        serde_json::to_string_pretty(&output)?
    } else {
        serde_json::to_string(&output)?
    };
    println!("{}", rendered);
    Ok(())
}
