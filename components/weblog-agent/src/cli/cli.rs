// Local crates
use crate::{
    helpers::load_config::Config,
    instrumentation::tracing::init_tracing,
    parser::{candidates::DEFAULT_CANDIDATES, parser::LogParser},
    runtime,
    tailer::reader::read_last_line,
    weblog::weblog::WebLog,
};

// External crates
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "weblog",
    long_about = "weblog tails a web server access log, learns its line format and prints request, \
                  response code, timing and category metrics as one JSON line per interval.",
    about = "Web access log metrics agent",
    version,
    term_width = 100,
    color = clap::ColorChoice::Always,
    after_help = "\
    EXAMPLES:
        weblog run --config /etc/weblog/weblog.toml
        weblog validate --config ./weblog.toml
        weblog learn --path /var/log/nginx/access.log"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the agent
    Run {
        #[arg(short, long, default_value = "/etc/weblog/weblog.toml")]
        config: PathBuf,
    },

    /// Validate the configuration file without touching the log
    Validate {
        #[arg(short, long, default_value = "/etc/weblog/weblog.toml")]
        config: PathBuf,
    },

    /// Show the pattern that would be learned from a log and the fields it yields
    Learn {
        /// Log file whose last line is used as the sample
        #[arg(short, long)]
        path: PathBuf,

        /// Explicit pattern to try instead of learning one
        #[arg(short, long)]
        format: Option<String>,
    },

    /// Display version information
    Version,
}

/// Entry function for CLI
pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config } => {
            let cfg = Config::load(&config)?;
            let _guard = init_tracing(cfg.general.log_dir.as_deref());
            runtime::runtime::run_weblog_agent(cfg).await?
        }
        Commands::Validate { config } => {
            let _guard = init_tracing(None);
            validate_config(config)?
        }
        Commands::Learn { path, format } => {
            let _guard = init_tracing(None);
            learn_format(path, format).await?
        }
        Commands::Version => show_version(),
    }

    Ok(())
}

//
// ------------------------ Command Implementations ------------------------------
//

/// Validate configuration file and every rule in it
fn validate_config(config: PathBuf) -> Result<()> {
    println!("Validating configuration file: {:?}", config);
    let cfg = Config::load(&config)?;
    WebLog::validate(&cfg.weblog).context("Invalid web log job configuration")?;
    println!("Configuration valid:\n{:#?}", cfg);
    Ok(())
}

/// Learn (or apply) a pattern against the last line of a log
async fn learn_format(path: PathBuf, format: Option<String>) -> Result<()> {
    let sample = read_last_line(&path)
        .await
        .with_context(|| format!("Failed to read a sample line from {:?}", path))?;

    let parser = match format {
        Some(format) => LogParser::with_pattern(&format)?,
        None => LogParser::learn(&sample, DEFAULT_CANDIDATES)?,
    };

    println!("Sample:  {sample}");
    println!("Pattern: {}", parser.pattern().name());
    println!("Format:  {}", parser.pattern().source());
    println!(
        "Captures: {}",
        parser.pattern().fields().collect::<Vec<_>>().join(", ")
    );

    match parser.parse(&sample) {
        Some(fields) => {
            let mut entries: Vec<_> = fields.iter().collect();
            entries.sort_by_key(|(name, _)| *name);
            println!("Fields:");
            for (name, value) in entries {
                println!("  {name:<24} {}", value.to_text());
            }
        }
        None => println!("Sample line does not match the pattern"),
    }
    Ok(())
}

/// Show version information
fn show_version() {
    println!("weblog agent {}", env!("CARGO_PKG_VERSION"));
}
