use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::filter::LevelFilter;

/// Log level options for CLI
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    /// No logging output
    Off,
    /// Error messages only
    Error,
    /// Warnings and errors
    Warn,
    /// Informational messages
    Info,
    /// Debug messages (compiler decisions, stage counts)
    Debug,
    /// Trace-level messages (most verbose)
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => LevelFilter::OFF,
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

#[derive(Parser)]
#[command(name = "trellis")]
#[command(about = "trellis - compile query intents into document-store pipelines")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Set log level (off, error, warn, info, debug, trace)
    /// If not specified, uses the config file value
    #[arg(short = 'l', long, global = true, value_enum)]
    pub log_level: Option<LogLevel>,

    /// Enable verbose logging (shortcut for --log-level=debug)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Config file path (TOML)
    #[arg(short = 'C', long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the candidate paths extracted from an intent
    Paths {
        /// Intent JSON file
        intent: PathBuf,
    },

    /// Compile an intent and print the pipeline stages as JSON
    Compile {
        /// Intent JSON file
        intent: PathBuf,

        /// Schema seed file (overrides config)
        #[arg(short, long)]
        schema: Option<PathBuf>,

        /// Also print extracted paths and resolved join recipes
        #[arg(long)]
        explain: bool,
    },

    /// Compile an intent and run it against JSON fixtures
    Run {
        /// Intent JSON file
        intent: PathBuf,

        /// Schema seed file (overrides config)
        #[arg(short, long)]
        schema: Option<PathBuf>,

        /// Fixtures file: collection name to array of documents (overrides config)
        #[arg(short, long)]
        data: Option<PathBuf>,

        /// Execution deadline in seconds, 0 = none (overrides config)
        #[arg(short, long)]
        timeout: Option<u64>,
    },
}
