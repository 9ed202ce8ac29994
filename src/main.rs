use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use symgraph::config::{Config, LoggingConfig};
use symgraph::query::QueryKind;

mod cli;

use cli::OutputFormat;

#[derive(Parser)]
#[command(name = "symgraph")]
#[command(author = "Intent Project Team")]
#[command(version)]
#[command(about = "Cross-language code graph: symbol store and multi-pass resolution", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Project directory
    #[arg(short, long, global = true, default_value = ".")]
    project: String,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Index a project
    Index {
        /// Languages to index (comma-separated)
        #[arg(short, long)]
        languages: Option<String>,

        /// Plugins to run (comma-separated)
        #[arg(long)]
        plugins: Option<String>,

        /// Watch for changes
        #[arg(short, long)]
        watch: bool,

        /// Rebuild entire index
        #[arg(short, long)]
        rebuild: bool,
    },

    /// Query the index
    Query {
        /// Query type
        #[arg(value_enum)]
        kind: QueryKind,

        /// Target symbol (`Class::member` for members) or endpoint path
        target: String,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Show index statistics
    Stats {
        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Export the whole graph as JSON
    Export {
        /// Output file (defaults to export.output, then stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List supported languages
    Languages,

    /// List built-in plugins
    Plugins,
}

fn init_logging(debug: bool, verbose: bool, logging: &LoggingConfig) {
    let level = if debug {
        "debug"
    } else if verbose {
        "info"
    } else {
        logging.level.as_str()
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if logging.format == "compact" {
        builder.compact().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::from_project_dir(&cli.project);
    init_logging(cli.debug, cli.verbose, &config.logging);

    debug!("symgraph v{} starting...", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Index {
            languages,
            plugins,
            watch,
            rebuild,
        } => {
            cli::index::index_project(config, languages, plugins, watch, rebuild).await?;
        }

        Commands::Query { kind, target, format } => {
            cli::query::query_index(&config, kind, &target, format)?;
        }

        Commands::Stats { format } => {
            cli::stats::show_stats(&config, format)?;
        }

        Commands::Export { output } => {
            cli::export::export_graph(&config, output)?;
        }

        Commands::Languages => {
            cli::languages::list_languages();
        }

        Commands::Plugins => {
            cli::languages::list_plugins();
        }
    }

    Ok(())
}
