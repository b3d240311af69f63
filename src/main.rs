use clap::{Parser, Subcommand, builder::styling};
use eyre::Result;
use owo_colors::OwoColorize;
use tabular_etl::cli;

// CLI Styling
const STYLES: styling::Styles = styling::Styles::styled()
    .header(styling::AnsiColor::BrightWhite.on_default())
    .usage(styling::AnsiColor::BrightWhite.on_default())
    .literal(styling::AnsiColor::Green.on_default())
    .placeholder(styling::AnsiColor::Cyan.on_default());

/// Tabular ETL: extract a table, reshape it, load it somewhere else
#[derive(Parser)]
#[command(name = "tetl", version, styles = STYLES)]
struct Cli {
    /// The dotenv file to source credentials from
    #[arg(short, long, global = true, default_value = ".env")]
    env: String,

    /// More verbose logging
    #[arg(long, global = true)]
    debug: bool,

    /// Command to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a pipeline described in a YAML, JSON or JSON5 file
    Run {
        /// The pipeline file
        file: String,

        /// Let extractors log every parsed record
        #[arg(short, long)]
        verbose: bool,
    },

    /// Query a SPARQL endpoint and print the results as CSV
    Sparql {
        /// The endpoint URL
        endpoint: String,

        /// The SPARQL query
        query: String,

        /// Send the query as a form POST instead of a GET
        #[arg(long)]
        post: bool,

        /// Attempts allowed before giving up on a busy endpoint
        #[arg(long, default_value_t = 3)]
        max_retries: u32,
    },

    /// Test connection and authorization to the search cluster
    Ping,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    match dotenvy::from_filename(&cli.env) {
        Ok(_) => {}
        Err(e) if e.not_found() => {}
        Err(e) => return Err(e.into()),
    }

    let log_level = match cli.debug {
        true => "debug",
        false => "info",
    };
    let env = env_logger::Env::default().filter_or("LOG_LEVEL", log_level);
    env_logger::Builder::from_env(env)
        .format_timestamp_millis()
        .init();

    match cli.command {
        Commands::Run { file, verbose } => {
            log::info!("Running pipeline {}", file.bright_black());
            let loaded = cli::run_pipeline_file(&file, verbose).await?;
            log::info!("Loaded {} rows", loaded.to_string().green());
        }
        Commands::Sparql {
            endpoint,
            query,
            post,
            max_retries,
        } => {
            log::info!("Querying {}", endpoint.bright_black());
            let frame = cli::query_sparql(&endpoint, &query, post, max_retries).await?;
            print!("{}", cli::frame_to_csv(&frame)?);
            log::info!("Fetched {} rows", frame.len().to_string().green());
        }
        Commands::Ping => {
            let info = cli::ping_search().await?;
            let name = info["cluster_name"].as_str().unwrap_or("unknown");
            log::info!("Connected to cluster {}", name.cyan());
        }
    }

    Ok(())
}
