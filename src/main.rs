//! # Post Eval CLI (`peval`)
//!
//! ## Usage
//!
//! ```bash
//! peval --config ./config/peval.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `peval init [--seed]` | Create the event database schema, optionally with sample data |
//! | `peval run` | Evaluate a dataset against the extraction workflow |
//! | `peval extract --caption <text>` | Run the extraction workflow on one post |
//! | `peval posts` | List posts from the social-media connector |
//! | `peval events` | List stored events |

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use post_eval::config::{self, RunOverrides};
use post_eval::{connector_meta, evaluate, logging, migrate, persist};

/// Post Eval: evaluation harness for social-media post extraction workflows.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/peval.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "peval",
    about = "Post Eval: evaluation harness for social-media post extraction workflows",
    version,
    long_about = "Post Eval sends labeled social-media posts to an extraction workflow, \
    scores the structured output against the expected one with a JSON edit distance, \
    and records traces and scores in an experiment-tracking backend."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/peval.toml`. A missing file means built-in defaults.
    #[arg(long, global = true, default_value = "./config/peval.toml")]
    config: PathBuf,

    /// Enable debug logging (overridden by `RUST_LOG`).
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the event database schema.
    ///
    /// Creates the `artista`, `sala` and `eventos` tables. Idempotent.
    Init {
        /// Also insert sample venues, artists and events.
        #[arg(long)]
        seed: bool,
    },

    /// Run an evaluation.
    ///
    /// Every flag overrides the matching `[run]` setting of the config file.
    Run {
        /// Name of the evaluator model, recorded in trace metadata.
        #[arg(long)]
        evaluator_model: Option<String>,

        /// Run name. Defaults to `posts-eval-<timestamp>`.
        #[arg(long)]
        run_name: Option<String>,

        #[arg(long)]
        run_description: Option<String>,

        /// Comma-separated metric names (e.g. `distancia JSON`).
        #[arg(long)]
        metrics: Option<String>,

        /// CSV path, or `langfuse:<dataset>` for a remote dataset.
        #[arg(long)]
        dataset: Option<String>,

        /// Persist extracted events to the database.
        #[arg(long)]
        save_to_db: bool,

        /// Flush telemetry after every item.
        #[arg(long)]
        flush_each_item: bool,

        /// Write the run summary as JSON to this file.
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Run the extraction workflow on a single post and print the result.
    Extract {
        /// Post text.
        #[arg(long)]
        caption: String,

        /// Publication date of the post.
        #[arg(long)]
        date: Option<String>,

        /// Local path of the post image.
        #[arg(long)]
        image: Option<String>,
    },

    /// List posts returned by the social-media connector.
    Posts,

    /// List stored events with their artist and venue.
    Events,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let cfg = config::load_config_or_default(&cli.config)?;

    match cli.command {
        Commands::Init { seed } => {
            migrate::run_migrations(&cfg.db, seed).await?;
            println!("Database initialized successfully.");
        }
        Commands::Run {
            evaluator_model,
            run_name,
            run_description,
            metrics,
            dataset,
            save_to_db,
            flush_each_item,
            output,
        } => {
            let overrides = RunOverrides {
                evaluator_model,
                run_name,
                run_description,
                metrics,
                dataset,
                save_to_db,
                flush_each_item,
            };
            evaluate::run_evaluation(&cfg, overrides, output).await?;
        }
        Commands::Extract {
            caption,
            date,
            image,
        } => {
            evaluate::run_extract(&cfg, &caption, date.as_deref(), image.as_deref()).await?;
        }
        Commands::Posts => {
            connector_meta::list_posts()?;
        }
        Commands::Events => {
            persist::run_list_events(&cfg.db).await?;
        }
    }

    Ok(())
}
