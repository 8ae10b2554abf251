//! CLI entry point for mongoose.
//!
//! Commands: init, config, build, query, demo, eval. Errors are mapped to
//! process exit codes through [`ExitCode`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{
    Parser, Subcommand,
    builder::styling::{AnsiColor, Effects, Styles},
};
use mongoose::display::{
    Status, THEME, create_build_table, create_help_text, create_progress_bar, create_recall_table,
    create_results_table, with_spinner,
};
use mongoose::io::ExitCode;
use mongoose::semantic::{IndexBuilder, QueryService, RetrievalEvaluator, demo, load_corpus};
use mongoose::vector::{EmbeddingGenerator, create_embedding_generator, load_matrix};
use mongoose::{BuildError, Settings};
use serde::Serialize;
use tracing::{Level, debug, warn};

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

/// Embedding-indexed nearest neighbor search
#[derive(Parser)]
#[command(
    name = "mongoose",
    version = env!("CARGO_PKG_VERSION"),
    about = "Embedding-indexed nearest neighbor search",
    long_about = "Embed a corpus, index it with HNSW, and retrieve the closest items for a query.",
    next_line_help = true,
    styles = clap_cargo_style(),
    after_help = create_help_text()
)]
struct Cli {
    /// Path to custom settings.toml file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Show progress and summary logging
    #[arg(long, global = true)]
    info: bool,

    /// Show debug logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
enum Commands {
    /// Set up .mongoose directory with default configuration
    Init {
        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Display the effective configuration
    Config,

    /// Embed a corpus and write the index
    Build {
        /// JSONL file of {"id"?, "text"} objects, or one item per line
        corpus: PathBuf,

        /// Index directory (defaults to index_path from settings)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Retrieve the items closest to a query
    Query {
        text: String,

        /// Number of results
        #[arg(short, default_value_t = 10)]
        k: usize,

        /// Index directory (defaults to index_path from settings)
        #[arg(long)]
        index: Option<PathBuf>,

        /// Output results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Query the built-in demo corpus
    Demo {
        text: String,

        #[arg(short, default_value_t = demo::DEMO_K)]
        k: usize,
    },

    /// Measure Recall@1 and Recall@10 between paired embedding matrices
    Eval {
        /// Reference matrix (.fbin or .hbin)
        reference: PathBuf,

        /// Query matrix whose row i pairs with reference row i
        queries: PathBuf,

        /// Only index the reference matrix
        #[arg(long)]
        one_way: bool,

        /// Output the report as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Serialize)]
struct QueryOutput<'a> {
    query: &'a str,
    k: usize,
    results: &'a [mongoose::RetrievedItem],
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let cli = Cli::parse();

    let settings = match &cli.config {
        Some(path) => match Settings::load_from(path) {
            Ok(settings) => settings,
            Err(e) => {
                eprintln!(
                    "{}",
                    THEME.status(Status::Failed, &format!(
                        "Configuration error loading from {}: {e}",
                        path.display()
                    ))
                );
                return ExitCode::ConfigError.into();
            }
        },
        None => Settings::load().unwrap_or_else(|e| {
            eprintln!("Configuration error: {e}");
            eprintln!("Using default configuration.");
            Settings::default()
        }),
    };

    init_tracing(cli.debug || settings.debug, cli.info);
    debug!("Effective settings: {settings:?}");

    let code = match cli.command {
        Commands::Init { force } => run_init(force),
        Commands::Config => run_config(&settings),
        Commands::Build { corpus, output } => {
            let output = output.unwrap_or_else(|| settings.index_path.clone());
            run_build(&settings, &corpus, &output).await
        }
        Commands::Query {
            text,
            k,
            index,
            json,
        } => {
            let index = index.unwrap_or_else(|| settings.index_path.clone());
            run_query(&settings, &index, &text, k, json).await
        }
        Commands::Demo { text, k } => run_demo(&settings, &text, k).await,
        Commands::Eval {
            reference,
            queries,
            one_way,
            json,
        } => run_eval(&settings, &reference, &queries, one_way, json),
    };

    code.into()
}

/// Logs go to stderr so stdout carries only results.
fn init_tracing(debug: bool, info: bool) {
    let level = if debug {
        Level::DEBUG
    } else if info {
        Level::INFO
    } else {
        Level::WARN
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run_init(force: bool) -> ExitCode {
    match Settings::init_config_file(force) {
        Ok(path) => {
            println!(
                "{}",
                THEME.status(Status::Done, &format!(
                    "Created configuration file at: {}",
                    path.display()
                ))
            );
            println!("Edit this file to customize your settings.");
            ExitCode::Success
        }
        Err(e) => {
            eprintln!("{}", THEME.status(Status::Failed, &format!("Error: {e}")));
            ExitCode::GeneralError
        }
    }
}

fn run_config(settings: &Settings) -> ExitCode {
    match toml::to_string_pretty(settings) {
        Ok(toml_str) => {
            println!("{toml_str}");
            ExitCode::Success
        }
        Err(e) => {
            eprintln!("Error displaying config: {e}");
            ExitCode::GeneralError
        }
    }
}

fn load_embedder(
    settings: &Settings,
    visible: bool,
) -> Result<Arc<dyn EmbeddingGenerator>, ExitCode> {
    with_spinner(
        &format!("Loading embedding model {}", settings.embedding.model),
        visible,
        || create_embedding_generator(&settings.embedding, visible),
    )
    .map_err(|e| {
        eprintln!("{}", THEME.status(Status::Failed, &e.to_string()));
        ExitCode::from_vector_error(&e)
    })
}

async fn run_build(settings: &Settings, corpus: &Path, output: &Path) -> ExitCode {
    let items = match load_corpus(corpus) {
        Ok(items) => items,
        Err(e) => {
            eprintln!("{}", THEME.status(Status::Failed, &e.to_string()));
            return ExitCode::from_vector_error(&e);
        }
    };
    let embedder = match load_embedder(settings, true) {
        Ok(embedder) => embedder,
        Err(code) => return code,
    };

    let total = items.len() as u64;
    let mut builder = IndexBuilder::new(Arc::clone(&embedder), settings.index.clone())
        .with_batch_size(settings.embedding.batch_size)
        .with_retry_policy(settings.embedding.retry_policy())
        .with_progress(create_progress_bar(total, "Embedding", true));

    let outcome = builder.build(items).await;
    let report = match outcome {
        Ok(report) => report,
        Err(e) => {
            report_build_error(&e);
            if builder.is_empty() {
                return ExitCode::from_build_error(&e);
            }
            // Keep what was committed before the failing batch.
            warn!(
                "Saving {} items indexed before the failure to {}",
                builder.len(),
                output.display()
            );
            match builder.finish() {
                Ok(service) => {
                    if let Err(save_error) = service.save(output) {
                        eprintln!("{}", THEME.status(Status::Failed, &save_error.to_string()));
                    }
                }
                Err(finish_error) => {
                    eprintln!("{}", THEME.status(Status::Failed, &finish_error.to_string()));
                }
            }
            return ExitCode::from_build_error(&e);
        }
    };

    let service = match builder.finish() {
        Ok(service) => service,
        Err(e) => {
            report_build_error(&e);
            return ExitCode::from_build_error(&e);
        }
    };
    if let Err(e) = service.save(output) {
        eprintln!("{}", THEME.status(Status::Failed, &e.to_string()));
        return ExitCode::from_error(&e);
    }

    println!(
        "{}",
        create_build_table(
            &report,
            &embedder.model_name(),
            &output.display().to_string()
        )
    );
    println!(
        "{}",
        THEME.status(Status::Done, &format!("Indexed {} items", service.len()))
    );
    println!(
        "Query it with: mongoose query <TEXT> --index {}",
        THEME.paint(&THEME.path, output.display())
    );
    ExitCode::Success
}

fn report_build_error(error: &BuildError) {
    eprintln!(
        "{}",
        THEME.status(Status::Failed, &format!("[{}] {error}", error.status_code()))
    );
    for suggestion in error.recovery_suggestions() {
        eprintln!("  {}", THEME.paint(&THEME.hint, suggestion));
    }
}

async fn run_query(
    settings: &Settings,
    index: &Path,
    text: &str,
    k: usize,
    json: bool,
) -> ExitCode {
    let embedder = match load_embedder(settings, !json) {
        Ok(embedder) => embedder,
        Err(code) => return code,
    };
    let service = match QueryService::load(index, embedder, settings.embedding.retry_policy()) {
        Ok(service) => service,
        Err(e) => {
            eprintln!(
                "{}",
                THEME.status(Status::Failed, &format!("[{}] {e}", e.status_code()))
            );
            for suggestion in e.recovery_suggestions() {
                eprintln!("  {}", THEME.paint(&THEME.hint, suggestion));
            }
            return ExitCode::from_error(&e);
        }
    };
    answer(&service, text, k, json).await
}

async fn run_demo(settings: &Settings, text: &str, k: usize) -> ExitCode {
    let embedder = match load_embedder(settings, true) {
        Ok(embedder) => embedder,
        Err(code) => return code,
    };
    let mut builder = IndexBuilder::new(embedder, settings.index.clone())
        .with_retry_policy(settings.embedding.retry_policy());
    let outcome = builder.build(demo::corpus()).await;
    let service = outcome.and_then(|_| builder.finish());
    match service {
        Ok(service) => answer(&service, text, k, false).await,
        Err(e) => {
            report_build_error(&e);
            ExitCode::from_build_error(&e)
        }
    }
}

async fn answer(service: &QueryService, text: &str, k: usize, json: bool) -> ExitCode {
    let results = match service.query(text, k).await {
        Ok(results) => results,
        Err(e) => {
            eprintln!(
                "{}",
                THEME.status(Status::Failed, &format!("[{}] {e}", e.status_code()))
            );
            return ExitCode::from_query_error(&e);
        }
    };

    if !json && results.is_empty() {
        println!("{}", THEME.status(Status::Notice, "No results"));
        return ExitCode::NotFound;
    }
    let output = QueryOutput {
        query: text,
        k,
        results: &results,
    };
    match render(&output, json, || create_results_table(&results)) {
        Ok(rendered) => println!("{rendered}"),
        Err(e) => {
            eprintln!("Error: {e:#}");
            return ExitCode::GeneralError;
        }
    }
    ExitCode::from_results(&results)
}

/// Pretty JSON when `json` is set, otherwise the table built by `table`.
fn render<T: Serialize>(
    value: &T,
    json: bool,
    table: impl FnOnce() -> String,
) -> anyhow::Result<String> {
    if json {
        serde_json::to_string_pretty(value).context("Failed to serialize output")
    } else {
        Ok(table())
    }
}

fn run_eval(
    settings: &Settings,
    reference: &Path,
    queries: &Path,
    one_way: bool,
    json: bool,
) -> ExitCode {
    let load = |path: &Path| {
        load_matrix(path).map_err(|e| {
            eprintln!("{}", THEME.status(Status::Failed, &e.to_string()));
            ExitCode::from_vector_error(&e)
        })
    };
    let (reference, queries) = match (load(reference), load(queries)) {
        (Ok(reference), Ok(queries)) => (reference, queries),
        (Err(code), _) | (_, Err(code)) => return code,
    };

    let evaluator = RetrievalEvaluator::new(settings.index.clone())
        .with_threads(settings.evaluation.parallel_threads)
        .with_k(settings.evaluation.k);

    let rendered = if one_way {
        evaluator.evaluate(&reference, &queries).map(|report| {
            render(&report, json, || {
                create_recall_table(&[("Code <-> Doc", &report)])
            })
        })
    } else {
        evaluator
            .evaluate_symmetric(&reference, &queries)
            .map(|report| {
                render(&report, json, || {
                    create_recall_table(&[
                        ("Code <-> Doc", &report.forward),
                        ("Doc <-> Code", &report.backward),
                    ])
                })
            })
    };

    match rendered {
        Ok(Ok(output)) => {
            println!("{output}");
            ExitCode::Success
        }
        Ok(Err(e)) => {
            eprintln!("Error: {e:#}");
            ExitCode::GeneralError
        }
        Err(e) => {
            eprintln!("{}", THEME.status(Status::Failed, &e.to_string()));
            ExitCode::from_eval_error(&e)
        }
    }
}
