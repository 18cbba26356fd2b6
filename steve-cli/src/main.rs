//! Steve: ADR recommendations for the change you are about to merge.
//!
//! # Commands
//!
//! ```bash
//! # Recommend from a diff on stdin (the default command)
//! git diff main | steve
//!
//! # Recommend from the working tree, or against a base ref
//! steve recommend --git --base main
//!
//! # Check how well the decisions in a diff are documented
//! steve audit --git
//!
//! # Ask the documentation a question
//! steve search "Which message broker do we use?"
//! ```

mod diff;

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use futures::StreamExt;
use steve_rag::openai::{OpenAIChatGenerator, OpenAIEmbeddingProvider};
use steve_rag::{AdrPipeline, PipelineConfig, RecommendationStream, Settings};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// STEVE: Search Technical Evidence Very Easy.
#[derive(Parser, Debug)]
#[command(name = "steve", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    overrides: Overrides,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Recommend whether the diff needs an ADR (default)
    Recommend(DiffArgs),
    /// List the decisions in the diff and how well they are documented
    Audit(DiffArgs),
    /// Explain what the documentation says about a question
    Search {
        /// The question; read from stdin when omitted
        question: Vec<String>,
    },
}

#[derive(Args, Debug, Default)]
struct DiffArgs {
    /// Run `git diff` instead of reading the diff from stdin
    #[arg(long)]
    git: bool,

    /// Diff against this ref (implies --git)
    #[arg(long)]
    base: Option<String>,
}

/// Overrides of the environment and of the default pipeline parameters.
#[derive(Args, Debug)]
struct Overrides {
    /// Documentation directory (overrides STEVE_DOCS_PATH)
    #[arg(long, global = true)]
    docs: Option<PathBuf>,

    /// Number of documentation chunks used as context
    #[arg(long, global = true)]
    k: Option<usize>,

    /// Relevance/diversity balance of retrieval, from 0 (diverse) to 1 (relevant)
    #[arg(long, global = true)]
    diversity: Option<f32>,

    /// Maximum chunk size in characters
    #[arg(long, global = true)]
    chunk_size: Option<usize>,

    /// Characters shared by consecutive chunks
    #[arg(long, global = true)]
    chunk_overlap: Option<usize>,
}

impl Overrides {
    fn config(&self) -> Result<PipelineConfig> {
        let mut builder = PipelineConfig::builder();
        if let Some(k) = self.k {
            builder = builder.retrieval_k(k);
        }
        if let Some(diversity) = self.diversity {
            builder = builder.diversity(diversity);
        }
        if let Some(size) = self.chunk_size {
            builder = builder.chunk_size(size);
        }
        if let Some(overlap) = self.chunk_overlap {
            builder = builder.chunk_overlap(overlap);
        }
        Ok(builder.build()?)
    }
}

fn build_pipeline(overrides: &Overrides) -> Result<AdrPipeline> {
    let mut settings = Settings::from_env()?;
    if let Some(docs) = &overrides.docs {
        settings.docs_path = docs.clone();
    }
    info!(?settings, "loaded settings");

    let pipeline = AdrPipeline::builder()
        .config(overrides.config()?)
        .docs_dir(settings.docs_path.clone())
        .embedding_provider(Arc::new(OpenAIEmbeddingProvider::from_settings(&settings)?))
        .generator(Arc::new(OpenAIChatGenerator::from_settings(&settings)?))
        .build()?;
    Ok(pipeline)
}

/// Print fragments as they arrive, then the cited sources.
async fn print_streamed(mut stream: RecommendationStream) -> Result<()> {
    let mut stdout = std::io::stdout();
    writeln!(stdout, "# Steve:")?;
    while let Some(fragment) = stream.next().await {
        match fragment {
            Ok(text) => {
                write!(stdout, "{text}")?;
                stdout.flush()?;
            }
            Err(_) => {
                writeln!(stdout, "\n\n(the answer above is incomplete)")?;
                break;
            }
        }
    }
    let report = stream.finish().await?;
    writeln!(stdout, "{}", report.render_sources())?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let pipeline = build_pipeline(&cli.overrides)?;

    match cli.command.unwrap_or(Commands::Recommend(DiffArgs::default())) {
        Commands::Recommend(args) => {
            let diff = diff::load(args.git, args.base.as_deref(), tokio::io::stdin()).await?;
            print_streamed(pipeline.start(&diff).await?).await?;
        }
        Commands::Audit(args) => {
            let diff = diff::load(args.git, args.base.as_deref(), tokio::io::stdin()).await?;
            let report = pipeline.audit(&diff).await?;
            print!("{}", report.render());
        }
        Commands::Search { question } => {
            let question = if question.is_empty() {
                diff::read_all(tokio::io::stdin()).await.context("failed to read question")?
            } else {
                question.join(" ")
            };
            print_streamed(pipeline.search(&question).await?).await?;
        }
    }

    Ok(())
}
