//! Augur CLI
//!
//! Market intelligence from the command line. Every command prints JSON on
//! stdout; logs go to stderr.

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand, ValueEnum};
use futures::StreamExt;
use serde::Serialize;
use tracing::{info, warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use augur_agents::{
    create_anthropic_backend, create_backend, AnthropicConfig, OpenAIBackendConfig, SharedBackend,
};
use augur_core::{
    BatchProgress, CompanyProfile, CompanySize, Context, SourceConfig, TechMaturity, TimeHorizon,
};
use augur_runtime::{EngineConfig, IntelligenceEngine, LlmConfig, LlmProvider, ProgressCallback};

#[derive(Parser)]
#[command(name = "augur")]
#[command(author, version, about = "Augur: multi-agent market intelligence", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbosity level (0-3). RUST_LOG overrides it when set.
    #[arg(short, long, default_value = "1", global = true)]
    verbose: u8,

    /// Engine configuration file (TOML)
    #[arg(short, long, env = "AUGUR_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Override the configured model
    #[arg(short, long, global = true)]
    model: Option<String>,

    /// Anthropic API key (or set ANTHROPIC_API_KEY env var)
    #[arg(long, env = "ANTHROPIC_API_KEY", hide_env_values = true, global = true)]
    anthropic_key: Option<String>,

    /// OpenAI API key (or set OPENAI_API_KEY env var)
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true, global = true)]
    openai_key: Option<String>,

    /// OpenRouter API key (or set OPENROUTER_API_KEY env var)
    #[arg(long, env = "OPENROUTER_API_KEY", hide_env_values = true, global = true)]
    openrouter_key: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch and process sources
    Ingest {
        /// Restrict ingestion to these source ids
        #[arg(short, long = "source")]
        sources: Vec<String>,
    },

    /// Ingest, then run every eligible agent on a query
    Analyze {
        /// The question to answer
        #[arg(short, long)]
        query: String,

        /// Domain the query is about (defaults to the query)
        #[arg(long)]
        domain: Option<String>,

        #[command(flatten)]
        company: CompanyArgs,

        /// Role of the person asking
        #[arg(long)]
        role: Option<String>,

        #[arg(long, value_enum, default_value = "medium")]
        horizon: HorizonArg,

        /// Minimum confidence of interest (0-1)
        #[arg(long, default_value = "0.5")]
        threshold: f64,

        /// Skip source ingestion before analyzing
        #[arg(long)]
        offline: bool,
    },

    /// Stream generated market trends batch by batch
    Trends {
        /// Total number of trends to generate
        #[arg(short = 'n', long, default_value = "20")]
        count: usize,

        #[command(flatten)]
        company: CompanyArgs,
    },

    /// Check every configured source
    Status,

    /// List configured sources
    Sources,
}

#[derive(clap::Args)]
struct CompanyArgs {
    /// Company industry; enables a company profile
    #[arg(long)]
    industry: Option<String>,

    #[arg(long, value_enum, default_value = "medium")]
    size: SizeArg,

    #[arg(long, value_enum, default_value = "developing")]
    maturity: MaturityArg,
}

impl CompanyArgs {
    fn profile(&self) -> Option<CompanyProfile> {
        self.industry
            .as_deref()
            .map(|industry| CompanyProfile::new(industry, self.size.into(), self.maturity.into()))
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum SizeArg {
    Startup,
    Small,
    Medium,
    Enterprise,
}

impl From<SizeArg> for CompanySize {
    fn from(arg: SizeArg) -> Self {
        match arg {
            SizeArg::Startup => CompanySize::Startup,
            SizeArg::Small => CompanySize::Small,
            SizeArg::Medium => CompanySize::Medium,
            SizeArg::Enterprise => CompanySize::Enterprise,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum MaturityArg {
    Emerging,
    Developing,
    Mature,
    Leading,
}

impl From<MaturityArg> for TechMaturity {
    fn from(arg: MaturityArg) -> Self {
        match arg {
            MaturityArg::Emerging => TechMaturity::Emerging,
            MaturityArg::Developing => TechMaturity::Developing,
            MaturityArg::Mature => TechMaturity::Mature,
            MaturityArg::Leading => TechMaturity::Leading,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum HorizonArg {
    Short,
    Medium,
    Long,
}

impl From<HorizonArg> for TimeHorizon {
    fn from(arg: HorizonArg) -> Self {
        match arg {
            HorizonArg::Short => TimeHorizon::ShortTerm,
            HorizonArg::Medium => TimeHorizon::MediumTerm,
            HorizonArg::Long => TimeHorizon::LongTerm,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = match &cli.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => EngineConfig::default(),
    };
    if let Some(model) = &cli.model {
        config.llm.model = model.clone();
    }

    match cli.command {
        Commands::Sources => {
            let engine = IntelligenceEngine::new(config, None)?;
            print_sources(&engine)?;
        }
        Commands::Status => {
            let engine = IntelligenceEngine::new(config, None)?;
            print_json(&engine.source_status().await)?;
        }
        Commands::Ingest { ref sources } => {
            let backend = build_backend(&cli, &config.llm)?;
            let engine = IntelligenceEngine::new(config, backend)?;
            let selected = (!sources.is_empty()).then_some(sources.as_slice());
            print_json(&engine.refresh(selected).await?)?;
        }
        Commands::Analyze {
            ref query,
            ref domain,
            ref company,
            ref role,
            horizon,
            threshold,
            offline,
        } => {
            let backend = build_backend(&cli, &config.llm)?;
            let engine = IntelligenceEngine::new(config, backend)?;
            if !offline {
                engine.refresh(None).await?;
            }

            let mut context = Context::new(domain.as_deref().unwrap_or(query.as_str()))
                .with_horizon(horizon.into())
                .with_threshold(threshold);
            if let Some(profile) = company.profile() {
                context = context.with_company(profile);
            }
            if let Some(role) = role {
                context = context.with_role(role);
            }

            print_json(&engine.analyze(query, context).await?)?;
        }
        Commands::Trends { count, ref company } => {
            let backend = build_backend(&cli, &config.llm)?;
            let engine = IntelligenceEngine::new(config, backend)?;
            let on_progress: ProgressCallback = Box::new(|p: &BatchProgress| {
                info!(
                    "Batch {}/{} done, ~{}ms remaining",
                    p.completed_batches, p.total_batches, p.estimated_time_remaining_ms
                );
            });

            let mut batches = Box::pin(engine.stream_trends(count, company.profile(), Some(on_progress)));
            while let Some(batch) = batches.next().await {
                println!("{}", serde_json::to_string(&batch)?);
            }
        }
    }

    Ok(())
}

fn init_logging(verbose: u8) {
    let builder = FmtSubscriber::builder()
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact();

    match EnvFilter::try_from_default_env() {
        Ok(filter) => builder.with_env_filter(filter).init(),
        Err(_) => {
            let level = match verbose {
                0 => Level::ERROR,
                1 => Level::INFO,
                2 => Level::DEBUG,
                _ => Level::TRACE,
            };
            builder.with_max_level(level).init();
        }
    }
}

/// Backend for the configured provider, or none when its key is missing
fn build_backend(cli: &Cli, llm: &LlmConfig) -> Result<Option<SharedBackend>> {
    let backend = match llm.provider {
        LlmProvider::Anthropic => cli.anthropic_key.as_deref().map(|key| {
            let mut config = AnthropicConfig::new(key, &llm.model);
            if let Some(base_url) = &llm.base_url {
                config = config.with_base_url(base_url);
            }
            create_anthropic_backend(config)
        }),
        LlmProvider::OpenAI => cli.openai_key.as_deref().map(|key| {
            let mut config = OpenAIBackendConfig::openai(key, &llm.model);
            config.base_url = llm.base_url.clone();
            create_backend(config)
        }),
        LlmProvider::OpenRouter => cli
            .openrouter_key
            .as_deref()
            .map(|key| create_backend(OpenAIBackendConfig::openrouter(key, &llm.model))),
        LlmProvider::Local => llm
            .base_url
            .as_deref()
            .map(|url| create_backend(OpenAIBackendConfig::local(url, &llm.model))),
    };

    match backend {
        Some(backend) => Ok(Some(backend?)),
        None => {
            warn!(
                "No API key for {:?}; continuing with heuristics and the signal agent only",
                llm.provider
            );
            Ok(None)
        }
    }
}

#[derive(Serialize)]
struct SourceRow<'a> {
    #[serde(flatten)]
    source: &'a SourceConfig,
    remaining_budget: Option<u32>,
}

fn print_sources(engine: &IntelligenceEngine) -> Result<()> {
    let rows: Vec<SourceRow<'_>> = engine
        .fetcher()
        .sources()
        .iter()
        .map(|source| SourceRow {
            source,
            remaining_budget: engine.fetcher().remaining_budget(&source.id),
        })
        .collect();
    print_json(&rows)
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
