//! CLI entry point for the Weaver reasoning layer.
//!
//! Every subcommand connects to the configured Neo4j instance, does one
//! unit of work and writes a JSON result to stdout. Logs go to stderr.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

use weaver_core::config::load_layered;
use weaver_core::{properties_from_json, Label, Properties, RelType, WeaverConfig};
use weaver_graph::{GraphClient, GraphConfig, GraphStore};
use weaver_reason::{
    ContradictionGuard, Fact, HeuristicExtractor, HypothesisGenerator, Ingestor, RuleEngine,
};

#[derive(Parser)]
#[command(name = "weaver")]
#[command(about = "Reasoning layer for the Weaver knowledge graph")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Config file prefix (default: weaver).
    #[arg(short, long, default_value = "weaver", global = true)]
    config: String,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Run one forward-chaining pass over the graph.
    Infer {
        /// Rule file (.toml or .json). Defaults to `reasoning.rules_path`.
        #[arg(long)]
        rules: Option<PathBuf>,
    },
    /// Check a proposed fact against single-valued relationship types.
    Check {
        #[command(flatten)]
        fact: FactArgs,
    },
    /// Check a fact and write it if it does not contradict the graph.
    Assert {
        #[command(flatten)]
        fact: FactArgs,
        /// Edge properties as a JSON object.
        #[arg(long)]
        props: Option<String>,
    },
    /// Generate hypotheses explaining a question.
    Ask {
        question: String,
    },
    /// List the edges incident to a node.
    Neighbors {
        #[arg(long)]
        name: String,
        #[arg(long)]
        label: String,
    },
    /// Link the entities and concepts of a text to a source node.
    Ingest {
        /// Name of the source node.
        #[arg(long)]
        source: String,
        /// Text to ingest (read from stdin when omitted).
        #[arg(long)]
        text: Option<String>,
        /// Link properties as a JSON object.
        #[arg(long)]
        props: Option<String>,
    },
}

#[derive(clap::Args)]
struct FactArgs {
    #[arg(long)]
    subject: String,
    #[arg(long)]
    subject_label: String,
    #[arg(long)]
    rel: String,
    #[arg(long)]
    target: String,
    #[arg(long)]
    target_label: String,
}

impl FactArgs {
    fn to_fact(&self) -> anyhow::Result<Fact> {
        Ok(Fact::new(
            &self.subject,
            Label::parse(&self.subject_label)?,
            RelType::parse(&self.rel)?,
            &self.target,
            Label::parse(&self.target_label)?,
        ))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if cli.json_logs {
        fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .json()
            .init();
    } else {
        fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
    }

    let layered = load_layered(&cli.config)?;
    let settings = WeaverConfig::from_layered(&layered)?;
    let graph_config = layered
        .get::<GraphConfig>("neo4j")
        .unwrap_or_else(|_| GraphConfig::default());

    // Connect to Neo4j.
    let client = GraphClient::connect(&graph_config).await?;
    let store = GraphStore::neo4j(client).with_vocabulary(settings.vocabulary.clone());

    match cli.command {
        Command::Infer { rules } => {
            let path = rules
                .or_else(|| settings.reasoning.rules_path.as_ref().map(PathBuf::from))
                .ok_or_else(|| {
                    anyhow::anyhow!("--rules is required when reasoning.rules_path is unset")
                })?;
            let engine = RuleEngine::from_file(store, &path)
                .with_context(|| format!("loading rules from {}", path.display()))?;
            let report = engine.run_inference().await?;
            println!("{}", serde_json::to_string(&report)?);
        }
        Command::Check { fact } => {
            let fact = fact.to_fact()?;
            let guard = ContradictionGuard::from_config(store, &settings.reasoning)?;
            let conflict = guard.check_fact(&fact).await?;
            println!(
                "{}",
                serde_json::json!({ "fact": fact.to_string(), "conflict": conflict })
            );
        }
        Command::Assert { fact, props } => {
            let fact = fact.to_fact()?;
            let properties = parse_props(props.as_deref())?;
            let ingestor = ingestor(store, &settings)?;
            let outcome = ingestor.assert_fact(&fact, &properties).await?;
            println!("{}", serde_json::to_string(&outcome)?);
        }
        Command::Ask { question } => {
            let generator = HypothesisGenerator::from_config(
                store,
                Arc::new(HeuristicExtractor::new()),
                &settings.reasoning,
            )?;
            let hypotheses = generator.generate_hypotheses(&question).await?;
            println!("{}", serde_json::to_string(&hypotheses)?);
        }
        Command::Neighbors { name, label } => {
            let label = Label::parse(&label)?;
            let neighbors = store.neighbors(&name, &label).await?;
            println!("{}", serde_json::to_string(&neighbors)?);
        }
        Command::Ingest {
            source,
            text,
            props,
        } => {
            let text = match text {
                Some(t) => t,
                None => std::io::read_to_string(std::io::stdin())?,
            };
            let properties = parse_props(props.as_deref())?;
            let ingestor = ingestor(store, &settings)?;
            let report = ingestor
                .ingest_text(&text, &source, &properties, None)
                .await?;
            println!("{}", serde_json::to_string(&report)?);
        }
    }

    Ok(())
}

fn ingestor(store: GraphStore, settings: &WeaverConfig) -> anyhow::Result<Ingestor> {
    let guard = ContradictionGuard::from_config(store.clone(), &settings.reasoning)?;
    Ok(Ingestor::new(
        store,
        guard,
        Arc::new(HeuristicExtractor::new()),
    ))
}

/// Scalar entries of a JSON object; anything else is dropped.
fn parse_props(raw: Option<&str>) -> anyhow::Result<Properties> {
    let Some(raw) = raw else {
        return Ok(Properties::new());
    };
    let map: BTreeMap<String, serde_json::Value> =
        serde_json::from_str(raw).context("--props must be a JSON object")?;
    Ok(properties_from_json(&map))
}
