//! Uniplexity: research agent runtime.
//!
//! Usage:
//!   uniplexity search <query>     Web search (JSON result)
//!   uniplexity scrape <url>       Fetch and clean a page (JSON result)
//!   uniplexity rag <question>     Answer from the knowledge base
//!   uniplexity add <content>      Store a document
//!   uniplexity ask <question>     Run the agent graph
//!   uniplexity check              Show which credentials are set

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tracing::info;

use uniplexity::config::{self, AppConfig, StoreBackend};
use uniplexity::services::Services;
use uniplexity::types::ToolResult;

// ---------------------------------------------------------------------------
// CLI definition
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "uniplexity")]
#[command(version)]
#[command(about = "Research agent runtime: web search, scraping and retrieval-augmented answers")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the uniplexity home directory (default ~/.uniplexity).
    #[arg(long)]
    home: Option<String>,

    /// Log level (debug, info, warn, error). Overrides the config file.
    #[arg(long)]
    log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Search the web.
    Search {
        query: String,
        /// Number of results (clamped to the provider maximum).
        #[arg(long, short)]
        num: Option<u32>,
    },

    /// Fetch a page and print its cleaned text.
    Scrape { url: String },

    /// Answer a question from the knowledge base.
    Rag {
        question: String,
        /// Documents to retrieve.
        #[arg(short)]
        k: Option<usize>,
    },

    /// Add a document to the knowledge base.
    Add {
        content: String,
        /// Metadata entry as key=value (repeatable).
        #[arg(long = "meta", value_name = "KEY=VALUE")]
        meta: Vec<String>,
    },

    /// Get the weather report for a city.
    Weather { city: String },

    /// Ask the agent graph a question.
    Ask {
        question: String,
        /// Start at this agent instead of the graph root.
        #[arg(long)]
        agent: Option<String>,
    },

    /// List the registered tools with their schemas.
    Tools,

    /// Print the agent delegation tree.
    Agents,

    /// Report which credentials and settings are in place.
    Check,

    /// Write a default config file.
    Init {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Credentials may live in a local .env file
    dotenv::dotenv().ok();

    let home_dir = match &cli.home {
        Some(home) => PathBuf::from(shellexpand::tilde(home).into_owned()),
        None => config::default_home_dir(),
    };
    let config_path = home_dir.join("uniplexity.toml");
    let cfg = config::load_with_env(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    // Initialize logging (stderr, so stdout stays machine-readable)
    let level = cli.log_level.as_deref().unwrap_or(&cfg.log_level);
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Init { force } => cmd_init(&config_path, force),
        Commands::Check => cmd_check(&cfg, &config_path),
        Commands::Ask { question, agent } => {
            let services = Services::from_config(&cfg)?;
            cmd_ask(&services, &question, agent.as_deref()).await
        }
        Commands::Tools => cmd_tools(&Services::from_config(&cfg)?),
        Commands::Agents => cmd_agents(&Services::from_config(&cfg)?),
        command => {
            let (tool, args) = tool_call(command)?;
            let services = Services::from_config(&cfg)?;
            let result = services.tools.execute(tool, &args).await;
            print_result(&result)
        }
    }
}

// ---------------------------------------------------------------------------
// Command implementations
// ---------------------------------------------------------------------------

/// Map a tool subcommand to its registry name and arguments.
fn tool_call(command: Commands) -> Result<(&'static str, Value)> {
    let call = match command {
        Commands::Search { query, num } => {
            let mut args = json!({ "query": query });
            if let Some(num) = num {
                args["num_results"] = json!(num);
            }
            ("google_search", args)
        }
        Commands::Scrape { url } => ("web_scrape", json!({ "url": url })),
        Commands::Rag { question, k } => {
            let mut args = json!({ "question": question });
            if let Some(k) = k {
                args["k"] = json!(k);
            }
            ("rag_search", args)
        }
        Commands::Add { content, meta } => (
            "add_document",
            json!({ "content": content, "metadata": parse_metadata(&meta)? }),
        ),
        Commands::Weather { city } => ("get_weather", json!({ "city": city })),
        other => bail!("{:?} is not a tool command", other),
    };
    Ok(call)
}

async fn cmd_ask(services: &Services, question: &str, agent: Option<&str>) -> Result<()> {
    let runner = services.runner()?;
    let outcome = match agent {
        Some(name) => runner.run_from(name, question).await?,
        None => runner.run(question).await?,
    };

    info!(
        "Run {} finished at '{}' after {} turns ({} tool calls, {} tokens)",
        outcome.run_id,
        outcome.agent,
        outcome.turns,
        outcome.tool_results.len(),
        outcome.usage.total_tokens
    );
    println!("{}", outcome.reply);
    Ok(())
}

fn cmd_tools(services: &Services) -> Result<()> {
    let defs: Vec<Value> = services
        .tools
        .definitions()
        .into_iter()
        .map(|d| {
            json!({
                "name": d.name,
                "description": d.description,
                "input_schema": d.parameters,
                "output_schema": d.returns,
            })
        })
        .collect();
    println!("{}", serde_json::to_string_pretty(&defs)?);
    Ok(())
}

fn cmd_agents(services: &Services) -> Result<()> {
    let graph = services.agent_graph()?;
    print!("{}", graph.render_tree());
    Ok(())
}

fn cmd_check(cfg: &AppConfig, config_path: &Path) -> Result<()> {
    println!();
    println!("{}", "=== Uniplexity Check ===".bold());
    println!();
    println!(
        "  {}:  {} ({})",
        "Config".bold(),
        config_path.display(),
        if config_path.exists() { "found" } else { "defaults" }
    );
    println!();
    println!("  {}:", "Credentials".bold());

    let credentials = [
        ("GOOGLE_CSE_API_KEY", &cfg.search_api_key),
        ("GOOGLE_CSE_ID", &cfg.search_engine_id),
        ("CHROMA_API_KEY", &cfg.chroma_api_key),
        ("CHROMA_TENANT", &cfg.chroma_tenant),
        ("CHROMA_DATABASE", &cfg.chroma_database),
        ("GOOGLE_API_KEY", &cfg.google_api_key),
    ];
    for (name, value) in credentials {
        println!("    {:<20} {}", name, mark(!value.is_empty()));
    }

    println!();
    println!("  {}:", "Capabilities".bold());
    println!("    {:<20} {}", "web search", ready(cfg.has_search_credentials()));
    println!("    {:<20} {}", "web scrape", ready(true));
    let store_ready = match cfg.store_backend {
        StoreBackend::Chroma => cfg.has_chroma_credentials() && cfg.has_google_api_key(),
        StoreBackend::Sqlite => true,
    };
    println!(
        "    {:<20} {} ({:?}, '{}')",
        "knowledge base",
        ready(store_ready),
        cfg.store_backend,
        cfg.collection
    );
    println!("    {:<20} {}", "answers / agents", ready(cfg.has_google_api_key()));
    println!();

    if !cfg.has_search_credentials() {
        println!(
            "{} Set GOOGLE_CSE_API_KEY and GOOGLE_CSE_ID in the environment or a .env file.",
            "Hint:".yellow().bold()
        );
    }
    Ok(())
}

fn cmd_init(config_path: &Path, force: bool) -> Result<()> {
    if config_path.exists() && !force {
        bail!(
            "{} already exists (use --force to overwrite)",
            config_path.display()
        );
    }
    config::save_config(&AppConfig::default(), config_path)?;
    println!(
        "{} Wrote {}",
        ">>>".green().bold(),
        config_path.display()
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn print_result(result: &ToolResult) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&result.to_json())?);
    if !result.is_success() {
        std::process::exit(1);
    }
    Ok(())
}

/// `key=value` pairs into a metadata object. Numbers and booleans keep
/// their type; everything else is a string.
fn parse_metadata(pairs: &[String]) -> Result<Value> {
    let mut map = serde_json::Map::new();
    for pair in pairs {
        let Some((key, value)) = pair.split_once('=') else {
            bail!("Metadata '{}' is not in key=value form", pair);
        };
        let value = match serde_json::from_str::<Value>(value) {
            Ok(v @ (Value::Number(_) | Value::Bool(_))) => v,
            _ => Value::String(value.to_string()),
        };
        map.insert(key.trim().to_string(), value);
    }
    Ok(Value::Object(map))
}

fn mark(ok: bool) -> String {
    if ok {
        "✓ Set".green().to_string()
    } else {
        "✗ Not set".red().to_string()
    }
}

fn ready(ok: bool) -> String {
    if ok {
        "✓ ready".green().to_string()
    } else {
        "✗ unavailable".red().to_string()
    }
}
