//! ideaforge CLI - brainstorm, self-review and group ideas with an LLM.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ideaforge::parse::codec::encode;
use ideaforge::{
    Categorizer, Config, Item, LLMClient, RefineEvent, RefinementLoop, ThemeMap, build_sink,
    publish_or_warn,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{Level, info, warn};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "ideaforge")]
#[command(version)]
#[command(about = "Generate, evaluate and improve ideas with an LLM until they are good enough")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file (defaults are used if it does not exist)
    #[arg(short, long, global = true, default_value = "ideaforge.toml")]
    config: PathBuf,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the generate/evaluate/improve loop, then group the results into themes
    Run {
        /// Question to brainstorm on (overrides config)
        #[arg(short, long)]
        question: Option<String>,

        /// Number of ideas to generate (overrides config)
        #[arg(short, long)]
        batch_size: Option<usize>,

        /// Attempt budget of the loop (overrides config)
        #[arg(short, long)]
        max_attempts: Option<usize>,
    },

    /// Validate configuration file
    Validate,

    /// Show example configuration
    Example,
}

fn setup_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set subscriber");
}

fn print_example_config() {
    let example = r#"# ideaforge configuration file

[backend]
# API key (can also use OPENAI_API_KEY env var)
# api_key = "sk-..."
base_url = "https://api.openai.com/v1"
model = "gpt-4o"
timeout_secs = 180
max_retries = 3
temperature = 0.7

[generation]
question = "How might we use digital tools to help people build trust and express emotions in romantic relationships?"
batch_size = 11
max_attempts = 5
retry_backoff_ms = 500
max_backoff_ms = 8000

[sink]
kind = "none"  # none | jsonl | notion
# path = "output/ideas.jsonl"
# Notion: token from NOTION_TOKEN, page from NOTION_PAGE_ID (or page_id = "...")
"#;
    println!("{example}");
}

/// Route a loop event to the log.
fn log_event(event: &RefineEvent) {
    match event {
        RefineEvent::AttemptStarted {
            attempt,
            max_attempts,
        } => info!("--- Attempt {attempt} of {max_attempts} ---"),
        RefineEvent::Generated {
            requested,
            received,
        } => {
            if requested == received {
                info!(count = received, "Generated initial ideas");
            } else {
                warn!(requested, received, "Generated a different number of ideas than requested");
            }
        }
        RefineEvent::GenerationUnparsable { error } => {
            warn!(%error, "Failed to parse initial ideas, retrying")
        }
        RefineEvent::Evaluated {
            evaluated,
            passed,
            failed,
            missing,
            matched_by_id,
        } => {
            info!(evaluated, passed, failed, matched_by_id, "Evaluated ideas");
            if *missing > 0 {
                warn!(missing, "Evaluation omitted some ideas, marked as needing improvement");
            }
        }
        RefineEvent::EvaluationUnparsable { evaluated, error } => warn!(
            evaluated,
            %error,
            "Failed to parse evaluation, marking all as needing improvement"
        ),
        RefineEvent::Improved { sent, received } => {
            if sent == received {
                info!(count = received, "Improved weak ideas");
            } else {
                warn!(sent, received, "Improvement returned a different number of ideas");
            }
        }
        RefineEvent::ImprovementUnparsable { error } => {
            warn!(%error, "Failed to parse improved ideas, retrying")
        }
        RefineEvent::BackingOff { delay_ms } => info!(delay_ms, "Backing off before next attempt"),
        RefineEvent::Converged { attempts, accepted } => {
            info!(attempts, accepted, "All ideas are good enough")
        }
        RefineEvent::BudgetExhausted {
            attempts,
            accepted,
            pending,
        } => warn!(
            attempts,
            accepted,
            pending,
            "Reached maximum attempts, some ideas may still need improvement"
        ),
    }
}

fn print_ideas(items: &[Item]) {
    println!("\nFinal Ideas:");
    for (i, item) in items.iter().enumerate() {
        println!("{}. Title: {}", i + 1, item.title);
        println!("   Description: {}", item.description);
        println!("   Rating: {}", item.rating);
        println!();
    }
}

fn print_themes(themes: &ThemeMap) {
    println!("\nAffinity Diagram (Themes):");
    if themes.is_empty() {
        println!("(no themes)");
    }
    for (theme, titles) in themes.iter() {
        println!("\nTheme: {theme}");
        for title in titles {
            println!("- {title}");
        }
    }
}

fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        info!(path = ?path, "Config file not found, using defaults");
    }
    Config::load_or_default(path).with_context(|| format!("Failed to load config from {path:?}"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);
    dotenvy::dotenv().ok();

    match cli.command {
        Commands::Example => {
            print_example_config();
            return Ok(());
        }

        Commands::Validate => {
            let config = load_config(&cli.config)?;

            config
                .resolve_api_key()
                .context("Failed to resolve API key")?;
            build_sink(&config).context("Failed to set up sink")?;

            info!("Configuration is valid");
            info!("  Backend: {} ({})", config.backend.model, config.backend.base_url);
            info!(
                "  Ideas: {} per batch, {} attempts",
                config.generation.batch_size, config.generation.max_attempts
            );
            info!("  Sink: {:?}", config.sink.kind);
            return Ok(());
        }

        Commands::Run {
            question,
            batch_size,
            max_attempts,
        } => {
            let mut config = load_config(&cli.config)?;

            if let Some(question) = question {
                config.generation.question = question;
            }
            if let Some(batch_size) = batch_size {
                config.generation.batch_size = batch_size;
            }
            if let Some(max_attempts) = max_attempts {
                config.generation.max_attempts = max_attempts;
            }
            config.validate().context("Invalid settings")?;

            let api_key = config
                .resolve_api_key()
                .context("Failed to resolve API key")?;
            let client = Arc::new(LLMClient::new(&config.backend, Some(api_key))?);
            let sink = build_sink(&config).context("Failed to set up sink")?;

            info!(
                model = %config.backend.model,
                batch_size = config.generation.batch_size,
                max_attempts = config.generation.max_attempts,
                "Starting refinement"
            );

            let pb = ProgressBar::new(config.generation.max_attempts as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("[{elapsed_precise}] {bar:40.cyan/blue} attempt {pos}/{len} {msg}")
                    .context("Invalid progress template")?
                    .progress_chars("##-"),
            );

            let refine = RefinementLoop::new(client.clone(), &config.generation);
            let outcome = refine
                .run_observed(|event| {
                    match event {
                        RefineEvent::AttemptStarted { attempt, .. } => {
                            pb.set_position(*attempt as u64)
                        }
                        RefineEvent::Evaluated { passed, failed, .. } => {
                            pb.set_message(format!("passed: {passed}, failed: {failed}"))
                        }
                        _ => {}
                    }
                    pb.suspend(|| log_event(event));
                })
                .await
                .context("Refinement failed")?;
            pb.finish_and_clear();

            print_ideas(&outcome.items);

            // Ideas are already out; a failed categorization only costs the themes.
            let accepted: Vec<Item> = outcome.accepted().cloned().collect();
            info!("Categorizing ideas into themes...");
            let themes = match Categorizer::new(client.clone()).categorize(&accepted).await {
                Ok(themes) => themes,
                Err(e) => {
                    warn!(error = %e, "Categorization failed");
                    ThemeMap::new()
                }
            };
            print_themes(&themes);

            publish_or_warn(sink.as_ref(), &encode(&accepted), &themes).await;

            let stats = &outcome.stats;
            let (tokens_in, tokens_out) = client.total_tokens();
            println!("\n=== Refinement Complete ===");
            println!("Converged:   {}", stats.converged);
            println!("Attempts:    {}/{}", stats.attempts, config.generation.max_attempts);
            println!("Accepted:    {}", stats.total_accepted);
            println!("Pending:     {}", stats.total_pending);
            println!("Themes:      {}", themes.len());
            println!("Requests:    {}", client.total_requests());
            println!("Parse fails: {}", stats.parse_failures);
            println!("Tokens:      {tokens_in} in / {tokens_out} out");
            println!("Runtime:     {:.1}s", stats.runtime_secs);
        }
    }

    Ok(())
}
