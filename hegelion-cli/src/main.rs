//! Hegelion CLI — run dialectical reasoning from the command line.

mod output;

use anyhow::{bail, Context};
use clap::Parser;
use hegelion_core::{
    create_backend, DialecticEngine, HegelionConfig, Query, QueryOptions, ResponseStyle,
    StreamEvent,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Hegelion: thesis, antithesis, synthesis over any LLM backend
#[derive(Parser, Debug)]
#[command(name = "hegelion", version, about, long_about = None)]
struct Cli {
    /// The question to reason about
    query: String,

    /// Run the antithesis as a three-persona critic council
    #[arg(long)]
    council: bool,

    /// Score the synthesis with a judge and retry below threshold
    #[arg(long)]
    judge: bool,

    /// Ask phases to ground claims in retrieved evidence
    #[arg(long)]
    search: bool,

    /// Response style: sections, json, synthesis_only, conversational, bullet_points
    #[arg(long, default_value = "sections")]
    style: String,

    /// Token budget per phase
    #[arg(long)]
    max_tokens: Option<usize>,

    /// Independent full-pipeline runs
    #[arg(long)]
    iterations: Option<usize>,

    /// Print tokens as they arrive
    #[arg(long)]
    stream: bool,

    /// Emit the raw result as JSON instead of sections
    #[arg(long)]
    json: bool,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long)]
    quiet: bool,
}

fn parse_style(style: &str) -> anyhow::Result<ResponseStyle> {
    Ok(match style {
        "sections" => ResponseStyle::Sections,
        "json" => ResponseStyle::Json,
        "synthesis_only" => ResponseStyle::SynthesisOnly,
        "conversational" => ResponseStyle::Conversational,
        "bullet_points" => ResponseStyle::BulletPoints,
        other => bail!(
            "unknown style '{other}' (expected sections, json, synthesis_only, \
             conversational, or bullet_points)"
        ),
    })
}

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if quiet {
        "error"
    } else {
        match verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    let config =
        HegelionConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    let backend = create_backend(&config.backend).context("failed to create backend")?;
    let engine = Arc::new(DialecticEngine::new(backend, &config));

    let mut options = QueryOptions {
        use_council: cli.council,
        use_judge: cli.judge,
        use_search: cli.search,
        response_style: parse_style(&cli.style)?,
        ..QueryOptions::default()
    };
    if let Some(max_tokens) = cli.max_tokens {
        options.max_tokens_per_phase = max_tokens;
    }
    if let Some(iterations) = cli.iterations {
        options.iterations = iterations;
    }

    let iterations = options.iterations;
    let query = Query::new(cli.query, options);

    if iterations > 1 {
        let results = engine.run_iterations(query).await?;
        if cli.json {
            println!("{}", serde_json::to_string_pretty(&results)?);
        } else {
            for (i, result) in results.iter().enumerate() {
                println!("=== Iteration {} ===\n", i + 1);
                print!("{}", output::render_sections(result));
                println!();
            }
        }
        return Ok(());
    }

    let result = if cli.stream {
        run_streaming(&engine, query).await?
    } else {
        engine.run(query).await?
    };

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else if cli.stream {
        // Tokens were already printed live; just add the footer.
        let meta = &result.metadata;
        eprintln!(
            "\nmode={} total={}ms retries={}",
            result.mode, meta.total_duration_ms, meta.retry_count
        );
    } else {
        print!("{}", output::render_sections(&result));
    }
    Ok(())
}

/// Run with a stream sink, printing phase headers and tokens as they arrive.
async fn run_streaming(
    engine: &Arc<DialecticEngine>,
    query: Query,
) -> anyhow::Result<hegelion_core::HegelionResult> {
    let (tx, mut rx) = tokio::sync::mpsc::channel(256);

    let printer = tokio::spawn(async move {
        use std::io::Write;
        let mut stdout = std::io::stdout();
        while let Some(event) = rx.recv().await {
            match event {
                StreamEvent::PhaseStarted { phase } => {
                    println!("\n--- {phase} ---");
                }
                StreamEvent::Token { text, .. } => {
                    print!("{text}");
                    let _ = stdout.flush();
                }
                StreamEvent::PhaseCompleted { .. } => {
                    println!();
                }
            }
        }
    });

    let result = engine
        .run_with(query, Some(tx), CancellationToken::new())
        .await;
    let _ = printer.await;
    Ok(result?)
}
