//! Latch Script Host
//!
//! Minimal binary that boots a script runtime and evaluates files through
//! the engine-agnostic interface.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use latch_script::{EngineKind, RuntimeConfig, ScriptRuntime, ScriptValue};

#[derive(Debug, Parser)]
#[command(name = "latch", version, about = "Evaluate scripts on an embedded engine")]
struct Cli {
    /// Engine to run the scripts on (quickjs or wasm)
    #[arg(short, long, default_value = "quickjs")]
    engine: EngineKind,

    /// JSON file with runtime limits
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Scripts to evaluate, in order, on a single runtime
    #[arg(required = true)]
    scripts: Vec<PathBuf>,
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    tracing::info!("Latch interop v{}", latch_interop::VERSION);

    let config = match &cli.config {
        Some(path) => RuntimeConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => RuntimeConfig::default(),
    };

    let mut runtime = ScriptRuntime::with_kind(cli.engine, &config)?;
    if cli.engine == EngineKind::QuickJs {
        runtime.register_function("print", |args| {
            let line: Vec<String> = args.iter().map(describe).collect();
            println!("{}", line.join(" "));
            Ok(ScriptValue::null())
        })?;
    }

    for script in &cli.scripts {
        let value = runtime
            .evaluate_file(script)
            .with_context(|| format!("failed to evaluate {}", script.display()))?;
        tracing::info!(script = %script.display(), result = %describe(&value), "evaluated");
    }

    let stats = runtime.stats();
    tracing::info!(
        evaluations = stats.evaluations,
        invocations = stats.invocations,
        failures = stats.failures,
        "shutting down"
    );
    runtime.dispose();
    Ok(())
}

fn describe(value: &ScriptValue) -> String {
    match value {
        ScriptValue::Value(serde_json::Value::String(s)) => s.clone(),
        ScriptValue::Value(other) => other.to_string(),
        ScriptValue::Handle(handle) => format!("{handle:?}"),
    }
}
