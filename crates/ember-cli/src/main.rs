//! `ember` binary: a thin host exercising `ember-core` end to end. Boots a
//! `GlobalState` from configuration, then drops into the REPL.

mod reader;
mod repl;

use std::path::PathBuf;

use clap::Parser;
use ember_core::config::{GcConfig, RuntimeConfig};
use ember_core::state::GlobalState;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "ember", version = ember_core::VERSION, about = "ember runtime host")]
struct Cli {
    /// Path to a TOML file overriding the default runtime/GC configuration.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Initial stack size, in value slots, for the main thread.
    #[arg(long, value_name = "N")]
    stack_size: Option<usize>,
}

#[derive(Debug, Default, serde::Deserialize)]
struct FileConfig {
    #[serde(default)]
    runtime: Option<RuntimeConfig>,
    #[serde(default)]
    gc: Option<GcConfig>,
}

fn main() {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let cli = Cli::parse();
    let (mut runtime_config, gc_config) = match load_config(cli.config.as_deref()) {
        Ok(pair) => pair,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    };
    if let Some(n) = cli.stack_size {
        runtime_config.initial_stack_size = n;
    }

    let mut global = GlobalState::new(runtime_config, gc_config);
    repl::run(&mut global);
}

fn load_config(path: Option<&std::path::Path>) -> Result<(RuntimeConfig, GcConfig), String> {
    let Some(path) = path else {
        return Ok((RuntimeConfig::default(), GcConfig::default()));
    };
    let text = std::fs::read_to_string(path).map_err(|e| format!("reading {}: {e}", path.display()))?;
    let parsed: FileConfig = toml::from_str(&text).map_err(|e| format!("parsing {}: {e}", path.display()))?;
    Ok((parsed.runtime.unwrap_or_default(), parsed.gc.unwrap_or_default()))
}
