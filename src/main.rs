use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;

use dashflow_binding::{BridgeExecutor, TriggerEngine, WidgetConfig};
use dashflow_bridge::DataBridge;
use dashflow_config::{DashflowSettings, PipelineConfig, WidgetRequirement};
use dashflow_pipeline::PipelineCoordinator;
use dashflow_script::LuaScriptEngine;

/// Dashflow - widget data orchestration and caching
#[derive(Parser)]
#[command(name = "dashflow")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Path to the settings file (default: ~/.dashflow/config.json when present)
  #[arg(long, global = true)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Execute a widget requirement and print its data bag
  Run {
    /// Path to the requirement file (JSON)
    requirement_file: PathBuf,
  },

  /// Run a full pipeline configuration and print the result
  Pipeline {
    /// Path to the pipeline configuration file (JSON)
    config_file: PathBuf,

    /// Include the per-stage trace
    #[arg(long)]
    debug: bool,
  },

  /// Check a pipeline configuration without running it
  Validate {
    /// Path to the pipeline configuration file (JSON)
    config_file: PathBuf,
  },

  /// Print the request parameters bound from a layered widget configuration
  Params {
    /// Path to the widget configuration file (JSON)
    widget_file: PathBuf,

    /// Also execute the widget with the bound parameters
    #[arg(long)]
    execute: bool,
  },
}

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_writer(io::stderr)
    .with_env_filter(
      tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
    )
    .init();

  let cli = Cli::parse();
  let settings = load_settings(cli.config.as_deref())?;

  match cli.command {
    Some(Commands::Run { requirement_file }) => {
      let rt = tokio::runtime::Runtime::new()?;
      rt.block_on(run_requirement(&requirement_file, &settings))?;
    }
    Some(Commands::Pipeline { config_file, debug }) => {
      let rt = tokio::runtime::Runtime::new()?;
      rt.block_on(run_pipeline(&config_file, debug, &settings))?;
    }
    Some(Commands::Validate { config_file }) => {
      validate(&config_file)?;
    }
    Some(Commands::Params {
      widget_file,
      execute,
    }) => {
      let rt = tokio::runtime::Runtime::new()?;
      rt.block_on(bind_params(&widget_file, execute, &settings))?;
    }
    None => {
      println!("dashflow - use --help to see available commands");
    }
  }

  Ok(())
}

fn load_settings(path: Option<&Path>) -> Result<DashflowSettings> {
  if let Some(path) = path {
    return DashflowSettings::from_file(path)
      .with_context(|| format!("failed to load settings: {}", path.display()));
  }

  match dirs::home_dir().map(|home| home.join(".dashflow").join("config.json")) {
    Some(default) if default.is_file() => DashflowSettings::from_file(&default)
      .with_context(|| format!("failed to load settings: {}", default.display())),
    _ => Ok(DashflowSettings::default()),
  }
}

async fn run_requirement(requirement_file: &Path, settings: &DashflowSettings) -> Result<()> {
  let mut requirement: WidgetRequirement = read_json(requirement_file).await?;
  let params = read_params_from_stdin()?;
  requirement.params.extend(params);

  eprintln!(
    "Executing widget '{}' with {} sources",
    requirement.widget_id,
    requirement.data_sources.len()
  );

  let bridge = DataBridge::new(settings);
  let result = bridge.execute_widget(&requirement).await;
  bridge.destroy();

  if !result.success {
    bail!(
      "widget execution failed: {}",
      result.error.unwrap_or_default()
    );
  }

  println!("{}", serde_json::to_string_pretty(&result.data)?);
  Ok(())
}

async fn run_pipeline(config_file: &Path, debug: bool, settings: &DashflowSettings) -> Result<()> {
  let mut config: PipelineConfig = read_json(config_file).await?;
  config.params.extend(read_params_from_stdin()?);

  let problems = PipelineCoordinator::validate(&config);
  for problem in &problems {
    eprintln!("warning: {}", problem);
  }

  let coordinator = PipelineCoordinator::new(settings);
  let result = coordinator.run(&config, debug).await;

  eprintln!(
    "Execution {} finished in {} ms",
    result.execution_id, result.execution_time_ms
  );
  println!("{}", serde_json::to_string_pretty(&result)?);
  Ok(())
}

fn validate(config_file: &Path) -> Result<()> {
  let content = std::fs::read_to_string(config_file)
    .with_context(|| format!("failed to read config file: {}", config_file.display()))?;
  let config: PipelineConfig = serde_json::from_str(&content)
    .with_context(|| format!("failed to parse config file: {}", config_file.display()))?;

  let problems = PipelineCoordinator::validate(&config);
  if problems.is_empty() {
    println!("{}: ok", config_file.display());
    return Ok(());
  }

  for problem in &problems {
    println!("{}", problem);
  }
  bail!("{} problem(s) found", problems.len())
}

async fn bind_params(widget_file: &Path, execute: bool, settings: &DashflowSettings) -> Result<()> {
  let config: WidgetConfig = read_json(widget_file).await?;
  let widget_id = widget_file
    .file_stem()
    .and_then(|s| s.to_str())
    .unwrap_or("widget")
    .to_string();

  let bridge = Arc::new(DataBridge::new(settings));
  let engine = TriggerEngine::new(
    Arc::new(BridgeExecutor::new(bridge.clone())),
    LuaScriptEngine::shared(settings.script.clone()),
    settings.trigger.clone(),
  );
  engine.register_widget(widget_id.clone(), config);

  let built = engine.build_request_params(&widget_id)?;
  for warning in &built.warnings {
    eprintln!("warning: {}", serde_json::to_string(warning)?);
  }
  println!("{}", serde_json::to_string_pretty(&built.params)?);

  if execute {
    let outcome = engine.trigger_now(&widget_id, "cli").await?;
    eprintln!("Execution outcome: {:?}", outcome);
    if let Some(data) = bridge.get_widget_data(&widget_id) {
      println!("{}", serde_json::to_string_pretty(&data)?);
    }
  }

  engine.shutdown();
  bridge.destroy();
  Ok(())
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
  let content = tokio::fs::read_to_string(path)
    .await
    .with_context(|| format!("failed to read file: {}", path.display()))?;
  serde_json::from_str(&content).with_context(|| format!("failed to parse file: {}", path.display()))
}

/// Request params piped on stdin. A terminal or empty input means none.
fn read_params_from_stdin() -> Result<serde_json::Map<String, serde_json::Value>> {
  use std::io::IsTerminal;

  if io::stdin().is_terminal() {
    return Ok(serde_json::Map::new());
  }

  let mut input = String::new();
  io::stdin()
    .read_to_string(&mut input)
    .context("failed to read params from stdin")?;

  if input.trim().is_empty() {
    return Ok(serde_json::Map::new());
  }

  match serde_json::from_str(&input).context("failed to parse params JSON from stdin")? {
    serde_json::Value::Object(params) => Ok(params),
    other => bail!("params on stdin must be a JSON object, got {}", other),
  }
}
