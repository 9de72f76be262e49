//! # Provider-Guard CLI
//!
//! Command-line interface for the provider-guard resilience layer.
//!
//! This module provides CLI commands for:
//! - Configuration validation and display
//! - Scripted, deterministic simulation of a provider fleet
//! - Shell completions

use clap::{CommandFactory, Parser, Subcommand};
use provider_guard_core::circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerConfigUpdate, CircuitBreakerError,
    CircuitBreakerEvent, CircuitBreakerEventType, CircuitBreakerRegistry, CircuitBreakerStats,
    CircuitBreakerSummary, CircuitState, ConfigError as BreakerConfigError, DEFAULT_CONFIG,
};
use provider_guard_core::clock::{Clock, SharedClock};
use provider_guard_core::monitoring::{attach_metrics, InMemoryMetricsCollector, ProviderMetrics};
use provider_guard_core::{AiProvider, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when neither `--log-level`, `RUST_LOG`, nor the configuration
/// file sets one.
pub const DEFAULT_LOG_FILTER: &str = "provider_guard_cli=info,provider_guard_core=info";

/// Prefix of environment variables overriding the configuration file.
pub const ENV_PREFIX: &str = "PG";

// ============================================================================
// CLI Structure
// ============================================================================

/// Provider-Guard CLI - circuit breakers for external AI providers
#[derive(Parser)]
#[command(name = "provider-guard")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Circuit breakers and fleet health for external AI providers")]
#[command(
    long_about = "Provider-Guard gates calls to external AI providers with per-provider circuit breakers"
)]
pub struct Cli {
    /// Configuration file path (YAML, TOML or JSON)
    #[arg(short, long, env = "PROVIDER_GUARD_CONFIG")]
    pub config: Option<PathBuf>,

    /// Logging filter, e.g. `debug` or `provider_guard_core=trace`
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long)]
    pub json_logs: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Validate configuration
    Config {
        /// Show resolved configuration
        #[arg(short, long)]
        show: bool,

        /// Output format for configuration
        #[arg(short = 'f', long, default_value = "yaml")]
        format: ConfigFormat,
    },

    /// Run a scripted call sequence against a simulated fleet
    Simulate {
        /// Call script `<provider>=<outcomes>`; outcomes are
        /// s (success), f (failure), t (timeout), w (wait one step)
        #[arg(short, long = "script", required = true)]
        scripts: Vec<ProviderScript>,

        /// Simulated time a `w` outcome waits, in milliseconds
        #[arg(long, default_value = "1000")]
        step_ms: u64,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

/// Output format options
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum, Serialize, Deserialize)]
pub enum OutputFormat {
    /// Human-readable text
    Text,
    /// JSON output
    Json,
}

/// Configuration format options
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum ConfigFormat {
    /// YAML format
    Yaml,
    /// JSON format
    Json,
    /// TOML format
    Toml,
}

// ============================================================================
// CLI Error Types
// ============================================================================

/// CLI-specific errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Invalid argument: {arg} - {message}")]
    InvalidArgument { arg: String, message: String },

    #[error("Failed to render output: {message}")]
    Output { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Configuration(_) => 1,
            CliError::InvalidArgument { .. } => 2,
            CliError::Output { .. } => 3,
            CliError::Io(_) => 4,
        }
    }

    fn output(error: impl fmt::Display) -> Self {
        CliError::Output {
            message: error.to_string(),
        }
    }
}

/// Configuration-related errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid configuration for {scope}: {source}")]
    Invalid {
        scope: String,
        #[source]
        source: BreakerConfigError,
    },
}

// ============================================================================
// Configuration Types
// ============================================================================

/// Configuration file contents.
///
/// ```yaml
/// defaults:
///   failure_threshold: 3
///   request_timeout_ms: 10000
/// providers:
///   openai:
///     reset_timeout_ms: 60000
/// logging:
///   level: info
///   json: false
/// ```
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct GuardConfig {
    /// Overrides applied to every breaker.
    pub defaults: CircuitBreakerConfigUpdate,

    /// Per-provider overrides, applied over `defaults`.
    pub providers: BTreeMap<String, CircuitBreakerConfigUpdate>,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

impl GuardConfig {
    /// Breaker configuration for providers without their own overrides.
    pub fn breaker_config(&self) -> CircuitBreakerConfig {
        self.defaults.apply_to(&DEFAULT_CONFIG)
    }

    /// Breaker configuration for `provider`.
    pub fn provider_config(&self, provider: &str) -> CircuitBreakerConfig {
        match self.providers.get(provider) {
            Some(overrides) => overrides.apply_to(&self.breaker_config()),
            None => self.breaker_config(),
        }
    }

    /// Check every resolved breaker configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.breaker_config()
            .validate()
            .map_err(|source| ConfigError::Invalid {
                scope: "defaults".to_string(),
                source,
            })?;

        for provider in self.providers.keys() {
            self.provider_config(provider)
                .validate()
                .map_err(|source| ConfigError::Invalid {
                    scope: format!("provider '{}'", provider),
                    source,
                })?;
        }

        Ok(())
    }

    /// Fully resolved view of the configuration.
    pub fn resolve(&self) -> ResolvedConfig {
        ResolvedConfig {
            defaults: self.breaker_config(),
            providers: self
                .providers
                .keys()
                .map(|provider| (provider.clone(), self.provider_config(provider)))
                .collect(),
            logging: self.logging.clone(),
        }
    }

    /// Registry using this configuration, with configured providers declared.
    pub fn build_registry(&self, clock: SharedClock) -> CircuitBreakerRegistry {
        CircuitBreakerRegistry::with_clock(self.breaker_config(), clock)
            .with_known_providers(self.providers.keys().map(String::as_str))
    }

    /// Breaker for `provider`, created with its overrides on first use.
    pub fn breaker_for(
        &self,
        registry: &CircuitBreakerRegistry,
        provider: &AiProvider,
    ) -> Arc<CircuitBreaker> {
        match self.providers.get(provider.as_str()) {
            Some(overrides) => registry.get_with_config(provider, overrides),
            None => registry.get(provider),
        }
    }
}

/// Configuration with every breaker field filled in.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedConfig {
    pub defaults: CircuitBreakerConfig,
    pub providers: BTreeMap<String, CircuitBreakerConfig>,
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directives.
    pub level: String,
    /// Emit JSON log lines.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_FILTER.to_string(),
            json: false,
        }
    }
}

/// Load configuration from an optional file and `PG__` environment variables.
///
/// Sources, later ones overriding earlier ones:
///  1. Built-in defaults
///  2. `path`, format chosen by extension
///  3. Environment variables prefixed `PG__`, e.g.
///     `PG__DEFAULTS__FAILURE_THRESHOLD=3` or
///     `PG__PROVIDERS__OPENAI__REQUEST_TIMEOUT_MS=5000`
pub fn load_configuration(path: Option<&Path>) -> Result<GuardConfig, ConfigError> {
    let mut builder = config::Config::builder();

    if let Some(path) = path {
        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        debug!(path = %path.display(), "Loading configuration file");
        builder = builder.add_source(config::File::from(path).required(true));
    }

    let config: GuardConfig = builder
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        )
        .build()?
        .try_deserialize()?;

    config.validate()?;
    Ok(config)
}

/// Render `config` fully resolved in `format`.
pub fn render_config(config: &GuardConfig, format: ConfigFormat) -> Result<String, CliError> {
    let resolved = config.resolve();
    match format {
        ConfigFormat::Yaml => serde_yaml::to_string(&resolved).map_err(CliError::output),
        ConfigFormat::Json => serde_json::to_string_pretty(&resolved).map_err(CliError::output),
        ConfigFormat::Toml => toml::to_string_pretty(&resolved).map_err(CliError::output),
    }
}

// ============================================================================
// Simulation
// ============================================================================

/// One scripted step.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScriptOutcome {
    /// The provider answers.
    Success,
    /// The provider returns an error.
    Failure,
    /// The provider never answers within the request timeout.
    Timeout,
    /// No call; simulated time moves on by one step.
    Wait,
}

impl TryFrom<char> for ScriptOutcome {
    type Error = String;

    fn try_from(value: char) -> Result<Self, Self::Error> {
        match value.to_ascii_lowercase() {
            's' => Ok(Self::Success),
            'f' => Ok(Self::Failure),
            't' => Ok(Self::Timeout),
            'w' => Ok(Self::Wait),
            other => Err(format!(
                "unknown outcome '{}' (expected s, f, t or w)",
                other
            )),
        }
    }
}

/// Call script for one provider, parsed from `<provider>=<outcomes>`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProviderScript {
    pub provider: AiProvider,
    pub outcomes: Vec<ScriptOutcome>,
}

impl FromStr for ProviderScript {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (provider, outcomes) = value
            .split_once('=')
            .ok_or_else(|| format!("expected <provider>=<outcomes>, got '{}'", value))?;

        let provider = provider.trim();
        if provider.is_empty() {
            return Err("provider name must not be empty".to_string());
        }

        let outcomes = outcomes
            .chars()
            .filter(|c| !c.is_whitespace())
            .map(ScriptOutcome::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        if outcomes.is_empty() {
            return Err(format!("script for '{}' has no outcomes", provider));
        }

        Ok(Self {
            provider: AiProvider::from(provider),
            outcomes,
        })
    }
}

/// What the breaker did with one scripted step.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CallResult {
    Succeeded,
    Failed,
    TimedOut,
    Rejected,
    Waited,
}

impl CallResult {
    fn as_str(&self) -> &'static str {
        match self {
            CallResult::Succeeded => "succeeded",
            CallResult::Failed => "failed",
            CallResult::TimedOut => "timed-out",
            CallResult::Rejected => "rejected",
            CallResult::Waited => "waited",
        }
    }
}

/// Record of one executed step.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SimulationStep {
    /// Script position; providers advance through their scripts in lockstep.
    pub round: usize,
    pub provider: AiProvider,
    pub outcome: ScriptOutcome,
    pub result: CallResult,
    /// Breaker state after the step.
    pub state: CircuitState,
    /// Simulated time since the start of the run.
    pub at_ms: u64,
}

/// Result of a simulation run.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SimulationReport {
    pub steps: Vec<SimulationStep>,
    pub transitions: Vec<CircuitBreakerEvent>,
    pub summary: CircuitBreakerSummary,
    pub stats: BTreeMap<AiProvider, CircuitBreakerStats>,
    pub metrics: BTreeMap<AiProvider, ProviderMetrics>,
    pub available: Vec<AiProvider>,
    pub elapsed_ms: u64,
}

#[derive(Debug, thiserror::Error)]
#[error("simulated provider failure")]
struct SimulatedFailure;

/// Clock following tokio's time, anchored at a wall-clock instant.
///
/// While tokio's clock is paused this is fully deterministic.
#[derive(Debug, Clone, Copy)]
struct RuntimeClock {
    origin: Timestamp,
    started: Instant,
}

impl RuntimeClock {
    fn start() -> Self {
        Self {
            origin: Timestamp::now(),
            started: Instant::now(),
        }
    }

    fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

impl Clock for RuntimeClock {
    fn now(&self) -> Timestamp {
        self.origin.add_duration(self.started.elapsed())
    }
}

/// Pauses tokio's clock until dropped.
struct PausedTime;

impl PausedTime {
    fn start() -> Self {
        tokio::time::pause();
        PausedTime
    }
}

impl Drop for PausedTime {
    fn drop(&mut self) {
        tokio::time::resume();
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

async fn simulated_call(breaker: &CircuitBreaker, outcome: ScriptOutcome) -> CallResult {
    let result = match outcome {
        ScriptOutcome::Success => {
            breaker
                .execute(|| async { Ok::<(), SimulatedFailure>(()) })
                .await
        }
        ScriptOutcome::Failure => {
            breaker
                .execute(|| async { Err::<(), _>(SimulatedFailure) })
                .await
        }
        ScriptOutcome::Timeout => {
            breaker
                .execute(std::future::pending::<Result<(), SimulatedFailure>>)
                .await
        }
        ScriptOutcome::Wait => return CallResult::Waited,
    };

    match result {
        Ok(()) => CallResult::Succeeded,
        Err(CircuitBreakerError::Operation(_)) => CallResult::Failed,
        Err(CircuitBreakerError::Timeout { .. }) => CallResult::TimedOut,
        Err(CircuitBreakerError::CircuitOpen { .. }) => CallResult::Rejected,
    }
}

/// Run `scripts` against a fresh registry built from `config`.
///
/// Providers advance through their scripts in lockstep: round `n` runs the
/// `n`th outcome of every script, in the order the scripts were given.
/// Time is simulated: tokio's clock is paused for the duration of the run,
/// so timeouts and waits complete instantly.
///
/// # Panics
///
/// Must be called from a current-thread tokio runtime whose clock is not
/// already paused.
pub async fn run_simulation(
    config: &GuardConfig,
    scripts: &[ProviderScript],
    step: Duration,
) -> Result<SimulationReport, CliError> {
    if scripts.is_empty() {
        return Err(CliError::InvalidArgument {
            arg: "script".to_string(),
            message: "at least one script is required".to_string(),
        });
    }

    let _paused = PausedTime::start();
    let clock = RuntimeClock::start();
    let registry = config.build_registry(Arc::new(clock));

    let metrics = Arc::new(InMemoryMetricsCollector::new());
    let _metrics_subscription = attach_metrics(&registry, metrics.clone());

    let transitions = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&transitions);
    let _transition_subscription = registry.on_event(move |event| {
        if event.event_type == CircuitBreakerEventType::StateChange {
            sink.lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(event.clone());
        }
    });

    let breakers: Vec<_> = scripts
        .iter()
        .map(|script| config.breaker_for(&registry, &script.provider))
        .collect();
    let rounds = scripts
        .iter()
        .map(|script| script.outcomes.len())
        .max()
        .unwrap_or(0);

    info!(
        providers = scripts.len(),
        rounds = rounds,
        step_ms = millis(step),
        "Starting simulation"
    );

    let mut steps = Vec::new();
    for round in 0..rounds {
        for (script, breaker) in scripts.iter().zip(&breakers) {
            let Some(&outcome) = script.outcomes.get(round) else {
                continue;
            };

            let result = match outcome {
                ScriptOutcome::Wait => {
                    tokio::time::advance(step).await;
                    CallResult::Waited
                }
                _ => simulated_call(breaker, outcome).await,
            };

            steps.push(SimulationStep {
                round,
                provider: script.provider.clone(),
                outcome,
                result,
                state: breaker.state(),
                at_ms: millis(clock.elapsed()),
            });
        }
    }

    let report = SimulationReport {
        steps,
        transitions: transitions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone(),
        summary: registry.summary(),
        stats: registry.all_stats(),
        metrics: metrics.snapshot(),
        available: registry.available_providers(),
        elapsed_ms: millis(clock.elapsed()),
    };

    registry.destroy();
    info!(
        elapsed_ms = report.elapsed_ms,
        open = report.summary.open,
        "Simulation finished"
    );
    Ok(report)
}

impl fmt::Display for SimulationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:>5}  {:<16} {:<8} {:<10} {:<10} {:>9}",
            "ROUND", "PROVIDER", "OUTCOME", "RESULT", "STATE", "AT (ms)"
        )?;
        for step in &self.steps {
            writeln!(
                f,
                "{:>5}  {:<16} {:<8} {:<10} {:<10} {:>9}",
                step.round,
                step.provider.as_str(),
                format!("{:?}", step.outcome).to_lowercase(),
                step.result.as_str(),
                step.state.as_str(),
                step.at_ms
            )?;
        }

        if !self.transitions.is_empty() {
            writeln!(f)?;
            writeln!(f, "Transitions:")?;
            for event in &self.transitions {
                let previous = event
                    .previous_state
                    .map_or("?", |state| state.as_str());
                write!(
                    f,
                    "  {}: {} -> {}",
                    event.provider, previous, event.current_state
                )?;
                match event.metadata.reason {
                    Some(reason) => writeln!(f, " ({:?})", reason)?,
                    None => writeln!(f)?,
                }
            }
        }

        writeln!(f)?;
        writeln!(
            f,
            "Summary: {} breakers, {} closed, {} open, {} half-open",
            self.summary.total, self.summary.closed, self.summary.open, self.summary.half_open
        )?;
        for (provider, stats) in &self.stats {
            let metrics = self.metrics.get(provider).cloned().unwrap_or_default();
            writeln!(
                f,
                "  {:<16} {:<10} requests={} failures={} failure_rate={:.1}% rejected={} timeouts={} avg_ms={:.1}",
                provider.as_str(),
                stats.state.as_str(),
                stats.total_requests,
                stats.total_failures,
                stats.failure_rate * 100.0,
                stats.rejected_requests,
                stats.timeouts,
                metrics.avg_duration_ms()
            )?;
        }

        let available: Vec<_> = self.available.iter().map(AiProvider::as_str).collect();
        write!(f, "Available: ")?;
        if available.is_empty() {
            writeln!(f, "none")?;
        } else {
            writeln!(f, "{}", available.join(", "))?;
        }
        write!(f, "Simulated time: {}ms", self.elapsed_ms)
    }
}

/// Render a simulation report in `format`.
pub fn render_report(report: &SimulationReport, format: OutputFormat) -> Result<String, CliError> {
    match format {
        OutputFormat::Text => Ok(report.to_string()),
        OutputFormat::Json => serde_json::to_string_pretty(report).map_err(CliError::output),
    }
}

// ============================================================================
// Main Entry Point
// ============================================================================

/// Main CLI entry point
pub async fn run_cli() -> Result<(), CliError> {
    run(Cli::parse()).await
}

/// Execute an already parsed command line.
pub async fn run(cli: Cli) -> Result<(), CliError> {
    // Completions do not depend on configuration
    if let Commands::Completions { shell } = cli.command {
        return execute_completions_command(shell);
    }

    let config = load_configuration(cli.config.as_deref())?;
    initialize_logging(&cli, &config.logging)?;

    match cli.command {
        Commands::Config { show, format } => execute_config_command(&config, show, format),
        Commands::Simulate {
            scripts,
            step_ms,
            format,
        } => execute_simulate_command(&config, &scripts, step_ms, format).await,
        Commands::Completions { shell } => execute_completions_command(shell),
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

/// Build the log filter: `--log-level`, then `RUST_LOG`, then configuration.
pub fn build_env_filter(
    cli_level: Option<&str>,
    logging: &LoggingConfig,
) -> Result<EnvFilter, CliError> {
    let invalid = |arg: &str, error: tracing_subscriber::filter::ParseError| {
        CliError::InvalidArgument {
            arg: arg.to_string(),
            message: error.to_string(),
        }
    };

    match cli_level {
        Some(level) => EnvFilter::try_new(level).map_err(|e| invalid("log-level", e)),
        None => match EnvFilter::try_from_default_env() {
            Ok(filter) => Ok(filter),
            Err(_) => EnvFilter::try_new(&logging.level).map_err(|e| invalid("logging.level", e)),
        },
    }
}

/// Initialize logging based on CLI arguments and configuration
fn initialize_logging(cli: &Cli, logging: &LoggingConfig) -> Result<(), CliError> {
    let filter = build_env_filter(cli.log_level.as_deref(), logging)?;
    let registry = tracing_subscriber::registry().with(filter);
    let layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let result = if cli.json_logs || logging.json {
        registry.with(layer.json()).try_init()
    } else {
        registry.with(layer).try_init()
    };

    result.map_err(|e| CliError::InvalidArgument {
        arg: "log-level".to_string(),
        message: e.to_string(),
    })
}

fn emit(output: &str) -> Result<(), CliError> {
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{}", output)?;
    Ok(())
}

/// Execute config command
fn execute_config_command(
    config: &GuardConfig,
    show: bool,
    format: ConfigFormat,
) -> Result<(), CliError> {
    info!(
        show = show,
        format = ?format,
        providers = config.providers.len(),
        "Configuration is valid"
    );

    if show {
        emit(&render_config(config, format)?)
    } else {
        emit("Configuration is valid")
    }
}

/// Execute simulate command
async fn execute_simulate_command(
    config: &GuardConfig,
    scripts: &[ProviderScript],
    step_ms: u64,
    format: OutputFormat,
) -> Result<(), CliError> {
    let report = run_simulation(config, scripts, Duration::from_millis(step_ms)).await?;
    emit(&render_report(&report, format)?)
}

/// Execute completions command
fn execute_completions_command(shell: clap_complete::Shell) -> Result<(), CliError> {
    let mut command = Cli::command();
    let name = command.get_name().to_string();
    let mut stdout = std::io::stdout().lock();
    clap_complete::generate(shell, &mut command, name, &mut stdout);
    stdout.flush()?;
    Ok(())
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
