use clap::Parser;

/// Anthropic-to-OpenAI translating proxy.
///
/// Almost everything is configured via environment variables (see `config::Config`);
/// these flags exist for the handful of knobs worth setting at invocation time.
#[derive(Debug, Parser)]
#[command(version, about)]
pub struct Args {
    /// Overrides `LOG_LEVEL` for this run.
    #[arg(long, env = "LOG_LEVEL")]
    pub log_level: Option<String>,
}
