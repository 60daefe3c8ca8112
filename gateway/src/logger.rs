//! Logger initialization for the gateway binary.

use std::fmt::Write as _;
use std::io::IsTerminal;
use std::str::FromStr;

use logforth::append::Stderr;
use logforth::filter::EnvFilter;
use logforth::layout::Layout;

/// Colored console layout; falls back to plain text when stderr isn't a terminal.
#[derive(Debug)]
struct ConsoleLayout {
    colored: bool,
}

impl Layout for ConsoleLayout {
    fn format(&self, record: &log::Record<'_>, _diagnostics: &[Box<dyn logforth::diagnostic::Diagnostic>]) -> anyhow::Result<Vec<u8>> {
        let mut output = String::new();

        let level = if self.colored {
            match record.level() {
                log::Level::Error => format!("\x1b[31m{:>5}\x1b[0m", record.level()),
                log::Level::Warn => format!("\x1b[33m{:>5}\x1b[0m", record.level()),
                log::Level::Info => format!("\x1b[32m{:>5}\x1b[0m", record.level()),
                log::Level::Debug => format!("\x1b[34m{:>5}\x1b[0m", record.level()),
                log::Level::Trace => format!("\x1b[35m{:>5}\x1b[0m", record.level()),
            }
        } else {
            format!("{:>5}", record.level())
        };

        write!(output, "{level}  {}", record.args())?;
        Ok(output.into_bytes())
    }
}

/// Installs the global logger, filtered by `log_level` (an `EnvFilter` directive such
/// as `"info"` or `"gateway=debug,llm=debug"`).
pub fn init(log_level: &str) {
    let filter = EnvFilter::from_str(log_level).unwrap_or_else(|_| EnvFilter::from_str("error").expect("default filter is valid"));
    let layout = ConsoleLayout { colored: std::io::stderr().is_terminal() };

    logforth::builder()
        .dispatch(|d| d.filter(filter).append(Stderr::default().with_layout(layout)))
        .apply();
}
