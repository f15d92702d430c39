//! Tracing setup for the `dx` binary.
//!
//! Robot mode writes JSON lines to stderr so stdout stays reserved for the
//! command result; human mode picks pretty or compact output depending on
//! whether stderr is a terminal.

use std::io::{self, IsTerminal};

use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// How the subscriber should render events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogStyle {
    Json,
    Pretty,
    Compact,
}

/// Logging options resolved from CLI flags.
#[derive(Debug, Clone, Copy)]
pub struct LogOptions {
    pub robot_mode: bool,
    /// 0 = info, 1 = debug, 2+ = trace
    pub verbose: u8,
    pub quiet: bool,
}

impl LogOptions {
    /// Default `EnvFilter` directive when `RUST_LOG` is unset.
    pub const fn default_directive(&self) -> &'static str {
        if self.quiet {
            return "dx=error";
        }
        match self.verbose {
            0 => "dx=info",
            1 => "dx=debug",
            _ => "dx=trace",
        }
    }

    /// Output style for the current process.
    pub fn style(&self) -> LogStyle {
        if self.robot_mode {
            LogStyle::Json
        } else if io::stderr().is_terminal() {
            LogStyle::Pretty
        } else {
            LogStyle::Compact
        }
    }
}

/// Initialize the global tracing subscriber.
///
/// `RUST_LOG` overrides the verbosity-derived directive (e.g.
/// `RUST_LOG=dx=debug,zip=warn`). Calling this twice is a no-op for the
/// second call.
pub fn init_logging(robot_mode: bool, verbose: u8, quiet: bool) {
    let opts = LogOptions {
        robot_mode,
        verbose,
        quiet,
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(opts.default_directive()));
    let registry = tracing_subscriber::registry().with(filter);

    let base = fmt::layer()
        .with_file(false)
        .with_line_number(false)
        .with_thread_ids(false)
        .with_span_events(FmtSpan::NONE)
        .with_writer(io::stderr);

    let _ = match opts.style() {
        LogStyle::Json => registry.with(base.json().with_target(true)).try_init(),
        LogStyle::Pretty => registry.with(base.with_target(false)).try_init(),
        LogStyle::Compact => registry
            .with(base.with_ansi(false).with_target(false).compact())
            .try_init(),
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directives() {
        let mut opts = LogOptions {
            robot_mode: false,
            verbose: 0,
            quiet: false,
        };
        assert_eq!(opts.default_directive(), "dx=info");
        opts.verbose = 1;
        assert_eq!(opts.default_directive(), "dx=debug");
        opts.verbose = 5;
        assert_eq!(opts.default_directive(), "dx=trace");
        opts.quiet = true;
        assert_eq!(opts.default_directive(), "dx=error");
        assert!(EnvFilter::try_new(opts.default_directive()).is_ok());
    }

    #[test]
    fn test_robot_mode_is_json() {
        let opts = LogOptions {
            robot_mode: true,
            verbose: 0,
            quiet: false,
        };
        assert_eq!(opts.style(), LogStyle::Json);
    }
}
