//! Command-line surface and the immutable run configuration built from it.

use crate::error::MonitorError;
use clap::error::ErrorKind;
use clap::Parser;
use std::ffi::OsString;
use std::time::Duration;

pub const DEFAULT_SAMPLES: usize = 10;
pub const DEFAULT_PERIOD_SECS: u64 = 1;

/// Report CPU, memory and user session usage of this host
#[derive(Parser, Debug)]
#[command(name = "sysmon")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Number of samples to take
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u64).range(1..))]
    samples: Option<u64>,

    /// Delay between samples in seconds
    #[arg(long, value_name = "S", value_parser = clap::value_parser!(u64).range(1..))]
    tdelay: Option<u64>,

    /// Only report system usage (no user sessions)
    #[arg(long)]
    system: bool,

    /// Only report user sessions
    #[arg(long, conflicts_with_all = ["system", "graphics", "sequential"])]
    user: bool,

    /// Draw usage graphs next to the samples
    #[arg(long)]
    graphics: bool,

    /// Print each round below the previous one instead of refreshing in place
    #[arg(long)]
    sequential: bool,

    /// Sample count and delay in seconds, in that order
    #[arg(
        value_name = "SAMPLES [TDELAY]",
        num_args = 0..=2,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    positional: Vec<u64>,
}

/// How successive rounds are laid out on the terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayMode {
    /// Redraw every round at a saved anchor.
    Refreshing,
    /// Append every round under an iteration header.
    Sequential,
}

/// Which metric sections take part in the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sections {
    All,
    /// Memory and CPU only.
    SystemOnly,
    UsersOnly,
}

impl Sections {
    pub fn memory(self) -> bool {
        self != Sections::UsersOnly
    }

    pub fn users(self) -> bool {
        self != Sections::SystemOnly
    }

    pub fn cpu(self) -> bool {
        self != Sections::UsersOnly
    }
}

/// Run configuration, built once and passed by reference to every component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub sample_count: usize,
    pub period: Duration,
    pub mode: DisplayMode,
    pub sections: Sections,
    pub graphics: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sample_count: DEFAULT_SAMPLES,
            period: Duration::from_secs(DEFAULT_PERIOD_SECS),
            mode: DisplayMode::Refreshing,
            sections: Sections::All,
            graphics: false,
        }
    }
}

impl Config {
    /// Parse a full argv (program name first).
    ///
    /// Help and version requests come back as the clap error so the caller
    /// can print them; every other parse failure is `InvalidArgument`.
    pub fn try_parse_from<I, T>(argv: I) -> Result<Self, ParseOutcome>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        match Args::try_parse_from(argv) {
            Ok(args) => Ok(Self::from(args)),
            Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
                Err(ParseOutcome::Info(e))
            }
            Err(e) => Err(ParseOutcome::Invalid(MonitorError::InvalidArgument(
                first_line(&e.to_string()),
            ))),
        }
    }

    pub fn period_secs(&self) -> u64 {
        self.period.as_secs()
    }
}

impl From<Args> for Config {
    fn from(args: Args) -> Self {
        let mut sample_count = args.samples.unwrap_or(DEFAULT_SAMPLES as u64);
        let mut period = args.tdelay.unwrap_or(DEFAULT_PERIOD_SECS);

        // Positional values win over the long flags.
        if let Some(&n) = args.positional.first() {
            sample_count = n;
        }
        if let Some(&s) = args.positional.get(1) {
            period = s;
        }

        let sections = if args.user {
            Sections::UsersOnly
        } else if args.system {
            Sections::SystemOnly
        } else {
            Sections::All
        };

        Self {
            sample_count: sample_count as usize,
            period: Duration::from_secs(period),
            mode: if args.sequential {
                DisplayMode::Sequential
            } else {
                DisplayMode::Refreshing
            },
            sections,
            graphics: args.graphics,
        }
    }
}

/// Why argument parsing did not produce a [`Config`].
#[derive(Debug)]
pub enum ParseOutcome {
    /// `--help` or `--version`; print it and exit successfully.
    Info(clap::Error),
    Invalid(MonitorError),
}

fn first_line(message: &str) -> String {
    let line = message.lines().next().unwrap_or(message);
    line.strip_prefix("error: ").unwrap_or(line).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Config, ParseOutcome> {
        Config::try_parse_from(std::iter::once("sysmon").chain(args.iter().copied()))
    }

    fn invalid(args: &[&str]) -> bool {
        matches!(
            parse(args),
            Err(ParseOutcome::Invalid(MonitorError::InvalidArgument(_)))
        )
    }

    #[test]
    fn test_defaults() {
        let config = parse(&[]).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.sample_count, 10);
        assert_eq!(config.period_secs(), 1);
    }

    #[test]
    fn test_long_flags() {
        let config = parse(&["--samples=5", "--tdelay=2", "--graphics", "--sequential"]).unwrap();
        assert_eq!(config.sample_count, 5);
        assert_eq!(config.period, Duration::from_secs(2));
        assert!(config.graphics);
        assert_eq!(config.mode, DisplayMode::Sequential);
        assert_eq!(config.sections, Sections::All);
    }

    #[test]
    fn test_positional_overrides() {
        let config = parse(&["--samples=5", "3", "4"]).unwrap();
        assert_eq!(config.sample_count, 3);
        assert_eq!(config.period_secs(), 4);

        let config = parse(&["7"]).unwrap();
        assert_eq!(config.sample_count, 7);
        assert_eq!(config.period_secs(), 1);
    }

    #[test]
    fn test_sections() {
        assert_eq!(parse(&["--system"]).unwrap().sections, Sections::SystemOnly);
        assert_eq!(parse(&["--user"]).unwrap().sections, Sections::UsersOnly);
        assert!(!Sections::UsersOnly.cpu());
        assert!(!Sections::SystemOnly.users());
        assert!(Sections::All.memory() && Sections::All.users() && Sections::All.cpu());
    }

    #[test]
    fn test_user_conflicts() {
        assert!(invalid(&["--user", "--system"]));
        assert!(invalid(&["--user", "--graphics"]));
        assert!(invalid(&["--user", "--sequential"]));
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(invalid(&["--samples=0"]));
        assert!(invalid(&["--tdelay=0"]));
        assert!(invalid(&["--tdelay=abc"]));
        assert!(invalid(&["1", "2", "3"]));
        assert!(invalid(&["0"]));
        assert!(invalid(&["--bogus"]));
        // Flags are long-only.
        assert!(invalid(&["-g", "3"]));
        assert!(invalid(&["words"]));
    }

    #[test]
    fn test_help_is_not_an_error() {
        assert!(matches!(parse(&["--help"]), Err(ParseOutcome::Info(_))));
    }
}
