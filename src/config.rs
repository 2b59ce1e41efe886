//! Authority configuration (§6.3), parsed by hand from `argv` with a direct
//! scan over `std::env::args()` rather than an argument-parsing crate (§10.3).

use std::time::{SystemTime, UNIX_EPOCH};

/// Parsed `-t -i -j -b -f` flags, with the documented defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub origin: i64,
    pub idle_time_us: u64,
    pub idle_jump: Option<i64>,
    pub busy_wait: u32,
    pub no_fork: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            origin: 0,
            idle_time_us: 50_000,
            idle_jump: None,
            busy_wait: 2,
            no_fork: false,
        }
    }
}

/// Either a fully parsed configuration, or a request to print usage and exit
/// cleanly (`-h`).
pub enum ParseOutcome {
    Run(Config),
    Help,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing argument for {0}")]
    MissingArgument(String),
    #[error("invalid value {1:?} for {0}")]
    InvalidValue(String, String),
    #[error("unrecognized option: {0}")]
    UnrecognizedOption(String),
}

/// Parse `timeserver`'s argv (without the program name).
pub fn parse_args(args: &[String]) -> Result<ParseOutcome, ConfigError> {
    let mut cfg = Config::default();
    let mut i = 0;
    while i < args.len() {
        let arg = &args[i];
        match arg.as_str() {
            "-h" => return Ok(ParseOutcome::Help),
            "-t" => {
                let v = next_value(args, &mut i, "-t")?;
                cfg.origin = if v == "now" {
                    SystemTime::now()
                        .duration_since(UNIX_EPOCH)
                        .map(|d| d.as_secs() as i64)
                        .unwrap_or(0)
                } else {
                    parse_i64(&v, "-t")?
                };
            }
            "-i" => {
                let v = next_value(args, &mut i, "-i")?;
                cfg.idle_time_us = parse_i64(&v, "-i")?.max(0) as u64;
            }
            "-j" => {
                let v = next_value(args, &mut i, "-j")?;
                cfg.idle_jump = Some(parse_i64(&v, "-j")?);
            }
            "-b" => {
                let v = next_value(args, &mut i, "-b")?;
                cfg.busy_wait = parse_i64(&v, "-b")?.max(0) as u32;
            }
            "-f" => cfg.no_fork = true,
            other => return Err(ConfigError::UnrecognizedOption(other.to_string())),
        }
        i += 1;
    }
    Ok(ParseOutcome::Run(cfg))
}

fn next_value(args: &[String], i: &mut usize, flag: &str) -> Result<String, ConfigError> {
    *i += 1;
    args.get(*i)
        .cloned()
        .ok_or_else(|| ConfigError::MissingArgument(flag.to_string()))
}

fn parse_i64(v: &str, flag: &str) -> Result<i64, ConfigError> {
    v.parse::<i64>()
        .map_err(|_| ConfigError::InvalidValue(flag.to_string(), v.to_string()))
}

pub const USAGE: &str = "\
usage: timeserver [-t origin|\"now\"] [-i microseconds] [-j seconds] [-b n] [-f] [-h]

  -t origin   starting time of the simulation in seconds since epoch, or \"now\"; default 0
  -i us       idle timeout before jumping the clock forward; default 50000
  -j sec      on idle timeout, advance by this many seconds instead of jumping to the next wakeup
  -b n        allow busy-wait nudging with probability 1/n per query; 0 disables; default 2
  -f          assume clients do not fork() or exec() other programs
  -h          show this message
";

#[cfg(test)]
mod tests {
    use super::*;

    fn args(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn defaults_match_the_documented_values() {
        let cfg = Config::default();
        assert_eq!(cfg.origin, 0);
        assert_eq!(cfg.idle_time_us, 50_000);
        assert_eq!(cfg.idle_jump, None);
        assert_eq!(cfg.busy_wait, 2);
        assert!(!cfg.no_fork);
    }

    #[test]
    fn parses_all_flags() {
        let outcome = parse_args(&args(&["-t", "1000", "-i", "10", "-j", "5", "-b", "0", "-f"])).unwrap();
        match outcome {
            ParseOutcome::Run(cfg) => {
                assert_eq!(cfg.origin, 1000);
                assert_eq!(cfg.idle_time_us, 10);
                assert_eq!(cfg.idle_jump, Some(5));
                assert_eq!(cfg.busy_wait, 0);
                assert!(cfg.no_fork);
            }
            ParseOutcome::Help => panic!("expected Run"),
        }
    }

    #[test]
    fn help_flag_short_circuits() {
        assert!(matches!(parse_args(&args(&["-h"])).unwrap(), ParseOutcome::Help));
    }

    #[test]
    fn now_resolves_to_a_positive_epoch_time() {
        match parse_args(&args(&["-t", "now"])).unwrap() {
            ParseOutcome::Run(cfg) => assert!(cfg.origin > 0),
            ParseOutcome::Help => panic!("expected Run"),
        }
    }

    #[test]
    fn unrecognized_option_is_an_error() {
        assert!(matches!(
            parse_args(&args(&["-z"])),
            Err(ConfigError::UnrecognizedOption(_))
        ));
    }

    #[test]
    fn missing_argument_is_an_error() {
        assert!(matches!(parse_args(&args(&["-t"])), Err(ConfigError::MissingArgument(_))));
    }
}
