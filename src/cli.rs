//! Command-line interface for session-relay.
//!
//! Uses lexopt for minimal binary size overhead.

use std::ffi::OsString;
use std::net::IpAddr;
use std::path::PathBuf;

/// Command-line arguments.
#[derive(Debug, Clone, Default)]
pub struct Args {
    /// Host address to bind to.
    pub host: Option<IpAddr>,
    /// Port to listen on.
    pub port: Option<u16>,
    /// Path to configuration file.
    pub config: Option<PathBuf>,
    /// Token signing secret (overrides config file).
    pub secret: Option<String>,
    /// Fixed session lifetime in seconds.
    pub session_ttl: Option<u64>,
    /// Token lifetime in seconds.
    pub token_ttl: Option<u64>,
    /// Log level (error, warn, info, debug, trace).
    pub log_level: Option<String>,
    /// Show version and exit.
    pub version: bool,
    /// Show help and exit.
    pub help: bool,
}

/// Parse command-line arguments.
pub fn parse_args() -> Result<Args, ArgsError> {
    parse_args_from(std::env::args_os())
}

/// Parse arguments from an iterator (for testing).
pub fn parse_args_from<I>(args: I) -> Result<Args, ArgsError>
where
    I: IntoIterator<Item = OsString>,
{
    use lexopt::prelude::*;

    let mut result = Args::default();
    let mut parser = lexopt::Parser::from_iter(args);

    while let Some(arg) = parser.next()? {
        match arg {
            Short('h') | Long("help") => {
                result.help = true;
            }
            Short('V') | Long("version") => {
                result.version = true;
            }
            Short('H') | Long("host") => {
                let value: String = parser.value()?.parse()?;
                result.host = Some(
                    value
                        .parse()
                        .map_err(|_| ArgsError::InvalidValue("host", value))?,
                );
            }
            Short('p') | Long("port") => {
                let value: String = parser.value()?.parse()?;
                result.port = Some(
                    value
                        .parse()
                        .map_err(|_| ArgsError::InvalidValue("port", value))?,
                );
            }
            Short('c') | Long("config") => {
                result.config = Some(parser.value()?.parse()?);
            }
            Short('s') | Long("secret") => {
                result.secret = Some(parser.value()?.parse()?);
            }
            Long("session-ttl") => {
                let value: String = parser.value()?.parse()?;
                result.session_ttl = Some(
                    value
                        .parse()
                        .map_err(|_| ArgsError::InvalidValue("session-ttl", value))?,
                );
            }
            Long("token-ttl") => {
                let value: String = parser.value()?.parse()?;
                result.token_ttl = Some(
                    value
                        .parse()
                        .map_err(|_| ArgsError::InvalidValue("token-ttl", value))?,
                );
            }
            Short('l') | Long("log-level") => {
                result.log_level = Some(parser.value()?.parse()?);
            }
            Value(val) => {
                return Err(ArgsError::UnexpectedArgument(val.to_string_lossy().into()));
            }
            _ => return Err(arg.unexpected().into()),
        }
    }

    Ok(result)
}

/// Print help message.
pub fn print_help() {
    let version = env!("CARGO_PKG_VERSION");
    println!(
        r#"session-relay {version}
WebSocket message server with token-resumable sessions

USAGE:
    session-relay [OPTIONS]

OPTIONS:
    -H, --host <ADDR>        Host address to bind [default: 127.0.0.1]
    -p, --port <PORT>        Port to listen on [default: 8080]
    -c, --config <FILE>      Path to JSON configuration file
    -s, --secret <SECRET>    Token signing secret
        --session-ttl <SECS> Fixed session lifetime [default: 300]
        --token-ttl <SECS>   Token lifetime [default: 3600]
    -l, --log-level <LEVEL>  Log level: error, warn, info, debug, trace
    -V, --version            Print version
    -h, --help               Print help

ENVIRONMENT:
    SESSION_RELAY_HOST       Host address
    SESSION_RELAY_PORT       Port
    SESSION_RELAY_SECRET     Token signing secret
    SESSION_RELAY_LOG_LEVEL  Log level (RUST_LOG also honored)
"#
    );
}

/// Print version.
pub fn print_version() {
    println!("session-relay {}", env!("CARGO_PKG_VERSION"));
}

/// Argument parsing errors.
#[derive(Debug)]
pub enum ArgsError {
    /// Underlying parser error.
    Parse(lexopt::Error),
    /// A flag value failed to parse.
    InvalidValue(&'static str, String),
    /// A positional argument was given.
    UnexpectedArgument(String),
}

impl From<lexopt::Error> for ArgsError {
    fn from(e: lexopt::Error) -> Self {
        Self::Parse(e)
    }
}

impl std::fmt::Display for ArgsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parse(e) => write!(f, "{}", e),
            Self::InvalidValue(flag, value) => {
                write!(f, "invalid value for --{}: {}", flag, value)
            }
            Self::UnexpectedArgument(arg) => write!(f, "unexpected argument: {}", arg),
        }
    }
}

impl std::error::Error for ArgsError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Args, ArgsError> {
        let mut full = vec![OsString::from("session-relay")];
        full.extend(args.iter().map(OsString::from));
        parse_args_from(full)
    }

    #[test]
    fn test_no_args() {
        let args = parse(&[]).unwrap();
        assert!(args.host.is_none());
        assert!(args.port.is_none());
        assert!(!args.help);
        assert!(!args.version);
    }

    #[test]
    fn test_host_and_port() {
        let args = parse(&["--host", "0.0.0.0", "-p", "9000"]).unwrap();
        assert_eq!(args.host, Some("0.0.0.0".parse().unwrap()));
        assert_eq!(args.port, Some(9000));
    }

    #[test]
    fn test_invalid_host() {
        assert!(matches!(
            parse(&["--host", "nope"]),
            Err(ArgsError::InvalidValue("host", _))
        ));
    }

    #[test]
    fn test_invalid_port() {
        assert!(matches!(
            parse(&["--port", "99999"]),
            Err(ArgsError::InvalidValue("port", _))
        ));
    }

    #[test]
    fn test_secret_and_ttls() {
        let args = parse(&["-s", "hunter2", "--session-ttl", "60", "--token-ttl", "120"]).unwrap();
        assert_eq!(args.secret.as_deref(), Some("hunter2"));
        assert_eq!(args.session_ttl, Some(60));
        assert_eq!(args.token_ttl, Some(120));
    }

    #[test]
    fn test_help_and_version_flags() {
        assert!(parse(&["--help"]).unwrap().help);
        assert!(parse(&["-V"]).unwrap().version);
    }

    #[test]
    fn test_unexpected_positional() {
        assert!(matches!(
            parse(&["stray"]),
            Err(ArgsError::UnexpectedArgument(_))
        ));
    }

    #[test]
    fn test_unknown_flag() {
        assert!(matches!(parse(&["--bogus"]), Err(ArgsError::Parse(_))));
    }
}
