//! Node configuration.
//!
//! Settings come from a line-oriented file and from command-line flags,
//! flags taking precedence:
//!
//! ```text
//! 127.0.0.1:6001      # next hop
//! Alice               # nickname
//! 3                   # token hold, seconds
//! true                # generator
//! 15                  # max wait for the token, seconds (optional)
//! ```
//!
//! Blank lines are skipped and `#` starts a comment.

use std::{
    fs, io,
    net::{SocketAddr, ToSocketAddrs},
    path::{Path, PathBuf},
    time::Duration,
};

use clap::Parser;
use ringnet_core::{NodeConfig, NodeIdentity};
use ringnet_proto::validate_nickname;
use thiserror::Error;

/// Configuration errors. All of them abort startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read.
    #[error("cannot read {path}: {source}")]
    Read {
        /// File path
        path: PathBuf,
        /// Underlying I/O error
        source: io::Error,
    },

    /// A required line is absent from the config file.
    #[error("config file is missing line {line} ({name})")]
    MissingLine {
        /// 1-based line number, counting only non-blank lines
        line: usize,
        /// What the line holds
        name: &'static str,
    },

    /// Neither the file nor the flags supplied a required setting.
    #[error("no {0} given (use --config or --{0})")]
    Missing(&'static str),

    /// A value did not parse.
    #[error("invalid {name}: {value:?}")]
    InvalidValue {
        /// Setting name
        name: &'static str,
        /// Offending text
        value: String,
    },

    /// Next hop did not resolve to an address.
    #[error("cannot resolve next hop {value:?}: {source}")]
    Resolve {
        /// Host and port as given
        value: String,
        /// Resolver error
        source: io::Error,
    },

    /// Nickname cannot be carried on the wire.
    #[error("invalid nickname {0:?}: must be non-empty without ':', ';' or whitespace")]
    InvalidNickname(String),
}

/// Command-line arguments.
#[derive(Debug, Clone, Parser)]
#[command(name = "ringnet-node", version, about = "Token ring node over UDP")]
pub struct Args {
    /// Line-oriented config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Local address to bind
    #[arg(short, long, default_value = "127.0.0.1:6000")]
    pub listen: SocketAddr,

    /// Next hop `host:port` (overrides the file)
    #[arg(long)]
    pub next_hop: Option<String>,

    /// Nickname (overrides the file)
    #[arg(long)]
    pub nickname: Option<String>,

    /// Seconds to wait for a sent message before releasing the token
    #[arg(long)]
    pub token_hold: Option<u64>,

    /// Generate and regenerate the token
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    pub generator: Option<bool>,

    /// Seconds without circulation before the generator regenerates
    #[arg(long)]
    pub max_token_wait: Option<u64>,

    /// Probability of corrupting a fresh send (0.0 to 1.0)
    #[arg(long)]
    pub corruption: Option<f64>,

    /// Minimum spacing between accepted tokens, milliseconds
    #[arg(long)]
    pub min_token_interval_ms: Option<u64>,

    /// Manager poll interval, milliseconds
    #[arg(long, default_value_t = 100)]
    pub poll_interval_ms: u64,

    /// Generator settle delay before the first token, milliseconds
    #[arg(long)]
    pub startup_delay_ms: Option<u64>,

    /// Outbound queue depth
    #[arg(long)]
    pub queue_capacity: Option<usize>,

    /// Sends per message before a NACK drops it
    #[arg(long)]
    pub max_attempts: Option<u32>,

    /// Do not learn unknown senders from data frames
    #[arg(long)]
    pub no_learn_from_data: bool,

    /// Run without the interactive console
    #[arg(long)]
    pub no_console: bool,
}

/// Contents of the config file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileConfig {
    /// Next hop as written (`host:port`)
    pub next_hop: String,
    /// Nickname
    pub nickname: String,
    /// Token hold duration
    pub token_hold: Duration,
    /// Generator flag
    pub generator: bool,
    /// Max wait for the token, when given
    pub max_token_wait: Option<Duration>,
}

impl FileConfig {
    /// Read and parse a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
        Self::parse(&text)
    }

    /// Parse config file text.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let mut lines = text
            .lines()
            .map(|line| line.split_once('#').map_or(line, |(value, _)| value).trim())
            .filter(|line| !line.is_empty());

        let mut required = |line: usize, name: &'static str| {
            lines.next().map(str::to_string).ok_or(ConfigError::MissingLine { line, name })
        };

        let next_hop = required(1, "next hop")?;
        let nickname = required(2, "nickname")?;
        let token_hold = parse_seconds("token hold", &required(3, "token hold")?)?;
        let generator = parse_bool(&required(4, "generator flag")?)?;
        let max_token_wait =
            lines.next().map(|value| parse_seconds("max token wait", value)).transpose()?;

        Ok(Self { next_hop, nickname, token_hold, generator, max_token_wait })
    }
}

/// Fully resolved settings for one node.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Node identity
    pub identity: NodeIdentity,
    /// Engine tuning
    pub node: NodeConfig,
    /// Manager poll interval
    pub poll_interval: Duration,
    /// Whether to run the console
    pub console: bool,
}

impl Settings {
    /// Merge the config file (if any) with command-line overrides.
    pub fn resolve(args: &Args) -> Result<Self, ConfigError> {
        let file = args.config.as_deref().map(FileConfig::load).transpose()?;

        let next_hop = args
            .next_hop
            .clone()
            .or_else(|| file.as_ref().map(|file| file.next_hop.clone()))
            .ok_or(ConfigError::Missing("next-hop"))?;
        let nickname = args
            .nickname
            .clone()
            .or_else(|| file.as_ref().map(|file| file.nickname.clone()))
            .ok_or(ConfigError::Missing("nickname"))?;
        validate_nickname(&nickname).map_err(|_| ConfigError::InvalidNickname(nickname.clone()))?;

        let generator =
            args.generator.or_else(|| file.as_ref().map(|file| file.generator)).unwrap_or(false);

        let mut node = NodeConfig::default();
        if let Some(hold) = args
            .token_hold
            .map(Duration::from_secs)
            .or_else(|| file.as_ref().map(|file| file.token_hold))
        {
            node.token_hold = hold;
        }
        if let Some(wait) = args
            .max_token_wait
            .map(Duration::from_secs)
            .or_else(|| file.as_ref().and_then(|file| file.max_token_wait))
        {
            node.max_token_wait = wait;
        }
        if let Some(probability) = args.corruption {
            if !(0.0..=1.0).contains(&probability) {
                return Err(ConfigError::InvalidValue {
                    name: "corruption",
                    value: probability.to_string(),
                });
            }
            node.corruption_probability = probability;
        }
        if let Some(ms) = args.min_token_interval_ms {
            node.min_token_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = args.startup_delay_ms {
            node.startup_delay = Duration::from_millis(ms);
        }
        if let Some(capacity) = args.queue_capacity {
            node.queue_capacity = capacity;
        }
        if let Some(attempts) = args.max_attempts {
            if attempts == 0 {
                return Err(ConfigError::InvalidValue {
                    name: "max attempts",
                    value: attempts.to_string(),
                });
            }
            node.max_attempts = attempts;
        }
        node.learn_from_data = !args.no_learn_from_data;

        Ok(Self {
            identity: NodeIdentity {
                nickname,
                local: args.listen,
                next_hop: resolve_host(&next_hop)?,
                generator,
            },
            node,
            poll_interval: Duration::from_millis(args.poll_interval_ms.max(1)),
            console: !args.no_console,
        })
    }
}

fn resolve_host(value: &str) -> Result<SocketAddr, ConfigError> {
    let mut addrs = value
        .to_socket_addrs()
        .map_err(|source| ConfigError::Resolve { value: value.to_string(), source })?;
    addrs.next().ok_or_else(|| ConfigError::Resolve {
        value: value.to_string(),
        source: io::Error::new(io::ErrorKind::NotFound, "no addresses"),
    })
}

fn parse_seconds(name: &'static str, value: &str) -> Result<Duration, ConfigError> {
    value
        .parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|_| ConfigError::InvalidValue { name, value: value.to_string() })
}

fn parse_bool(value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(ConfigError::InvalidValue { name: "generator flag", value: value.to_string() }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_minimal_file() {
        let config = FileConfig::parse("127.0.0.1:6001\nAlice\n3\ntrue\n").unwrap();
        assert_eq!(config.next_hop, "127.0.0.1:6001");
        assert_eq!(config.nickname, "Alice");
        assert_eq!(config.token_hold, Duration::from_secs(3));
        assert!(config.generator);
        assert_eq!(config.max_token_wait, None);
    }

    #[test]
    fn parse_with_comments_and_max_wait() {
        let text = "# ring\n127.0.0.1:6001  # next\n\nBob\n1\nFalse\n10\n";
        let config = FileConfig::parse(text).unwrap();
        assert_eq!(config.nickname, "Bob");
        assert!(!config.generator);
        assert_eq!(config.max_token_wait, Some(Duration::from_secs(10)));
    }

    #[test]
    fn parse_reports_missing_line() {
        let err = FileConfig::parse("127.0.0.1:6001\nAlice\n").unwrap_err();
        assert!(matches!(err, ConfigError::MissingLine { line: 3, .. }));
    }

    #[test]
    fn parse_rejects_bad_values() {
        assert!(matches!(
            FileConfig::parse("127.0.0.1:6001\nAlice\nsoon\ntrue\n"),
            Err(ConfigError::InvalidValue { name: "token hold", .. })
        ));
        assert!(matches!(
            FileConfig::parse("127.0.0.1:6001\nAlice\n3\nyes\n"),
            Err(ConfigError::InvalidValue { name: "generator flag", .. })
        ));
    }

    #[test]
    fn flags_alone_are_enough() {
        let args = Args::parse_from([
            "ringnet-node",
            "--listen",
            "127.0.0.1:7000",
            "--next-hop",
            "127.0.0.1:7001",
            "--nickname",
            "Carol",
            "--generator",
            "--corruption",
            "0.5",
        ]);
        let settings = Settings::resolve(&args).unwrap();
        assert_eq!(settings.identity.nickname, "Carol");
        assert_eq!(settings.identity.next_hop, SocketAddr::from(([127, 0, 0, 1], 7001)));
        assert!(settings.identity.generator);
        assert!((settings.node.corruption_probability - 0.5).abs() < f64::EPSILON);
        assert!(settings.console);
    }

    #[test]
    fn missing_identity_is_an_error() {
        let args = Args::parse_from(["ringnet-node", "--nickname", "Carol"]);
        assert!(matches!(Settings::resolve(&args), Err(ConfigError::Missing("next-hop"))));
    }

    #[test]
    fn rejects_unusable_nickname() {
        let args =
            Args::parse_from(["ringnet-node", "--next-hop", "127.0.0.1:7001", "--nickname", "a;b"]);
        assert!(matches!(Settings::resolve(&args), Err(ConfigError::InvalidNickname(_))));
    }

    #[test]
    fn rejects_out_of_range_corruption() {
        let args = Args::parse_from([
            "ringnet-node",
            "--next-hop",
            "127.0.0.1:7001",
            "--nickname",
            "Carol",
            "--corruption",
            "1.5",
        ]);
        assert!(matches!(
            Settings::resolve(&args),
            Err(ConfigError::InvalidValue { name: "corruption", .. })
        ));
    }
}
