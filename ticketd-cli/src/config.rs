use std::time::Duration;

use clap::{Args, ValueEnum};

use ticketd_core::liveness::LivenessMode;
use ticketd_core::reclaimer::DEFAULT_RECLAIM_INTERVAL;
use ticketd_core::table::{
    CorruptStatePolicy, DuplicateHolderPolicy, TableConfig, DEFAULT_CAPACITY,
};

pub const DEFAULT_PORT: u16 = 2020;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LivenessArg {
    /// Probe holder ids as local process ids
    Process,
    /// Treat every holder as alive (reclamation disabled)
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DuplicateArg {
    Allow,
    Reject,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CorruptArg {
    Continue,
    RefuseAcquire,
}

/// Options for `ticketd serve`. Fixed for the life of the process.
#[derive(Debug, Clone, Args)]
pub struct ServeArgs {
    /// UDP port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "TICKETD_PORT")]
    pub port: u16,

    /// Host to bind to
    #[arg(long, default_value = "0.0.0.0", env = "TICKETD_HOST")]
    pub host: String,

    /// Number of tickets in the pool
    #[arg(
        short,
        long,
        default_value_t = DEFAULT_CAPACITY as u16,
        env = "TICKETD_CAPACITY",
        value_parser = clap::value_parser!(u16).range(1..)
    )]
    pub capacity: u16,

    /// Seconds between reclaim sweeps
    #[arg(
        long,
        default_value_t = DEFAULT_RECLAIM_INTERVAL.as_secs(),
        env = "TICKETD_RECLAIM_SECS",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub reclaim_secs: u64,

    /// How to decide whether a holder is still alive
    #[arg(long, value_enum, default_value_t = LivenessArg::Process, env = "TICKETD_LIVENESS")]
    pub liveness: LivenessArg,

    /// Whether one holder may hold several tickets at once
    #[arg(
        long,
        value_enum,
        default_value_t = DuplicateArg::Allow,
        env = "TICKETD_DUPLICATE_HOLDERS"
    )]
    pub duplicate_holders: DuplicateArg,

    /// What to do after the lease table is found corrupt
    #[arg(long, value_enum, default_value_t = CorruptArg::Continue, env = "TICKETD_ON_CORRUPT")]
    pub on_corrupt: CorruptArg,

    /// Port for the HTTP admin endpoint (disabled when unset)
    #[arg(long, env = "TICKETD_ADMIN_PORT")]
    pub admin_port: Option<u16>,

    /// Bearer token required by the admin endpoint (open when unset)
    #[arg(long, env = "TICKETD_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ServeConfig {
    pub host: String,
    pub port: u16,
    pub admin_port: Option<u16>,
    pub api_key: Option<String>,
    pub reclaim_interval: Duration,
    pub liveness: LivenessMode,
    pub table: TableConfig,
}

impl From<ServeArgs> for ServeConfig {
    fn from(args: ServeArgs) -> Self {
        Self {
            host: args.host,
            port: args.port,
            admin_port: args.admin_port,
            api_key: args.api_key.filter(|key| !key.is_empty()),
            reclaim_interval: Duration::from_secs(args.reclaim_secs),
            liveness: match args.liveness {
                LivenessArg::Process => LivenessMode::Process,
                LivenessArg::None => LivenessMode::None,
            },
            table: TableConfig {
                capacity: usize::from(args.capacity),
                duplicate_holders: match args.duplicate_holders {
                    DuplicateArg::Allow => DuplicateHolderPolicy::Allow,
                    DuplicateArg::Reject => DuplicateHolderPolicy::Reject,
                },
                on_corrupt: match args.on_corrupt {
                    CorruptArg::Continue => CorruptStatePolicy::Continue,
                    CorruptArg::RefuseAcquire => CorruptStatePolicy::RefuseAcquire,
                },
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        serve: ServeArgs,
    }

    #[test]
    fn test_defaults() {
        let cli = TestCli::try_parse_from(["ticketd"]).unwrap();
        let config = ServeConfig::from(cli.serve);

        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.table.capacity, DEFAULT_CAPACITY);
        assert_eq!(config.reclaim_interval, DEFAULT_RECLAIM_INTERVAL);
        assert_eq!(config.liveness, LivenessMode::Process);
        assert_eq!(config.table.duplicate_holders, DuplicateHolderPolicy::Allow);
        assert_eq!(config.admin_port, None);
    }

    #[test]
    fn test_policies_from_flags() {
        let cli = TestCli::try_parse_from([
            "ticketd",
            "--capacity",
            "8",
            "--liveness",
            "none",
            "--duplicate-holders",
            "reject",
            "--on-corrupt",
            "refuse-acquire",
        ])
        .unwrap();
        let config = ServeConfig::from(cli.serve);

        assert_eq!(config.table.capacity, 8);
        assert_eq!(config.liveness, LivenessMode::None);
        assert_eq!(config.table.duplicate_holders, DuplicateHolderPolicy::Reject);
        assert_eq!(config.table.on_corrupt, CorruptStatePolicy::RefuseAcquire);
    }

    #[test]
    fn test_api_key_flag() {
        let cli = TestCli::try_parse_from(["ticketd", "--api-key", "s3cret"]).unwrap();
        assert_eq!(ServeConfig::from(cli.serve).api_key.as_deref(), Some("s3cret"));

        let cli = TestCli::try_parse_from(["ticketd", "--api-key", ""]).unwrap();
        assert_eq!(ServeConfig::from(cli.serve).api_key, None);
    }

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(TestCli::try_parse_from(["ticketd", "--capacity", "0"]).is_err());
    }
}
