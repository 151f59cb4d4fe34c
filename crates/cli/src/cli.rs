use clap::{Args, Parser, Subcommand};
use shebe_resolver::{Platform, ResolverConfig, VersionRequest};
use std::path::PathBuf;
use std::time::Duration;

use crate::tracing::{LogLevel, TracingFormat};

#[derive(Parser, Debug)]
#[command(name = "shebe-resolve")]
#[command(about = "Resolve, download and cache the shebe-mcp server binary")]
#[command(long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(
        short = 'l',
        long,
        global = true,
        help = "Set logging level",
        default_value = "warn",
        value_enum
    )]
    pub level: LogLevel,

    #[arg(
        long,
        global = true,
        help = "Log output format",
        default_value = "compact",
        value_enum
    )]
    pub log_format: TracingFormat,
}

/// Release store and cache options shared by the networked commands.
#[derive(Args, Debug, Clone, Default)]
pub struct StoreArgs {
    #[arg(long, help = "Repository publishing releases (owner/name)")]
    pub repo: Option<String>,

    #[arg(long = "api", help = "Release API base URL")]
    pub api_base: Option<String>,

    #[arg(long, help = "Cache directory for downloaded binaries")]
    pub cache_dir: Option<PathBuf>,

    #[arg(long, help = "Release to use: 'latest' or a tag such as v0.5.3")]
    pub release: Option<String>,

    #[arg(long, help = "Give up after this many seconds")]
    pub timeout: Option<u64>,

    #[arg(long, help = "Target platform, e.g. darwin-arm64 (defaults to the host)")]
    pub platform: Option<Platform>,
}

impl StoreArgs {
    /// Layer the flags over configuration read from the environment.
    pub fn config(&self) -> shebe_resolver::Result<ResolverConfig> {
        let mut config = ResolverConfig::from_env()?;
        if let Some(repo) = &self.repo {
            config = config.with_repo(repo.clone())?;
        }
        if let Some(api) = &self.api_base {
            config = config.with_api_base(api.clone());
        }
        if let Some(dir) = &self.cache_dir {
            config = config.with_cache_dir(dir.clone());
        }
        if let Some(release) = &self.release {
            config = config.with_version(VersionRequest::parse(release)?);
        }
        if let Some(secs) = self.timeout {
            config = config.with_timeout(Duration::from_secs(secs));
        }
        Ok(config)
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(about = "Download (if needed) and print the path of shebe-mcp")]
    Fetch {
        #[command(flatten)]
        store: StoreArgs,
        #[arg(long, help = "Print the full acquisition record as JSON")]
        json: bool,
    },
    #[command(about = "Print the release asset name for a version and platform")]
    AssetName {
        #[arg(help = "Release tag, e.g. v0.5.3")]
        version: String,
        #[arg(long, help = "Target platform (defaults to the host)")]
        platform: Option<Platform>,
        #[arg(long, help = "List the asset of every supported platform", conflicts_with = "platform")]
        all: bool,
    },
    #[command(about = "Acquire shebe-mcp and print its launch command as JSON")]
    Command {
        #[command(flatten)]
        store: StoreArgs,
    },
    #[command(about = "Audit a release against the expected asset layout")]
    Check {
        #[command(flatten)]
        store: StoreArgs,
    },
    #[command(about = "Run the MCP handshake against a binary")]
    Probe {
        #[arg(help = "Binary to probe; acquired first when omitted")]
        path: Option<PathBuf>,
        #[command(flatten)]
        store: StoreArgs,
    },
}

pub fn parse() -> Cli {
    Cli::parse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use shebe_resolver::ReleaseVersion;

    #[test]
    fn test_cli_default_values() {
        let cli = Cli::try_parse_from(["shebe-resolve", "fetch"]).unwrap();
        assert_eq!(cli.level, LogLevel::Warn);
        assert_eq!(cli.log_format, TracingFormat::Compact);
        assert!(matches!(cli.command, Commands::Fetch { json: false, .. }));
    }

    #[test]
    fn test_asset_name_arguments() {
        let cli = Cli::try_parse_from([
            "shebe-resolve",
            "asset-name",
            "v0.5.3",
            "--platform",
            "linux-x86_64",
        ])
        .unwrap();
        match cli.command {
            Commands::AssetName {
                version,
                platform,
                all,
            } => {
                assert_eq!(version, "v0.5.3");
                assert_eq!(platform.unwrap().to_string(), "linux-x86_64");
                assert!(!all);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_all_conflicts_with_platform() {
        assert!(
            Cli::try_parse_from([
                "shebe-resolve",
                "asset-name",
                "v0.5.3",
                "--all",
                "--platform",
                "darwin-arm64",
            ])
            .is_err()
        );
    }

    #[test]
    fn test_invalid_platform_is_a_usage_error() {
        assert!(
            Cli::try_parse_from(["shebe-resolve", "fetch", "--platform", "plan9-mips"]).is_err()
        );
    }

    #[test]
    fn test_store_args_layer_over_defaults() {
        let cli = Cli::try_parse_from([
            "shebe-resolve",
            "fetch",
            "--release",
            "v0.5.3",
            "--cache-dir",
            "/tmp/shebe-test",
            "--timeout",
            "5",
        ])
        .unwrap();
        let Commands::Fetch { store, .. } = cli.command else {
            panic!("expected fetch");
        };
        let config = store.config().unwrap();
        assert_eq!(
            config.version,
            VersionRequest::Pinned(ReleaseVersion::parse("v0.5.3").unwrap())
        );
        assert_eq!(config.cache_dir(), PathBuf::from("/tmp/shebe-test"));
        assert_eq!(config.timeout, Some(Duration::from_secs(5)));
    }
}
