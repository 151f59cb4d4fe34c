//! Subcommand implementations.

use miette::{IntoDiagnostic, Result, miette};
use serde::Serialize;
use shebe_platform::{asset_name, supported_platforms};
use shebe_resolver::{
    Acquired, Acquirer, GithubReleaseStore, LaunchCommand, McpProbe, ReleaseStore,
    ReleaseVersion, audit, detect_platform, verify_version,
};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::cli::{Commands, StoreArgs};

pub async fn execute(command: Commands) -> Result<()> {
    match command {
        Commands::Fetch { store, json } => {
            let acquired = acquire(&store).await?;
            if json {
                emit_json(&acquired)
            } else {
                emit(&acquired.binary.path.display().to_string())
            }
        }
        Commands::AssetName {
            version,
            platform,
            all,
        } => asset_names(&version, platform, all),
        Commands::Command { store } => {
            let acquired = acquire(&store).await?;
            emit_json(&acquired.launch_command())
        }
        Commands::Check { store } => check(&store).await,
        Commands::Probe { path, store } => probe(path, &store).await,
    }
}

async fn acquire(args: &StoreArgs) -> Result<Acquired> {
    let mut acquirer = Acquirer::new(args.config()?)?;
    if let Some(platform) = args.platform {
        acquirer = acquirer.with_platform(platform);
    }
    debug!(platform = %acquirer.platform(), cache = ?acquirer.cache().root(), "Acquiring");
    Ok(acquirer.acquire().await?)
}

fn asset_names(version: &str, platform: Option<shebe_platform::Platform>, all: bool) -> Result<()> {
    let version = ReleaseVersion::parse(version).map_err(shebe_resolver::Error::from)?;
    if all {
        for platform in supported_platforms() {
            let name = asset_name(&version, &platform).map_err(shebe_resolver::Error::from)?;
            emit(&format!("{platform}\t{name}"))?;
        }
        return Ok(());
    }
    let platform = platform.unwrap_or_else(detect_platform);
    let name = asset_name(&version, &platform).map_err(shebe_resolver::Error::from)?;
    emit(name.as_str())
}

async fn check(args: &StoreArgs) -> Result<()> {
    let config = args.config()?;
    let store = GithubReleaseStore::new(&config)?;
    let release = store.release(&config.version).await?;
    let report = audit(&release);
    emit_json(&report)?;

    if report.is_conformant() {
        info!(tag = %report.tag, "Release matches the expected layout");
        Ok(())
    } else {
        Err(miette!(
            code = "shebe::cli::nonconformant_release",
            help = "Fix the release assets or update the naming rules before publishing",
            "Release {} does not match the expected asset layout",
            report.tag
        ))
    }
}

#[derive(Serialize)]
struct ProbeReport<'a> {
    path: &'a Path,
    server: &'a shebe_resolver::ServerInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    version: Option<String>,
}

async fn probe(path: Option<PathBuf>, args: &StoreArgs) -> Result<()> {
    let (path, expected) = match path {
        Some(path) => (LaunchCommand::for_path(&path).command, None),
        None => {
            let acquired = acquire(args).await?;
            (acquired.binary.path, Some(acquired.binary.version))
        }
    };

    let probe = McpProbe::spawn(&path).await?;
    let version = match &expected {
        Some(version) => Some(verify_version(&path, version).await?),
        None => None,
    };

    emit_json(&ProbeReport {
        path: &path,
        server: probe.server_info(),
        version,
    })
}

fn emit(line: &str) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{line}").into_diagnostic()
}

fn emit_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).into_diagnostic()?;
    emit(&json)
}
