//! Zed extension that launches the shebe-mcp context server.
//!
//! The binary is fetched from the latest GitHub release into the extension's
//! working directory and reused until a newer release appears.

use shebe_platform::{
    Arch, BINARY_NAME, NamingConvention, Os, Platform, ReleaseVersion, asset_name_with,
    ensure_supported,
};
use std::fs;
use zed_extension_api::{self as zed, Command, ContextServerId, Project, Result};

const REPO: &str = "rhobimd-oss/shebe";
const CONTEXT_SERVER_ID: &str = "shebe";
const VERSION_DIR_PREFIX: &str = "shebe-";

struct ShebeExtension {
    cached_binary_path: Option<String>,
}

impl ShebeExtension {
    fn binary_path(&mut self) -> Result<String> {
        if let Some(path) = &self.cached_binary_path
            && fs::metadata(path).is_ok_and(|meta| meta.is_file())
        {
            return Ok(path.clone());
        }

        let platform = host_platform();
        ensure_supported(&platform).map_err(|e| e.to_string())?;

        let release = zed::latest_github_release(
            REPO,
            zed::GithubReleaseOptions {
                require_assets: true,
                pre_release: false,
            },
        )?;
        let version = ReleaseVersion::parse(&release.version).map_err(|e| e.to_string())?;

        let version_dir = format!("{VERSION_DIR_PREFIX}{version}");
        let binary_path = format!("{version_dir}/{BINARY_NAME}");

        if !fs::metadata(&binary_path).is_ok_and(|meta| meta.is_file()) {
            let asset = select_asset(&release, &version, &platform)?;
            zed::download_file(
                &asset.download_url,
                &version_dir,
                zed::DownloadedFileType::GzipTar,
            )
            .map_err(|e| format!("failed to download {}: {e}", asset.name))?;
            zed::make_file_executable(&binary_path)?;
            if !fs::metadata(&binary_path).is_ok_and(|meta| meta.is_file()) {
                return Err(format!("{} did not contain {BINARY_NAME}", asset.name));
            }
            remove_stale_versions(&version_dir);
        }

        self.cached_binary_path = Some(binary_path.clone());
        Ok(binary_path)
    }
}

/// The release asset for `platform`, preferring the default naming scheme.
fn select_asset<'a>(
    release: &'a zed::GithubRelease,
    version: &ReleaseVersion,
    platform: &Platform,
) -> Result<&'a zed::GithubReleaseAsset> {
    let find = |convention: &NamingConvention| -> Option<&'a zed::GithubReleaseAsset> {
        let name = asset_name_with(convention, version, platform).ok()?;
        release.assets.iter().find(|asset| asset.name == name.as_str())
    };

    if let Some(asset) = find(&NamingConvention::DEFAULT) {
        return Ok(asset);
    }

    let mut matches: Vec<&zed::GithubReleaseAsset> = NamingConvention::candidates()
        .iter()
        .filter_map(&find)
        .collect();
    matches.dedup_by(|a, b| a.name == b.name);

    match matches.as_slice() {
        [asset] => Ok(*asset),
        _ => {
            let available: Vec<&str> = release.assets.iter().map(|a| a.name.as_str()).collect();
            Err(format!(
                "no shebe-mcp asset for {platform} in release {version}; available: {}",
                available.join(", ")
            ))
        }
    }
}

fn host_platform() -> Platform {
    let (os, arch) = zed::current_platform();
    let os = match os {
        zed::Os::Mac => Os::MacOs,
        zed::Os::Linux => Os::Linux,
        zed::Os::Windows => Os::Windows,
    };
    let arch = match arch {
        zed::Architecture::Aarch64 => Arch::Arm64,
        zed::Architecture::X8664 => Arch::X86_64,
        zed::Architecture::X86 => Arch::X86,
    };
    Platform::new(os, arch)
}

fn remove_stale_versions(keep: &str) {
    let Ok(entries) = fs::read_dir(".") else {
        return;
    };
    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if name.starts_with(VERSION_DIR_PREFIX) && name != keep {
            fs::remove_dir_all(entry.path()).ok();
        }
    }
}

impl zed::Extension for ShebeExtension {
    fn new() -> Self {
        Self {
            cached_binary_path: None,
        }
    }

    fn context_server_command(
        &mut self,
        context_server_id: &ContextServerId,
        _project: &Project,
    ) -> Result<Command> {
        if context_server_id.as_ref() != CONTEXT_SERVER_ID {
            return Err(format!("unknown context server '{}'", context_server_id.as_ref()));
        }

        let relative = self.binary_path()?;
        let command = std::env::current_dir()
            .map_err(|e| format!("failed to resolve extension directory: {e}"))?
            .join(relative)
            .to_string_lossy()
            .into_owned();

        Ok(Command {
            command,
            args: Vec::new(),
            env: Vec::new(),
        })
    }
}

zed::register_extension!(ShebeExtension);
