//! Live checks against the published shebe releases.
//!
//! These talk to the real GitHub Releases API and download real archives, so
//! they are ignored by default. Run with:
//!
//! ```text
//! cargo test -p shebe-resolver --test github_release -- --ignored
//! ```
//!
//! Set `GITHUB_TOKEN` to avoid the anonymous rate limit. Asset names are
//! derived here independently of `shebe-platform` so that a change to the
//! naming code cannot silently agree with itself.

use futures::StreamExt;
use shebe_resolver::{
    Acquirer, Error, GithubReleaseStore, McpProbe, Release, ReleaseStore, ResolverConfig,
    VersionRequest, audit, detect_platform,
};
use tokio::sync::OnceCell;

static LATEST: OnceCell<Release> = OnceCell::const_new();

/// Published platforms as (os, arch) in asset spelling.
const PUBLISHED: &[(&str, &str)] = &[("darwin", "aarch64"), ("darwin", "x86_64"), ("linux", "x86_64")];

fn live_config() -> ResolverConfig {
    ResolverConfig::from_env().unwrap()
}

/// One API call shared by every test in this file.
async fn latest() -> Release {
    LATEST
        .get_or_init(|| async {
            let store = GithubReleaseStore::new(&live_config()).unwrap();
            store.release(&VersionRequest::Latest).await.unwrap()
        })
        .await
        .clone()
}

fn expected_asset_name(tag: &str, os: &str, arch: &str) -> String {
    let suffix = if os == "linux" { "-musl" } else { "" };
    format!("shebe-{tag}-{os}-{arch}{suffix}.tar.gz")
}

fn host_asset_spelling() -> Option<(&'static str, &'static str)> {
    let os = if cfg!(target_os = "macos") {
        "darwin"
    } else if cfg!(target_os = "linux") {
        "linux"
    } else {
        return None;
    };
    let arch = if cfg!(target_arch = "aarch64") {
        "aarch64"
    } else if cfg!(target_arch = "x86_64") {
        "x86_64"
    } else {
        return None;
    };
    PUBLISHED.contains(&(os, arch)).then_some((os, arch))
}

async fn download(release: &Release, name: &str) -> Vec<u8> {
    let asset = release
        .asset(name)
        .unwrap_or_else(|| panic!("asset '{name}' not in {:?}", release.asset_names()));
    let store = GithubReleaseStore::new(&live_config()).unwrap();
    let stream = store.open_asset(asset).await.unwrap();
    let mut body = stream.response.bytes_stream();
    let mut bytes = Vec::new();
    while let Some(chunk) = body.next().await {
        bytes.extend_from_slice(&chunk.unwrap());
    }
    bytes
}

#[tokio::test]
#[ignore]
async fn latest_release_has_assets() {
    let release = latest().await;
    assert!(!release.assets.is_empty(), "{} has no assets", release.tag_name);
}

#[tokio::test]
#[ignore]
async fn latest_tag_is_a_release_version() {
    let release = latest().await;
    let tag = &release.tag_name;
    let parts: Vec<&str> = tag
        .strip_prefix('v')
        .unwrap_or_else(|| panic!("tag '{tag}' does not start with 'v'"))
        .split('.')
        .collect();
    assert!(
        parts.len() == 3 && parts.iter().all(|p| p.parse::<u32>().is_ok()),
        "tag '{tag}' is not v<MAJOR>.<MINOR>.<PATCH>"
    );
    assert!(release.version().is_ok());
}

#[tokio::test]
#[ignore]
async fn every_published_platform_has_its_asset() {
    let release = latest().await;
    for (os, arch) in PUBLISHED {
        let name = expected_asset_name(&release.tag_name, os, arch);
        assert!(
            release.asset(&name).is_some(),
            "expected '{name}'; available: {:?}",
            release.asset_names()
        );
    }
}

#[tokio::test]
#[ignore]
async fn release_passes_the_conformance_audit() {
    let report = audit(&latest().await);
    assert!(report.is_conformant(), "{report:#?}");
    assert!(report.unexpected.is_empty(), "unsupported-platform assets: {:?}", report.unexpected);
}

#[tokio::test]
#[ignore]
async fn host_archive_has_binary_at_root() {
    let Some((os, arch)) = host_asset_spelling() else {
        return;
    };
    let release = latest().await;
    let bytes = download(&release, &expected_asset_name(&release.tag_name, os, arch)).await;

    let mut archive = tar::Archive::new(flate2::read::GzDecoder::new(&bytes[..]));
    let entries: Vec<String> = archive
        .entries()
        .unwrap()
        .filter_map(|e| e.ok().map(|e| e.path().unwrap().to_string_lossy().into_owned()))
        .collect();
    assert!(
        entries.iter().any(|e| e.trim_start_matches("./") == "shebe-mcp"),
        "shebe-mcp not at archive root; entries: {entries:?}"
    );
}

#[tokio::test]
#[ignore]
async fn truncated_host_archive_is_corrupt() {
    let Some((os, arch)) = host_asset_spelling() else {
        return;
    };
    let release = latest().await;
    let name = expected_asset_name(&release.tag_name, os, arch);
    let bytes = download(&release, &name).await;

    let temp = tempfile::tempdir().unwrap();
    let archive = temp.path().join(&name);
    std::fs::write(&archive, &bytes[..bytes.len() / 2]).unwrap();
    let dest = temp.path().join("out");
    std::fs::create_dir(&dest).unwrap();

    let err = shebe_resolver::extract::extract_archive(&archive, &name, "shebe-mcp", &dest)
        .unwrap_err();
    assert!(matches!(err, Error::CorruptArchive { .. }), "{err:?}");
}

#[tokio::test]
#[ignore]
async fn acquired_binary_runs_and_speaks_mcp() {
    if host_asset_spelling().is_none() {
        return;
    }
    let temp = tempfile::tempdir().unwrap();
    let acquirer = Acquirer::new(live_config().with_cache_dir(temp.path())).unwrap();
    let acquired = acquirer.acquire().await.unwrap();

    assert_eq!(acquirer.platform(), &detect_platform());
    assert!(acquired.binary.path.is_absolute());
    shebe_resolver::verify_version(&acquired.binary.path, &acquired.binary.version)
        .await
        .unwrap();

    let probe = McpProbe::spawn(&acquired.binary.path).await.unwrap();
    assert!(!probe.server_info().name.is_empty());

    // A second acquisition reuses the cache.
    let again = Acquirer::new(live_config().with_cache_dir(temp.path()))
        .unwrap()
        .acquire()
        .await
        .unwrap();
    assert!(again.from_cache);
    assert_eq!(again.binary, acquired.binary);
}

#[tokio::test]
#[ignore]
async fn unknown_repository_is_a_client_error() {
    let config = live_config().with_repo("rhobimd-oss/nonexistent").unwrap();
    let store = GithubReleaseStore::new(&config).unwrap();
    let err = store.release(&VersionRequest::Latest).await.unwrap_err();
    // 404 when authenticated, 403 anonymously.
    assert!(
        matches!(
            err,
            Error::ReleaseNotFound { .. }
                | Error::RateLimited { .. }
                | Error::Network {
                    status: Some(403),
                    ..
                }
        ),
        "{err:?}"
    );
}
