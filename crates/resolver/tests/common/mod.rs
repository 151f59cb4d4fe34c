//! Shared fixtures for resolver integration tests.

#![allow(dead_code)]

use flate2::Compression;
use flate2::write::GzEncoder;
use serde_json::{Value, json};
use shebe_resolver::{ResolverConfig, RetryPolicy};
use std::path::Path;
use std::time::Duration;
use tar::{Builder, Header};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const REPO: &str = "rhobimd-oss/shebe";
pub const TAG: &str = "v0.5.3";
pub const LINUX_ASSET: &str = "shebe-v0.5.3-linux-x86_64-musl.tar.gz";

/// A script that behaves like shebe-mcp for `--version`.
pub const FAKE_BINARY: &[u8] = b"#!/bin/sh\necho \"shebe-mcp 0.5.3\"\n";

/// Build a gzip tarball from `(path, contents, mode)` entries.
pub fn tarball(entries: &[(&str, &[u8], u32)]) -> Vec<u8> {
    let mut builder = Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    for (entry_path, data, mode) in entries {
        let mut header = Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(*mode);
        header.set_path(entry_path).unwrap();
        header.set_cksum();
        builder.append(&header, *data).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

/// The archive a well-formed release ships.
pub fn good_archive() -> Vec<u8> {
    tarball(&[
        ("shebe-mcp", FAKE_BINARY, 0o755),
        ("LICENSE", b"MIT", 0o644),
    ])
}

/// Bytes that do not compress, for archives that must be large.
pub fn noise(len: usize) -> Vec<u8> {
    let mut state: u32 = 0x9e37_79b9;
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            (state & 0xff) as u8
        })
        .collect()
}

/// Release JSON with the given assets, each served by `server`.
pub fn release_json(server: &MockServer, tag: &str, assets: &[(&str, usize)]) -> Value {
    let assets: Vec<Value> = assets
        .iter()
        .map(|(name, size)| {
            json!({
                "name": name,
                "browser_download_url": format!("{}/download/{tag}/{name}", server.uri()),
                "size": size,
                "content_type": "application/gzip",
            })
        })
        .collect();
    json!({
        "tag_name": tag,
        "name": tag,
        "draft": false,
        "prerelease": false,
        "assets": assets,
    })
}

/// Serve `release` at the latest-release endpoint, expecting `calls` hits.
pub async fn mount_latest(server: &MockServer, release: &Value, calls: u64) {
    Mock::given(method("GET"))
        .and(path(format!("/repos/{REPO}/releases/latest")))
        .respond_with(ResponseTemplate::new(200).set_body_json(release))
        .expect(calls)
        .mount(server)
        .await;
}

/// Serve `release` at its tag endpoint.
pub async fn mount_tag(server: &MockServer, tag: &str, release: &Value, calls: u64) {
    Mock::given(method("GET"))
        .and(path(format!("/repos/{REPO}/releases/tags/{tag}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(release))
        .expect(calls)
        .mount(server)
        .await;
}

/// Serve an asset body.
pub async fn mount_asset(server: &MockServer, tag: &str, name: &str, body: Vec<u8>, calls: u64) {
    Mock::given(method("GET"))
        .and(path(format!("/download/{tag}/{name}")))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
        .expect(calls)
        .mount(server)
        .await;
}

/// Configuration pointing at `server` with a cache under `cache`.
pub fn config(server: &MockServer, cache: &Path) -> ResolverConfig {
    ResolverConfig::default()
        .with_api_base(server.uri())
        .with_cache_dir(cache)
        .with_retry(RetryPolicy {
            initial_backoff: Duration::from_millis(10),
            ..RetryPolicy::default()
        })
}

/// Names in `dir` other than the lock file.
pub fn entries(dir: &Path) -> Vec<String> {
    let Ok(read) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut names: Vec<String> = read
        .flatten()
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|n| n != ".shebe.lock")
        .collect();
    names.sort();
    names
}
