//! MCP handshake probe.
//!
//! Confirms that an acquired binary actually runs and speaks MCP: it is
//! spawned with piped stdio, sent a JSON-RPC `initialize` request as a single
//! line, and must answer with its server info. Nothing beyond the handshake
//! is modelled.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use shebe_platform::ReleaseVersion;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, trace};

use crate::{Error, Result};

/// MCP protocol revision sent in `initialize`.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// How long to wait for any single response.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Server identity reported in the `initialize` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerInfo {
    /// Server name.
    pub name: String,
    /// Server version.
    pub version: String,
}

/// A running MCP server that has completed the handshake.
///
/// The child process is killed when the probe is dropped.
#[derive(Debug)]
pub struct McpProbe {
    path: PathBuf,
    _child: Child,
    stdin: ChildStdin,
    reader: BufReader<ChildStdout>,
    next_id: u64,
    timeout: Duration,
    server_info: ServerInfo,
}

impl McpProbe {
    /// Spawn `path` and perform the `initialize` handshake.
    pub async fn spawn(path: &Path) -> Result<Self> {
        Self::spawn_with_timeout(path, DEFAULT_PROBE_TIMEOUT).await
    }

    /// Like [`Self::spawn`] with a custom per-response timeout.
    pub async fn spawn_with_timeout(path: &Path, timeout: Duration) -> Result<Self> {
        debug!(?path, "Spawning MCP server for probe");
        let mut child = Command::new(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::probe(path, format!("failed to spawn: {e}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::probe(path, "stdin was not captured"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::probe(path, "stdout was not captured"))?;

        let mut probe = Self {
            path: path.to_path_buf(),
            _child: child,
            stdin,
            reader: BufReader::new(stdout),
            next_id: 1,
            timeout,
            server_info: ServerInfo {
                name: String::new(),
                version: String::new(),
            },
        };

        let result = probe
            .send_request(
                "initialize",
                json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": {},
                    "clientInfo": {
                        "name": "shebe-resolver",
                        "version": env!("CARGO_PKG_VERSION"),
                    }
                }),
            )
            .await?;

        let info = result
            .get("serverInfo")
            .cloned()
            .ok_or_else(|| Error::probe(path, "initialize response has no serverInfo"))?;
        probe.server_info = serde_json::from_value(info)
            .map_err(|e| Error::probe(path, format!("invalid serverInfo: {e}")))?;

        debug!(
            name = %probe.server_info.name,
            version = %probe.server_info.version,
            "MCP handshake complete"
        );
        Ok(probe)
    }

    /// Identity the server reported during the handshake.
    #[must_use]
    pub fn server_info(&self) -> &ServerInfo {
        &self.server_info
    }

    /// Send a request and return its `result`.
    ///
    /// Lines that are not the response to this request (notifications, logs
    /// on stdout) are skipped. A JSON-RPC error response is a probe failure.
    pub async fn send_request(&mut self, method: &str, params: Value) -> Result<Value> {
        let id = self.next_id;
        self.next_id += 1;

        let request = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        let mut line = serde_json::to_string(&request).map_err(|source| Error::Json {
            context: format!("encoding {method} request"),
            source,
        })?;
        line.push('\n');
        trace!(%method, id, "Sending MCP request");

        self.stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| Error::probe(&self.path, format!("write {method} request: {e}")))?;
        self.stdin
            .flush()
            .await
            .map_err(|e| Error::probe(&self.path, format!("flush {method} request: {e}")))?;

        let response = tokio::time::timeout(self.timeout, self.read_response(id))
            .await
            .map_err(|_| {
                Error::probe(
                    &self.path,
                    format!("no response to {method} within {:?}", self.timeout),
                )
            })??;

        if let Some(error) = response.get("error") {
            return Err(Error::probe(
                &self.path,
                format!("{method} returned an error: {error}"),
            ));
        }
        response
            .get("result")
            .cloned()
            .ok_or_else(|| Error::probe(&self.path, format!("{method} response has no result")))
    }

    async fn read_response(&mut self, id: u64) -> Result<Value> {
        let mut line = String::new();
        loop {
            line.clear();
            let read = self
                .reader
                .read_line(&mut line)
                .await
                .map_err(|e| Error::probe(&self.path, format!("read response: {e}")))?;
            if read == 0 {
                return Err(Error::probe(&self.path, "server closed stdout"));
            }
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let message: Value = match serde_json::from_str(trimmed) {
                Ok(message) => message,
                Err(_) => {
                    trace!(line = %trimmed, "Skipping non-JSON output");
                    continue;
                }
            };
            if message.get("id").and_then(Value::as_u64) == Some(id) {
                return Ok(message);
            }
            trace!(%message, "Skipping unrelated message");
        }
    }
}

/// Run `path --version` and return its trimmed stdout.
pub async fn query_version(path: &Path) -> Result<String> {
    let output = Command::new(path)
        .arg("--version")
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| Error::probe(path, format!("failed to run --version: {e}")))?;

    if !output.status.success() {
        return Err(Error::probe(
            path,
            format!("--version exited with {}", output.status),
        ));
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Check that the binary at `path` reports `version`.
///
/// The output may carry the version with or without its `v`, e.g.
/// `shebe-mcp 0.5.3`. Returns the raw output on success.
pub async fn verify_version(path: &Path, version: &ReleaseVersion) -> Result<String> {
    let reported = query_version(path).await?;
    if reports_version(&reported, version) {
        Ok(reported)
    } else {
        Err(Error::VersionMismatch {
            expected: version.to_string(),
            reported,
        })
    }
}

fn reports_version(output: &str, version: &ReleaseVersion) -> bool {
    output
        .split(|c: char| c.is_whitespace() || c == ',' || c == '(' || c == ')')
        .map(|token| token.strip_prefix('v').unwrap_or(token))
        .any(|token| token == version.without_prefix())
}
