//! Launch handoff.
//!
//! The resolver's job ends with a command line. Starting, supervising and
//! restarting the MCP server belongs to the host.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::cache::CachedBinary;

/// How to start the MCP server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchCommand {
    /// Absolute path of the executable.
    pub command: PathBuf,
    /// Arguments; shebe-mcp speaks MCP on stdio with none.
    pub args: Vec<String>,
    /// Extra environment variables.
    pub env: Vec<(String, String)>,
}

impl LaunchCommand {
    /// The command for a cached binary.
    #[must_use]
    pub fn for_binary(binary: &CachedBinary) -> Self {
        Self::for_path(&binary.path)
    }

    /// The command for an executable at `path`.
    ///
    /// Relative paths are resolved against the current directory so the
    /// command stays valid whatever directory the host spawns it from.
    #[must_use]
    pub fn for_path(path: &Path) -> Self {
        let command = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
        Self {
            command,
            args: Vec::new(),
            env: Vec::new(),
        }
    }

    /// A `tokio::process::Command` ready to spawn.
    #[must_use]
    pub fn to_command(&self) -> tokio::process::Command {
        let mut command = tokio::process::Command::new(&self.command);
        command.args(&self.args);
        command.envs(self.env.iter().map(|(k, v)| (k, v)));
        command
    }
}
