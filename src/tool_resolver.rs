//! # Tool Path Resolver
//!
//! Finds the encoder executable in different environments:
//! - Explicit path from the command line or config file
//! - `FFMPEG_PATH` environment variable
//! - Bundled next to the executable (`tools/<platform>/ffmpeg`)
//! - System `PATH`

use std::env;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Tool path resolver for the encoder binaries
pub struct ToolPathResolver {
    /// Path given explicitly by the user, always wins
    override_path: Option<PathBuf>,
    /// Base directory where tools are bundled
    tools_dir: Option<PathBuf>,
}

impl ToolPathResolver {
    /// Create a new path resolver
    pub fn new(override_path: Option<PathBuf>) -> Self {
        Self {
            override_path,
            tools_dir: Self::detect_bundled_tools_dir(),
        }
    }

    /// Detect the directory holding bundled tools
    fn detect_bundled_tools_dir() -> Option<PathBuf> {
        if let Ok(tools_dir) = env::var("TOOLS_DIR") {
            let tools_path = PathBuf::from(tools_dir);
            debug!("Checking TOOLS_DIR environment variable: {:?}", tools_path);
            if tools_path.is_dir() {
                return Some(tools_path);
            }
        }

        let exe_path = env::current_exe().ok()?;
        let app_dir = exe_path.parent()?;
        let possible_paths = [
            app_dir.join("tools"),
            app_dir.join("resources").join("tools"),
        ];

        for path in &possible_paths {
            debug!("Checking bundled tools path: {:?}", path);
            if path.is_dir() {
                return Some(path.clone());
            }
        }

        None
    }

    /// Resolve the path to a specific tool
    pub fn resolve_tool(&self, tool_name: &str) -> Option<PathBuf> {
        debug!("Resolving tool: {}", tool_name);

        if let Some(ref path) = self.override_path {
            if path.is_file() {
                return Some(path.clone());
            }
            warn!("Configured path for {} does not exist: {}", tool_name, path.display());
            return None;
        }

        let env_key = format!("{}_PATH", tool_name.to_uppercase());
        if let Some(path) = env::var_os(&env_key).map(PathBuf::from) {
            if path.is_file() {
                debug!("Using {} from {}: {:?}", tool_name, env_key, path);
                return Some(path);
            }
            warn!("{} points to a missing file: {}", env_key, path.display());
        }

        if let Some(ref tools_dir) = self.tools_dir {
            let bundled_path = Self::bundled_tool_path(tools_dir, tool_name);
            if bundled_path.is_file() {
                debug!("Using bundled tool: {} -> {:?}", tool_name, bundled_path);
                return Some(bundled_path);
            }
        }

        let found = Self::find_in_system_path(tool_name);
        if found.is_none() {
            warn!("Tool not found: {}", tool_name);
        }
        found
    }

    /// Get the expected path for a bundled tool
    fn bundled_tool_path(tools_dir: &Path, tool_name: &str) -> PathBuf {
        let platform = if cfg!(target_os = "macos") {
            "darwin"
        } else {
            env::consts::OS
        };

        tools_dir
            .join(platform)
            .join(format!("{}{}", tool_name, env::consts::EXE_SUFFIX))
    }

    /// Find tool in system PATH
    fn find_in_system_path(tool_name: &str) -> Option<PathBuf> {
        let tool_with_ext = format!("{}{}", tool_name, env::consts::EXE_SUFFIX);

        env::split_paths(&env::var_os("PATH")?)
            .map(|dir| dir.join(&tool_with_ext))
            .find(|path| path.is_file())
    }

    /// Resolve a tool or explain how to get it
    pub fn check_tool_with_instructions(&self, tool_name: &str) -> Result<PathBuf, String> {
        self.resolve_tool(tool_name).ok_or_else(|| {
            if cfg!(target_os = "linux") {
                format!(
                    "Tool '{}' not found in system PATH.\n\
                    To install on Linux, run:\n  sudo apt-get install ffmpeg",
                    tool_name
                )
            } else {
                format!(
                    "Tool '{}' not found. Install it, set {}_PATH, or pass its location explicitly.",
                    tool_name,
                    tool_name.to_uppercase()
                )
            }
        })
    }
}

impl Default for ToolPathResolver {
    fn default() -> Self {
        Self::new(None)
    }
}
