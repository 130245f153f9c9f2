//! `quill.toml` configuration.
//!
//! ```toml
//! [runtime]
//! max_call_depth = 512
//!
//! [export]
//! backend = "python"
//! indent_width = 4
//! header = "Exported from level1.quill"
//!
//! [source]
//! dialect = "canonical"
//! ```
//!
//! Every key is optional.  Lookup order: an explicit path, `./quill.toml`,
//! then `quill.toml` in the user config directory.  No file means defaults.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::codegen::{BackendKind, Context};
use crate::frontend::Dialect;
use crate::runtime::Runtime;
use crate::script::interp::DEFAULT_MAX_CALL_DEPTH;

pub const FILE_NAME: &str = "quill.toml";

const MAX_INDENT_WIDTH: usize = 16;

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("{}: {message}", path.display())]
    Invalid { path: PathBuf, message: String },
}

// ── File layout ───────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawConfig {
    runtime: RawRuntime,
    export: RawExport,
    source: RawSource,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawRuntime {
    max_call_depth: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawExport {
    backend: Option<String>,
    indent_width: Option<usize>,
    header: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawSource {
    dialect: Option<String>,
}

// ── Config ────────────────────────────────────────────────────────────────────

/// Validated settings.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub max_call_depth: usize,
    /// Backend used by `export` when none is given on the command line.
    pub backend: Option<BackendKind>,
    pub indent_width: usize,
    pub header: Option<String>,
    /// Forced source dialect; `None` means detect.
    pub dialect: Option<Dialect>,
    /// Where the settings came from, if a file was read.
    pub path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            backend: None,
            indent_width: Context::DEFAULT_INDENT_WIDTH,
            header: None,
            dialect: None,
            path: None,
        }
    }
}

impl Config {
    /// Parse `text` as the contents of `path`.
    pub fn parse(text: &str, path: &Path) -> Result<Self, ConfigError> {
        let raw: RawConfig = toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        let invalid = |message: String| ConfigError::Invalid {
            path: path.to_path_buf(),
            message,
        };

        let mut config = Config {
            path: Some(path.to_path_buf()),
            header: raw.export.header,
            ..Config::default()
        };
        if let Some(depth) = raw.runtime.max_call_depth {
            if depth == 0 {
                return Err(invalid("runtime.max_call_depth must be at least 1".into()));
            }
            config.max_call_depth = depth;
        }
        if let Some(width) = raw.export.indent_width {
            if !(1..=MAX_INDENT_WIDTH).contains(&width) {
                return Err(invalid(format!(
                    "export.indent_width must be between 1 and {MAX_INDENT_WIDTH}, got {width}"
                )));
            }
            config.indent_width = width;
        }
        config.backend = raw
            .export
            .backend
            .map(|b| b.parse::<BackendKind>().map_err(&invalid))
            .transpose()?;
        config.dialect = raw
            .source
            .dialect
            .map(|d| d.parse::<Dialect>().map_err(&invalid))
            .transpose()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text, path)
    }

    /// Load `explicit` if given (it must exist), otherwise the first file
    /// found in the search path, otherwise defaults.
    pub fn discover(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        match search_path().into_iter().find(|p| p.is_file()) {
            Some(path) => {
                debug!(path = %path.display(), "loading config");
                Self::load(&path)
            }
            None => Ok(Config::default()),
        }
    }

    /// A code-generation context carrying the export settings.
    pub fn context(&self, backend: BackendKind) -> Context {
        let ctx = Context::new(backend).with_indent_width(self.indent_width);
        match &self.header {
            Some(h) => ctx.with_header(h.clone()),
            None => ctx,
        }
    }

    pub fn apply(&self, rt: &mut Runtime) {
        if rt.max_call_depth() != self.max_call_depth {
            rt.set_max_call_depth(self.max_call_depth);
        }
    }
}

/// `quill.toml` in the user config directory, e.g.
/// `~/.config/quill/quill.toml` on Linux.
pub fn user_config_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "quill").map(|dirs| dirs.config_dir().join(FILE_NAME))
}

fn search_path() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(FILE_NAME)];
    paths.extend(user_config_path());
    paths
}

// ── Tests ─────────────────────────────────────────────────────────────────────
