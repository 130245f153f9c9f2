//! Lifecycle-tagged fragments.
//!
//! A host document carries code fragments labelled with the lifecycle event
//! they belong to.  `init` fragments run directly in the root environment,
//! so their declarations persist.  Every other label runs each fragment in a
//! fresh child scope per firing: plain assignment still reaches outer state,
//! but local `var`s vanish afterwards.
//!
//! Firing is an error boundary.  A fragment that fails is logged and
//! skipped; the remaining fragments for that event still run.

use std::fmt;
use std::str::FromStr;

use tracing::{trace, warn};

use crate::error::{QuillError, Result};
use crate::frontend::{compile, Dialect};
use crate::runtime::Runtime;
use crate::script::Program;

// ── Lifecycle ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Lifecycle {
    Init,
    Update,
    Render,
    Input,
    Resize,
    Shutdown,
}

impl Lifecycle {
    pub const ALL: &'static [Lifecycle] = &[
        Lifecycle::Init,
        Lifecycle::Update,
        Lifecycle::Render,
        Lifecycle::Input,
        Lifecycle::Resize,
        Lifecycle::Shutdown,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Lifecycle::Init => "init",
            Lifecycle::Update => "update",
            Lifecycle::Render => "render",
            Lifecycle::Input => "input",
            Lifecycle::Resize => "resize",
            Lifecycle::Shutdown => "shutdown",
        }
    }

    /// Whether fragments run in the root environment.
    pub fn is_persistent(self) -> bool {
        self == Lifecycle::Init
    }
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Lifecycle {
    type Err = String;

    /// Case-insensitive; `on_update` and `update` are the same label.
    fn from_str(s: &str) -> std::result::Result<Self, String> {
        let lower = s.trim().to_ascii_lowercase();
        let bare = lower.strip_prefix("on_").unwrap_or(&lower);
        Lifecycle::ALL
            .iter()
            .copied()
            .find(|l| l.name() == bare)
            .ok_or_else(|| format!("invalid lifecycle label {s:?}"))
    }
}

// ── FragmentSet ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct Fragment {
    lifecycle: Lifecycle,
    program: Program,
}

/// Compiled fragments, kept in source order.
#[derive(Debug, Default)]
pub struct FragmentSet {
    fragments: Vec<Fragment>,
}

impl FragmentSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile and add a fragment.  Compile errors are returned immediately.
    pub fn add(&mut self, lifecycle: Lifecycle, source: &str, dialect: Option<Dialect>) -> Result<()> {
        let program = compile(source, dialect)?;
        self.add_program(lifecycle, program);
        Ok(())
    }

    pub fn add_program(&mut self, lifecycle: Lifecycle, program: Program) {
        self.fragments.push(Fragment { lifecycle, program });
    }

    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    pub fn count(&self, lifecycle: Lifecycle) -> usize {
        self.fragments.iter().filter(|f| f.lifecycle == lifecycle).count()
    }

    /// Run every fragment tagged `lifecycle`, in order.  Failures are logged
    /// and collected; they never stop later fragments.
    pub fn fire(&self, lifecycle: Lifecycle, rt: &mut Runtime) -> Vec<QuillError> {
        let mut errors = Vec::new();
        for (index, fragment) in self
            .fragments
            .iter()
            .filter(|f| f.lifecycle == lifecycle)
            .enumerate()
        {
            trace!(%lifecycle, index, "firing fragment");
            let env = if lifecycle.is_persistent() {
                rt.root().clone()
            } else {
                rt.new_env(None)
            };
            if let Err(e) = rt.exec_program(&fragment.program, &env) {
                warn!(%lifecycle, index, error = %e, "fragment failed");
                errors.push(e);
            }
        }
        errors
    }
}
