//! Error type shared by the whole script-processing pipeline.
//!
//! Errors fall into three classes:
//!
//! - [`ErrorKind::Syntax`] — malformed token stream, unknown keyword, bad
//!   boolean expression, bad integer literal, unknown ordinal.  Always fatal.
//! - [`ErrorKind::Semantic`] — kind-mismatched macro/conditional rebinding,
//!   property set on a removed tool, missing required macro, property macro
//!   referenced outside a configuration block.  Always fatal.
//! - [`ErrorKind::Io`] — filesystem failure while reading a script or probing
//!   `$OS` path variants.
//!
//! Fatal errors unwind to the project boundary; warnings (redundant property
//! values, duplicate declarations) go through [`log::warn!`] instead and never
//! become a `ScriptError`.

/// Classification of a fatal script-processing error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Syntax,
    Semantic,
    Io,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Syntax => write!(f, "syntax error"),
            ErrorKind::Semantic => write!(f, "semantic error"),
            ErrorKind::Io => write!(f, "io error"),
        }
    }
}

/// Source position of the statement that raised an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptLocation {
    /// Script name as given to the driver (file path or synthetic name).
    pub script: String,
    /// 1-based line number.
    pub line: u32,
}

impl std::fmt::Display for ScriptLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.script, self.line)
    }
}

/// A fatal script-processing error.
///
/// Carries the originating script name and line when the failing statement is
/// known, plus a textual stack of nested `$include` / `$Configuration` replay
/// frames so the user can see how execution reached the failing statement.
#[derive(Debug, Clone)]
pub struct ScriptError {
    pub kind: ErrorKind,
    pub message: String,
    pub location: Option<ScriptLocation>,
    /// Outermost frame first, e.g. `["project.pgc", "include common.pgc",
    /// "configuration Debug"]`.
    pub stack: Vec<String>,
}

impl ScriptError {
    pub fn syntax(message: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Syntax, message: message.into(), location: None, stack: Vec::new() }
    }

    pub fn semantic(message: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Semantic, message: message.into(), location: None, stack: Vec::new() }
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Io, message: message.into(), location: None, stack: Vec::new() }
    }

    /// Attach a script/line location.  The first location attached wins, so
    /// an error propagating out of nested helpers keeps the innermost
    /// statement position.
    pub fn at(mut self, script: impl Into<String>, line: u32) -> Self {
        if self.location.is_none() {
            self.location = Some(ScriptLocation { script: script.into(), line });
        }
        self
    }

    /// Prepend a stack frame.  Called while unwinding, so frames end up
    /// outermost-first.
    pub fn in_frame(mut self, frame: impl Into<String>) -> Self {
        self.stack.insert(0, frame.into());
        self
    }
}

impl std::fmt::Display for ScriptError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.location {
            Some(loc) => write!(f, "{loc}: {}: {}", self.kind, self.message)?,
            None => write!(f, "{}: {}", self.kind, self.message)?,
        }
        for frame in &self.stack {
            write!(f, "\n  in {frame}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ScriptError {}

impl From<std::io::Error> for ScriptError {
    fn from(error: std::io::Error) -> Self {
        Self::io(error.to_string())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_with_location() {
        let err = ScriptError::syntax("unknown keyword '$Flie'").at("game.pgc", 12);
        assert_eq!(err.to_string(), "game.pgc(12): syntax error: unknown keyword '$Flie'");
    }

    #[test]
    fn display_without_location() {
        let err = ScriptError::semantic("missing required macro 'SRCDIR'");
        assert_eq!(err.to_string(), "semantic error: missing required macro 'SRCDIR'");
    }

    #[test]
    fn first_location_wins() {
        let err = ScriptError::syntax("bad").at("inner.pgc", 3).at("outer.pgc", 99);
        assert_eq!(err.location.as_ref().unwrap().script, "inner.pgc");
        assert_eq!(err.location.as_ref().unwrap().line, 3);
    }

    #[test]
    fn stack_frames_render_outermost_first() {
        let err = ScriptError::semantic("tool not available")
            .at("common.pgc", 7)
            .in_frame("configuration Debug")
            .in_frame("include common.pgc");
        let text = err.to_string();
        let include_pos = text.find("include common.pgc").unwrap();
        let config_pos = text.find("configuration Debug").unwrap();
        assert!(include_pos < config_pos);
    }
}
