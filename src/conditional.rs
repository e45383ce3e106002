//! Conditional registry and boolean-expression evaluator.
//!
//! Script statements can be gated by C-style boolean expressions over named
//! conditionals, for example:
//!
//! - `[$WIN64]`
//! - `[$WINDOWS && !$RETAIL]`
//! - `[($OSX64 || $LINUX64) && $DEDICATED]`
//!
//! Uses [`chumsky`] for the parsing grammar.
//!
//! ## Grammar
//!
//! ```text
//! expr    = or_expr
//! or_expr = and_expr ('||' and_expr)*
//! and_expr= unary ('&&' unary)*
//! unary   = '!'* atom
//! atom    = symbol | '(' expr ')'
//! symbol  = '$'? [A-Za-z0-9_]+
//! ```
//!
//! The literal symbols `0` and `1` evaluate to false/true.  Every other
//! symbol is resolved through a caller-supplied callback (normally backed by
//! a [`ConditionalRegistry`]); unknown symbols resolve to false.

use chumsky::prelude::*;

use crate::error::ScriptError;

// ═══════════════════════════════════════════════════════════════════════════════
//  AST
// ═══════════════════════════════════════════════════════════════════════════════

/// A parsed conditional expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    /// A bare symbol reference (leading `$` already stripped).
    Symbol(String),
    /// `!a`
    Not(Box<Expr>),
    /// `a && b`
    And(Box<Expr>, Box<Expr>),
    /// `a || b`
    Or(Box<Expr>, Box<Expr>),
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Chumsky parser
// ═══════════════════════════════════════════════════════════════════════════════

/// Build the chumsky parser for conditional expressions.
fn condition_parser<'a>() -> impl Parser<'a, &'a str, Expr, extra::Err<Simple<'a, char>>> {
    recursive(|expr| {
        // ── Symbol: optional '$' sigil, then identifier chars ────────────
        let symbol = just('$')
            .or_not()
            .ignore_then(
                any()
                    .filter(|c: &char| c.is_ascii_alphanumeric() || *c == '_')
                    .repeated()
                    .at_least(1)
                    .to_slice(),
            )
            .map(|s: &str| Expr::Symbol(s.to_string()));

        // ── Parenthesized expression ─────────────────────────────────────
        let paren_expr = expr.delimited_by(just('(').padded(), just(')').padded());

        // ── Atom ─────────────────────────────────────────────────────────
        let atom = choice((symbol, paren_expr)).padded();

        // ── '!' — binds tightest, stacks ─────────────────────────────────
        let unary = just('!')
            .padded()
            .repeated()
            .foldr(atom, |_, rhs| Expr::Not(Box::new(rhs)));

        // ── '&&' — higher precedence than '||' ───────────────────────────
        let and_expr = unary.clone().foldl(
            just("&&").padded().ignore_then(unary).repeated(),
            |lhs, rhs| Expr::And(Box::new(lhs), Box::new(rhs)),
        );

        // ── '||' — lowest precedence ─────────────────────────────────────
        and_expr.clone().foldl(
            just("||").padded().ignore_then(and_expr).repeated(),
            |lhs, rhs| Expr::Or(Box::new(lhs), Box::new(rhs)),
        )
    })
}

/// Parse a conditional expression into an [`Expr`] AST.
///
/// A malformed expression is a fatal syntax error.
pub fn parse_condition(input: &str) -> Result<Expr, ScriptError> {
    condition_parser()
        .parse(input)
        .into_result()
        .map_err(|errs| {
            let messages: Vec<String> = errs.iter().map(|e| format!("{e}")).collect();
            ScriptError::syntax(format!(
                "bad conditional expression '{}': {}",
                input,
                messages.join("; ")
            ))
        })
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Evaluation
// ═══════════════════════════════════════════════════════════════════════════════

/// Evaluate a conditional expression against a symbol resolver.
///
/// An empty (or all-whitespace) expression is vacuously true.  The resolver
/// receives each symbol name with the `$` sigil already stripped and may fail
/// (e.g. when a symbol collides with a known macro name, which is forbidden
/// inside boolean expressions).
pub fn evaluate(
    input: &str,
    resolver: &mut dyn FnMut(&str) -> Result<bool, ScriptError>,
) -> Result<bool, ScriptError> {
    if input.trim().is_empty() {
        return Ok(true);
    }
    let expr = parse_condition(input)?;
    evaluate_expr(&expr, resolver)
}

/// Evaluate an already-parsed expression tree.
pub fn evaluate_expr(
    expr: &Expr,
    resolver: &mut dyn FnMut(&str) -> Result<bool, ScriptError>,
) -> Result<bool, ScriptError> {
    match expr {
        Expr::Symbol(name) => match name.as_str() {
            "0" => Ok(false),
            "1" => Ok(true),
            _ => resolver(name),
        },
        Expr::Not(inner) => Ok(!evaluate_expr(inner, resolver)?),
        Expr::And(a, b) => Ok(evaluate_expr(a, resolver)? && evaluate_expr(b, resolver)?),
        Expr::Or(a, b) => Ok(evaluate_expr(a, resolver)? || evaluate_expr(b, resolver)?),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Conditional registry
// ═══════════════════════════════════════════════════════════════════════════════

/// Scope class of a conditional.  Immutable once created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionalKind {
    /// Selects the target platform.  Exactly one platform conditional may be
    /// defined at a time.
    Platform,
    /// Per-title build flavor.  True only while both defined and the active
    /// game.
    Game,
    /// Built-in flags derived from the platform (e.g. `WINDOWS`, `POSIX`).
    System,
    /// User flags toggled from the command line / embedding application.
    Custom,
    /// Flags defined by `$Conditional` statements inside scripts.
    Script,
}

impl ConditionalKind {
    /// Whether a script-level `$Conditional` statement may toggle this kind.
    pub fn script_mutable(self) -> bool {
        matches!(self, ConditionalKind::Custom | ConditionalKind::Script)
    }
}

/// A named boolean switch gating script statements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conditional {
    /// Name as first referenced.
    pub name: String,
    /// Canonical uppercase display name.
    pub upper_name: String,
    pub kind: ConditionalKind,
    pub defined: bool,
    /// Only meaningful for [`ConditionalKind::Game`]: whether this is the
    /// currently active game.  At most one game is active at a time.
    pub game_active: bool,
}

/// Built-in platform conditional names.
pub const PLATFORMS: &[&str] = &["WIN32", "WIN64", "OSX32", "OSX64", "LINUX32", "LINUX64"];

/// System flag names derived from the selected platform.
const SYSTEM_FLAGS: &[&str] = &["WINDOWS", "OSX", "LINUX", "POSIX", "X64"];

/// Owns the full set of conditionals for one build session.
///
/// `system`-kind values are snapshotted ([`save`](Self::save)) before any
/// script runs and restored ([`restore`](Self::restore)) after, so no
/// per-project mutation leaks into the next project.
#[derive(Debug, Clone, Default)]
pub struct ConditionalRegistry {
    conditionals: Vec<Conditional>,
    snapshot: Option<Vec<Conditional>>,
}

impl ConditionalRegistry {
    /// Create an empty registry (no pre-seeded platforms).
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry pre-seeded with every built-in platform conditional
    /// plus the derived system flags, with `platform` selected as the target.
    pub fn with_platform(platform: &str) -> Result<Self, ScriptError> {
        if !PLATFORMS.iter().any(|p| p.eq_ignore_ascii_case(platform)) {
            return Err(ScriptError::semantic(format!(
                "unknown target platform '{platform}' (expected one of {})",
                PLATFORMS.join(", ")
            )));
        }

        let mut registry = Self::new();
        for &name in PLATFORMS {
            let defined = name.eq_ignore_ascii_case(platform);
            registry.find_or_create(name, ConditionalKind::Platform).defined = defined;
        }

        let upper = platform.to_ascii_uppercase();
        for &flag in SYSTEM_FLAGS {
            let defined = match flag {
                "WINDOWS" => upper.starts_with("WIN"),
                "OSX" => upper.starts_with("OSX"),
                "LINUX" => upper.starts_with("LINUX"),
                "POSIX" => upper.starts_with("OSX") || upper.starts_with("LINUX"),
                "X64" => upper.ends_with("64"),
                _ => false,
            };
            registry.find_or_create(flag, ConditionalKind::System).defined = defined;
        }

        Ok(registry)
    }

    /// The defined platform conditional's uppercase name, if any.
    pub fn platform(&self) -> Option<&str> {
        self.conditionals
            .iter()
            .find(|c| c.kind == ConditionalKind::Platform && c.defined)
            .map(|c| c.upper_name.as_str())
    }

    /// Look up a conditional by name (case-insensitive).
    pub fn find(&self, name: &str) -> Option<&Conditional> {
        self.conditionals.iter().find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Look up a conditional, creating it undefined with the given kind if it
    /// does not exist yet.
    pub fn find_or_create(&mut self, name: &str, kind: ConditionalKind) -> &mut Conditional {
        let index = match self
            .conditionals
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
        {
            Some(i) => i,
            None => {
                self.conditionals.push(Conditional {
                    name: name.to_string(),
                    upper_name: name.to_ascii_uppercase(),
                    kind,
                    defined: false,
                    game_active: false,
                });
                self.conditionals.len() - 1
            }
        };
        &mut self.conditionals[index]
    }

    /// Set a conditional's defined state, creating it if necessary.
    ///
    /// Fails with a "reserved conditional" error when the stored kind does
    /// not match `kind` — a script-level `$Conditional` (kind `Script`)
    /// cannot toggle a platform, game, or system conditional.
    pub fn set(
        &mut self,
        name: &str,
        defined: bool,
        kind: ConditionalKind,
    ) -> Result<(), ScriptError> {
        if let Some(existing) = self.find(name) {
            if existing.kind != kind && !(existing.kind == ConditionalKind::Custom && kind == ConditionalKind::Script) {
                return Err(ScriptError::semantic(format!(
                    "conditional '{}' is reserved ({:?}) and cannot be set as {:?}",
                    existing.upper_name, existing.kind, kind
                )));
            }
        }
        self.apply(name, defined, kind);
        Ok(())
    }

    /// Set a conditional's defined state bypassing the kind check.  This is
    /// the override path used by the embedding application to toggle
    /// system-level flags; scripts go through [`set`](Self::set).
    pub fn set_with_override(&mut self, name: &str, defined: bool, kind: ConditionalKind) {
        self.apply(name, defined, kind);
    }

    fn apply(&mut self, name: &str, defined: bool, kind: ConditionalKind) {
        let stored_kind = self.find_or_create(name, kind).kind;
        // Exactly one platform conditional may be defined at a time.
        if stored_kind == ConditionalKind::Platform && defined {
            for c in &mut self.conditionals {
                if c.kind == ConditionalKind::Platform {
                    c.defined = false;
                }
            }
        }
        self.find_or_create(name, kind).defined = defined;
    }

    /// Select the active game (or clear the selection with `None`).  At most
    /// one game is active per evaluation pass; selecting a game defines its
    /// conditional as a side effect.
    pub fn set_active_game(&mut self, name: Option<&str>) {
        for c in &mut self.conditionals {
            c.game_active = false;
        }
        if let Some(name) = name {
            let game = self.find_or_create(name, ConditionalKind::Game);
            game.defined = true;
            game.game_active = true;
        }
    }

    /// Resolve a symbol token to a boolean, for use by the expression
    /// evaluator.
    ///
    /// Handles the literal tokens `0`/`1` and an optional leading `$` sigil.
    /// A `game`-kind conditional is true only when it is both defined and the
    /// currently active game.  Returns `None` for unknown symbols (the caller
    /// decides whether that is false or a macro-collision error).
    pub fn resolve_symbol(&self, token: &str) -> Option<bool> {
        let name = token.strip_prefix('$').unwrap_or(token);
        match name {
            "0" => return Some(false),
            "1" => return Some(true),
            _ => {}
        }
        self.find(name).map(|c| match c.kind {
            ConditionalKind::Game => c.defined && c.game_active,
            _ => c.defined,
        })
    }

    /// Snapshot the full conditional set.  One snapshot slot; a second
    /// `save()` overwrites the first.
    pub fn save(&mut self) {
        self.snapshot = Some(self.conditionals.clone());
    }

    /// Restore the last snapshot, re-applying every conditional so the
    /// platform-exclusivity invariant holds on the restored set.
    pub fn restore(&mut self) {
        if let Some(snapshot) = self.snapshot.take() {
            self.conditionals.clear();
            for c in snapshot {
                let defined = c.defined;
                let game_active = c.game_active;
                let restored = self.find_or_create(&c.name, c.kind);
                restored.defined = defined;
                restored.game_active = game_active;
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════════════════════
