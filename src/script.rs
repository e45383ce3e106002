//! Script driver: tokenizer and statement interpreter for the project DSL.
//!
//! Scripts are line/token oriented with nested `{ }` blocks:
//!
//! ```text
//! $Macro OUTBINNAME "server"
//!
//! $Project "server"
//! {
//!     $Folder "Source Files"
//!     {
//!         $File "server.cpp" "util.cpp"
//!         $File "stub.cpp" [$WIN32]
//!     }
//!
//!     $Configuration
//!     {
//!         $Compiler
//!         {
//!             $PreprocessorDefinitions "GAMEDLL;$BASE"
//!         }
//!     }
//! }
//! ```
//!
//! Statements execute in source order, fully inlining `$include`d scripts
//! depth-first.  Conditionals and macros are resolved at each statement; every
//! resolved value is stored into the cascading property model.
//!
//! The source is tokenized exactly once.  A `$Configuration` block is
//! *replayed* by re-interpreting its recorded token span once per
//! configuration name; the block is never re-lexed.

use std::path::{Path, PathBuf};

use crate::conditional;
use crate::error::ScriptError;
use crate::project::{LibKind, Project, ROOT_CONFIGURATIONS, ToolKind};
use crate::session::BuildSession;

// ═══════════════════════════════════════════════════════════════════════════════
//  Tokenizer
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenKind {
    /// Bare or quoted word (quotes stripped).
    Word,
    OpenBrace,
    CloseBrace,
    /// Bracketed conditional suffix; text is the inner expression.
    Condition,
}

#[derive(Debug, Clone)]
struct Token {
    kind: TokenKind,
    text: String,
    line: u32,
    quoted: bool,
}

/// Split a script source into tokens.  Handles `//` comments, quoted strings,
/// braces, and `[...]` conditional suffixes.
fn tokenize(source: &str, script: &str) -> Result<Vec<Token>, ScriptError> {
    let mut tokens = Vec::new();
    let mut chars = source.char_indices().peekable();
    let mut line: u32 = 1;

    while let Some((_, c)) = chars.next() {
        match c {
            '\n' => line += 1,
            c if c.is_whitespace() => {}
            '/' if chars.peek().map(|&(_, c)| c) == Some('/') => {
                for (_, c) in chars.by_ref() {
                    if c == '\n' {
                        line += 1;
                        break;
                    }
                }
            }
            '{' => tokens.push(Token { kind: TokenKind::OpenBrace, text: "{".into(), line, quoted: false }),
            '}' => tokens.push(Token { kind: TokenKind::CloseBrace, text: "}".into(), line, quoted: false }),
            '[' => {
                let start_line = line;
                let mut text = String::new();
                let mut closed = false;
                for (_, c) in chars.by_ref() {
                    match c {
                        ']' => {
                            closed = true;
                            break;
                        }
                        '\n' => line += 1,
                        _ => text.push(c),
                    }
                }
                if !closed {
                    return Err(ScriptError::syntax("unterminated '[' conditional")
                        .at(script, start_line));
                }
                tokens.push(Token {
                    kind: TokenKind::Condition,
                    text: text.trim().to_string(),
                    line: start_line,
                    quoted: false,
                });
            }
            '"' => {
                let start_line = line;
                let mut text = String::new();
                let mut closed = false;
                for (_, c) in chars.by_ref() {
                    match c {
                        '"' => {
                            closed = true;
                            break;
                        }
                        '\n' => line += 1,
                        _ => text.push(c),
                    }
                }
                if !closed {
                    return Err(ScriptError::syntax("unterminated string").at(script, start_line));
                }
                tokens.push(Token { kind: TokenKind::Word, text, line: start_line, quoted: true });
            }
            _ => {
                let mut text = String::new();
                text.push(c);
                while let Some(&(_, next)) = chars.peek() {
                    if next.is_whitespace() || matches!(next, '{' | '}' | '[' | ']' | '"') {
                        break;
                    }
                    text.push(next);
                    chars.next();
                }
                tokens.push(Token { kind: TokenKind::Word, text, line, quoted: false });
            }
        }
    }

    Ok(tokens)
}

/// Whether a bare word is a statement keyword rather than a value.
fn is_keyword(text: &str) -> bool {
    text.starts_with('$') || text.starts_with("-$")
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Interpreter
// ═══════════════════════════════════════════════════════════════════════════════

/// Run a script against a session and project.  `base_dir` anchors `$include`
/// and `$OS` filesystem lookups.
pub(crate) fn run_script(
    session: &mut BuildSession,
    project: &mut Project,
    script: &str,
    source: &str,
    base_dir: &Path,
) -> Result<(), ScriptError> {
    let tokens = tokenize(source, script)?;
    let mut interp = Interp {
        session,
        project,
        tokens,
        pos: 0,
        script: script.to_string(),
        base_dir: base_dir.to_path_buf(),
        active_config: None,
        folder_path: Vec::new(),
        current_file: None,
        include_depth: 0,
    };
    let end = interp.tokens.len();
    interp.run_scope(end)
}

const MAX_INCLUDE_DEPTH: usize = 32;

struct Interp<'s> {
    session: &'s mut BuildSession,
    project: &'s mut Project,
    tokens: Vec<Token>,
    pos: usize,
    script: String,
    base_dir: PathBuf,
    /// Configuration name while inside a `$Configuration` replay.
    active_config: Option<String>,
    /// Folder names from the root down to the current `$Folder` nesting.
    folder_path: Vec<String>,
    /// File path while replaying a `$File { ... }` override block.
    current_file: Option<String>,
    include_depth: usize,
}

impl Interp<'_> {
    // ─── Token helpers ───────────────────────────────────────────────────

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect_word(&mut self, what: &str) -> Result<Token, ScriptError> {
        match self.advance() {
            Some(token) if token.kind == TokenKind::Word => Ok(token),
            Some(token) => Err(ScriptError::syntax(format!(
                "expected {what}, found '{}'",
                token.text
            ))
            .at(self.script.clone(), token.line)),
            None => Err(ScriptError::syntax(format!("expected {what}, found end of script"))
                .at(self.script.clone(), self.last_line())),
        }
    }

    fn expect_open_brace(&mut self) -> Result<usize, ScriptError> {
        match self.advance() {
            Some(token) if token.kind == TokenKind::OpenBrace => Ok(self.pos - 1),
            Some(token) => Err(ScriptError::syntax(format!(
                "expected '{{', found '{}'",
                token.text
            ))
            .at(self.script.clone(), token.line)),
            None => Err(ScriptError::syntax("expected '{', found end of script")
                .at(self.script.clone(), self.last_line())),
        }
    }

    /// Consume a trailing `[...]` conditional, if present.
    fn take_condition(&mut self) -> Option<Token> {
        if self.peek().is_some_and(|t| t.kind == TokenKind::Condition) {
            self.advance()
        } else {
            None
        }
    }

    fn last_line(&self) -> u32 {
        self.tokens.last().map(|t| t.line).unwrap_or(1)
    }

    /// Index of the `}` matching the `{` at `open`.
    fn find_block_end(&self, open: usize) -> Result<usize, ScriptError> {
        let mut depth = 0usize;
        for (i, token) in self.tokens.iter().enumerate().skip(open) {
            match token.kind {
                TokenKind::OpenBrace => depth += 1,
                TokenKind::CloseBrace => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(i);
                    }
                }
                _ => {}
            }
        }
        Err(ScriptError::syntax("unterminated '{' block")
            .at(self.script.clone(), self.tokens[open].line))
    }

    /// Consume `[cond] { ... }` and skip the whole block.
    fn skip_block(&mut self) -> Result<(), ScriptError> {
        let open = self.expect_open_brace()?;
        self.pos = self.find_block_end(open)? + 1;
        Ok(())
    }

    // ─── Evaluation helpers ──────────────────────────────────────────────

    /// Resolve macro references in a value token.
    fn expand(&self, text: &str, line: u32) -> Result<String, ScriptError> {
        self.session
            .macros
            .resolve_in_string(text, self.active_config.as_deref())
            .map_err(|e| e.at(self.script.clone(), line))
    }

    /// Evaluate a conditional expression.  Unknown symbols resolve to false
    /// unless they collide with a known macro name, which is a hard error —
    /// macros are forbidden inside boolean expressions.
    fn eval_condition(&self, text: &str, line: u32) -> Result<bool, ScriptError> {
        let conditionals = &self.session.conditionals;
        let macros = &self.session.macros;
        conditional::evaluate(text, &mut |name| match conditionals.resolve_symbol(name) {
            Some(value) => Ok(value),
            None => {
                if macros.has_name(name) {
                    Err(ScriptError::semantic(format!(
                        "macro '{name}' cannot be used in a conditional expression"
                    )))
                } else {
                    Ok(false)
                }
            }
        })
        .map_err(|e| e.at(self.script.clone(), line))
    }

    /// Evaluate an optional trailing conditional; `None` means true.
    fn condition_holds(&mut self) -> Result<bool, ScriptError> {
        match self.take_condition() {
            Some(cond) => self.eval_condition(&cond.text, cond.line),
            None => Ok(true),
        }
    }

    // ─── Scope interpreter (top level / $Project / $Folder bodies) ───────

    fn run_scope(&mut self, end: usize) -> Result<(), ScriptError> {
        while self.pos < end {
            let Some(token) = self.advance() else { break };
            match token.kind {
                TokenKind::Word => self.statement(&token)?,
                _ => {
                    return Err(ScriptError::syntax(format!(
                        "unexpected '{}'",
                        token.text
                    ))
                    .at(self.script.clone(), token.line));
                }
            }
        }
        Ok(())
    }

    fn statement(&mut self, keyword: &Token) -> Result<(), ScriptError> {
        let line = keyword.line;
        match keyword.text.to_ascii_lowercase().as_str() {
            "$project" => self.stmt_project(line),
            "$folder" => self.stmt_folder(line),
            "$file" => self.stmt_file(line),
            "-$file" => self.stmt_remove_file(),
            "$configuration" => self.stmt_configuration(line),
            "$macro" => self.stmt_macro(line),
            "$macrorequired" => self.stmt_macro_required(line),
            "$propertymacro" => self.stmt_property_macro(line),
            "$conditional" => self.stmt_conditional(line),
            "$include" => self.stmt_include(line),
            "$lib" => self.stmt_lib(LibKind::Static, false, line),
            "$implib" => self.stmt_lib(LibKind::Import, false, line),
            "$sharedlib" => self.stmt_lib(LibKind::Shared, false, line),
            "-$lib" => self.stmt_lib(LibKind::Static, true, line),
            "-$implib" => self.stmt_lib(LibKind::Import, true, line),
            "-$sharedlib" => self.stmt_lib(LibKind::Shared, true, line),
            "$libdependsonlib" => self.stmt_lib_depends(LibKind::Static, line),
            "$libdependsonimplib" => self.stmt_lib_depends(LibKind::Import, line),
            _ => Err(ScriptError::syntax(format!("unknown keyword '{}'", keyword.text))
                .at(self.script.clone(), line)),
        }
    }

    // ─── $Project ────────────────────────────────────────────────────────

    fn stmt_project(&mut self, _line: u32) -> Result<(), ScriptError> {
        let name = self.expect_word("project name")?;
        self.project.name = self.expand(&name.text, name.line)?;
        if !self.condition_holds()? {
            return self.skip_block();
        }
        let open = self.expect_open_brace()?;
        let end = self.find_block_end(open)?;
        let result = self.run_scope(end);
        result.map_err(|e| e.in_frame(format!("project {}", self.project.name)))?;
        self.pos = end + 1;
        Ok(())
    }

    // ─── $Folder ─────────────────────────────────────────────────────────

    fn stmt_folder(&mut self, _line: u32) -> Result<(), ScriptError> {
        let name = self.expect_word("folder name")?;
        let folder = self.expand(&name.text, name.line)?;
        if !self.condition_holds()? {
            return self.skip_block();
        }
        let open = self.expect_open_brace()?;
        let end = self.find_block_end(open)?;

        // Materialize the folder even when its block turns out to be empty.
        self.project.folder_at_mut(&self.folder_path).subfolder_mut(&folder);

        self.folder_path.push(folder);
        let result = self.run_scope(end);
        self.folder_path.pop();
        result?;
        self.pos = end + 1;
        Ok(())
    }

    // ─── $File / -$File ──────────────────────────────────────────────────

    fn stmt_file(&mut self, line: u32) -> Result<(), ScriptError> {
        let mut added: Vec<String> = Vec::new();
        let mut parsed_any = false;

        // One or more path tokens, each with its own optional trailing
        // conditional.  A false conditional removes the just-added entry; it
        // never applies retroactively to earlier entries.
        while self
            .peek()
            .is_some_and(|t| t.kind == TokenKind::Word && (t.quoted || !is_keyword(&t.text)))
        {
            let Some(token) = self.advance() else { break };
            parsed_any = true;
            let raw = self.expand(&token.text, token.line)?;
            let path = if raw.to_ascii_lowercase().contains("$os") {
                self.resolve_os_path(&raw, token.line)?
            } else {
                raw
            };

            self.project
                .folder_at_mut(&self.folder_path)
                .add_file(&path);
            added.push(path.clone());

            if let Some(cond) = self.take_condition() {
                if !self.eval_condition(&cond.text, cond.line)? {
                    self.project.folder_at_mut(&self.folder_path).remove_file(&path);
                    added.pop();
                }
            }
        }

        if !parsed_any {
            return Err(ScriptError::syntax("$File requires at least one path")
                .at(self.script.clone(), line));
        }

        // Optional override block, replayed once per file just added.
        if self.peek().map(|t| t.kind) == Some(TokenKind::OpenBrace) {
            let open = self.expect_open_brace()?;
            let end = self.find_block_end(open)?;
            for path in &added {
                self.current_file = Some(path.clone());
                self.pos = open + 1;
                let result = self.run_file_body(end);
                self.current_file = None;
                result?;
            }
            self.pos = end + 1;
        }

        Ok(())
    }

    fn stmt_remove_file(&mut self) -> Result<(), ScriptError> {
        while self
            .peek()
            .is_some_and(|t| t.kind == TokenKind::Word && (t.quoted || !is_keyword(&t.text)))
        {
            let Some(token) = self.advance() else { break };
            let path = self.expand(&token.text, token.line)?;
            let holds = self.condition_holds()?;
            if holds {
                self.project.remove_file(&path);
            }
        }
        Ok(())
    }

    /// Body of a `$File { ... }` block: only `$Configuration` statements.
    fn run_file_body(&mut self, end: usize) -> Result<(), ScriptError> {
        while self.pos < end {
            let Some(token) = self.advance() else { break };
            match token.kind {
                TokenKind::Word if token.text.eq_ignore_ascii_case("$configuration") => {
                    self.stmt_configuration(token.line)?;
                }
                _ => {
                    return Err(ScriptError::syntax(format!(
                        "only $Configuration is allowed inside a $File block, found '{}'",
                        token.text
                    ))
                    .at(self.script.clone(), token.line));
                }
            }
        }
        Ok(())
    }

    // ─── $Configuration ──────────────────────────────────────────────────

    fn stmt_configuration(&mut self, line: u32) -> Result<(), ScriptError> {
        // Zero or more configuration names; none means all root
        // configurations, replayed in their canonical, stable order.
        let mut names: Vec<String> = Vec::new();
        while self
            .peek()
            .is_some_and(|t| t.kind == TokenKind::Word && (t.quoted || !is_keyword(&t.text)))
        {
            let Some(token) = self.advance() else { break };
            names.push(self.expand(&token.text, token.line)?);
        }
        if names.is_empty() {
            names = ROOT_CONFIGURATIONS.iter().map(|s| s.to_string()).collect();
        }

        if !self.condition_holds()? {
            return self.skip_block();
        }
        let open = self.expect_open_brace()?;
        let end = self.find_block_end(open)?;

        for name in &names {
            if self.project.root_configuration(name).is_none() {
                return Err(ScriptError::semantic(format!(
                    "unknown configuration '{name}' (expected one of {})",
                    ROOT_CONFIGURATIONS.join(", ")
                ))
                .at(self.script.clone(), line));
            }

            self.active_config = Some(name.clone());
            self.pos = open + 1;
            let result = self
                .run_configuration_body(end)
                .map_err(|e| e.in_frame(format!("configuration {name}")));
            self.active_config = None;

            // Property macros live exactly as long as their owning
            // configuration block.
            self.session.macros.remove_property_macros(name);

            // An override block that set nothing leaves no file
            // configuration behind.
            if let Some(file) = self.current_file.clone() {
                self.project.prune_empty_file_configuration(&file, name);
            }

            result?;
        }

        self.pos = end + 1;
        Ok(())
    }

    fn run_configuration_body(&mut self, end: usize) -> Result<(), ScriptError> {
        while self.pos < end {
            let Some(token) = self.advance() else { break };
            if token.kind != TokenKind::Word {
                return Err(ScriptError::syntax(format!("unexpected '{}'", token.text))
                    .at(self.script.clone(), token.line));
            }

            if token.text.eq_ignore_ascii_case("$propertymacro") {
                self.stmt_property_macro(token.line)?;
                continue;
            }

            let Some(tool) = ToolKind::from_keyword(&token.text) else {
                return Err(ScriptError::syntax(format!(
                    "unknown tool block '{}' in configuration",
                    token.text
                ))
                .at(self.script.clone(), token.line));
            };

            if !self.condition_holds()? {
                self.skip_block()?;
                continue;
            }
            let open = self.expect_open_brace()?;
            let tool_end = self.find_block_end(open)?;
            self.run_tool_body(tool, tool_end)?;
            self.pos = tool_end + 1;
        }
        Ok(())
    }

    fn run_tool_body(&mut self, tool: ToolKind, end: usize) -> Result<(), ScriptError> {
        while self.pos < end {
            let Some(token) = self.advance() else { break };
            if token.kind != TokenKind::Word || !token.text.starts_with('$') {
                return Err(ScriptError::syntax(format!(
                    "expected a property name, found '{}'",
                    token.text
                ))
                .at(self.script.clone(), token.line));
            }

            let value = self.expect_word("property value")?;
            let raw = self.expand(&value.text, value.line)?;
            if !self.condition_holds()? {
                continue;
            }

            let Some(config) = self.active_config.clone() else {
                return Err(ScriptError::syntax(format!(
                    "property '{}' set outside a configuration block",
                    token.text
                ))
                .at(self.script.clone(), token.line));
            };
            let result = match &self.current_file {
                Some(file) => self.project.set_file_property(
                    file,
                    &config,
                    tool,
                    &token.text,
                    &raw,
                ),
                None => self
                    .project
                    .set_root_property(&config, tool, &token.text, &raw),
            };
            result.map_err(|e| e.at(self.script.clone(), token.line))?;
        }
        Ok(())
    }

    // ─── Macros & conditionals ───────────────────────────────────────────

    fn stmt_macro(&mut self, _line: u32) -> Result<(), ScriptError> {
        let name = self.expect_word("macro name")?;
        let value = self.expect_word("macro value")?;
        let resolved = self.expand(&value.text, value.line)?;
        if !self.condition_holds()? {
            return Ok(());
        }
        self.session
            .macros
            .set_script(&name.text, &resolved)
            .map_err(|e| e.at(self.script.clone(), name.line))
    }

    fn stmt_macro_required(&mut self, line: u32) -> Result<(), ScriptError> {
        let name = self.expect_word("macro name")?;
        let default = if self
            .peek()
            .is_some_and(|t| t.kind == TokenKind::Word && (t.quoted || !is_keyword(&t.text)))
        {
            self.advance()
        } else {
            None
        };
        if !self.condition_holds()? {
            return Ok(());
        }
        if self.session.macros.has_name(&name.text) {
            return Ok(());
        }
        match default {
            Some(value) => {
                let resolved = self.expand(&value.text, value.line)?;
                self.session
                    .macros
                    .set_script(&name.text, &resolved)
                    .map_err(|e| e.at(self.script.clone(), name.line))
            }
            None => Err(ScriptError::semantic(format!(
                "missing required macro '{}'",
                name.text
            ))
            .at(self.script.clone(), line)),
        }
    }

    fn stmt_property_macro(&mut self, line: u32) -> Result<(), ScriptError> {
        let name = self.expect_word("macro name")?;
        let value = self.expect_word("macro value")?;
        let resolved = self.expand(&value.text, value.line)?;
        if !self.condition_holds()? {
            return Ok(());
        }
        let Some(config) = self.active_config.clone() else {
            return Err(ScriptError::semantic(format!(
                "$PropertyMacro '{}' used outside a configuration block",
                name.text
            ))
            .at(self.script.clone(), line));
        };
        self.session
            .macros
            .set_property(&name.text, &resolved, &config)
            .map_err(|e| e.at(self.script.clone(), name.line))
    }

    fn stmt_conditional(&mut self, _line: u32) -> Result<(), ScriptError> {
        let name = self.expect_word("conditional name")?;
        let value = self.expect_word("conditional value")?;
        let resolved = self.expand(&value.text, value.line)?;
        if !self.condition_holds()? {
            return Ok(());
        }
        let defined = self.eval_condition(&resolved, value.line)?;
        self.session
            .conditionals
            .set(&name.text, defined, crate::conditional::ConditionalKind::Script)
            .map_err(|e| e.at(self.script.clone(), name.line))
    }

    // ─── $include ────────────────────────────────────────────────────────

    fn stmt_include(&mut self, line: u32) -> Result<(), ScriptError> {
        let path = self.expect_word("include path")?;
        let resolved = self.expand(&path.text, path.line)?;
        if !self.condition_holds()? {
            return Ok(());
        }
        if self.include_depth >= MAX_INCLUDE_DEPTH {
            return Err(ScriptError::semantic(format!(
                "include depth limit reached at '{resolved}'"
            ))
            .at(self.script.clone(), line));
        }

        let full = self.base_dir.join(&resolved);
        let source = std::fs::read_to_string(&full).map_err(|e| {
            ScriptError::io(format!("cannot read include '{}': {e}", full.display()))
                .at(self.script.clone(), line)
        })?;
        let tokens = tokenize(&source, &resolved)?;

        // Inline the included script depth-first, then restore the token
        // stream of the including script.
        let saved_tokens = std::mem::replace(&mut self.tokens, tokens);
        let saved_pos = std::mem::replace(&mut self.pos, 0);
        let saved_script = std::mem::replace(&mut self.script, resolved.clone());
        let saved_base = self.base_dir.clone();
        if let Some(parent) = full.parent() {
            self.base_dir = parent.to_path_buf();
        }
        self.include_depth += 1;

        let end = self.tokens.len();
        let result = self.run_scope(end);

        self.include_depth -= 1;
        self.tokens = saved_tokens;
        self.pos = saved_pos;
        self.script = saved_script;
        self.base_dir = saved_base;

        result.map_err(|e| e.in_frame(format!("include {resolved}")))
    }

    // ─── Libraries ───────────────────────────────────────────────────────

    fn stmt_lib(&mut self, kind: LibKind, remove: bool, _line: u32) -> Result<(), ScriptError> {
        while self
            .peek()
            .is_some_and(|t| t.kind == TokenKind::Word && (t.quoted || !is_keyword(&t.text)))
        {
            let Some(token) = self.advance() else { break };
            let name = self.expand(&token.text, token.line)?;
            let holds = self.condition_holds()?;
            if !holds {
                continue;
            }
            if remove {
                self.project.remove_library(&name, kind);
            } else {
                self.add_library_with_dependencies(&name, kind);
            }
        }
        Ok(())
    }

    /// Add a library plus, transitively, every dependency recorded for it.
    /// Already-present entries stop the recursion, so cyclic dependency
    /// declarations cannot loop.
    fn add_library_with_dependencies(&mut self, name: &str, kind: LibKind) {
        if !self.project.add_library(name, kind) {
            return;
        }
        let deps = self.session.lib_dependencies(name).to_vec();
        for dep in deps {
            self.add_library_with_dependencies(&dep.name, dep.kind);
        }
    }

    fn stmt_lib_depends(&mut self, kind: LibKind, _line: u32) -> Result<(), ScriptError> {
        let lib = self.expect_word("library name")?;
        let lib_name = self.expand(&lib.text, lib.line)?;
        let open = self.expect_open_brace()?;
        let end = self.find_block_end(open)?;

        while self.pos < end {
            let Some(token) = self.advance() else { break };
            if token.kind != TokenKind::Word {
                return Err(ScriptError::syntax(format!(
                    "expected a dependency name, found '{}'",
                    token.text
                ))
                .at(self.script.clone(), token.line));
            }
            let dep = self.expand(&token.text, token.line)?;
            self.session.record_lib_dependency(&lib_name, &dep, kind);
        }
        self.pos = end + 1;
        Ok(())
    }

    // ─── $OS path resolution ─────────────────────────────────────────────

    /// Resolve an embedded `$OS` placeholder in a file path via the platform
    /// family fallback chain, picking the first variant that exists on disk.
    /// Every other on-disk variant is added to the current folder pre-marked
    /// "excluded from build" so it stays visible in the generated project.
    fn resolve_os_path(&mut self, path: &str, line: u32) -> Result<String, ScriptError> {
        let platform = self
            .session
            .conditionals
            .platform()
            .map(|p| p.to_ascii_lowercase())
            .ok_or_else(|| {
                ScriptError::semantic("no target platform defined for $OS resolution")
                    .at(self.script.clone(), line)
            })?;

        let chain = os_fallback_chain(&platform);
        let chosen = chain
            .iter()
            .map(|token| substitute_os(path, token))
            .find(|candidate| self.base_dir.join(candidate).is_file());

        let Some(chosen) = chosen else {
            return Err(ScriptError::semantic(format!(
                "no $OS variant of '{path}' exists on disk (tried {})",
                chain.join(", ")
            ))
            .at(self.script.clone(), line));
        };

        for token in OS_TOKENS {
            let candidate = substitute_os(path, token);
            if candidate != chosen && self.base_dir.join(&candidate).is_file() {
                let file = self
                    .project
                    .folder_at_mut(&self.folder_path)
                    .add_file(&candidate);
                file.excluded_from_build = true;
            }
        }

        Ok(chosen)
    }
}

/// Every token a `$OS` placeholder can expand to, used to discover excluded
/// sibling variants.
const OS_TOKENS: &[&str] = &[
    "win32", "win64", "win", "osx32", "osx64", "osx", "linux32", "linux64", "linux", "posix",
    "any",
];

/// Fallback chain for a (lowercase) platform name: raw platform, narrower
/// platform variant, platform family, posix where applicable, then `any`.
fn os_fallback_chain(platform: &str) -> Vec<&'static str> {
    match platform {
        "win64" => vec!["win64", "win32", "win", "any"],
        "win32" => vec!["win32", "win", "any"],
        "osx64" => vec!["osx64", "osx32", "osx", "posix", "any"],
        "osx32" => vec!["osx32", "osx", "posix", "any"],
        "linux64" => vec!["linux64", "linux32", "linux", "posix", "any"],
        "linux32" => vec!["linux32", "linux", "posix", "any"],
        _ => vec!["any"],
    }
}

/// Replace the first (case-insensitive) `$os` occurrence in a path.
fn substitute_os(path: &str, token: &str) -> String {
    let lower = path.to_ascii_lowercase();
    match lower.find("$os") {
        Some(idx) => format!("{}{}{}", &path[..idx], token, &path[idx + 3..]),
        None => path.to_string(),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════════════════════
