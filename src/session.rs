//! Session context owning all cross-project script state.
//!
//! A [`BuildSession`] is created once per tool invocation and processes any
//! number of project scripts.  Conditionals and macros live on the session;
//! each processed script gets a snapshot of the conditional registry and a
//! clean script-macro table, so no script can leak state into the next one.

use std::collections::HashMap;
use std::path::Path;

use crate::conditional::ConditionalRegistry;
use crate::error::ScriptError;
use crate::macros::MacroTable;
use crate::project::{LibKind, Library, Project};
use crate::script;

fn quote() -> String {
    "\"".to_string()
}

/// All mutable state shared across the scripts of one tool run.
pub struct BuildSession {
    pub conditionals: ConditionalRegistry,
    pub macros: MacroTable,
    /// Library dependency edges declared by `$LibDependsOnLib` and friends,
    /// keyed by the depending library's name.  Session-lifetime, so a shared
    /// dependency script only has to be included once.
    lib_deps: HashMap<String, Vec<Library>>,
}

impl BuildSession {
    /// New session targeting the given platform, with the built-in system
    /// macros already defined.
    pub fn new(platform: &str) -> Result<Self, ScriptError> {
        let conditionals = ConditionalRegistry::with_platform(platform)?;
        let mut macros = MacroTable::new();
        macros.set_system("PLATFORM", &platform.to_ascii_lowercase())?;
        macros.set_dynamic("QUOTE", quote)?;
        Ok(Self { conditionals, macros, lib_deps: HashMap::new() })
    }

    // ─── Games ───────────────────────────────────────────────────────────

    /// Register a game name so scripts can test for it.  Game conditionals
    /// only evaluate true while their game is the active one.
    pub fn define_game(&mut self, name: &str) {
        self.conditionals
            .set_with_override(name, true, crate::conditional::ConditionalKind::Game);
    }

    /// Select the active game, or clear the selection with `None`.
    pub fn select_game(&mut self, name: Option<&str>) {
        self.conditionals.set_active_game(name);
    }

    // ─── Library dependencies ────────────────────────────────────────────

    pub(crate) fn record_lib_dependency(&mut self, lib: &str, dep: &str, kind: LibKind) {
        let deps = self.lib_deps.entry(lib.to_string()).or_default();
        let entry = Library { name: dep.to_string(), kind };
        if !deps.contains(&entry) {
            deps.push(entry);
        }
    }

    pub(crate) fn lib_dependencies(&self, lib: &str) -> &[Library] {
        self.lib_deps.get(lib).map(Vec::as_slice).unwrap_or(&[])
    }

    // ─── Script processing ───────────────────────────────────────────────

    /// Process one script source into a finished project.
    ///
    /// The project's initial name is the script name's stem; a `$Project`
    /// statement inside the script overrides it.  Conditional state is
    /// snapshotted around the run and script macros are purged afterwards,
    /// on error as well as on success.
    pub fn process_script(
        &mut self,
        name: &str,
        source: &str,
        base_dir: &Path,
    ) -> Result<Project, ScriptError> {
        let stem = Path::new(name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(name);
        let mut project = Project::new(stem)?;

        self.conditionals.save();
        let result = script::run_script(self, &mut project, name, source, base_dir);
        self.conditionals.restore();
        self.macros.purge_script_macros();

        result.map(|()| project)
    }

    /// Read a script from disk and process it.  `$include` and `$OS` lookups
    /// resolve relative to the script's own directory.
    pub fn process_file(&mut self, path: impl AsRef<Path>) -> Result<Project, ScriptError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| {
            ScriptError::io(format!("cannot read script '{}': {e}", path.display()))
        })?;
        let name = path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("script")
            .to_string();
        let base_dir = path.parent().unwrap_or(Path::new("."));
        self.process_script(&name, &source, base_dir)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn session() -> BuildSession {
        BuildSession::new("linux64").unwrap()
    }

    #[test]
    fn new_session_seeds_platform_state() {
        let s = session();
        assert_eq!(s.conditionals.platform(), Some("LINUX64"));
        assert_eq!(s.macros.value_of("PLATFORM", None), Some("linux64".into()));
        assert_eq!(s.macros.value_of("QUOTE", None), Some("\"".into()));
    }

    #[test]
    fn project_named_after_script_stem() {
        let mut s = session();
        let project = s.process_script("engine.pgc", "", Path::new(".")).unwrap();
        assert_eq!(project.name, "engine");
    }

    #[test]
    fn project_statement_overrides_stem_name() {
        let mut s = session();
        let project = s
            .process_script("engine.pgc", "$Project \"engine_client\" { }", Path::new("."))
            .unwrap();
        assert_eq!(project.name, "engine_client");
    }

    #[test]
    fn script_macros_do_not_leak_between_scripts() {
        let mut s = session();
        s.process_script("first.pgc", "$Macro SRCDIR \"..\"\n", Path::new("."))
            .unwrap();
        assert!(!s.macros.has_name("SRCDIR"));

        let project = s
            .process_script("second.pgc", "$File \"$SRCDIR/a.cpp\"\n", Path::new("."))
            .unwrap();
        assert!(project.find_file("$SRCDIR/a.cpp").is_some());
    }

    #[test]
    fn script_conditionals_do_not_leak_between_scripts() {
        let mut s = session();
        s.process_script("first.pgc", "$Conditional TOGGLE 1\n", Path::new("."))
            .unwrap();

        let project = s
            .process_script("second.pgc", "$File \"a.cpp\" [$TOGGLE]\n", Path::new("."))
            .unwrap();
        assert!(project.find_file("a.cpp").is_none());
    }

    #[test]
    fn state_restored_after_failed_script() {
        let mut s = session();
        let err = s
            .process_script(
                "bad.pgc",
                "$Conditional TOGGLE 1\n$Macro M \"v\"\n$Bogus\n",
                Path::new("."),
            )
            .unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::Syntax);
        assert!(!s.macros.has_name("M"));
        assert!(s.conditionals.find("TOGGLE").is_none_or(|c| !c.defined));
    }

    #[test]
    fn system_macros_survive_the_purge() {
        let mut s = session();
        s.process_script("p.pgc", "", Path::new(".")).unwrap();
        assert!(s.macros.has_name("PLATFORM"));
        assert!(s.macros.has_name("QUOTE"));
    }

    #[test]
    fn lib_dependencies_persist_across_scripts() {
        let mut s = session();
        s.process_script("deps.pgc", "$LibDependsOnLib vgui { tier0 }\n", Path::new("."))
            .unwrap();

        let project = s
            .process_script("game.pgc", "$Lib \"vgui\"\n", Path::new("."))
            .unwrap();
        let names: Vec<&str> = project.libraries.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["vgui", "tier0"]);
    }

    #[test]
    fn game_conditional_tracks_active_game() {
        let mut s = session();
        s.define_game("HL2");
        s.define_game("PORTAL");

        s.select_game(Some("HL2"));
        let project = s
            .process_script(
                "g.pgc",
                "$File \"hl2.cpp\" [$HL2]\n$File \"portal.cpp\" [$PORTAL]\n",
                Path::new("."),
            )
            .unwrap();
        assert!(project.find_file("hl2.cpp").is_some());
        assert!(project.find_file("portal.cpp").is_none());

        s.select_game(Some("PORTAL"));
        let project = s
            .process_script("g.pgc", "$File \"portal.cpp\" [$PORTAL]\n", Path::new("."))
            .unwrap();
        assert!(project.find_file("portal.cpp").is_some());
    }
}
