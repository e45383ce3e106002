//! Named string macros and in-place `$NAME` substitution.
//!
//! Script text can reference macros anywhere a value is expected:
//!
//! - `$SRCDIR\public\tier0` — plain substitution
//! - `$OUTBINDIR\$OUTBINNAME.dll` — several references in one token
//! - `$OUTLIBNAME` defined per configuration (a *property* macro)
//!
//! Resolution scans left to right for `$` and substitutes the **longest**
//! registered macro name that matches at that position, so `$FOOBAR` is never
//! truncated to `$FOO` + `BAR`.  After a replacement the scan resumes at the
//! replacement's start, so a `$` introduced by the substituted value is
//! itself resolved (macro-of-macro indirection).  A substitution cap turns
//! self-referencing macro chains into a fatal error instead of a hang.

use crate::error::ScriptError;

/// Substitution cap per resolved string.
const MAX_SUBSTITUTIONS: usize = 1000;

// ═══════════════════════════════════════════════════════════════════════════════
//  Macro records
// ═══════════════════════════════════════════════════════════════════════════════

/// Lifetime / origin class of a macro.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacroKind {
    /// Seeded by the embedding application; persists for the whole run.
    System,
    /// Defined by `$Macro` statements; purged at the end of each project.
    Script,
    /// Defined by `$PropertyMacro` inside a configuration block; one entry
    /// per (name, configuration) pair, removed when the block closes.
    Property,
    /// Value computed by a resolver function at every reference.
    Dynamic,
}

/// A single macro table entry.
#[derive(Debug, Clone)]
pub struct Macro {
    pub name: String,
    pub value: String,
    pub kind: MacroKind,
    /// Owning configuration name; `Some` exactly when `kind` is `Property`.
    pub configuration: Option<String>,
    /// Value resolver; `Some` exactly when `kind` is `Dynamic`.
    resolver: Option<fn() -> String>,
}

// ═══════════════════════════════════════════════════════════════════════════════
//  MacroTable
// ═══════════════════════════════════════════════════════════════════════════════

/// Owns all macros for one build session.
///
/// The table may hold multiple `property` macros sharing one name (one per
/// configuration); they are never collapsed into a single entry.  A name
/// bound as `property` cannot be rebound as a plain macro and vice versa.
#[derive(Debug, Clone, Default)]
pub struct MacroTable {
    macros: Vec<Macro>,
}

impl MacroTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// First entry with the given name, regardless of kind/configuration.
    pub fn find(&self, name: &str) -> Option<&Macro> {
        self.macros.iter().find(|m| m.name == name)
    }

    /// Whether any entry with the given name exists.
    pub fn has_name(&self, name: &str) -> bool {
        self.find(name).is_some()
    }

    /// The value a `$name` reference would produce under the given active
    /// configuration, or `None` when the name is unregistered.
    pub fn value_of(&self, name: &str, active_config: Option<&str>) -> Option<String> {
        let first = self.find(name)?;
        match first.kind {
            MacroKind::Property => {
                let config = active_config?;
                Some(
                    self.macros
                        .iter()
                        .find(|m| m.name == name && m.configuration.as_deref() == Some(config))
                        .map(|m| m.value.clone())
                        .unwrap_or_default(),
                )
            }
            MacroKind::Dynamic => first.resolver.map(|r| r()),
            _ => Some(first.value.clone()),
        }
    }

    // ─── Setters ─────────────────────────────────────────────────────────

    /// Register or update a system macro.  Fails when the name is already
    /// bound as a property macro.
    pub fn set_system(&mut self, name: &str, value: &str) -> Result<(), ScriptError> {
        self.reject_property_bound(name)?;
        match self.macros.iter_mut().find(|m| m.name == name) {
            Some(m) => {
                m.value = value.to_string();
                m.kind = MacroKind::System;
                m.resolver = None;
            }
            None => self.macros.push(Macro {
                name: name.to_string(),
                value: value.to_string(),
                kind: MacroKind::System,
                configuration: None,
                resolver: None,
            }),
        }
        Ok(())
    }

    /// Register or update a dynamic macro whose value is computed at every
    /// reference.  Dynamic macros share the system lifetime.
    pub fn set_dynamic(&mut self, name: &str, resolver: fn() -> String) -> Result<(), ScriptError> {
        self.reject_property_bound(name)?;
        match self.macros.iter_mut().find(|m| m.name == name) {
            Some(m) => {
                m.kind = MacroKind::Dynamic;
                m.resolver = Some(resolver);
                m.value.clear();
            }
            None => self.macros.push(Macro {
                name: name.to_string(),
                value: String::new(),
                kind: MacroKind::Dynamic,
                configuration: None,
                resolver: Some(resolver),
            }),
        }
        Ok(())
    }

    /// Register or update a script macro.  Fails when the name is already
    /// bound as a system/dynamic macro (scripts cannot silently overwrite
    /// those) or as a property macro.
    pub fn set_script(&mut self, name: &str, value: &str) -> Result<(), ScriptError> {
        if let Some(existing) = self.find(name) {
            match existing.kind {
                MacroKind::System | MacroKind::Dynamic => {
                    return Err(ScriptError::semantic(format!(
                        "macro '{name}' is a system macro and cannot be redefined by a script"
                    )));
                }
                MacroKind::Property => {
                    return Err(ScriptError::semantic(format!(
                        "macro '{name}' is a property macro and cannot be rebound as a plain macro"
                    )));
                }
                MacroKind::Script => {}
            }
        }
        match self.macros.iter_mut().find(|m| m.name == name) {
            Some(m) => m.value = value.to_string(),
            None => self.macros.push(Macro {
                name: name.to_string(),
                value: value.to_string(),
                kind: MacroKind::Script,
                configuration: None,
                resolver: None,
            }),
        }
        Ok(())
    }

    /// Register or update a property macro for one configuration.  Entries
    /// for distinct configurations are genuinely separate; re-setting the
    /// same (name, configuration) pair updates in place.
    pub fn set_property(
        &mut self,
        name: &str,
        value: &str,
        configuration: &str,
    ) -> Result<(), ScriptError> {
        if let Some(existing) = self.find(name) {
            if existing.kind != MacroKind::Property {
                return Err(ScriptError::semantic(format!(
                    "macro '{name}' is already bound as a plain macro and cannot be rebound as a property macro"
                )));
            }
        }
        match self
            .macros
            .iter_mut()
            .find(|m| m.name == name && m.configuration.as_deref() == Some(configuration))
        {
            Some(m) => m.value = value.to_string(),
            None => self.macros.push(Macro {
                name: name.to_string(),
                value: value.to_string(),
                kind: MacroKind::Property,
                configuration: Some(configuration.to_string()),
                resolver: None,
            }),
        }
        Ok(())
    }

    fn reject_property_bound(&self, name: &str) -> Result<(), ScriptError> {
        if self.find(name).is_some_and(|m| m.kind == MacroKind::Property) {
            return Err(ScriptError::semantic(format!(
                "macro '{name}' is bound as a property macro and cannot be rebound as a plain macro"
            )));
        }
        Ok(())
    }

    // ─── Scoping ─────────────────────────────────────────────────────────

    /// Remove every non-system entry.  Called once per completed top-level
    /// project so script state never leaks into the next project.
    pub fn purge_script_macros(&mut self) {
        self.macros
            .retain(|m| matches!(m.kind, MacroKind::System | MacroKind::Dynamic));
    }

    /// Remove every property macro owned by the given configuration.  Called
    /// when a configuration block closes.
    pub fn remove_property_macros(&mut self, configuration: &str) {
        self.macros.retain(|m| {
            !(m.kind == MacroKind::Property
                && m.configuration.as_deref() == Some(configuration))
        });
    }

    // ─── Resolution ──────────────────────────────────────────────────────

    /// Resolve every macro reference inside `s`.
    ///
    /// `active_config` selects among same-named property macros; referencing
    /// a property macro with no active configuration is a fatal error.
    /// Unknown `$tokens` are left untouched.
    pub fn resolve_in_string(
        &self,
        s: &str,
        active_config: Option<&str>,
    ) -> Result<String, ScriptError> {
        if !s.contains('$') {
            return Ok(s.to_string());
        }

        // Rescanning substituted text allows macro-of-macro chains, so a
        // self-referential definition could loop forever without a cap.
        let mut substitutions = 0usize;

        let mut out = s.to_string();
        let mut i = 0;
        while i < out.len() {
            if out.as_bytes()[i] != b'$' {
                // '$' is ASCII, so scanning byte-wise never splits a UTF-8
                // sequence at a substitution point.
                i += 1;
                continue;
            }

            // Maximal identifier token after the '$'.
            let token_start = i + 1;
            let mut token_end = token_start;
            while token_end < out.len() {
                let b = out.as_bytes()[token_end];
                if b.is_ascii_alphanumeric() || b == b'_' {
                    token_end += 1;
                } else {
                    break;
                }
            }
            if token_end == token_start {
                i += 1;
                continue;
            }

            // Longest registered name that is a prefix of the token.  A name
            // equal to the full token wins automatically.
            let token = &out[token_start..token_end];
            let mut matched: Option<(usize, String)> = None;
            for len in (1..=token.len()).rev() {
                let candidate = &token[..len];
                if let Some(m) = self.find(candidate) {
                    if m.kind == MacroKind::Property && active_config.is_none() {
                        return Err(ScriptError::semantic(format!(
                            "property macro '{candidate}' used outside a configuration block"
                        )));
                    }
                    let value = self
                        .value_of(candidate, active_config)
                        .unwrap_or_default();
                    matched = Some((len, value));
                    break;
                }
            }

            match matched {
                Some((len, value)) => {
                    substitutions += 1;
                    if substitutions > MAX_SUBSTITUTIONS {
                        return Err(ScriptError::semantic(format!(
                            "macro expansion of '{s}' did not terminate"
                        )));
                    }
                    out.replace_range(i..token_start + len, &value);
                    // Resume at the replacement's start so substituted '$'
                    // references are themselves resolved.
                }
                None => i = token_end,
            }
        }

        Ok(out)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    fn table(pairs: &[(&str, &str)]) -> MacroTable {
        let mut t = MacroTable::new();
        for (name, value) in pairs {
            t.set_script(name, value).unwrap();
        }
        t
    }

    // ── Resolution ───────────────────────────────────────────────────────

    #[test]
    fn no_dollar_is_identity() {
        let t = table(&[("FOO", "a")]);
        assert_eq!(t.resolve_in_string("plain text", None).unwrap(), "plain text");
    }

    #[test]
    fn simple_substitution() {
        let t = table(&[("SRCDIR", "..\\..")]);
        assert_eq!(
            t.resolve_in_string("$SRCDIR\\public", None).unwrap(),
            "..\\..\\public"
        );
    }

    #[test]
    fn registered_name_resolves_to_value() {
        let t = table(&[("OUTBINNAME", "server")]);
        assert_eq!(t.resolve_in_string("$OUTBINNAME", None).unwrap(), "server");
    }

    #[test]
    fn longest_match_wins() {
        let t = table(&[("FOO", "a"), ("FOOBAR", "b")]);
        assert_eq!(t.resolve_in_string("$FOOBAR", None).unwrap(), "b");
        assert_eq!(t.resolve_in_string("$FOO", None).unwrap(), "a");
    }

    #[test]
    fn longer_identifier_not_truncated_by_shorter_macro() {
        // $FOOD contains the registered prefix FOO; prefix matching applies
        // because the table has no entry for the full token.
        let t = table(&[("FOO", "a")]);
        assert_eq!(t.resolve_in_string("$FOOD", None).unwrap(), "aD");
    }

    #[test]
    fn multiple_references_in_one_string() {
        let t = table(&[("A", "1"), ("B", "2")]);
        assert_eq!(t.resolve_in_string("$A-$B-$A", None).unwrap(), "1-2-1");
    }

    #[test]
    fn macro_of_macro_indirection() {
        let t = table(&[("INNER", "deep"), ("OUTER", "$INNER\\dir")]);
        assert_eq!(t.resolve_in_string("$OUTER", None).unwrap(), "deep\\dir");
    }

    #[test]
    fn unknown_reference_left_untouched() {
        let t = table(&[("FOO", "a")]);
        assert_eq!(t.resolve_in_string("$NOPE", None).unwrap(), "$NOPE");
    }

    #[test]
    fn bare_dollar_left_untouched() {
        let t = table(&[("FOO", "a")]);
        assert_eq!(t.resolve_in_string("cost: 5$", None).unwrap(), "cost: 5$");
    }

    #[test]
    fn self_referencing_macro_is_fatal_not_a_hang() {
        let t = table(&[("LOOP", "$LOOP")]);
        let err = t.resolve_in_string("$LOOP", None).unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::Semantic);
        assert!(err.message.contains("did not terminate"));
    }

    #[test]
    fn dynamic_macro_resolves_via_function() {
        let mut t = MacroTable::new();
        t.set_dynamic("QUOTE", || "\"".to_string()).unwrap();
        assert_eq!(t.resolve_in_string("$QUOTE-x-$QUOTE", None).unwrap(), "\"-x-\"");
    }

    // ── Property macros ──────────────────────────────────────────────────

    #[test]
    fn property_macro_per_configuration() {
        let mut t = MacroTable::new();
        t.set_property("OUTLIBNAME", "tier0_debug", "Debug").unwrap();
        t.set_property("OUTLIBNAME", "tier0", "Release").unwrap();
        assert_eq!(
            t.resolve_in_string("$OUTLIBNAME", Some("Debug")).unwrap(),
            "tier0_debug"
        );
        assert_eq!(
            t.resolve_in_string("$OUTLIBNAME", Some("Release")).unwrap(),
            "tier0"
        );
    }

    #[test]
    fn property_macro_outside_configuration_is_fatal() {
        let mut t = MacroTable::new();
        t.set_property("OUTLIBNAME", "tier0", "Release").unwrap();
        let err = t.resolve_in_string("$OUTLIBNAME", None).unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::Semantic);
        assert!(err.message.contains("outside a configuration block"));
    }

    #[test]
    fn property_macro_missing_for_active_config_is_empty() {
        let mut t = MacroTable::new();
        t.set_property("OUTLIBNAME", "tier0", "Release").unwrap();
        assert_eq!(t.resolve_in_string("x$OUTLIBNAME", Some("Debug")).unwrap(), "x");
    }

    #[test]
    fn property_reset_updates_in_place() {
        let mut t = MacroTable::new();
        t.set_property("X", "1", "Debug").unwrap();
        t.set_property("X", "2", "Debug").unwrap();
        assert_eq!(t.resolve_in_string("$X", Some("Debug")).unwrap(), "2");
        // Still exactly one Debug entry.
        assert_eq!(
            t.macros.iter().filter(|m| m.name == "X").count(),
            1
        );
    }

    // ── Kind exclusivity ─────────────────────────────────────────────────

    #[test]
    fn property_name_cannot_become_plain_macro() {
        let mut t = MacroTable::new();
        t.set_property("X", "1", "Debug").unwrap();
        let err = t.set_script("X", "2").unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::Semantic);
    }

    #[test]
    fn plain_name_cannot_become_property_macro() {
        let mut t = MacroTable::new();
        t.set_script("X", "1").unwrap();
        let err = t.set_property("X", "2", "Debug").unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::Semantic);
    }

    #[test]
    fn script_cannot_overwrite_system_macro() {
        let mut t = MacroTable::new();
        t.set_system("SRCDIR", "..").unwrap();
        let err = t.set_script("SRCDIR", "elsewhere").unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::Semantic);
        assert!(err.message.contains("system macro"));
    }

    #[test]
    fn script_reset_updates_value() {
        let mut t = MacroTable::new();
        t.set_script("X", "1").unwrap();
        t.set_script("X", "2").unwrap();
        assert_eq!(t.resolve_in_string("$X", None).unwrap(), "2");
    }

    // ── Scoping ──────────────────────────────────────────────────────────

    #[test]
    fn purge_keeps_system_and_dynamic_only() {
        let mut t = MacroTable::new();
        t.set_system("SRCDIR", "..").unwrap();
        t.set_dynamic("QUOTE", || "\"".to_string()).unwrap();
        t.set_script("GAME", "hl2").unwrap();
        t.set_property("OUT", "x", "Debug").unwrap();

        t.purge_script_macros();

        assert!(t.has_name("SRCDIR"));
        assert!(t.has_name("QUOTE"));
        assert!(!t.has_name("GAME"));
        assert!(!t.has_name("OUT"));
    }

    #[test]
    fn remove_property_macros_is_per_configuration() {
        let mut t = MacroTable::new();
        t.set_property("OUT", "d", "Debug").unwrap();
        t.set_property("OUT", "r", "Release").unwrap();

        t.remove_property_macros("Debug");

        assert_eq!(t.resolve_in_string("x$OUT", Some("Debug")).unwrap(), "x");
        assert_eq!(t.resolve_in_string("$OUT", Some("Release")).unwrap(), "r");
    }
}
