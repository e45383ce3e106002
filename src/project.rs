//! Project data model with cascading property resolution.
//!
//! One [`Project`] owns the full result of processing a script: a tree of
//! folders and files, exactly two *root* configurations ("Debug"/"Release"),
//! per-file configuration overrides, and typed property values held by
//! *tools* (compiler, linker, librarian, …).
//!
//! The central invariant is the two-level cascade implemented by
//! [`Project::resolved_property`]: a value is looked up in the file
//! configuration's tool first and falls back to the root configuration's
//! tool, so a file can override a single property without restating the rest
//! of its configuration, and a generator never needs to know which level
//! supplied a value.

use std::collections::BTreeMap;

use crate::error::ScriptError;

// ═══════════════════════════════════════════════════════════════════════════════
//  Tools
// ═══════════════════════════════════════════════════════════════════════════════

/// The closed set of tool slots a configuration can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    General,
    Compiler,
    Linker,
    Librarian,
    Resources,
    Manifest,
    CustomBuildStep,
    PreBuildEvent,
    PreLinkEvent,
    PostBuildEvent,
}

/// Tool slots of a freshly created root configuration.
const ROOT_TOOLS: &[ToolKind] = &[
    ToolKind::General,
    ToolKind::Compiler,
    ToolKind::Linker,
    ToolKind::Librarian,
    ToolKind::Resources,
    ToolKind::Manifest,
    ToolKind::CustomBuildStep,
    ToolKind::PreBuildEvent,
    ToolKind::PreLinkEvent,
    ToolKind::PostBuildEvent,
];

/// Tool slots of a per-file configuration override.
const FILE_TOOLS: &[ToolKind] = &[
    ToolKind::General,
    ToolKind::Compiler,
    ToolKind::Resources,
    ToolKind::CustomBuildStep,
];

impl ToolKind {
    /// The block keyword that opens this tool inside a `$Configuration`
    /// block.
    pub fn keyword(self) -> &'static str {
        match self {
            ToolKind::General => "$General",
            ToolKind::Compiler => "$Compiler",
            ToolKind::Linker => "$Linker",
            ToolKind::Librarian => "$Librarian",
            ToolKind::Resources => "$Resources",
            ToolKind::Manifest => "$Manifest",
            ToolKind::CustomBuildStep => "$CustomBuildStep",
            ToolKind::PreBuildEvent => "$PreBuildEvent",
            ToolKind::PreLinkEvent => "$PreLinkEvent",
            ToolKind::PostBuildEvent => "$PostBuildEvent",
        }
    }

    /// Map a block keyword (case-insensitive) back to its tool.
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        ROOT_TOOLS
            .iter()
            .copied()
            .find(|t| t.keyword().eq_ignore_ascii_case(keyword))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Property schema
// ═══════════════════════════════════════════════════════════════════════════════

/// Value type of a property definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyKind {
    Boolean,
    String,
    Integer,
    /// Closed vocabulary of `(token, output)` pairs; the token is what the
    /// script writes, the output is what generators emit.
    Ordinal(&'static [(&'static str, &'static str)]),
    /// Accepted in old scripts but meaningless; writing it is an error.
    Ignored,
    /// Removed from the toolchain; writing it is an error.
    Deprecated,
}

/// A single property definition inside a tool's table.
#[derive(Debug, Clone, Copy)]
pub struct PropertyDef {
    pub name: &'static str,
    pub kind: PropertyKind,
}

const CONFIGURATION_TYPES: &[(&str, &str)] = &[
    ("Application (.exe)", "1"),
    ("Dynamic Library (.dll)", "2"),
    ("Static Library (.lib)", "4"),
    ("Utility", "10"),
];

const OPTIMIZATION: &[(&str, &str)] = &[
    ("Disabled", "0"),
    ("Minimize Size", "1"),
    ("Maximize Speed", "2"),
    ("Full Optimization", "3"),
];

const WARNING_LEVELS: &[(&str, &str)] = &[
    ("Off", "0"),
    ("Level 1", "1"),
    ("Level 2", "2"),
    ("Level 3", "3"),
    ("Level 4", "4"),
    ("EnableAllWarnings", "5"),
];

const RUNTIME_LIBRARIES: &[(&str, &str)] = &[
    ("Multi-threaded", "0"),
    ("Multi-threaded Debug", "1"),
    ("Multi-threaded DLL", "2"),
    ("Multi-threaded Debug DLL", "3"),
];

const SUB_SYSTEMS: &[(&str, &str)] = &[("Console", "1"), ("Windows", "2")];

/// Static name→definition tables per tool, built once and validated for
/// duplicate names at construction.
#[derive(Debug, Clone)]
pub struct PropertySchema {
    tools: Vec<(ToolKind, &'static [PropertyDef])>,
}

macro_rules! defs {
    ($(($name:literal, $kind:expr)),* $(,)?) => {
        &[ $( PropertyDef { name: $name, kind: $kind } ),* ]
    };
}

impl PropertySchema {
    /// Build the built-in schema.  Fails when a tool table declares the same
    /// property name twice.
    pub fn builtin() -> Result<Self, ScriptError> {
        use PropertyKind::*;

        let tools: Vec<(ToolKind, &'static [PropertyDef])> = vec![
            (ToolKind::General, defs![
                ("ConfigurationType", Ordinal(CONFIGURATION_TYPES)),
                ("OutputDirectory", String),
                ("IntermediateDirectory", String),
                ("TargetName", String),
                ("ExcludedFromBuild", Boolean),
            ]),
            (ToolKind::Compiler, defs![
                ("AdditionalIncludeDirectories", String),
                ("PreprocessorDefinitions", String),
                ("Optimization", Ordinal(OPTIMIZATION)),
                ("WarningLevel", Ordinal(WARNING_LEVELS)),
                ("RuntimeLibrary", Ordinal(RUNTIME_LIBRARIES)),
                ("TreatWarningsAsErrors", Boolean),
                ("MultiProcessorCompilation", Boolean),
                ("StructMemberAlignment", Integer),
                ("PrecompiledHeaderFile", String),
                ("MinimalRebuild", Deprecated),
                ("BrowseInformation", Ignored),
            ]),
            (ToolKind::Linker, defs![
                ("AdditionalDependencies", String),
                ("AdditionalLibraryDirectories", String),
                ("OutputFile", String),
                ("ImportLibrary", String),
                ("GenerateDebugInformation", Boolean),
                ("SubSystem", Ordinal(SUB_SYSTEMS)),
                ("StackReserveSize", Integer),
                ("BaseAddress", Integer),
            ]),
            (ToolKind::Librarian, defs![
                ("OutputFile", String),
                ("AdditionalOptions", String),
                ("LinkLibraryDependencies", Boolean),
            ]),
            (ToolKind::Resources, defs![
                ("PreprocessorDefinitions", String),
                ("AdditionalIncludeDirectories", String),
                ("Culture", Integer),
            ]),
            (ToolKind::Manifest, defs![
                ("AdditionalManifestFiles", String),
                ("EmbedManifest", Boolean),
            ]),
            (ToolKind::CustomBuildStep, defs![
                ("CommandLine", String),
                ("Description", String),
                ("Outputs", String),
                ("AdditionalDependencies", String),
            ]),
            (ToolKind::PreBuildEvent, defs![
                ("CommandLine", String),
                ("Description", String),
                ("ExcludedFromBuild", Boolean),
            ]),
            (ToolKind::PreLinkEvent, defs![
                ("CommandLine", String),
                ("Description", String),
                ("ExcludedFromBuild", Boolean),
            ]),
            (ToolKind::PostBuildEvent, defs![
                ("CommandLine", String),
                ("Description", String),
                ("ExcludedFromBuild", Boolean),
            ]),
        ];

        for (tool, table) in &tools {
            for (i, def) in table.iter().enumerate() {
                if table[..i].iter().any(|d| d.name.eq_ignore_ascii_case(def.name)) {
                    return Err(ScriptError::semantic(format!(
                        "property schema for {} declares '{}' twice",
                        tool.keyword(),
                        def.name
                    )));
                }
            }
        }

        Ok(Self { tools })
    }

    /// Look up a property definition by tool and (case-insensitive) name.
    /// A leading `$` on the name is accepted and stripped.
    pub fn find(&self, tool: ToolKind, name: &str) -> Option<&PropertyDef> {
        let name = name.strip_prefix('$').unwrap_or(name);
        self.tools
            .iter()
            .find(|(t, _)| *t == tool)
            .and_then(|(_, table)| table.iter().find(|d| d.name.eq_ignore_ascii_case(name)))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Token parsing helpers
// ═══════════════════════════════════════════════════════════════════════════════

/// Parse a boolean property token.
///
/// Accepts `yes/no`, `on/off`, `true/false`, `enabled/disabled`, `1/0`
/// (case-insensitive).  Any other token is a syntax error unless
/// `assume_true` is set, in which case it parses as `true`.
pub fn parse_boolean(token: &str, assume_true: bool) -> Result<bool, ScriptError> {
    match token.to_ascii_lowercase().as_str() {
        "yes" | "on" | "true" | "enabled" | "1" => Ok(true),
        "no" | "off" | "false" | "disabled" | "0" => Ok(false),
        _ if assume_true => Ok(true),
        _ => Err(ScriptError::syntax(format!("bad boolean value '{token}'"))),
    }
}

/// Parse an integer property token in decimal or `0x` hex.
///
/// The token must round-trip losslessly back to the same textual form:
/// `"007"` parses to 7 but would be emitted as `"7"`, silently changing
/// meaning, so it is rejected.
pub fn parse_integer(token: &str) -> Result<i64, ScriptError> {
    if let Some(hex) = token.strip_prefix("0x").or_else(|| token.strip_prefix("0X")) {
        let value = i64::from_str_radix(hex, 16)
            .map_err(|_| ScriptError::syntax(format!("bad integer value '{token}'")))?;
        if format!("{value:x}") != hex.to_ascii_lowercase() {
            return Err(ScriptError::syntax(format!(
                "integer value '{token}' does not round-trip (would be rewritten as '{value:#x}')"
            )));
        }
        Ok(value)
    } else {
        let value: i64 = token
            .parse()
            .map_err(|_| ScriptError::syntax(format!("bad integer value '{token}'")))?;
        if value.to_string() != token {
            return Err(ScriptError::syntax(format!(
                "integer value '{token}' does not round-trip (would be rewritten as '{value}')"
            )));
        }
        Ok(value)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Property state & values
// ═══════════════════════════════════════════════════════════════════════════════

/// A property value stored inside a tool.  Insertion order is the position
/// in the owning tool's state list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyState {
    /// Canonical definition name (no `$` prefix).
    pub name: String,
    /// Stored value: the string itself, a normalized `1`/`0` for booleans,
    /// the canonical decimal/hex text for integers, the resolved output
    /// string for ordinals.
    pub value: String,
    /// The user-facing ordinal token, kept alongside the resolved output for
    /// list-typed properties.
    pub ordinal: Option<String>,
}

/// An effective property value as seen by a generator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyValue {
    String(String),
    Boolean(bool),
    Integer(i64),
    Ordinal { token: String, output: String },
}

impl PropertyValue {
    fn empty_default(kind: PropertyKind) -> Self {
        match kind {
            PropertyKind::Boolean => PropertyValue::Boolean(false),
            PropertyKind::Integer => PropertyValue::Integer(0),
            PropertyKind::Ordinal(_) => {
                PropertyValue::Ordinal { token: String::new(), output: String::new() }
            }
            _ => PropertyValue::String(String::new()),
        }
    }

    /// The textual form a generator would write out.
    pub fn as_text(&self) -> String {
        match self {
            PropertyValue::String(s) => s.clone(),
            PropertyValue::Boolean(b) => if *b { "1" } else { "0" }.to_string(),
            PropertyValue::Integer(i) => i.to_string(),
            PropertyValue::Ordinal { output, .. } => output.clone(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Tools & configurations
// ═══════════════════════════════════════════════════════════════════════════════

/// A named group of property values attached to a configuration.
#[derive(Debug, Clone)]
pub struct ProjectTool {
    pub kind: ToolKind,
    /// At most one state per property name, in insertion order.
    pub properties: Vec<PropertyState>,
}

impl ProjectTool {
    fn new(kind: ToolKind) -> Self {
        Self { kind, properties: Vec::new() }
    }

    pub fn find_property(&self, name: &str) -> Option<&PropertyState> {
        let name = name.strip_prefix('$').unwrap_or(name);
        self.properties.iter().find(|p| p.name.eq_ignore_ascii_case(name))
    }

    fn store(&mut self, name: &str, value: String, ordinal: Option<String>) {
        match self
            .properties
            .iter_mut()
            .find(|p| p.name.eq_ignore_ascii_case(name))
        {
            Some(state) => {
                state.value = value;
                state.ordinal = ordinal;
            }
            None => self.properties.push(PropertyState {
                name: name.to_string(),
                value,
                ordinal,
            }),
        }
    }

    /// Remove a stored property value.  Returns whether anything was
    /// removed.
    pub fn clear_property(&mut self, name: &str) -> bool {
        let name = name.strip_prefix('$').unwrap_or(name);
        let before = self.properties.len();
        self.properties.retain(|p| !p.name.eq_ignore_ascii_case(name));
        self.properties.len() != before
    }
}

/// Project output type selected by `$ConfigurationType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigurationType {
    Application,
    DynamicLibrary,
    StaticLibrary,
    Utility,
}

impl ConfigurationType {
    fn from_token(token: &str) -> Option<Self> {
        if token.eq_ignore_ascii_case("Application (.exe)") {
            Some(Self::Application)
        } else if token.eq_ignore_ascii_case("Dynamic Library (.dll)") {
            Some(Self::DynamicLibrary)
        } else if token.eq_ignore_ascii_case("Static Library (.lib)") {
            Some(Self::StaticLibrary)
        } else if token.eq_ignore_ascii_case("Utility") {
            Some(Self::Utility)
        } else {
            None
        }
    }
}

/// A root or per-file build configuration and its tool slots.
#[derive(Debug, Clone)]
pub struct ProjectConfiguration {
    pub name: String,
    pub is_file_config: bool,
    pub config_type: Option<ConfigurationType>,
    tools: Vec<ProjectTool>,
}

impl ProjectConfiguration {
    fn new_root(name: &str) -> Self {
        Self {
            name: name.to_string(),
            is_file_config: false,
            config_type: None,
            tools: ROOT_TOOLS.iter().map(|&k| ProjectTool::new(k)).collect(),
        }
    }

    fn new_file(name: &str) -> Self {
        Self {
            name: name.to_string(),
            is_file_config: true,
            config_type: None,
            tools: FILE_TOOLS.iter().map(|&k| ProjectTool::new(k)).collect(),
        }
    }

    pub fn tool(&self, kind: ToolKind) -> Option<&ProjectTool> {
        self.tools.iter().find(|t| t.kind == kind)
    }

    pub fn tool_mut(&mut self, kind: ToolKind) -> Option<&mut ProjectTool> {
        self.tools.iter_mut().find(|t| t.kind == kind)
    }

    /// Whether no property has been set anywhere in this configuration.
    /// Empty file configurations are pruned when their block closes.
    pub fn is_empty(&self) -> bool {
        self.config_type.is_none() && self.tools.iter().all(|t| t.properties.is_empty())
    }

    /// Apply the tool-slot rule for a newly set configuration type: a
    /// static-library configuration drops the linker/resources/manifest
    /// slots, every other type drops the librarian slot.  Later property
    /// statements for a removed tool fail loudly.
    fn apply_config_type(&mut self, ty: ConfigurationType) {
        self.config_type = Some(ty);
        if ty == ConfigurationType::StaticLibrary {
            self.tools.retain(|t| {
                !matches!(t.kind, ToolKind::Linker | ToolKind::Resources | ToolKind::Manifest)
            });
        } else {
            self.tools.retain(|t| t.kind != ToolKind::Librarian);
        }
    }

    /// Set one property on one of this configuration's tools.
    ///
    /// `current` is the effective value the new one replaces (file-level if
    /// present, else root-level), used for `$BASE` expansion and the
    /// redundant-setting warning.
    fn set_property(
        &mut self,
        def: &PropertyDef,
        raw: &str,
        tool_kind: ToolKind,
        current: Option<&str>,
    ) -> Result<(), ScriptError> {
        if self.tool(tool_kind).is_none() {
            return Err(ScriptError::semantic(format!(
                "tool {} is not available in configuration '{}' (removed by $ConfigurationType)",
                tool_kind.keyword(),
                self.name
            )));
        }

        let (value, ordinal) = match def.kind {
            PropertyKind::Deprecated => {
                return Err(ScriptError::semantic(format!(
                    "property '{}' is deprecated and cannot be set",
                    def.name
                )));
            }
            PropertyKind::Ignored => {
                return Err(ScriptError::semantic(format!(
                    "property '{}' is ignored and cannot be set",
                    def.name
                )));
            }
            PropertyKind::String => {
                let value = if raw.contains("$BASE") {
                    raw.replace("$BASE", current.unwrap_or(""))
                } else {
                    raw.to_string()
                };
                if Some(value.as_str()) == current {
                    log::warn!(
                        "redundant setting: '{}' in configuration '{}' already has value '{}'",
                        def.name,
                        self.name,
                        value
                    );
                }
                (value, None)
            }
            PropertyKind::Boolean => {
                let b = parse_boolean(raw, false)?;
                (if b { "1" } else { "0" }.to_string(), None)
            }
            PropertyKind::Integer => {
                parse_integer(raw)?;
                (raw.to_string(), None)
            }
            PropertyKind::Ordinal(choices) => {
                if raw.eq_ignore_ascii_case("default") {
                    return Ok(());
                }
                let Some((token, output)) = choices
                    .iter()
                    .find(|(token, _)| token.eq_ignore_ascii_case(raw))
                else {
                    return Err(ScriptError::syntax(format!(
                        "unknown ordinal '{}' for property '{}' (expected one of: {})",
                        raw,
                        def.name,
                        choices
                            .iter()
                            .map(|(t, _)| *t)
                            .collect::<Vec<_>>()
                            .join(", ")
                    )));
                };
                (output.to_string(), Some(token.to_string()))
            }
        };

        if let Some(tool) = self.tool_mut(tool_kind) {
            tool.store(def.name, value, ordinal);
        }

        // Applied immediately so later statements in the same block see the
        // reduced tool set, regardless of statement order.
        if def.name.eq_ignore_ascii_case("ConfigurationType") {
            if let Some(state) = self
                .tool(ToolKind::General)
                .and_then(|t| t.find_property("ConfigurationType"))
            {
                let token = state.ordinal.clone().unwrap_or_default();
                if let Some(ty) = ConfigurationType::from_token(&token) {
                    self.apply_config_type(ty);
                }
            }
        }

        Ok(())
    }

    /// Clear a stored property from one tool.  Returns whether a value was
    /// removed.
    pub fn clear_property(&mut self, tool: ToolKind, name: &str) -> bool {
        self.tool_mut(tool).map(|t| t.clear_property(name)).unwrap_or(false)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Folders & files
// ═══════════════════════════════════════════════════════════════════════════════

/// A file node.  Owns zero or more per-configuration overrides, each named
/// after one of the root configurations.
#[derive(Debug, Clone)]
pub struct ProjectFile {
    pub path: String,
    /// Pre-marked "excluded from build"; set for `$OS` siblings so every
    /// on-disk variant stays visible in the generated project.
    pub excluded_from_build: bool,
    pub configurations: BTreeMap<String, ProjectConfiguration>,
}

impl ProjectFile {
    fn new(path: &str) -> Self {
        Self {
            path: path.to_string(),
            excluded_from_build: false,
            configurations: BTreeMap::new(),
        }
    }

    pub fn configuration(&self, name: &str) -> Option<&ProjectConfiguration> {
        self.configurations.get(name)
    }
}

/// A folder node; children are ordered by name.
#[derive(Debug, Clone, Default)]
pub struct ProjectFolder {
    pub name: String,
    pub folders: BTreeMap<String, ProjectFolder>,
    pub files: BTreeMap<String, ProjectFile>,
}

impl ProjectFolder {
    fn new(name: &str) -> Self {
        Self { name: name.to_string(), ..Default::default() }
    }

    /// Child folder with the given name, created on first use.  Re-declaring
    /// an existing folder is allowed (scripts commonly add files to the same
    /// folder from several conditional blocks).
    pub fn subfolder_mut(&mut self, name: &str) -> &mut ProjectFolder {
        self.folders
            .entry(name.to_string())
            .or_insert_with(|| ProjectFolder::new(name))
    }

    /// Add a file to this folder.  A duplicate declaration logs a warning
    /// and returns the existing node.
    pub fn add_file(&mut self, path: &str) -> &mut ProjectFile {
        if self.files.contains_key(path) {
            log::warn!("duplicate file declaration '{path}' in folder '{}'", self.name);
        }
        self.files
            .entry(path.to_string())
            .or_insert_with(|| ProjectFile::new(path))
    }

    /// Remove a file from this folder only.
    pub fn remove_file(&mut self, path: &str) -> bool {
        self.files.remove(path).is_some()
    }

    fn remove_file_recursive(&mut self, path: &str) -> bool {
        if self.remove_file(path) {
            return true;
        }
        self.folders.values_mut().any(|f| f.remove_file_recursive(path))
    }

    fn find_file(&self, path: &str) -> Option<&ProjectFile> {
        self.files
            .get(path)
            .or_else(|| self.folders.values().find_map(|f| f.find_file(path)))
    }

    fn find_file_mut(&mut self, path: &str) -> Option<&mut ProjectFile> {
        if self.files.contains_key(path) {
            return self.files.get_mut(path);
        }
        self.folders.values_mut().find_map(|f| f.find_file_mut(path))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Libraries
// ═══════════════════════════════════════════════════════════════════════════════

/// Linkage class of a library directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LibKind {
    Static,
    Import,
    Shared,
}

/// One `$Lib` / `$ImpLib` / `$SharedLib` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Library {
    pub name: String,
    pub kind: LibKind,
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Project
// ═══════════════════════════════════════════════════════════════════════════════

/// Names of the two root configurations, in replay order.
pub const ROOT_CONFIGURATIONS: &[&str] = &["Debug", "Release"];

/// The finished data model for one project.  Exclusively owns its whole
/// folder/file/configuration/tool subtree; discarded (or handed to a
/// generator, then discarded) when the project finishes.
#[derive(Debug, Clone)]
pub struct Project {
    pub name: String,
    pub root_folder: ProjectFolder,
    root_configurations: Vec<ProjectConfiguration>,
    pub libraries: Vec<Library>,
    schema: PropertySchema,
}

impl Project {
    pub fn new(name: &str) -> Result<Self, ScriptError> {
        Ok(Self {
            name: name.to_string(),
            root_folder: ProjectFolder::new(""),
            root_configurations: ROOT_CONFIGURATIONS
                .iter()
                .map(|n| ProjectConfiguration::new_root(n))
                .collect(),
            libraries: Vec::new(),
            schema: PropertySchema::builtin()?,
        })
    }

    pub fn schema(&self) -> &PropertySchema {
        &self.schema
    }

    // ─── Configurations ──────────────────────────────────────────────────

    pub fn root_configurations(&self) -> &[ProjectConfiguration] {
        &self.root_configurations
    }

    pub fn root_configuration(&self, name: &str) -> Option<&ProjectConfiguration> {
        self.root_configurations
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn root_configuration_mut(&mut self, name: &str) -> Option<&mut ProjectConfiguration> {
        self.root_configurations
            .iter_mut()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    // ─── Files ───────────────────────────────────────────────────────────

    /// Folder at the given path of names below the root, created on demand.
    pub fn folder_at_mut(&mut self, path: &[String]) -> &mut ProjectFolder {
        let mut folder = &mut self.root_folder;
        for name in path {
            folder = folder.subfolder_mut(name);
        }
        folder
    }

    /// Find a file anywhere in the tree.
    pub fn find_file(&self, path: &str) -> Option<&ProjectFile> {
        self.root_folder.find_file(path)
    }

    pub fn find_file_mut(&mut self, path: &str) -> Option<&mut ProjectFile> {
        self.root_folder.find_file_mut(path)
    }

    /// Remove a file anywhere in the tree.  Logs a warning when the file was
    /// never added.
    pub fn remove_file(&mut self, path: &str) -> bool {
        let removed = self.root_folder.remove_file_recursive(path);
        if !removed {
            log::warn!("removal of file '{path}' that was never added");
        }
        removed
    }

    // ─── Libraries ───────────────────────────────────────────────────────

    /// Add a library entry; duplicates are collapsed.  Returns whether the
    /// entry was new.
    pub fn add_library(&mut self, name: &str, kind: LibKind) -> bool {
        if self.libraries.iter().any(|l| l.name == name && l.kind == kind) {
            return false;
        }
        self.libraries.push(Library { name: name.to_string(), kind });
        true
    }

    pub fn remove_library(&mut self, name: &str, kind: LibKind) -> bool {
        let before = self.libraries.len();
        self.libraries.retain(|l| !(l.name == name && l.kind == kind));
        self.libraries.len() != before
    }

    // ─── Property writes ─────────────────────────────────────────────────

    /// Set a property on a root configuration's tool.
    pub fn set_root_property(
        &mut self,
        config: &str,
        tool: ToolKind,
        property: &str,
        raw: &str,
    ) -> Result<(), ScriptError> {
        let def = *self.lookup_def(tool, property)?;
        let current = self
            .root_configuration(config)
            .and_then(|c| c.tool(tool))
            .and_then(|t| t.find_property(property))
            .map(|s| s.value.clone());
        let configuration = self.root_configuration_mut(config).ok_or_else(|| {
            ScriptError::semantic(format!("unknown configuration '{config}'"))
        })?;
        configuration.set_property(&def, raw, tool, current.as_deref())
    }

    /// Set a property on a file's configuration override, creating the file
    /// configuration on first use.
    ///
    /// The file configuration set must stay a subset of the root
    /// configuration names.
    pub fn set_file_property(
        &mut self,
        file_path: &str,
        config: &str,
        tool: ToolKind,
        property: &str,
        raw: &str,
    ) -> Result<(), ScriptError> {
        let def = *self.lookup_def(tool, property)?;
        if self.root_configuration(config).is_none() {
            return Err(ScriptError::semantic(format!(
                "file configuration '{config}' is not one of the root configurations"
            )));
        }

        // Effective current value: file-level if present, else root-level.
        let current = self
            .find_file(file_path)
            .and_then(|f| f.configuration(config))
            .and_then(|c| c.tool(tool))
            .and_then(|t| t.find_property(property))
            .map(|s| s.value.clone())
            .or_else(|| {
                self.root_configuration(config)
                    .and_then(|c| c.tool(tool))
                    .and_then(|t| t.find_property(property))
                    .map(|s| s.value.clone())
            });

        let file = self.find_file_mut(file_path).ok_or_else(|| {
            ScriptError::semantic(format!("file '{file_path}' is not part of the project"))
        })?;
        let configuration = file
            .configurations
            .entry(config.to_string())
            .or_insert_with(|| ProjectConfiguration::new_file(config));
        configuration.set_property(&def, raw, tool, current.as_deref())
    }

    /// Drop a file configuration again when its block closes without having
    /// set any property.
    pub fn prune_empty_file_configuration(&mut self, file_path: &str, config: &str) {
        if let Some(file) = self.find_file_mut(file_path) {
            if file.configuration(config).is_some_and(|c| c.is_empty()) {
                file.configurations.remove(config);
            }
        }
    }

    fn lookup_def(&self, tool: ToolKind, property: &str) -> Result<&PropertyDef, ScriptError> {
        self.schema.find(tool, property).ok_or_else(|| {
            ScriptError::syntax(format!(
                "unknown property '{}' for tool {}",
                property,
                tool.keyword()
            ))
        })
    }

    // ─── Property reads (the cascade) ────────────────────────────────────

    /// Resolve a property's effective value through the two-level cascade:
    /// the file configuration's tool first (when a file and a matching tool
    /// instance exist), else the root configuration's tool, else the type's
    /// empty default.
    pub fn resolved_property(
        &self,
        config: &str,
        file: Option<&ProjectFile>,
        tool: ToolKind,
        property: &str,
    ) -> Result<PropertyValue, ScriptError> {
        let def = self.lookup_def(tool, property)?;

        let file_state = file
            .and_then(|f| f.configuration(config))
            .and_then(|c| c.tool(tool))
            .and_then(|t| t.find_property(property));
        let state = file_state.or_else(|| {
            self.root_configuration(config)
                .and_then(|c| c.tool(tool))
                .and_then(|t| t.find_property(property))
        });

        let Some(state) = state else {
            return Ok(PropertyValue::empty_default(def.kind));
        };

        Ok(match def.kind {
            PropertyKind::Boolean => PropertyValue::Boolean(state.value == "1"),
            PropertyKind::Integer => PropertyValue::Integer(parse_integer(&state.value)?),
            PropertyKind::Ordinal(_) => PropertyValue::Ordinal {
                token: state.ordinal.clone().unwrap_or_default(),
                output: state.value.clone(),
            },
            _ => PropertyValue::String(state.value.clone()),
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    fn project() -> Project {
        Project::new("unit_test").unwrap()
    }

    // ── Token parsing ────────────────────────────────────────────────────

    #[test]
    fn boolean_vocabulary() {
        for t in ["yes", "on", "true", "enabled", "1", "Yes", "TRUE"] {
            assert_eq!(parse_boolean(t, false).unwrap(), true, "token {t}");
        }
        for t in ["no", "off", "false", "disabled", "0", "No", "FALSE"] {
            assert_eq!(parse_boolean(t, false).unwrap(), false, "token {t}");
        }
    }

    #[test]
    fn boolean_ambiguous_is_error_unless_assumed() {
        assert!(parse_boolean("maybe", false).is_err());
        assert_eq!(parse_boolean("maybe", true).unwrap(), true);
    }

    #[test]
    fn integer_decimal_round_trip() {
        assert_eq!(parse_integer("42").unwrap(), 42);
        assert_eq!(parse_integer("-8").unwrap(), -8);
        assert_eq!(parse_integer("0").unwrap(), 0);
    }

    #[test]
    fn integer_leading_zeros_rejected() {
        let err = parse_integer("007").unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::Syntax);
        assert!(parse_integer("+7").is_err());
    }

    #[test]
    fn integer_hex_round_trip() {
        assert_eq!(parse_integer("0x400000").unwrap(), 0x400000);
        assert_eq!(parse_integer("0xFF").unwrap(), 255);
        assert_eq!(parse_integer("0xff").unwrap(), 255);
        assert!(parse_integer("0x0FF").is_err());
        assert!(parse_integer("0x").is_err());
    }

    // ── Schema ───────────────────────────────────────────────────────────

    #[test]
    fn schema_builds_and_finds() {
        let schema = PropertySchema::builtin().unwrap();
        assert!(schema.find(ToolKind::Compiler, "AdditionalIncludeDirectories").is_some());
        // '$' prefix and case both accepted.
        assert!(schema.find(ToolKind::Compiler, "$additionalincludedirectories").is_some());
        // Name scoped per tool.
        assert!(schema.find(ToolKind::Linker, "Optimization").is_none());
    }

    #[test]
    fn tool_keyword_round_trip() {
        for &tool in ROOT_TOOLS {
            assert_eq!(ToolKind::from_keyword(tool.keyword()), Some(tool));
        }
        assert_eq!(ToolKind::from_keyword("$compiler"), Some(ToolKind::Compiler));
        assert_eq!(ToolKind::from_keyword("$NoSuchTool"), None);
    }

    // ── Root property writes ─────────────────────────────────────────────

    #[test]
    fn set_and_read_string_property() {
        let mut p = project();
        p.set_root_property("Debug", ToolKind::Compiler, "$PreprocessorDefinitions", "DEBUG;_DEBUG")
            .unwrap();
        let v = p
            .resolved_property("Debug", None, ToolKind::Compiler, "PreprocessorDefinitions")
            .unwrap();
        assert_eq!(v, PropertyValue::String("DEBUG;_DEBUG".into()));
    }

    #[test]
    fn unknown_property_is_syntax_error() {
        let mut p = project();
        let err = p
            .set_root_property("Debug", ToolKind::Compiler, "$NoSuchProperty", "x")
            .unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::Syntax);
    }

    #[test]
    fn deprecated_and_ignored_cannot_be_set() {
        let mut p = project();
        let err = p
            .set_root_property("Debug", ToolKind::Compiler, "$MinimalRebuild", "yes")
            .unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::Semantic);
        let err = p
            .set_root_property("Debug", ToolKind::Compiler, "$BrowseInformation", "yes")
            .unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::Semantic);
    }

    #[test]
    fn ordinal_token_and_output_both_stored() {
        let mut p = project();
        p.set_root_property("Release", ToolKind::Compiler, "$Optimization", "Maximize Speed")
            .unwrap();
        let v = p
            .resolved_property("Release", None, ToolKind::Compiler, "Optimization")
            .unwrap();
        assert_eq!(
            v,
            PropertyValue::Ordinal { token: "Maximize Speed".into(), output: "2".into() }
        );
    }

    #[test]
    fn ordinal_default_is_noop() {
        let mut p = project();
        p.set_root_property("Debug", ToolKind::Compiler, "$Optimization", "default")
            .unwrap();
        let v = p
            .resolved_property("Debug", None, ToolKind::Compiler, "Optimization")
            .unwrap();
        assert_eq!(v, PropertyValue::Ordinal { token: String::new(), output: String::new() });
    }

    #[test]
    fn unknown_ordinal_is_syntax_error() {
        let mut p = project();
        let err = p
            .set_root_property("Debug", ToolKind::Compiler, "$Optimization", "Ludicrous Speed")
            .unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::Syntax);
    }

    #[test]
    fn boolean_property_normalized() {
        let mut p = project();
        p.set_root_property("Debug", ToolKind::Linker, "$GenerateDebugInformation", "yes")
            .unwrap();
        let v = p
            .resolved_property("Debug", None, ToolKind::Linker, "GenerateDebugInformation")
            .unwrap();
        assert_eq!(v, PropertyValue::Boolean(true));
    }

    #[test]
    fn integer_property_hex_kept_textually() {
        let mut p = project();
        p.set_root_property("Debug", ToolKind::Linker, "$BaseAddress", "0x400000")
            .unwrap();
        let state = p
            .root_configuration("Debug")
            .unwrap()
            .tool(ToolKind::Linker)
            .unwrap()
            .find_property("BaseAddress")
            .unwrap()
            .clone();
        assert_eq!(state.value, "0x400000");
        let v = p
            .resolved_property("Debug", None, ToolKind::Linker, "BaseAddress")
            .unwrap();
        assert_eq!(v, PropertyValue::Integer(0x400000));
    }

    // ── $BASE ────────────────────────────────────────────────────────────

    #[test]
    fn base_appends_to_inherited_value() {
        let mut p = project();
        p.set_root_property("Debug", ToolKind::Compiler, "$AdditionalIncludeDirectories", "orig")
            .unwrap();
        p.set_root_property(
            "Debug",
            ToolKind::Compiler,
            "$AdditionalIncludeDirectories",
            "$BASE;extra",
        )
        .unwrap();
        let v = p
            .resolved_property("Debug", None, ToolKind::Compiler, "AdditionalIncludeDirectories")
            .unwrap();
        assert_eq!(v, PropertyValue::String("orig;extra".into()));
    }

    #[test]
    fn base_with_no_current_value_expands_empty() {
        let mut p = project();
        p.set_root_property("Debug", ToolKind::Compiler, "$AdditionalIncludeDirectories", "$BASE;dir")
            .unwrap();
        let v = p
            .resolved_property("Debug", None, ToolKind::Compiler, "AdditionalIncludeDirectories")
            .unwrap();
        assert_eq!(v, PropertyValue::String(";dir".into()));
    }

    // ── Cascade ──────────────────────────────────────────────────────────

    #[test]
    fn cascade_falls_back_to_root() {
        let mut p = project();
        p.set_root_property("Debug", ToolKind::Compiler, "$PreprocessorDefinitions", "ROOT")
            .unwrap();
        p.root_folder.add_file("a.cpp");

        let file = p.find_file("a.cpp").unwrap();
        let v = p
            .resolved_property("Debug", Some(file), ToolKind::Compiler, "PreprocessorDefinitions")
            .unwrap();
        assert_eq!(v, PropertyValue::String("ROOT".into()));
    }

    #[test]
    fn cascade_prefers_file_override_and_reverts_on_clear() {
        let mut p = project();
        p.set_root_property("Debug", ToolKind::Compiler, "$PreprocessorDefinitions", "ROOT")
            .unwrap();
        p.root_folder.add_file("a.cpp");
        p.set_file_property("a.cpp", "Debug", ToolKind::Compiler, "$PreprocessorDefinitions", "FILE")
            .unwrap();

        let file = p.find_file("a.cpp").unwrap();
        let v = p
            .resolved_property("Debug", Some(file), ToolKind::Compiler, "PreprocessorDefinitions")
            .unwrap();
        assert_eq!(v, PropertyValue::String("FILE".into()));

        // Clearing the file-level override reverts to the root value.
        let file = p.find_file_mut("a.cpp").unwrap();
        file.configurations
            .get_mut("Debug")
            .unwrap()
            .clear_property(ToolKind::Compiler, "PreprocessorDefinitions");
        let file = p.find_file("a.cpp").unwrap();
        let v = p
            .resolved_property("Debug", Some(file), ToolKind::Compiler, "PreprocessorDefinitions")
            .unwrap();
        assert_eq!(v, PropertyValue::String("ROOT".into()));
    }

    #[test]
    fn file_base_expands_against_root_value() {
        let mut p = project();
        p.set_root_property("Debug", ToolKind::Compiler, "$AdditionalIncludeDirectories", "rootdir")
            .unwrap();
        p.root_folder.add_file("a.cpp");
        p.set_file_property(
            "a.cpp",
            "Debug",
            ToolKind::Compiler,
            "$AdditionalIncludeDirectories",
            "$BASE;filedir",
        )
        .unwrap();

        let file = p.find_file("a.cpp").unwrap();
        let v = p
            .resolved_property("Debug", Some(file), ToolKind::Compiler, "AdditionalIncludeDirectories")
            .unwrap();
        assert_eq!(v, PropertyValue::String("rootdir;filedir".into()));
    }

    #[test]
    fn unset_property_yields_empty_default() {
        let p = project();
        assert_eq!(
            p.resolved_property("Debug", None, ToolKind::Compiler, "PreprocessorDefinitions")
                .unwrap(),
            PropertyValue::String(String::new())
        );
        assert_eq!(
            p.resolved_property("Debug", None, ToolKind::Linker, "GenerateDebugInformation")
                .unwrap(),
            PropertyValue::Boolean(false)
        );
        assert_eq!(
            p.resolved_property("Debug", None, ToolKind::Linker, "StackReserveSize")
                .unwrap(),
            PropertyValue::Integer(0)
        );
    }

    #[test]
    fn file_configuration_must_match_a_root_name() {
        let mut p = project();
        p.root_folder.add_file("a.cpp");
        let err = p
            .set_file_property("a.cpp", "Profile", ToolKind::Compiler, "$PreprocessorDefinitions", "X")
            .unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::Semantic);
    }

    #[test]
    fn empty_file_configuration_is_pruned() {
        let mut p = project();
        p.root_folder.add_file("a.cpp");
        p.find_file_mut("a.cpp")
            .unwrap()
            .configurations
            .insert("Debug".into(), ProjectConfiguration::new_file("Debug"));

        p.prune_empty_file_configuration("a.cpp", "Debug");
        assert!(p.find_file("a.cpp").unwrap().configuration("Debug").is_none());

        // A configuration with a value survives pruning.
        p.set_file_property("a.cpp", "Debug", ToolKind::Compiler, "$PreprocessorDefinitions", "X")
            .unwrap();
        p.prune_empty_file_configuration("a.cpp", "Debug");
        assert!(p.find_file("a.cpp").unwrap().configuration("Debug").is_some());
    }

    // ── Configuration type / tool removal ────────────────────────────────

    #[test]
    fn static_library_drops_linker_resources_manifest() {
        let mut p = project();
        p.set_root_property("Debug", ToolKind::General, "$ConfigurationType", "Static Library (.lib)")
            .unwrap();
        let cfg = p.root_configuration("Debug").unwrap();
        assert_eq!(cfg.config_type, Some(ConfigurationType::StaticLibrary));
        assert!(cfg.tool(ToolKind::Linker).is_none());
        assert!(cfg.tool(ToolKind::Resources).is_none());
        assert!(cfg.tool(ToolKind::Manifest).is_none());
        assert!(cfg.tool(ToolKind::Librarian).is_some());
    }

    #[test]
    fn application_type_drops_librarian() {
        let mut p = project();
        p.set_root_property("Release", ToolKind::General, "$ConfigurationType", "Application (.exe)")
            .unwrap();
        let cfg = p.root_configuration("Release").unwrap();
        assert!(cfg.tool(ToolKind::Librarian).is_none());
        assert!(cfg.tool(ToolKind::Linker).is_some());
    }

    #[test]
    fn setting_property_on_removed_tool_fails_loudly() {
        let mut p = project();
        p.set_root_property("Debug", ToolKind::General, "$ConfigurationType", "Static Library (.lib)")
            .unwrap();
        let err = p
            .set_root_property("Debug", ToolKind::Linker, "$OutputFile", "out.dll")
            .unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::Semantic);
        assert!(err.message.contains("not available"), "{}", err.message);
    }

    // ── Folders, files, libraries ────────────────────────────────────────

    #[test]
    fn folder_tree_is_name_ordered() {
        let mut p = project();
        let folder = p.root_folder.subfolder_mut("Source Files");
        folder.add_file("zebra.cpp");
        folder.add_file("alpha.cpp");
        let names: Vec<&str> = p.root_folder.folders["Source Files"]
            .files
            .keys()
            .map(|s| s.as_str())
            .collect();
        assert_eq!(names, vec!["alpha.cpp", "zebra.cpp"]);
    }

    #[test]
    fn remove_file_searches_nested_folders() {
        let mut p = project();
        p.root_folder.subfolder_mut("a").subfolder_mut("b").add_file("deep.cpp");
        assert!(p.remove_file("deep.cpp"));
        assert!(p.find_file("deep.cpp").is_none());
        assert!(!p.remove_file("deep.cpp"));
    }

    #[test]
    fn libraries_deduplicate_per_kind() {
        let mut p = project();
        assert!(p.add_library("tier0", LibKind::Static));
        assert!(!p.add_library("tier0", LibKind::Static));
        assert!(p.add_library("tier0", LibKind::Import));
        assert!(p.remove_library("tier0", LibKind::Static));
        assert_eq!(p.libraries, vec![Library { name: "tier0".into(), kind: LibKind::Import }]);
    }
}
