//! Language-agnostic symbol model
//!
//! A [`SourceUnit`] is everything the engine knows about one file. Units are
//! produced by a [`SourceAdapter`] (one per source language), are immutable
//! once built, and are the only view of the source the rules ever get.
//!
//! ```text
//! SourceUnit
//! ├── callables: Vec<Callable>
//! │   ├── params, body (Block tree), calls, side_effects
//! │   ├── error_handlers, log_calls, literals
//! ├── dependencies: Vec<DependencyEdge>
//! └── literals (module level)
//! ```

mod domain;

pub use domain::{infer_domain, is_shared_location};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors an adapter can return for a single file.
///
/// All of these are recoverable: the evaluator turns them into a
/// `scan-error` finding and moves on to the next file.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("unsupported language '{language}' for {}", path.display())]
    UnsupportedLanguage { path: PathBuf, language: String },

    #[error("{}:{line}: {message}", path.display())]
    ParseFailure {
        path: PathBuf,
        line: u32,
        message: String,
    },

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ParseError {
    pub fn path(&self) -> &Path {
        match self {
            ParseError::UnsupportedLanguage { path, .. }
            | ParseError::ParseFailure { path, .. }
            | ParseError::Io { path, .. } => path,
        }
    }

    /// Offending line, when the adapter could pin one down
    pub fn line(&self) -> Option<u32> {
        match self {
            ParseError::ParseFailure { line, .. } => Some(*line),
            _ => None,
        }
    }
}

/// A file handed to an adapter
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct SourceFile {
    /// Path relative to the scan root; this is what findings report
    pub path: PathBuf,
    /// Path used to read the file
    pub absolute: PathBuf,
}

impl SourceFile {
    pub fn new(root: &Path, absolute: impl Into<PathBuf>) -> Self {
        let absolute = absolute.into();
        let path = absolute
            .strip_prefix(root)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| absolute.clone());
        Self { path, absolute }
    }
}

/// Produces [`SourceUnit`]s from source text.
///
/// The engine is parametric over this trait and never looks at raw text.
pub trait SourceAdapter: Send + Sync {
    /// Adapter name (for logging)
    fn name(&self) -> &'static str;

    /// Whether this adapter can handle the file (by extension)
    fn supports(&self, path: &Path) -> bool;

    /// Build a unit from already-read source text
    fn parse_source(
        &self,
        path: &Path,
        source: &str,
        language_hint: Option<&str>,
    ) -> Result<SourceUnit, ParseError>;

    /// Read and parse a file
    fn parse_file(
        &self,
        file: &SourceFile,
        language_hint: Option<&str>,
    ) -> Result<SourceUnit, ParseError> {
        let source = std::fs::read_to_string(&file.absolute).map_err(|source| ParseError::Io {
            path: file.path.clone(),
            source,
        })?;
        self.parse_source(&file.path, &source, language_hint)
    }
}

/// One source file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceUnit {
    pub path: PathBuf,
    pub language: String,
    /// Logical domain inferred from location or naming
    #[serde(default)]
    pub domain: Option<String>,
    pub line_count: u32,
    #[serde(default)]
    pub blank_lines: u32,
    #[serde(default)]
    pub comment_lines: u32,
    #[serde(default)]
    pub callables: Vec<Callable>,
    #[serde(default)]
    pub dependencies: Vec<DependencyEdge>,
    /// Module-level literals (callable literals live on the callable)
    #[serde(default)]
    pub literals: Vec<LiteralToken>,
}

impl SourceUnit {
    pub fn new(path: impl Into<PathBuf>, language: impl Into<String>) -> Self {
        let path = path.into();
        let domain = infer_domain(&path);
        Self {
            path,
            language: language.into(),
            domain,
            line_count: 0,
            blank_lines: 0,
            comment_lines: 0,
            callables: Vec::new(),
            dependencies: Vec::new(),
            literals: Vec::new(),
        }
    }

    /// Lines that are neither blank nor comment-only
    pub fn body_lines(&self) -> u32 {
        self.line_count
            .saturating_sub(self.blank_lines)
            .saturating_sub(self.comment_lines)
    }

    /// File stem, lowercased (`billing/utils.py` -> `utils`)
    pub fn stem(&self) -> String {
        self.path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("")
            .to_lowercase()
    }

    /// All literals in the unit, module level first
    pub fn all_literals(&self) -> impl Iterator<Item = (Option<&Callable>, &LiteralToken)> {
        self.literals.iter().map(|l| (None, l)).chain(
            self.callables
                .iter()
                .flat_map(|c| c.literals.iter().map(move |l| (Some(c), l))),
        )
    }
}

/// Structural category of a callable; used by the uniform-file exemption
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum StructuralCategory {
    #[default]
    Logic,
    /// Data-shape declaration (record, DTO, schema, enum)
    DataShape,
    Test,
    Constant,
}

/// A function or method
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Callable {
    pub name: String,
    pub line_start: u32,
    pub line_end: u32,
    #[serde(default)]
    pub params: Vec<Parameter>,
    #[serde(default)]
    pub category: StructuralCategory,
    #[serde(default)]
    pub is_async: bool,
    #[serde(default)]
    pub decorators: Vec<String>,
    /// Top-level blocks of the body; depth of this tree is the nesting depth
    #[serde(default)]
    pub body: Vec<Block>,
    #[serde(default)]
    pub calls: Vec<CallSite>,
    #[serde(default)]
    pub side_effects: Vec<SideEffect>,
    #[serde(default)]
    pub error_handlers: Vec<ErrorHandler>,
    #[serde(default)]
    pub log_calls: Vec<LogCall>,
    #[serde(default)]
    pub literals: Vec<LiteralToken>,
}

impl Callable {
    pub fn new(name: impl Into<String>, line_start: u32, line_end: u32) -> Self {
        Self {
            name: name.into(),
            line_start,
            line_end,
            ..Default::default()
        }
    }

    pub fn body_lines(&self) -> u32 {
        self.line_end.saturating_sub(self.line_start) + 1
    }

    pub fn param_names(&self) -> impl Iterator<Item = &str> {
        self.params.iter().map(|p| p.name.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_hint: Option<String>,
}

impl Parameter {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_hint: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockKind {
    Branch,
    Loop,
    Try,
    Handler,
    With,
    Match,
    Other,
}

/// A nested block in a callable body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub kind: BlockKind,
    pub line: u32,
    #[serde(default)]
    pub children: Vec<Block>,
}

impl Block {
    pub fn new(kind: BlockKind, line: u32) -> Self {
        Self {
            kind,
            line,
            children: Vec::new(),
        }
    }

    pub fn with_children(mut self, children: Vec<Block>) -> Self {
        self.children = children;
        self
    }

    /// Depth of this block, counting itself
    pub fn depth(&self) -> usize {
        1 + self.children.iter().map(Block::depth).max().unwrap_or(0)
    }
}

/// A call inside a callable body (decorators included)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CallSite {
    /// Call target as written (`requests.post`, `self.client.get`)
    pub target: String,
    pub line: u32,
    #[serde(default)]
    pub in_loop: bool,
    #[serde(default)]
    pub awaited: bool,
    #[serde(default)]
    pub args: Vec<Argument>,
}

impl CallSite {
    pub fn new(target: impl Into<String>, line: u32) -> Self {
        Self {
            target: target.into(),
            line,
            ..Default::default()
        }
    }

    /// Last segment of the target (`self.client.post` -> `post`)
    pub fn short_name(&self) -> &str {
        self.target.rsplit('.').next().unwrap_or(&self.target)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Argument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyword: Option<String>,
    pub value: ArgValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum ArgValue {
    Identifier(String),
    Literal(LiteralValue),
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SideEffectKind {
    FileIo,
    Network,
    Database,
    Process,
    Sleep,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Head,
    Options,
    Put,
    Delete,
    Post,
    Patch,
}

impl HttpMethod {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "get" => Some(HttpMethod::Get),
            "head" => Some(HttpMethod::Head),
            "options" => Some(HttpMethod::Options),
            "put" => Some(HttpMethod::Put),
            "delete" => Some(HttpMethod::Delete),
            "post" => Some(HttpMethod::Post),
            "patch" => Some(HttpMethod::Patch),
            _ => None,
        }
    }

    /// Repeating the request has no additional effect
    pub fn is_idempotent(&self) -> bool {
        !matches!(self, HttpMethod::Post | HttpMethod::Patch)
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            HttpMethod::Get => "GET",
            HttpMethod::Head => "HEAD",
            HttpMethod::Options => "OPTIONS",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Post => "POST",
            HttpMethod::Patch => "PATCH",
        };
        f.write_str(s)
    }
}

/// A detected side effect (I/O, network, ...)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SideEffect {
    pub kind: SideEffectKind,
    pub target: String,
    pub line: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<HttpMethod>,
    /// Blocks the calling thread (sync client, `time.sleep`, plain `open`)
    #[serde(default)]
    pub blocking: bool,
}

impl SideEffect {
    pub fn new(kind: SideEffectKind, target: impl Into<String>, line: u32) -> Self {
        Self {
            kind,
            target: target.into(),
            line,
            method: None,
            blocking: false,
        }
    }

    pub fn with_method(mut self, method: HttpMethod) -> Self {
        self.method = Some(method);
        self
    }

    pub fn blocking(mut self) -> Self {
        self.blocking = true;
        self
    }

    pub fn is_io(&self) -> bool {
        self.kind != SideEffectKind::Sleep
    }
}

/// What a catch/guard block does with the error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandlerAction {
    Rethrow,
    Swallow,
    Retry,
    Fallback,
    Log,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorHandler {
    pub line: u32,
    #[serde(default)]
    pub caught: Vec<String>,
    pub action: HandlerAction,
}

/// A logging call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct LogCall {
    pub line: u32,
    #[serde(default)]
    pub level: String,
    /// Identifiers passed to the call
    #[serde(default)]
    pub args: Vec<String>,
    /// Structured field names (`extra={...}`, key-value pairs)
    #[serde(default)]
    pub fields: Vec<String>,
    /// Message built by interpolation or concatenation
    #[serde(default)]
    pub interpolated: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LiteralValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl LiteralValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            LiteralValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            LiteralValue::Str(s) => Some(s),
            _ => None,
        }
    }
}

/// A literal token and the name it is bound to, if any
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiteralToken {
    pub line: u32,
    /// Identifier, keyword or dict key receiving the literal
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binding: Option<String>,
    pub value: LiteralValue,
}

impl LiteralToken {
    pub fn new(line: u32, binding: Option<&str>, value: LiteralValue) -> Self {
        Self {
            line,
            binding: binding.map(str::to_string),
            value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "lowercase")]
pub enum EdgeTarget {
    /// Another unit in the scanned tree
    Unit(PathBuf),
    /// A module or package outside the unit (may still resolve to a unit)
    External(String),
}

/// Import/dependency edge from this unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyEdge {
    pub target: EdgeTarget,
    /// Imported names (`from x import a, b`)
    #[serde(default)]
    pub symbols: Vec<String>,
    #[serde(default)]
    pub line: u32,
}

impl DependencyEdge {
    pub fn external(module: impl Into<String>, symbols: Vec<String>, line: u32) -> Self {
        Self {
            target: EdgeTarget::External(module.into()),
            symbols,
            line,
        }
    }
}

/// Count total, blank and comment-only lines
pub fn count_lines(source: &str, comment_prefixes: &[&str]) -> (u32, u32, u32) {
    let mut total = 0u32;
    let mut blank = 0u32;
    let mut comment = 0u32;
    for line in source.lines() {
        total += 1;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            blank += 1;
        } else if comment_prefixes.iter().any(|p| trimmed.starts_with(p)) {
            comment += 1;
        }
    }
    (total, blank, comment)
}
