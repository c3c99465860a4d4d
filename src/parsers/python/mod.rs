//! Python adapter using tree-sitter
//!
//! Builds a [`SourceUnit`] from Python source: top-level functions, class
//! methods (`Class.method`), data-shape classes, imports, and for every
//! callable its nesting tree, call sites, side effects, except handlers,
//! log calls and literals.

mod effects;

use self::effects::{classify, log_level, CallContext};
use crate::symbols::{
    count_lines, ArgValue, Argument, Block, BlockKind, CallSite, Callable, DependencyEdge,
    ErrorHandler, HandlerAction, LiteralToken, LiteralValue, LogCall, ParseError, Parameter,
    SideEffect, SourceAdapter, SourceUnit, StructuralCategory,
};
use std::path::Path;
use tree_sitter::{Node, Parser};

const EXTENSIONS: &[&str] = &["py", "pyi"];

/// Decorators that turn a class into a record
const DATA_SHAPE_DECORATORS: &[&str] = &[
    "dataclass",
    "dataclasses.dataclass",
    "attr.s",
    "attr.attrs",
    "attrs.define",
    "attrs.frozen",
    "attr.define",
    "define",
    "frozen",
];

/// Base classes that make a class a record, schema or enum
const DATA_SHAPE_BASES: &[&str] = &[
    "BaseModel",
    "BaseSettings",
    "TypedDict",
    "NamedTuple",
    "Enum",
    "IntEnum",
    "StrEnum",
    "Flag",
    "IntFlag",
    "Schema",
    "Struct",
];

/// Keyword arguments of log calls that are not structured fields
const LOG_CONTROL_KEYWORDS: &[&str] = &["exc_info", "stack_info", "stacklevel", "extra"];

#[derive(Debug, Clone, Copy, Default)]
pub struct PythonAdapter;

impl SourceAdapter for PythonAdapter {
    fn name(&self) -> &'static str {
        "python"
    }

    fn supports(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| EXTENSIONS.contains(&e))
    }

    fn parse_source(
        &self,
        path: &Path,
        source: &str,
        _language_hint: Option<&str>,
    ) -> Result<SourceUnit, ParseError> {
        parse_source(path, source)
    }
}

/// Parse Python source into a unit
pub fn parse_source(path: &Path, source: &str) -> Result<SourceUnit, ParseError> {
    let failure = |line: u32, message: String| ParseError::ParseFailure {
        path: path.to_path_buf(),
        line,
        message,
    };

    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_python::LANGUAGE.into())
        .map_err(|e| failure(1, format!("failed to load Python grammar: {}", e)))?;
    let tree = parser
        .parse(source, None)
        .ok_or_else(|| failure(1, "parser returned no tree".to_string()))?;

    let root = tree.root_node();
    if root.has_error() {
        let (line, message) = match first_error(root) {
            Some(node) if node.is_missing() => (line_of(node), format!("missing '{}'", node.kind())),
            Some(node) => (line_of(node), "invalid syntax".to_string()),
            None => (1, "invalid syntax".to_string()),
        };
        return Err(failure(line, message));
    }

    let mut unit = SourceUnit::new(path, "python");
    let (total, blank, comment) = count_lines(source, &["#"]);
    unit.line_count = total;
    unit.blank_lines = blank;
    unit.comment_lines = comment;

    let mut builder = UnitBuilder {
        src: source.as_bytes(),
        test_file: is_test_path(path),
        unit,
    };
    builder.visit_module(root);
    Ok(builder.unit)
}

fn first_error(node: Node) -> Option<Node> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    children(node)
        .into_iter()
        .filter(|c| c.has_error())
        .find_map(first_error)
}

fn line_of(node: Node) -> u32 {
    node.start_position().row as u32 + 1
}

fn end_line_of(node: Node) -> u32 {
    node.end_position().row as u32 + 1
}

fn children(node: Node) -> Vec<Node> {
    let mut cursor = node.walk();
    node.children(&mut cursor).collect()
}

fn named_children(node: Node) -> Vec<Node> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor).collect()
}

fn is_test_path(path: &Path) -> bool {
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("");
    stem.starts_with("test_") || stem.ends_with("_test") || stem == "conftest"
}

fn is_nested_scope(kind: &str) -> bool {
    matches!(
        kind,
        "function_definition" | "class_definition" | "decorated_definition" | "lambda"
    )
}

/// Owning class of a method
struct ClassInfo {
    name: String,
    data_shape: bool,
    test: bool,
}

struct UnitBuilder<'s> {
    src: &'s [u8],
    test_file: bool,
    unit: SourceUnit,
}

impl<'s> UnitBuilder<'s> {
    fn text(&self, node: Node) -> &'s str {
        node.utf8_text(self.src).unwrap_or("")
    }

    fn visit_module(&mut self, root: Node) {
        for node in children(root) {
            self.visit_top_level(node);
        }
    }

    fn visit_top_level(&mut self, node: Node) {
        match node.kind() {
            "import_statement" | "import_from_statement" | "future_import_statement" => {
                self.import(node)
            }
            "function_definition" => {
                let callable = self.callable(node, None, &[]);
                self.unit.callables.push(callable);
            }
            "class_definition" => self.class(node, &[]),
            "decorated_definition" => self.decorated(node, None),
            "expression_statement" => {
                let literals = self.literals_of(node);
                self.unit.literals.extend(literals);
            }
            // Guarded imports (`try: import x`, `if TYPE_CHECKING:`)
            "if_statement" | "try_statement" | "with_statement" => {
                for child in children(node) {
                    match child.kind() {
                        "block" => self.visit_module(child),
                        "else_clause" | "elif_clause" | "except_clause" | "finally_clause" => {
                            for block in named_children(child)
                                .into_iter()
                                .filter(|c| c.kind() == "block")
                            {
                                self.visit_module(block);
                            }
                        }
                        _ => {}
                    }
                }
            }
            _ => {}
        }
    }

    fn decorated(&mut self, node: Node, class: Option<&ClassInfo>) {
        let decorators: Vec<Node> = children(node)
            .into_iter()
            .filter(|c| c.kind() == "decorator")
            .collect();
        let Some(definition) = node.child_by_field_name("definition") else {
            return;
        };
        match definition.kind() {
            "function_definition" => {
                let callable = self.callable(definition, class, &decorators);
                self.unit.callables.push(callable);
            }
            "class_definition" if class.is_none() => self.class(definition, &decorators),
            _ => {}
        }
    }

    fn import(&mut self, node: Node) {
        let line = line_of(node);
        match node.kind() {
            "import_statement" => {
                for name in node_field_all(node, "name") {
                    let module = match name.kind() {
                        "aliased_import" => name
                            .child_by_field_name("name")
                            .map(|n| self.text(n))
                            .unwrap_or(""),
                        _ => self.text(name),
                    };
                    if !module.is_empty() {
                        self.unit
                            .dependencies
                            .push(DependencyEdge::external(module, Vec::new(), line));
                    }
                }
            }
            "import_from_statement" => {
                let module = node
                    .child_by_field_name("module_name")
                    .map(|n| self.text(n))
                    .unwrap_or("");
                let symbols = node_field_all(node, "name")
                    .into_iter()
                    .map(|n| match n.kind() {
                        "aliased_import" => n
                            .child_by_field_name("name")
                            .map(|n| self.text(n))
                            .unwrap_or(""),
                        _ => self.text(n),
                    })
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect();
                if !module.is_empty() {
                    self.unit
                        .dependencies
                        .push(DependencyEdge::external(module, symbols, line));
                }
            }
            _ => {}
        }
    }

    fn class(&mut self, node: Node, decorators: &[Node]) {
        let Some(name) = node.child_by_field_name("name").map(|n| self.text(n)) else {
            return;
        };
        let decorator_names: Vec<String> = decorators.iter().map(|d| self.decorator_name(*d)).collect();
        let bases: Vec<String> = node
            .child_by_field_name("superclasses")
            .map(|args| {
                named_children(args)
                    .into_iter()
                    .filter(|a| a.kind() != "keyword_argument")
                    .map(|a| dotted(a, self.src))
                    .collect()
            })
            .unwrap_or_default();
        let body = node.child_by_field_name("body");

        let info = ClassInfo {
            name: name.to_string(),
            data_shape: self.is_data_shape(&decorator_names, &bases, body),
            test: name.starts_with("Test") || self.test_file,
        };

        if info.data_shape {
            let mut shape = Callable::new(name, line_of(node), end_line_of(node));
            shape.category = StructuralCategory::DataShape;
            shape.decorators = decorator_names;
            self.unit.callables.push(shape);
        }

        let Some(body) = body else {
            return;
        };
        for stmt in children(body) {
            match stmt.kind() {
                "function_definition" => {
                    let callable = self.callable(stmt, Some(&info), &[]);
                    self.unit.callables.push(callable);
                }
                "decorated_definition" => self.decorated(stmt, Some(&info)),
                "expression_statement" => {
                    let literals = self.literals_of(stmt);
                    self.unit.literals.extend(literals);
                }
                _ => {}
            }
        }
    }

    fn is_data_shape(&self, decorators: &[String], bases: &[String], body: Option<Node>) -> bool {
        if decorators.iter().any(|d| DATA_SHAPE_DECORATORS.contains(&d.as_str())) {
            return true;
        }
        if bases.iter().any(|b| {
            let last = b.rsplit('.').next().unwrap_or(b);
            DATA_SHAPE_BASES.contains(&last)
        }) {
            return true;
        }
        // Only fields, constants and docstrings
        body.is_some_and(|body| {
            named_children(body).iter().all(|stmt| {
                matches!(stmt.kind(), "expression_statement" | "pass_statement" | "comment")
            })
        })
    }

    fn decorator_name(&self, decorator: Node) -> String {
        named_children(decorator)
            .into_iter()
            .find(|n| n.kind() != "comment")
            .map(|expr| dotted(expr, self.src))
            .unwrap_or_default()
    }

    fn callable(&self, node: Node, class: Option<&ClassInfo>, decorators: &[Node]) -> Callable {
        let short = node
            .child_by_field_name("name")
            .map(|n| self.text(n))
            .unwrap_or("");
        let name = match class {
            Some(c) => format!("{}.{}", c.name, short),
            None => short.to_string(),
        };

        let mut callable = Callable::new(name, line_of(node), end_line_of(node));
        callable.is_async = children(node).iter().any(|c| c.kind() == "async");
        callable.category = match class {
            Some(c) if c.data_shape => StructuralCategory::DataShape,
            Some(c) if c.test => StructuralCategory::Test,
            _ if short.starts_with("test") || self.test_file => StructuralCategory::Test,
            _ => StructuralCategory::Logic,
        };
        callable.decorators = decorators.iter().map(|d| self.decorator_name(*d)).collect();

        let mut walker = BodyWalker::new(self.src, short);
        for decorator in decorators {
            walker.walk(*decorator, Scope::default());
        }
        if let Some(params) = node.child_by_field_name("parameters") {
            callable.params = self.parameters(params, class.is_some(), &mut walker);
        }
        if let Some(body) = node.child_by_field_name("body") {
            callable.body = walker.walk(body, Scope::default());
        }

        callable.calls = walker.calls;
        callable.side_effects = walker.side_effects;
        callable.error_handlers = walker.handlers;
        callable.log_calls = walker.log_calls;
        callable.literals = walker.literals;
        callable
    }

    fn parameters(&self, node: Node, is_method: bool, walker: &mut BodyWalker) -> Vec<Parameter> {
        let mut params = Vec::new();
        for child in named_children(node) {
            let (name, type_hint, default) = match child.kind() {
                "identifier" => (Some(self.text(child)), None, None),
                "typed_parameter" => (
                    named_children(child)
                        .into_iter()
                        .find(|n| n.kind() == "identifier")
                        .map(|n| self.text(n)),
                    child.child_by_field_name("type"),
                    None,
                ),
                "default_parameter" | "typed_default_parameter" => (
                    child.child_by_field_name("name").map(|n| self.text(n)),
                    child.child_by_field_name("type"),
                    child.child_by_field_name("value"),
                ),
                "list_splat_pattern" | "dictionary_splat_pattern" => (
                    named_children(child)
                        .into_iter()
                        .find(|n| n.kind() == "identifier")
                        .map(|n| self.text(n)),
                    None,
                    None,
                ),
                _ => (None, None, None),
            };
            let Some(name) = name else {
                continue;
            };
            if is_method && params.is_empty() && matches!(name, "self" | "cls") {
                continue;
            }
            if let Some(default) = default {
                walker.visit(default, Scope::default());
            }
            params.push(Parameter {
                name: name.to_string(),
                type_hint: type_hint.map(|t| self.text(t).to_string()),
            });
        }
        params
    }

    fn literals_of(&self, stmt: Node) -> Vec<LiteralToken> {
        let mut walker = BodyWalker::new(self.src, "");
        walker.walk(stmt, Scope::default());
        walker.literals
    }
}

fn node_field_all<'t>(node: Node<'t>, field: &str) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    node.children_by_field_name(field, &mut cursor).collect()
}

/// Dotted name of a call target or base class (`self.client.post`,
/// `requests.Session().get` -> `requests.Session.get`)
fn dotted(node: Node, src: &[u8]) -> String {
    match node.kind() {
        "identifier" => node.utf8_text(src).unwrap_or("").to_string(),
        "attribute" => {
            let object = node
                .child_by_field_name("object")
                .map(|o| dotted(o, src))
                .unwrap_or_default();
            let attr = node
                .child_by_field_name("attribute")
                .and_then(|a| a.utf8_text(src).ok())
                .unwrap_or("");
            if object.is_empty() {
                attr.to_string()
            } else {
                format!("{}.{}", object, attr)
            }
        }
        "call" => node
            .child_by_field_name("function")
            .map(|f| dotted(f, src))
            .unwrap_or_default(),
        "subscript" => node
            .child_by_field_name("value")
            .map(|v| dotted(v, src))
            .unwrap_or_default(),
        "parenthesized_expression" | "await" => named_children(node)
            .into_iter()
            .next()
            .map(|n| dotted(n, src))
            .unwrap_or_default(),
        _ => String::new(),
    }
}

/// Value of a plain literal node; `None` for f-strings and anything computed
fn literal_value(node: Node, src: &[u8]) -> Option<LiteralValue> {
    match node.kind() {
        "string" => string_value(node, src).map(LiteralValue::Str),
        "concatenated_string" => named_children(node)
            .into_iter()
            .map(|s| string_value(s, src))
            .collect::<Option<Vec<_>>>()
            .map(|parts| LiteralValue::Str(parts.concat())),
        "integer" => {
            let text = node.utf8_text(src).ok()?.replace('_', "");
            let lower = text.to_lowercase();
            let value = if let Some(hex) = lower.strip_prefix("0x") {
                i64::from_str_radix(hex, 16).ok()?
            } else if let Some(oct) = lower.strip_prefix("0o") {
                i64::from_str_radix(oct, 8).ok()?
            } else if let Some(bin) = lower.strip_prefix("0b") {
                i64::from_str_radix(bin, 2).ok()?
            } else {
                text.parse().ok()?
            };
            let negated = node
                .parent()
                .is_some_and(|p| p.kind() == "unary_operator" && p.utf8_text(src).is_ok_and(|t| t.starts_with('-')));
            Some(LiteralValue::Int(if negated { -value } else { value }))
        }
        "float" => node
            .utf8_text(src)
            .ok()?
            .replace('_', "")
            .parse()
            .ok()
            .map(LiteralValue::Float),
        "true" => Some(LiteralValue::Bool(true)),
        "false" => Some(LiteralValue::Bool(false)),
        _ => None,
    }
}

fn string_value(node: Node, src: &[u8]) -> Option<String> {
    if node.kind() != "string" {
        return None;
    }
    let mut value = String::new();
    for part in children(node) {
        match part.kind() {
            "interpolation" => return None,
            "string_content" | "escape_sequence" => value.push_str(part.utf8_text(src).ok()?),
            _ => {}
        }
    }
    Some(value)
}

/// Name a literal is bound to: assignment target, keyword, dict key or
/// parameter name. Containers (`[500, 502]`) pass the binding through.
fn binding_of(node: Node, src: &[u8]) -> Option<String> {
    let mut current = node;
    let mut parent = node.parent()?;
    while matches!(
        parent.kind(),
        "list" | "tuple" | "set" | "parenthesized_expression" | "unary_operator" | "expression_list"
    ) {
        current = parent;
        parent = parent.parent()?;
    }

    let is_field = |field: &str| parent.child_by_field_name(field).is_some_and(|n| n.id() == current.id());
    let text = |n: Node| n.utf8_text(src).ok().map(str::to_string);

    match parent.kind() {
        "assignment" | "augmented_assignment" if is_field("right") => {
            let left = parent.child_by_field_name("left")?;
            match left.kind() {
                "identifier" => text(left),
                "attribute" => left.child_by_field_name("attribute").and_then(text),
                _ => None,
            }
        }
        "keyword_argument" if is_field("value") => parent.child_by_field_name("name").and_then(text),
        "pair" if is_field("value") => {
            let key = parent.child_by_field_name("key")?;
            match key.kind() {
                "string" => string_value(key, src),
                "identifier" => text(key),
                _ => None,
            }
        }
        "default_parameter" | "typed_default_parameter" if is_field("value") => {
            parent.child_by_field_name("name").and_then(text)
        }
        _ => None,
    }
}

/// Loop and async-with state while descending a body
#[derive(Debug, Clone, Copy, Default)]
struct Scope {
    in_loop: bool,
    async_with: bool,
}

/// Collects everything inside one callable body
struct BodyWalker<'s> {
    src: &'s [u8],
    /// Unqualified name of the callable (recursive calls retry)
    callable: String,
    calls: Vec<CallSite>,
    side_effects: Vec<SideEffect>,
    handlers: Vec<ErrorHandler>,
    log_calls: Vec<LogCall>,
    literals: Vec<LiteralToken>,
}

impl<'s> BodyWalker<'s> {
    fn new(src: &'s [u8], callable: &str) -> Self {
        Self {
            src,
            callable: callable.to_string(),
            calls: Vec::new(),
            side_effects: Vec::new(),
            handlers: Vec::new(),
            log_calls: Vec::new(),
            literals: Vec::new(),
        }
    }

    /// Walk `node`'s children, returning the block tree they form
    fn walk(&mut self, node: Node, scope: Scope) -> Vec<Block> {
        let mut blocks = Vec::new();
        for child in children(node) {
            blocks.extend(self.visit(child, scope));
        }
        blocks
    }

    fn visit(&mut self, node: Node, scope: Scope) -> Vec<Block> {
        let kind = node.kind();
        let line = line_of(node);
        match kind {
            "class_definition" => Vec::new(),
            // Closures and decorator wrappers act for the enclosing callable:
            // their calls, effects and handlers count, their blocks do not
            // deepen its nesting.
            "function_definition" | "lambda" => {
                self.nested(node);
                Vec::new()
            }
            "if_statement" => vec![Block::new(BlockKind::Branch, line).with_children(self.walk(node, scope))],
            "for_statement" | "while_statement" => {
                let inner = Scope {
                    in_loop: true,
                    ..scope
                };
                vec![Block::new(BlockKind::Loop, line).with_children(self.walk(node, inner))]
            }
            "with_statement" => {
                let inner = Scope {
                    async_with: scope.async_with || children(node).iter().any(|c| c.kind() == "async"),
                    ..scope
                };
                vec![Block::new(BlockKind::With, line).with_children(self.walk(node, inner))]
            }
            "match_statement" => vec![Block::new(BlockKind::Match, line).with_children(self.walk(node, scope))],
            "try_statement" => {
                let mut try_children = Vec::new();
                let mut handlers = Vec::new();
                for child in children(node) {
                    if matches!(child.kind(), "except_clause" | "except_group_clause") {
                        self.handler(child, scope);
                        handlers.push(
                            Block::new(BlockKind::Handler, line_of(child))
                                .with_children(self.walk(child, scope)),
                        );
                    } else {
                        try_children.extend(self.visit(child, scope));
                    }
                }
                let mut blocks = vec![Block::new(BlockKind::Try, line).with_children(try_children)];
                blocks.extend(handlers);
                blocks
            }
            "list_comprehension" | "set_comprehension" | "dictionary_comprehension" | "generator_expression" => {
                let inner = Scope {
                    in_loop: true,
                    ..scope
                };
                self.walk(node, inner)
            }
            "call" => {
                self.call(node, scope);
                self.walk(node, scope)
            }
            "string" | "concatenated_string" | "integer" | "float" | "true" | "false" => {
                self.literal(node);
                // Calls inside f-string interpolations
                self.walk(node, scope)
            }
            _ => self.walk(node, scope),
        }
    }

    fn nested(&mut self, node: Node) {
        let Some(body) = node.child_by_field_name("body") else {
            return;
        };
        let inner = node
            .child_by_field_name("name")
            .and_then(|n| n.utf8_text(self.src).ok())
            .unwrap_or("")
            .to_string();
        let outer = std::mem::replace(&mut self.callable, inner);
        self.visit(body, Scope::default());
        self.callable = outer;
    }

    fn literal(&mut self, node: Node) {
        // Docstrings
        if node.parent().is_some_and(|p| p.kind() == "expression_statement" && p.named_child_count() == 1) {
            return;
        }
        if let Some(value) = literal_value(node, self.src) {
            let binding = binding_of(node, self.src);
            self.literals.push(LiteralToken {
                line: line_of(node),
                binding,
                value,
            });
        }
    }

    fn call(&mut self, node: Node, scope: Scope) {
        let Some(function) = node.child_by_field_name("function") else {
            return;
        };
        let target = dotted(function, self.src);
        if target.is_empty() {
            return;
        }

        let line = line_of(node);
        let awaited = node.parent().is_some_and(|p| p.kind() == "await");
        let arguments = node.child_by_field_name("arguments");
        let args = arguments.map(|a| self.arguments(a)).unwrap_or_default();

        let method_hint = args.iter().find_map(|a| match (&a.keyword, &a.value) {
            (None, ArgValue::Literal(LiteralValue::Str(s))) => Some(s.as_str()),
            (Some(k), ArgValue::Literal(LiteralValue::Str(s))) if k == "method" => Some(s.as_str()),
            _ => None,
        });
        let ctx = CallContext {
            awaited,
            async_with: scope.async_with,
        };
        if let Some(mut effect) = classify(&target, method_hint, ctx) {
            effect.line = line;
            self.side_effects.push(effect);
        }

        if let (Some(level), Some(arguments)) = (log_level(&target), arguments) {
            let log_call = self.log_call(arguments, level, line);
            self.log_calls.push(log_call);
        }

        self.calls.push(CallSite {
            target,
            line,
            in_loop: scope.in_loop,
            awaited,
            args,
        });
    }

    fn arguments(&self, node: Node) -> Vec<Argument> {
        named_children(node)
            .into_iter()
            .filter(|a| a.kind() != "comment")
            .map(|arg| match arg.kind() {
                "keyword_argument" => Argument {
                    keyword: arg
                        .child_by_field_name("name")
                        .and_then(|n| n.utf8_text(self.src).ok())
                        .map(str::to_string),
                    value: arg
                        .child_by_field_name("value")
                        .map(|v| self.arg_value(v))
                        .unwrap_or(ArgValue::Other),
                },
                _ => Argument {
                    keyword: None,
                    value: self.arg_value(arg),
                },
            })
            .collect()
    }

    fn arg_value(&self, node: Node) -> ArgValue {
        match node.kind() {
            "identifier" | "attribute" => {
                let name = dotted(node, self.src);
                if name.is_empty() {
                    ArgValue::Other
                } else {
                    ArgValue::Identifier(name)
                }
            }
            _ => literal_value(node, self.src)
                .map(ArgValue::Literal)
                .unwrap_or(ArgValue::Other),
        }
    }

    fn log_call(&self, arguments: Node, level: String, line: u32) -> LogCall {
        let mut call = LogCall {
            line,
            level,
            ..Default::default()
        };

        let mut first_positional = true;
        for arg in named_children(arguments) {
            match arg.kind() {
                "keyword_argument" => {
                    let keyword = arg
                        .child_by_field_name("name")
                        .and_then(|n| n.utf8_text(self.src).ok())
                        .unwrap_or("");
                    let value = arg.child_by_field_name("value");
                    if keyword == "extra" {
                        if let Some(dict) = value.filter(|v| v.kind() == "dictionary") {
                            for pair in named_children(dict) {
                                let key = pair
                                    .child_by_field_name("key")
                                    .and_then(|k| string_value(k, self.src));
                                if let Some(key) = key {
                                    call.fields.push(key);
                                }
                                if let Some(v) = pair.child_by_field_name("value") {
                                    collect_identifiers(v, self.src, &mut call.args);
                                }
                            }
                        } else {
                            call.fields.push(keyword.to_string());
                        }
                    } else if !LOG_CONTROL_KEYWORDS.contains(&keyword) {
                        call.fields.push(keyword.to_string());
                        if let Some(v) = value {
                            collect_identifiers(v, self.src, &mut call.args);
                        }
                    }
                }
                "comment" => {}
                _ => {
                    if first_positional {
                        call.interpolated = is_interpolated(arg, self.src);
                        first_positional = false;
                    }
                    collect_identifiers(arg, self.src, &mut call.args);
                }
            }
        }

        call
    }

    /// Classify an except clause by what its body does
    fn handler(&mut self, clause: Node, scope: Scope) {
        let mut caught = Vec::new();
        for child in children(clause) {
            match child.kind() {
                "as" | "block" | ":" => break,
                "as_pattern" => {
                    if let Some(first) = named_children(child).into_iter().next() {
                        caught.extend(exception_names(first, self.src));
                    }
                }
                _ => caught.extend(exception_names(child, self.src)),
            }
        }

        let body = children(clause)
            .into_iter()
            .find(|c| c.kind() == "block");
        let facts = body.map(|b| HandlerFacts::of(b, self.src, &self.callable)).unwrap_or_default();

        let action = if facts.raises {
            HandlerAction::Rethrow
        } else if facts.recurses
            || (scope.in_loop && facts.continues)
            || (scope.in_loop && facts.sleeps && !facts.returns && !facts.breaks)
        {
            HandlerAction::Retry
        } else if facts.statements == facts.trivial {
            HandlerAction::Swallow
        } else if facts.statements == facts.trivial + facts.logs {
            HandlerAction::Log
        } else {
            HandlerAction::Fallback
        };

        self.handlers.push(ErrorHandler {
            line: line_of(clause),
            caught,
            action,
        });
    }
}

fn exception_names(node: Node, src: &[u8]) -> Vec<String> {
    match node.kind() {
        "identifier" | "attribute" => vec![dotted(node, src)],
        "tuple" | "parenthesized_expression" => named_children(node)
            .into_iter()
            .flat_map(|n| exception_names(n, src))
            .collect(),
        _ => Vec::new(),
    }
}

/// Identifiers (maximal dotted chains) appearing in a log argument
fn collect_identifiers(node: Node, src: &[u8], out: &mut Vec<String>) {
    match node.kind() {
        "identifier" | "attribute" => {
            let name = dotted(node, src);
            if !name.is_empty() && !out.contains(&name) {
                out.push(name);
            }
        }
        "call" => {
            if let Some(args) = node.child_by_field_name("arguments") {
                collect_identifiers(args, src, out);
            }
            // `user.email.lower()` still logs `user.email`
            if let Some(object) = node
                .child_by_field_name("function")
                .filter(|f| f.kind() == "attribute")
                .and_then(|f| f.child_by_field_name("object"))
            {
                collect_identifiers(object, src, out);
            }
        }
        "keyword_argument" => {
            if let Some(value) = node.child_by_field_name("value") {
                collect_identifiers(value, src, out);
            }
        }
        "string" => {
            for child in named_children(node) {
                if child.kind() == "interpolation" {
                    collect_identifiers(child, src, out);
                }
            }
        }
        _ => {
            for child in named_children(node) {
                collect_identifiers(child, src, out);
            }
        }
    }
}

/// Message built by f-string, `%` or `+` on a string, or `.format(...)`
fn is_interpolated(node: Node, src: &[u8]) -> bool {
    match node.kind() {
        "string" => named_children(node).iter().any(|c| c.kind() == "interpolation"),
        "binary_operator" => {
            let op = node
                .child_by_field_name("operator")
                .and_then(|o| o.utf8_text(src).ok())
                .unwrap_or("");
            let has_string = ["left", "right"].iter().any(|f| {
                node.child_by_field_name(f)
                    .is_some_and(|n| matches!(n.kind(), "string" | "binary_operator"))
            });
            matches!(op, "%" | "+") && has_string
        }
        "call" => node
            .child_by_field_name("function")
            .is_some_and(|f| dotted(f, src).ends_with("format")),
        "parenthesized_expression" => named_children(node)
            .into_iter()
            .next()
            .is_some_and(|n| is_interpolated(n, src)),
        _ => false,
    }
}

/// What an except body contains
#[derive(Debug, Default)]
struct HandlerFacts {
    statements: usize,
    /// `pass`, `...`
    trivial: usize,
    /// Statements that only log
    logs: usize,
    raises: bool,
    continues: bool,
    breaks: bool,
    returns: bool,
    sleeps: bool,
    recurses: bool,
}

impl HandlerFacts {
    fn of(block: Node, src: &[u8], callable: &str) -> Self {
        let mut facts = Self::default();
        for stmt in named_children(block) {
            if stmt.kind() == "comment" {
                continue;
            }
            facts.statements += 1;
            match stmt.kind() {
                "pass_statement" => facts.trivial += 1,
                "expression_statement" => {
                    let inner = named_children(stmt);
                    match inner.as_slice() {
                        [only] if only.kind() == "ellipsis" => facts.trivial += 1,
                        [only] if only.kind() == "call" => {
                            let target = only
                                .child_by_field_name("function")
                                .map(|f| dotted(f, src))
                                .unwrap_or_default();
                            if log_level(&target).is_some() {
                                facts.logs += 1;
                            }
                        }
                        _ => {}
                    }
                }
                _ => {}
            }
            facts.scan(stmt, src, callable);
        }
        facts
    }

    fn scan(&mut self, node: Node, src: &[u8], callable: &str) {
        match node.kind() {
            "raise_statement" => self.raises = true,
            "continue_statement" => self.continues = true,
            "break_statement" => self.breaks = true,
            "return_statement" => self.returns = true,
            "call" => {
                let target = node
                    .child_by_field_name("function")
                    .map(|f| dotted(f, src))
                    .unwrap_or_default();
                let short = target.rsplit('.').next().unwrap_or("");
                if short == "sleep" {
                    self.sleeps = true;
                }
                if !callable.is_empty() && short == callable {
                    self.recurses = true;
                }
            }
            kind if is_nested_scope(kind) => return,
            _ => {}
        }
        for child in named_children(node) {
            self.scan(child, src, callable);
        }
    }
}
