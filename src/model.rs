// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Symbol model shared by the scanner and the synthesizers.
//!
//! Two layers live here:
//!
//! - **Raw facts** ([`FileFacts`] and the declarations inside it) are what the
//!   scanner extracts from one file. They only hold text as written plus
//!   positions, so they can be cached per file and handed over as JSON by an
//!   external symbol provider.
//! - **Resolved facts** ([`SymbolGraph`]) are computed across all files:
//!   fully qualified trait paths, [`DecoratedMember`]s, [`RegistrationEntry`]s
//!   and [`CallSite`]s, plus the [`Diagnostic`]s found while resolving.
//!
//! Every collection is kept in a deterministic order so that re-running on
//! unchanged input yields identical facts and identical generated code.

use serde::{Deserialize, Serialize};

/// Position of a token in a source file.
///
/// Both `line` and `column` are 1-based; `column` counts characters, matching
/// the `line!()`/`column!()` convention.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Location {
    /// File path relative to the project root, `/`-separated.
    pub file: String,
    /// Line (1-indexed).
    pub line: u32,
    /// Column (1-indexed, in characters).
    pub column: u32,
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

/// Half-open byte range into a source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ByteRange {
    pub start: usize,
    pub end: usize,
}

impl ByteRange {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Slice the range out of `source`.
    pub fn slice<'a>(&self, source: &'a str) -> &'a str {
        &source[self.start..self.end]
    }
}

/// How a trait method takes `self`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Receiver {
    /// `&self`
    Ref,
    /// `&mut self`
    RefMut,
    /// `self` / `mut self`
    Value,
    /// Associated function without a receiver.
    None,
}

impl Receiver {
    /// Receiver as written in a generated signature.
    pub fn as_param(&self) -> &'static str {
        match self {
            Self::Ref => "&self",
            Self::RefMut => "&mut self",
            Self::Value => "self",
            Self::None => "",
        }
    }
}

/// Smart pointer the generated code boxes services in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pointer {
    #[default]
    Box,
    Arc,
}

impl Pointer {
    /// Type constructor path (`Box`, `::std::sync::Arc`).
    pub fn type_path(&self) -> &'static str {
        match self {
            Self::Box => "Box",
            Self::Arc => "::std::sync::Arc",
        }
    }

    /// Wrap a trait object type: `Box<dyn S>`.
    pub fn wrap(&self, inner: &str) -> String {
        format!("{}<{}>", self.type_path(), inner)
    }
}

/// How instrumented calls get their span.
///
/// The two mechanisms are exclusive so a call through a registry-resolved
/// instance at a redirected site still opens exactly one span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstrumentationMode {
    /// Decorators installed through patched registrations.
    #[default]
    Decorate,
    /// Call sites redirected to interceptors; registrations only install
    /// user-declared decorators.
    Intercept,
}

impl InstrumentationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Decorate => "decorate",
            Self::Intercept => "intercept",
        }
    }
}

/// Marker state of a single method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberMarker {
    /// No marker on the method itself.
    #[default]
    Unmarked,
    /// `#[traced]` on the method.
    Traced,
    /// `#[traced(skip)]` on the method.
    Skip,
}

/// A method signature declared inside a trait.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MethodSig {
    /// Method name.
    pub name: String,
    /// Receiver kind.
    pub receiver: Receiver,
    /// Parameter types as written (receiver excluded).
    pub params: Vec<String>,
    /// Return type as written, without `->`.
    pub return_type: Option<String>,
    /// Generic parameter list as written, including angle brackets.
    pub generics: Option<String>,
    /// Where clause as written.
    pub where_clause: Option<String>,
    /// Declared `async fn`.
    pub is_async: bool,
    /// Declared `unsafe fn`.
    pub is_unsafe: bool,
    /// Whether the trait provides a default body.
    pub has_default: bool,
    /// Marker found on the method.
    pub marker: MemberMarker,
    /// Location of the method name.
    pub location: Location,
}

impl MethodSig {
    /// Normalized signature text used for identity and staleness hashing.
    pub fn normalized(&self) -> String {
        let mut out = String::new();
        if self.is_unsafe {
            out.push_str("unsafe ");
        }
        if self.is_async {
            out.push_str("async ");
        }
        out.push_str("fn ");
        out.push_str(&self.name);
        if let Some(ref generics) = self.generics {
            out.push_str(&squash_whitespace(generics));
        }
        out.push('(');
        let mut parts: Vec<String> = Vec::new();
        if self.receiver != Receiver::None {
            parts.push(self.receiver.as_param().to_string());
        }
        parts.extend(self.params.iter().map(|p| squash_whitespace(p)));
        out.push_str(&parts.join(", "));
        out.push(')');
        if let Some(ref ret) = self.return_type {
            out.push_str(" -> ");
            out.push_str(&squash_whitespace(ret));
        }
        if let Some(ref clause) = self.where_clause {
            out.push(' ');
            out.push_str(&squash_whitespace(clause));
        }
        out
    }
}

/// Collapse runs of whitespace into single spaces.
pub fn squash_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Trait-level marker data.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct TraitMarker {
    /// Span prefix override from `#[traced(name = "...")]`.
    pub alias: Option<String>,
}

/// A trait declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraitDecl {
    /// Trait name.
    pub name: String,
    /// Module the trait is declared in (`crate::shop`).
    pub module_path: String,
    /// Trait-level `#[traced]` marker, if any.
    pub marker: Option<TraitMarker>,
    /// Whether the trait carries `#[async_trait]`.
    pub is_async_trait: bool,
    /// Arguments of the `#[async_trait(...)]` attribute (`?Send`).
    pub async_trait_args: Option<String>,
    /// Supertrait bounds as written.
    pub supertraits: Option<String>,
    /// Generic parameters, if the trait is generic.
    pub generics: Option<String>,
    /// Whether the trait declares associated types or constants.
    pub has_associated_items: bool,
    /// Declared methods in source order.
    pub methods: Vec<MethodSig>,
    /// Location of the trait name.
    pub location: Location,
    /// Byte offset of the declaration (attributes included).
    pub offset: usize,
}

impl TraitDecl {
    /// Fully qualified path of the trait.
    pub fn qualified(&self) -> String {
        format!("{}::{}", self.module_path, self.name)
    }
}

/// `impl Trait for Type` block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImplDecl {
    /// Trait path as written.
    pub trait_name: String,
    /// Self type as written.
    pub self_type: String,
    /// Module the impl block lives in.
    pub module_path: String,
}

/// A struct declaration with named fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructDecl {
    pub name: String,
    pub module_path: String,
    /// `(field name, type as written)` in declaration order.
    pub fields: Vec<(String, String)>,
}

/// One flattened `use` item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UseDecl {
    /// Module scope the `use` appears in.
    pub module_path: String,
    /// Path as written (`super::ids::OrderId`, `crate::a::*`).
    pub path: String,
    /// Local name the item is bound to; `None` for glob imports.
    pub alias: Option<String>,
}

/// A struct carrying `#[decorates(Trait)]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecoratorDecl {
    /// Decorator type name.
    pub type_name: String,
    /// Module the decorator is declared in.
    pub module_path: String,
    /// Target trait as written in the marker.
    pub target: String,
    pub location: Location,
    pub offset: usize,
}

/// Registry lifetime policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifetime {
    Singleton,
    Scoped,
    Transient,
}

impl Lifetime {
    /// Parse a lifetime from its method-name form.
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "singleton" => Some(Self::Singleton),
            "scoped" => Some(Self::Scoped),
            "transient" => Some(Self::Transient),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Singleton => "singleton",
            Self::Scoped => "scoped",
            Self::Transient => "transient",
        }
    }
}

impl std::fmt::Display for Lifetime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How a registration builds its instance, as written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConstructionStrategy {
    /// `add_<lt>_instance::<dyn S>(expr)`
    Instance { expr: String },
    /// `add_<lt>_factory::<dyn S>(expr)`
    Factory { expr: String },
    /// `add_<lt>::<dyn S, Impl>()`
    Implementation { type_name: String },
    /// Nothing the patcher can build from.
    Undetermined,
}

impl ConstructionStrategy {
    pub fn is_determined(&self) -> bool {
        !matches!(self, Self::Undetermined)
    }
}

/// A registration call found in source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationSite {
    /// Receiver expression (`services`).
    pub receiver: String,
    /// Method name as written.
    pub method: String,
    pub lifetime: Lifetime,
    pub strategy: ConstructionStrategy,
    /// First turbofish argument as written (`dyn Orders`).
    pub service_type: String,
    /// Module scope of the call.
    pub module_path: String,
    pub location: Location,
    /// Position among registrations of the same file.
    pub ordinal: usize,
    /// Range of the method name token.
    pub method_range: ByteRange,
    /// Range of the turbofish argument list, angle brackets included.
    pub type_args_range: ByteRange,
    /// Range of the call's argument list, parentheses included.
    pub args_range: ByteRange,
    /// Range of the single argument expression, if any.
    pub arg_range: Option<ByteRange>,
}

/// A method call with a statically known receiver type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodCall {
    /// Invoked method name.
    pub method: String,
    /// Receiver expression as written.
    pub receiver: String,
    /// Receiver type as written at its binding (or bound, for generics).
    pub receiver_type: String,
    /// Module scope of the call.
    pub module_path: String,
    /// Location of the method name token.
    pub location: Location,
    /// Range of the method name token.
    pub token_range: ByteRange,
    /// Byte offset where a `use` item for this scope can be inserted.
    pub scope_insert: usize,
}

/// Everything the scanner extracts from one file.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FileFacts {
    /// Path relative to the project root, `/`-separated.
    pub path: String,
    /// Absolute path used as the interception coordinate.
    pub absolute_path: String,
    /// Module path of the file (`crate::shop::orders`).
    pub module_path: String,
    /// SHA-256 of the file content.
    pub hash: String,
    /// Whether the file is a crate root (`lib.rs`/`main.rs`).
    pub is_crate_root: bool,
    /// Byte offset where file-level items may be inserted.
    pub item_insert: usize,
    /// Child modules declared in this file, qualified.
    pub modules: Vec<String>,
    pub traits: Vec<TraitDecl>,
    pub impls: Vec<ImplDecl>,
    pub structs: Vec<StructDecl>,
    pub uses: Vec<UseDecl>,
    pub decorators: Vec<DecoratorDecl>,
    pub registrations: Vec<RegistrationSite>,
    pub calls: Vec<MethodCall>,
    /// `#[traced]` and `#[decorates]` attributes, removed from the mirror.
    #[serde(default)]
    pub marker_ranges: Vec<ByteRange>,
}

/// A trait selected for instrumentation, fully resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interface {
    /// Fully qualified path (`crate::shop::Orders`).
    pub path: String,
    /// Trait name.
    pub name: String,
    /// Span name prefix (trait name or marker alias).
    pub span_prefix: String,
    pub module_path: String,
    pub is_async_trait: bool,
    /// Arguments of the `#[async_trait(...)]` attribute.
    pub async_trait_args: Option<String>,
    /// All methods of the trait, instrumented or not.
    pub methods: Vec<MethodSig>,
    /// Absolute `use` paths of the declaring scope, for generated modules.
    pub imports: Vec<String>,
    pub location: Location,
    pub offset: usize,
}

impl Interface {
    /// Whether futures returned by `#[async_trait]` methods are `Send`.
    pub fn futures_are_send(&self) -> bool {
        !self
            .async_trait_args
            .as_deref()
            .map(|a| a.contains("?Send"))
            .unwrap_or(false)
    }

    /// Methods that receive a span.
    pub fn instrumented(&self) -> impl Iterator<Item = &MethodSig> {
        self.methods
            .iter()
            .filter(|m| m.marker == MemberMarker::Traced)
    }
}

/// One instrumented trait method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecoratedMember {
    /// Fully qualified trait path.
    pub interface: String,
    pub method: MethodSig,
    /// `<Trait>.<method>`
    pub span_name: String,
    /// SHA-256 of the normalized signature.
    pub signature_hash: String,
}

impl DecoratedMember {
    /// Identity of the member: trait path plus normalized signature.
    pub fn key(&self) -> (String, String) {
        (self.interface.clone(), self.method.normalized())
    }
}

/// A user-declared decorator with its target resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclaredDecorator {
    /// Fully qualified target trait.
    pub service: String,
    /// Fully qualified decorator type.
    pub type_path: String,
    pub location: Location,
    pub offset: usize,
}

/// A registry entry with its service type resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationEntry {
    /// Fully qualified service trait, if it resolved.
    pub service: Option<String>,
    pub lifetime: Lifetime,
    pub strategy: ConstructionStrategy,
    /// Global insertion index (file order, then source order).
    pub index: usize,
    /// Raw site, carrying the edit anchors.
    pub site: RegistrationSite,
}

/// An invocation of an instrumented method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallSite {
    /// Fully qualified trait owning the method.
    pub interface: String,
    pub method: String,
    /// Absolute file path of the call.
    pub file: String,
    pub location: Location,
    pub token_range: ByteRange,
    pub scope_insert: usize,
}

impl CallSite {
    /// Redirection coordinate of the call.
    pub fn key(&self) -> (String, u32, u32) {
        (self.file.clone(), self.location.line, self.location.column)
    }
}

/// A call site bound to its generated interceptor.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InterceptionEntry {
    /// Absolute file path.
    pub file: String,
    pub line: u32,
    pub column: u32,
    /// Fully qualified trait.
    pub interface: String,
    pub method: String,
    /// Path of the interceptor method (`module::Trait::method`).
    pub interceptor: String,
    /// Signature hash of the member at generation time.
    pub signature_hash: String,
}

/// Diagnostic severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
    Error,
}

/// Recoverable problem categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// A marker or registration names a type the graph cannot resolve.
    UnresolvedReference,
    /// A marked trait cannot be decorated through a trait object.
    UnsupportedInterface,
    /// A registration has no determinable construction strategy.
    AmbiguousConstruction,
    /// A receiver type matches several instrumented traits.
    AmbiguousReceiver,
    /// Two call sites share a redirection coordinate.
    PositionCollision,
}

impl DiagnosticKind {
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnresolvedReference => "TW001",
            Self::UnsupportedInterface => "TW002",
            Self::AmbiguousConstruction => "TW003",
            Self::AmbiguousReceiver => "TW004",
            Self::PositionCollision => "TW005",
        }
    }
}

/// A recoverable problem reported during generation.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub kind: DiagnosticKind,
    pub message: String,
    pub location: Option<Location>,
}

impl Diagnostic {
    pub fn warning(kind: DiagnosticKind, message: impl Into<String>, location: Option<Location>) -> Self {
        Self {
            severity: Severity::Warning,
            kind,
            message: message.into(),
            location,
        }
    }

    pub fn error(kind: DiagnosticKind, message: impl Into<String>, location: Option<Location>) -> Self {
        Self {
            severity: Severity::Error,
            kind,
            message: message.into(),
            location,
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let level = match self.severity {
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        match &self.location {
            Some(loc) => write!(f, "{}[{}]: {} ({})", level, self.kind.code(), self.message, loc),
            None => write!(f, "{}[{}]: {}", level, self.kind.code(), self.message),
        }
    }
}

/// Resolved facts for one generation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolGraph {
    /// Instrumented traits, sorted by path.
    pub interfaces: Vec<Interface>,
    /// Instrumented members, sorted by (trait, method order).
    pub members: Vec<DecoratedMember>,
    /// User-declared decorators, in discovery order.
    pub decorators: Vec<DeclaredDecorator>,
    /// Registry entries, in insertion order.
    pub registrations: Vec<RegistrationEntry>,
    /// Call sites, sorted by coordinate.
    pub call_sites: Vec<CallSite>,
    /// Diagnostics found while resolving.
    pub diagnostics: Vec<Diagnostic>,
}

impl SymbolGraph {
    /// Look up an instrumented trait by path.
    pub fn interface(&self, path: &str) -> Option<&Interface> {
        self.interfaces.iter().find(|i| i.path == path)
    }

    /// Look up the member for a trait method.
    pub fn member(&self, interface: &str, method: &str) -> Option<&DecoratedMember> {
        self.members
            .iter()
            .find(|m| m.interface == interface && m.method.name == method)
    }
}
