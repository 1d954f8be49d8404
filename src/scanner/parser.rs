// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Tree-sitter based fact extraction.
//!
//! Parses one Rust source file and extracts the raw facts the generator
//! needs: trait declarations with their markers, impl blocks, struct fields,
//! `use` items, decorator declarations, registration calls, and method calls
//! whose receiver type can be read from a nearby binding.

use std::time::Instant;

use regex::Regex;
use sha2::{Digest, Sha256};
use tree_sitter::{Node, Parser};

use crate::error::ScanError;
use crate::model::{
    ByteRange, ConstructionStrategy, DecoratorDecl, FileFacts, ImplDecl, Lifetime, Location,
    MemberMarker, MethodCall, MethodSig, Receiver, RegistrationSite, StructDecl, TraitDecl,
    TraitMarker, UseDecl,
};

#[cfg(feature = "telemetry")]
use crate::telemetry::metrics::GLOBAL_METRICS;

use super::typetext::{generic_bounds, last_segment, strip_generics, strip_references};

/// Version of the extracted fact format; bump when extraction changes.
pub const SCANNER_VERSION: &str = "1.1.0";

/// Marker and naming conventions the scanner recognizes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanOptions {
    /// Attribute that marks traits and methods (`traced`).
    pub marker: String,
    /// Attribute that declares a user decorator (`decorates`).
    pub decorates_marker: String,
    /// Prefix of registration methods (`add_`).
    pub registration_prefix: String,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            marker: "traced".to_string(),
            decorates_marker: "decorates".to_string(),
            registration_prefix: "add_".to_string(),
        }
    }
}

impl ScanOptions {
    /// Cache key component: facts scanned under other conventions differ.
    pub fn fingerprint(&self) -> String {
        format!(
            "{}|{}|{}",
            self.marker, self.decorates_marker, self.registration_prefix
        )
    }
}

/// Source scanner for Rust files.
pub struct SourceScanner {
    parser: Parser,
    options: ScanOptions,
    alias_re: Regex,
}

impl SourceScanner {
    /// Create a new scanner with the given conventions.
    pub fn new(options: ScanOptions) -> Result<Self, ScanError> {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_rust::LANGUAGE.into())
            .map_err(|e| ScanError::ParserInit(format!("Failed to set Rust language: {}", e)))?;

        let alias_re = Regex::new(r#"name\s*=\s*"([^"]*)""#)
            .map_err(|e| ScanError::ParserInit(e.to_string()))?;

        Ok(Self {
            parser,
            options,
            alias_re,
        })
    }

    /// Scanner conventions in use.
    pub fn options(&self) -> &ScanOptions {
        &self.options
    }

    /// Scan a source file and extract its facts.
    ///
    /// `relative` is the `/`-separated path under the project root and decides
    /// the module path; `absolute` is recorded as the interception coordinate.
    pub fn scan_file(
        &mut self,
        relative: &str,
        absolute: &str,
        content: &str,
    ) -> Result<FileFacts, ScanError> {
        let start = Instant::now();

        let tree = self
            .parser
            .parse(content, None)
            .ok_or_else(|| ScanError::ParseFailed(relative.to_string()))?;
        let root = tree.root_node();

        let (module_path, is_crate_root) = module_path_for(relative);
        let item_insert = insertion_offset(&root, content.as_bytes(), 0);
        let mut facts = FileFacts {
            path: relative.to_string(),
            absolute_path: absolute.to_string(),
            module_path: module_path.clone(),
            hash: content_hash(content),
            is_crate_root,
            item_insert,
            ..Default::default()
        };

        let mut walker = FileWalker {
            source: content,
            bytes: content.as_bytes(),
            options: &self.options,
            alias_re: &self.alias_re,
            facts: &mut facts,
        };
        walker.collect_structs(&root, &module_path);
        walker.walk_items(&root, &module_path, item_insert);
        walker.collect_markers(&root);

        facts.registrations.sort_by_key(|r| r.method_range.start);
        for (ordinal, reg) in facts.registrations.iter_mut().enumerate() {
            reg.ordinal = ordinal;
        }
        facts.calls.sort_by_key(|c| c.token_range.start);

        #[cfg(feature = "telemetry")]
        GLOBAL_METRICS.record_operation("scanner.parser.scan_file", start.elapsed());
        tracing::trace!(
            file = relative,
            traits = facts.traits.len(),
            registrations = facts.registrations.len(),
            calls = facts.calls.len(),
            elapsed_us = start.elapsed().as_micros() as u64,
            "Scanned file"
        );

        Ok(facts)
    }
}

/// SHA-256 of a file's content, hex encoded.
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Module path and crate-root flag for a relative file path.
///
/// `src/lib.rs` → `crate`, `src/shop/mod.rs` → `crate::shop`,
/// `src/shop/orders.rs` → `crate::shop::orders`.
pub fn module_path_for(relative: &str) -> (String, bool) {
    let trimmed = relative.trim_start_matches("./");
    let trimmed = trimmed.strip_prefix("src/").unwrap_or(trimmed);
    let mut parts: Vec<&str> = trimmed.split('/').filter(|p| !p.is_empty()).collect();

    let file = parts.pop().unwrap_or("lib.rs");
    let stem = file.strip_suffix(".rs").unwrap_or(file);

    let is_crate_root = parts.is_empty() && (stem == "lib" || stem == "main");
    if !is_crate_root && stem != "mod" {
        parts.push(stem);
    }

    let mut path = String::from("crate");
    for part in parts {
        path.push_str("::");
        path.push_str(part);
    }
    (path, is_crate_root)
}

/// Byte offset after the leading inner attributes and inner doc comments of
/// an item list, where new items can be inserted.
fn insertion_offset(list: &Node, source: &[u8], default: usize) -> usize {
    let mut offset = default;
    for i in 0..list.child_count() {
        let Some(child) = list.child(i) else { continue };
        match child.kind() {
            "{" => offset = child.end_byte(),
            "inner_attribute_item" => offset = child.end_byte(),
            "line_comment" | "block_comment" => {
                let text = child.utf8_text(source).unwrap_or("");
                if text.starts_with("//!") || text.starts_with("/*!") {
                    offset = child.end_byte();
                }
            }
            _ => break,
        }
    }
    offset
}

/// Local binding visible inside a function body.
///
/// A binding without a type shadows outer bindings of the same name so
/// that calls on it are never attributed to the shadowed type.
#[derive(Debug, Clone)]
struct Binding {
    name: String,
    ty: Option<String>,
    /// Byte offset from which the binding is visible.
    visible_from: usize,
    /// Byte offset where the enclosing block, arm or closure ends.
    visible_until: usize,
}

/// Function-level context for call-site extraction.
#[derive(Debug, Clone)]
struct FnScope {
    module_path: String,
    scope_insert: usize,
    self_type: Option<String>,
    bindings: Vec<Binding>,
    bounds: Vec<(String, String)>,
}

impl FnScope {
    /// Type of `name` as visible at `offset`.
    fn lookup(&self, name: &str, offset: usize) -> Option<String> {
        self.bindings
            .iter()
            .filter(|b| b.name == name && b.visible_from <= offset && offset < b.visible_until)
            .max_by_key(|b| b.visible_from)
            .and_then(|b| b.ty.clone())
    }

    /// Replace a bare generic parameter by its bounds.
    fn substitute_generics(&self, ty: &str) -> String {
        let core = strip_references(ty);
        self.bounds
            .iter()
            .find(|(name, _)| name == core)
            .map(|(_, bounds)| format!("impl {}", bounds))
            .unwrap_or_else(|| ty.to_string())
    }
}

struct FileWalker<'a> {
    source: &'a str,
    bytes: &'a [u8],
    options: &'a ScanOptions,
    alias_re: &'a Regex,
    facts: &'a mut FileFacts,
}

impl<'a> FileWalker<'a> {
    /// First pass: record struct fields so `self.field` receivers resolve
    /// regardless of declaration order.
    fn collect_structs(&mut self, list: &Node, module_path: &str) {
        for i in 0..list.child_count() {
            let Some(child) = list.child(i) else { continue };
            match child.kind() {
                "struct_item" => {
                    if let Some(decl) = self.struct_decl(&child, module_path) {
                        self.facts.structs.push(decl);
                    }
                }
                "mod_item" => {
                    if let (Some(name), Some(body)) = (
                        self.field_text(&child, "name"),
                        child.child_by_field_name("body"),
                    ) {
                        let nested = format!("{}::{}", module_path, name);
                        self.collect_structs(&body, &nested);
                    }
                }
                _ => {}
            }
        }
    }

    /// Second pass: walk items of a module body.
    fn walk_items(&mut self, list: &Node, module_path: &str, scope_insert: usize) {
        for i in 0..list.child_count() {
            let Some(child) = list.child(i) else { continue };
            match child.kind() {
                "mod_item" => {
                    let Some(name) = self.field_text(&child, "name") else { continue };
                    let nested = format!("{}::{}", module_path, name);
                    self.facts.modules.push(nested.clone());
                    if let Some(body) = child.child_by_field_name("body") {
                        let insert = insertion_offset(&body, self.bytes, body.start_byte() + 1);
                        self.walk_items(&body, &nested, insert);
                    }
                }
                "trait_item" => {
                    if let Some(decl) = self.trait_decl(&child, module_path) {
                        let scope = FnScope {
                            module_path: module_path.to_string(),
                            scope_insert,
                            self_type: Some(decl.name.clone()),
                            bindings: Vec::new(),
                            bounds: Vec::new(),
                        };
                        self.facts.traits.push(decl);
                        if let Some(body) = child.child_by_field_name("body") {
                            self.walk_fn_items(&body, &scope);
                        }
                    }
                }
                "impl_item" => {
                    let self_type = self.field_text(&child, "type");
                    if let (Some(trait_name), Some(self_type)) =
                        (self.field_text(&child, "trait"), &self_type)
                    {
                        self.facts.impls.push(ImplDecl {
                            trait_name,
                            self_type: self_type.clone(),
                            module_path: module_path.to_string(),
                        });
                    }
                    let scope = FnScope {
                        module_path: module_path.to_string(),
                        scope_insert,
                        self_type,
                        bindings: Vec::new(),
                        bounds: child
                            .child_by_field_name("type_parameters")
                            .map(|n| generic_bounds(&self.text(&n)))
                            .unwrap_or_default(),
                    };
                    if let Some(body) = child.child_by_field_name("body") {
                        self.walk_fn_items(&body, &scope);
                    }
                }
                "struct_item" => {
                    self.decorator_decl(&child, module_path);
                }
                "use_declaration" => {
                    if let Some(arg) = child.child_by_field_name("argument") {
                        self.flatten_use(&arg, "", module_path);
                    }
                }
                "function_item" => {
                    let scope = FnScope {
                        module_path: module_path.to_string(),
                        scope_insert,
                        self_type: None,
                        bindings: Vec::new(),
                        bounds: Vec::new(),
                    };
                    self.function(&child, &scope);
                }
                _ => {}
            }
        }
    }

    /// Walk the functions inside an impl or trait body.
    fn walk_fn_items(&mut self, body: &Node, scope: &FnScope) {
        for i in 0..body.child_count() {
            if let Some(item) = body.child(i) {
                if item.kind() == "function_item" {
                    self.function(&item, scope);
                }
            }
        }
    }

    /// Record every marker attribute, wherever it sits.
    fn collect_markers(&mut self, node: &Node) {
        if node.kind() == "attribute_item" {
            let (path, _) = parse_attribute(&self.text(node));
            if path == self.options.marker || path == self.options.decorates_marker {
                let range = line_range(self.bytes, node.start_byte(), node.end_byte());
                self.facts.marker_ranges.push(range);
            }
            return;
        }
        for i in 0..node.child_count() {
            if let Some(child) = node.child(i) {
                self.collect_markers(&child);
            }
        }
    }

    // Declarations

    fn trait_decl(&self, node: &Node, module_path: &str) -> Option<TraitDecl> {
        let name_node = node.child_by_field_name("name")?;
        let name = self.text(&name_node);

        let mut marker = None;
        let mut is_async_trait = false;
        let mut async_trait_args = None;
        for (path, args) in self.attributes(node) {
            if path == self.options.marker {
                let alias = args
                    .as_deref()
                    .and_then(|a| self.alias_re.captures(a))
                    .and_then(|c| c.get(1))
                    .map(|m| m.as_str().to_string());
                marker = Some(TraitMarker { alias });
            } else if path == "async_trait" {
                is_async_trait = true;
                async_trait_args = args.filter(|a| !a.is_empty());
            }
        }

        let mut methods = Vec::new();
        let mut has_associated_items = false;
        if let Some(body) = node.child_by_field_name("body") {
            for i in 0..body.child_count() {
                let Some(item) = body.child(i) else { continue };
                match item.kind() {
                    "function_signature_item" | "function_item" => {
                        if let Some(method) = self.method_sig(&item) {
                            methods.push(method);
                        }
                    }
                    "associated_type" | "const_item" => has_associated_items = true,
                    _ => {}
                }
            }
        }

        Some(TraitDecl {
            name,
            module_path: module_path.to_string(),
            marker,
            is_async_trait,
            async_trait_args,
            supertraits: node
                .child_by_field_name("bounds")
                .map(|n| self.text(&n).trim_start_matches(':').trim().to_string()),
            generics: node
                .child_by_field_name("type_parameters")
                .map(|n| self.text(&n)),
            has_associated_items,
            methods,
            location: self.location(&name_node),
            offset: self.decl_start(node),
        })
    }

    fn method_sig(&self, node: &Node) -> Option<MethodSig> {
        let name_node = node.child_by_field_name("name")?;

        let mut receiver = Receiver::None;
        let mut params = Vec::new();
        if let Some(list) = node.child_by_field_name("parameters") {
            for i in 0..list.named_child_count() {
                let Some(param) = list.named_child(i) else { continue };
                match param.kind() {
                    "self_parameter" => receiver = receiver_of(&self.text(&param)),
                    "parameter" => {
                        let pattern = self.field_text(&param, "pattern").unwrap_or_default();
                        let ty = self.field_text(&param, "type").unwrap_or_default();
                        if pattern == "self" || pattern == "mut self" {
                            // `self: &Self` style receivers
                            receiver = receiver_of(&ty);
                        } else {
                            params.push(ty);
                        }
                    }
                    _ => {}
                }
            }
        }

        let mut is_async = false;
        let mut is_unsafe = false;
        let mut where_clause = None;
        for i in 0..node.child_count() {
            let Some(child) = node.child(i) else { continue };
            match child.kind() {
                "function_modifiers" => {
                    let text = self.text(&child);
                    is_async = text.split_whitespace().any(|w| w == "async");
                    is_unsafe = text.split_whitespace().any(|w| w == "unsafe");
                }
                "where_clause" => where_clause = Some(self.text(&child)),
                _ => {}
            }
        }

        let mut marker = MemberMarker::Unmarked;
        for (path, args) in self.attributes(node) {
            if path == self.options.marker {
                let skip = args
                    .as_deref()
                    .map(|a| a.split(',').any(|p| p.trim() == "skip"))
                    .unwrap_or(false);
                marker = if skip {
                    MemberMarker::Skip
                } else {
                    MemberMarker::Traced
                };
            }
        }

        Some(MethodSig {
            name: self.text(&name_node),
            receiver,
            params,
            return_type: self.field_text(node, "return_type"),
            generics: self.field_text(node, "type_parameters"),
            where_clause,
            is_async,
            is_unsafe,
            has_default: node.kind() == "function_item",
            marker,
            location: self.location(&name_node),
        })
    }

    fn struct_decl(&self, node: &Node, module_path: &str) -> Option<StructDecl> {
        let name = self.field_text(node, "name")?;
        let mut fields = Vec::new();
        if let Some(body) = node.child_by_field_name("body") {
            for i in 0..body.named_child_count() {
                let Some(field) = body.named_child(i) else { continue };
                if field.kind() == "field_declaration" {
                    if let (Some(fname), Some(fty)) = (
                        self.field_text(&field, "name"),
                        self.field_text(&field, "type"),
                    ) {
                        fields.push((fname, fty));
                    }
                }
            }
        }
        Some(StructDecl {
            name,
            module_path: module_path.to_string(),
            fields,
        })
    }

    fn decorator_decl(&mut self, node: &Node, module_path: &str) {
        let Some(name_node) = node.child_by_field_name("name") else { return };
        for (path, args) in self.attributes(node) {
            if path != self.options.decorates_marker {
                continue;
            }
            let target = args.unwrap_or_default().trim().to_string();
            self.facts.decorators.push(DecoratorDecl {
                type_name: self.text(&name_node),
                module_path: module_path.to_string(),
                target,
                location: self.location(&name_node),
                offset: self.decl_start(node),
            });
        }
    }

    fn flatten_use(&mut self, node: &Node, prefix: &str, module_path: &str) {
        let join = |prefix: &str, path: &str| {
            if prefix.is_empty() {
                path.to_string()
            } else if path.is_empty() {
                prefix.to_string()
            } else {
                format!("{}::{}", prefix, path)
            }
        };

        match node.kind() {
            "use_as_clause" => {
                let path = self.field_text(node, "path").unwrap_or_default();
                let alias = self.field_text(node, "alias");
                self.facts.uses.push(UseDecl {
                    module_path: module_path.to_string(),
                    path: join(prefix, &path),
                    alias,
                });
            }
            "use_wildcard" => {
                let text = self.text(node);
                let path = text.trim_end_matches('*').trim_end_matches("::");
                self.facts.uses.push(UseDecl {
                    module_path: module_path.to_string(),
                    path: join(prefix, path),
                    alias: None,
                });
            }
            "scoped_use_list" => {
                let path = self.field_text(node, "path").unwrap_or_default();
                let nested = join(prefix, &path);
                if let Some(list) = node.child_by_field_name("list") {
                    self.flatten_use(&list, &nested, module_path);
                }
            }
            "use_list" => {
                for i in 0..node.named_child_count() {
                    if let Some(item) = node.named_child(i) {
                        self.flatten_use(&item, prefix, module_path);
                    }
                }
            }
            "self" if !prefix.is_empty() => {
                self.facts.uses.push(UseDecl {
                    module_path: module_path.to_string(),
                    path: prefix.to_string(),
                    alias: Some(last_segment(prefix).to_string()),
                });
            }
            "line_comment" | "block_comment" => {}
            _ => {
                let path = join(prefix, &self.text(node));
                let alias = last_segment(&path).to_string();
                self.facts.uses.push(UseDecl {
                    module_path: module_path.to_string(),
                    path,
                    alias: Some(alias),
                });
            }
        }
    }

    // Function bodies

    fn function(&mut self, node: &Node, outer: &FnScope) {
        let mut scope = FnScope {
            module_path: outer.module_path.clone(),
            scope_insert: outer.scope_insert,
            self_type: outer.self_type.clone(),
            bindings: Vec::new(),
            bounds: outer.bounds.clone(),
        };
        if let Some(generics) = node.child_by_field_name("type_parameters") {
            scope.bounds.extend(generic_bounds(&self.text(&generics)));
        }
        for i in 0..node.child_count() {
            if let Some(child) = node.child(i) {
                if child.kind() == "where_clause" {
                    scope.bounds.extend(generic_bounds(&self.text(&child)));
                }
            }
        }

        if let Some(list) = node.child_by_field_name("parameters") {
            self.parameter_bindings(&list, node.start_byte(), node.end_byte(), &mut scope);
        }

        if let Some(body) = node.child_by_field_name("body") {
            self.walk_body(&body, &mut scope);
        }
    }

    fn walk_body(&mut self, node: &Node, scope: &mut FnScope) {
        match node.kind() {
            "function_item" => {
                // nested fn items do not capture the enclosing bindings
                let outer = FnScope {
                    module_path: scope.module_path.clone(),
                    scope_insert: scope.scope_insert,
                    self_type: None,
                    bindings: Vec::new(),
                    bounds: Vec::new(),
                };
                self.function(node, &outer);
                return;
            }
            "let_declaration" => self.let_binding(node, scope),
            "let_condition" => {
                // `if let` / `while let`: visible in the whole conditional
                let until = conditional_end(node);
                self.shadow_pattern(node, node.end_byte(), until, scope);
            }
            "match_arm" | "for_expression" => {
                if let Some(pattern) = node.child_by_field_name("pattern") {
                    self.shadow_names(&pattern, pattern.end_byte(), node.end_byte(), scope);
                }
            }
            "closure_expression" => self.closure_bindings(node, scope),
            "call_expression" => self.call(node, scope),
            _ => {}
        }

        for i in 0..node.child_count() {
            if let Some(child) = node.child(i) {
                self.walk_body(&child, scope);
            }
        }
    }

    fn let_binding(&self, node: &Node, scope: &mut FnScope) {
        let from = node.end_byte();
        let until = node.parent().map(|p| p.end_byte()).unwrap_or(usize::MAX);
        let Some(pattern) = self.field_text(node, "pattern") else { return };
        let name = pattern.trim_start_matches("mut ").trim().to_string();
        if !is_identifier(&name) {
            self.shadow_pattern(node, from, until, scope);
            return;
        }

        let ty = match self.field_text(node, "type") {
            Some(ty) => Some(scope.substitute_generics(&ty)),
            None => node
                .child_by_field_name("value")
                .and_then(|v| self.infer_constructed_type(&v)),
        };

        scope.bindings.push(Binding {
            name,
            ty,
            visible_from: from,
            visible_until: until,
        });
    }

    fn closure_bindings(&self, node: &Node, scope: &mut FnScope) {
        let Some(params) = node.child_by_field_name("parameters") else { return };
        self.parameter_bindings(&params, node.start_byte(), node.end_byte(), scope);
    }

    /// Bindings of a function or closure parameter list.
    fn parameter_bindings(&self, list: &Node, from: usize, until: usize, scope: &mut FnScope) {
        for i in 0..list.named_child_count() {
            let Some(param) = list.named_child(i) else { continue };
            if param.kind() != "parameter" {
                // untyped closure parameters
                self.shadow_names(&param, from, until, scope);
                continue;
            }
            let pattern = self.field_text(&param, "pattern").unwrap_or_default();
            let name = pattern.trim_start_matches("mut ").trim().to_string();
            match self.field_text(&param, "type") {
                Some(ty) if is_identifier(&name) => {
                    let ty = scope.substitute_generics(&ty);
                    scope.bindings.push(Binding {
                        name,
                        ty: Some(ty),
                        visible_from: from,
                        visible_until: until,
                    });
                }
                _ => {
                    if let Some(pattern) = param.child_by_field_name("pattern") {
                        self.shadow_names(&pattern, from, until, scope);
                    }
                }
            }
        }
    }

    /// Untyped shadows for the names bound by the `pattern` field of `node`.
    fn shadow_pattern(&self, node: &Node, from: usize, until: usize, scope: &mut FnScope) {
        if let Some(pattern) = node.child_by_field_name("pattern") {
            self.shadow_names(&pattern, from, until, scope);
        }
    }

    fn shadow_names(&self, pattern: &Node, from: usize, until: usize, scope: &mut FnScope) {
        let mut names = Vec::new();
        self.pattern_names(pattern, &mut names);
        for name in names {
            scope.bindings.push(Binding {
                name,
                ty: None,
                visible_from: from,
                visible_until: until,
            });
        }
    }

    /// Identifiers a pattern may bind. Over-approximates: enum variants and
    /// constants in patterns are collected too.
    fn pattern_names(&self, pattern: &Node, names: &mut Vec<String>) {
        match pattern.kind() {
            "identifier" | "shorthand_field_identifier" => names.push(self.text(pattern)),
            "scoped_identifier" | "field_identifier" | "type_identifier" => {}
            _ => {
                for i in 0..pattern.named_child_count() {
                    if let Some(child) = pattern.named_child(i) {
                        self.pattern_names(&child, names);
                    }
                }
            }
        }
    }

    /// Type of constructor-like expressions: `T::new(..)`, `T { .. }`,
    /// `Box::new(T::new(..))`.
    fn infer_constructed_type(&self, value: &Node) -> Option<String> {
        match value.kind() {
            "struct_expression" => self.field_text(value, "name").map(|n| strip_generics(&n).to_string()),
            "call_expression" => {
                let function = value.child_by_field_name("function")?;
                if function.kind() != "scoped_identifier" {
                    return None;
                }
                let path = self.field_text(&function, "path")?;
                let head = last_segment(&path);
                if matches!(head, "Box" | "Arc" | "Rc") {
                    let args = value.child_by_field_name("arguments")?;
                    let inner = args.named_child(0)?;
                    return self
                        .infer_constructed_type(&inner)
                        .map(|t| format!("{}<{}>", head, t));
                }
                if head.chars().next().map(|c| c.is_uppercase()).unwrap_or(false) {
                    Some(strip_generics(&path).to_string())
                } else {
                    None
                }
            }
            "parenthesized_expression" | "reference_expression" => {
                let inner = value.named_child(value.named_child_count().checked_sub(1)?)?;
                self.infer_constructed_type(&inner)
            }
            _ => None,
        }
    }

    fn call(&mut self, node: &Node, scope: &FnScope) {
        let Some(function) = node.child_by_field_name("function") else { return };

        let (access, type_args) = match function.kind() {
            "field_expression" => (function, None),
            "generic_function" => {
                let Some(inner) = function.child_by_field_name("function") else { return };
                if inner.kind() != "field_expression" {
                    return;
                }
                (inner, function.child_by_field_name("type_arguments"))
            }
            _ => return,
        };

        let (Some(value), Some(field)) = (
            access.child_by_field_name("value"),
            access.child_by_field_name("field"),
        ) else {
            return;
        };
        let method = self.text(&field);

        if let Some(type_args) = type_args {
            if self.registration(node, &value, &field, &type_args, scope) {
                return;
            }
        }

        let receiver_type = match value.kind() {
            "self" => scope.self_type.clone(),
            "identifier" => scope.lookup(&self.text(&value), node.start_byte()),
            "field_expression" => self.field_receiver_type(&value, scope),
            _ => None,
        };
        let Some(receiver_type) = receiver_type else { return };

        self.facts.calls.push(MethodCall {
            method,
            receiver: self.text(&value),
            receiver_type,
            module_path: scope.module_path.clone(),
            location: self.location(&field),
            token_range: ByteRange::new(field.start_byte(), field.end_byte()),
            scope_insert: scope.scope_insert,
        });
    }

    /// Type of `self.field` from the struct declarations of this file.
    fn field_receiver_type(&self, value: &Node, scope: &FnScope) -> Option<String> {
        let base = value.child_by_field_name("value")?;
        if base.kind() != "self" {
            return None;
        }
        let field = self.field_text(value, "field")?;
        let self_type = scope.self_type.as_deref()?;
        let self_name = last_segment(self_type);
        self.facts
            .structs
            .iter()
            .find(|s| s.name == self_name)
            .and_then(|s| s.fields.iter().find(|(name, _)| *name == field))
            .map(|(_, ty)| ty.clone())
    }

    /// Record a registration call; returns false if the method is not one.
    fn registration(
        &mut self,
        call: &Node,
        value: &Node,
        field: &Node,
        type_args: &Node,
        scope: &FnScope,
    ) -> bool {
        let method = self.text(field);
        let Some(rest) = method.strip_prefix(&self.options.registration_prefix) else {
            return false;
        };
        let (lifetime_name, kind) = if let Some(lt) = rest.strip_suffix("_factory") {
            (lt, "factory")
        } else if let Some(lt) = rest.strip_suffix("_instance") {
            (lt, "instance")
        } else {
            (rest, "type")
        };
        let Some(lifetime) = Lifetime::from_str(lifetime_name) else {
            return false;
        };

        let types: Vec<Node> = (0..type_args.named_child_count())
            .filter_map(|i| type_args.named_child(i))
            .filter(|n| !n.kind().ends_with("comment"))
            .collect();
        let Some(service) = types.first() else { return false };

        let Some(args) = call.child_by_field_name("arguments") else { return false };
        let arg_nodes: Vec<Node> = (0..args.named_child_count())
            .filter_map(|i| args.named_child(i))
            .filter(|n| !n.kind().ends_with("comment") && n.kind() != "attribute_item")
            .collect();

        let strategy = match (kind, types.len(), arg_nodes.len()) {
            ("type", 2, 0) => ConstructionStrategy::Implementation {
                type_name: self.text(&types[1]),
            },
            ("factory", 1, 1) => ConstructionStrategy::Factory {
                expr: self.text(&arg_nodes[0]),
            },
            ("instance", 1, 1) => ConstructionStrategy::Instance {
                expr: self.text(&arg_nodes[0]),
            },
            _ => ConstructionStrategy::Undetermined,
        };

        let arg_range = if arg_nodes.len() == 1 {
            Some(ByteRange::new(arg_nodes[0].start_byte(), arg_nodes[0].end_byte()))
        } else {
            None
        };

        self.facts.registrations.push(RegistrationSite {
            receiver: self.text(value),
            method,
            lifetime,
            strategy,
            service_type: self.text(service),
            module_path: scope.module_path.clone(),
            location: self.location(field),
            ordinal: 0,
            method_range: ByteRange::new(field.start_byte(), field.end_byte()),
            type_args_range: ByteRange::new(type_args.start_byte(), type_args.end_byte()),
            args_range: ByteRange::new(args.start_byte(), args.end_byte()),
            arg_range,
        });
        true
    }

    // Helpers

    /// Attributes attached to an item, as `(last path segment, arguments)`.
    fn attributes(&self, node: &Node) -> Vec<(String, Option<String>)> {
        let mut attrs = Vec::new();
        let mut prev = node.prev_sibling();
        while let Some(sibling) = prev {
            match sibling.kind() {
                "attribute_item" => attrs.push(parse_attribute(&self.text(&sibling))),
                "line_comment" | "block_comment" => {}
                _ => break,
            }
            prev = sibling.prev_sibling();
        }
        attrs.reverse();
        attrs
    }

    /// Start of an item including its attributes.
    fn decl_start(&self, node: &Node) -> usize {
        let mut start = node.start_byte();
        let mut prev = node.prev_sibling();
        while let Some(sibling) = prev {
            match sibling.kind() {
                "attribute_item" | "line_comment" | "block_comment" => {
                    start = sibling.start_byte();
                }
                _ => break,
            }
            prev = sibling.prev_sibling();
        }
        start
    }

    fn text(&self, node: &Node) -> String {
        node.utf8_text(self.bytes).unwrap_or("").to_string()
    }

    fn field_text(&self, node: &Node, field: &str) -> Option<String> {
        node.child_by_field_name(field).map(|n| self.text(&n))
    }

    /// 1-based line and character column of a node's first byte.
    fn location(&self, node: &Node) -> Location {
        let point = node.start_position();
        let line_start = node.start_byte() - point.column;
        let column = self.source[line_start..node.start_byte()].chars().count() as u32 + 1;
        Location {
            file: self.facts.path.clone(),
            line: point.row as u32 + 1,
            column,
        }
    }
}

/// Split `#[path(args)]` into the last path segment and the argument text.
fn parse_attribute(text: &str) -> (String, Option<String>) {
    let inner = text
        .trim()
        .trim_start_matches("#[")
        .trim_end_matches(']')
        .trim();
    match inner.find(|c| c == '(' || c == '=') {
        Some(idx) if inner.as_bytes()[idx] == b'(' => {
            let path = inner[..idx].trim();
            let args = inner[idx + 1..].trim_end_matches(')').trim();
            (last_segment(path).to_string(), Some(args.to_string()))
        }
        Some(idx) => (last_segment(inner[..idx].trim()).to_string(), None),
        None => (last_segment(inner).to_string(), None),
    }
}

fn receiver_of(text: &str) -> Receiver {
    let text = text.trim();
    if text.starts_with('&') {
        if text.contains("mut ") {
            Receiver::RefMut
        } else {
            Receiver::Ref
        }
    } else {
        Receiver::Value
    }
}

/// Widen an attribute range to its whole line when nothing else is on it.
fn line_range(bytes: &[u8], start: usize, end: usize) -> ByteRange {
    let blank = |b: &u8| *b == b' ' || *b == b'\t';
    let line_start = bytes[..start]
        .iter()
        .rposition(|b| *b == b'\n')
        .map(|i| i + 1)
        .unwrap_or(0);
    let rest = &bytes[end..];
    let line_end = rest.iter().position(|b| !blank(b)).map(|i| end + i);
    match line_end {
        Some(newline) if bytes[line_start..start].iter().all(blank) && bytes[newline] == b'\n' => {
            ByteRange::new(line_start, newline + 1)
        }
        None if bytes[line_start..start].iter().all(blank) => ByteRange::new(line_start, bytes.len()),
        _ => ByteRange::new(start, end),
    }
}

/// End of the `if let` / `while let` expression owning a let condition.
fn conditional_end(node: &Node) -> usize {
    let mut current = node.parent();
    while let Some(parent) = current {
        if matches!(parent.kind(), "if_expression" | "while_expression") {
            return parent.end_byte();
        }
        current = parent.parent();
    }
    node.end_byte()
}

fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    matches!(chars.next(), Some(c) if c == '_' || c.is_alphabetic())
        && chars.all(|c| c == '_' || c.is_alphanumeric())
}
