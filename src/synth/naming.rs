// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Deterministic names for generated items.
//!
//! Module names are an injective encoding of a path: `_` inside a segment is
//! written `_0`, segments are joined with a single `_`, and characters that
//! cannot appear in an identifier are written `_1` plus six hex digits.
//! Identifier segments never start with a digit, so a `_` followed by `0` or
//! `1` is always an escape and any other `_` is a separator.

use std::collections::BTreeMap;

use crate::error::GenerateError;

const KEYWORDS: &[&str] = &[
    "as", "async", "await", "break", "const", "continue", "crate", "dyn", "else", "enum",
    "extern", "false", "fn", "for", "if", "impl", "in", "let", "loop", "match", "mod", "move",
    "mut", "pub", "ref", "return", "self", "static", "struct", "super", "trait", "true", "type",
    "unsafe", "use", "where", "while", "abstract", "become", "box", "do", "final", "gen", "macro",
    "override", "priv", "try", "typeof", "unsized", "virtual", "yield",
];

/// Segments of a qualified path below the crate root, raw prefixes removed.
fn crate_segments(path: &str) -> impl Iterator<Item = &str> {
    path.split("::")
        .filter(|s| !s.is_empty())
        .skip_while(|s| *s == "crate")
        .map(|s| s.trim_start_matches("r#"))
}

fn encode_segment(segment: &str, out: &mut String) {
    for (i, c) in segment.chars().enumerate() {
        if c == '_' {
            out.push_str("_0");
        } else if c.is_alphanumeric() && !(i == 0 && c.is_ascii_digit()) {
            out.push(c);
        } else {
            out.push_str(&format!("_1{:06x}", c as u32));
        }
    }
}

/// Injective module name for a sequence of segments.
pub fn encode_segments<'a>(segments: impl IntoIterator<Item = &'a str>) -> String {
    let mut out = String::new();
    for (i, segment) in segments.into_iter().enumerate() {
        if i > 0 {
            out.push('_');
        }
        encode_segment(segment, &mut out);
    }
    if KEYWORDS.contains(&out.as_str()) {
        out.insert_str(0, "r#");
    }
    out
}

/// Decorator type for a trait: `crate::shop::Orders` → `OrdersTraced`.
///
/// Unique inside the per-trait module from [`decorator_module_name`].
pub fn decorator_type_name(trait_path: &str) -> String {
    let name = crate_segments(trait_path).last().unwrap_or("Service");
    format!("{}Traced", name)
}

/// Module holding a trait's decorator: `crate::shop::Orders` → `shop_Orders`,
/// `crate::order_book::Repo` → `order_0book_Repo`.
pub fn decorator_module_name(trait_path: &str) -> String {
    encode_segments(crate_segments(trait_path))
}

/// Module grouping the interceptors of one source file:
/// `src/app/run.rs` → `app_run`, `src/lib.rs` → `lib`.
pub fn interceptor_file_module(relative_file: &str) -> String {
    let file = relative_file
        .strip_prefix("src/")
        .unwrap_or(relative_file)
        .trim_end_matches(".rs");
    encode_segments(file.split('/').filter(|p| !p.is_empty()))
}

/// Module holding the interceptors of one trait for one source file, relative
/// to the interceptors root: (`src/app.rs`, `crate::repo::Repo`) →
/// `app::repo_Repo`.
pub fn interceptor_module_path(relative_file: &str, trait_path: &str) -> String {
    format!(
        "{}::{}",
        interceptor_file_module(relative_file),
        decorator_module_name(trait_path)
    )
}

/// Extension trait carrying the interceptors of one trait.
pub fn extension_trait_name(trait_name: &str) -> String {
    format!("{}Intercepts", trait_name)
}

/// Interceptor method for a call site.
pub fn interceptor_method_name(method: &str, line: u32, column: u32) -> String {
    format!("__traced_{}_l{}c{}", method.trim_start_matches("r#"), line, column)
}

/// Tracks generated names and the symbol each was derived from.
#[derive(Debug, Default)]
pub struct NameRegistry {
    owners: BTreeMap<String, String>,
}

impl NameRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `name` for `owner`. Claiming it again for the same owner is a
    /// no-op; a different owner is a fatal collision.
    pub fn claim(&mut self, name: &str, owner: &str) -> Result<(), GenerateError> {
        match self.owners.get(name) {
            Some(existing) if existing != owner => {
                Err(GenerateError::collision(name, existing.clone(), owner))
            }
            Some(_) => Ok(()),
            None => {
                self.owners.insert(name.to_string(), owner.to_string());
                Ok(())
            }
        }
    }

    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }
}
