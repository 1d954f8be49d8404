// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Helpers for reading Rust type text as written in source.
//!
//! The scanner keeps types as text; these helpers peel references, smart
//! pointers and trait-object syntax to find the named types a receiver can
//! dispatch through.

/// Pointer-like wrappers whose method calls auto-deref to the inner type.
const DEREF_WRAPPERS: &[&str] = &["Box", "Arc", "Rc", "Pin"];

/// Bounds that never name an instrumentable trait.
const MARKER_BOUNDS: &[&str] = &["Send", "Sync", "Unpin", "Sized", "?Sized", "Copy", "Clone"];

/// Split `text` on `sep` at nesting depth zero (`<>`, `()`, `[]`).
pub fn split_top_level(text: &str, sep: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut current = String::new();
    let mut prev = '\0';

    for c in text.chars() {
        match c {
            '<' | '(' | '[' => depth += 1,
            // `->` inside `Fn(A) -> B` is not a closing bracket
            '>' if prev != '-' => depth -= 1,
            ')' | ']' => depth -= 1,
            _ => {}
        }
        if c == sep && depth == 0 {
            parts.push(current.trim().to_string());
            current.clear();
        } else {
            current.push(c);
        }
        prev = c;
    }
    if !current.trim().is_empty() {
        parts.push(current.trim().to_string());
    }
    parts
}

/// Strip references, lifetimes and `mut` from the front of a type.
pub fn strip_references(text: &str) -> &str {
    let mut rest = text.trim();
    loop {
        if let Some(stripped) = rest.strip_prefix('&') {
            rest = stripped.trim_start();
        } else if rest.starts_with('\'') {
            // lifetime after `&`
            let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
            rest = rest[end..].trim_start();
        } else if let Some(stripped) = rest.strip_prefix("mut ") {
            rest = stripped.trim_start();
        } else {
            return rest;
        }
    }
}

/// Strip a trailing generic argument list from a path (`Repo<T>` → `Repo`).
pub fn strip_generics(path: &str) -> &str {
    match path.find('<') {
        Some(idx) => path[..idx].trim(),
        None => path.trim(),
    }
}

/// Last `::` segment of a path.
pub fn last_segment(path: &str) -> &str {
    let path = strip_generics(path);
    path.rsplit("::").next().unwrap_or(path).trim()
}

/// Names a receiver of type `text` can dispatch methods through.
///
/// `&Box<dyn Repo + Send>` yields `["Repo"]`, `impl Orders + Audit` yields
/// `["Orders", "Audit"]`, a plain `OrderBook` yields `["OrderBook"]`.
pub fn dispatch_candidates(text: &str) -> Vec<String> {
    let core = strip_references(text);
    let core = core
        .strip_prefix("dyn ")
        .or_else(|| core.strip_prefix("impl "))
        .unwrap_or(core)
        .trim();

    let bounds = split_top_level(core, '+');
    if bounds.len() == 1 {
        if let Some(inner) = unwrap_deref(&bounds[0]) {
            return dispatch_candidates(inner);
        }
    }

    bounds
        .iter()
        .map(|b| b.trim().trim_start_matches('(').trim_end_matches(')').trim())
        .filter(|b| !b.is_empty() && !b.starts_with('\''))
        .filter(|b| !MARKER_BOUNDS.contains(&last_segment(b)))
        .map(|b| strip_generics(b).to_string())
        .collect()
}

/// If `ty` is `Box<T>`/`Arc<T>`/`Rc<T>`/`Pin<T>`, return `T`.
fn unwrap_deref(ty: &str) -> Option<&str> {
    let ty = ty.trim();
    let open = ty.find('<')?;
    if !ty.ends_with('>') {
        return None;
    }
    let head = last_segment(&ty[..open]);
    if DEREF_WRAPPERS.contains(&head) {
        Some(&ty[open + 1..ty.len() - 1])
    } else {
        None
    }
}

/// Parse `(name, bounds)` pairs from a generic list or where clause.
///
/// Accepts `<'a, R: Repo + Send, T>` and `where R: Repo, T: Clone`; lifetime
/// parameters and unbounded parameters are skipped.
pub fn generic_bounds(text: &str) -> Vec<(String, String)> {
    let text = text.trim();
    let text = text.strip_prefix("where").unwrap_or(text).trim();
    let text = text
        .strip_prefix('<')
        .and_then(|t| t.strip_suffix('>'))
        .unwrap_or(text);

    split_top_level(text, ',')
        .into_iter()
        .filter(|p| !p.starts_with('\''))
        .filter_map(|p| {
            let (name, bounds) = p.split_once(':')?;
            let name = name.trim().trim_start_matches("const ").trim();
            // `T: Trait = Default` carries a default after the bounds
            let bounds = split_top_level(bounds, '=')
                .into_iter()
                .next()
                .unwrap_or_default();
            if name.is_empty() || bounds.is_empty() {
                None
            } else {
                Some((name.to_string(), bounds))
            }
        })
        .collect()
}
