// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Non-overlapping text edits over source files.

use std::collections::BTreeMap;

use crate::error::GenerateError;
use crate::model::ByteRange;

/// Replace `range` with `text`; an empty range is an insertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edit {
    pub range: ByteRange,
    pub text: String,
}

impl Edit {
    pub fn insert(offset: usize, text: impl Into<String>) -> Self {
        Self {
            range: ByteRange::new(offset, offset),
            text: text.into(),
        }
    }

    pub fn replace(range: ByteRange, text: impl Into<String>) -> Self {
        Self {
            range,
            text: text.into(),
        }
    }
}

/// Edits per relative file path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileEdits {
    files: BTreeMap<String, Vec<Edit>>,
}

impl FileEdits {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, file: &str, edit: Edit) {
        self.files.entry(file.to_string()).or_default().push(edit);
    }

    /// Append all edits of `other`, keeping their order after ours.
    pub fn extend(&mut self, other: FileEdits) {
        for (file, edits) in other.files {
            self.files.entry(file).or_default().extend(edits);
        }
    }

    pub fn get(&self, file: &str) -> &[Edit] {
        self.files.get(file).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn files(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    /// Total number of edits.
    pub fn len(&self) -> usize {
        self.files.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Apply `edits` to `source`.
///
/// Insertions at the same offset keep their relative order, and an insertion
/// at the start of a replaced range lands before the replacement. Any other
/// overlap is an error.
pub fn apply_edits(file: &str, source: &str, edits: &[Edit]) -> Result<String, GenerateError> {
    let mut sorted: Vec<&Edit> = edits.iter().collect();
    sorted.sort_by_key(|e| (e.range.start, e.range.end));

    let mut out = String::with_capacity(source.len() + edits.iter().map(|e| e.text.len()).sum::<usize>());
    let mut cursor = 0;
    for edit in sorted {
        let ByteRange { start, end } = edit.range;
        if start < cursor
            || end < start
            || end > source.len()
            || !source.is_char_boundary(start)
            || !source.is_char_boundary(end)
        {
            return Err(GenerateError::OverlappingEdits {
                file: file.to_string(),
                start,
                end,
            });
        }
        out.push_str(&source[cursor..start]);
        out.push_str(&edit.text);
        cursor = end;
    }
    out.push_str(&source[cursor..]);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replacements_and_insertions() {
        let source = "repo.save(item);";
        let edits = vec![
            Edit::replace(ByteRange::new(5, 9), "__traced_save_l1c6"),
            Edit::insert(0, "use x as _;\n"),
        ];
        assert_eq!(
            apply_edits("a.rs", source, &edits).unwrap(),
            "use x as _;\nrepo.__traced_save_l1c6(item);"
        );
    }

    #[test]
    fn test_insertions_at_same_offset_keep_order() {
        let edits = vec![Edit::insert(1, "a"), Edit::insert(1, "b"), Edit::insert(1, "c")];
        assert_eq!(apply_edits("a.rs", "xy", &edits).unwrap(), "xabcy");
    }

    #[test]
    fn test_wrapping_insertions_around_a_replacement() {
        let source = "f(build)";
        let edits = vec![
            Edit::insert(2, "{ let g = "),
            Edit::insert(7, "; g }"),
            Edit::replace(ByteRange::new(2, 7), "make"),
        ];
        assert_eq!(apply_edits("a.rs", source, &edits).unwrap(), "f({ let g = make; g })");
    }

    #[test]
    fn test_overlap_is_rejected() {
        let edits = vec![
            Edit::replace(ByteRange::new(0, 4), "x"),
            Edit::replace(ByteRange::new(2, 6), "y"),
        ];
        let err = apply_edits("a.rs", "abcdefgh", &edits).unwrap_err();
        assert!(matches!(err, GenerateError::OverlappingEdits { start: 2, .. }));
    }

    #[test]
    fn test_file_edits_collects_per_file() {
        let mut edits = FileEdits::new();
        edits.push("src/a.rs", Edit::insert(0, "a"));
        let mut more = FileEdits::new();
        more.push("src/a.rs", Edit::insert(0, "b"));
        more.push("src/b.rs", Edit::insert(0, "c"));
        edits.extend(more);

        assert_eq!(edits.len(), 3);
        assert_eq!(edits.files().collect::<Vec<_>>(), vec!["src/a.rs", "src/b.rs"]);
        assert_eq!(apply_edits("src/a.rs", "", edits.get("src/a.rs")).unwrap(), "ab");
        assert!(edits.get("src/c.rs").is_empty());
    }
}
