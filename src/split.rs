//! Pairing diff lines into side-by-side rows.
//!
//! This module turns the flat, origin-tagged line stream of each hunk into
//! rows with an old (left) and a new (right) half, ready to render in a split
//! view.
//!
//! ## Pairing Strategy
//!
//! A contiguous run of deletions is aligned index-for-index against the run
//! of additions that follows it, which is the usual shape of a local edit:
//!
//! ```text
//!  -foo        foo  | foo2
//!  -bar   =>   bar  | baz
//!  +foo2       ctx  | ctx
//!  +baz
//!   ctx
//! ```
//!
//! - Deletions and additions are buffered until a context line or the end of
//!   the hunk, then flushed as rows
//! - When the runs differ in length, the excess lines get an absent
//!   counterpart (rendered as a filler half)
//! - Rows with both halves present carry intraline segments from
//!   [`crate::highlight`]
//! - Context lines are mirrored on both sides and never highlighted

use crate::diff::{FileDiff, FileStatus, Hunk, Line, Origin, saturating_u32};
use crate::highlight::{Intraline, highlight, segments_into_lua};
use mlua::prelude::*;
use rayon::prelude::*;

/// One row of the split view.
///
/// At least one of `left` and `right` is always present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    /// The old-side line: a deletion, or the context line.
    pub left: Option<Line>,

    /// The new-side line: an addition, or the context line.
    pub right: Option<Line>,

    /// Intraline segments, present only when a deletion was paired with an
    /// addition.
    pub intraline: Option<Intraline>,
}

impl Row {
    /// Mirrors a context line on both sides.
    #[must_use]
    fn context(line: Line) -> Self {
        Self {
            left: Some(line.clone()),
            right: Some(line),
            intraline: None,
        }
    }

    /// Builds a row from a flushed deletion/addition pair.
    #[must_use]
    fn changed(left: Option<Line>, right: Option<Line>) -> Self {
        debug_assert!(left.is_some() || right.is_some());

        let intraline = match (&left, &right) {
            (Some(old), Some(new)) => Some(highlight(&old.content, &new.content)),
            _ => None,
        };
        debug_assert!(intraline.as_ref().is_none_or(|i| {
            left.as_ref().is_some_and(|l| i.left_text() == l.content)
                && right.as_ref().is_some_and(|r| i.right_text() == r.content)
        }));

        Self {
            left,
            right,
            intraline,
        }
    }
}

/// Buffers for the deletion and addition runs waiting to be paired.
#[derive(Default)]
struct RunPairer {
    deletions: Vec<Line>,
    additions: Vec<Line>,
    rows: Vec<Row>,
}

impl RunPairer {
    fn push(&mut self, line: Line) {
        match line.origin {
            Origin::Deletion => self.deletions.push(line),
            Origin::Addition => self.additions.push(line),
            Origin::Context => {
                self.flush();
                self.rows.push(Row::context(line));
            }
        }
    }

    /// Pairs the buffered runs index-for-index and empties both buffers.
    fn flush(&mut self) {
        let Self {
            deletions,
            additions,
            rows,
        } = self;

        let n = deletions.len().max(additions.len());
        let mut left = deletions.drain(..);
        let mut right = additions.drain(..);
        rows.extend((0..n).map(|_| Row::changed(left.next(), right.next())));
    }

    fn finish(mut self) -> Vec<Row> {
        self.flush();
        self.rows
    }
}

/// Pairs a hunk's lines into split rows.
///
/// Relative order within each run is preserved, and every buffered line is
/// emitted before the row of the context line that ends its run.
#[must_use]
pub fn pair(lines: Vec<Line>) -> Vec<Row> {
    let mut pairer = RunPairer {
        rows: Vec::with_capacity(lines.len()),
        ..RunPairer::default()
    };

    for line in lines {
        pairer.push(line);
    }

    pairer.finish()
}

/// A hunk's metadata together with its split rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitHunk {
    pub header: String,
    pub old_start: u32,
    pub old_count: u32,
    pub new_start: u32,
    pub new_count: u32,
    pub rows: Vec<Row>,
}

/// Splits a single hunk, passing its metadata through unchanged.
#[must_use]
pub fn split_hunk(hunk: Hunk) -> SplitHunk {
    SplitHunk {
        header: hunk.header,
        old_start: hunk.old_start,
        old_count: hunk.old_count,
        new_start: hunk.new_start,
        new_count: hunk.new_count,
        rows: pair(hunk.lines),
    }
}

/// A processed file ready for display in the split viewer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitFile {
    pub path: String,
    pub old_path: Option<String>,
    pub status: FileStatus,
    pub is_binary: bool,

    /// Count of added lines (for display in file list).
    pub additions: u32,

    /// Count of deleted lines (for display in file list).
    pub deletions: u32,

    pub hunks: Vec<SplitHunk>,

    /// Row indices (0-indexed, counted across all hunks) where hunks start.
    ///
    /// Used for navigation commands like "jump to next hunk".
    pub hunk_starts: Vec<u32>,
}

/// Splits every hunk of a file.
#[must_use]
pub fn split_file(file: FileDiff) -> SplitFile {
    let additions = file.additions();
    let deletions = file.deletions();

    let hunks: Vec<SplitHunk> = file.hunks.into_iter().map(split_hunk).collect();

    let mut hunk_starts = Vec::with_capacity(hunks.len());
    let mut offset = 0u32;
    for hunk in &hunks {
        hunk_starts.push(offset);
        offset = offset.saturating_add(saturating_u32(hunk.rows.len()));
    }

    SplitFile {
        path: file.path,
        old_path: file.old_path,
        status: file.status,
        is_binary: file.is_binary,
        additions,
        deletions,
        hunks,
        hunk_starts,
    }
}

/// Totals over every file of a diff.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiffStats {
    pub files_changed: usize,
    pub insertions: usize,
    pub deletions: usize,
}

/// The split form of a whole diff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitDiff {
    pub files: Vec<SplitFile>,
    pub stats: DiffStats,
}

/// Splits all files, in parallel, keeping their order.
#[must_use]
pub fn split_files(files: Vec<FileDiff>) -> SplitDiff {
    let files: Vec<SplitFile> = files.into_par_iter().map(split_file).collect();

    let stats = files.iter().fold(
        DiffStats {
            files_changed: files.len(),
            ..DiffStats::default()
        },
        |mut stats, file| {
            stats.insertions += file.additions as usize;
            stats.deletions += file.deletions as usize;
            stats
        },
    );

    SplitDiff { files, stats }
}

impl IntoLua for Line {
    fn into_lua(self, lua: &Lua) -> LuaResult<LuaValue> {
        let table = lua.create_table()?;
        table.set("origin", self.origin.as_str())?;
        table.set("content", self.content)?;
        table.set("old_lineno", self.old_lineno)?;
        table.set("new_lineno", self.new_lineno)?;
        Ok(LuaValue::Table(table))
    }
}

impl IntoLua for Row {
    fn into_lua(self, lua: &Lua) -> LuaResult<LuaValue> {
        let table = lua.create_table()?;
        table.set("left", self.left)?;
        table.set("right", self.right)?;
        if let Some(intraline) = self.intraline {
            table.set("left_segments", segments_into_lua(lua, intraline.left)?)?;
            table.set("right_segments", segments_into_lua(lua, intraline.right)?)?;
        }
        Ok(LuaValue::Table(table))
    }
}

impl IntoLua for SplitHunk {
    fn into_lua(self, lua: &Lua) -> LuaResult<LuaValue> {
        let table = lua.create_table()?;
        table.set("header", self.header)?;
        table.set("old_start", self.old_start)?;
        table.set("old_lines", self.old_count)?;
        table.set("new_start", self.new_start)?;
        table.set("new_lines", self.new_count)?;
        table.set("rows", lua.create_sequence_from(self.rows)?)?;
        Ok(LuaValue::Table(table))
    }
}

impl IntoLua for SplitFile {
    fn into_lua(self, lua: &Lua) -> LuaResult<LuaValue> {
        let table = lua.create_table()?;
        table.set("path", self.path)?;
        table.set("old_path", self.old_path)?;
        table.set("status", self.status.as_str())?;
        table.set("is_binary", self.is_binary)?;
        table.set("additions", self.additions)?;
        table.set("deletions", self.deletions)?;
        table.set("hunks", lua.create_sequence_from(self.hunks)?)?;
        table.set("hunk_starts", lua.create_sequence_from(self.hunk_starts)?)?;
        Ok(LuaValue::Table(table))
    }
}

impl IntoLua for DiffStats {
    fn into_lua(self, lua: &Lua) -> LuaResult<LuaValue> {
        let table = lua.create_table()?;
        table.set("files_changed", self.files_changed)?;
        table.set("insertions", self.insertions)?;
        table.set("deletions", self.deletions)?;
        Ok(LuaValue::Table(table))
    }
}

impl IntoLua for SplitDiff {
    fn into_lua(self, lua: &Lua) -> LuaResult<LuaValue> {
        let table = lua.create_table()?;
        table.set("files", lua.create_sequence_from(self.files)?)?;
        table.set("stats", self.stats)?;
        Ok(LuaValue::Table(table))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::highlight::Segment;
    use pretty_assertions::assert_eq;

    fn seg(text: &str, highlighted: bool) -> Segment {
        Segment {
            text: text.into(),
            highlighted,
        }
    }

    fn is_context(row: &Row) -> bool {
        row.left
            .as_ref()
            .is_some_and(|l| l.origin == Origin::Context)
    }

    fn content(line: &Option<Line>) -> Option<&str> {
        line.as_ref().map(|l| l.content.as_str())
    }

    fn hunk(lines: Vec<Line>) -> Hunk {
        Hunk {
            header: "@@ -1,3 +1,3 @@ impl Foo".into(),
            old_start: 1,
            old_count: 3,
            new_start: 1,
            new_count: 3,
            lines,
        }
    }

    /// A hunk mixing every run shape: paired, excess deletions, excess
    /// additions, pure runs and consecutive context.
    fn mixed_lines() -> Vec<Line> {
        vec![
            Line::context("use std::io;", 1, 1),
            Line::deletion("fn a() {}", 2),
            Line::deletion("fn b() {}", 3),
            Line::deletion("fn c() {}", 4),
            Line::addition("fn a() -> u8 {}", 2),
            Line::context("", 5, 3),
            Line::context("mod x;", 6, 4),
            Line::addition("mod y;", 5),
            Line::addition("mod z;", 6),
            Line::context("}", 7, 7),
            Line::deletion("trailing", 8),
            Line::deletion("more", 9),
            Line::addition("tail", 8),
        ]
    }

    #[test]
    fn scenario_equal_length_runs() {
        let rows = pair(vec![
            Line::deletion("foo", 1),
            Line::deletion("bar", 2),
            Line::addition("foo2", 1),
            Line::addition("baz", 2),
        ]);

        assert_eq!(rows.len(), 2);

        assert_eq!(content(&rows[0].left), Some("foo"));
        assert_eq!(content(&rows[0].right), Some("foo2"));
        let intraline = rows[0].intraline.as_ref().unwrap();
        assert_eq!(intraline.left.to_vec(), vec![seg("foo", false)]);
        assert_eq!(
            intraline.right.to_vec(),
            vec![seg("foo", false), seg("2", true)]
        );

        assert_eq!(content(&rows[1].left), Some("bar"));
        assert_eq!(content(&rows[1].right), Some("baz"));
        let intraline = rows[1].intraline.as_ref().unwrap();
        assert_eq!(
            intraline.left.to_vec(),
            vec![seg("ba", false), seg("r", true)]
        );
        assert_eq!(
            intraline.right.to_vec(),
            vec![seg("ba", false), seg("z", true)]
        );
    }

    #[test]
    fn scenario_more_deletions_than_additions() {
        let rows = pair(vec![
            Line::deletion("a", 1),
            Line::deletion("b", 2),
            Line::addition("x", 1),
        ]);

        assert_eq!(rows.len(), 2);
        assert_eq!(content(&rows[0].left), Some("a"));
        assert_eq!(content(&rows[0].right), Some("x"));
        assert!(rows[0].intraline.is_some());

        assert_eq!(content(&rows[1].left), Some("b"));
        assert!(rows[1].right.is_none());
        assert!(rows[1].intraline.is_none());
    }

    #[test]
    fn scenario_single_context_line() {
        let line = Line::context("unchanged", 4, 5);
        let rows = pair(vec![line.clone()]);

        assert_eq!(
            rows,
            vec![Row {
                left: Some(line.clone()),
                right: Some(line),
                intraline: None,
            }]
        );
        assert!(is_context(&rows[0]));
    }

    #[test]
    fn empty_hunk_has_no_rows() {
        assert!(pair(Vec::new()).is_empty());
        assert!(split_hunk(hunk(Vec::new())).rows.is_empty());
    }

    #[test]
    fn pure_deletions_have_no_right_side() {
        let rows = pair(vec![
            Line::deletion("x", 1),
            Line::deletion("y", 2),
            Line::context("z", 3, 1),
        ]);

        assert_eq!(rows.len(), 3);
        for row in &rows[..2] {
            assert!(row.left.is_some());
            assert!(row.right.is_none());
            assert!(row.intraline.is_none());
        }
        assert!(is_context(&rows[2]));
    }

    #[test]
    fn pure_additions_have_no_left_side() {
        let rows = pair(vec![
            Line::context("head", 1, 1),
            Line::addition("x", 2),
            Line::addition("y", 3),
        ]);

        assert_eq!(rows.len(), 3);
        assert!(is_context(&rows[0]));
        for row in &rows[1..] {
            assert!(row.left.is_none());
            assert!(row.right.is_some());
            assert!(row.intraline.is_none());
        }
        assert_eq!(content(&rows[2].right), Some("y"));
    }

    #[test]
    fn consecutive_context_lines_each_get_a_row() {
        let rows = pair(vec![
            Line::context("a", 1, 1),
            Line::context("b", 2, 2),
            Line::context("c", 3, 3),
        ]);

        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(is_context));
        assert_eq!(content(&rows[1].left), Some("b"));
    }

    #[test]
    fn runs_flush_before_the_next_context_row() {
        let rows = pair(mixed_lines());

        let shape: Vec<(Option<&str>, Option<&str>)> = rows
            .iter()
            .map(|r| (content(&r.left), content(&r.right)))
            .collect();
        assert_eq!(
            shape,
            vec![
                (Some("use std::io;"), Some("use std::io;")),
                (Some("fn a() {}"), Some("fn a() -> u8 {}")),
                (Some("fn b() {}"), None),
                (Some("fn c() {}"), None),
                (Some(""), Some("")),
                (Some("mod x;"), Some("mod x;")),
                (None, Some("mod y;")),
                (None, Some("mod z;")),
                (Some("}"), Some("}")),
                (Some("trailing"), Some("tail")),
                (Some("more"), None),
            ]
        );
    }

    #[test]
    fn additions_before_deletions_still_pair() {
        let rows = pair(vec![
            Line::addition("new", 1),
            Line::deletion("old", 1),
        ]);

        assert_eq!(rows.len(), 1);
        assert_eq!(content(&rows[0].left), Some("old"));
        assert_eq!(content(&rows[0].right), Some("new"));
        assert!(rows[0].intraline.is_some());
    }

    #[test]
    fn row_counts_match_line_origins() {
        let lines = mixed_lines();
        let count = |origin| lines.iter().filter(|l| l.origin == origin).count();
        let (deletions, additions, context) = (
            count(Origin::Deletion),
            count(Origin::Addition),
            count(Origin::Context),
        );

        let rows = pair(lines);
        let context_rows = rows.iter().filter(|r| is_context(r)).count();
        let left_changes = rows
            .iter()
            .filter(|r| !is_context(r) && r.left.is_some())
            .count();
        let right_changes = rows
            .iter()
            .filter(|r| !is_context(r) && r.right.is_some())
            .count();

        assert_eq!(left_changes, deletions);
        assert_eq!(right_changes, additions);
        assert_eq!(context_rows, context);
        assert!(rows.iter().all(|r| r.left.is_some() || r.right.is_some()));
    }

    #[test]
    fn context_rows_mirror_and_are_never_highlighted() {
        for row in pair(mixed_lines()).iter().filter(|r| is_context(r)) {
            assert_eq!(row.left, row.right);
            assert!(row.intraline.is_none());
        }
    }

    #[test]
    fn segments_reconstruct_paired_lines() {
        for row in pair(mixed_lines()) {
            match (&row.left, &row.right, &row.intraline) {
                (Some(left), Some(right), Some(intraline)) => {
                    assert_eq!(intraline.left_text(), left.content);
                    assert_eq!(intraline.right_text(), right.content);
                }
                (Some(_), Some(_), None) => assert!(is_context(&row)),
                (_, _, intraline) => assert!(intraline.is_none()),
            }
        }
    }

    #[test]
    fn split_hunk_passes_metadata_through() {
        let result = split_hunk(hunk(vec![
            Line::deletion("a", 1),
            Line::addition("b", 1),
        ]));

        assert_eq!(result.header, "@@ -1,3 +1,3 @@ impl Foo");
        assert_eq!((result.old_start, result.old_count), (1, 3));
        assert_eq!((result.new_start, result.new_count), (1, 3));
        assert_eq!(result.rows.len(), 1);
    }

    #[test]
    fn split_file_counts_and_hunk_starts() {
        let file = FileDiff {
            path: "src/lib.rs".into(),
            hunks: vec![
                hunk(mixed_lines()),
                hunk(vec![Line::addition("only", 40)]),
                hunk(vec![Line::context("a", 50, 51), Line::deletion("b", 51)]),
            ],
            ..FileDiff::default()
        };

        let result = split_file(file);

        assert_eq!(result.path, "src/lib.rs");
        assert_eq!(result.status, FileStatus::Modified);
        assert_eq!(result.additions, 5);
        assert_eq!(result.deletions, 6);
        assert_eq!(result.hunks.len(), 3);
        assert_eq!(result.hunk_starts, vec![0, 11, 12]);
    }

    #[test]
    fn split_binary_file_has_no_hunks() {
        let file = FileDiff {
            path: "logo.png".into(),
            is_binary: true,
            ..FileDiff::default()
        };

        let result = split_file(file);
        assert!(result.is_binary);
        assert!(result.hunks.is_empty());
        assert!(result.hunk_starts.is_empty());
    }

    #[test]
    fn split_files_keeps_order_and_sums_stats() {
        let files: Vec<FileDiff> = (0..32)
            .map(|i| FileDiff {
                path: format!("file{i}.rs"),
                hunks: vec![hunk(vec![
                    Line::deletion("old", 1),
                    Line::addition("new", 1),
                    Line::addition("extra", 2),
                ])],
                ..FileDiff::default()
            })
            .collect();

        let result = split_files(files);

        assert_eq!(result.files.len(), 32);
        assert_eq!(result.files[7].path, "file7.rs");
        assert_eq!(result.files[31].path, "file31.rs");
        assert_eq!(
            result.stats,
            DiffStats {
                files_changed: 32,
                insertions: 64,
                deletions: 32,
            }
        );
    }

    fn lua_table(value: LuaValue) -> LuaTable {
        match value {
            LuaValue::Table(table) => table,
            other => panic!("expected a table, got {other:?}"),
        }
    }

    #[test]
    fn rows_into_lua_shape() {
        let lua = Lua::new();
        let rows = pair(vec![
            Line::deletion("bar", 1),
            Line::deletion("gone", 2),
            Line::addition("baz", 1),
            Line::context("same", 3, 2),
        ]);
        let tables: Vec<LuaTable> = rows
            .into_iter()
            .map(|row| lua_table(row.into_lua(&lua).unwrap()))
            .collect();
        assert_eq!(tables.len(), 3);

        // Paired row: both lines and both segment lists
        let paired = &tables[0];
        let left: LuaTable = paired.get("left").unwrap();
        assert_eq!(left.get::<String>("origin").unwrap(), "deletion");
        assert_eq!(left.get::<String>("content").unwrap(), "bar");
        assert_eq!(left.get::<Option<u32>>("old_lineno").unwrap(), Some(1));
        assert_eq!(left.get::<Option<u32>>("new_lineno").unwrap(), None);
        let right: LuaTable = paired.get("right").unwrap();
        assert_eq!(right.get::<String>("origin").unwrap(), "addition");

        let left_segments: LuaTable = paired.get("left_segments").unwrap();
        let right_segments: LuaTable = paired.get("right_segments").unwrap();
        assert_eq!(left_segments.raw_len(), 2);
        assert_eq!(right_segments.raw_len(), 2);
        let changed: LuaTable = right_segments.get(2).unwrap();
        assert_eq!(changed.get::<String>("text").unwrap(), "z");
        assert!(changed.get::<bool>("highlighted").unwrap());
        let shared: LuaTable = left_segments.get(1).unwrap();
        assert_eq!(shared.get::<String>("text").unwrap(), "ba");
        assert!(!shared.get::<bool>("highlighted").unwrap());

        // One-sided row: no right line, no segments
        let one_sided = &tables[1];
        assert!(one_sided.get::<LuaValue>("left").unwrap().is_table());
        assert!(one_sided.get::<LuaValue>("right").unwrap().is_nil());
        assert!(one_sided.get::<LuaValue>("left_segments").unwrap().is_nil());
        assert!(one_sided.get::<LuaValue>("right_segments").unwrap().is_nil());

        // Context row: same line on both sides, no segments
        let context = &tables[2];
        let left: LuaTable = context.get("left").unwrap();
        let right: LuaTable = context.get("right").unwrap();
        assert_eq!(left.get::<String>("origin").unwrap(), "context");
        assert_eq!(right.get::<String>("content").unwrap(), "same");
        assert_eq!(right.get::<Option<u32>>("new_lineno").unwrap(), Some(2));
        assert!(context.get::<LuaValue>("left_segments").unwrap().is_nil());
        assert!(context.get::<LuaValue>("right_segments").unwrap().is_nil());
    }

    #[test]
    fn split_file_into_lua_shape() {
        let lua = Lua::new();
        let file = split_file(FileDiff {
            path: "a.rs".into(),
            status: FileStatus::Renamed,
            old_path: Some("b.rs".into()),
            hunks: vec![hunk(vec![Line::deletion("x", 1)])],
            ..FileDiff::default()
        });

        let table = lua_table(file.into_lua(&lua).unwrap());
        assert_eq!(table.get::<String>("status").unwrap(), "renamed");
        assert_eq!(table.get::<String>("old_path").unwrap(), "b.rs");
        assert_eq!(table.get::<u32>("deletions").unwrap(), 1);

        let hunks: LuaTable = table.get("hunks").unwrap();
        let first: LuaTable = hunks.get(1).unwrap();
        assert_eq!(first.get::<u32>("old_lines").unwrap(), 3);
        assert_eq!(first.get::<String>("header").unwrap(), "@@ -1,3 +1,3 @@ impl Foo");
        let rows: LuaTable = first.get("rows").unwrap();
        assert_eq!(rows.raw_len(), 1);
    }

    #[test]
    fn split_files_empty() {
        let result = split_files(Vec::new());
        assert!(result.files.is_empty());
        assert_eq!(result.stats, DiffStats::default());
    }
}
