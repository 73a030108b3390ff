//! Types and parsing for unified diff input.
//!
//! Diffs arrive already computed by an external engine. This module only reads
//! them, in one of two shapes:
//!
//! - **patch text**: the unified format written by `git diff` or `diff -u`,
//!   handled by [`parse_patch`]
//! - **JSON**: the file/hunk/line objects produced by a git backend, handled
//!   by [`parse_json`]
//!
//! Both produce the same [`FileDiff`] values, which the [`crate::split`] module
//! turns into side-by-side rows.
//!
//! ## JSON Format
//!
//! ```json
//! {
//!   "path": "src/lib.rs",
//!   "old_path": "src/lib.rs",
//!   "status": "modified",
//!   "is_binary": false,
//!   "hunks": [{
//!     "header": "@@ -1,2 +1,2 @@",
//!     "old_start": 1, "old_lines": 2, "new_start": 1, "new_lines": 2,
//!     "lines": [
//!       {"origin": " ", "content": "fn main() {\n", "old_lineno": 1, "new_lineno": 1},
//!       {"origin": "-", "content": "    old();\n", "old_lineno": 2, "new_lineno": null},
//!       {"origin": "+", "content": "    new();\n", "old_lineno": null, "new_lineno": 2}
//!     ]
//!   }]
//! }
//! ```

use serde::Deserialize;
use thiserror::Error;

/// Errors produced while reading diff input.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("line {line}: malformed hunk header `{text}`")]
    HunkHeader { line: usize, text: String },

    #[error("line {line}: hunk header before any file header")]
    HunkOutsideFile { line: usize },

    #[error("line {line}: unexpected line in hunk body `{text}`")]
    UnexpectedLine { line: usize, text: String },

    #[error("hunk `{header}` ends early: expected {old} more old and {new} more new lines")]
    TruncatedHunk { header: String, old: u32, new: u32 },

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Classification of a diff line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Origin {
    /// Unchanged, present on both sides.
    Context,
    /// Present only in the new version.
    Addition,
    /// Present only in the old version.
    Deletion,
}

impl Origin {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Context => "context",
            Self::Addition => "addition",
            Self::Deletion => "deletion",
        }
    }
}

impl TryFrom<char> for Origin {
    type Error = String;

    fn try_from(c: char) -> Result<Self, Self::Error> {
        match c {
            ' ' => Ok(Self::Context),
            '+' => Ok(Self::Addition),
            '-' => Ok(Self::Deletion),
            other => Err(format!("unknown line origin `{other}`")),
        }
    }
}

/// A single line of a hunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    pub origin: Origin,

    /// Line text without its trailing newline.
    pub content: String,

    /// 1-indexed line number in the old file, for context and deletions.
    pub old_lineno: Option<u32>,

    /// 1-indexed line number in the new file, for context and additions.
    pub new_lineno: Option<u32>,
}

impl Line {
    #[must_use]
    pub fn context(content: impl Into<String>, old_lineno: u32, new_lineno: u32) -> Self {
        Self {
            origin: Origin::Context,
            content: content.into(),
            old_lineno: Some(old_lineno),
            new_lineno: Some(new_lineno),
        }
    }

    #[must_use]
    pub fn addition(content: impl Into<String>, new_lineno: u32) -> Self {
        Self {
            origin: Origin::Addition,
            content: content.into(),
            old_lineno: None,
            new_lineno: Some(new_lineno),
        }
    }

    #[must_use]
    pub fn deletion(content: impl Into<String>, old_lineno: u32) -> Self {
        Self {
            origin: Origin::Deletion,
            content: content.into(),
            old_lineno: Some(old_lineno),
            new_lineno: None,
        }
    }
}

/// A contiguous block of changed lines with its position metadata.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct Hunk {
    /// The raw `@@ -a,b +c,d @@ section` header.
    #[serde(default)]
    pub header: String,

    pub old_start: u32,

    #[serde(rename = "old_lines")]
    pub old_count: u32,

    pub new_start: u32,

    #[serde(rename = "new_lines")]
    pub new_count: u32,

    /// End-of-file markers (`=`, `<`, `>` origins) are dropped on input.
    #[serde(default, deserialize_with = "hunk_lines")]
    pub lines: Vec<Line>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Added,
    Deleted,
    #[default]
    Modified,
    Renamed,
    Copied,
    /// Delta kinds the backend does not map (type changes, conflicts).
    Unknown,
}

impl FileStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Deleted => "deleted",
            Self::Modified => "modified",
            Self::Renamed => "renamed",
            Self::Copied => "copied",
            Self::Unknown => "unknown",
        }
    }
}

/// All hunks for a single file.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct FileDiff {
    /// Path in the new version (or the old one for deleted files).
    pub path: String,

    /// Path in the old version, when it differs or the file was deleted.
    #[serde(default)]
    pub old_path: Option<String>,

    #[serde(default)]
    pub status: FileStatus,

    #[serde(default)]
    pub is_binary: bool,

    #[serde(default)]
    pub hunks: Vec<Hunk>,
}

impl FileDiff {
    /// Number of added lines across all hunks.
    #[must_use]
    pub fn additions(&self) -> u32 {
        self.count(Origin::Addition)
    }

    /// Number of deleted lines across all hunks.
    #[must_use]
    pub fn deletions(&self) -> u32 {
        self.count(Origin::Deletion)
    }

    fn count(&self, origin: Origin) -> u32 {
        let n = self
            .hunks
            .iter()
            .flat_map(|h| &h.lines)
            .filter(|l| l.origin == origin)
            .count();
        saturating_u32(n)
    }
}

/// Converts a count to `u32`, clamping at `u32::MAX`.
#[inline]
#[must_use]
pub(crate) fn saturating_u32(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

fn without_newline<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let mut content = String::deserialize(deserializer)?;
    if content.ends_with('\n') {
        content.pop();
        if content.ends_with('\r') {
            content.pop();
        }
    }
    Ok(content)
}

/// A hunk line as it appears on the wire, before its origin is checked.
#[derive(Deserialize)]
struct WireLine {
    origin: char,
    #[serde(deserialize_with = "without_newline")]
    content: String,
    #[serde(default)]
    old_lineno: Option<u32>,
    #[serde(default)]
    new_lineno: Option<u32>,
}

/// git2 reports a missing newline at end of file with these origins.
#[inline]
fn is_eof_marker(origin: char) -> bool {
    matches!(origin, '=' | '<' | '>')
}

fn hunk_lines<'de, D>(deserializer: D) -> Result<Vec<Line>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Vec::<WireLine>::deserialize(deserializer)?
        .into_iter()
        .filter(|line| {
            let marker = is_eof_marker(line.origin);
            if marker {
                log::debug!("dropping end-of-file marker `{}`", line.origin);
            }
            !marker
        })
        .map(|line| {
            let origin = Origin::try_from(line.origin)
                .map_err(<D::Error as serde::de::Error>::custom)?;
            Ok::<_, D::Error>(Line {
                origin,
                content: line.content,
                old_lineno: line.old_lineno,
                new_lineno: line.new_lineno,
            })
        })
        .collect()
}

/// Parses the JSON file list emitted by a git backend.
///
/// Accepts either an array of file objects or a single file object.
pub fn parse_json(json: &str) -> Result<Vec<FileDiff>, ParseError> {
    // A whole-commit diff is an array, a single-file diff is one object
    if json.trim_start().starts_with('[') {
        return Ok(serde_json::from_str(json)?);
    }

    let file: FileDiff = serde_json::from_str(json)?;
    Ok(vec![file])
}

/// Removes the `a/` or `b/` prefix git puts on paths; `/dev/null` means absent.
fn strip_path(raw: &str, prefix: &str) -> Option<String> {
    // Timestamps follow a tab in `diff -u` output
    let raw = raw.split('\t').next().unwrap_or(raw).trim_end();
    if raw == "/dev/null" {
        return None;
    }
    Some(raw.strip_prefix(prefix).unwrap_or(raw).to_string())
}

/// Parses `-a[,b]` or `+c[,d]` into `(start, count)`.
fn parse_range(range: &str) -> Option<(u32, u32)> {
    match range.split_once(',') {
        Some((start, count)) => Some((start.parse().ok()?, count.parse().ok()?)),
        None => Some((range.parse().ok()?, 1)),
    }
}

/// Parses a `@@ -a,b +c,d @@ section` header into an empty hunk.
fn parse_hunk_header(text: &str) -> Option<Hunk> {
    let rest = text.strip_prefix("@@ ")?;
    let (ranges, _section) = rest.split_once(" @@")?;
    let (old, new) = ranges.split_once(' ')?;
    let (old_start, old_count) = parse_range(old.strip_prefix('-')?)?;
    let (new_start, new_count) = parse_range(new.strip_prefix('+')?)?;

    Some(Hunk {
        header: text.to_string(),
        old_start,
        old_count,
        new_start,
        new_count,
        lines: Vec::new(),
    })
}

/// Incremental state while reading patch text.
#[derive(Default)]
struct PatchReader {
    files: Vec<FileDiff>,
    file: Option<FileDiff>,
    hunk: Option<Hunk>,
    /// Old and new lines still expected by the open hunk.
    remaining: (u32, u32),
    next_old: u32,
    next_new: u32,
    /// The open file came from a `diff --git` header and has not seen its
    /// `---` line yet.
    awaiting_paths: bool,
    /// Inside a combined (merge) diff, which is skipped up to the next
    /// `diff --git` header.
    in_combined: bool,
}

impl PatchReader {
    fn in_hunk_body(&self) -> bool {
        self.hunk.is_some() && (self.remaining.0 > 0 || self.remaining.1 > 0)
    }

    fn close_hunk(&mut self) -> Result<(), ParseError> {
        let Some(hunk) = self.hunk.take() else {
            return Ok(());
        };
        if self.remaining != (0, 0) {
            return Err(ParseError::TruncatedHunk {
                header: hunk.header,
                old: self.remaining.0,
                new: self.remaining.1,
            });
        }
        if let Some(file) = self.file.as_mut() {
            file.hunks.push(hunk);
        }
        Ok(())
    }

    fn close_file(&mut self) -> Result<(), ParseError> {
        self.close_hunk()?;
        if let Some(file) = self.file.take() {
            log::trace!("read {} ({} hunks)", file.path, file.hunks.len());
            self.files.push(file);
        }
        self.awaiting_paths = false;
        Ok(())
    }

    fn start_file(&mut self, file: FileDiff) -> Result<(), ParseError> {
        self.close_file()?;
        self.file = Some(file);
        Ok(())
    }

    fn read_line(&mut self, number: usize, text: &str) -> Result<(), ParseError> {
        if text.starts_with('\\') {
            log::debug!("skipping marker on line {number}: {text}");
            return Ok(());
        }
        if self.in_hunk_body() {
            return self.read_body_line(number, text);
        }

        if let Some(path) = text
            .strip_prefix("diff --cc ")
            .or_else(|| text.strip_prefix("diff --combined "))
        {
            self.close_file()?;
            log::debug!("skipping combined diff for {path} on line {number}");
            self.in_combined = true;
            return Ok(());
        }
        if self.in_combined {
            if !text.starts_with("diff --git ") {
                return Ok(());
            }
            self.in_combined = false;
        }

        if let Some(rest) = text.strip_prefix("diff --git ") {
            let (old, new) = rest.split_once(" b/").unwrap_or((rest, rest));
            let path = new.trim_end().to_string();
            self.start_file(FileDiff {
                old_path: strip_path(old, "a/").filter(|p| *p != path),
                path,
                ..FileDiff::default()
            })?;
            self.awaiting_paths = true;
            return Ok(());
        }

        if let Some(rest) = text.strip_prefix("--- ") {
            if !self.awaiting_paths {
                self.start_file(FileDiff::default())?;
            }
            self.awaiting_paths = false;
            let old = strip_path(rest, "a/");
            let file = self.file.get_or_insert_with(FileDiff::default);
            match old {
                Some(old) => {
                    if file.path.is_empty() {
                        file.path.clone_from(&old);
                    }
                    if old != file.path {
                        file.old_path = Some(old);
                    }
                }
                None => file.status = FileStatus::Added,
            }
            return Ok(());
        }

        if let Some(rest) = text.strip_prefix("+++ ") {
            if let Some(file) = self.file.as_mut() {
                match strip_path(rest, "b/") {
                    Some(new) => {
                        if file.old_path.is_none() && new != file.path && !file.path.is_empty() {
                            file.old_path = Some(std::mem::take(&mut file.path));
                        }
                        file.path = new;
                    }
                    None => {
                        file.status = FileStatus::Deleted;
                        if file.old_path.is_none() {
                            file.old_path = Some(file.path.clone());
                        }
                    }
                }
                return Ok(());
            }
        }

        if text.starts_with("@@") {
            return self.open_hunk(number, text);
        }

        if let Some(file) = self.file.as_mut() {
            if text.starts_with("new file mode") {
                file.status = FileStatus::Added;
            } else if text.starts_with("deleted file mode") {
                file.status = FileStatus::Deleted;
                if file.old_path.is_none() {
                    file.old_path = Some(file.path.clone());
                }
            } else if let Some(from) = text.strip_prefix("rename from ") {
                file.status = FileStatus::Renamed;
                file.old_path = Some(from.to_string());
            } else if let Some(to) = text.strip_prefix("rename to ") {
                file.path = to.to_string();
            } else if let Some(from) = text.strip_prefix("copy from ") {
                file.status = FileStatus::Copied;
                file.old_path = Some(from.to_string());
            } else if let Some(to) = text.strip_prefix("copy to ") {
                file.path = to.to_string();
            } else if text.starts_with("Binary files ") || text == "GIT binary patch" {
                file.is_binary = true;
            } else {
                log::debug!("ignoring header line {number}: {text}");
            }
            return Ok(());
        }

        log::debug!("ignoring line {number} outside any file");
        Ok(())
    }

    fn open_hunk(&mut self, number: usize, text: &str) -> Result<(), ParseError> {
        self.close_hunk()?;
        if self.file.is_none() {
            return Err(ParseError::HunkOutsideFile { line: number });
        }
        let hunk = parse_hunk_header(text).ok_or_else(|| ParseError::HunkHeader {
            line: number,
            text: text.to_string(),
        })?;
        // Line numbers are counted up from the start, so the range must fit
        if hunk.old_start.checked_add(hunk.old_count).is_none()
            || hunk.new_start.checked_add(hunk.new_count).is_none()
        {
            return Err(ParseError::HunkHeader {
                line: number,
                text: text.to_string(),
            });
        }
        self.remaining = (hunk.old_count, hunk.new_count);
        self.next_old = hunk.old_start;
        self.next_new = hunk.new_start;
        self.hunk = Some(hunk);
        Ok(())
    }

    fn read_body_line(&mut self, number: usize, text: &str) -> Result<(), ParseError> {
        let (origin, content) = match text.chars().next() {
            // Some editors strip the lone space of an empty context line
            None => (Origin::Context, ""),
            Some(c) => match Origin::try_from(c) {
                Ok(origin) => (origin, &text[1..]),
                Err(_) => {
                    return Err(ParseError::UnexpectedLine {
                        line: number,
                        text: text.to_string(),
                    });
                }
            },
        };

        let line = match origin {
            Origin::Context if self.remaining.0 > 0 && self.remaining.1 > 0 => {
                self.remaining.0 -= 1;
                self.remaining.1 -= 1;
                self.next_old += 1;
                self.next_new += 1;
                Line::context(content, self.next_old - 1, self.next_new - 1)
            }
            Origin::Deletion if self.remaining.0 > 0 => {
                self.remaining.0 -= 1;
                self.next_old += 1;
                Line::deletion(content, self.next_old - 1)
            }
            Origin::Addition if self.remaining.1 > 0 => {
                self.remaining.1 -= 1;
                self.next_new += 1;
                Line::addition(content, self.next_new - 1)
            }
            _ => {
                return Err(ParseError::UnexpectedLine {
                    line: number,
                    text: text.to_string(),
                });
            }
        };

        if let Some(hunk) = self.hunk.as_mut() {
            hunk.lines.push(line);
        }
        Ok(())
    }
}

/// Parses unified diff text, as written by `git diff` or `diff -u`.
///
/// Hunk bodies are read by count from their headers, so content lines that
/// start with `---` or `+++` are never mistaken for file headers. Combined
/// diffs of merge commits (`diff --cc`) are not supported and are skipped.
pub fn parse_patch(text: &str) -> Result<Vec<FileDiff>, ParseError> {
    let mut reader = PatchReader::default();

    for (idx, raw) in text.lines().enumerate() {
        let line = raw.strip_suffix('\r').unwrap_or(raw);
        reader.read_line(idx + 1, line)?;
    }

    reader.close_file()?;
    Ok(reader.files)
}
