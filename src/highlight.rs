//! Intraline highlighting for a paired deletion/addition.
//!
//! Given the old and new text of one split row, [`highlight`] trims the common
//! prefix and the common suffix and marks whatever is left in the middle of
//! each side as changed. No alignment table is built, so a row costs one pass
//! from each end.
//!
//! Comparison works on Unicode scalar values (`char`), not bytes: a multi-byte
//! character is either entirely shared or entirely part of the changed middle,
//! and every segment boundary falls on a UTF-8 boundary.

use mlua::prelude::*;
use smallvec::SmallVec;

/// At most three segments per side: prefix, middle, suffix.
pub type Segments = SmallVec<[Segment; 3]>;

/// A contiguous piece of a line's text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub text: String,

    /// Whether this piece differs from the other side of the row.
    pub highlighted: bool,
}

impl Segment {
    #[inline]
    fn plain(text: &str) -> Self {
        Self {
            text: text.to_owned(),
            highlighted: false,
        }
    }

    #[inline]
    fn changed(text: &str) -> Self {
        Self {
            text: text.to_owned(),
            highlighted: true,
        }
    }
}

/// Segments for both sides of a fully paired row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Intraline {
    /// Segments of the old (deleted) line.
    pub left: Segments,

    /// Segments of the new (added) line.
    pub right: Segments,
}

impl Intraline {
    /// Concatenated text of the left segments.
    #[must_use]
    pub fn left_text(&self) -> String {
        concat(&self.left)
    }

    /// Concatenated text of the right segments.
    #[must_use]
    pub fn right_text(&self) -> String {
        concat(&self.right)
    }
}

fn concat(segments: &[Segment]) -> String {
    segments.iter().map(|s| s.text.as_str()).collect()
}

/// Computes the highlighted and plain segments of `old` and `new`.
///
/// Equal strings produce a single plain segment per side. Strings with no
/// shared leading or trailing character produce a single highlighted segment
/// per side. Empty segments are never emitted, so an empty string yields no
/// segments at all.
#[must_use]
pub fn highlight(old: &str, new: &str) -> Intraline {
    let prefix = common_prefix(old, new);
    // Only the text after the prefix is eligible, which keeps the suffix from
    // overlapping the prefix on either side.
    let suffix = common_suffix(&old[prefix..], &new[prefix..]);

    Intraline {
        left: partition(old, prefix, suffix),
        right: partition(new, prefix, suffix),
    }
}

/// Byte length of the longest common prefix, measured in whole chars.
///
/// Because the shared chars are identical, the byte length is the same in
/// both strings.
fn common_prefix(a: &str, b: &str) -> usize {
    a.chars()
        .zip(b.chars())
        .take_while(|(x, y)| x == y)
        .map(|(c, _)| c.len_utf8())
        .sum()
}

/// Byte length of the longest common suffix, measured in whole chars.
fn common_suffix(a: &str, b: &str) -> usize {
    a.chars()
        .rev()
        .zip(b.chars().rev())
        .take_while(|(x, y)| x == y)
        .map(|(c, _)| c.len_utf8())
        .sum()
}

/// Splits `text` into prefix, middle and suffix, dropping empty pieces.
fn partition(text: &str, prefix: usize, suffix: usize) -> Segments {
    let middle_end = text.len() - suffix;
    let mut segments = Segments::new();

    if prefix > 0 {
        segments.push(Segment::plain(&text[..prefix]));
    }
    if middle_end > prefix {
        segments.push(Segment::changed(&text[prefix..middle_end]));
    }
    if suffix > 0 {
        segments.push(Segment::plain(&text[middle_end..]));
    }

    segments
}

impl IntoLua for Segment {
    fn into_lua(self, lua: &Lua) -> LuaResult<LuaValue> {
        let table = lua.create_table()?;
        table.set("text", self.text)?;
        table.set("highlighted", self.highlighted)?;
        Ok(LuaValue::Table(table))
    }
}

/// Converts a segment list into a Lua sequence.
pub(crate) fn segments_into_lua(lua: &Lua, segments: Segments) -> LuaResult<LuaValue> {
    let items: Vec<LuaValue> = segments
        .into_iter()
        .map(|s| s.into_lua(lua))
        .collect::<LuaResult<_>>()?;
    Ok(LuaValue::Table(lua.create_sequence_from(items)?))
}

impl IntoLua for Intraline {
    fn into_lua(self, lua: &Lua) -> LuaResult<LuaValue> {
        let table = lua.create_table()?;
        table.set("left", segments_into_lua(lua, self.left)?)?;
        table.set("right", segments_into_lua(lua, self.right)?)?;
        Ok(LuaValue::Table(table))
    }
}
