//! # split-diff-nvim
//!
//! A Neovim plugin for displaying unified diffs in a side-by-side viewer.
//!
//! This crate provides Lua bindings that take an already computed diff (as
//! `git diff` patch text, as JSON from a git backend, or as Lua hunk tables)
//! and process it into a display-ready format: rows pairing each removed line
//! with its replacement, plus the exact characters that changed between them.
//!
//! ## Architecture
//!
//! The crate is organized into four modules:
//!
//! - `diff` - Types and parsing for unified diff input
//! - `highlight` - Intraline (character-level) change segments for a line pair
//! - `split` - Pairs hunk lines into aligned side-by-side rows
//! - `lib` (this module) - Lua bindings
//!
//! ## Usage from Lua
//!
//! ```lua
//! local split = require("split_diff_nvim")
//!
//! -- Split a patch produced by `git diff`
//! local result = split.split_diff(vim.fn.system({ "git", "diff" }))
//!
//! -- Split the JSON produced by a git backend
//! local result = split.split_diff(json, "json")
//!
//! -- Split hunks already held in Lua
//! local hunks = split.split_hunks({ { old_start = 1, old_lines = 1, new_start = 1,
//!   new_lines = 1, lines = { { origin = "-", content = "a" }, { origin = "+", content = "b" } } } })
//!
//! -- Highlight a single pair of lines
//! local segs = split.highlight("let x = 1;", "let x = 2;")
//! ```

use mlua::prelude::*;
use std::str::FromStr;

mod diff;
mod highlight;
mod split;

/// The text format handed to `split_diff`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum InputFormat {
    /// Unified diff text.
    #[default]
    Patch,
    /// JSON file list.
    Json,
}

impl FromStr for InputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "patch" => Ok(Self::Patch),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown input format `{other}`, expected `patch` or `json`")),
        }
    }
}

/// Reads `input` in the given format and splits every file.
fn split_input(input: &str, format: InputFormat) -> Result<split::SplitDiff, String> {
    let files = match format {
        InputFormat::Patch => diff::parse_patch(input),
        InputFormat::Json => diff::parse_json(input),
    }
    .map_err(|e| format!("Failed to parse diff: {e}"))?;

    let result = split::split_files(files);
    log::debug!(
        "split {} files (+{} -{})",
        result.stats.files_changed,
        result.stats.insertions,
        result.stats.deletions
    );
    Ok(result)
}

/// Splits a whole diff given as text.
fn split_diff(lua: &Lua, (input, format): (String, Option<String>)) -> LuaResult<LuaValue> {
    let format = format
        .as_deref()
        .map(InputFormat::from_str)
        .transpose()
        .map_err(LuaError::RuntimeError)?
        .unwrap_or_default();

    split_input(&input, format)
        .map_err(LuaError::RuntimeError)?
        .into_lua(lua)
}

/// Splits hunks passed in as Lua tables.
fn split_hunks(lua: &Lua, hunks: LuaValue) -> LuaResult<LuaTable> {
    let hunks: Vec<diff::Hunk> = lua.from_value(hunks)?;
    log::debug!("splitting {} hunks from lua", hunks.len());

    lua.create_sequence_from(hunks.into_iter().map(split::split_hunk))
}

/// Computes intraline segments for a single pair of lines.
fn highlight(lua: &Lua, (old, new): (String, String)) -> LuaResult<LuaValue> {
    highlight::highlight(&old, &new).into_lua(lua)
}

/// Creates the Lua module exports. Called by mlua when loaded via `require("split_diff_nvim")`.
#[cfg_attr(feature = "module", mlua::lua_module)]
fn split_diff_nvim(lua: &Lua) -> LuaResult<LuaTable> {
    let exports = lua.create_table()?;
    exports.set(
        "split_diff",
        lua.create_function(|lua, args: (String, Option<String>)| split_diff(lua, args))?,
    )?;
    exports.set(
        "split_hunks",
        lua.create_function(|lua, hunks: LuaValue| split_hunks(lua, hunks))?,
    )?;
    exports.set(
        "highlight",
        lua.create_function(|lua, args: (String, String)| highlight(lua, args))?,
    )?;
    Ok(exports)
}
