// Copyright (c) 2025 Joshua Seaton
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Common types for the round-trip fixture format.
//!
//! Fixtures are authored in `fixtures.json` with hex-encoded module bytes
//! ([`Fixture`]). The build script writes each module out as a `.wasm` file
//! and emits the corresponding [`Command`]s, which refer to those files.

use serde::{Deserialize, Serialize};

/// A fixture as authored.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum Fixture {
    #[serde(rename = "module")]
    Module(ModuleFixture),
    #[serde(rename = "assert_malformed")]
    AssertMalformed(AssertMalformedFixture),
}

impl Fixture {
    pub fn name(&self) -> &str {
        match self {
            Fixture::Module(module) => &module.name,
            Fixture::AssertMalformed(malformed) => &malformed.name,
        }
    }

    /// Hex-encoded module bytes, possibly with whitespace for readability.
    pub fn wasm(&self) -> &str {
        match self {
            Fixture::Module(module) => &module.wasm,
            Fixture::AssertMalformed(malformed) => &malformed.wasm,
        }
    }
}

/// A well-formed module.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModuleFixture {
    pub name: String,
    pub wasm: String,
    /// The number of sections the module decodes into.
    pub sections: usize,
}

/// A module that must fail to decode.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AssertMalformedFixture {
    pub name: String,
    pub wasm: String,
    pub text: Error,
}

/// A test command, referring to a module written out by the build script.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum Command {
    #[serde(rename = "module")]
    Module(ModuleCommand),
    #[serde(rename = "assert_malformed")]
    AssertMalformed(AssertMalformedCommand),
}

/// Decode a module, then check that it re-encodes to the same bytes.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModuleCommand {
    pub name: String,
    pub filename: String,
    pub sections: usize,
}

/// Assert that a module is malformed.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AssertMalformedCommand {
    pub name: String,
    pub filename: String,
    pub text: Error,
}

/// The kinds of malformedness a fixture may expect.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    #[serde(rename = "duplicate section")]
    DuplicateSection,
    #[serde(rename = "function body size mismatch")]
    FunctionBodySizeMismatch,
    #[serde(rename = "illegal opcode")]
    IllegalOpcode,
    #[serde(rename = "integer representation too long")]
    IntegerRepresentationTooLong,
    #[serde(rename = "malformed block type")]
    MalformedBlockType,
    #[serde(rename = "malformed export kind")]
    MalformedExportKind,
    #[serde(rename = "malformed functype")]
    MalformedFunctype,
    #[serde(rename = "malformed section id")]
    MalformedSectionId,
    #[serde(rename = "malformed UTF-8 encoding")]
    MalformedUtf8Encoding,
    #[serde(rename = "malformed value type")]
    MalformedValueType,
    #[serde(rename = "section out of order")]
    SectionOutOfOrder,
    #[serde(rename = "section size mismatch")]
    SectionSizeMismatch,
    #[serde(rename = "unexpected else")]
    UnexpectedElse,
    #[serde(rename = "unexpected end")]
    UnexpectedEnd,
    #[serde(rename = "unexpected end of section or function")]
    UnexpectedEndOfSectionOrFunction,
    #[serde(rename = "unsupported section")]
    UnsupportedSection,
}
