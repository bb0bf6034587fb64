// Copyright (c) 2025 Joshua Seaton
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

use std::error::Error;
use std::path::{Path, PathBuf};
use std::{env, fs};

use fixture_format::{AssertMalformedCommand, Command, Fixture, ModuleCommand};

// Writes out the fixture's module, returning the command that refers to it.
fn process_fixture(fixture: Fixture, out_dir: &Path) -> Result<Command, Box<dyn Error>> {
    let hex: String = fixture
        .wasm()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    let bytes = hex::decode(&hex)
        .map_err(|err| format!("bad hex for fixture `{}`: {err}", fixture.name()))?;

    let filename = format!("{}.wasm", fixture.name());
    fs::write(out_dir.join(&filename), bytes)?;

    Ok(match fixture {
        Fixture::Module(module) => Command::Module(ModuleCommand {
            name: module.name,
            filename,
            sections: module.sections,
        }),
        Fixture::AssertMalformed(malformed) => Command::AssertMalformed(AssertMalformedCommand {
            name: malformed.name,
            filename,
            text: malformed.text,
        }),
    })
}

fn main() -> Result<(), Box<dyn Error>> {
    let out_dir = PathBuf::from(env::var("OUT_DIR")?);
    let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR")?);

    let fixtures_path = manifest_dir.join("fixtures.json");
    println!("cargo:rerun-if-changed={}", fixtures_path.display());

    let fixtures: Vec<Fixture> = serde_json::from_str(&fs::read_to_string(&fixtures_path)?)?;

    fs::create_dir_all(&out_dir)?;
    let commands = fixtures
        .into_iter()
        .map(|fixture| process_fixture(fixture, &out_dir))
        .collect::<Result<Vec<_>, _>>()?;

    // Write the amalgamated JSON file at the root of the build directory
    let amalgamated_file = out_dir.join("fixtures.json");
    let json_output = serde_json::to_string_pretty(&commands)?;
    fs::write(&amalgamated_file, json_output)?;

    Ok(())
}
