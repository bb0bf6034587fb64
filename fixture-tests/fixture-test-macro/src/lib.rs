// Copyright (c) 2025 Joshua Seaton
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

use std::collections::HashSet;
use std::path::PathBuf;
use std::{env, fs};

use proc_macro::TokenStream;
use proc_macro2::{Span, TokenStream as TokenStream2};
use quote::quote;
use syn::Ident;

use fixture_format::{AssertMalformedCommand, Command, ModuleCommand};

fn load_fixtures() -> Vec<Command> {
    let out_dir = env::var("OUT_DIR").unwrap();
    let fixtures_file = PathBuf::from(out_dir).join("fixtures.json");

    let json_str = fs::read_to_string(&fixtures_file)
        .expect("Failed to read `fixtures.json` - make sure build.rs ran successfully");

    serde_json::from_str(&json_str).expect("Failed to parse `fixtures.json`")
}

fn wasm_path(filename: &str) -> String {
    let out_dir = env::var("OUT_DIR").unwrap();
    PathBuf::from(out_dir)
        .join(filename)
        .to_string_lossy()
        .into_owned()
}

fn generate_tests() -> Vec<TokenStream2> {
    let mut seen = HashSet::new();
    load_fixtures()
        .iter()
        .map(|command| {
            let test_case = match command {
                Command::Module(module) => module_test_case(module),
                Command::AssertMalformed(malformed) => assert_malformed_test_case(malformed),
            };
            let name = match command {
                Command::Module(ModuleCommand { name, .. })
                | Command::AssertMalformed(AssertMalformedCommand { name, .. }) => name,
            };
            assert!(seen.insert(name.clone()), "Duplicate fixture name: {name}");
            test_case
        })
        .collect()
}

fn assert_malformed_test_case(malformed: &AssertMalformedCommand) -> TokenStream2 {
    let wasm_file = wasm_path(&malformed.filename);
    let name = Ident::new(&malformed.name, Span::call_site());
    let error_variant = {
        let variant = format!("fixture_format::Error::{:?}", malformed.text);
        let tokens: TokenStream2 = variant.parse().expect("Failed to parse error variant");
        tokens
    };

    quote! {
        #[test]
        fn #name() {
            assert_malformed(#wasm_file, #error_variant);
        }
    }
}

fn module_test_case(module: &ModuleCommand) -> TokenStream2 {
    let wasm_file = wasm_path(&module.filename);
    let name = Ident::new(&module.name, Span::call_site());
    let sections = module.sections;

    quote! {
        #[test]
        fn #name() {
            check_module(#wasm_file, #sections);
        }
    }
}

/// Generate round-trip fixture tests from the amalgamated JSON file
///
/// Usage: `fixture_tests!()`
///
/// This macro will:
/// 1. Read the amalgamated `fixtures.json` file created by build.rs
/// 2. Generate an individual test function for each fixture
///
#[proc_macro]
pub fn fixture_tests(_input: TokenStream) -> TokenStream {
    let all_test_functions = generate_tests();

    let result = quote! {
        #(#all_test_functions)*
    };

    result.into()
}
