// Copyright (c) 2025 Joshua Seaton
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

use std::fs;

use fixture_test_macro::fixture_tests;
use weft::Module;
use weft::core_compat::alloc::Global;
use weft::decode;
use weft::storage::{IoStream, MemoryEof};

#[allow(unused)]
fn check_module(wasm: &str, sections: usize) {
    let bytes = fs::read(wasm).unwrap();
    let module = Module::decode_bytes(&bytes, Global).unwrap();
    assert_eq!(module.sections.len(), sections, "{module:#?}");

    let encoded = module.encode(Global).unwrap();
    assert_eq!(encoded.as_slice(), bytes.as_slice());

    // Encoding a decoding of the output changes nothing.
    let again = Module::decode_bytes(&encoded, Global)
        .unwrap()
        .encode(Global)
        .unwrap();
    assert_eq!(again, encoded);

    // Streaming from the file agrees with decoding in memory.
    let streamed = Module::decode(IoStream::new(fs::File::open(wasm).unwrap()), Global).unwrap();
    assert_eq!(streamed.encode(Global).unwrap(), encoded);
}

#[allow(unused)]
fn assert_malformed(wasm: &str, expected: fixture_format::Error) {
    use fixture_format::Error::*;

    let bytes = fs::read(wasm).unwrap();
    let result = Module::decode_bytes(&bytes, Global);
    let Err(error) = &result else {
        panic!("Success!? Expected decoding error: {expected:?}")
    };
    let error = &error.error;

    macro_rules! error_matches {
        ($pattern:pat) => {
            assert!(matches!(error, $pattern), "Unexpected error: {error:?}")
        };
    }

    match expected {
        DuplicateSection => error_matches!(decode::Error::DuplicateSection(_)),
        FunctionBodySizeMismatch => error_matches!(decode::Error::InvalidFunctionLength {
            expected: _,
            actual: _
        }),
        IllegalOpcode => error_matches!(decode::Error::InvalidOpcode(_)),
        IntegerRepresentationTooLong => error_matches!(decode::Error::InvalidLeb128),
        MalformedBlockType => error_matches!(decode::Error::InvalidBlockType(_)),
        MalformedExportKind => error_matches!(decode::Error::InvalidToken(_)),
        MalformedFunctype => error_matches!(decode::Error::InvalidFuncType(_)),
        MalformedSectionId => error_matches!(decode::Error::InvalidSectionId(_)),
        MalformedUtf8Encoding => error_matches!(decode::Error::InvalidUtf8),
        MalformedValueType => error_matches!(decode::Error::InvalidValType(_)),
        SectionOutOfOrder => error_matches!(decode::Error::OutOfOrderSection {
            before: _,
            after: _
        }),
        SectionSizeMismatch => error_matches!(decode::Error::InvalidSectionLength {
            id: _,
            expected: _,
            actual: _
        }),
        UnexpectedElse => error_matches!(decode::Error::UnexpectedElse),
        UnexpectedEnd => error_matches!(decode::Error::Storage(MemoryEof {})),
        UnexpectedEndOfSectionOrFunction => error_matches!(decode::Error::BufferUnderrun),
        UnsupportedSection => error_matches!(decode::Error::UnsupportedSection(_)),
    }
}

fixture_tests!();
