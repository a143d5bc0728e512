//! PBASIC Tokenizer - BASIC Stamp Compiler
//!
//! This library compiles PBASIC source text into the 2048-byte EEPROM
//! image and checksummed download packets a "Stamp"-family microcontroller
//! loads, entirely in memory and without device I/O.
//!
//! # Features
//!
//! - **Full pipeline**: lexing, editor directives, conditional compilation,
//!   declaration resolution, statement lowering, bit-level image writing,
//!   packetization
//! - **Five target modules**: BS2, BS2e, BS2sx, BS2p, BS2pe, with a
//!   data-driven per-module instruction-code table
//! - **Two dialects**: PBASIC 2.0 and 2.5 (multi-line IF, DO/LOOP,
//!   SELECT/CASE, EXIT, PIN and the `#IF`/`#SELECT` preprocessor)
//! - **Editor integration**: stable numeric diagnostics with source ranges,
//!   an optional source-to-token cross reference, and reserved-word
//!   enumeration
//!
//! # Quick Start
//!
//! ```rust
//! use pbasic_tokenizer::{compile, CompileOptions};
//!
//! let mut source = b"' {$STAMP BS2}\n' {$PBASIC 2.5}\nDEBUG \"Hi\"\n".to_vec();
//! let rec = compile(&mut source, CompileOptions::default());
//! assert!(rec.succeeded);
//! assert!(rec.packet_count >= 1);
//! ```
//!
//! Compilation is a single synchronous pass sequence over a per-invocation
//! context; callers embedding the compiler in a concurrent host should
//! serialize invocations or give each its own buffers.

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::too_many_lines)]

pub mod compiler;
pub mod decls;
pub mod directives;
pub mod eeprom;
pub mod error;
pub mod expr;
pub mod lexer;
pub mod stmt;
pub mod symbols;
pub mod types;

pub use compiler::{compile, compile_into, Compiler};
pub use error::{CompileError, ErrorCode, Result, Span};
pub use types::{
    CompileOptions, ElementKind, ModuleRec, ReservedWord, TargetModule, TokenRef,
    EEPROM_SIZE, PACKET_SIZE, TOKENIZER_VERSION, VERSION_2_0, VERSION_2_5,
};

use symbols::SymbolTable;

/// Enumerate the reserved words available for a target module and language
/// version, in built-in symbol order, with collapsed categories for editor
/// syntax highlighting.
///
/// Fails when `version` is not exactly 200 or 250.
///
/// # Example
///
/// ```rust
/// use pbasic_tokenizer::{reserved_words, TargetModule, VERSION_2_0, VERSION_2_5};
///
/// let v20 = reserved_words(TargetModule::Bs2, VERSION_2_0).unwrap();
/// let v25 = reserved_words(TargetModule::Bs2, VERSION_2_5).unwrap();
/// assert!(!v20.iter().any(|w| w.name == "SELECT"));
/// assert!(v25.iter().any(|w| w.name == "SELECT"));
/// ```
pub fn reserved_words(module: TargetModule, version: u16) -> Result<Vec<ReservedWord>> {
    if version != VERSION_2_0 && version != VERSION_2_5 {
        return Err(CompileError::new(ErrorCode::InvalidVersion, Span::default()));
    }
    let mut table = SymbolTable::new();
    symbols::enter_common_symbols(&mut table)
        .and_then(|()| symbols::adjust_symbols(&mut table, module, version, false))
        .map_err(|code| CompileError::new(code, Span::default()))?;
    Ok(table
        .iter()
        .map(|symbol| ReservedWord {
            name: symbol.name.clone(),
            category: symbol.kind.collapsed(),
        })
        .collect())
}

/// Pack reserved words into the editor exchange format: `name NUL type_id`
/// per word, terminated by an extra NUL.
pub fn encode_reserved_words(words: &[ReservedWord]) -> Vec<u8> {
    let mut out = Vec::new();
    for word in words {
        out.extend_from_slice(word.name.as_bytes());
        out.push(0);
        out.push(word.category as u8);
    }
    out.push(0);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserved_words_version_gate() {
        assert!(reserved_words(TargetModule::Bs2, 240).is_err());
        assert!(reserved_words(TargetModule::Bs2, VERSION_2_0).is_ok());
    }

    #[test]
    fn test_reserved_words_module_gate() {
        let bs2 = reserved_words(TargetModule::Bs2, VERSION_2_5).unwrap();
        let bs2p = reserved_words(TargetModule::Bs2p, VERSION_2_5).unwrap();
        assert!(!bs2.iter().any(|w| w.name == "LCDOUT"));
        assert!(bs2p.iter().any(|w| w.name == "LCDOUT"));
        // Conditional tiers collapse onto the comparison category.
        let not = bs2.iter().find(|w| w.name == "NOT").unwrap();
        assert_eq!(not.category, ElementKind::Cond1Op);
    }

    #[test]
    fn test_encode_reserved_words_format() {
        let words = vec![ReservedWord {
            name: "CR".into(),
            category: ElementKind::Constant,
        }];
        let buffer = encode_reserved_words(&words);
        assert_eq!(buffer[..3], [b'C', b'R', 0]);
        assert_eq!(buffer[3], ElementKind::Constant as u8);
        assert_eq!(*buffer.last().unwrap(), 0);
    }
}
