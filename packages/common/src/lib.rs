//! # Arbor Common
//!
//! Identifier types, the id compressor and the string interner shared by the
//! tree and editor crates.

pub mod error;
pub mod id_compressor;
pub mod identifiers;
pub mod result;
pub mod string_interner;

pub use error::*;
pub use id_compressor::*;
pub use identifiers::*;
pub use result::*;
pub use string_interner::*;
