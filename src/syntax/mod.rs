//! Parsing for the embedded cell language.

pub mod parser;

pub use parser::parse;
