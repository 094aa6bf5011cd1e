// File: src/lib.rs
//
// Library interface for the comefrom compiler.
// Exposes modules for integration testing and external use.

pub mod ast;
pub mod bytecode;
pub mod compiler;
pub mod config;
pub mod driver;
pub mod errors;
pub mod lexer;
pub mod module;
pub mod optimizer;
pub mod parser;
pub mod program;
pub mod runtime;
