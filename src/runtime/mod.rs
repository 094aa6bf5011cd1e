// File: src/runtime/mod.rs
//
// Everything that runs a compiled chunk: the execution context and
// expression evaluator it reads, the nexting stack, the statement loop,
// and cross-component linkage.

pub mod async_runtime;
pub mod context;
pub mod eval;
pub mod linkage;
pub mod machine;
pub mod nexting;
pub mod syslib;

pub use context::{Ctx, ExecutionContext, SharedOutput, Store};
pub use linkage::{Component, Library, Linkage};
pub use machine::{AbstainMap, Machine};
pub use nexting::{Fault, NextingStack, Outcome};
pub use syslib::SystemLibrary;
