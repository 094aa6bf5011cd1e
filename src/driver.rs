// File: src/driver.rs
//
// The compile-and-run pipeline shared by the binary and the tests:
// options -> linked libraries -> parse -> compile -> run on a fresh
// nexting stack.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use crate::bytecode::Chunk;
use crate::compiler::Compiler;
use crate::config::Options;
use crate::errors::{ErrorCode, IckError};
use crate::module::ModuleLoader;
use crate::parser::parse_source;
use crate::runtime::async_runtime::AsyncRuntime;
use crate::runtime::context::{Ctx, Store};
use crate::runtime::linkage::{Component, Linkage};
use crate::runtime::machine::Machine;
use crate::runtime::nexting::NextingStack;
use crate::runtime::syslib::SystemLibrary;

pub struct Driver {
    options: Options,
    /// User components in link order; the system library is added on top
    linkage: Linkage,
    loader: ModuleLoader,
}

impl Driver {
    pub fn new(options: Options) -> Self {
        let loader = ModuleLoader::from_options(&options);
        Driver { options, linkage: Linkage::new(), loader }
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Link a component ahead of the system library.
    pub fn link(&mut self, component: Arc<dyn Component>) -> usize {
        self.linkage.link(component)
    }

    /// Load the configured libraries, then `extra`, in order. Each one
    /// sees the libraries before it and the system library.
    pub fn load_libraries(&mut self, extra: &[PathBuf]) -> Result<(), IckError> {
        let paths: Vec<PathBuf> = self.options.libraries.iter().chain(extra).cloned().collect();
        for path in paths {
            let visible = self.linkage();
            let library = self.loader.load(&path, &visible, &self.options)?;
            let owned = self.linkage.link(library);
            info!(path = %path.display(), owned, "linked library");
        }
        Ok(())
    }

    /// Everything a program can NEXT into.
    pub fn linkage(&self) -> Linkage {
        let mut linkage = self.linkage.clone();
        if self.options.stdlib {
            linkage.link(Arc::new(SystemLibrary::new()));
        }
        linkage
    }

    pub fn compile(&self, name: &str, source: &str) -> Result<Chunk, IckError> {
        Compiler::from_options(name, &self.options)
            .with_public_labels(None)
            .with_externals(self.linkage().labels())
            .compile(parse_source(source))
            .map_err(|e| e.in_file(name))
    }

    pub fn compile_file(&self, path: &Path) -> Result<Chunk, IckError> {
        let source = fs::read_to_string(path)
            .map_err(|e| IckError::io(ErrorCode::E777, format!("({}: {})", path.display(), e)))?;
        self.compile(&path.display().to_string(), &source)
    }

    /// A context on stdin/stdout, seeded when a seed is configured.
    pub fn context(&self) -> Ctx {
        let store = Store::stdio();
        match self.options.seed {
            Some(seed) => Box::new(store.with_seed(seed)),
            None => Box::new(store),
        }
    }

    /// Run a chunk to completion; returns the context it finished with.
    pub async fn run(&self, chunk: Chunk, ctx: Ctx) -> Result<Ctx, IckError> {
        let stack = Arc::new(NextingStack::new(self.options.max_nexting_depth));
        let machine = Machine::load(chunk, Arc::new(self.linkage()), stack);
        machine.run(ctx).await.map_err(|fault| fault.error)
    }

    /// `run` on the global runtime, for synchronous callers.
    pub fn run_blocking(&self, chunk: Chunk, ctx: Ctx) -> Result<Ctx, IckError> {
        AsyncRuntime::block_on(self.run(chunk, ctx))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::Op;
    use crate::runtime::context::SharedOutput;
    use std::io::Cursor;

    fn driver() -> Driver {
        Driver::new(Options { politeness: false, ..Options::default() })
    }

    #[test]
    fn test_stdlib_labels_resolve_externally() {
        let chunk = driver().compile("t.i", "DO (1000) NEXT\nDO GIVE UP").unwrap();
        assert!(matches!(chunk.instructions[0].op, Op::NextExternal { .. }));

        let bare = Driver::new(Options { politeness: false, stdlib: false, ..Options::default() });
        let chunk = bare.compile("t.i", "DO (1000) NEXT\nDO GIVE UP").unwrap();
        assert!(matches!(chunk.instructions[0].op, Op::Lost { label: 1000 }));
    }

    #[test]
    fn test_run_blocking_with_syslib() {
        let d = driver();
        let chunk = d
            .compile("add.i", "DO .1 <- #2\nDO .2 <- #3\nDO (1000) NEXT\nDO READ OUT .3\nDO GIVE UP")
            .unwrap();
        let out = SharedOutput::new();
        let ctx: Ctx = Box::new(Store::new(Cursor::new(Vec::new()), out.clone()));
        d.run_blocking(chunk, ctx).unwrap();
        assert_eq!(out.contents(), "5\n");
    }

    #[test]
    fn test_compile_error_carries_file_name() {
        let err = driver().compile("dup.i", "(1) DO GIVE UP\n(1) DO GIVE UP").unwrap_err();
        assert_eq!(err.location.and_then(|l| l.file).as_deref(), Some("dup.i"));
    }
}
