// File: src/module.rs
//
// Library loading: finds `.i` files, compiles them against the components
// already linked, and caches the result by canonical path so a library
// named twice is compiled once.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use crate::compiler::Compiler;
use crate::config::Options;
use crate::errors::{ErrorCode, IckError};
use crate::parser::parse_source;
use crate::runtime::linkage::{Library, Linkage};

/// Source extension for INTERCAL programs and libraries.
pub const SOURCE_EXTENSION: &str = "i";

/// Manages library loading, caching, and resolution
pub struct ModuleLoader {
    /// Compiled libraries by canonical path
    loaded: HashMap<PathBuf, Arc<Library>>,
    /// Search paths for libraries given by relative path
    search_paths: Vec<PathBuf>,
}

impl ModuleLoader {
    /// Creates a new loader searching `.` and `./lib`
    pub fn new() -> Self {
        ModuleLoader {
            loaded: HashMap::new(),
            search_paths: vec![PathBuf::from("."), PathBuf::from("./lib")],
        }
    }

    pub fn from_options(options: &Options) -> Self {
        let mut loader = Self::new();
        for path in &options.search_paths {
            loader.add_search_path(path);
        }
        loader
    }

    pub fn add_search_path<P: AsRef<Path>>(&mut self, path: P) {
        self.search_paths.push(path.as_ref().to_path_buf());
    }

    /// Check the extension, then find the file directly or under a search path.
    pub fn resolve(&self, name: &Path) -> Result<PathBuf, IckError> {
        if name.extension().and_then(|e| e.to_str()) != Some(SOURCE_EXTENSION) {
            return Err(IckError::io(ErrorCode::E998, format!("({})", name.display())));
        }
        if name.is_file() {
            return Ok(name.to_path_buf());
        }
        if name.is_relative() {
            for dir in &self.search_paths {
                let candidate = dir.join(name);
                if candidate.is_file() {
                    return Ok(candidate);
                }
            }
        }
        Err(IckError::io(ErrorCode::E777, format!("({}: not found)", name.display())))
    }

    /// Compile the library at `name`, with `visible` as the components its
    /// own NEXTs may reach.
    pub fn load(
        &mut self,
        name: &Path,
        visible: &Linkage,
        options: &Options,
    ) -> Result<Arc<Library>, IckError> {
        let path = self.resolve(name)?;
        let canonical = fs::canonicalize(&path)
            .map_err(|e| IckError::io(ErrorCode::E777, format!("({}: {})", path.display(), e)))?;
        if let Some(library) = self.loaded.get(&canonical) {
            debug!(path = %canonical.display(), "library already loaded");
            return Ok(Arc::clone(library));
        }

        let source = fs::read_to_string(&canonical)
            .map_err(|e| IckError::io(ErrorCode::E777, format!("({}: {})", path.display(), e)))?;
        let file = path.display().to_string();
        let chunk = Compiler::from_options(file.clone(), options)
            .with_externals(visible.labels())
            .compile(parse_source(&source))
            .map_err(|e| e.in_file(&file))?;
        debug!(path = %file, exports = chunk.exports.len(), "compiled library");

        let library = Arc::new(Library::new(chunk, visible.clone()));
        self.loaded.insert(canonical, Arc::clone(&library));
        Ok(library)
    }

    pub fn loaded(&self) -> usize {
        self.loaded.len()
    }
}

impl Default for ModuleLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::linkage::Component;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn scratch_dir(prefix: &str) -> PathBuf {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        let dir = std::env::temp_dir().join(format!(
            "comefrom_{}_{}_{}",
            prefix,
            std::process::id(),
            COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn quiet() -> Options {
        Options { politeness: false, ..Options::default() }
    }

    #[test]
    fn test_wrong_extension() {
        let loader = ModuleLoader::new();
        let err = loader.resolve(Path::new("library.txt")).unwrap_err();
        assert_eq!(err.code, ErrorCode::E998);
    }

    #[test]
    fn test_missing_file() {
        let loader = ModuleLoader::new();
        let err = loader.resolve(Path::new("definitely/not/here.i")).unwrap_err();
        assert_eq!(err.code, ErrorCode::E777);
    }

    #[test]
    fn test_search_path_and_cache() {
        let dir = scratch_dir("search");
        fs::write(dir.join("lib.i"), "(3000) DO RESUME #1\n").unwrap();

        let mut loader = ModuleLoader::new();
        loader.add_search_path(&dir);
        let first = loader.load(Path::new("lib.i"), &Linkage::new(), &quiet()).unwrap();
        let second = loader.load(&dir.join("lib.i"), &Linkage::new(), &quiet()).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(loader.loaded(), 1);
        assert_eq!(first.exports(), vec![crate::ast::Label::new(3000).unwrap()]);

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_compile_errors_name_the_file() {
        let dir = scratch_dir("broken");
        let path = dir.join("broken.i");
        fs::write(&path, "(1) DO RESUME #1\n(1) DO RESUME #1\n").unwrap();

        let err = ModuleLoader::new().load(&path, &Linkage::new(), &quiet()).err().unwrap();
        assert_eq!(err.code, ErrorCode::E182);
        let file = err.location.and_then(|l| l.file).unwrap();
        assert!(file.ends_with("broken.i"));

        fs::remove_dir_all(&dir).unwrap();
    }
}
