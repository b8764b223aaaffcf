//! Module sources. An importer turns a module path into compiled code; the
//! VM runs that code once and caches the resulting module.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use dashmap::DashMap;

use crate::error::{ErrorKind, err};
use crate::rt::CancelToken;
use crate::util::fast_map::{FastHashMap, fast_hash_map_new};
use crate::vm::{Code, compile_source};

/// Compiled but not yet executed module.
#[derive(Debug, Clone)]
pub struct Module {
    pub name: Arc<str>,
    pub code: Arc<Code>,
}

/// What an importer may need from the importing VM.
pub struct ImportContext<'a> {
    pub cancel: &'a CancelToken,
    /// Names the module body may reference as globals (the host's builtins).
    pub global_names: &'a [Arc<str>],
}

pub trait Importer: Send + Sync {
    fn import(&self, ctx: &ImportContext<'_>, name: &str) -> Result<Module>;
}

fn not_found(name: &str) -> anyhow::Error {
    err(ErrorKind::Import, format!("module \"{name}\" not found"))
}

/// `a.b` and `a/b` both name `a/b`. Absolute paths and `..` are rejected.
fn module_rel_path(name: &str) -> Result<PathBuf> {
    let normalized = name.replace('.', "/");
    let path = Path::new(&normalized);
    let valid = !name.is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    if !valid {
        return Err(err(ErrorKind::Import, format!("invalid module path: \"{name}\"")));
    }
    Ok(path.to_path_buf())
}

/// Loads modules from source files under a root directory.
#[derive(Debug)]
pub struct LocalImporter {
    root: PathBuf,
    extensions: Vec<String>,
    cache: DashMap<String, Arc<Code>>,
}

impl LocalImporter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            extensions: vec!["brk".to_string(), "brook".to_string()],
            cache: DashMap::new(),
        }
    }

    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extensions = extensions
            .into_iter()
            .map(|e| e.into().trim_start_matches('.').to_string())
            .collect();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, name: &str) -> Result<PathBuf> {
        let rel = module_rel_path(name)?;
        for ext in &self.extensions {
            let candidate = self.root.join(&rel).with_extension(ext);
            if candidate.is_file() {
                return Ok(candidate);
            }
        }
        Err(not_found(name))
    }
}

impl Importer for LocalImporter {
    fn import(&self, ctx: &ImportContext<'_>, name: &str) -> Result<Module> {
        if let Some(code) = self.cache.get(name) {
            return Ok(Module {
                name: Arc::from(name),
                code: code.value().clone(),
            });
        }
        let path = self.resolve(name)?;
        tracing::debug!(module = name, path = %path.display(), "loading module source");
        let source = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read module \"{name}\" from {}", path.display()))?;
        let code = compile_source(&source, name, ctx.global_names)?;
        self.cache.insert(name.to_string(), code.clone());
        Ok(Module {
            name: Arc::from(name),
            code,
        })
    }
}

/// Module sources held in memory, keyed by module path.
#[derive(Debug, Default)]
pub struct MemoryImporter {
    sources: FastHashMap<String, String>,
}

impl MemoryImporter {
    pub fn new() -> Self {
        Self {
            sources: fast_hash_map_new(),
        }
    }

    pub fn with_module(mut self, name: impl Into<String>, source: impl Into<String>) -> Self {
        self.insert(name, source);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, source: impl Into<String>) {
        self.sources.insert(name.into().replace('.', "/"), source.into());
    }
}

impl Importer for MemoryImporter {
    fn import(&self, ctx: &ImportContext<'_>, name: &str) -> Result<Module> {
        let key = module_rel_path(name)?.to_string_lossy().to_string();
        let source = self.sources.get(&key).ok_or_else(|| not_found(name))?;
        let code = compile_source(source, name, ctx.global_names)?;
        Ok(Module {
            name: Arc::from(name),
            code,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VmError;

    fn ctx<'a>(cancel: &'a CancelToken, names: &'a [Arc<str>]) -> ImportContext<'a> {
        ImportContext {
            cancel,
            global_names: names,
        }
    }

    #[test]
    fn test_module_paths() {
        assert_eq!(module_rel_path("a.b").unwrap(), PathBuf::from("a/b"));
        assert_eq!(module_rel_path("a/b").unwrap(), PathBuf::from("a/b"));
        for bad in ["", "/etc/passwd", "../secret", "a/../../b"] {
            let e = module_rel_path(bad).unwrap_err();
            assert_eq!(VmError::kind_of(&e), ErrorKind::Import, "{bad}");
        }
    }

    #[test]
    fn test_local_importer_finds_both_extensions() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("pkg")).unwrap();
        std::fs::write(dir.path().join("util.brk"), "x := 1").unwrap();
        std::fs::write(dir.path().join("pkg/inner.brook"), "y := 2").unwrap();

        let importer = LocalImporter::new(dir.path());
        let cancel = CancelToken::new();
        let c = ctx(&cancel, &[]);
        let util = importer.import(&c, "util").unwrap();
        assert_eq!(util.name.as_ref(), "util");
        assert!(util.code.global_index("x").is_some());

        let inner = importer.import(&c, "pkg.inner").unwrap();
        assert!(inner.code.global_index("y").is_some());
        assert!(importer.import(&c, "pkg/inner").is_ok());
    }

    #[test]
    fn test_local_importer_caches_code() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("m.brk");
        std::fs::write(&file, "a := 1").unwrap();
        let importer = LocalImporter::new(dir.path());
        let cancel = CancelToken::new();
        let first = importer.import(&ctx(&cancel, &[]), "m").unwrap();
        std::fs::remove_file(&file).unwrap();
        let second = importer.import(&ctx(&cancel, &[]), "m").unwrap();
        assert!(Arc::ptr_eq(&first.code, &second.code));
    }

    #[test]
    fn test_missing_module() {
        let dir = tempfile::tempdir().unwrap();
        let importer = LocalImporter::new(dir.path());
        let cancel = CancelToken::new();
        let e = importer.import(&ctx(&cancel, &[]), "nope").unwrap_err();
        assert_eq!(VmError::kind_of(&e), ErrorKind::Import);
        assert!(e.to_string().contains("\"nope\" not found"));
    }

    #[test]
    fn test_memory_importer_uses_global_names() {
        let importer = MemoryImporter::new().with_module("lib.math", "y := len([1])");
        let cancel = CancelToken::new();
        let names: Vec<Arc<str>> = vec![Arc::from("len")];
        let module = importer.import(&ctx(&cancel, &names), "lib/math").unwrap();
        assert_eq!(module.code.global_index("len"), Some(0));
        assert!(importer.import(&ctx(&cancel, &[]), "lib.math").is_err());
    }
}
