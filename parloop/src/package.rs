//! Project loading: enumerate the source files under a root, parse each one,
//! resolve names per directory (one package per directory), and run the type
//! oracle. The build descriptor (`go.mod`) in the root names the module and
//! its external requirements; fetching those is the dependency downloader's
//! job, not ours.

use std::fs;
use std::path::{Path, PathBuf};

use rustc_hash::FxHashMap;
use walkdir::WalkDir;

use crate::resolve::{self, Bindings, SymbolTable};
use crate::syntax::{parse_file, File, Position, SourceFile};
use crate::types::{check_file, TypeOracle};
use crate::{Error, Result};

/// Contents of the build descriptor in the project root.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ModuleInfo {
    pub module: String,
    pub requires: Vec<Requirement>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Requirement {
    pub path: String,
    pub version: String,
}

/// One parsed, resolved, type-checked source file.
pub struct LoadedFile {
    /// Path relative to the project root, forward slashes.
    pub rel_path: String,
    pub source: SourceFile,
    pub ast: File,
    pub bindings: Bindings,
    pub oracle: TypeOracle,
}

impl LoadedFile {
    pub fn position_of(&self, offset: u32) -> Position {
        self.source.position(offset)
    }
}

pub struct Package {
    pub root: PathBuf,
    pub module: Option<ModuleInfo>,
    pub files: Vec<LoadedFile>,
    pub symbols: SymbolTable,
    /// Files that failed to parse; the run continues without them.
    pub skipped: Vec<Error>,
}

impl Package {
    /// Parse and type-check everything under `root`.
    pub fn load(root: &Path) -> Result<Package> {
        let module = read_go_mod(root)?;
        let paths = source_files(root)?;

        // Parse first; resolution needs every file of a directory at once.
        let mut parsed: Vec<(String, SourceFile, File)> = Vec::new();
        let mut skipped = Vec::new();
        for rel in paths {
            let abs = root.join(&rel);
            let text = fs::read_to_string(&abs).map_err(|e| Error::io(&abs, e))?;
            let rel_name = rel.to_string_lossy().replace('\\', "/");
            let source = SourceFile::new(rel_name.clone(), text);
            match parse_file(&source) {
                Ok(ast) => parsed.push((rel_name, source, ast)),
                Err(err) => skipped.push(Error::Parse(err)),
            }
        }

        let mut symbols = SymbolTable::default();
        let universe = resolve::universe_scope(&mut symbols);

        // Group by directory: files in one directory form one package.
        let mut groups: FxHashMap<String, Vec<usize>> = FxHashMap::default();
        for (i, (rel, _, _)) in parsed.iter().enumerate() {
            let dir = rel.rsplit_once('/').map(|(d, _)| d).unwrap_or("");
            groups.entry(dir.to_owned()).or_default().push(i);
        }

        let mut files = Vec::with_capacity(parsed.len());
        let mut order: Vec<_> = groups.into_iter().collect();
        order.sort_by(|a, b| a.0.cmp(&b.0));
        for (_, indices) in order {
            let group_asts: Vec<File> = indices
                .iter()
                .map(|&i| parsed[i].2.clone())
                .collect();
            let package_scope = resolve::collect_package_scope(&group_asts, &mut symbols);
            for &i in &indices {
                let (rel_name, source, ast) = &parsed[i];
                let mut bindings =
                    resolve::resolve_file(ast, &mut symbols, &universe, &package_scope);
                let imports = import_map(ast);
                let oracle = check_file(ast, &symbols, &mut bindings, &imports);
                files.push(LoadedFile {
                    rel_path: rel_name.clone(),
                    source: source.clone(),
                    ast: ast.clone(),
                    bindings,
                    oracle,
                });
            }
        }
        files.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));

        Ok(Package {
            root: root.to_path_buf(),
            module,
            files,
            symbols,
            skipped,
        })
    }

    pub fn file_by_name(&self, rel_path: &str) -> Option<&LoadedFile> {
        let normalized = rel_path.replace('\\', "/");
        self.files.iter().find(|f| f.rel_path == normalized)
    }
}

/// Alias -> import path for one file, feeding qualified-type printing.
pub fn import_map(ast: &File) -> FxHashMap<String, String> {
    let mut map = FxHashMap::default();
    for spec in &ast.imports {
        let alias = match &spec.alias {
            Some(alias) => alias.name.clone(),
            None => spec
                .path
                .rsplit('/')
                .next()
                .unwrap_or(&spec.path)
                .to_owned(),
        };
        map.insert(alias, spec.path.clone());
    }
    map
}

/// Every analyzable source file under `root`, relative, sorted. Skips
/// `_test.go` files and any path component starting with `.` or `_`.
pub fn source_files(root: &Path) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    let walker = WalkDir::new(root).follow_links(true).into_iter();
    for entry in walker.filter_entry(|e| {
        e.depth() == 0 || !is_hidden_component(&e.file_name().to_string_lossy())
    }) {
        let entry = entry.map_err(|e| {
            let path = e.path().map(Path::to_path_buf).unwrap_or_default();
            match e.into_io_error() {
                Some(io) => Error::io(path, io),
                None => Error::Config("walk hit a filesystem loop".to_owned()),
            }
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if !name.ends_with(".go") || name.ends_with("_test.go") {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(root)
            .expect("walkdir yields paths under root")
            .to_path_buf();
        out.push(rel);
    }
    out.sort();
    Ok(out)
}

fn is_hidden_component(name: &str) -> bool {
    name.starts_with('.') || name.starts_with('_')
}

/// Parse the `module` line and `require` entries of `go.mod`. A missing
/// descriptor is fine for analysis mode; the benchmark path requires it.
pub fn read_go_mod(root: &Path) -> Result<Option<ModuleInfo>> {
    let path = root.join("go.mod");
    let text = match fs::read_to_string(&path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(Error::io(&path, e)),
    };
    let mut info = ModuleInfo::default();
    let mut in_require = false;
    for line in text.lines() {
        let line = line.split("//").next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        if in_require {
            if line == ")" {
                in_require = false;
                continue;
            }
            if let Some((path, version)) = line.split_once(char::is_whitespace) {
                info.requires.push(Requirement {
                    path: path.to_owned(),
                    version: version.trim().to_owned(),
                });
            }
            continue;
        }
        if let Some(rest) = line.strip_prefix("module ") {
            info.module = rest.trim().to_owned();
        } else if line == "require (" {
            in_require = true;
        } else if let Some(rest) = line.strip_prefix("require ") {
            if let Some((path, version)) = rest.trim().split_once(char::is_whitespace) {
                info.requires.push(Requirement {
                    path: path.to_owned(),
                    version: version.trim().to_owned(),
                });
            }
        }
    }
    Ok(Some(info))
}

#[cfg(test)]
mod test {
    use super::*;
    use std::fs;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    #[test]
    fn selector_skips_hidden_tests_and_underscores() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "main.go", "package main\n");
        write(dir.path(), "main_test.go", "package main\n");
        write(dir.path(), "util/io.go", "package util\n");
        write(dir.path(), "_tmp/x.go", "package x\n");
        write(dir.path(), ".git/y.go", "package y\n");
        write(dir.path(), "notes.txt", "hi\n");
        let files = source_files(dir.path()).unwrap();
        assert_eq!(
            files,
            vec![PathBuf::from("main.go"), PathBuf::from("util/io.go")]
        );
    }

    #[test]
    fn load_skips_bad_files_and_keeps_good_ones() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "main.go",
            "package main\n\nfunc main() {\n\tprintln(1)\n}\n",
        );
        write(dir.path(), "broken.go", "package main\n\nfunc { nope\n");
        let pkg = Package::load(dir.path()).unwrap();
        assert_eq!(pkg.files.len(), 1);
        assert_eq!(pkg.skipped.len(), 1);
        assert!(pkg.file_by_name("main.go").is_some());
        assert!(pkg.file_by_name("broken.go").is_none());
    }

    #[test]
    fn cross_file_package_scope_resolves() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.go", "package main\n\nvar shared int\n");
        write(
            dir.path(),
            "b.go",
            "package main\n\nfunc f() {\n\tshared = 2\n}\n",
        );
        let pkg = Package::load(dir.path()).unwrap();
        assert_eq!(pkg.files.len(), 2);
        // No panic and both files present is the observable contract here;
        // binding identity is covered by the resolver's own tests.
        assert!(pkg.file_by_name("b.go").is_some());
    }

    #[test]
    fn go_mod_module_and_requires() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "go.mod",
            "module example.com/demo\n\ngo 1.21\n\nrequire (\n\tgithub.com/google/uuid v1.3.0\n\tgolang.org/x/tools v0.8.0 // indirect\n)\n",
        );
        let info = read_go_mod(dir.path()).unwrap().unwrap();
        assert_eq!(info.module, "example.com/demo");
        assert_eq!(info.requires.len(), 2);
        assert_eq!(info.requires[0].path, "github.com/google/uuid");
        assert_eq!(info.requires[0].version, "v1.3.0");
    }

    #[test]
    fn missing_go_mod_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(read_go_mod(dir.path()).unwrap(), None);
    }
}
