//! The filesystem collaborator used by the library loader.
//!
//! [`StdFileSystem`] is the production implementation over `std::fs`;
//! [`MemoryFileSystem`] backs tests and in-memory libraries built with
//! `Library::from_source`.

use crate::errors::{Error, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// The result of a `stat` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stat {
    pub is_file: bool,
    pub is_directory: bool,
}

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub is_file: bool,
    pub is_directory: bool,
}

pub trait FileSystem {
    /// Absolute, normalised form of `path`.
    fn resolve(&self, path: &str) -> Result<String>;

    fn stat(&self, path: &str) -> Result<Stat>;

    fn read(&self, path: &str) -> Result<Vec<u8>>;

    fn join(&self, a: &str, b: &str) -> String;

    /// The extension of `name` including its dot, or the empty string.
    fn extname(&self, name: &str) -> String;

    /// Directory entries in listing order.
    fn readdir(&self, path: &str) -> Result<Vec<DirEntry>>;
}

/// `std::fs`-backed filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdFileSystem;

impl StdFileSystem {
    pub fn new() -> Self {
        StdFileSystem
    }
}

impl FileSystem for StdFileSystem {
    fn resolve(&self, path: &str) -> Result<String> {
        let absolute =
            std::path::absolute(path).map_err(|e| Error::file_system(path, e))?;
        Ok(absolute.to_string_lossy().into_owned())
    }

    fn stat(&self, path: &str) -> Result<Stat> {
        let metadata = std::fs::metadata(path).map_err(|e| Error::file_system(path, e))?;
        Ok(Stat {
            is_file: metadata.is_file(),
            is_directory: metadata.is_dir(),
        })
    }

    fn read(&self, path: &str) -> Result<Vec<u8>> {
        std::fs::read(path).map_err(|e| Error::file_system(path, e))
    }

    fn join(&self, a: &str, b: &str) -> String {
        PathBuf::from(a).join(b).to_string_lossy().into_owned()
    }

    fn extname(&self, name: &str) -> String {
        match Path::new(name).extension() {
            Some(ext) => format!(".{}", ext.to_string_lossy()),
            None => String::new(),
        }
    }

    fn readdir(&self, path: &str) -> Result<Vec<DirEntry>> {
        let mut entries = Vec::new();
        for entry in std::fs::read_dir(path).map_err(|e| Error::file_system(path, e))? {
            let entry = entry.map_err(|e| Error::file_system(path, e))?;
            let file_type = entry.file_type().map_err(|e| Error::file_system(path, e))?;
            entries.push(DirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                is_file: file_type.is_file(),
                is_directory: file_type.is_dir(),
            });
        }
        // the OS listing order is not stable; list the way `ls` does
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }
}

/// In-memory filesystem keyed by absolute `/`-separated paths.
#[derive(Debug, Default, Clone)]
pub struct MemoryFileSystem {
    files: BTreeMap<String, Vec<u8>>,
}

impl MemoryFileSystem {
    pub fn new() -> Self {
        MemoryFileSystem::default()
    }

    /// Registers a file; intermediate directories exist implicitly.
    pub fn add_file(&mut self, path: &str, content: impl Into<Vec<u8>>) {
        self.files.insert(normalize(path), content.into());
    }

    fn is_directory(&self, path: &str) -> bool {
        let prefix = format!("{}/", path.trim_end_matches('/'));
        self.files.keys().any(|k| k.starts_with(&prefix))
    }
}

fn normalize(path: &str) -> String {
    let mut out = String::from("/");
    for part in path.split('/') {
        if part.is_empty() || part == "." {
            continue;
        }
        if part == ".." {
            if let Some(pos) = out.trim_end_matches('/').rfind('/') {
                out.truncate(pos + 1);
            }
            continue;
        }
        if !out.ends_with('/') {
            out.push('/');
        }
        out.push_str(part);
    }
    if out.len() > 1 && out.ends_with('/') {
        out.pop();
    }
    out
}

impl FileSystem for MemoryFileSystem {
    fn resolve(&self, path: &str) -> Result<String> {
        Ok(normalize(path))
    }

    fn stat(&self, path: &str) -> Result<Stat> {
        let path = normalize(path);
        let is_file = self.files.contains_key(&path);
        let is_directory = self.is_directory(&path);
        if !is_file && !is_directory {
            return Err(Error::file_system(&path, "no such file or directory"));
        }
        Ok(Stat {
            is_file,
            is_directory,
        })
    }

    fn read(&self, path: &str) -> Result<Vec<u8>> {
        let path = normalize(path);
        self.files
            .get(&path)
            .cloned()
            .ok_or_else(|| Error::file_system(&path, "no such file"))
    }

    fn join(&self, a: &str, b: &str) -> String {
        format!("{}/{}", a.trim_end_matches('/'), b.trim_start_matches('/'))
    }

    fn extname(&self, name: &str) -> String {
        let base = name.rsplit('/').next().unwrap_or(name);
        match base.rfind('.') {
            Some(0) | None => String::new(),
            Some(pos) => base[pos..].to_string(),
        }
    }

    fn readdir(&self, path: &str) -> Result<Vec<DirEntry>> {
        let path = normalize(path);
        if !self.is_directory(&path) {
            return Err(Error::file_system(&path, "not a directory"));
        }
        let prefix = format!("{}/", path.trim_end_matches('/'));
        let mut entries: Vec<DirEntry> = Vec::new();
        for key in self.files.keys() {
            let Some(rest) = key.strip_prefix(&prefix) else {
                continue;
            };
            let name = rest.split('/').next().unwrap_or(rest).to_string();
            if entries.iter().any(|e| e.name == name) {
                continue;
            }
            let is_file = rest == name;
            entries.push(DirEntry {
                is_file,
                is_directory: !is_file,
                name,
            });
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_filesystem() {
        let mut fs = MemoryFileSystem::new();
        fs.add_file("/lib/P/package.mo", "package P end P;");
        fs.add_file("/lib/P/A.mo", "model A end A;");

        assert_eq!(fs.resolve("/lib//P/./A.mo").unwrap(), "/lib/P/A.mo");
        assert!(fs.stat("/lib/P").unwrap().is_directory);
        assert!(fs.stat("/lib/P/A.mo").unwrap().is_file);
        assert!(fs.stat("/lib/missing").is_err());

        let entries = fs.readdir("/lib/P").unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["A.mo", "package.mo"]);

        assert_eq!(fs.extname("A.mo"), ".mo");
        assert_eq!(fs.extname("noext"), "");
        assert_eq!(fs.join("/lib", "P"), "/lib/P");
        assert_eq!(
            fs.read("/lib/P/A.mo").unwrap(),
            b"model A end A;".to_vec()
        );
    }

    #[test]
    fn test_std_filesystem_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let fs = StdFileSystem::new();
        let file = dir.path().join("m.mo");
        std::fs::write(&file, "model M end M;").unwrap();

        let resolved = fs.resolve(file.to_str().unwrap()).unwrap();
        assert!(fs.stat(&resolved).unwrap().is_file);
        assert_eq!(fs.extname("m.mo"), ".mo");
        let listing = fs.readdir(dir.path().to_str().unwrap()).unwrap();
        assert_eq!(listing.len(), 1);
        assert_eq!(listing[0].name, "m.mo");
        assert!(listing[0].is_file);
    }
}
