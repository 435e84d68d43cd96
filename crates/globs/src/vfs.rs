// Licensed under the Apache License, Version 2.0.
//
// The filesystem contract the resolver depends on (spec.md §6's "Filesystem contract
// (collaborator)"), plus an in-memory test double grounded on the teacher's `testutil`
// fixtures, used in place of touching the real filesystem in unit tests.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::Stat;

/// Everything the resolver needs from a filesystem, relative to a single build root.
/// A real implementation (`RealFs`) and a test double (`InMemoryVfs`) both implement
/// this; the resolver in `lib.rs` is generic over `&dyn Vfs`.
pub trait Vfs {
    fn scandir(&self, dir: &Path) -> io::Result<Vec<Stat>>;
    fn readlink(&self, path: &Path) -> io::Result<PathBuf>;
    fn content(&self, path: &Path) -> io::Result<Vec<u8>>;
}

/// Reads the real filesystem beneath `build_root`. `scandir`/`readlink`/`content` all
/// take paths relative to the build root and return relative paths in turn, matching
/// spec.md §6's "Paths are always expressed relative to a single build root."
pub struct RealFs {
    build_root: PathBuf,
}

impl RealFs {
    pub fn new(build_root: impl Into<PathBuf>) -> RealFs {
        RealFs { build_root: build_root.into() }
    }

    fn absolute(&self, relative: &Path) -> PathBuf {
        self.build_root.join(relative)
    }
}

impl Vfs for RealFs {
    fn scandir(&self, dir: &Path) -> io::Result<Vec<Stat>> {
        let absolute_dir = self.absolute(dir);
        let mut stats = Vec::new();
        for entry in fs::read_dir(&absolute_dir)? {
            let entry = entry?;
            let relative = if dir == Path::new(".") {
                PathBuf::from(entry.file_name())
            } else {
                dir.join(entry.file_name())
            };
            let file_type = entry.file_type()?;
            let stat = if file_type.is_symlink() {
                Stat::Link(relative)
            } else if file_type.is_dir() {
                Stat::Dir(relative)
            } else {
                Stat::File(relative)
            };
            stats.push(stat);
        }
        Ok(stats)
    }

    fn readlink(&self, path: &Path) -> io::Result<PathBuf> {
        fs::read_link(self.absolute(path))
    }

    fn content(&self, path: &Path) -> io::Result<Vec<u8>> {
        fs::read(self.absolute(path))
    }
}

/// A fully in-memory filesystem double for unit tests: directories are only "present"
/// if explicitly added (directly or as an ancestor of an added file/link), so
/// `scandir`ing an unknown directory fails exactly as it would on a real, nonexistent
/// path — letting tests exercise the resolver's hard-fault policy without touching disk.
#[derive(Default)]
pub struct InMemoryVfs {
    dirs: HashMap<PathBuf, Vec<Stat>>,
    links: HashMap<PathBuf, PathBuf>,
    files: HashMap<PathBuf, Vec<u8>>,
}

impl InMemoryVfs {
    pub fn new() -> InMemoryVfs {
        let mut vfs = InMemoryVfs::default();
        vfs.dirs.entry(PathBuf::from(".")).or_default();
        vfs
    }

    fn ensure_dir_chain(&mut self, dir: &Path) {
        let mut current = PathBuf::from(".");
        self.dirs.entry(current.clone()).or_default();
        for component in dir.components() {
            let name = component.as_os_str();
            if name == "." {
                continue;
            }
            let child = if current == Path::new(".") { PathBuf::from(name) } else { current.join(name) };
            let parent_entry = self.dirs.entry(current.clone()).or_default();
            if !parent_entry.iter().any(|s| s.path() == child) {
                parent_entry.push(Stat::Dir(child.clone()));
            }
            self.dirs.entry(child.clone()).or_default();
            current = child;
        }
    }

    pub fn add_file(&mut self, path: &str) {
        self.add_file_with_content(path, Vec::new());
    }

    pub fn add_file_with_content(&mut self, path: &str, content: Vec<u8>) {
        let path = PathBuf::from(path);
        let parent = path.parent().unwrap_or_else(|| Path::new(".")).to_path_buf();
        self.ensure_dir_chain(&parent);
        let entry = self.dirs.entry(parent).or_default();
        if !entry.iter().any(|s| s.path() == path) {
            entry.push(Stat::File(path.clone()));
        }
        self.files.insert(path, content);
    }

    /// Registers `name` as a directory entry of `parent` without creating a listing for
    /// it: a test double for a directory that `scandir` confirmed exists (it shows up in
    /// its parent's listing) but whose own `scandir` then hits a hard I/O fault, per the
    /// resolver's failure policy (spec.md §4.6) — distinct from a directory that was
    /// never created at all, which `scandir` reports as not-found rather than erroring.
    pub fn add_phantom_dir(&mut self, parent: &str, name: &str) {
        let parent = PathBuf::from(parent);
        self.ensure_dir_chain(&parent);
        let child = if parent == Path::new(".") { PathBuf::from(name) } else { parent.join(name) };
        let entry = self.dirs.entry(parent).or_default();
        if !entry.iter().any(|s| s.path() == child) {
            entry.push(Stat::Dir(child));
        }
    }

    pub fn add_link(&mut self, path: &str, target: &str) {
        let path = PathBuf::from(path);
        let parent = path.parent().unwrap_or_else(|| Path::new(".")).to_path_buf();
        self.ensure_dir_chain(&parent);
        let entry = self.dirs.entry(parent).or_default();
        if !entry.iter().any(|s| s.path() == path) {
            entry.push(Stat::Link(path.clone()));
        }
        self.links.insert(path, PathBuf::from(target));
    }
}

impl Vfs for InMemoryVfs {
    fn scandir(&self, dir: &Path) -> io::Result<Vec<Stat>> {
        self
            .dirs
            .get(dir)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("no such directory: {dir:?}")))
    }

    fn readlink(&self, path: &Path) -> io::Result<PathBuf> {
        self
            .links
            .get(path)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("not a link: {path:?}")))
    }

    fn content(&self, path: &Path) -> io::Result<Vec<u8>> {
        self
            .files
            .get(path)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("no such file: {path:?}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_file_registers_ancestor_directories() {
        let mut vfs = InMemoryVfs::new();
        vfs.add_file("a/b/c.txt");
        assert!(vfs.scandir(Path::new("a")).is_ok());
        assert!(vfs.scandir(Path::new("a/b")).is_ok());
        let root = vfs.scandir(Path::new(".")).unwrap();
        assert_eq!(root, vec![Stat::Dir(PathBuf::from("a"))]);
    }

    #[test]
    fn unregistered_directory_is_not_found() {
        let vfs = InMemoryVfs::new();
        assert!(vfs.scandir(Path::new("nope")).is_err());
    }
}
