// Licensed under the Apache License, Version 2.0.
//
// The path-glob resolver: expands a filesystem glob pattern into the set of concrete
// paths it matches, against a pluggable `Vfs` collaborator, following symlinks and
// preserving the symbolic (pre-symlink) name of whatever is matched.

mod pattern;
mod vfs;

pub use crate::pattern::{PathGlob, PatternError};
pub use crate::vfs::{InMemoryVfs, Vfs};

use std::path::{Path, PathBuf};

/// A `Stat` as read directly off the filesystem (or test double): the canonical kind of
/// filesystem entry at a path, before any symlink has been followed.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum Stat {
    Dir(PathBuf),
    File(PathBuf),
    Link(PathBuf),
}

impl Stat {
    pub fn path(&self) -> &Path {
        match self {
            Stat::Dir(p) | Stat::File(p) | Stat::Link(p) => p.as_path(),
        }
    }
}

/// A matched filesystem path, holding both its symbolic path name (the name the pattern
/// matched it under, which may have traveled through one or more symlinks) and the
/// canonical `Stat` underlying it.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct PathStat {
    pub symbolic_path: PathBuf,
    pub stat: Stat,
}

impl PathStat {
    pub fn dir(symbolic_path: PathBuf, canonical_path: PathBuf) -> PathStat {
        PathStat { symbolic_path, stat: Stat::Dir(canonical_path) }
    }

    pub fn file(symbolic_path: PathBuf, canonical_path: PathBuf) -> PathStat {
        PathStat { symbolic_path, stat: Stat::File(canonical_path) }
    }

    pub fn link(symbolic_path: PathBuf, canonical_path: PathBuf) -> PathStat {
        PathStat { symbolic_path, stat: Stat::Link(canonical_path) }
    }
}

/// The terminal result of resolving one or more glob patterns: every matched path,
/// partitioned by the kind of its canonical stat.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Paths {
    pub files: Vec<PathStat>,
    pub dirs: Vec<PathStat>,
    pub links: Vec<PathStat>,
}

impl Paths {
    fn push(&mut self, path: PathStat) {
        match &path.stat {
            Stat::Dir(_) => self.dirs.push(path),
            Stat::File(_) => self.files.push(path),
            Stat::Link(_) => self.links.push(path),
        }
    }

    fn extend(&mut self, other: Paths) {
        self.files.extend(other.files);
        self.dirs.extend(other.dirs);
        self.links.extend(other.links);
    }

    /// Sorts every partition by symbolic path, for deterministic, filename-ordered
    /// output regardless of the order `scandir` happened to return entries in.
    pub fn sort(&mut self) {
        self.files.sort_by(|a, b| a.symbolic_path.cmp(&b.symbolic_path));
        self.dirs.sort_by(|a, b| a.symbolic_path.cmp(&b.symbolic_path));
        self.links.sort_by(|a, b| a.symbolic_path.cmp(&b.symbolic_path));
    }
}

/// A hard fault during glob expansion: a `scandir` failed on a directory that a prior
/// step had already confirmed to exist. A dangling symlink, by contrast, is not an
/// error — it simply contributes no match (see `resolve`).
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct GlobError(pub String);

impl std::fmt::Display for GlobError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for GlobError {}

impl From<PatternError> for GlobError {
    fn from(e: PatternError) -> GlobError {
        GlobError(e.0)
    }
}

/// Expands every pattern in `patterns` against `vfs`, relative to the build root
/// (`canonical_dir = "."`), and merges the results — the `merge_paths` task of the
/// original source, folded into the top-level entry point since this workspace does not
/// materialize one graph node per merge step.
pub fn resolve(vfs: &dyn Vfs, patterns: &[String]) -> Result<Paths, GlobError> {
    let mut merged = Paths::default();
    for pattern in patterns {
        let glob = PathGlob::create_from_spec(Path::new("."), Path::new("."), pattern)?;
        merged.extend(resolve_one(vfs, glob)?);
    }
    merged.sort();
    Ok(merged)
}

/// Resolves a single in-progress `PathGlob` to the `Paths` it ultimately matches,
/// recursing through directory wildcards and symlinks until every branch terminates.
fn resolve_one(vfs: &dyn Vfs, glob: PathGlob) -> Result<Paths, GlobError> {
    match glob {
        PathGlob::Wildcard { canonical_dir, symbolic_path, wildcard } => {
            let stats = scandir(vfs, &canonical_dir)?;
            let pattern = wildcard.compiled()?;
            let mut paths = Paths::default();
            for stat in stats {
                let basename = match stat.path().file_name() {
                    Some(name) => name,
                    None => continue,
                };
                if !pattern.matches(&basename.to_string_lossy()) {
                    continue;
                }
                let matched_symbolic = join_symbolic(&symbolic_path, basename);
                paths.push(resolve_terminal(vfs, matched_symbolic, stat)?);
            }
            Ok(paths)
        }
        PathGlob::Literal { canonical_dir, symbolic_path, literal, remainder } => {
            let stats = scandir(vfs, &canonical_dir)?;
            let matched = stats.into_iter().find(|s| s.path().file_name() == Some(literal.as_os_str()));
            let Some(stat) = matched else {
                return Ok(Paths::default());
            };
            let matched_symbolic = join_symbolic(&symbolic_path, literal.as_os_str());
            match resolve_dir_for_recursion(vfs, matched_symbolic, stat)? {
                Some((next_symbolic, next_canonical)) => {
                    let next = PathGlob::create_from_spec(&next_canonical, &next_symbolic, &remainder)?;
                    resolve_one(vfs, next)
                }
                None => Ok(Paths::default()),
            }
        }
        PathGlob::DirWildcard { canonical_dir, symbolic_path, wildcard, remainders } => {
            let stats = scandir(vfs, &canonical_dir)?;
            let pattern = wildcard.compiled()?;
            let mut paths = Paths::default();
            for stat in stats {
                let basename = match stat.path().file_name() {
                    Some(name) => name,
                    None => continue,
                };
                if !pattern.matches(&basename.to_string_lossy()) {
                    continue;
                }
                let matched_symbolic = join_symbolic(&symbolic_path, basename);
                let Some((next_symbolic, next_canonical)) =
                    resolve_dir_for_recursion(vfs, matched_symbolic, stat)?
                else {
                    continue;
                };
                for remainder in &remainders {
                    let next = PathGlob::create_from_spec(&next_canonical, &next_symbolic, remainder)?;
                    paths.extend(resolve_one(vfs, next)?);
                }
            }
            Ok(paths)
        }
    }
}

/// A matched entry still has a remaining (possibly empty) path component to recurse
/// into. If it's a plain `Dir`, recursion continues from its own canonical path. If it's
/// a `Link`, the link is resolved and recursion continues from the canonical target,
/// while `matched_symbolic` is carried forward unchanged so the name the user wrote
/// stays visible in the result even though the directory physically lives elsewhere.
/// A link resolving to a non-directory, or a dangling link, yields `None` (no match),
/// per the resolver's failure policy — not an error.
fn resolve_dir_for_recursion(
    vfs: &dyn Vfs,
    matched_symbolic: PathBuf,
    stat: Stat,
) -> Result<Option<(PathBuf, PathBuf)>, GlobError> {
    match stat {
        Stat::Dir(canonical) => Ok(Some((matched_symbolic, canonical))),
        Stat::Link(link_path) => match resolve_link_target(vfs, &link_path)? {
            Some(target) if is_directory(vfs, &target)? => Ok(Some((matched_symbolic, target))),
            _ => Ok(None),
        },
        Stat::File(_) => Ok(None),
    }
}

/// Resolves the `PathStat` underlying a terminal (leaf) match: if it's a `Link`, follows
/// it to find the real `Stat` kind, while keeping `matched_symbolic` as the visible name.
/// A dangling link at a leaf position is dropped silently (an empty directory listing,
/// not an error), matching the directory-recursion policy above.
fn resolve_terminal(vfs: &dyn Vfs, matched_symbolic: PathBuf, stat: Stat) -> Result<PathStat, GlobError> {
    match stat {
        Stat::Dir(canonical) => Ok(PathStat::dir(matched_symbolic, canonical)),
        Stat::File(canonical) => Ok(PathStat::file(matched_symbolic, canonical)),
        Stat::Link(link_path) => match resolve_link_target(vfs, &link_path)? {
            Some(target) => match stat_kind(vfs, &target)? {
                Some(Stat::Dir(_)) => Ok(PathStat::dir(matched_symbolic, target)),
                Some(Stat::File(_)) => Ok(PathStat::file(matched_symbolic, target)),
                // A link to a link to ... eventually bottoms out in the recursive
                // `resolve_link_target` walk below; `stat_kind` never itself returns Link.
                _ => Ok(PathStat::link(matched_symbolic, link_path)),
            },
            None => Ok(PathStat::link(matched_symbolic, link_path)),
        },
    }
}

/// Follows `link_path` to its ultimate canonical target, recursively resolving chained
/// symlinks. Returns `None` for a dangling link (the chain bottoms out in a read that
/// cannot be `scandir`'d or found as a sibling entry).
fn resolve_link_target(vfs: &dyn Vfs, link_path: &Path) -> Result<Option<PathBuf>, GlobError> {
    let raw_target = vfs.readlink(link_path).map_err(|e| GlobError(format!("{link_path:?}: {e}")))?;
    let target = if raw_target.is_absolute() {
        raw_target
    } else {
        link_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(raw_target)
    };
    let normalized = normalize(&target);
    if exists(vfs, &normalized)? {
        Ok(Some(normalized))
    } else {
        Ok(None)
    }
}

fn exists(vfs: &dyn Vfs, path: &Path) -> Result<bool, GlobError> {
    if path == Path::new(".") {
        return Ok(true);
    }
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let basename = match path.file_name() {
        Some(name) => name,
        None => return Ok(true),
    };
    match scandir(vfs, parent) {
        Ok(stats) => Ok(stats.iter().any(|s| s.path().file_name() == Some(basename))),
        Err(_) => Ok(false),
    }
}

fn stat_kind(vfs: &dyn Vfs, path: &Path) -> Result<Option<Stat>, GlobError> {
    if path == Path::new(".") {
        return Ok(Some(Stat::Dir(path.to_path_buf())));
    }
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let basename = match path.file_name() {
        Some(name) => name,
        None => return Ok(None),
    };
    match scandir(vfs, parent) {
        Ok(stats) => Ok(stats.into_iter().find(|s| s.path().file_name() == Some(basename))),
        Err(_) => Ok(None),
    }
}

fn is_directory(vfs: &dyn Vfs, path: &Path) -> Result<bool, GlobError> {
    Ok(matches!(stat_kind(vfs, path)?, Some(Stat::Dir(_))) || path == Path::new("."))
}

/// Lists `dir` via the `Vfs`. A failure here is always a hard fault: every caller only
/// ever `scandir`s a directory whose existence a previous step already confirmed (the
/// build root, or a directory just matched by a wildcard/literal/link resolution).
fn scandir(vfs: &dyn Vfs, dir: &Path) -> Result<Vec<Stat>, GlobError> {
    vfs.scandir(dir).map_err(|e| GlobError(format!("failed to list {dir:?}: {e}")))
}

/// Joins a symbolic path (which may be the build-root sentinel `.`) with a single
/// component, without leaving a `./` prefix on the result — symbolic paths are
/// user-facing and `PathBuf::from(".").join("y")` would otherwise render as `./y`.
fn join_symbolic(symbolic_path: &Path, component: &std::ffi::OsStr) -> PathBuf {
    if symbolic_path == Path::new(".") {
        PathBuf::from(component)
    } else {
        symbolic_path.join(component)
    }
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        use std::path::Component;
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    if out.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::InMemoryVfs;

    fn symbolic_strs(paths: &[PathStat]) -> Vec<String> {
        paths.iter().map(|p| p.symbolic_path.to_string_lossy().into_owned()).collect()
    }

    #[test]
    fn double_star_matches_recursively_in_filename_order() {
        let mut vfs = InMemoryVfs::new();
        vfs.add_file("a/b.java");
        vfs.add_file("a/c/d.java");
        vfs.add_file("a/c/e.txt");

        let paths = resolve(&vfs, &["**/*.java".to_string()]).unwrap();
        assert_eq!(symbolic_strs(&paths.files), vec!["a/b.java", "a/c/d.java"]);
    }

    #[test]
    fn symlinked_directory_preserves_symbolic_name() {
        let mut vfs = InMemoryVfs::new();
        vfs.add_file("z/w/y/f.java");
        vfs.add_link("y", "z/w/y");

        let paths = resolve(&vfs, &["y/*.java".to_string()]).unwrap();
        assert_eq!(symbolic_strs(&paths.files), vec!["y/f.java"]);
    }

    #[test]
    fn dangling_link_yields_no_match_not_an_error() {
        let mut vfs = InMemoryVfs::new();
        vfs.add_link("broken", "does/not/exist");

        let paths = resolve(&vfs, &["broken/*.java".to_string()]).unwrap();
        assert!(paths.files.is_empty() && paths.dirs.is_empty());
    }

    #[test]
    fn literal_directory_segment_recurses_without_wildcard() {
        let mut vfs = InMemoryVfs::new();
        vfs.add_file("src/main/Foo.java");

        let paths = resolve(&vfs, &["src/main/Foo.java".to_string()]).unwrap();
        assert_eq!(symbolic_strs(&paths.files), vec!["src/main/Foo.java"]);
    }

    #[test]
    fn scandir_failure_on_confirmed_directory_is_a_hard_fault() {
        let mut vfs = InMemoryVfs::new();
        // "ghost" shows up in the root listing (so the resolver believes it exists and
        // recurses into it) but has no listing of its own, simulating a scandir race.
        vfs.add_phantom_dir(".", "ghost");

        let err = resolve(&vfs, &["ghost/*.txt".to_string()]).unwrap_err();
        assert!(err.0.contains("failed to list"));
    }
}
