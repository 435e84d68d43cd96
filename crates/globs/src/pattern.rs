// Licensed under the Apache License, Version 2.0.
//
// The three-shape `PathGlob` model: how a filespec, together with the canonical
// directory it's relative to, is classified into one of wildcard-in-basename,
// wildcard-in-dirname, or literal-dirname-with-remainder. Pinned against
// `examples/original_source/src/python/pants/engine/fs.py`'s
// `PathGlob.create_from_spec`, which this mirrors component-for-component.

use std::path::{Path, PathBuf};

const DOUBLE_STAR: &str = "**";

/// A single, compiled basename-matching pattern (`*`, `?`, character classes).
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct WildcardPattern(String);

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PatternError(pub String);

impl std::fmt::Display for PatternError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl WildcardPattern {
    pub fn compiled(&self) -> Result<glob::Pattern, PatternError> {
        glob::Pattern::new(&self.0).map_err(|e| PatternError(format!("invalid pattern {:?}: {e}", self.0)))
    }
}

/// An in-progress glob expansion: each variant carries enough state to take the next
/// recursive step without needing to re-derive it from the original filespec string.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum PathGlob {
    /// A wildcard in the basename component: `canonical_dir` is listed and filtered by
    /// `wildcard` directly, with no further recursion.
    Wildcard { canonical_dir: PathBuf, symbolic_path: PathBuf, wildcard: WildcardPattern },
    /// A wildcard in a directory name. `remainders` holds one pattern per matched
    /// subdirectory to recurse into; a `**` component yields two remainders (one
    /// consuming the `**`, one preserving it for further recursive matches).
    DirWildcard {
        canonical_dir: PathBuf,
        symbolic_path: PathBuf,
        wildcard: WildcardPattern,
        remainders: Vec<String>,
    },
    /// A literal (non-wildcard) directory segment with a remainder pattern. Simpler
    /// than `DirWildcard`: only the one named entry needs to be located, not every
    /// entry in the directory filtered.
    Literal { canonical_dir: PathBuf, symbolic_path: PathBuf, literal: PathBuf, remainder: String },
}

impl PathGlob {
    /// Classifies `filespec` (relative to `canonical_dir`, itself named `symbolic_path`
    /// for result-naming purposes) into one of the three shapes above.
    pub fn create_from_spec(
        canonical_dir: &Path,
        symbolic_path: &Path,
        filespec: &str,
    ) -> Result<PathGlob, PatternError> {
        let normed = normalize_with_dir_marker(filespec);
        let parts: Vec<&str> = normed.split('/').filter(|p| !p.is_empty()).collect();
        let parts: Vec<&str> = if parts.is_empty() { vec!["."] } else { parts };

        if parts[0].contains(DOUBLE_STAR) {
            if parts[0] != DOUBLE_STAR {
                return Err(PatternError(format!(
                    "illegal component {:?} in filespec under {symbolic_path:?}: {filespec:?} (`**` must stand alone)",
                    parts[0]
                )));
            }
            let consuming = parts[1..].join("/");
            let preserving = normed.clone();
            Ok(PathGlob::DirWildcard {
                canonical_dir: canonical_dir.to_path_buf(),
                symbolic_path: symbolic_path.to_path_buf(),
                wildcard: WildcardPattern("*".to_string()),
                remainders: vec![consuming, preserving],
            })
        } else if parts.len() == 1 {
            Ok(PathGlob::Wildcard {
                canonical_dir: canonical_dir.to_path_buf(),
                symbolic_path: symbolic_path.to_path_buf(),
                wildcard: WildcardPattern(parts[0].to_string()),
            })
        } else if !has_single_wildcard(parts[0]) {
            Ok(PathGlob::Literal {
                canonical_dir: canonical_dir.to_path_buf(),
                symbolic_path: symbolic_path.to_path_buf(),
                literal: PathBuf::from(parts[0]),
                remainder: parts[1..].join("/"),
            })
        } else {
            Ok(PathGlob::DirWildcard {
                canonical_dir: canonical_dir.to_path_buf(),
                symbolic_path: symbolic_path.to_path_buf(),
                wildcard: WildcardPattern(parts[0].to_string()),
                remainders: vec![parts[1..].join("/")],
            })
        }
    }
}

fn has_single_wildcard(component: &str) -> bool {
    component.contains('*') || component.contains('?') || component.contains('[')
}

/// `normpath`-like normalization that collapses `.`/`..`/repeated separators but leaves
/// a trailing `**` or wildcard component untouched; unlike the original's `normpath`,
/// this never needs to preserve a trailing-slash-dot marker since callers always pass an
/// explicit filespec string rather than a directory path.
fn normalize_with_dir_marker(filespec: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    for part in filespec.split('/') {
        match part {
            "" | "." => continue,
            ".." => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    if out.is_empty() {
        ".".to_string()
    } else {
        out.join("/")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_component_is_wildcard() {
        let g = PathGlob::create_from_spec(Path::new("."), Path::new("."), "*.java").unwrap();
        assert!(matches!(g, PathGlob::Wildcard { .. }));
    }

    #[test]
    fn literal_dirname_with_remainder() {
        let g = PathGlob::create_from_spec(Path::new("."), Path::new("."), "src/Foo.java").unwrap();
        match g {
            PathGlob::Literal { literal, remainder, .. } => {
                assert_eq!(literal, PathBuf::from("src"));
                assert_eq!(remainder, "Foo.java");
            }
            other => panic!("expected Literal, got {other:?}"),
        }
    }

    #[test]
    fn wildcard_dirname_one_remainder() {
        let g = PathGlob::create_from_spec(Path::new("."), Path::new("."), "*/Foo.java").unwrap();
        match g {
            PathGlob::DirWildcard { remainders, .. } => assert_eq!(remainders, vec!["Foo.java"]),
            other => panic!("expected DirWildcard, got {other:?}"),
        }
    }

    #[test]
    fn double_star_yields_two_remainders() {
        let g = PathGlob::create_from_spec(Path::new("."), Path::new("."), "**/*.java").unwrap();
        match g {
            PathGlob::DirWildcard { remainders, .. } => {
                assert_eq!(remainders, vec!["*.java".to_string(), "**/*.java".to_string()]);
            }
            other => panic!("expected DirWildcard, got {other:?}"),
        }
    }

    #[test]
    fn double_star_must_stand_alone() {
        let err = PathGlob::create_from_spec(Path::new("."), Path::new("."), "foo**/bar").unwrap_err();
        assert!(err.0.contains("illegal component"));
    }
}
