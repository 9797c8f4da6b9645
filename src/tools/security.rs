use std::io;
use std::path::{Component, Path, PathBuf};

use thiserror::Error;

/// Maximum number of dangling symlinks followed while resolving one path
const MAX_SYMLINK_HOPS: usize = 40;

/// A path argument that resolves outside the working root
#[derive(Debug, Error, PartialEq, Eq)]
#[error("{} resolves outside {}", candidate.display(), root.display())]
pub struct BoundaryError {
    pub root: PathBuf,
    pub candidate: PathBuf,
}

/// Check whether `candidate` lies inside `root` (or is `root` itself)
///
/// Both paths are resolved on every call: symlinks followed, `..` collapsed,
/// relative paths anchored at the process working directory. Paths that do
/// not exist yet are resolved up to their deepest existing ancestor, so write
/// targets can be checked too. Any resolution failure counts as "outside".
pub fn is_contained(root: &Path, candidate: &Path) -> bool {
    let Ok(root) = resolve_path(root) else {
        return false;
    };
    let Ok(candidate) = resolve_path(candidate) else {
        return false;
    };

    // Component-wise: "/srv/root" is not an ancestor of "/srv/rootx"
    candidate.starts_with(&root)
}

/// Resolve a tool path argument against the working root and verify it stays inside
///
/// Absolute arguments are taken as-is (and then usually rejected).
pub fn resolve_within(root: &Path, relative: &str) -> Result<PathBuf, BoundaryError> {
    let joined = root.join(relative);
    let resolved = resolve_path(&joined).unwrap_or_else(|_| joined.clone());

    if is_contained(root, &resolved) {
        Ok(resolved)
    } else {
        Err(BoundaryError {
            root: root.to_path_buf(),
            candidate: resolved,
        })
    }
}

/// Lenient canonicalization
///
/// Every existing prefix is canonicalized, the missing remainder is
/// normalized lexically. Dangling symlinks are followed to their target.
pub fn resolve_path(path: &Path) -> io::Result<PathBuf> {
    resolve_with_hops(path, 0)
}

fn resolve_with_hops(path: &Path, hops: usize) -> io::Result<PathBuf> {
    if hops > MAX_SYMLINK_HOPS {
        return Err(io::Error::other(format!(
            "too many levels of symbolic links: {}",
            path.display()
        )));
    }

    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };

    let mut resolved = PathBuf::new();
    let mut existing = true;

    for component in absolute.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => resolved.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                resolved.pop();
            }
            Component::Normal(name) => {
                resolved.push(name);
                if !existing {
                    continue;
                }

                match resolved.canonicalize() {
                    Ok(canonical) => resolved = canonical,
                    Err(e)
                        if matches!(
                            e.kind(),
                            io::ErrorKind::NotFound | io::ErrorKind::NotADirectory
                        ) =>
                    {
                        existing = false;
                        if let Ok(target) = std::fs::read_link(&resolved) {
                            let target = match resolved.parent() {
                                Some(parent) if target.is_relative() => parent.join(target),
                                _ => target,
                            };
                            resolved = resolve_with_hops(&target, hops + 1)?;
                        }
                    }
                    Err(e) => return Err(e),
                }
            }
        }
    }

    Ok(resolved)
}
