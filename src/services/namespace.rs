//! Virtual namespace over the configured share roots.
//!
//! `/share<N>/<rest>` (N is 1-based) maps onto the N-th share root. Every
//! resolved path is canonical and must stay below the canonical share root;
//! anything else resolves to [`ResolvedPath::Rejected`].

use percent_encoding::percent_decode_str;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::RwLock;

/// Result of mapping a request path onto the filesystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedPath {
    /// The virtual share-picker page.
    Root,
    /// Malformed, out of range, or escaping its share.
    Rejected,
    /// A canonical path inside share `index` (0-based).
    Share { index: usize, path: PathBuf },
}

/// Ordered list of share roots.
pub struct ShareSet {
    roots: RwLock<Vec<PathBuf>>,
}

impl ShareSet {
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self {
            roots: RwLock::new(roots),
        }
    }

    /// Replace the whole share list (sharing restarted).
    pub fn replace(&self, roots: Vec<PathBuf>) {
        let mut guard = self.roots.write().unwrap_or_else(|e| e.into_inner());
        *guard = roots;
        tracing::info!("Share list replaced ({} folders)", guard.len());
    }

    pub fn snapshot(&self) -> Vec<PathBuf> {
        self.roots.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn len(&self) -> usize {
        self.roots.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Configured (non-canonical) root of share `index` (0-based).
    pub fn root(&self, index: usize) -> Option<PathBuf> {
        self.roots
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(index)
            .cloned()
    }

    /// Canonical root of share `index`, or `None` if it is gone or not configured.
    pub fn canonical_root(&self, index: usize) -> Option<PathBuf> {
        let root = self.root(index)?;
        match root.canonicalize() {
            Ok(canonical) => Some(canonical),
            Err(e) => {
                tracing::warn!("Share root {} is unavailable: {}", root.display(), e);
                None
            }
        }
    }

    /// Resolve a raw request path (query and fragment allowed).
    pub fn resolve(&self, request_path: &str) -> ResolvedPath {
        let path = strip_query(request_path);
        let decoded = percent_decode_str(path).decode_utf8_lossy();

        if decoded.is_empty() || decoded == "/" {
            return ResolvedPath::Root;
        }

        let Some((number, rest)) = split_share_prefix(&decoded) else {
            return ResolvedPath::Rejected;
        };

        // Share numbers are 1-based in URLs.
        match number.checked_sub(1) {
            Some(index) if index < self.len() => self.resolve_in_share(index, rest),
            _ => ResolvedPath::Rejected,
        }
    }

    /// Resolve an already-decoded path relative to share `index`.
    pub fn resolve_in_share(&self, index: usize, rest: &str) -> ResolvedPath {
        let Some(root) = self.canonical_root(index) else {
            return ResolvedPath::Rejected;
        };

        let mut joined = root.clone();
        for segment in rest.split(is_separator) {
            match segment {
                "" | "." => continue,
                ".." => joined.push(".."),
                name if is_plain_segment(name) => joined.push(name),
                _ => return ResolvedPath::Rejected,
            }
        }

        match canonicalize_lenient(&joined) {
            Ok(canonical) if canonical.starts_with(&root) => ResolvedPath::Share {
                index,
                path: canonical,
            },
            Ok(_) => ResolvedPath::Rejected,
            Err(e) => {
                tracing::debug!("Cannot canonicalize {}: {}", joined.display(), e);
                ResolvedPath::Rejected
            }
        }
    }

    /// Sandbox check for a path about to be created inside share `index`.
    pub fn contains(&self, index: usize, candidate: &Path) -> bool {
        let Some(root) = self.canonical_root(index) else {
            return false;
        };
        canonicalize_lenient(candidate)
            .map(|canonical| canonical.starts_with(&root))
            .unwrap_or(false)
    }

    /// Whether `path` (canonical) is the root of share `index`.
    pub fn is_share_root(&self, index: usize, path: &Path) -> bool {
        self.canonical_root(index)
            .map(|root| root == path)
            .unwrap_or(false)
    }
}

fn strip_query(path: &str) -> &str {
    let end = path.find(['?', '#']).unwrap_or(path.len());
    &path[..end]
}

/// Split `/share<N>` or `/share<N>/<rest>` into `(N, rest)`.
fn split_share_prefix(path: &str) -> Option<(usize, &str)> {
    let tail = path.strip_prefix("/share")?;
    let digits_end = tail
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(tail.len());
    if digits_end == 0 {
        return None;
    }

    let number = tail[..digits_end].parse::<usize>().ok()?;
    let rest = &tail[digits_end..];
    if rest.is_empty() {
        return Some((number, ""));
    }
    rest.strip_prefix('/').map(|rest| (number, rest))
}

fn is_separator(c: char) -> bool {
    c == '/' || (cfg!(windows) && c == '\\')
}

/// A segment that joins as exactly one normal component (no drive prefix,
/// no root, no NUL).
fn is_plain_segment(segment: &str) -> bool {
    if segment.contains('\0') {
        return false;
    }
    let mut components = Path::new(segment).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

/// Canonicalize `path` one component at a time, following symlinks as the OS
/// does, and append components that do not exist yet lexically.
///
/// Every existing component is resolved against the real filesystem, so a
/// `..` that walks back out of the missing tail lands on a canonical
/// directory again and the next symlink is still followed. A dangling
/// symlink is an error.
pub fn canonicalize_lenient(path: &Path) -> io::Result<PathBuf> {
    let mut components = path.components().peekable();

    let mut base = PathBuf::new();
    while let Some(component @ (Component::Prefix(_) | Component::RootDir)) =
        components.peek().copied()
    {
        base.push(component);
        components.next();
    }
    let mut base = if base.as_os_str().is_empty() {
        Path::new(".").canonicalize()?
    } else {
        base.canonicalize()?
    };

    // Components pushed onto `base` that do not exist on disk.
    let mut missing = 0usize;

    for component in components {
        match component {
            Component::CurDir | Component::Prefix(_) | Component::RootDir => {}
            Component::ParentDir => {
                base.pop();
                missing = missing.saturating_sub(1);
            }
            Component::Normal(part) if missing > 0 => {
                base.push(part);
                missing += 1;
            }
            Component::Normal(part) => {
                let candidate = base.join(part);
                match candidate.canonicalize() {
                    Ok(canonical) => base = canonical,
                    Err(e)
                        if matches!(
                            e.kind(),
                            io::ErrorKind::NotFound | io::ErrorKind::NotADirectory
                        ) =>
                    {
                        if std::fs::symlink_metadata(&candidate)
                            .is_ok_and(|meta| meta.file_type().is_symlink())
                        {
                            return Err(io::Error::new(
                                io::ErrorKind::InvalidInput,
                                format!("dangling symlink {}", candidate.display()),
                            ));
                        }
                        base = candidate;
                        missing = 1;
                    }
                    Err(e) => return Err(e),
                }
            }
        }
    }

    Ok(base)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn share_set() -> (ShareSet, TempDir, TempDir) {
        let a = TempDir::new().unwrap();
        let b = TempDir::new().unwrap();
        std::fs::create_dir(a.path().join("sub")).unwrap();
        std::fs::write(a.path().join("sub").join("file.txt"), b"hi").unwrap();
        std::fs::write(b.path().join("other.txt"), b"b").unwrap();
        let set = ShareSet::new(vec![a.path().to_path_buf(), b.path().to_path_buf()]);
        (set, a, b)
    }

    #[test]
    fn test_root_paths() {
        let (set, _a, _b) = share_set();
        assert_eq!(set.resolve("/"), ResolvedPath::Root);
        assert_eq!(set.resolve(""), ResolvedPath::Root);
        assert_eq!(set.resolve("/?x=1"), ResolvedPath::Root);
    }

    #[test]
    fn test_resolve_file_in_share() {
        let (set, a, _b) = share_set();
        let expected = a.path().canonicalize().unwrap().join("sub").join("file.txt");
        assert_eq!(
            set.resolve("/share1/sub/file.txt"),
            ResolvedPath::Share {
                index: 0,
                path: expected
            }
        );
    }

    #[test]
    fn test_second_share_and_query() {
        let (set, _a, b) = share_set();
        let expected = b.path().canonicalize().unwrap().join("other.txt");
        assert_eq!(
            set.resolve("/share2/other.txt?download=1#top"),
            ResolvedPath::Share {
                index: 1,
                path: expected
            }
        );
    }

    #[test]
    fn test_share_without_trailing_slash_is_root_of_share() {
        let (set, a, _b) = share_set();
        assert_eq!(
            set.resolve("/share1"),
            ResolvedPath::Share {
                index: 0,
                path: a.path().canonicalize().unwrap()
            }
        );
    }

    #[test]
    fn test_out_of_range_indices() {
        let (set, _a, _b) = share_set();
        assert_eq!(set.resolve("/share0/"), ResolvedPath::Rejected);
        assert_eq!(set.resolve("/share3/"), ResolvedPath::Rejected);
        assert_eq!(
            set.resolve("/share99999999999999999999999/"),
            ResolvedPath::Rejected
        );
    }

    #[test]
    fn test_prefix_aliasing_rejected() {
        let (set, _a, _b) = share_set();
        assert_eq!(set.resolve("/share1x/"), ResolvedPath::Rejected);
        assert_eq!(set.resolve("/share/"), ResolvedPath::Rejected);
        assert_eq!(set.resolve("/shares1/"), ResolvedPath::Rejected);
        assert_eq!(set.resolve("/other"), ResolvedPath::Rejected);
    }

    #[test]
    fn test_traversal_rejected() {
        let (set, _a, _b) = share_set();
        assert_eq!(set.resolve("/share1/../"), ResolvedPath::Rejected);
        assert_eq!(set.resolve("/share1/sub/../../etc"), ResolvedPath::Rejected);
        assert_eq!(set.resolve("/share1/%2e%2e/"), ResolvedPath::Rejected);
        assert_eq!(set.resolve("/share1/%2E%2e/%2E%2E/x"), ResolvedPath::Rejected);
        assert_eq!(
            set.resolve("/share1/missing/../../../x"),
            ResolvedPath::Rejected
        );
    }

    #[test]
    fn test_inner_parent_segments_stay_inside() {
        let (set, a, _b) = share_set();
        assert_eq!(
            set.resolve("/share1/sub/../sub/file.txt"),
            ResolvedPath::Share {
                index: 0,
                path: a.path().canonicalize().unwrap().join("sub").join("file.txt")
            }
        );
    }

    #[test]
    fn test_missing_target_still_resolves() {
        let (set, a, _b) = share_set();
        assert_eq!(
            set.resolve("/share1/nope/deeper.txt"),
            ResolvedPath::Share {
                index: 0,
                path: a.path().canonicalize().unwrap().join("nope").join("deeper.txt")
            }
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_escape_rejected() {
        let (set, a, b) = share_set();
        std::os::unix::fs::symlink(b.path(), a.path().join("escape")).unwrap();
        assert_eq!(set.resolve("/share1/escape/other.txt"), ResolvedPath::Rejected);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_after_missing_parent_rejected() {
        let (set, a, b) = share_set();
        std::os::unix::fs::symlink(b.path(), a.path().join("escape")).unwrap();
        assert_eq!(
            set.resolve("/share1/missing/../escape/other.txt"),
            ResolvedPath::Rejected
        );
        assert_eq!(
            set.resolve("/share1/a/b/../../escape/"),
            ResolvedPath::Rejected
        );
        assert_eq!(
            set.resolve("/share1/missing/%2E%2E/escape/other.txt"),
            ResolvedPath::Rejected
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_inside_share_followed() {
        let (set, a, _b) = share_set();
        std::os::unix::fs::symlink(a.path().join("sub"), a.path().join("alias")).unwrap();
        let expected = a.path().canonicalize().unwrap().join("sub").join("file.txt");
        assert_eq!(
            set.resolve("/share1/missing/../alias/file.txt"),
            ResolvedPath::Share {
                index: 0,
                path: expected
            }
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_dangling_symlink_rejected() {
        let (set, a, _b) = share_set();
        std::os::unix::fs::symlink("/nonexistent/target/dir", a.path().join("dangling")).unwrap();
        assert_eq!(set.resolve("/share1/dangling"), ResolvedPath::Rejected);
        assert_eq!(set.resolve("/share1/dangling/x.txt"), ResolvedPath::Rejected);
    }

    #[test]
    fn test_canonicalize_lenient_missing_tail() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().canonicalize().unwrap();
        std::fs::create_dir(root.join("real")).unwrap();

        assert_eq!(
            canonicalize_lenient(&root.join("real/./new/deeper.txt")).unwrap(),
            root.join("real").join("new").join("deeper.txt")
        );
        assert_eq!(
            canonicalize_lenient(&root.join("a/b/../../real")).unwrap(),
            root.join("real")
        );
    }

    #[test]
    fn test_vanished_share_root_rejected() {
        let (set, a, _b) = share_set();
        let path = a.path().to_path_buf();
        drop(a);
        assert!(!path.exists());
        assert_eq!(set.resolve("/share1/"), ResolvedPath::Rejected);
    }

    #[test]
    fn test_contains_and_share_root() {
        let (set, a, b) = share_set();
        let root = a.path().canonicalize().unwrap();
        assert!(set.contains(0, &root.join("new.txt")));
        assert!(!set.contains(0, &b.path().join("other.txt")));
        assert!(set.is_share_root(0, &root));
        assert!(!set.is_share_root(0, &root.join("sub")));
    }

    #[test]
    fn test_replace() {
        let (set, a, _b) = share_set();
        set.replace(vec![a.path().to_path_buf()]);
        assert_eq!(set.len(), 1);
        assert_eq!(set.resolve("/share2/"), ResolvedPath::Rejected);
    }
}
