use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use crate::device::movie::Movie;
use crate::device::pool::BufferPool;
use crate::foundation::error::{SenseHatError, SenseHatResult};

/// Normalize and validate a storage key.
///
/// The result uses `/` separators with `.` segments and a trailing `/` removed. Absolute keys,
/// parent traversals (`..`) and keys without a file name are rejected.
pub fn normalize_key(key: &str) -> SenseHatResult<String> {
    let s = key.replace('\\', "/");
    if s.starts_with('/') {
        return Err(SenseHatError::storage("storage keys must be relative"));
    }
    if s.is_empty() {
        return Err(SenseHatError::storage("storage key must be non-empty"));
    }

    let mut out = Vec::<&str>::new();
    for part in s.split('/') {
        if part.is_empty() || part == "." {
            continue;
        }
        if part == ".." {
            return Err(SenseHatError::storage("storage keys must not contain '..'"));
        }
        out.push(part);
    }

    if out.is_empty() {
        return Err(SenseHatError::storage("storage key must contain a file name"));
    }

    Ok(out.join("/"))
}

/// Read-only file store rooted at one directory.
#[derive(Clone, Debug)]
pub struct Storage {
    root: PathBuf,
}

impl Storage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `key` to a path under the root.
    pub fn resolve(&self, key: &str) -> SenseHatResult<PathBuf> {
        let norm = normalize_key(key)?;
        Ok(self.root.join(norm))
    }

    /// Open the file behind `key`, or `None` if there is no regular file there.
    pub fn open(&self, key: &str) -> SenseHatResult<Option<File>> {
        let path = self.resolve(key)?;
        if !path.is_file() {
            return Ok(None);
        }
        match File::open(&path) {
            Ok(f) => Ok(Some(f)),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "stored file unreadable");
                Ok(None)
            }
        }
    }

    /// Load the movie stored under `key` into a buffer from `pool`.
    pub fn load_movie(&self, key: &str, pool: &BufferPool) -> SenseHatResult<Option<Movie>> {
        let Some(file) = self.open(key)? else {
            return Ok(None);
        };
        let mut reader = BufReader::new(file);
        Movie::load_in(pool, &mut reader).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(name: &str) -> PathBuf {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let dir = std::env::temp_dir().join(format!(
            "sensehat_storage_{name}_{}_{nanos}",
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn normalize_key_cleans_separators_and_dots() {
        assert_eq!(normalize_key("a\\b\\c.bin").unwrap(), "a/b/c.bin");
        assert_eq!(normalize_key("./a//b/./c").unwrap(), "a/b/c");
        assert_eq!(normalize_key("scroll.bin/").unwrap(), "scroll.bin");
    }

    #[test]
    fn normalize_key_rejects_escapes() {
        for bad in ["/etc/passwd", "", "..", "a/../b", "./", "\\abs"] {
            assert!(
                matches!(normalize_key(bad), Err(SenseHatError::Storage(_))),
                "accepted {bad:?}"
            );
        }
    }

    #[test]
    fn missing_and_directory_keys_resolve_to_none() {
        let dir = temp_dir("missing");
        std::fs::create_dir_all(dir.join("sub")).unwrap();
        let store = Storage::new(&dir);
        assert!(store.open("nope.bin").unwrap().is_none());
        assert!(store.open("sub").unwrap().is_none());
        assert!(store.open("sub/").unwrap().is_none());
    }

    #[test]
    fn load_movie_reads_from_the_root() {
        let dir = temp_dir("load");
        let mut m = Movie::new(2, 1, 2).unwrap();
        m.set_wait(1, std::time::Duration::from_millis(9)).unwrap();
        m.save_to_path(dir.join("clips/two.bin")).unwrap();

        let store = Storage::new(&dir);
        let pool = BufferPool::default();
        let loaded = store.load_movie("clips/two.bin", &pool).unwrap().unwrap();
        assert_eq!(loaded, m);
    }

    #[test]
    fn malformed_movie_is_an_error_not_none() {
        let dir = temp_dir("malformed");
        std::fs::write(dir.join("bad.bin"), [1, 2, 3]).unwrap();
        let store = Storage::new(&dir);
        let err = store.load_movie("bad.bin", &BufferPool::default()).unwrap_err();
        assert!(matches!(err, SenseHatError::Malformed(_)));
    }
}
