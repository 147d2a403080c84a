use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::errors::{ErrorKind, FunitError};

/// Finds test definition files on disk.
///
/// Paths named on the command line are taken as given; directories are
/// walked recursively and every file ending in the template extension is
/// collected.
#[derive(Debug)]
pub struct TestDiscoverer<'a> {
    template_ext: &'a str,
}

impl<'a> TestDiscoverer<'a> {
    pub fn new(template_ext: &'a str) -> Self {
        Self { template_ext }
    }

    // =====================
    // Public API
    // =====================

    /// Expands `paths` into the list of test files to process.
    ///
    /// Explicit files keep their command-line order; the files found under
    /// each directory are sorted so runs are deterministic.
    pub fn expand(&self, paths: &[PathBuf]) -> Result<Vec<PathBuf>, FunitError> {
        let mut files = Vec::new();
        for path in paths {
            if path.is_dir() {
                files.extend(self.discover_test_files(path)?);
            } else {
                files.push(path.clone());
            }
        }
        Ok(files)
    }

    /// Recursively scans `root` for test files, sorted.
    pub fn discover_test_files(&self, root: &Path) -> Result<Vec<PathBuf>, FunitError> {
        let mut files = Vec::new();
        for entry in WalkDir::new(root) {
            let entry = entry.map_err(|e| {
                let path = e.path().unwrap_or(root).display().to_string();
                FunitError::unspanned(
                    ErrorKind::Io {
                        operation: "walking".into(),
                        path,
                        message: e.to_string(),
                    },
                    "discovery",
                )
            })?;

            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            if !self.is_test_file(path) {
                continue;
            }

            files.push(path.to_path_buf());
        }
        files.sort();
        tracing::debug!(root = %root.display(), count = files.len(), "discovered test files");
        Ok(files)
    }

    pub fn is_test_file(&self, path: &Path) -> bool {
        path.file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.len() > self.template_ext.len() && name.ends_with(self.template_ext))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn walks_directories_in_sorted_order() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("nested");
        fs::create_dir(&nested).unwrap();
        for name in ["b.fun", "a.fun", "notes.txt"] {
            fs::write(dir.path().join(name), "").unwrap();
        }
        fs::write(nested.join("c.fun"), "").unwrap();

        let files = TestDiscoverer::new(".fun")
            .discover_test_files(dir.path())
            .unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.strip_prefix(dir.path()).unwrap().to_path_buf())
            .collect();
        assert_eq!(
            names,
            vec![
                PathBuf::from("a.fun"),
                PathBuf::from("b.fun"),
                PathBuf::from("nested/c.fun"),
            ]
        );
    }

    #[test]
    fn explicit_files_are_kept() {
        let discoverer = TestDiscoverer::new(".fun");
        let files = discoverer
            .expand(&[PathBuf::from("does/not/exist.pf")])
            .unwrap();
        assert_eq!(files, vec![PathBuf::from("does/not/exist.pf")]);
    }

    #[test]
    fn bare_extension_is_not_a_test_file() {
        let discoverer = TestDiscoverer::new(".fun");
        assert!(!discoverer.is_test_file(Path::new(".fun")));
        assert!(discoverer.is_test_file(Path::new("dir/x.fun")));
    }
}
