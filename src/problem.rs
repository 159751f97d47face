//! Discovery of the problem files of a run.

use log::debug;
use serde::{Deserialize, Serialize};
use std::{
    fs, io,
    path::{Path, PathBuf},
};
use thiserror::Error;

/// One problem file, identified by its file name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Problem {
    path: PathBuf,
    key: String,
}

impl Problem {
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name, used to sort problems and to match them across reports.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }
}

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("problem directory `{}` does not exist", .0.display())]
    Missing(PathBuf),
    #[error("`{}` is not a directory", .0.display())]
    NotADirectory(PathBuf),
    #[error("cannot read problem directory `{}`: {source}", .path.display())]
    Unreadable { path: PathBuf, source: io::Error },
}

#[derive(Debug, Clone)]
pub struct ProblemSource {
    dir: PathBuf,
}

impl ProblemSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Lists the regular files of the directory, sorted by file name.
    ///
    /// Symbolic links are followed; links that do not resolve to a regular
    /// file are skipped like subdirectories are.
    pub fn discover(&self) -> Result<Vec<Problem>, DiscoveryError> {
        let unreadable = |source| DiscoveryError::Unreadable {
            path: self.dir.clone(),
            source,
        };
        let metadata = match fs::metadata(&self.dir) {
            Ok(metadata) => metadata,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(DiscoveryError::Missing(self.dir.clone()))
            }
            Err(err) => return Err(unreadable(err)),
        };
        if !metadata.is_dir() {
            return Err(DiscoveryError::NotADirectory(self.dir.clone()));
        }
        let dir = self.dir.canonicalize().map_err(unreadable)?;

        let mut files = Vec::new();
        for entry in fs::read_dir(&dir).map_err(unreadable)? {
            let entry = entry.map_err(unreadable)?;
            let path = entry.path();
            match fs::metadata(&path) {
                Ok(metadata) if metadata.is_file() => files.push((entry.file_name(), path)),
                Ok(_) => debug!("skipping `{}`, not a regular file", path.display()),
                Err(err) => debug!("skipping `{}`: {}", path.display(), err),
            }
        }
        files.sort_by(|(a, _), (b, _)| a.cmp(b));

        Ok(files
            .into_iter()
            .map(|(name, path)| Problem {
                key: name.to_string_lossy().into_owned(),
                path,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {

    use super::*;
    use std::fs::File;

    fn keys(problems: &[Problem]) -> Vec<&str> {
        problems.iter().map(Problem::key).collect()
    }

    #[test]
    fn test_sorted_regular_files() {
        let dir = tempfile::tempdir().unwrap();
        for name in &["c.smt2", "a.smt2", "B.smt2", "b.smt2", "a10.smt2", "a2.smt2"] {
            File::create(dir.path().join(name)).unwrap();
        }
        fs::create_dir(dir.path().join("nested")).unwrap();
        File::create(dir.path().join("nested").join("z.smt2")).unwrap();

        let problems = ProblemSource::new(dir.path()).discover().unwrap();
        assert_eq!(
            keys(&problems),
            vec!["B.smt2", "a.smt2", "a10.smt2", "a2.smt2", "b.smt2", "c.smt2"]
        );
        for problem in &problems {
            assert!(problem.path().is_absolute());
            assert!(problem.path().is_file());
        }
    }

    #[test]
    fn test_repeatable() {
        let dir = tempfile::tempdir().unwrap();
        for name in &["x", "m", "a"] {
            File::create(dir.path().join(name)).unwrap();
        }
        let source = ProblemSource::new(dir.path());
        assert_eq!(source.discover().unwrap(), source.discover().unwrap());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks() {
        let dir = tempfile::tempdir().unwrap();
        File::create(dir.path().join("real.smt2")).unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        std::os::unix::fs::symlink(dir.path().join("real.smt2"), dir.path().join("link.smt2"))
            .unwrap();
        std::os::unix::fs::symlink(dir.path().join("sub"), dir.path().join("dirlink")).unwrap();
        std::os::unix::fs::symlink(dir.path().join("gone"), dir.path().join("dangling")).unwrap();

        let problems = ProblemSource::new(dir.path()).discover().unwrap();
        assert_eq!(keys(&problems), vec!["link.smt2", "real.smt2"]);
    }

    #[test]
    fn test_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ProblemSource::new(dir.path()).discover().unwrap().is_empty());
    }

    #[test]
    fn test_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("does-not-exist");
        match ProblemSource::new(&missing).discover() {
            Err(DiscoveryError::Missing(path)) => assert_eq!(path, missing),
            other => panic!("unexpected discovery result {:?}", other),
        }
    }

    #[test]
    fn test_not_a_directory() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.smt2");
        File::create(&file).unwrap();
        assert!(matches!(
            ProblemSource::new(&file).discover(),
            Err(DiscoveryError::NotADirectory(_))
        ));
    }
}
