
use std::fs;
use std::path::{Path, PathBuf};

/// What callers do with files left over from an earlier run.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum DumpPolicy {
    /// Never delete anything; indexed names restart at `_001` and overwrite.
    #[default]
    Accumulate,
    /// Call [`Dumper::clear`] for a name before its first write.
    ClearFirst,
}

/// Writes named artifacts of one extension under one directory.
///
/// Writing never deletes anything; stale files go only through an explicit [`Dumper::clear`].
#[derive(Debug)]
pub struct Dumper {
    dir: PathBuf,
    extension: String,
    counter: Option<u32>,
}

impl Dumper {
    pub fn new<P: AsRef<Path>>(dir: P, extension: &str, indexed: bool) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            extension: extension.trim().trim_start_matches('.').to_string(),
            counter: indexed.then_some(1),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Writes `content` as `{name}.{ext}`, or `{name}_{counter:03}.{ext}` when indexed,
    /// and returns the path written.
    pub fn dump<C: AsRef<[u8]>>(&mut self, name: &str, content: C) -> std::io::Result<PathBuf> {
        if !self.dir.exists() {
            fs::create_dir_all(&self.dir)?;
        }

        let file_name = match self.counter.as_mut() {
            Some(counter) => {
                let file_name = format!("{}_{:03}.{}", name, counter, self.extension);
                *counter += 1;
                file_name
            },
            None => format!("{}.{}", name, self.extension),
        };

        let path = self.dir.join(file_name);
        fs::write(&path, content)?;
        log::debug!("Dumped {}", path.display());
        Ok(path)
    }

    /// Removes `{name}.{ext}` and `{name}_NNN.{ext}` from the directory, returning how many went.
    pub fn clear(&self, name: &str) -> std::io::Result<usize> {
        if !self.dir.is_dir() {
            return Ok(0);
        }

        let mut removed = 0;
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            if self.matches(name, file_name) && entry.file_type()?.is_file() {
                log::debug!("Removing stale dump {}", entry.path().display());
                fs::remove_file(entry.path())?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn matches(&self, name: &str, file_name: &str) -> bool {
        let Some(stem) = file_name
            .strip_suffix(self.extension.as_str())
            .and_then(|s| s.strip_suffix('.'))
        else {
            return false;
        };
        match stem.strip_prefix(name) {
            Some("") => true,
            Some(rest) => rest
                .strip_prefix('_')
                .is_some_and(|index| !index.is_empty() && index.bytes().all(|b| b.is_ascii_digit())),
            None => false,
        }
    }
}
