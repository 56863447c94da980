//! Reboot mark persistence

use std::fs;
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use crate::error::KoletError;

/// File-backed store for the reboot mark.
///
/// The mark is opaque and round-trips byte for byte. Writes go through a
/// sibling `.tmp` file and a rename, so a reader sees either the old mark or
/// the new one. The last write wins.
#[derive(Debug, Clone)]
pub struct MarkStore {
    path: PathBuf,
}

impl MarkStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Persist `mark`, replacing any previous one.
    pub fn write(&self, mark: &str) -> Result<(), KoletError> {
        let tmp_path = self.path.with_extension("tmp");

        {
            let mut tmp_file =
                fs::File::create(&tmp_path).map_err(|e| KoletError::persistence(&tmp_path, e))?;
            tmp_file
                .write_all(mark.as_bytes())
                .map_err(|e| KoletError::persistence(&tmp_path, e))?;
            tmp_file
                .set_permissions(fs::Permissions::from_mode(0o644))
                .map_err(|e| KoletError::persistence(&tmp_path, e))?;
            tmp_file
                .sync_all()
                .map_err(|e| KoletError::persistence(&tmp_path, e))?;
        }

        fs::rename(&tmp_path, &self.path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            KoletError::persistence(&self.path, e)
        })
    }

    /// Read the stored mark.
    ///
    /// Bytes that are not valid UTF-8 are replaced with U+FFFD.
    pub fn read(&self) -> Result<String, KoletError> {
        let bytes = fs::read(&self.path).map_err(|e| KoletError::persistence(&self.path, e))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> MarkStore {
        MarkStore::new(dir.path().join("kolet-reboot"))
    }

    #[test]
    fn round_trips_marks_exactly() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let marks = [
            "",
            "foo",
            "mark with spaces\nand a newline\n",
            r#"{"reboot":"nested"} "quoted" \back\slash"#,
            "m\u{e4}rk \u{1f680} \u{65e5}\u{672c}",
            "\t\u{0}\u{1b}[0m",
        ];
        for mark in marks {
            store.write(mark).unwrap();
            assert_eq!(store.read().unwrap(), mark);
        }
    }

    #[test]
    fn last_write_wins() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.write("first").unwrap();
        store.write("second").unwrap();
        assert_eq!(store.read().unwrap(), "second");
        assert!(!dir.path().join("kolet-reboot.tmp").exists());
    }

    #[test]
    fn non_utf8_mark_reads_lossily() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        fs::write(store.path(), b"cycle-\xff\xfe-2").unwrap();
        assert_eq!(store.read().unwrap(), "cycle-\u{fffd}\u{fffd}-2");
    }

    #[test]
    fn mark_is_world_readable() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.write("x").unwrap();
        let mode = fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o644);
    }

    #[test]
    fn missing_mark_is_a_persistence_error() {
        let dir = TempDir::new().unwrap();
        let err = store(&dir).read().unwrap_err();
        assert!(matches!(err, KoletError::Persistence { .. }));
        assert!(!err.is_usage());
    }

    #[test]
    fn unwritable_location_is_a_persistence_error() {
        let dir = TempDir::new().unwrap();
        let store = MarkStore::new(dir.path().join("missing").join("kolet-reboot"));
        assert!(matches!(
            store.write("x").unwrap_err(),
            KoletError::Persistence { .. }
        ));
    }
}
