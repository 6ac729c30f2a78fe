//! 文档级排他锁与原子写
//!
//! FileLock 在 .study/locks/ 下的旁路锁文件上持有 fs2 排他锁，Drop 时释放；
//! atomic_write 先写同目录临时文件并 fsync，再 rename 覆盖，失败时原文件保持不变。

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::vault::VaultError;

/// 排他锁守卫：覆盖一次「读-改-写」，离开作用域即释放
#[derive(Debug)]
pub struct FileLock {
    file: File,
    lock_path: PathBuf,
}

impl FileLock {
    /// 阻塞直到拿到排他锁
    pub fn acquire(lock_path: &Path) -> Result<Self, VaultError> {
        let lock_err = |source| VaultError::Lock {
            path: lock_path.to_path_buf(),
            source,
        };
        if let Some(parent) = lock_path.parent() {
            fs::create_dir_all(parent).map_err(lock_err)?;
        }
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(lock_path)
            .map_err(lock_err)?;
        file.lock_exclusive().map_err(lock_err)?;
        tracing::trace!(lock = %lock_path.display(), "lock acquired");
        Ok(Self {
            file,
            lock_path: lock_path.to_path_buf(),
        })
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        // 锁文件本身保留，避免与等待者在 unlink 上竞争
        if let Err(e) = fs2::FileExt::unlock(&self.file) {
            tracing::warn!(lock = %self.lock_path.display(), error = %e, "unlock failed");
        }
    }
}

/// 原子写：.{name}.tmp → sync_all → rename
pub fn atomic_write(path: &Path, contents: &str) -> Result<(), VaultError> {
    let parent = path.parent().ok_or_else(|| {
        VaultError::write(
            path,
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "path has no parent directory"),
        )
    })?;
    fs::create_dir_all(parent).map_err(|e| VaultError::write(path, e))?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp_path = parent.join(format!(".{file_name}.tmp"));

    let result = (|| -> std::io::Result<()> {
        let mut tmp = File::create(&tmp_path)?;
        tmp.write_all(contents.as_bytes())?;
        tmp.sync_all()?;
        drop(tmp);
        fs::rename(&tmp_path, path)
    })();

    if let Err(e) = result {
        let _ = fs::remove_file(&tmp_path);
        return Err(VaultError::write(path, e));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atomic_write_replaces_content_and_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("note.md");
        atomic_write(&path, "first").unwrap();
        atomic_write(&path, "second").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "second");
        assert!(!dir.path().join(".note.md.tmp").exists());
    }

    #[test]
    fn failed_write_keeps_previous_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("note.md");
        atomic_write(&path, "original").unwrap();
        // 临时文件位置被目录占据，创建失败
        fs::create_dir(dir.path().join(".note.md.tmp")).unwrap();
        let err = atomic_write(&path, "clobbered").unwrap_err();
        assert!(matches!(err, VaultError::Write { .. }));
        assert_eq!(fs::read_to_string(&path).unwrap(), "original");
    }

    #[test]
    fn lock_is_released_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let lock_path = dir.path().join("locks").join("a.lock");
        {
            let _guard = FileLock::acquire(&lock_path).unwrap();
            let probe = OpenOptions::new().write(true).open(&lock_path).unwrap();
            assert!(probe.try_lock_exclusive().is_err());
        }
        let probe = OpenOptions::new().write(true).open(&lock_path).unwrap();
        assert!(probe.try_lock_exclusive().is_ok());
    }
}
