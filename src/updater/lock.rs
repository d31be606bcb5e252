//! 文件锁注册表
//!
//! 按文件路径哈希键入的进程内具名锁。锁被占用时立即失败而不是
//! 排队等待，避免无界阻塞——调用方自行退避重试。锁的释放走
//! guard的Drop路径，任何分支（包括panic展开）都会释放。

use std::path::Path;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::core::{RetouchError, RetouchResult};
use crate::utils::content_hash;

/// 进程内文件锁注册表
#[derive(Default)]
pub struct FileLockRegistry {
    locks: DashMap<String, ()>,
}

impl FileLockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取指定文件的排他锁
    ///
    /// 已被持有时返回`LockContention`，不排队。
    pub fn acquire(&self, path: &Path) -> RetouchResult<FileLockGuard<'_>> {
        let key = content_hash(&path.to_string_lossy());

        match self.locks.entry(key.clone()) {
            Entry::Occupied(_) => Err(RetouchError::LockContention(
                path.display().to_string(),
            )),
            Entry::Vacant(vacant) => {
                vacant.insert(());
                Ok(FileLockGuard {
                    locks: &self.locks,
                    key,
                })
            }
        }
    }

    /// 当前持有的锁数量（诊断用）
    pub fn held_count(&self) -> usize {
        self.locks.len()
    }
}

/// 锁guard，Drop时释放
pub struct FileLockGuard<'a> {
    locks: &'a DashMap<String, ()>,
    key: String,
}

impl Drop for FileLockGuard<'_> {
    fn drop(&mut self) {
        self.locks.remove(&self.key);
    }
}
