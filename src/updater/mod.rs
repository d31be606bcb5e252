//! # 文件更新引擎
//!
//! 对模板/HTML文件的事务化变更：锁 → 备份 → 策略变更 → 校验 →
//! 原子写入，任一环节失败时从备份回滚。批量更新共享一把锁和
//! 一份备份，任一操作失败则整批回滚。
//!
//! # 模块组织
//!
//! - `lock` - 进程内文件锁注册表
//! - `backup` - 校验和备份与恢复
//! - `strategy` - 按内容类型分派的更新策略

pub mod backup;
pub mod lock;
pub mod strategy;

use std::fs;
use std::io::Write;
use std::path::Path;

use tracing::{debug, error, info, warn};

use crate::core::{RetouchError, RetouchResult, UpdaterConfig};

pub use backup::{BackupManager, BackupRecord, DiffResult};
pub use lock::{FileLockGuard, FileLockRegistry};
pub use strategy::{
    default_strategies, DomStrategy, PlainTextStrategy, TemplateStrategy, UpdateOperation,
    UpdateStrategy, ValidationReport,
};

/// 原子写入文件
///
/// 写入同目录临时文件，回读比对字节后rename到目标路径。
/// 回读不一致返回`AtomicWriteVerification`，目标文件不受影响。
pub fn atomic_write(path: &Path, data: &[u8]) -> RetouchResult<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = tempfile::NamedTempFile::new_in(parent)?;

    temp.write_all(data)?;
    temp.flush()?;

    let written = fs::read(temp.path())?;
    if written != data {
        return Err(RetouchError::AtomicWriteVerification(
            path.display().to_string(),
        ));
    }

    temp.persist(path).map_err(|e| RetouchError::Io(e.error))?;
    Ok(())
}

/// 文件更新器
///
/// 持有锁注册表、备份管理器和策略链。同一个实例可以跨线程
/// 共享（策略无状态，锁表并发安全）。
pub struct FileUpdater {
    config: UpdaterConfig,
    locks: FileLockRegistry,
    backups: BackupManager,
    strategies: Vec<Box<dyn UpdateStrategy>>,
}

impl FileUpdater {
    pub fn new(config: UpdaterConfig) -> Self {
        let backups = BackupManager::new(config.backup_dir.clone(), config.max_backups_per_file);

        Self {
            config,
            locks: FileLockRegistry::new(),
            backups,
            strategies: default_strategies(),
        }
    }

    /// 替换文件中首次出现的内容
    ///
    /// 返回`true`表示文件被改写，`false`表示内容未变化（无写入）。
    pub fn update_content(&self, file: &Path, old: &str, new: &str) -> RetouchResult<bool> {
        self.transaction(
            file,
            &[UpdateOperation::ReplaceContent {
                old: old.to_string(),
                new: new.to_string(),
            }],
        )
    }

    /// 替换指定行（1起始）
    pub fn update_line(&self, file: &Path, line: usize, new: &str) -> RetouchResult<bool> {
        self.transaction(
            file,
            &[UpdateOperation::ReplaceLine {
                line,
                new: new.to_string(),
            }],
        )
    }

    /// 替换选择器命中元素的内部HTML
    pub fn update_selector(
        &self,
        file: &Path,
        selector: &str,
        new_html: &str,
    ) -> RetouchResult<bool> {
        self.transaction(
            file,
            &[UpdateOperation::ReplaceSelector {
                selector: selector.to_string(),
                new_html: new_html.to_string(),
            }],
        )
    }

    /// 设置选择器命中元素的属性
    pub fn update_attribute(
        &self,
        file: &Path,
        selector: &str,
        attribute: &str,
        value: &str,
    ) -> RetouchResult<bool> {
        self.transaction(
            file,
            &[UpdateOperation::SetAttribute {
                selector: selector.to_string(),
                attribute: attribute.to_string(),
                value: value.to_string(),
            }],
        )
    }

    /// 批量更新，整批原子：任一操作失败则全部回滚
    pub fn batch_update(
        &self,
        file: &Path,
        operations: &[UpdateOperation],
    ) -> RetouchResult<bool> {
        self.transaction(file, operations)
    }

    /// 从JSON操作描述批量更新
    ///
    /// 描述解析失败（含未知`type`）时整批拒绝，文件不被触碰。
    pub fn batch_update_descriptors(
        &self,
        file: &Path,
        descriptors: &[serde_json::Value],
    ) -> RetouchResult<bool> {
        let operations = descriptors
            .iter()
            .map(UpdateOperation::from_descriptor)
            .collect::<RetouchResult<Vec<_>>>()?;
        self.transaction(file, &operations)
    }

    /// 手动创建备份
    pub fn create_backup(&self, file: &Path) -> RetouchResult<BackupRecord> {
        self.backups.create(file)
    }

    /// 列出文件的备份，新的在前
    pub fn list_backups(&self, file: &Path) -> RetouchResult<Vec<BackupRecord>> {
        self.backups.list(file)
    }

    /// 从备份恢复文件
    pub fn restore(&self, file: &Path, backup_id: &str) -> RetouchResult<()> {
        let _guard = self.locks.acquire(file)?;
        self.backups.restore(file, backup_id)
    }

    /// 当前文件与备份的行级差异
    pub fn diff(&self, file: &Path, backup_id: &str) -> RetouchResult<DiffResult> {
        self.backups.diff(file, backup_id)
    }

    /// 锁注册表（诊断与测试用）
    pub fn locks(&self) -> &FileLockRegistry {
        &self.locks
    }

    /// 事务化执行一组操作
    ///
    /// 所有操作在内存中串联执行，最后一次性落盘。开启
    /// `rollback_on_failure`且存在备份时，落盘后的失败会回滚。
    fn transaction(&self, file: &Path, operations: &[UpdateOperation]) -> RetouchResult<bool> {
        if operations.is_empty() {
            return Ok(false);
        }

        let _guard = self.locks.acquire(file)?;
        let original = fs::read_to_string(file)?;

        let backup = if self.config.auto_backup {
            Some(self.backups.create(file)?)
        } else {
            None
        };

        match self.mutate_validate_commit(file, &original, operations) {
            Ok(changed) => Ok(changed),
            Err(e) => {
                if self.config.rollback_on_failure {
                    if let Some(record) = &backup {
                        match self.backups.restore(file, &record.id) {
                            Ok(()) => warn!(
                                file = %file.display(),
                                backup = %record.id,
                                "变更失败，已回滚"
                            ),
                            // 回滚失败时保留原始错误，恢复错误只记录
                            Err(restore_err) => error!(
                                file = %file.display(),
                                "变更失败且回滚失败: {}",
                                restore_err
                            ),
                        }
                    }
                }
                Err(e)
            }
        }
    }

    fn mutate_validate_commit(
        &self,
        file: &Path,
        original: &str,
        operations: &[UpdateOperation],
    ) -> RetouchResult<bool> {
        let mut content = original.to_string();
        let mut last_strategy = None;

        for operation in operations {
            let strategy = self.select_strategy(&content, operation)?;
            debug!(
                file = %file.display(),
                strategy = strategy.name(),
                operation = operation.kind(),
                "执行更新操作"
            );
            content = strategy.apply(&content, operation)?;
            last_strategy = Some(strategy);
        }

        if content == original {
            debug!(file = %file.display(), "内容未变化，跳过写入");
            return Ok(false);
        }

        if let Some(strategy) = last_strategy {
            let report = strategy.validate(&content);
            for warning in &report.warnings {
                warn!(file = %file.display(), "校验警告: {}", warning);
            }
            if !report.valid {
                return Err(RetouchError::Validation(report.errors.join("; ")));
            }
        }

        atomic_write(file, content.as_bytes())?;
        info!(
            file = %file.display(),
            operations = operations.len(),
            bytes = content.len(),
            "文件更新完成"
        );
        Ok(true)
    }

    fn select_strategy(
        &self,
        content: &str,
        operation: &UpdateOperation,
    ) -> RetouchResult<&dyn UpdateStrategy> {
        self.strategies
            .iter()
            .find(|s| s.can_handle(content, operation))
            .map(|s| s.as_ref())
            .ok_or_else(|| RetouchError::UnknownStrategy(operation.kind().to_string()))
    }
}

impl Default for FileUpdater {
    fn default() -> Self {
        Self::new(UpdaterConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_atomic_write_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("out.html");

        atomic_write(&path, b"<p>hello</p>").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"<p>hello</p>");

        // 覆盖已有文件
        atomic_write(&path, b"<p>bye</p>").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"<p>bye</p>");
    }

    #[test]
    fn test_unchanged_content_skips_write() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("page.html");
        fs::write(&file, "<p>same same</p>").unwrap();

        let updater = updater_in(tmp.path());
        let changed = updater
            .update_content(&file, "same same", "same same")
            .unwrap();

        assert!(!changed);
    }

    #[test]
    fn test_empty_batch_is_noop() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("page.html");
        fs::write(&file, "<p>x</p>").unwrap();

        let updater = updater_in(tmp.path());
        assert!(!updater.batch_update(&file, &[]).unwrap());
    }

    #[test]
    fn test_missing_file_errors() {
        let tmp = tempfile::tempdir().unwrap();
        let updater = updater_in(tmp.path());
        let result = updater.update_content(&tmp.path().join("absent.html"), "a", "b");
        assert!(matches!(result, Err(RetouchError::Io(_))));
    }

    fn updater_in(dir: &Path) -> FileUpdater {
        FileUpdater::new(UpdaterConfig {
            backup_dir: dir.join("backups").to_string_lossy().to_string(),
            ..UpdaterConfig::default()
        })
    }
}
