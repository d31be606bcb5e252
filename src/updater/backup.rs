//! 备份管理
//!
//! 每次变更前为目标文件创建内容寻址的备份。备份一经创建不可
//! 变更；恢复时必须通过SHA-256校验和验证，不匹配则拒绝恢复，
//! 现场文件保持原样。备份按保留策略清理（每文件最多N份）。

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::{RetouchError, RetouchResult};
use crate::utils::checksum;

use super::atomic_write;

/// 备份记录，创建后不可变
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupRecord {
    /// 时间 + 内容哈希前缀 + 熵，保证唯一
    pub id: String,
    pub original_file: String,
    pub backup_path: String,
    pub created_at: DateTime<Utc>,
    pub size: u64,
    /// 备份内容的SHA-256，恢复时必须匹配
    pub checksum: String,
}

/// 当前文件与某个备份之间的行级差异
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiffResult {
    pub backup_id: String,
    /// 当前文件有而备份没有的行
    pub added_lines: Vec<String>,
    /// 备份有而当前文件没有的行
    pub removed_lines: Vec<String>,
    pub unchanged_count: usize,
}

impl DiffResult {
    pub fn is_identical(&self) -> bool {
        self.added_lines.is_empty() && self.removed_lines.is_empty()
    }
}

/// 备份管理器
pub struct BackupManager {
    dir: PathBuf,
    max_per_file: usize,
}

impl BackupManager {
    pub fn new(dir: impl Into<PathBuf>, max_per_file: usize) -> Self {
        Self {
            dir: dir.into(),
            max_per_file,
        }
    }

    /// 为文件创建备份
    pub fn create(&self, file: &Path) -> RetouchResult<BackupRecord> {
        fs::create_dir_all(&self.dir)?;

        let data = fs::read(file)?;
        let sum = checksum(&data);
        let entropy = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.subsec_nanos())
            .unwrap_or(0);

        let created_at = Utc::now();
        let id = format!(
            "{}-{}-{:08x}",
            created_at.format("%Y%m%d%H%M%S"),
            &sum[..8],
            entropy
        );

        let backup_path = self.dir.join(format!("{}.bak", id));
        fs::write(&backup_path, &data)?;

        let record = BackupRecord {
            id: id.clone(),
            original_file: file.to_string_lossy().to_string(),
            backup_path: backup_path.to_string_lossy().to_string(),
            created_at,
            size: data.len() as u64,
            checksum: sum,
        };

        fs::write(self.meta_path(&id), serde_json::to_vec_pretty(&record)?)?;
        debug!(file = %record.original_file, backup = %id, "备份已创建");

        // 保留策略清理失败不影响本次备份
        if let Err(e) = self.cleanup(file) {
            warn!("备份清理失败: {}", e);
        }

        Ok(record)
    }

    /// 列出某文件的全部备份，新的在前
    pub fn list(&self, file: &Path) -> RetouchResult<Vec<BackupRecord>> {
        let original = file.to_string_lossy().to_string();
        let mut records = Vec::new();

        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(_) => return Ok(records),
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                match fs::read(&path).map_err(RetouchError::from).and_then(|raw| {
                    serde_json::from_slice::<BackupRecord>(&raw).map_err(RetouchError::from)
                }) {
                    Ok(record) if record.original_file == original => records.push(record),
                    Ok(_) => {}
                    Err(e) => warn!(path = %path.display(), "备份元数据损坏，跳过: {}", e),
                }
            }
        }

        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }

    /// 按ID加载备份记录
    pub fn load_record(&self, backup_id: &str) -> RetouchResult<BackupRecord> {
        let meta_path = self.meta_path(backup_id);
        if !meta_path.exists() {
            return Err(RetouchError::BackupNotFound(backup_id.to_string()));
        }

        let raw = fs::read(&meta_path)?;
        Ok(serde_json::from_slice(&raw)?)
    }

    /// 从备份恢复文件
    ///
    /// 校验和不匹配时返回`BackupCorrupted`，现场文件不被触碰。
    pub fn restore(&self, file: &Path, backup_id: &str) -> RetouchResult<()> {
        let record = self.load_record(backup_id)?;
        let data = fs::read(&record.backup_path)?;

        if checksum(&data) != record.checksum {
            return Err(RetouchError::BackupCorrupted(backup_id.to_string()));
        }

        atomic_write(file, &data)?;
        debug!(file = %file.display(), backup = %backup_id, "已从备份恢复");
        Ok(())
    }

    /// 当前文件内容与备份的行级差异
    pub fn diff(&self, file: &Path, backup_id: &str) -> RetouchResult<DiffResult> {
        let record = self.load_record(backup_id)?;
        let current = fs::read_to_string(file)?;
        let backed_up = fs::read_to_string(&record.backup_path)?;

        let mut backup_counts: std::collections::HashMap<&str, usize> =
            std::collections::HashMap::new();
        for line in backed_up.lines() {
            *backup_counts.entry(line).or_insert(0) += 1;
        }

        let mut added_lines = Vec::new();
        let mut unchanged_count = 0;

        for line in current.lines() {
            match backup_counts.get_mut(line) {
                Some(count) if *count > 0 => {
                    *count -= 1;
                    unchanged_count += 1;
                }
                _ => added_lines.push(line.to_string()),
            }
        }

        let removed_lines = backup_counts
            .into_iter()
            .flat_map(|(line, count)| std::iter::repeat(line.to_string()).take(count))
            .collect();

        Ok(DiffResult {
            backup_id: backup_id.to_string(),
            added_lines,
            removed_lines,
            unchanged_count,
        })
    }

    /// 按保留策略删除多余的旧备份
    pub fn cleanup(&self, file: &Path) -> RetouchResult<usize> {
        let records = self.list(file)?;
        let mut removed = 0;

        for record in records.iter().skip(self.max_per_file) {
            let _ = fs::remove_file(&record.backup_path);
            let _ = fs::remove_file(self.meta_path(&record.id));
            removed += 1;
        }

        Ok(removed)
    }

    fn meta_path(&self, backup_id: &str) -> PathBuf {
        self.dir.join(format!("{}.meta.json", backup_id))
    }
}
