//! 输入接收服务 - 业务能力层
//!
//! 只负责"这个文件能不能转"，不关心转换流程

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::fs;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::IntakeError;
use crate::models::ConversionJob;

/// 输入接收服务
///
/// 检查后缀（不区分大小写）、空文件和大小上限
#[derive(Debug, Clone)]
pub struct Intake {
    accepted_suffix: String,
    max_bytes: usize,
}

impl Intake {
    pub fn new(accepted_suffix: impl Into<String>, max_bytes: usize) -> Self {
        Self {
            accepted_suffix: accepted_suffix.into(),
            max_bytes,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.source_suffix.clone(), config.max_input_bytes)
    }

    pub fn accepts_name(&self, name: &str) -> bool {
        name.to_lowercase().ends_with(&self.accepted_suffix.to_lowercase())
    }

    /// 校验内存中的文件并生成任务
    pub fn accept(&self, name: &str, bytes: Vec<u8>) -> Result<ConversionJob, IntakeError> {
        if !self.accepts_name(name) {
            return Err(IntakeError::UnsupportedSuffix {
                name: name.to_string(),
                expected: self.accepted_suffix.clone(),
            });
        }
        if bytes.is_empty() {
            return Err(IntakeError::Empty { name: name.to_string() });
        }
        if bytes.len() > self.max_bytes {
            return Err(IntakeError::TooLarge {
                name: name.to_string(),
                size: bytes.len(),
                limit: self.max_bytes,
            });
        }
        Ok(ConversionJob::new(bytes, name))
    }

    /// 从磁盘读取文件并生成任务
    pub async fn load_file(&self, path: &Path) -> Result<ConversionJob, IntakeError> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.to_string_lossy().to_string());

        // 先看后缀和大小，避免把不相干的大文件读进内存
        if !self.accepts_name(&name) {
            return Err(IntakeError::UnsupportedSuffix {
                name,
                expected: self.accepted_suffix.clone(),
            });
        }
        let metadata = fs::metadata(path).await.map_err(|source| IntakeError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        if metadata.len() > self.max_bytes as u64 {
            return Err(IntakeError::TooLarge {
                name,
                size: metadata.len() as usize,
                limit: self.max_bytes,
            });
        }

        let bytes = fs::read(path).await.map_err(|source| IntakeError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        debug!("已读取 {} ({} 字节)", name, bytes.len());
        self.accept(&name, bytes)
    }

    /// 扫描文件夹中所有符合后缀的文件（按文件名排序）
    pub async fn scan_folder(&self, folder_path: &str) -> Result<Vec<PathBuf>> {
        let folder = PathBuf::from(folder_path);
        if !folder.exists() {
            anyhow::bail!("文件夹不存在: {}", folder_path);
        }

        let mut files = Vec::new();
        let mut entries = fs::read_dir(&folder)
            .await
            .with_context(|| format!("无法读取文件夹: {}", folder_path))?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let matches = path
                .file_name()
                .map(|n| self.accepts_name(&n.to_string_lossy()))
                .unwrap_or(false);
            if matches && path.is_file() {
                info!("正在加载: {}", path.display());
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}
