//! 输出写入服务 - 业务能力层
//!
//! 只负责"落盘"能力：写转换结果、追加报告行，不关心流程

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

use crate::models::{ConversionResult, JobReport};

/// 输出写入服务
///
/// 报告文件是 JSON Lines：每个任务一行，多个任务并发写入时由互斥锁串行化
pub struct OutputWriter {
    output_folder: PathBuf,
    report_path: PathBuf,
    report_lock: Mutex<()>,
}

impl OutputWriter {
    pub fn new(output_folder: impl Into<PathBuf>, report_path: impl Into<PathBuf>) -> Self {
        Self {
            output_folder: output_folder.into(),
            report_path: report_path.into(),
            report_lock: Mutex::new(()),
        }
    }

    pub fn report_path(&self) -> &Path {
        &self.report_path
    }

    /// 确保输出目录存在
    pub async fn prepare(&self) -> Result<()> {
        fs::create_dir_all(&self.output_folder)
            .await
            .with_context(|| format!("无法创建输出目录: {}", self.output_folder.display()))
    }

    /// 写入转换结果，返回写入的路径
    pub async fn write_result(&self, result: &ConversionResult) -> Result<PathBuf> {
        let path = self.output_folder.join(result.declared_name());
        fs::write(&path, result.payload_bytes())
            .await
            .with_context(|| format!("无法写入输出文件: {}", path.display()))?;
        debug!("写入结果: {} ({} 字节)", path.display(), result.payload_bytes().len());
        Ok(path)
    }

    /// 追加一行报告
    pub async fn append_report(&self, report: &JobReport) -> Result<()> {
        let mut line = serde_json::to_string(report)?;
        line.push('\n');

        let _guard = self.report_lock.lock().await;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.report_path)
            .await
            .with_context(|| format!("无法打开报告文件: {}", self.report_path.display()))?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}
