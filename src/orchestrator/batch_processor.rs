//! 批量转换处理器 - 编排层
//!
//! ## 职责
//!
//! 本模块是整个应用的入口，负责批量文件的调度和资源管理。
//!
//! ## 核心功能
//!
//! 1. **应用初始化**：写日志文件头、创建浏览器控制器和协调器
//! 2. **批量加载**：命令行给出的文件，或扫描输入目录
//! 3. **并发控制**：使用 Semaphore 限制同时在跑的任务数量
//! 4. **结果落盘**：写输出文件，每个任务追加一行报告
//! 5. **全局统计**：汇总成功和失败数量
//!
//! 单个文件的转换全部委托给 `RequestCoordinator`。

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::browser::{BrowserController, ChromiumController};
use crate::config::Config;
use crate::models::{JobFailure, JobReport};
use crate::orchestrator::coordinator::RequestCoordinator;
use crate::services::{Intake, OutputWriter};
use crate::utils::logging;

/// 应用主结构
pub struct App {
    config: Config,
    coordinator: Arc<RequestCoordinator>,
    intake: Arc<Intake>,
    writer: Arc<OutputWriter>,
}

impl App {
    /// 初始化应用（使用本地 Chromium）
    pub async fn initialize(config: Config) -> Result<Self> {
        let controller = Arc::new(ChromiumController::from_config(&config));
        Self::with_controller(config, controller).await
    }

    /// 使用指定的浏览器控制器初始化
    pub async fn with_controller(
        config: Config,
        controller: Arc<dyn BrowserController>,
    ) -> Result<Self> {
        logging::init_log_file(&config.output_log_file)?;
        logging::log_startup(config.max_concurrent_jobs, &config.editor_url);

        let coordinator = RequestCoordinator::new(&config, controller)?;
        info!("⏱️ 单个任务最长耗时: {:?}", coordinator.job_budget());

        let writer = OutputWriter::new(&config.output_folder, &config.report_file);
        writer.prepare().await?;

        Ok(Self {
            intake: Arc::new(Intake::from_config(&config)),
            coordinator: Arc::new(coordinator),
            writer: Arc::new(writer),
            config,
        })
    }

    /// 运行应用主逻辑
    ///
    /// `inputs` 为空时扫描配置的输入目录
    pub async fn run(&self, inputs: Vec<PathBuf>) -> Result<ProcessingStats> {
        let files = if inputs.is_empty() {
            info!("\n📁 正在扫描待转换的文件: {}", self.config.input_folder);
            self.intake.scan_folder(&self.config.input_folder).await?
        } else {
            inputs
        };

        if files.is_empty() {
            warn!("⚠️ 没有找到待转换的文件，程序结束");
            return Ok(ProcessingStats::default());
        }

        logging::log_jobs_loaded(files.len(), self.config.max_concurrent_jobs);
        let stats = self.process_all(files).await;

        logging::print_final_stats(
            stats.success,
            stats.failed,
            stats.total,
            &self.writer.report_path().display().to_string(),
        );
        Ok(stats)
    }

    /// 并发处理所有文件
    async fn process_all(&self, files: Vec<PathBuf>) -> ProcessingStats {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_jobs.max(1)));
        let mut stats = ProcessingStats {
            total: files.len(),
            ..Default::default()
        };

        let mut handles = Vec::new();
        for (idx, path) in files.into_iter().enumerate() {
            let job_index = idx + 1;
            let semaphore = semaphore.clone();
            let coordinator = self.coordinator.clone();
            let intake = self.intake.clone();
            let writer = self.writer.clone();

            let handle = tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                process_file(job_index, path, &intake, &coordinator, &writer).await
            });
            handles.push((job_index, handle));
        }

        for (job_index, handle) in handles {
            match handle.await {
                Ok(true) => stats.success += 1,
                Ok(false) => stats.failed += 1,
                Err(e) => {
                    error!("[文件 {}] 任务执行失败: {}", job_index, e);
                    stats.failed += 1;
                }
            }
        }
        stats
    }
}

/// 处理单个文件：读取 → 转换 → 写结果 → 写报告
///
/// 返回是否成功
async fn process_file(
    job_index: usize,
    path: PathBuf,
    intake: &Intake,
    coordinator: &RequestCoordinator,
    writer: &OutputWriter,
) -> bool {
    let started = Instant::now();
    let source = path.display().to_string();
    info!("[文件 {}] 📄 {}", job_index, source);

    let outcome = match intake.load_file(&path).await {
        Ok(job) => coordinator.convert(job).await.map_err(JobFailure::from),
        Err(e) => Err(JobFailure::from(e)),
    };

    let (succeeded, report) = match outcome {
        Ok(result) => match writer.write_result(&result).await {
            Ok(written) => {
                info!("[文件 {}] 💾 已写入 {}", job_index, written.display());
                let output = written.display().to_string();
                (
                    true,
                    JobReport::converted(&source, &output, started.elapsed().as_millis()),
                )
            }
            Err(e) => {
                error!("[文件 {}] ❌ 写入结果失败: {:#}", job_index, e);
                let message = format!("{:#}", e);
                (
                    false,
                    JobReport::output_failed(&source, message, started.elapsed().as_millis()),
                )
            }
        },
        Err(failure) => {
            warn!("[文件 {}] ❌ {}", job_index, failure);
            (
                false,
                JobReport::failed(&source, &failure, started.elapsed().as_millis()),
            )
        }
    };

    if let Err(e) = writer.append_report(&report).await {
        error!("[文件 {}] ⚠️ 写入报告失败: {:#}", job_index, e);
    }
    succeeded
}

/// 处理统计
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ProcessingStats {
    pub success: usize,
    pub failed: usize,
    pub total: usize,
}

impl ProcessingStats {
    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }
}
