//! 请求协调器 - 编排层
//!
//! ## 职责
//!
//! 一次转换 = 一个会话 + 三个阶段，严格按顺序执行：
//!
//! ```text
//! acquire ─→ handshake ─→ transfer ─→ export ─→ release
//!    │           │            │          │
//!    └───────────┴────────────┴──────────┴──→ 任一失败：分类错误 → release
//! ```
//!
//! - 任何阶段失败立即停止，不尝试恢复部分结果
//! - 不论成功失败，会话都释放且只释放一次
//! - 只有这里把各阶段的结果分类成 `ConversionError`

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, error, info};

use crate::browser::{BrowserController, BrowserSession, LaunchOptions, SessionManager};
use crate::config::Config;
use crate::error::{hex, ConfigError, ConversionError, ErrorKind, ResultDefect};
use crate::models::{ConversionJob, ConversionResult};
use crate::protocol::{
    readiness_for, DocumentHandshake, ExportProtocol, LoadCompletion, LoadOutcome, PayloadTransfer,
    Phase, PhaseFailure, PositionalPolicy, SentinelPolicy, TargetFormat, TimeoutGovernor,
};

pub struct RequestCoordinator {
    sessions: SessionManager,
    governor: TimeoutGovernor,
    handshake: DocumentHandshake,
    transfer: PayloadTransfer,
    export: ExportProtocol,
    launch_budget: Duration,
}

impl RequestCoordinator {
    /// 按配置组装各阶段
    pub fn new(
        config: &Config,
        controller: Arc<dyn BrowserController>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let readiness = readiness_for(config.detection, config.strict_signals);
        let policy: Arc<dyn SentinelPolicy> =
            Arc::new(PositionalPolicy::new(config.sentinel_mode, config.await_export_trailer));
        let completion = match config.settle_delay() {
            Some(delay) => LoadCompletion::SettleDelay(delay),
            None => LoadCompletion::Signal,
        };
        let format = TargetFormat::new(config.target_format.clone(), config.magic_bytes());

        Ok(Self {
            sessions: SessionManager::new(
                controller,
                LaunchOptions::from_config(config),
                config.editor_url.clone(),
                policy,
                config.max_concurrent_jobs,
            ),
            governor: TimeoutGovernor::new(config.poll_interval()),
            handshake: DocumentHandshake::new(readiness.clone(), config.handshake_budget()),
            transfer: PayloadTransfer::new(readiness, config.load_budget(), completion),
            export: ExportProtocol::new(format, config.export_budget(), config.strict_signals),
            launch_budget: config.launch_budget(),
        })
    }

    /// 替换哨兵消歧策略
    pub fn with_sentinel_policy(mut self, policy: Arc<dyn SentinelPolicy>) -> Self {
        self.sessions.set_policy(policy);
        self
    }

    /// 单个任务拿到会话之后，最坏情况下的总耗时（各阶段期限之和）
    ///
    /// 不包含排队等待会话名额的时间：并发任务超过 `max_concurrent_jobs` 时，
    /// 实际耗时 = 排队时间 + 本值以内的执行时间。排队时间在日志中单独记录。
    pub fn job_budget(&self) -> Duration {
        self.launch_budget
            + self.handshake.budget()
            + self.transfer.worst_case()
            + self.export.budget()
    }

    pub fn target_format(&self) -> &TargetFormat {
        self.export.format()
    }

    /// 执行一次转换
    pub async fn convert(&self, job: ConversionJob) -> Result<ConversionResult, ConversionError> {
        let started = Instant::now();
        let name = job.source_name().to_string();
        info!(
            "[任务 {}] 开始转换 ({} 字节, 期限 {:?})",
            name,
            job.source_bytes().len(),
            self.job_budget()
        );

        let mut session = match self.sessions.acquire().await {
            Ok(session) => {
                debug!(
                    "[任务 {}] 会话 {} 就绪 (排队 + 启动 {:?})",
                    name,
                    session.id(),
                    started.elapsed()
                );
                session
            }
            Err(e) => {
                error!("[任务 {}] ❌ 无法启动浏览器: {}", name, e);
                return Err(classify(Phase::Launch, PhaseFailure::Process(e), started.elapsed()));
            }
        };

        let outcome = self.run_phases(&mut session, &job).await;
        self.sessions.release(&mut session).await;

        match outcome {
            Ok(bytes) => {
                let declared_name = job.suggested_output_name(self.export.format().extension());
                info!(
                    "[任务 {}] ✅ 转换成功 → {} ({} 字节, 耗时 {:?})",
                    name,
                    declared_name,
                    bytes.len(),
                    started.elapsed()
                );
                Ok(ConversionResult::new(bytes, declared_name))
            }
            Err((phase, failure)) => {
                let err = classify(phase, failure, started.elapsed());
                error!("[任务 {}] ❌ {}", name, err);
                Err(err)
            }
        }
    }

    async fn run_phases(
        &self,
        session: &mut BrowserSession,
        job: &ConversionJob,
    ) -> Result<Vec<u8>, (Phase, PhaseFailure)> {
        self.handshake
            .await_ready(session, &self.governor)
            .await
            .into_result()
            .map_err(|f| (Phase::Handshake, f))?;

        let loaded = self
            .transfer
            .send(session, &self.governor, job.source_bytes())
            .await
            .into_result()
            .map_err(|f| (Phase::Load, f))?;
        if let LoadOutcome::Settled { delay } = loaded {
            info!("[会话 {}] 加载按降级模式处理 ({:?})", session.id(), delay);
        }

        self.export
            .request_export(session, &self.governor)
            .await
            .into_result()
            .map_err(|f| (Phase::Export, f))
    }
}

/// 把阶段失败分类成对外的错误
pub fn classify(phase: Phase, failure: PhaseFailure, elapsed: Duration) -> ConversionError {
    match failure {
        PhaseFailure::TimedOut { phase: timed_out, budget } => {
            let kind = match timed_out {
                Phase::Launch => ErrorKind::ProcessLaunch,
                Phase::Handshake => ErrorKind::HandshakeTimeout,
                Phase::Load => ErrorKind::LoadTimeout,
                Phase::Export => ErrorKind::ExportTimeout,
            };
            let message = format!("{} 阶段在 {:?} 内没有完成", timed_out, budget);
            ConversionError::new(kind, message, elapsed)
        }
        PhaseFailure::Process(e) => {
            ConversionError::new(ErrorKind::ProcessLaunch, e.to_string(), elapsed)
        }
        PhaseFailure::Channel(e) => ConversionError::new(
            ErrorKind::ChannelProtocol,
            format!("{} 阶段通道异常: {}", phase, e),
            elapsed,
        ),
        PhaseFailure::Rejected(ResultDefect::Empty) => {
            ConversionError::new(ErrorKind::EmptyResult, "编辑器返回了空的导出结果", elapsed)
        }
        PhaseFailure::Rejected(ResultDefect::BadSignature { expected, observed }) => {
            ConversionError::new(
                ErrorKind::Validation,
                format!("导出结果文件头为 {}，期望 {}", hex(&observed), hex(&expected)),
                elapsed,
            )
            .with_observed_header(observed)
        }
    }
}
