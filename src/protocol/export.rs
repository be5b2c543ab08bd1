//! 导出阶段：让编辑器把当前文档序列化成目标格式并发回
//!
//! 收件箱先切到"等导出"状态，再发命令，编辑器回得再快也不会漏掉结果。
//! 收到二进制后，如果策略要求，还要等尾随的哨兵才算结束。

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::browser::BrowserSession;
use crate::error::{hex, ChannelError, ResultDefect};
use crate::protocol::governor::{Phase, PhaseOutcome, TimeoutGovernor};
use crate::protocol::sequencer::Interpretation;

/// 目标格式
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetFormat {
    /// saveToOE 的参数，同时作为输出扩展名
    pub token: String,
    /// 文件头签名
    pub magic: [u8; 4],
}

impl TargetFormat {
    pub fn new(token: impl Into<String>, magic: [u8; 4]) -> Self {
        Self {
            token: token.into(),
            magic,
        }
    }

    pub fn psd() -> Self {
        Self::new("psd", *b"8BPS")
    }

    pub fn extension(&self) -> &str {
        &self.token
    }
}

/// 构造导出命令
pub fn export_command(format: &TargetFormat) -> String {
    format!("app.activeDocument.saveToOE(\"{}\")", format.token)
}

/// 检查导出结果的文件头
pub fn validate_signature(bytes: &[u8], magic: &[u8; 4]) -> Result<(), ResultDefect> {
    if bytes.is_empty() {
        return Err(ResultDefect::Empty);
    }
    let header = &bytes[..bytes.len().min(4)];
    if header != magic.as_slice() {
        return Err(ResultDefect::BadSignature {
            expected: *magic,
            observed: header.to_vec(),
        });
    }
    Ok(())
}

pub struct ExportProtocol {
    format: TargetFormat,
    budget: Duration,
    strict_signals: bool,
}

impl ExportProtocol {
    pub fn new(format: TargetFormat, budget: Duration, strict_signals: bool) -> Self {
        Self {
            format,
            budget,
            strict_signals,
        }
    }

    pub fn format(&self) -> &TargetFormat {
        &self.format
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    pub async fn request_export(
        &self,
        session: &mut BrowserSession,
        governor: &TimeoutGovernor,
    ) -> PhaseOutcome<Vec<u8>> {
        let session_id = session.id();
        let Some((channel, inbox)) = session.parts() else {
            return PhaseOutcome::ChannelError(ChannelError::Closed);
        };

        let stale = inbox.discard_pending();
        if stale > 0 {
            debug!("[会话 {}] 导出前清除了 {} 个残留信号", session_id, stale);
        }
        // 先挂好监听，再发命令
        inbox.sequencer_mut().begin_export();

        let command = export_command(&self.format);
        if let Err(e) = channel.post_command(&command).await {
            return PhaseOutcome::ChannelError(e);
        }
        info!("[会话 {}] 📦 已发送导出命令: {}", session_id, command);

        let started = Instant::now();
        let strict = self.strict_signals;
        let mut payload: Option<Vec<u8>> = None;

        let outcome = governor
            .await_event(inbox, Phase::Export, self.budget, |interpretation| match interpretation {
                Interpretation::ExportPayload {
                    bytes,
                    awaiting_trailer: false,
                } => Some(Ok(bytes)),
                Interpretation::ExportPayload {
                    bytes,
                    awaiting_trailer: true,
                } => {
                    debug!("[会话 {}] 收到 {} 字节，等待尾随哨兵", session_id, bytes.len());
                    payload = Some(bytes);
                    None
                }
                Interpretation::ExportComplete => payload.take().map(Ok),
                // 损坏的结果不受 strict_signals 影响，直接判定为通道错误
                Interpretation::MalformedPayload(reason) => {
                    Some(Err(ChannelError::MalformedPayload(reason)))
                }
                Interpretation::Unrecognized(raw) if strict => {
                    Some(Err(ChannelError::Unrecognized(raw)))
                }
                Interpretation::Text(text) => {
                    debug!("[会话 {}] 导出期间收到文本: {}", session_id, text);
                    None
                }
                _ => None,
            })
            .await;

        let bytes = match outcome {
            PhaseOutcome::Success(bytes) => bytes,
            other => return other,
        };
        info!(
            "[会话 {}] ✓ 收到导出结果 {} 字节 (耗时 {:?})",
            session_id,
            bytes.len(),
            started.elapsed()
        );

        if let Err(defect) = validate_signature(&bytes, &self.format.magic) {
            warn!(
                "[会话 {}] ❌ 导出结果校验失败: {} (文件头 {})",
                session_id,
                defect,
                hex(&bytes[..bytes.len().min(4)])
            );
            return PhaseOutcome::Rejected(defect);
        }
        PhaseOutcome::Success(bytes)
    }
}
