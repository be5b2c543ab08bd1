//! "等待编辑器就绪"能力的两种实现
//!
//! 同一个逻辑条件（握手完成 / 加载完成），有的部署只能靠事件得知，
//! 有的只能靠轮询页面状态得知。两者实现同一个 trait，由配置选择。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::browser::BrowserSession;
use crate::config::DetectionStrategy;
use crate::error::ChannelError;
use crate::protocol::governor::{Phase, PhaseOutcome, TimeoutGovernor};
use crate::protocol::sequencer::Interpretation;

#[async_trait]
pub trait ReadinessWaiter: Send + Sync {
    /// 等待 `phase`（Handshake 或 Load）的完成标记
    async fn await_marker(
        &self,
        session: &mut BrowserSession,
        governor: &TimeoutGovernor,
        phase: Phase,
        budget: Duration,
    ) -> PhaseOutcome<()>;

    fn name(&self) -> &'static str;
}

/// 按配置选择实现
pub fn readiness_for(
    strategy: DetectionStrategy,
    strict_signals: bool,
) -> Arc<dyn ReadinessWaiter> {
    match strategy {
        DetectionStrategy::Event => Arc::new(EventReadiness { strict_signals }),
        DetectionStrategy::Polling => Arc::new(PollingReadiness),
    }
}

/// 订阅方式：从收件箱中等到对应的哨兵解释
#[derive(Debug, Clone, Copy, Default)]
pub struct EventReadiness {
    pub strict_signals: bool,
}

#[async_trait]
impl ReadinessWaiter for EventReadiness {
    async fn await_marker(
        &self,
        session: &mut BrowserSession,
        governor: &TimeoutGovernor,
        phase: Phase,
        budget: Duration,
    ) -> PhaseOutcome<()> {
        let Some(inbox) = session.inbox_mut() else {
            return PhaseOutcome::ChannelError(ChannelError::Closed);
        };
        let strict = self.strict_signals;

        governor
            .await_event(inbox, phase, budget, |interpretation| match (phase, interpretation) {
                (Phase::Handshake, Interpretation::EditorReady) => Some(Ok(())),
                (Phase::Load, Interpretation::LoadComplete) => Some(Ok(())),
                (_, Interpretation::Unrecognized(raw)) if strict => {
                    Some(Err(ChannelError::Unrecognized(raw)))
                }
                (_, other) => {
                    debug!("[{}] 等待中忽略信号: {:?}", phase, other);
                    None
                }
            })
            .await
    }

    fn name(&self) -> &'static str {
        "event"
    }
}

/// 轮询方式：定时读取页面的 done 标志
#[derive(Debug, Clone, Copy, Default)]
pub struct PollingReadiness;

#[async_trait]
impl ReadinessWaiter for PollingReadiness {
    async fn await_marker(
        &self,
        session: &mut BrowserSession,
        governor: &TimeoutGovernor,
        phase: Phase,
        budget: Duration,
    ) -> PhaseOutcome<()> {
        let Some(channel) = session.channel() else {
            return PhaseOutcome::ChannelError(ChannelError::Closed);
        };

        governor
            .await_poll(phase, budget, move || {
                let channel = channel.clone();
                async move {
                    let state = channel.read_state().await?;
                    Ok(state.done.then_some(()))
                }
            })
            .await
    }

    fn name(&self) -> &'static str {
        "polling"
    }
}
