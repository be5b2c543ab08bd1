//! 传输阶段：把源文件交给编辑器，并等它加载完
//!
//! 步骤：
//! 1. 清掉握手阶段残留的标志和信号，避免误判
//! 2. 以原始 ArrayBuffer 投递数据（单向，没有回执）
//! 3. 等第二个就绪类信号；或者在降级模式下固定等待一段时间
//!
//! 降级模式的固定等待不是真正的完成信号，只是一个保守的估计。

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{info, warn};

use crate::browser::BrowserSession;
use crate::error::ChannelError;
use crate::protocol::governor::{Phase, PhaseOutcome, TimeoutGovernor};
use crate::protocol::readiness::ReadinessWaiter;

/// 加载完成的判定方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadCompletion {
    /// 等编辑器的信号
    Signal,
    /// 降级：固定等待
    SettleDelay(Duration),
}

/// 加载结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// 收到了加载完成信号
    Confirmed { waited: Duration },
    /// 只是等够了固定时间
    Settled { delay: Duration },
}

pub struct PayloadTransfer {
    readiness: Arc<dyn ReadinessWaiter>,
    budget: Duration,
    completion: LoadCompletion,
}

impl PayloadTransfer {
    pub fn new(
        readiness: Arc<dyn ReadinessWaiter>,
        budget: Duration,
        completion: LoadCompletion,
    ) -> Self {
        Self {
            readiness,
            budget,
            completion,
        }
    }

    /// 本阶段最坏情况下的耗时
    pub fn worst_case(&self) -> Duration {
        match self.completion {
            LoadCompletion::Signal => self.budget,
            LoadCompletion::SettleDelay(delay) => delay,
        }
    }

    pub async fn send(
        &self,
        session: &mut BrowserSession,
        governor: &TimeoutGovernor,
        bytes: &[u8],
    ) -> PhaseOutcome<LoadOutcome> {
        let session_id = session.id();
        let Some((channel, inbox)) = session.parts() else {
            return PhaseOutcome::ChannelError(ChannelError::Closed);
        };

        // 1. 清除残留
        if let Err(e) = channel.reset_state().await {
            return PhaseOutcome::ChannelError(e);
        }
        let stale = inbox.discard_pending();
        if stale > 0 {
            info!("[会话 {}] 清除了 {} 个残留信号", session_id, stale);
        }
        inbox.sequencer_mut().begin_transfer();

        // 2. 投递
        if let Err(e) = channel.post_binary(bytes).await {
            return PhaseOutcome::ChannelError(e);
        }
        info!("[会话 {}] 📤 已投递 {} 字节，等待编辑器加载", session_id, bytes.len());

        // 3. 等待加载完成
        match self.completion {
            LoadCompletion::Signal => {
                let started = Instant::now();
                let outcome = self
                    .readiness
                    .await_marker(session, governor, Phase::Load, self.budget)
                    .await;
                outcome.map(|()| {
                    let waited = started.elapsed();
                    info!("[会话 {}] ✓ 编辑器加载完成 (耗时 {:?})", session_id, waited);
                    LoadOutcome::Confirmed { waited }
                })
            }
            LoadCompletion::SettleDelay(delay) => {
                warn!(
                    "[会话 {}] ⚠️ 降级模式：不等加载信号，固定等待 {:?}",
                    session_id, delay
                );
                governor.settle(delay).await;
                PhaseOutcome::Success(LoadOutcome::Settled { delay })
            }
        }
    }
}
