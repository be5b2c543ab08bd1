//! 握手阶段：从"已导航"等到"编辑器可以接收文件"
//!
//! 握手失败总是终止整个任务：向未就绪的编辑器发送数据，结果不可预期。

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{info, warn};

use crate::browser::BrowserSession;
use crate::protocol::governor::{Phase, PhaseOutcome, TimeoutGovernor};
use crate::protocol::readiness::ReadinessWaiter;

/// 握手状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    Navigating,
    AwaitingReady,
    Ready,
}

pub struct DocumentHandshake {
    readiness: Arc<dyn ReadinessWaiter>,
    budget: Duration,
}

impl DocumentHandshake {
    pub fn new(readiness: Arc<dyn ReadinessWaiter>, budget: Duration) -> Self {
        Self { readiness, budget }
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    /// 等待编辑器初始化完成
    pub async fn await_ready(
        &self,
        session: &mut BrowserSession,
        governor: &TimeoutGovernor,
    ) -> PhaseOutcome<()> {
        // 页面在会话创建时已经导航完毕
        let mut state = HandshakeState::Navigating;
        let started = Instant::now();

        transition(session.id(), &mut state, HandshakeState::AwaitingReady);
        let outcome = self
            .readiness
            .await_marker(session, governor, Phase::Handshake, self.budget)
            .await;

        match &outcome {
            PhaseOutcome::Success(()) => {
                transition(session.id(), &mut state, HandshakeState::Ready);
                info!(
                    "[会话 {}] ✓ 编辑器已就绪 ({}，耗时 {:?})",
                    session.id(),
                    self.readiness.name(),
                    started.elapsed()
                );
            }
            other => warn!("[会话 {}] ❌ 握手失败 (停在 {:?}): {:?}", session.id(), state, other),
        }
        outcome
    }
}

fn transition(session_id: u64, state: &mut HandshakeState, next: HandshakeState) {
    tracing::debug!("[会话 {}] 握手 {:?} → {:?}", session_id, state, next);
    *state = next;
}
