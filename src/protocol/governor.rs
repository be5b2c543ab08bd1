//! 期限控制
//!
//! 让"某个条件成立"与期限赛跑。条件来源有两种：
//! - 事件：从会话的信号收件箱里等到第一个匹配的信号
//! - 轮询：按固定间隔调用一个探测函数
//!
//! 超时不是异常，而是 `PhaseOutcome::TimedOut`；等待的 future 被丢弃时，
//! 轮询计时器随之取消，收件箱的借用随之归还。

use std::fmt;
use std::future::Future;
use std::time::Duration;

use tokio::time::{self, MissedTickBehavior};
use tracing::debug;

use crate::error::{ChannelError, ControllerError, ResultDefect};
use crate::protocol::sequencer::{Interpretation, SignalInbox};

/// 转换协议的阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Launch,
    Handshake,
    Load,
    Export,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Launch => "launch",
            Phase::Handshake => "handshake",
            Phase::Load => "load",
            Phase::Export => "export",
        };
        f.write_str(name)
    }
}

/// 单个阶段向协调器汇报的结果
#[derive(Debug)]
pub enum PhaseOutcome<T> {
    Success(T),
    TimedOut { phase: Phase, budget: Duration },
    ChannelError(ChannelError),
    ProcessError(ControllerError),
    /// 导出结果没有通过校验
    Rejected(ResultDefect),
}

/// 非成功的阶段结果
#[derive(Debug)]
pub enum PhaseFailure {
    TimedOut { phase: Phase, budget: Duration },
    Channel(ChannelError),
    Process(ControllerError),
    Rejected(ResultDefect),
}

impl<T> PhaseOutcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, PhaseOutcome::Success(_))
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> PhaseOutcome<U> {
        match self {
            PhaseOutcome::Success(value) => PhaseOutcome::Success(f(value)),
            PhaseOutcome::TimedOut { phase, budget } => PhaseOutcome::TimedOut { phase, budget },
            PhaseOutcome::ChannelError(e) => PhaseOutcome::ChannelError(e),
            PhaseOutcome::ProcessError(e) => PhaseOutcome::ProcessError(e),
            PhaseOutcome::Rejected(defect) => PhaseOutcome::Rejected(defect),
        }
    }

    pub fn into_result(self) -> Result<T, PhaseFailure> {
        match self {
            PhaseOutcome::Success(value) => Ok(value),
            PhaseOutcome::TimedOut { phase, budget } => {
                Err(PhaseFailure::TimedOut { phase, budget })
            }
            PhaseOutcome::ChannelError(e) => Err(PhaseFailure::Channel(e)),
            PhaseOutcome::ProcessError(e) => Err(PhaseFailure::Process(e)),
            PhaseOutcome::Rejected(defect) => Err(PhaseFailure::Rejected(defect)),
        }
    }
}

impl<T> From<ChannelError> for PhaseOutcome<T> {
    fn from(err: ChannelError) -> Self {
        PhaseOutcome::ChannelError(err)
    }
}

/// 期限控制器
#[derive(Debug, Clone)]
pub struct TimeoutGovernor {
    poll_interval: Duration,
}

impl TimeoutGovernor {
    pub fn new(poll_interval: Duration) -> Self {
        Self { poll_interval }
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// 事件方式：从收件箱读取信号，直到 `matcher` 给出结果或超时
    ///
    /// `matcher` 返回 `None` 表示继续等待，`Some(Ok(v))` 完成，`Some(Err(e))` 失败
    pub async fn await_event<T, F>(
        &self,
        inbox: &mut SignalInbox,
        phase: Phase,
        budget: Duration,
        mut matcher: F,
    ) -> PhaseOutcome<T>
    where
        F: FnMut(Interpretation) -> Option<Result<T, ChannelError>>,
    {
        let wait = async {
            loop {
                let Some(interpretation) = inbox.next().await else {
                    return PhaseOutcome::ChannelError(ChannelError::Closed);
                };
                match matcher(interpretation) {
                    Some(Ok(value)) => return PhaseOutcome::Success(value),
                    Some(Err(e)) => return PhaseOutcome::ChannelError(e),
                    None => continue,
                }
            }
        };

        match time::timeout(budget, wait).await {
            Ok(outcome) => outcome,
            Err(_) => {
                debug!("⏱️ [{}] 事件等待超时 ({:?})", phase, budget);
                PhaseOutcome::TimedOut { phase, budget }
            }
        }
    }

    /// 轮询方式：按固定间隔调用 `probe`，直到返回 `Some` 或超时
    pub async fn await_poll<T, F, Fut>(
        &self,
        phase: Phase,
        budget: Duration,
        mut probe: F,
    ) -> PhaseOutcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<T>, ChannelError>>,
    {
        let mut ticker = time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let poll = async {
            loop {
                ticker.tick().await;
                match probe().await {
                    Ok(Some(value)) => return PhaseOutcome::Success(value),
                    Ok(None) => continue,
                    Err(e) => return PhaseOutcome::ChannelError(e),
                }
            }
        };

        match time::timeout(budget, poll).await {
            Ok(outcome) => outcome,
            Err(_) => {
                debug!("⏱️ [{}] 轮询等待超时 ({:?})", phase, budget);
                PhaseOutcome::TimedOut { phase, budget }
            }
        }
    }

    /// 固定等待（降级模式）
    pub async fn settle(&self, delay: Duration) {
        time::sleep(delay).await;
    }
}
