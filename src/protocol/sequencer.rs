//! 信号消歧
//!
//! 编辑器用同一个哨兵字符串表示"初始化完成"、"加载完成"和"导出完成"，
//! 没有序号也没有消息 ID。这里按"当前处在哪个阶段 + 这是第几个哨兵"
//! 推断含义。推断规则由 `SentinelPolicy` 决定，可以替换。

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::config::SentinelMode;
use crate::models::ProtocolSignal;

/// 会话在协议中所处的位置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    AwaitingReady,
    Idle,
    AwaitingLoad,
    Loaded,
    AwaitingExport,
    AwaitingTrailer,
    Exported,
}

/// 一个哨兵的含义
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SentinelMeaning {
    EditorReady,
    LoadComplete,
    ExportComplete,
    Ignored,
}

/// 信号经过消歧后的解释
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interpretation {
    EditorReady,
    LoadComplete,
    /// 导出的二进制；`awaiting_trailer` 为 true 时还需要等尾随哨兵
    ExportPayload { bytes: Vec<u8>, awaiting_trailer: bool },
    ExportComplete,
    /// 等导出期间收到的损坏二进制
    MalformedPayload(String),
    Ignored,
    Text(String),
    Unrecognized(String),
}

/// 哨兵消歧策略
pub trait SentinelPolicy: Send + Sync + fmt::Debug {
    /// `ordinal` 从 1 开始，包含被丢弃的过期哨兵
    fn classify(&self, stage: Stage, ordinal: usize) -> SentinelMeaning;

    /// 导出二进制之后是否还要等一个哨兵才算完成
    fn awaits_trailer(&self) -> bool;
}

/// 按位置推断的内置策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionalPolicy {
    pub mode: SentinelMode,
    pub await_trailer: bool,
}

impl Default for PositionalPolicy {
    fn default() -> Self {
        Self {
            mode: SentinelMode::PhaseRelative,
            await_trailer: true,
        }
    }
}

impl PositionalPolicy {
    pub fn new(mode: SentinelMode, await_trailer: bool) -> Self {
        Self { mode, await_trailer }
    }
}

impl SentinelPolicy for PositionalPolicy {
    fn classify(&self, stage: Stage, ordinal: usize) -> SentinelMeaning {
        match (self.mode, stage) {
            (_, Stage::AwaitingTrailer) => SentinelMeaning::ExportComplete,
            (SentinelMode::PhaseRelative, Stage::AwaitingReady) => SentinelMeaning::EditorReady,
            (SentinelMode::PhaseRelative, Stage::AwaitingLoad) => SentinelMeaning::LoadComplete,
            (SentinelMode::StrictOrdinal, Stage::AwaitingReady) if ordinal == 1 => {
                SentinelMeaning::EditorReady
            }
            (SentinelMode::StrictOrdinal, Stage::AwaitingLoad) if ordinal == 2 => {
                SentinelMeaning::LoadComplete
            }
            _ => SentinelMeaning::Ignored,
        }
    }

    fn awaits_trailer(&self) -> bool {
        self.await_trailer
    }
}

/// 每个会话一份的位置状态机
#[derive(Debug)]
pub struct SignalSequencer {
    stage: Stage,
    sentinels_seen: usize,
    policy: Arc<dyn SentinelPolicy>,
}

impl SignalSequencer {
    pub fn new(policy: Arc<dyn SentinelPolicy>) -> Self {
        Self {
            stage: Stage::AwaitingReady,
            sentinels_seen: 0,
            policy,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn sentinels_seen(&self) -> usize {
        self.sentinels_seen
    }

    /// 数据已经发出，下一个合格的哨兵表示加载完成
    pub fn begin_transfer(&mut self) {
        self.stage = Stage::AwaitingLoad;
    }

    /// 导出命令即将发出；必须在发命令之前调用
    pub fn begin_export(&mut self) {
        self.stage = Stage::AwaitingExport;
    }

    /// 解释一个新到的信号并推进状态
    pub fn observe(&mut self, signal: ProtocolSignal) -> Interpretation {
        let interpretation = match signal {
            ProtocolSignal::Ready => {
                self.sentinels_seen += 1;
                match self.policy.classify(self.stage, self.sentinels_seen) {
                    SentinelMeaning::EditorReady => {
                        self.stage = Stage::Idle;
                        Interpretation::EditorReady
                    }
                    SentinelMeaning::LoadComplete => {
                        self.stage = Stage::Loaded;
                        Interpretation::LoadComplete
                    }
                    SentinelMeaning::ExportComplete => {
                        self.stage = Stage::Exported;
                        Interpretation::ExportComplete
                    }
                    SentinelMeaning::Ignored => Interpretation::Ignored,
                }
            }
            ProtocolSignal::BinaryResult(bytes) if self.stage == Stage::AwaitingExport => {
                let awaiting_trailer = self.policy.awaits_trailer();
                self.stage = if awaiting_trailer {
                    Stage::AwaitingTrailer
                } else {
                    Stage::Exported
                };
                Interpretation::ExportPayload {
                    bytes,
                    awaiting_trailer,
                }
            }
            ProtocolSignal::BinaryResult(bytes) => {
                debug!("忽略阶段 {:?} 中的二进制数据 ({} 字节)", self.stage, bytes.len());
                Interpretation::Ignored
            }
            ProtocolSignal::MalformedBinary(reason) if self.stage == Stage::AwaitingExport => {
                Interpretation::MalformedPayload(reason)
            }
            ProtocolSignal::MalformedBinary(reason) => Interpretation::Unrecognized(reason),
            ProtocolSignal::Text(text) => Interpretation::Text(text),
            ProtocolSignal::Unrecognized(raw) => Interpretation::Unrecognized(raw),
        };
        trace!(
            "信号解释: {} (阶段 {:?}, 哨兵 #{})",
            interpretation_label(&interpretation),
            self.stage,
            self.sentinels_seen
        );
        interpretation
    }

    /// 丢弃一个过期信号，只累计哨兵序号
    pub fn discard(&mut self, signal: &ProtocolSignal) {
        if matches!(signal, ProtocolSignal::Ready) {
            self.sentinels_seen += 1;
        }
    }
}

fn interpretation_label(interpretation: &Interpretation) -> &'static str {
    match interpretation {
        Interpretation::EditorReady => "editor_ready",
        Interpretation::LoadComplete => "load_complete",
        Interpretation::ExportPayload { .. } => "export_payload",
        Interpretation::ExportComplete => "export_complete",
        Interpretation::MalformedPayload(_) => "malformed_payload",
        Interpretation::Ignored => "ignored",
        Interpretation::Text(_) => "text",
        Interpretation::Unrecognized(_) => "unrecognized",
    }
}

/// 会话的信号收件箱
///
/// 队列在导航之前创建，所以任何信号都不会在订阅前丢失
#[derive(Debug)]
pub struct SignalInbox {
    receiver: mpsc::UnboundedReceiver<ProtocolSignal>,
    sequencer: SignalSequencer,
}

impl SignalInbox {
    pub fn new(
        receiver: mpsc::UnboundedReceiver<ProtocolSignal>,
        policy: Arc<dyn SentinelPolicy>,
    ) -> Self {
        Self {
            receiver,
            sequencer: SignalSequencer::new(policy),
        }
    }

    /// 等待下一个信号并解释；队列关闭时返回 None
    pub async fn next(&mut self) -> Option<Interpretation> {
        let signal = self.receiver.recv().await?;
        Some(self.sequencer.observe(signal))
    }

    /// 清掉已缓冲但尚未读取的信号
    pub fn discard_pending(&mut self) -> usize {
        let mut discarded = 0;
        while let Ok(signal) = self.receiver.try_recv() {
            debug!("丢弃过期信号: {}", signal.describe());
            self.sequencer.discard(&signal);
            discarded += 1;
        }
        discarded
    }

    pub fn sequencer(&self) -> &SignalSequencer {
        &self.sequencer
    }

    pub fn sequencer_mut(&mut self) -> &mut SignalSequencer {
        &mut self.sequencer
    }

    pub fn close(&mut self) {
        self.receiver.close();
    }
}
