//! 转换协议层
//!
//! ```text
//! handshake (等编辑器就绪)
//!     ↓
//! transfer  (投递源文件，等加载完成)
//!     ↓
//! export    (发导出命令，等二进制结果 + 尾随哨兵，校验文件头)
//! ```
//!
//! 每个阶段只返回自己的 `PhaseOutcome`，由协调器统一分类。

pub mod export;
pub mod governor;
pub mod handshake;
pub mod readiness;
pub mod sequencer;
pub mod transfer;

pub use export::{export_command, validate_signature, ExportProtocol, TargetFormat};
pub use governor::{Phase, PhaseFailure, PhaseOutcome, TimeoutGovernor};
pub use handshake::{DocumentHandshake, HandshakeState};
pub use readiness::{readiness_for, EventReadiness, PollingReadiness, ReadinessWaiter};
pub use sequencer::{
    Interpretation, PositionalPolicy, SentinelMeaning, SentinelPolicy, SignalInbox, SignalSequencer,
    Stage,
};
pub use transfer::{LoadCompletion, LoadOutcome, PayloadTransfer};
