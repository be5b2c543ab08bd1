//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责批量处理和流程调度，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `batch_processor` - 批量转换处理器
//! - 管理应用生命周期（初始化、运行）
//! - 收集待转换文件（命令行参数或输入目录）
//! - 控制并发数量（Semaphore）
//! - 写输出文件和报告，输出全局统计信息
//!
//! ### `coordinator` - 单个转换的协调器
//! - 获取会话，依次执行握手、传输、导出
//! - 保证会话只释放一次
//! - 把失败分类成 `ConversionError`
//!
//! ## 层次关系
//!
//! ```text
//! batch_processor (处理 Vec<PathBuf>)
//!     ↓
//! coordinator (处理单个 ConversionJob)
//!     ↓
//! protocol (handshake / transfer / export)
//!     ↓
//! browser (SessionManager / BrowserController / DocumentChannel)
//! ```

pub mod batch_processor;
pub mod coordinator;

pub use batch_processor::{App, ProcessingStats};
pub use coordinator::{classify, RequestCoordinator};
