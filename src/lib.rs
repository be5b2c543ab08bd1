//! # Fig to PSD
//!
//! 驱动远程网页编辑器，把 .fig 设计文件转换成 .psd
//!
//! ## 架构设计
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - `JsExecutor`，在页面里执行脚本并解析返回值
//!
//! ### ② 浏览器层（Browser）
//! - `BrowserController` / `DocumentChannel` - 核心流程依赖的接口
//! - `ChromiumController` - 基于 chromiumoxide 的实现
//! - `SessionManager` / `BrowserSession` - 一个任务一个进程，只释放一次
//!
//! ### ③ 协议层（Protocol）
//! - `SignalSequencer` - 按阶段解释编辑器发来的哨兵
//! - `DocumentHandshake` → `PayloadTransfer` → `ExportProtocol`
//! - `TimeoutGovernor` - 每个阶段独立的期限
//!
//! ### ④ 编排层（Orchestration）
//! - `RequestCoordinator` - 单个转换，错误分类
//! - `App` - 批量调度、并发控制、结果落盘
//!
//! ## 模块结构

pub mod browser;
pub mod config;
pub mod error;
pub mod infrastructure;
pub mod models;
pub mod orchestrator;
pub mod protocol;
pub mod services;
pub mod utils;

// 重新导出常用类型
pub use browser::{BrowserController, ChromiumController, DocumentChannel};
pub use config::Config;
pub use error::{ConversionError, ErrorKind};
pub use infrastructure::JsExecutor;
pub use models::{ConversionJob, ConversionResult, ProtocolSignal};
pub use orchestrator::{App, ProcessingStats, RequestCoordinator};
