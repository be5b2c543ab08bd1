//! 浏览器控制器接口
//!
//! 核心流程只通过这两个 trait 与浏览器打交道：
//! - `BrowserController`：启动进程、创建页面上下文、终止进程
//! - `DocumentChannel`：向页面里的编辑器投递数据和命令、读取轮询状态

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::config::Config;
use crate::error::{ChannelError, ControllerError};
use crate::models::ProtocolSignal;

/// 启动参数
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub headless: bool,
    /// 自带浏览器时的可执行文件路径
    pub executable: Option<PathBuf>,
    /// 隔离参数（沙盒、共享内存、GPU 等）
    pub args: Vec<String>,
    pub launch_timeout: Duration,
}

impl LaunchOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            headless: config.headless,
            executable: config.chrome_executable.as_ref().map(PathBuf::from),
            args: config.browser_args.clone(),
            launch_timeout: config.launch_budget(),
        }
    }
}

/// 已启动的浏览器进程
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProcessHandle {
    id: u64,
    label: String,
}

impl ProcessHandle {
    pub fn new(id: u64, label: impl Into<String>) -> Self {
        Self {
            id,
            label: label.into(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl fmt::Display for ProcessHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.label, self.id)
    }
}

/// 页面桥接脚本暴露的轮询状态
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct ChannelState {
    /// 已收到的哨兵总数
    pub sentinels: u32,
    /// 自上次 reset 以来是否收到过哨兵
    pub done: bool,
}

/// 新建的页面上下文：发送端 + 信号队列的接收端
pub struct DocumentContext {
    pub channel: Arc<dyn DocumentChannel>,
    pub signals: mpsc::UnboundedReceiver<ProtocolSignal>,
}

/// 与页面中编辑器通信的能力
#[async_trait]
pub trait DocumentChannel: Send + Sync {
    /// 以原始 ArrayBuffer 投递数据（不加任何封装）
    async fn post_binary(&self, bytes: &[u8]) -> Result<(), ChannelError>;

    /// 投递脚本命令字符串
    async fn post_command(&self, command: &str) -> Result<(), ChannelError>;

    /// 读取轮询状态
    async fn read_state(&self) -> Result<ChannelState, ChannelError>;

    /// 清除 done 标志
    async fn reset_state(&self) -> Result<(), ChannelError>;

    /// 停止事件转发并关闭页面；不会失败
    async fn close(&self);
}

/// 浏览器进程控制器
#[async_trait]
pub trait BrowserController: Send + Sync {
    async fn launch(&self, options: &LaunchOptions) -> Result<ProcessHandle, ControllerError>;

    /// 在进程中打开一个页面并载入编辑器
    async fn new_context(
        &self,
        process: &ProcessHandle,
        editor_url: &str,
    ) -> Result<DocumentContext, ControllerError>;

    /// 终止进程；对未知或已终止的进程返回 Ok
    async fn terminate(&self, process: &ProcessHandle) -> Result<(), ControllerError>;
}
