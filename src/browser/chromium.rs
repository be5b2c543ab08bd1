//! 基于 chromiumoxide 的浏览器控制器

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chromiumoxide::cdp::js_protocol::runtime::{AddBindingParams, EventBindingCalled};
use chromiumoxide::{Browser, BrowserConfig};
use futures::StreamExt;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::browser::bridge::{self, BINDING_NAME};
use crate::browser::controller::{
    BrowserController, ChannelState, DocumentChannel, DocumentContext, LaunchOptions, ProcessHandle,
};
use crate::config::Config;
use crate::error::{ChannelError, ControllerError};
use crate::infrastructure::JsExecutor;
use crate::models::ProtocolSignal;

/// 一个已启动的浏览器进程
///
/// 每个进程一把锁，map 的锁只在查找和增删时持有
struct LaunchedBrowser {
    browser: Mutex<Browser>,
    handler: JoinHandle<()>,
    profile_dir: PathBuf,
}

/// 每次转换启动一个独立的无头浏览器
pub struct ChromiumController {
    sentinel: String,
    chunk_size: usize,
    browsers: Mutex<HashMap<u64, Arc<LaunchedBrowser>>>,
    next_id: AtomicU64,
}

impl ChromiumController {
    pub fn new(sentinel: impl Into<String>, chunk_size: usize) -> Self {
        Self {
            sentinel: sentinel.into(),
            chunk_size: chunk_size.max(4),
            browsers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.sentinel.clone(), config.transfer_chunk_bytes)
    }

    /// 当前仍存活的进程数量
    pub async fn live_processes(&self) -> usize {
        self.browsers.lock().await.len()
    }
}

#[async_trait]
impl BrowserController for ChromiumController {
    async fn launch(&self, options: &LaunchOptions) -> Result<ProcessHandle, ControllerError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let profile_dir =
            std::env::temp_dir().join(format!("fig-to-psd-{}-{}", std::process::id(), id));
        debug!("🚀 启动无头浏览器 #{} (profile: {})", id, profile_dir.display());

        // 配置无头浏览器
        let mut builder = BrowserConfig::builder()
            .user_data_dir(&profile_dir)
            .launch_timeout(options.launch_timeout)
            .args(options.args.clone());
        builder = if options.headless {
            builder.new_headless_mode()
        } else {
            builder.with_head()
        };
        if let Some(executable) = &options.executable {
            builder = builder.chrome_executable(executable);
        }
        let config = builder.build().map_err(|e| {
            error!("配置无头浏览器失败: {}", e);
            ControllerError::Launch(format!("配置无头浏览器失败: {}", e))
        })?;

        // 启动浏览器
        let (browser, mut handler) = Browser::launch(config).await.map_err(|e| {
            error!("启动无头浏览器失败: {}", e);
            ControllerError::Launch(e.to_string())
        })?;

        // 在后台处理浏览器事件
        let handler = tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if let Err(e) = h {
                    debug!("浏览器事件处理出错: {}", e);
                }
            }
        });

        self.browsers.lock().await.insert(
            id,
            Arc::new(LaunchedBrowser {
                browser: Mutex::new(browser),
                handler,
                profile_dir,
            }),
        );
        info!("✅ 无头浏览器 #{} 已启动", id);
        Ok(ProcessHandle::new(id, "chromium"))
    }

    async fn new_context(
        &self,
        process: &ProcessHandle,
        editor_url: &str,
    ) -> Result<DocumentContext, ControllerError> {
        let launched = self
            .browsers
            .lock()
            .await
            .get(&process.id())
            .cloned()
            .ok_or_else(|| ControllerError::Context(format!("进程 {} 不存在", process)))?;

        let page = launched
            .browser
            .lock()
            .await
            .new_page("about:blank")
            .await
            .map_err(|e| ControllerError::Context(format!("创建页面失败: {}", e)))?;

        // binding 在导航之前装好，信号队列在此之前建好
        page.execute(AddBindingParams::new(BINDING_NAME))
            .await
            .map_err(|e| ControllerError::Context(format!("注册 binding 失败: {}", e)))?;
        let mut events = page
            .event_listener::<EventBindingCalled>()
            .await
            .map_err(|e| ControllerError::Context(format!("订阅 binding 事件失败: {}", e)))?;

        let (sender, signals) = mpsc::unbounded_channel();
        let pump = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                if event.name != BINDING_NAME {
                    continue;
                }
                let signal = ProtocolSignal::from_wire(&event.payload);
                debug!("📨 收到页面信号: {}", signal.describe());
                if sender.send(signal).is_err() {
                    break;
                }
            }
        });

        if let Err(e) = page.set_content(bridge::host_document(editor_url, &self.sentinel)).await {
            pump.abort();
            return Err(ControllerError::Context(format!("导航到 {} 失败: {}", editor_url, e)));
        }
        debug!("页面导航成功: {}", editor_url);

        let channel = ChromiumChannel {
            executor: JsExecutor::new(page),
            pump,
            chunk_size: self.chunk_size,
        };
        Ok(DocumentContext {
            channel: Arc::new(channel),
            signals,
        })
    }

    async fn terminate(&self, process: &ProcessHandle) -> Result<(), ControllerError> {
        let Some(launched) = self.browsers.lock().await.remove(&process.id()) else {
            debug!("进程 {} 已终止，跳过", process);
            return Ok(());
        };

        let mut failure = None;
        {
            let mut browser = launched.browser.lock().await;
            if let Err(e) = browser.close().await {
                warn!("关闭浏览器 {} 失败，尝试强制结束: {}", process, e);
                failure = Some(e.to_string());
                if let Some(Err(kill_err)) = browser.kill().await {
                    failure = Some(format!("{}; kill: {}", e, kill_err));
                }
            }
            if let Err(e) = browser.wait().await {
                debug!("等待浏览器 {} 退出失败: {}", process, e);
            }
        }
        launched.handler.abort();

        if let Err(e) = tokio::fs::remove_dir_all(&launched.profile_dir).await {
            debug!("删除 profile 目录失败 ({}): {}", launched.profile_dir.display(), e);
        }

        match failure {
            Some(message) => Err(ControllerError::Terminate(message)),
            None => Ok(()),
        }
    }
}

/// 页面通道：通过 `window.__oe` 桥接对象与编辑器通信
struct ChromiumChannel {
    executor: JsExecutor,
    pump: JoinHandle<()>,
    chunk_size: usize,
}

#[async_trait]
impl DocumentChannel for ChromiumChannel {
    async fn post_binary(&self, bytes: &[u8]) -> Result<(), ChannelError> {
        let encoded = STANDARD.encode(bytes);
        let mut chunks = 0;
        // base64 只含 ASCII，按字节切分不会切坏字符
        for chunk in encoded.as_bytes().chunks(self.chunk_size) {
            let chunk = String::from_utf8_lossy(chunk);
            self.executor
                .call_bridge::<JsonValue>("stage", &[JsonValue::from(chunk.as_ref())])
                .await?;
            chunks += 1;
        }
        let acknowledged: usize = self.executor.call_bridge("commit", &[]).await?;
        debug!("📤 已投递 {} 字节 ({} 块)", acknowledged, chunks);
        if acknowledged != bytes.len() {
            return Err(ChannelError::Truncated {
                sent: bytes.len(),
                acknowledged,
            });
        }
        Ok(())
    }

    async fn post_command(&self, command: &str) -> Result<(), ChannelError> {
        self.executor
            .call_bridge::<JsonValue>("command", &[JsonValue::from(command)])
            .await?;
        Ok(())
    }

    async fn read_state(&self) -> Result<ChannelState, ChannelError> {
        self.executor.call_bridge("snapshot", &[]).await
    }

    async fn reset_state(&self) -> Result<(), ChannelError> {
        self.executor.call_bridge::<JsonValue>("reset", &[]).await?;
        Ok(())
    }

    async fn close(&self) {
        self.pump.abort();
        if let Err(e) = self.executor.page().clone().close().await {
            debug!("关闭页面失败（已忽略）: {}", e);
        }
    }
}
