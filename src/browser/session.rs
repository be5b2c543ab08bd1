//! 浏览器会话管理
//!
//! 一个任务 = 一个浏览器进程 + 一个页面，不共享、不复用。
//! 会话只释放一次：正常路径调用 `release()`；如果会话在未释放的情况下被丢弃
//! （任务被取消、panic），`Drop` 会在当前运行时上补做终止。

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, warn};

use crate::browser::controller::{BrowserController, DocumentChannel, LaunchOptions, ProcessHandle};
use crate::error::ControllerError;
use crate::protocol::sequencer::{SentinelPolicy, SignalInbox};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// 独占的浏览器会话
pub struct BrowserSession {
    id: u64,
    process: Option<ProcessHandle>,
    channel: Option<Arc<dyn DocumentChannel>>,
    inbox: Option<SignalInbox>,
    is_open: AtomicBool,
    controller: Arc<dyn BrowserController>,
    permit: Option<OwnedSemaphorePermit>,
}

impl BrowserSession {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_open(&self) -> bool {
        self.is_open.load(Ordering::SeqCst)
    }

    pub fn process(&self) -> Option<&ProcessHandle> {
        self.process.as_ref()
    }

    /// 页面通道；会话已释放时为 None
    pub fn channel(&self) -> Option<Arc<dyn DocumentChannel>> {
        self.channel.clone()
    }

    pub fn inbox_mut(&mut self) -> Option<&mut SignalInbox> {
        self.inbox.as_mut()
    }

    /// 同时借出通道和收件箱，供各阶段使用
    pub fn parts(&mut self) -> Option<(Arc<dyn DocumentChannel>, &mut SignalInbox)> {
        let channel = self.channel.clone()?;
        let inbox = self.inbox.as_mut()?;
        Some((channel, inbox))
    }

    /// 释放会话：关闭页面、终止进程
    ///
    /// 可重复调用；终止时的次生错误只记录不返回
    pub async fn release(&mut self) {
        if !self.is_open.swap(false, Ordering::SeqCst) {
            debug!("[会话 {}] 已释放，跳过", self.id);
            return;
        }

        if let Some(mut inbox) = self.inbox.take() {
            inbox.close();
        }
        if let Some(channel) = self.channel.take() {
            channel.close().await;
        }
        if let Some(process) = self.process.take() {
            match self.controller.terminate(&process).await {
                Ok(()) => debug!("[会话 {}] 🧹 浏览器进程 {} 已终止", self.id, process),
                Err(e) => warn!(
                    "[会话 {}] ⚠️ 终止浏览器进程 {} 出错（已忽略）: {}",
                    self.id, process, e
                ),
            }
        }
        self.permit.take();
        info!("[会话 {}] 会话已释放", self.id);
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        if !self.is_open.swap(false, Ordering::SeqCst) {
            return;
        }
        warn!("[会话 {}] ⚠️ 会话未显式释放，后台终止浏览器进程", self.id);

        let channel = self.channel.take();
        let process = self.process.take();
        // 许可证跟着后台任务走，进程真正结束后才让出名额
        let permit = self.permit.take();
        spawn_teardown(self.id, self.controller.clone(), channel, process, permit);
    }
}

/// 在当前运行时上补做终止；没有运行时只能记录
fn spawn_teardown(
    id: u64,
    controller: Arc<dyn BrowserController>,
    channel: Option<Arc<dyn DocumentChannel>>,
    process: Option<ProcessHandle>,
    permit: Option<OwnedSemaphorePermit>,
) {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(async move {
                if let Some(channel) = channel {
                    channel.close().await;
                }
                if let Some(process) = process {
                    if let Err(e) = controller.terminate(&process).await {
                        warn!("[会话 {}] ⚠️ 后台终止出错（已忽略）: {}", id, e);
                    }
                }
                drop(permit);
            });
        }
        Err(_) => warn!("[会话 {}] ⚠️ 没有可用的运行时，浏览器进程可能残留", id),
    }
}

/// 进程已启动、会话还没建好时的守卫
///
/// 获取过程被取消（外层超时、任务中止）时，由 `Drop` 终止进程
struct LaunchGuard {
    id: u64,
    process: Option<ProcessHandle>,
    controller: Arc<dyn BrowserController>,
    permit: Option<OwnedSemaphorePermit>,
}

impl LaunchGuard {
    /// 交出进程和许可证，守卫不再负责清理
    fn disarm(mut self) -> (Option<ProcessHandle>, Option<OwnedSemaphorePermit>) {
        (self.process.take(), self.permit.take())
    }
}

impl Drop for LaunchGuard {
    fn drop(&mut self) {
        let Some(process) = self.process.take() else {
            return;
        };
        warn!("[会话 {}] ⚠️ 会话创建被中断，后台终止浏览器进程 {}", self.id, process);
        spawn_teardown(self.id, self.controller.clone(), None, Some(process), self.permit.take());
    }
}

/// 会话管理器
///
/// 用信号量限制同时存在的浏览器进程数量
pub struct SessionManager {
    controller: Arc<dyn BrowserController>,
    options: LaunchOptions,
    editor_url: String,
    policy: Arc<dyn SentinelPolicy>,
    permits: Arc<Semaphore>,
}

impl SessionManager {
    pub fn new(
        controller: Arc<dyn BrowserController>,
        options: LaunchOptions,
        editor_url: impl Into<String>,
        policy: Arc<dyn SentinelPolicy>,
        max_sessions: usize,
    ) -> Self {
        Self {
            controller,
            options,
            editor_url: editor_url.into(),
            policy,
            permits: Arc::new(Semaphore::new(max_sessions.max(1))),
        }
    }

    pub fn set_policy(&mut self, policy: Arc<dyn SentinelPolicy>) {
        self.policy = policy;
    }

    pub fn options(&self) -> &LaunchOptions {
        &self.options
    }

    /// 启动进程并打开编辑器页面
    ///
    /// 页面创建失败时，已经启动的进程会先被终止再返回错误；
    /// 获取过程中被取消时，已经启动的进程由守卫在后台终止
    pub async fn acquire(&self) -> Result<BrowserSession, ControllerError> {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ControllerError::PermitClosed)?;
        let id = NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed);

        let process = self.controller.launch(&self.options).await?;
        debug!("[会话 {}] 浏览器进程 {} 已启动", id, process);
        let guard = LaunchGuard {
            id,
            process: Some(process.clone()),
            controller: self.controller.clone(),
            permit: Some(permit),
        };

        let context = match self.controller.new_context(&process, &self.editor_url).await {
            Ok(context) => context,
            Err(e) => {
                // 终止期间被取消时守卫会再终止一次，终止本身可重入
                if let Err(cleanup) = self.controller.terminate(&process).await {
                    warn!("[会话 {}] ⚠️ 清理半初始化进程出错（已忽略）: {}", id, cleanup);
                }
                guard.disarm();
                return Err(e);
            }
        };
        let (process, permit) = guard.disarm();
        info!("[会话 {}] 🌐 已打开编辑器页面: {}", id, self.editor_url);

        Ok(BrowserSession {
            id,
            process,
            channel: Some(context.channel),
            inbox: Some(SignalInbox::new(context.signals, self.policy.clone())),
            is_open: AtomicBool::new(true),
            controller: self.controller.clone(),
            permit,
        })
    }

    /// 释放会话（委托给 `BrowserSession::release`）
    pub async fn release(&self, session: &mut BrowserSession) {
        session.release().await;
    }
}
