//! 测试用的脚本化浏览器：按预设脚本回放编辑器的行为

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use fig_to_psd::browser::{
    BrowserController, ChannelState, DocumentChannel, DocumentContext, LaunchOptions, ProcessHandle,
};
use fig_to_psd::error::{ChannelError, ControllerError};
use fig_to_psd::{Config, ProtocolSignal};
use tokio::sync::mpsc;

/// 一个会话里编辑器的行为
#[derive(Debug, Clone)]
pub struct PeerScript {
    pub fail_launch: bool,
    /// 页面打开后先发一条无法解析的消息
    pub noise_on_open: bool,
    pub ready_on_open: bool,
    pub ready_after_load: bool,
    /// 导出命令的回复；None 表示不回复
    pub export_reply: Option<Vec<u8>>,
    pub trailing_sentinel: bool,
    /// 回复导出命令前的延迟
    pub reply_delay: Duration,
    /// 导出时回一个 base64 损坏的二进制消息
    pub export_malformed: bool,
    /// 打开文档上下文前的延迟
    pub context_delay: Duration,
    pub fail_context: bool,
    pub fail_terminate: bool,
}

impl Default for PeerScript {
    fn default() -> Self {
        Self {
            fail_launch: false,
            noise_on_open: false,
            ready_on_open: true,
            ready_after_load: true,
            export_reply: Some(psd_bytes(4096)),
            trailing_sentinel: true,
            reply_delay: Duration::ZERO,
            export_malformed: false,
            context_delay: Duration::ZERO,
            fail_context: false,
            fail_terminate: false,
        }
    }
}

/// 以 8BPS 开头的假 PSD
pub fn psd_bytes(len: usize) -> Vec<u8> {
    let mut bytes = b"8BPS".to_vec();
    bytes.resize(len.max(4), 0x5A);
    bytes
}

/// 各阶段期限都很短的配置
pub fn fast_config() -> Config {
    Config {
        launch_timeout_ms: 1_000,
        handshake_timeout_ms: 300,
        load_timeout_ms: 300,
        export_timeout_ms: 300,
        poll_interval_ms: 10,
        max_concurrent_jobs: 4,
        ..Config::default()
    }
}

#[derive(Default)]
pub struct ScriptedController {
    scripts: Mutex<VecDeque<PeerScript>>,
    default_script: PeerScript,
    active: Mutex<HashMap<u64, PeerScript>>,
    next_id: AtomicU64,
    launches: AtomicUsize,
    terminations: AtomicUsize,
    live: AtomicUsize,
    max_live: AtomicUsize,
    terminated_ids: Mutex<Vec<u64>>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl ScriptedController {
    /// 所有会话都使用同一个脚本
    pub fn new(script: PeerScript) -> Self {
        Self {
            default_script: script,
            ..Default::default()
        }
    }

    /// 按顺序给每个会话分配脚本，用完后回到默认脚本
    pub fn with_scripts(scripts: Vec<PeerScript>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            ..Default::default()
        }
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn terminations(&self) -> usize {
        self.terminations.load(Ordering::SeqCst)
    }

    pub fn max_live(&self) -> usize {
        self.max_live.load(Ordering::SeqCst)
    }

    pub fn terminated_ids(&self) -> Vec<u64> {
        self.terminated_ids.lock().unwrap().clone()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count_calls(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }
}

#[async_trait]
impl BrowserController for ScriptedController {
    async fn launch(&self, _options: &LaunchOptions) -> Result<ProcessHandle, ControllerError> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.default_script.clone());
        if script.fail_launch {
            return Err(ControllerError::Launch("scripted launch failure".to_string()));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.active.lock().unwrap().insert(id, script);
        let live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_live.fetch_max(live, Ordering::SeqCst);
        Ok(ProcessHandle::new(id, "scripted"))
    }

    async fn new_context(
        &self,
        process: &ProcessHandle,
        _editor_url: &str,
    ) -> Result<DocumentContext, ControllerError> {
        let script = self
            .active
            .lock()
            .unwrap()
            .get(&process.id())
            .cloned()
            .ok_or_else(|| ControllerError::Context(format!("unknown process {}", process)))?;
        if !script.context_delay.is_zero() {
            tokio::time::sleep(script.context_delay).await;
        }
        if script.fail_context {
            return Err(ControllerError::Context("scripted context failure".to_string()));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let channel = ScriptedChannel {
            process_id: process.id(),
            script,
            tx,
            sentinels: AtomicUsize::new(0),
            done: AtomicBool::new(false),
            calls: self.calls.clone(),
        };
        if channel.script.noise_on_open {
            let _ = channel.tx.send(ProtocolSignal::Unrecognized("<garbage>".to_string()));
        }
        if channel.script.ready_on_open {
            channel.sentinel();
        }

        Ok(DocumentContext {
            channel: Arc::new(channel),
            signals: rx,
        })
    }

    async fn terminate(&self, process: &ProcessHandle) -> Result<(), ControllerError> {
        let Some(script) = self.active.lock().unwrap().remove(&process.id()) else {
            return Ok(());
        };
        self.terminations.fetch_add(1, Ordering::SeqCst);
        self.live.fetch_sub(1, Ordering::SeqCst);
        self.terminated_ids.lock().unwrap().push(process.id());
        if script.fail_terminate {
            return Err(ControllerError::Terminate("scripted terminate failure".to_string()));
        }
        Ok(())
    }
}

struct ScriptedChannel {
    process_id: u64,
    script: PeerScript,
    tx: mpsc::UnboundedSender<ProtocolSignal>,
    sentinels: AtomicUsize,
    done: AtomicBool,
    calls: Arc<Mutex<Vec<String>>>,
}

impl ScriptedChannel {
    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(format!("{}@{}", call, self.process_id));
    }

    fn sentinel(&self) {
        self.sentinels.fetch_add(1, Ordering::SeqCst);
        self.done.store(true, Ordering::SeqCst);
        let _ = self.tx.send(ProtocolSignal::Ready);
    }
}

#[async_trait]
impl DocumentChannel for ScriptedChannel {
    async fn post_binary(&self, bytes: &[u8]) -> Result<(), ChannelError> {
        self.record(format!("post_binary:{}", bytes.len()));
        if self.script.ready_after_load {
            self.sentinel();
        }
        Ok(())
    }

    async fn post_command(&self, command: &str) -> Result<(), ChannelError> {
        self.record(format!("post_command:{}", command));
        if !self.script.reply_delay.is_zero() {
            tokio::time::sleep(self.script.reply_delay).await;
        }
        if self.script.export_malformed {
            let _ = self
                .tx
                .send(ProtocolSignal::from_wire(r#"{"kind":"binary","data":"!!!"}"#));
            self.sentinel();
            return Ok(());
        }
        if let Some(reply) = &self.script.export_reply {
            let _ = self.tx.send(ProtocolSignal::BinaryResult(reply.clone()));
            if self.script.trailing_sentinel {
                self.sentinel();
            }
        }
        Ok(())
    }

    async fn read_state(&self) -> Result<ChannelState, ChannelError> {
        Ok(ChannelState {
            sentinels: self.sentinels.load(Ordering::SeqCst) as u32,
            done: self.done.load(Ordering::SeqCst),
        })
    }

    async fn reset_state(&self) -> Result<(), ChannelError> {
        self.done.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) {
        self.record("close".to_string());
    }
}
