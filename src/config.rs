//! 程序配置
//!
//! 默认值 → TOML 文件（`CONFIG_FILE`）→ 环境变量，后者覆盖前者

use std::path::Path;
use std::time::Duration;

use regex::Regex;
use serde::Deserialize;

use crate::error::ConfigError;

/// 编辑器就绪的检测方式
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionStrategy {
    /// 订阅页面消息事件
    #[default]
    Event,
    /// 轮询页面状态
    Polling,
}

impl DetectionStrategy {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "event" => Some(Self::Event),
            "polling" | "poll" => Some(Self::Polling),
            _ => None,
        }
    }
}

/// 哨兵信号的消歧方式
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SentinelMode {
    /// 某阶段等待期间收到的第一个哨兵即完成该阶段
    #[default]
    PhaseRelative,
    /// 严格按序号：第 1 个 = 就绪，第 2 个 = 加载完成
    StrictOrdinal,
}

impl SentinelMode {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "phase_relative" => Some(Self::PhaseRelative),
            "strict_ordinal" => Some(Self::StrictOrdinal),
            _ => None,
        }
    }
}

/// 程序配置文件
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    // --- 远程编辑器 ---
    /// 远程编辑器地址
    pub editor_url: String,
    /// 编辑器表示"操作完成"的哨兵字符串
    pub sentinel: String,
    /// 导出格式标记（saveToOE 的参数）
    pub target_format: String,
    /// 目标格式的 4 字节文件头
    pub target_magic: String,
    /// 接受的源文件后缀
    pub source_suffix: String,
    /// 源文件大小上限（字节）
    pub max_input_bytes: usize,

    // --- 浏览器 ---
    pub headless: bool,
    /// 自带浏览器时的可执行文件路径
    pub chrome_executable: Option<String>,
    /// 隔离启动参数
    pub browser_args: Vec<String>,

    // --- 各阶段期限（毫秒） ---
    pub launch_timeout_ms: u64,
    pub handshake_timeout_ms: u64,
    pub load_timeout_ms: u64,
    pub export_timeout_ms: u64,
    pub poll_interval_ms: u64,

    // --- 协议行为 ---
    pub detection: DetectionStrategy,
    pub sentinel_mode: SentinelMode,
    /// 导出二进制之后是否还要等待尾随哨兵
    pub await_export_trailer: bool,
    /// 等待期间收到无法识别的信号是否直接失败
    pub strict_signals: bool,
    /// 降级模式：不等加载完成信号，固定等待这么久
    pub load_settle_delay_ms: Option<u64>,
    /// 每次页面调用传输的 base64 字符数
    pub transfer_chunk_bytes: usize,

    // --- 批处理 ---
    /// 同时运行的转换任务（浏览器进程）上限
    pub max_concurrent_jobs: usize,
    pub input_folder: String,
    pub output_folder: String,
    pub output_log_file: String,
    pub report_file: String,
    /// 是否显示详细日志
    pub verbose_logging: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            editor_url: "https://www.photopea.com".to_string(),
            sentinel: "done".to_string(),
            target_format: "psd".to_string(),
            target_magic: "8BPS".to_string(),
            source_suffix: ".fig".to_string(),
            max_input_bytes: 200 * 1024 * 1024,
            headless: true,
            chrome_executable: None,
            browser_args: vec![
                "--no-sandbox".to_string(),
                "--disable-gpu".to_string(),
                "--disable-dev-shm-usage".to_string(),
                "--no-first-run".to_string(),
                "--no-default-browser-check".to_string(),
                "--disable-extensions".to_string(),
                "--mute-audio".to_string(),
            ],
            launch_timeout_ms: 30_000,
            handshake_timeout_ms: 60_000,
            load_timeout_ms: 45_000,
            export_timeout_ms: 60_000,
            poll_interval_ms: 250,
            detection: DetectionStrategy::Event,
            sentinel_mode: SentinelMode::PhaseRelative,
            await_export_trailer: true,
            strict_signals: false,
            load_settle_delay_ms: None,
            transfer_chunk_bytes: 256 * 1024,
            max_concurrent_jobs: 4,
            input_folder: "input".to_string(),
            output_folder: "output".to_string(),
            output_log_file: "output.txt".to_string(),
            report_file: "conversion_report.jsonl".to_string(),
            verbose_logging: false,
        }
    }
}

impl Config {
    /// 读取 `CONFIG_FILE` 指定的 TOML（如有），再应用环境变量覆盖
    pub fn load() -> Result<Self, ConfigError> {
        let base = match std::env::var("CONFIG_FILE") {
            Ok(path) if !path.trim().is_empty() => Self::from_toml_file(path.trim())?,
            _ => Self::default(),
        };
        let config = base.with_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// 默认值 + 环境变量
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// 从 TOML 文件读取，缺省字段取默认值
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    fn with_env_overrides(self) -> Self {
        let d = self;
        Self {
            editor_url: env_string("EDITOR_URL").unwrap_or(d.editor_url),
            sentinel: env_string("EDITOR_SENTINEL").unwrap_or(d.sentinel),
            target_format: env_string("TARGET_FORMAT").unwrap_or(d.target_format),
            target_magic: env_string("TARGET_MAGIC").unwrap_or(d.target_magic),
            source_suffix: env_string("SOURCE_SUFFIX").unwrap_or(d.source_suffix),
            max_input_bytes: env_parse("MAX_INPUT_BYTES").unwrap_or(d.max_input_bytes),
            headless: env_parse("HEADLESS").unwrap_or(d.headless),
            chrome_executable: env_string("CHROME_EXECUTABLE").or(d.chrome_executable),
            browser_args: env_string("BROWSER_ARGS")
                .map(|v| v.split_whitespace().map(str::to_string).collect())
                .unwrap_or(d.browser_args),
            launch_timeout_ms: env_parse("LAUNCH_TIMEOUT_MS").unwrap_or(d.launch_timeout_ms),
            handshake_timeout_ms: env_parse("HANDSHAKE_TIMEOUT_MS")
                .unwrap_or(d.handshake_timeout_ms),
            load_timeout_ms: env_parse("LOAD_TIMEOUT_MS").unwrap_or(d.load_timeout_ms),
            export_timeout_ms: env_parse("EXPORT_TIMEOUT_MS").unwrap_or(d.export_timeout_ms),
            poll_interval_ms: env_parse("POLL_INTERVAL_MS").unwrap_or(d.poll_interval_ms),
            detection: env_string("DETECTION")
                .and_then(|v| DetectionStrategy::parse(&v))
                .unwrap_or(d.detection),
            sentinel_mode: env_string("SENTINEL_MODE")
                .and_then(|v| SentinelMode::parse(&v))
                .unwrap_or(d.sentinel_mode),
            await_export_trailer: env_parse("AWAIT_EXPORT_TRAILER")
                .unwrap_or(d.await_export_trailer),
            strict_signals: env_parse("STRICT_SIGNALS").unwrap_or(d.strict_signals),
            load_settle_delay_ms: env_parse("LOAD_SETTLE_DELAY_MS").or(d.load_settle_delay_ms),
            transfer_chunk_bytes: env_parse("TRANSFER_CHUNK_BYTES")
                .unwrap_or(d.transfer_chunk_bytes),
            max_concurrent_jobs: env_parse("MAX_CONCURRENT_JOBS").unwrap_or(d.max_concurrent_jobs),
            input_folder: env_string("INPUT_FOLDER").unwrap_or(d.input_folder),
            output_folder: env_string("OUTPUT_FOLDER").unwrap_or(d.output_folder),
            output_log_file: env_string("OUTPUT_LOG_FILE").unwrap_or(d.output_log_file),
            report_file: env_string("REPORT_FILE").unwrap_or(d.report_file),
            verbose_logging: env_parse("VERBOSE_LOGGING").unwrap_or(d.verbose_logging),
        }
    }

    /// 检查配置是否可用
    pub fn validate(&self) -> Result<(), ConfigError> {
        let token = Regex::new(r"^[A-Za-z0-9]{1,8}$")
            .map_err(|e| ConfigError::invalid("target_format", e.to_string()))?;
        if !token.is_match(&self.target_format) {
            return Err(ConfigError::invalid(
                "target_format",
                format!("'{}' 不是合法的格式标记", self.target_format),
            ));
        }
        if self.target_magic.len() != 4 {
            return Err(ConfigError::invalid(
                "target_magic",
                format!("需要 4 个字节, 实际 {} 个", self.target_magic.len()),
            ));
        }
        if self.sentinel.is_empty() {
            return Err(ConfigError::invalid("sentinel", "不能为空"));
        }
        for (key, value) in [
            ("launch_timeout_ms", self.launch_timeout_ms),
            ("handshake_timeout_ms", self.handshake_timeout_ms),
            ("load_timeout_ms", self.load_timeout_ms),
            ("export_timeout_ms", self.export_timeout_ms),
            ("poll_interval_ms", self.poll_interval_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::invalid(key, "必须大于 0"));
            }
        }
        if self.max_concurrent_jobs == 0 {
            return Err(ConfigError::invalid("max_concurrent_jobs", "必须大于 0"));
        }
        if self.transfer_chunk_bytes == 0 {
            return Err(ConfigError::invalid("transfer_chunk_bytes", "必须大于 0"));
        }
        Ok(())
    }

    /// 目标格式文件头
    pub fn magic_bytes(&self) -> [u8; 4] {
        let mut magic = [0u8; 4];
        for (slot, byte) in magic.iter_mut().zip(self.target_magic.bytes()) {
            *slot = byte;
        }
        magic
    }

    pub fn launch_budget(&self) -> Duration {
        Duration::from_millis(self.launch_timeout_ms)
    }

    pub fn handshake_budget(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn load_budget(&self) -> Duration {
        Duration::from_millis(self.load_timeout_ms)
    }

    pub fn export_budget(&self) -> Duration {
        Duration::from_millis(self.export_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn settle_delay(&self) -> Option<Duration> {
        self.load_settle_delay_ms.map(Duration::from_millis)
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}
