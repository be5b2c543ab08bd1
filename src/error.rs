use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

/// 转换失败的分类
///
/// 所有分类对当前任务都是终止性的，内部不做重试
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// 浏览器进程无法启动（或页面上下文无法创建）
    ProcessLaunch,
    /// 编辑器初始化信号未在期限内到达
    HandshakeTimeout,
    /// 文件加载完成信号未在期限内到达
    LoadTimeout,
    /// 导出结果未在期限内到达
    ExportTimeout,
    /// 消息通道异常（通道关闭、脚本失败、无法解析的信号）
    ChannelProtocol,
    /// 导出结果的文件头签名不匹配
    Validation,
    /// 导出结果为空
    EmptyResult,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ProcessLaunch => "process_launch",
            ErrorKind::HandshakeTimeout => "handshake_timeout",
            ErrorKind::LoadTimeout => "load_timeout",
            ErrorKind::ExportTimeout => "export_timeout",
            ErrorKind::ChannelProtocol => "channel_protocol",
            ErrorKind::Validation => "validation",
            ErrorKind::EmptyResult => "empty_result",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 浏览器控制器错误
#[derive(Debug, Error)]
pub enum ControllerError {
    /// 启动浏览器进程失败
    #[error("浏览器进程启动失败: {0}")]
    Launch(String),
    /// 创建页面上下文失败
    #[error("创建页面上下文失败: {0}")]
    Context(String),
    /// 终止浏览器进程失败
    #[error("终止浏览器进程失败: {0}")]
    Terminate(String),
    /// 会话并发许可已关闭
    #[error("会话许可不可用")]
    PermitClosed,
}

/// 页面消息通道错误
#[derive(Debug, Error)]
pub enum ChannelError {
    /// 信号队列已关闭（页面崩溃或事件泵退出）
    #[error("消息通道已关闭")]
    Closed,
    /// 页面脚本执行失败
    #[error("页面脚本执行失败: {0}")]
    Script(String),
    /// 收到无法识别的信号
    #[error("无法识别的信号: {0}")]
    Unrecognized(String),
    /// 导出结果到达了，但数据已损坏
    #[error("导出数据已损坏: {0}")]
    MalformedPayload(String),
    /// 投递的数据长度与页面确认的不一致
    #[error("数据投递不完整: 发送 {sent} 字节, 页面确认 {acknowledged} 字节")]
    Truncated { sent: usize, acknowledged: usize },
}

/// 导出结果缺陷
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResultDefect {
    #[error("导出结果为空")]
    Empty,
    #[error("导出结果签名不匹配: 期望 {}, 实际 {}", hex(.expected), hex(.observed))]
    BadSignature { expected: [u8; 4], observed: Vec<u8> },
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("配置项 {key} 无效: {reason}")]
    Invalid { key: &'static str, reason: String },
    #[error("读取配置文件失败 ({}): {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("TOML解析失败 ({}): {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

impl ConfigError {
    pub fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// 输入文件错误（"bad input"，与转换失败区分）
#[derive(Debug, Error)]
pub enum IntakeError {
    #[error("不支持的文件类型: {name} (需要 {expected} 后缀)")]
    UnsupportedSuffix { name: String, expected: String },
    #[error("文件为空: {name}")]
    Empty { name: String },
    #[error("文件过大: {name} ({size} 字节, 上限 {limit} 字节)")]
    TooLarge {
        name: String,
        size: usize,
        limit: usize,
    },
    #[error("读取文件失败 ({}): {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// 已分类的转换错误
///
/// 由协调器统一产生，携带分类、可读信息和失败时已耗时间
#[derive(Debug, Clone, Error)]
#[error("[{kind}] {message} (耗时 {elapsed:?})")]
pub struct ConversionError {
    pub kind: ErrorKind,
    pub message: String,
    pub elapsed: Duration,
    /// 签名校验失败时观察到的文件头
    pub observed_header: Option<Vec<u8>>,
}

impl ConversionError {
    pub fn new(kind: ErrorKind, message: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            kind,
            message: message.into(),
            elapsed,
            observed_header: None,
        }
    }

    pub fn with_observed_header(mut self, header: Vec<u8>) -> Self {
        self.observed_header = Some(header);
        self
    }
}

// ========== 辅助函数 ==========

/// 以大写十六进制显示字节（用于日志和报告）
pub fn hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_formatting() {
        assert_eq!(hex(b"8BPS"), "38 42 50 53");
        assert_eq!(hex(&[]), "");
    }

    #[test]
    fn test_bad_signature_message_shows_both_headers() {
        let defect = ResultDefect::BadSignature {
            expected: *b"8BPS",
            observed: vec![0x50, 0x4B, 0x03, 0x04],
        };
        let message = defect.to_string();
        assert!(message.contains("38 42 50 53"));
        assert!(message.contains("50 4B 03 04"));
    }

    #[test]
    fn test_conversion_error_display_includes_kind() {
        let err = ConversionError::new(
            ErrorKind::LoadTimeout,
            "加载超时",
            Duration::from_millis(1500),
        );
        assert!(err.to_string().starts_with("[load_timeout]"));
    }
}
