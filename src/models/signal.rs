//! 页面消息通道上收到的信号

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Deserialize;

use crate::utils::logging::truncate_text;

/// 远程编辑器发来的一条信号
///
/// 编辑器不带任何消息标签，含义只能按出现位置推断（见 `protocol::sequencer`）
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolSignal {
    /// 哨兵字符串
    Ready,
    /// 二进制数据
    BinaryResult(Vec<u8>),
    /// 其它文本
    Text(String),
    /// 标记为二进制，但数据无法解码
    MalformedBinary(String),
    /// 无法识别的内容
    Unrecognized(String),
}

/// 桥接脚本通过 CDP binding 传回的 JSON
#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum WireMessage {
    Sentinel,
    Binary { data: String },
    Text { data: String },
    Unknown { data: String },
}

impl ProtocolSignal {
    /// 解析桥接脚本发来的一条消息
    pub fn from_wire(payload: &str) -> Self {
        match serde_json::from_str::<WireMessage>(payload) {
            Ok(WireMessage::Sentinel) => ProtocolSignal::Ready,
            Ok(WireMessage::Binary { data }) => match STANDARD.decode(data.as_bytes()) {
                Ok(bytes) => ProtocolSignal::BinaryResult(bytes),
                Err(e) => ProtocolSignal::MalformedBinary(format!(
                    "二进制数据 base64 无效 ({} 字符): {}",
                    data.len(),
                    e
                )),
            },
            Ok(WireMessage::Text { data }) => ProtocolSignal::Text(data),
            Ok(WireMessage::Unknown { data }) => ProtocolSignal::Unrecognized(data),
            Err(_) => ProtocolSignal::Unrecognized(truncate_text(payload, 120)),
        }
    }

    /// 简短描述（用于日志）
    pub fn describe(&self) -> String {
        match self {
            ProtocolSignal::Ready => "哨兵".to_string(),
            ProtocolSignal::BinaryResult(bytes) => format!("二进制 {} 字节", bytes.len()),
            ProtocolSignal::Text(text) => format!("文本 '{}'", truncate_text(text, 40)),
            ProtocolSignal::MalformedBinary(reason) => format!("损坏的二进制 ({})", reason),
            ProtocolSignal::Unrecognized(raw) => format!("未识别 '{}'", truncate_text(raw, 40)),
        }
    }
}
