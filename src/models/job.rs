//! 转换任务与结果

use std::path::Path;

use chrono::{DateTime, Local};

/// 一次转换任务
///
/// 创建后不可变，由一次协调器运行独占
#[derive(Debug, Clone)]
pub struct ConversionJob {
    source_bytes: Vec<u8>,
    source_name: String,
    requested_at: DateTime<Local>,
}

impl ConversionJob {
    pub fn new(source_bytes: Vec<u8>, source_name: impl Into<String>) -> Self {
        Self {
            source_bytes,
            source_name: source_name.into(),
            requested_at: Local::now(),
        }
    }

    pub fn source_bytes(&self) -> &[u8] {
        &self.source_bytes
    }

    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    pub fn requested_at(&self) -> DateTime<Local> {
        self.requested_at
    }

    /// 把源文件名的后缀换成目标扩展名
    ///
    /// `design.fig` → `design.psd`；没有后缀时直接追加
    pub fn suggested_output_name(&self, extension: &str) -> String {
        let file_name = Path::new(&self.source_name)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.source_name.clone());
        let stem = match file_name.rfind('.') {
            Some(idx) if idx > 0 => &file_name[..idx],
            _ => file_name.as_str(),
        };
        format!("{}.{}", stem, extension)
    }
}

/// 转换结果，所有权直接交给调用方
#[derive(Debug)]
pub struct ConversionResult {
    payload_bytes: Vec<u8>,
    declared_name: String,
}

impl ConversionResult {
    pub fn new(payload_bytes: Vec<u8>, declared_name: String) -> Self {
        Self {
            payload_bytes,
            declared_name,
        }
    }

    pub fn payload_bytes(&self) -> &[u8] {
        &self.payload_bytes
    }

    pub fn declared_name(&self) -> &str {
        &self.declared_name
    }

    pub fn into_parts(self) -> (Vec<u8>, String) {
        (self.payload_bytes, self.declared_name)
    }
}
