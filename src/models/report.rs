//! 单个任务的结果报告（写入 JSON Lines 报告文件）

use serde::Serialize;

use crate::error::{hex, ConversionError, ErrorKind, IntakeError};

/// 任务失败：输入不合法 / 转换失败
#[derive(Debug)]
pub enum JobFailure {
    BadInput(IntakeError),
    ConversionFailed(ConversionError),
}

impl std::fmt::Display for JobFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobFailure::BadInput(e) => write!(f, "输入无效: {}", e),
            JobFailure::ConversionFailed(e) => write!(f, "转换失败: {}", e),
        }
    }
}

impl From<IntakeError> for JobFailure {
    fn from(err: IntakeError) -> Self {
        JobFailure::BadInput(err)
    }
}

impl From<ConversionError> for JobFailure {
    fn from(err: ConversionError) -> Self {
        JobFailure::ConversionFailed(err)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Converted,
    BadInput,
    ConversionFailed,
    /// 转换成功，但结果没能写到输出目录
    OutputFailed,
}

/// 报告文件中的一行
#[derive(Debug, Serialize)]
pub struct JobReport {
    pub source: String,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_header: Option<String>,
    pub elapsed_ms: u128,
    pub finished_at: String,
}

impl JobReport {
    pub fn converted(source: &str, output: &str, elapsed_ms: u128) -> Self {
        Self {
            source: source.to_string(),
            status: JobStatus::Converted,
            output: Some(output.to_string()),
            kind: None,
            message: None,
            observed_header: None,
            elapsed_ms,
            finished_at: now(),
        }
    }

    pub fn output_failed(source: &str, message: impl Into<String>, elapsed_ms: u128) -> Self {
        Self {
            source: source.to_string(),
            status: JobStatus::OutputFailed,
            output: None,
            kind: None,
            message: Some(message.into()),
            observed_header: None,
            elapsed_ms,
            finished_at: now(),
        }
    }

    pub fn failed(source: &str, failure: &JobFailure, elapsed_ms: u128) -> Self {
        let (status, kind, message, observed_header, elapsed_ms) = match failure {
            JobFailure::BadInput(e) => (JobStatus::BadInput, None, e.to_string(), None, elapsed_ms),
            JobFailure::ConversionFailed(e) => (
                JobStatus::ConversionFailed,
                Some(e.kind),
                e.message.clone(),
                e.observed_header.as_deref().map(hex),
                e.elapsed.as_millis(),
            ),
        };
        Self {
            source: source.to_string(),
            status,
            output: None,
            kind,
            message: Some(message),
            observed_header,
            elapsed_ms,
            finished_at: now(),
        }
    }
}

fn now() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}
