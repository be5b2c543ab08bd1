//! JS 执行器 - 基础设施层
//!
//! 持有页面资源，只暴露"执行 JS"的能力

use chromiumoxide::Page;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

use crate::error::ChannelError;

/// JS 执行器
///
/// 职责：
/// - 持有 Page 资源
/// - 暴露 eval() 能力
/// - 不认识转换协议
pub struct JsExecutor {
    page: Page,
}

impl JsExecutor {
    /// 创建新的 JS 执行器
    pub fn new(page: Page) -> Self {
        Self { page }
    }

    /// 获取 page 的引用（用于其他操作）
    pub fn page(&self) -> &Page {
        &self.page
    }

    /// 执行 JS 代码并返回 JSON 结果
    pub async fn eval(&self, js_code: impl Into<String>) -> Result<JsonValue, ChannelError> {
        let result = self
            .page
            .evaluate(js_code.into())
            .await
            .map_err(|e| ChannelError::Script(e.to_string()))?;
        result
            .into_value()
            .map_err(|e| ChannelError::Script(e.to_string()))
    }

    /// 执行 JS 代码并反序列化为指定类型
    pub async fn eval_as<T: DeserializeOwned>(
        &self,
        js_code: impl Into<String>,
    ) -> Result<T, ChannelError> {
        let json_value = self.eval(js_code).await?;
        serde_json::from_value(json_value).map_err(|e| ChannelError::Unrecognized(e.to_string()))
    }

    /// 调用页面上 `window.__oe` 桥接对象的方法，参数以 JSON 传入
    pub async fn call_bridge<T: DeserializeOwned>(
        &self,
        method: &str,
        args: &[JsonValue],
    ) -> Result<T, ChannelError> {
        let args = args
            .iter()
            .map(|arg| arg.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        self.eval_as(format!("window.__oe.{}({})", method, args)).await
    }
}
