//! 页面桥接脚本
//!
//! 宿主页面只有一个 iframe（远程编辑器）和 `window.__oe` 桥接对象：
//! - 监听 iframe 发来的 message，分类后通过 CDP binding 交给 Rust 侧
//! - 维护轮询状态 `{ sentinels, done }`
//! - 分块暂存待发送的数据，`commit()` 时以原始 ArrayBuffer 发给编辑器
//! - `command()` 把脚本字符串发给编辑器

/// CDP binding 名称
pub const BINDING_NAME: &str = "__oeSignal";

const BRIDGE_TEMPLATE: &str = r#"
(() => {
  const EDITOR_URL = __EDITOR_URL__;
  const SENTINEL = __SENTINEL__;
  const emit = (message) => window.__BINDING__(JSON.stringify(message));

  const toBase64 = (bytes) => {
    let binary = '';
    const step = 0x8000;
    for (let i = 0; i < bytes.length; i += step) {
      binary += String.fromCharCode.apply(null, bytes.subarray(i, i + step));
    }
    return btoa(binary);
  };

  const frame = document.createElement('iframe');
  frame.id = 'oe-editor';
  frame.style.cssText = 'border:0;width:100vw;height:100vh';

  const state = { sentinels: 0, done: false, staged: [] };

  window.addEventListener('message', (event) => {
    if (event.source !== frame.contentWindow) return;
    const data = event.data;
    if (data instanceof ArrayBuffer) {
      emit({ kind: 'binary', data: toBase64(new Uint8Array(data)) });
    } else if (typeof data === 'string') {
      if (data === SENTINEL) {
        state.sentinels += 1;
        state.done = true;
        emit({ kind: 'sentinel' });
      } else {
        emit({ kind: 'text', data });
      }
    } else {
      emit({ kind: 'unknown', data: String(data) });
    }
  });

  window.__oe = {
    snapshot: () => ({ sentinels: state.sentinels, done: state.done }),
    reset: () => { state.done = false; return true; },
    stage: (chunk) => { state.staged.push(chunk); return state.staged.length; },
    commit: () => {
      const binary = atob(state.staged.join(''));
      state.staged = [];
      const bytes = new Uint8Array(binary.length);
      for (let i = 0; i < binary.length; i++) bytes[i] = binary.charCodeAt(i);
      const length = bytes.length;
      frame.contentWindow.postMessage(bytes.buffer, '*', [bytes.buffer]);
      return length;
    },
    command: (script) => { frame.contentWindow.postMessage(script, '*'); return true; },
  };

  document.body.appendChild(frame);
  frame.src = EDITOR_URL;
})();
"#;

/// 生成宿主页面 HTML
pub fn host_document(editor_url: &str, sentinel: &str) -> String {
    format!(
        "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>oe-host</title></head>\
         <body style=\"margin:0\"><script>{}</script></body></html>",
        bridge_script(editor_url, sentinel)
    )
}

/// 生成桥接脚本，URL 和哨兵以 JSON 字符串字面量嵌入
pub fn bridge_script(editor_url: &str, sentinel: &str) -> String {
    BRIDGE_TEMPLATE
        .replace("__EDITOR_URL__", &js_string(editor_url))
        .replace("__SENTINEL__", &js_string(sentinel))
        .replace("__BINDING__", BINDING_NAME)
}

/// JSON 字符串字面量，同时避免提前闭合 `<script>`
fn js_string(value: &str) -> String {
    serde_json::Value::String(value.to_string())
        .to_string()
        .replace("</", "<\\/")
}
