//! 浏览器层：进程生命周期与页面通道

pub mod bridge;
pub mod chromium;
pub mod controller;
pub mod session;

pub use chromium::ChromiumController;
pub use controller::{
    BrowserController, ChannelState, DocumentChannel, DocumentContext, LaunchOptions, ProcessHandle,
};
pub use session::{BrowserSession, SessionManager};
