//! 业务能力层：输入接收与输出写入

pub mod intake;
pub mod output_writer;

pub use intake::Intake;
pub use output_writer::OutputWriter;
