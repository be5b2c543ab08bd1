pub mod job;
pub mod report;
pub mod signal;

pub use job::{ConversionJob, ConversionResult};
pub use report::{JobFailure, JobReport};
pub use signal::ProtocolSignal;
