//! Process-wide tracing setup shared by the server binary and test harnesses.

pub mod subscriber;

pub use subscriber::{LogFormat, UnknownLogFormat, init};
