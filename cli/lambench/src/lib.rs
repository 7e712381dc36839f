#![doc = include_str!("../README.md")]
//! `lambench` measures cold start and warm latency of HTTP services deployed
//! as Lambda functions, one (framework, memory) pair at a time.

pub mod benchmark;
pub mod cli;
pub mod console;
pub mod lambda;
pub mod logs;
pub mod probe;
pub mod report;
pub mod stack;
pub mod stats;
pub mod telemetry;
pub mod types;
pub mod warm;
