pub mod cli;
pub mod download;
pub mod load_config;
pub mod minio;
pub mod oss;
pub mod qwen;
mod sign;
pub mod tools;
pub mod viewer;

pub use cli::{run, Cli};
