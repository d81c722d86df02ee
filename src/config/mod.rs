mod settings;

pub use settings::{LogConfig, LogFormat, PageConfig, Settings};
