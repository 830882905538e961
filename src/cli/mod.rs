pub mod config_cmd;
pub mod export_cmd;
pub mod output;
pub mod renderer;
pub mod usage_cmd;
