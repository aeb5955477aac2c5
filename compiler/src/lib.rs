pub mod emit;
pub mod error_codes;
pub mod logging;
pub mod manifest;
pub mod pipeline;
pub mod plugin_loader;
pub mod plugin_pipeline;
