// Stampmark watermark library

pub mod config;
pub mod logging;
pub mod watermark;
