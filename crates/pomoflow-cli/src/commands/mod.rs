pub mod config;
pub mod run;
pub mod sessions;
pub mod settings;
pub mod stats;
