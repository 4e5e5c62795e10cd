pub mod audit;
pub mod classifier;
pub mod config;
pub mod fingerprint;
pub mod lock;
pub mod maintenance;
pub mod manager;
pub mod matcher;
pub mod paths;
pub mod pipeline;
pub mod registry;
pub mod report;
pub mod state;
pub mod sweep;
pub mod timestamp;
pub mod util;
