pub mod config;
pub mod logging;

pub mod adapters;
pub mod checksum;
pub mod dmg;
pub mod environment;
pub mod fetcher;
pub mod job;
pub mod plan;
pub mod post;
pub mod retry;
pub mod runner;
pub mod storage;
