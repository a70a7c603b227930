pub mod cli;
pub mod compactor;
pub mod config;
pub mod event;
pub mod forward;
pub mod pipeline;
pub mod storage;
pub mod web;
