//! Host metrics agent: configuration and HTTP surface

pub mod api;
pub mod config;
