//! Per-site XML sitemap generation, publication and serving.

pub mod application;
pub mod config;
pub mod domain;
pub mod infra;
