//! Build, publish and serve services for site sitemaps.

pub mod aggregator;
pub mod coordinator;
pub mod entries;
pub mod error;
pub mod jobs;
pub mod pointer;
pub mod publisher;
pub mod repos;
pub mod serve;
pub mod settle;
pub mod sitemap;
