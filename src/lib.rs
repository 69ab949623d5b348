//! Stratum: a layered caching core for a content-managed site.
//!
//! A content cache with cascade invalidation sits in front of an HTTP origin,
//! and a per-user JSON response cache sits in front of the routes that serve
//! it.

pub mod application;
pub mod cache;
pub mod config;
pub mod infra;
