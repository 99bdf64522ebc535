//! calmerge - feeds made of polled sources
//!
//! This crate stores feeds and the source urls attached to them. The store's
//! constraints (unique urls, feed -> source cascade) carry part of the
//! business rules; [`domain`] translates their outcome into [`error::Error`].

pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod routes;
