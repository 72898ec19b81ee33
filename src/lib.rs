#![allow(clippy::new_without_default)]

#[macro_use]
extern crate log;

pub mod document;
pub mod errors;
pub mod export_data;
pub mod geo;
pub mod history;
pub mod import_data;
pub mod operations;
pub mod simplify;
pub mod statistics;
pub mod store;
