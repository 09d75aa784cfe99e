pub mod algo;
pub mod api;
pub mod catalog;
pub mod engine;
pub mod error;
