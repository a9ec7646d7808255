pub mod common;
pub mod database;
pub mod docker;
pub mod files;
pub mod general;
pub mod search;
pub mod vector;
