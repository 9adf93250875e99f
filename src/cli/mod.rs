//! CLI module for the iati-ingest binary

pub mod commands;
pub mod output;
