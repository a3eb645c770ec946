//! Test Helper Utilities
//!
//! Shared utilities for testing deces-ingest

#![allow(dead_code)]

pub mod archive_server;
pub mod db_utils;

pub use archive_server::{build_zip, data_row, extract_csv, invalid_row, ArchiveServer, HEADER};
pub use db_utils::{count_rows, create_test_db, test_config, test_pipeline, test_pipeline_with_bus, TestDb};
