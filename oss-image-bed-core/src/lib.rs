#![doc = "oss-image-bed-core: upload pipeline and Markdown rewriting for oss-image-bed."]

//! This crate holds everything that does not depend on a concrete object
//! store or on the command line: the [`contract::BucketClient`] trait, the
//! deduplicating [`uploader::ImageUploader`], key naming, directory scanning
//! and the [`markdown::MarkdownRewriter`].
//!
//! # Usage
//! Construct an uploader with any `BucketClient` implementation (the CLI crate
//! ships an Aliyun OSS client; tests use `contract::MockBucketClient`).

pub mod config;
pub mod contract;
pub mod error;
pub mod format;
pub mod hash_cache;
pub mod markdown;
pub mod naming;
pub mod scan;
pub mod uploader;
