#![cfg_attr(docsrs, feature(doc_cfg))]

//! Captures the output of containers used by a test and logs it if the test fails.
//!
//! A [`LogOnFailure`](watcher::LogOnFailure) watcher follows an
//! [`OutputFeed`](output::OutputFeed) from the moment it is constructed. When told that the test
//! failed, it emits everything the feed produced, optionally cut down to the most recent lines,
//! as one error-level record through a sink named after the feed.

pub mod config;
#[cfg(feature = "testcontainers")]
#[cfg_attr(docsrs, doc(cfg(feature = "testcontainers")))]
pub mod container;
pub mod output;
pub mod sink;
#[cfg(feature = "test-util")]
#[cfg_attr(docsrs, doc(cfg(feature = "test-util")))]
pub mod test_util;
pub mod watcher;
