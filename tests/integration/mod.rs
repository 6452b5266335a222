//! Integration tests for the tier router
//!
//! This module contains integration tests that exercise routing, dispatch,
//! recovery and the HTTP surface end to end.

pub mod dispatch;
pub mod http_api;
pub mod recovery;
pub mod routing;
