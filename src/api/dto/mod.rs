//! Data Transfer Objects for REST request/response serialization.
//!
//! Domains and user ids travel as plain JSON strings; filters use the
//! tagged `FilterSpec` encoding.

pub mod client_dto;
pub mod event_dto;

pub use client_dto::*;
pub use event_dto::*;
