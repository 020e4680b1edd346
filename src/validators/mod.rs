//! Validator families invoked by [`Check`](crate::rules::Check).
//!
//! Each family is a set of free functions from a package view to an
//! [`Outcome`](crate::rules::Outcome).

pub mod geo;
pub mod identity;
pub mod manifest;
pub mod polygon;
pub mod xml;
