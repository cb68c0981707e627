#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Runner for the safety map scoring pipeline.
//!
//! [`pipeline::run_once`] fetches incidents, scores every grid cell and
//! replaces the stored metrics; [`pipeline::schedule`] repeats that on a
//! fixed interval. [`interactive::run`] wraps both in a `dialoguer` menu.

pub mod interactive;
pub mod pipeline;
