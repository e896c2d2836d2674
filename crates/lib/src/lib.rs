//! fatdeps-lib: build orchestration for multi-architecture Apple static libraries
//!
//! This crate provides the pieces of the `fatdeps` build:
//! - `registry` / `config`: products, pinned versions and OS profiles, with file overrides
//! - `target`: expansion into one build target per (product, OS, SDK, architecture)
//! - `driver` / `adapter`: download, unpack, configure, compile and install per target
//! - `merge` / `package`: fat libraries per SDK and their distributable archives
//! - `execute`: the stage graph and its parallel, failure-isolating scheduler

pub mod adapter;
pub mod build_lock;
pub mod clean;
pub mod config;
pub mod consts;
pub mod driver;
pub mod execute;
pub mod fresh;
pub mod layout;
pub mod merge;
pub mod package;
pub mod pipeline;
pub mod platform;
pub mod registry;
pub mod target;
pub mod toolchain;
