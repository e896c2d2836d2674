//! End-to-end scenarios for the build pipeline.
//!
//! Products are driven by shell scripts over small local archives, SDK roots are pinned and
//! fat libraries are produced by concatenation, so no Apple toolchain is needed.

mod build_tests;
mod cache_tests;
mod common;
mod failure_tests;
