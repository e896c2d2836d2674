//! Integration tests that run real builds through the fatdeps binary.
//!
//! Products are shell-script stand-ins unpacked from local archives, `lipo` is a script that
//! concatenates its inputs and the macOS SDK root is pinned.

#[cfg(unix)]
mod build_tests;
#[cfg(unix)]
mod clean_tests;
#[cfg(unix)]
mod common;
