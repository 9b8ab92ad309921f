//! Library wrapper around the `ccm-repo` binary.
//!
//! The binary crate root is compiled as a module here so `cargo test -p ccm-cli --lib`
//! typechecks the CLI without building the integration test binaries.

#[allow(dead_code)]
#[path = "main.rs"]
mod main_bin;
