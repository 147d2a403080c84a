//! funit compiles Fortran unit-test definition files into Fortran programs.
//!
//! A test file groups `test` blocks into `set`s; assertion macros such as
//! `assert_equal(a, b)` inside the tests are expanded into plain Fortran that
//! records failures. The [`pipeline`] then builds the program with a
//! configurable build rule and runs it.

pub use crate::errors::{ErrorKind, FunitError};

pub mod ast;
pub mod build_rule;
pub mod cli;
pub mod codegen;
pub mod config;
pub mod discovery;
pub mod errors;
pub mod pipeline;
pub mod syntax;
