//! Front end for test-definition files.
//!
//! [`cursor`] walks the raw buffer line by line, [`assertion`] spots macro
//! calls inside host-language lines, [`args`] splits their arguments and
//! [`parser`] assembles the [`TestFile`](crate::ast::TestFile) tree.

pub mod args;
pub mod assertion;
pub mod cursor;
pub mod parser;

pub use cursor::{Boundary, SourceCursor};
pub use parser::{parse_file, parse_source};

use crate::errors::ErrorKind;

/// A scan failure located at a byte offset; the parser turns it into a full
/// diagnostic with its source context.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanError {
    pub kind: ErrorKind,
    pub offset: usize,
}

impl ScanError {
    pub fn new(kind: ErrorKind, offset: usize) -> Self {
        Self { kind, offset }
    }
}
