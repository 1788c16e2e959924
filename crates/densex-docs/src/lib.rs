//! Densex Docs - Document Extraction
//!
//! - `parser`: `parse_document` for `.txt`, `.md` and `.pdf` files
//! - `chunk`: `chunk_text`, paragraph passages for indexing

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod chunk;
pub mod error;
pub mod parser;

pub use chunk::chunk_text;
pub use error::{Error, Result};
pub use parser::{parse_document, DocumentKind};
