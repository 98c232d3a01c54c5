//! # KapiFence core
//!
//! Marks declarations of already compiled JVM archives as deprecated, without
//! sources and without recompiling anything.
//!
//! ## Pipeline
//!
//! ```text
//! keep patterns ("class com.x.Y { public void *(); }")
//!     ↓ lexer + keep parser
//! KeepSpecification list (one Pass per pattern string)
//!     ↓ archive rewriter, entry by entry
//! class file
//!     ↓ visitor: decide, then apply
//! Deprecated attribute + @kotlin.Deprecated(message)
//!     + kotlin.Metadata symbols marked as annotated
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use std::path::Path;
//! use fence_core::TransformPlan;
//!
//! let plan = TransformPlan::from_patterns(&["class com.example.legacy.**"], "Use the v2 API")?;
//! let report = fence_core::rewrite_archive_file(Path::new("in.jar"), Path::new("out.jar"), &plan)?;
//! println!("{} classes deprecated", report.transformed);
//! # Ok::<(), fence_core::Error>(())
//! ```

pub mod archive;
pub mod classfile;
pub mod config;
pub mod error;
pub mod keep;
pub mod lexer;
pub mod matcher;
pub mod metadata;
pub mod visitor;

pub use archive::{rewrite_archive, rewrite_archive_file, ArchiveReport, ClassOutcome, TransformPlan};
pub use classfile::{ClassFile, ClassFileBuilder, DeclarationContainer, MemberDeclaration};
pub use config::{FenceConfig, DEFAULT_MESSAGE};
pub use error::{Error, Result};
pub use keep::{parse_keep_specifications, KeepSpecification, MemberKind, MemberSpecification};
pub use metadata::{ClassMetadataBuilder, MetadataDecodeError, MetadataHeader, MetadataSymbolTable};
pub use visitor::{transform_class, transform_class_with, Pass, PassReport, Rule};

/// Parse a single pattern string
pub fn parse(source: &str) -> Result<Vec<KeepSpecification>> {
    parse_keep_specifications(source)
}
