//! # cdl
//!
//! A Rust library for the Crystal Description Language (CDL), the compact
//! textual notation used by gemmology and mineralogy tooling to describe
//! crystal morphology.
//!
//! This crate provides the complete CDL v2 front-end:
//! - **Parser**: CDL text to a typed description tree
//! - **Validator**: domain checks over the tree (crystal systems, point
//!   groups, Miller-Bravais consistency, twin laws, ...)
//! - **Catalog**: the read-only domain tables, exported so tooling can
//!   enumerate legal values
//!
//! ## Usage
//!
//! ```rust
//! use cdl::{parse, Description};
//!
//! // An octahedron truncated by a cube
//! let desc = parse("cubic[m3m]:{111}@1.0 + {100}@1.3").unwrap();
//! assert_eq!(desc.system(), "cubic");
//! assert_eq!(desc.flat_forms().len(), 2);
//!
//! // Quartz habit with 4-index Miller-Bravais notation
//! let desc = parse("trigonal[32]:{10-10}@1.0 + {10-11}@0.8").unwrap();
//! assert!(matches!(desc, Description::Crystalline(_)));
//!
//! // Amorphous materials skip the form machinery entirely
//! let desc = parse("amorphous[opalescent]:{botryoidal}").unwrap();
//! assert_eq!(desc.system(), "amorphous");
//! ```
//!
//! ## Syntax quick reference
//!
//! | Construct | Example |
//! |-----------|---------|
//! | Form | `{111}` or `octahedron` |
//! | Scale | `{111}@1.3` |
//! | Features | `{111}[phantom:3, white]` |
//! | Group | `({111} + {100})[silk:dense]` |
//! | Nested growth | `{10-10} > {10-11}` (right-associative) |
//! | Aggregate | `{111} ~ cluster[12] @2mm [aligned]` |
//! | Twin | `... \| twin(spinel)` or `... \| twin([1,1,1],180)` |
//! | Modification | `... \| elongate(c:1.5)` |
//! | Phenomenon | `... \| phenomenon[asterism:6]` |
//! | Definition | `@oct = {111}@1.0` then `$oct` |
//! | Comments | `# line`, `/* block */`, `#! doc comment` |
//!
//! ## Validation
//!
//! [`parse`] runs the validator, so every description it returns satisfies
//! the domain invariants. [`validate`] is the boolean convenience wrapper:
//!
//! ```rust
//! let (ok, _) = cdl::validate("cubic[m3m]:{111}");
//! assert!(ok);
//!
//! let (ok, message) = cdl::validate("cubic[6/mmm]:{111}");
//! assert!(!ok);
//! assert_eq!(
//!     message.as_deref(),
//!     Some("Point group '6/mmm' not valid for cubic system")
//! );
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

mod ast;
pub mod catalog;
mod error;
mod parser;
mod validator;

pub use ast::{
    AggregateSpec, AmorphousDescription, CrystalForm, CrystallineDescription, Definition,
    DefinitionBody, Description, Feature, FeatureValue, FormGroup, FormNode, MillerIndex,
    Modification, ParamValue, PhenomenonParam, PhenomenonSpec, TwinSpec, TwinType,
};
pub use error::{CdlError, CdlResult};
pub use validator::validate_description;

/// Parses a CDL string into a validated description tree.
///
/// Runs the full pipeline: comment stripping, definition substitution,
/// variant selection (first alternative), grammar, then semantic validation.
///
/// # Errors
///
/// Returns a [`CdlError`] carrying the failure class: syntax failures hold a
/// byte position and expectation message, validation failures a
/// human-readable reason.
pub fn parse(input: &str) -> CdlResult<Description> {
    let desc = parser::parse_document(input)?;
    validator::validate_description(&desc)?;
    Ok(desc)
}

/// Parses a CDL string into one validated description per variant
/// alternative.
///
/// Documents without `(a ; b)` variant groups yield exactly one description.
/// Alternatives multiply across groups, bounded by an expansion cap.
pub fn parse_variants(input: &str) -> CdlResult<Vec<Description>> {
    let variants = parser::parse_document_variants(input)?;
    for desc in &variants {
        validator::validate_description(desc)?;
    }
    Ok(variants)
}

/// Validates a CDL string, returning whether it parsed and an optional
/// diagnostic message.
pub fn validate(input: &str) -> (bool, Option<String>) {
    match parse(input) {
        Ok(_) => (true, None),
        Err(err) => (false, Some(err.to_string())),
    }
}
