//! Crucible Hardware - Requirement Constraint Language
//!
//! Parses nested hardware requirement documents into a boolean constraint
//! tree and offers three observables over it: a canonical textual
//! re-serialization, a simplifier for trivially-nested boolean nodes, and
//! a three-valued satisfies predicate against a hardware description.
//! Guest selection itself belongs to the provisioner; this crate owns only
//! the syntax and semantics of the constraints.

mod constraint;
mod parse;
mod quantity;
mod satisfies;
mod serialize;
mod simplify;

pub use constraint::*;
pub use parse::{leaf_kind, parse, parse_leaf};
pub use quantity::*;
pub use satisfies::*;
pub use serialize::{to_canonical_string, to_value};
pub use simplify::simplify;
