//! Data types shared by the rods test harness.

pub mod avu;
pub mod path;

pub use avu::{Avu, NAMESPACE_SEPARATOR, OntAttribute};
pub use path::{PathError, RodsPath};
