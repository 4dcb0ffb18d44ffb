//! Python version handling for zerofeed.
//!
//! PyPI describes releases with PEP 440 versions and constrains dependencies
//! with PEP 440 specifier sets. Zero Install has its own version grammar and
//! its own constraint language (`version..!version | !version | ...`). This
//! crate owns the translation between the two worlds:
//!
//! - [`Version`] parses and normalizes a PEP 440 public version and renders
//!   it as a Zero Install version string whose ordering, under the Zero
//!   Install comparator, agrees with the Python ordering.
//! - [`zi::ZiVersion`] is the Zero Install side of that bargain: the target
//!   grammar parsed into a comparable value.
//! - [`convert_specifiers`] compiles a list of `(operator, version)` pairs
//!   into a simplified disjunction of half-open ranges, rendered as a Zero
//!   Install version expression.

pub mod error;
pub mod specifiers;
pub mod version;
pub mod zi;

pub use error::{Result, VersionError};
pub use specifiers::{Bound, Operator, Range, convert_specifiers, parse_specifier};
pub use version::{Modifier, ModifierKind, Version};
