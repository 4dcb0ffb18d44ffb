//! The conversion engine: PyPI packages in, Zero Install feeds out.
//!
//! [`convert::convert_package`] drives the whole pipeline for one package:
//! enumerate releases, reuse implementations from the previous feed, and for
//! every new source distribution download, verify, extract into a quota
//! directory, find or sandbox-generate its egg-info, convert dependencies,
//! digest the tree and emit an `<implementation>` element.

pub mod context;
pub mod convert;
pub mod dependencies;
pub mod digest;
pub mod error;
pub mod extract;
pub mod general;
pub mod logging;
pub mod metadata;
pub mod package;
pub mod sandbox;
pub mod sdist;
pub mod xml;

mod languages;

pub use context::WorkerContext;
pub use convert::convert_package;
pub use error::{ConvertError, Result};
pub use logging::FeedLogger;
pub use package::Package;
pub use sandbox::Sandbox;
pub use xml::Element;
