//! Helper node constructors for common pipeline shapes.
//!
//! Everything here is sugar over [`flowline::Node::builder`]: single-value
//! sources, 1-in/1-out transforms, slice expansion, writer sinks and a
//! newline-delimited JSON decoder. The `*_builder` variants return the
//! preconfigured [`flowline::NodeBuilder`] so callers can still set a name,
//! worker count or buffer before building.

mod chain;
mod io;
mod json;
mod slice;
mod transform;
mod value;

pub use chain::chain;
pub use io::{display_writer, io_reader, io_writer};
pub use json::json_lines;
pub use slice::{unslice, unslice_builder};
pub use transform::{transform, transform_builder};
pub use value::value;
