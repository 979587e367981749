//! Facade crate over the dataflow substrate.
//!
//! Pipelines are built from independent OS processes exchanging
//! self-describing `{meta, data}` records over stdin/stdout and named
//! FIFOs. The member crates layer as: record core and configuration
//! (`common`), diagnostics (`utils`), framing and channel policy
//! (`transport`), and the control-flow primitives (`engine`). The
//! executables live in the `modules` crate, one per pipeline stage.

pub use common;
pub use engine;
pub use errors;
pub use transport;
pub use utils;

pub mod prelude;
