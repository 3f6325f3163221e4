//! Concurrency primitives shared by the background tasks of the pipeline.
//!
//! Background work (the source health sweep and scheduled exports) listens on a single
//! broadcast-style shutdown channel. Shutdown stops new work from starting; work already running
//! is allowed to finish.

pub mod shutdown;
