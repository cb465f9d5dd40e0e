//! Shared task dispatch: a fixed-size worker pool over a bounded queue,
//! built on a triggered-once shutdown event.

pub mod pool;
pub mod shutdown;

pub use pool::{PoolClosed, WorkerPool};
pub use shutdown::{ShutdownEvent, ShutdownListener};
