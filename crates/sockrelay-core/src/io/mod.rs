//! I/O utilities for duplex relaying.
//!
//! This module provides the shared I/O primitives used by the relay engine:
//! a stream wrapper bounding every call with a deadline, and the
//! bidirectional copy that links the two halves of a pairing.

mod deadline;
mod relay;

pub use deadline::DeadlineStream;
pub use relay::{NoOpMetrics, RelayEnd, RelayMetrics, RelayStats, relay_bidirectional};
