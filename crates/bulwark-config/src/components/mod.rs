//! Configuration components, one per resilience concern.

pub mod breaker;
pub mod deadline;
pub mod logging;
pub mod metrics;
pub mod recovery;

pub use breaker::*;
pub use deadline::*;
pub use logging::*;
pub use metrics::*;
pub use recovery::*;
