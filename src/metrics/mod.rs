//! Metrics and observability infrastructure for memc-load.
//!
//! - `events`: Internal event types and the `InternalEvent` trait
//! - `server`: Prometheus HTTP server and initialization

pub mod events;
pub mod server;

pub use server::init;

/// Emit an internal event.
///
/// This macro calls the `InternalEvent::emit()` method on the given event,
/// which records the corresponding Prometheus metric. Without an installed
/// recorder the call is a no-op.
///
/// # Example
///
/// ```ignore
/// use memc_load::metrics::events::RecordsParsed;
///
/// emit!(RecordsParsed { count: 100 });
/// ```
#[macro_export]
macro_rules! emit {
    ($event:expr) => {
        $crate::metrics::events::InternalEvent::emit($event)
    };
}
