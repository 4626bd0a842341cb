//! Runtime adapters and the transport-facing API surface.

pub mod api;
#[cfg(feature = "tokio-runtime")]
pub mod tokio_spawner;

pub use api::{ApiError, AuthContext, BookingResponse, Caller};
#[cfg(feature = "tokio-runtime")]
pub use tokio_spawner::TokioSpawner;
