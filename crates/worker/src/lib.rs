//! Shared worker primitives for sable services.
//!
//! Every task spawned by the queue and the synchronization channel goes through this crate so
//! it carries a [`TaskClass`] for observability and lands on the active tokio runtime.
//!
//! * [`spawn`]: classified task spawning with a global runtime fallback.
//! * [`WorkerJoinSet`]: runtime-aware join set used to track fanned-out work.
//! * [`WorkerPool`]: concurrency-limited pool whose spawn step never waits for capacity.
//! * [`GenerationClock`]: monotonic generation ids.

mod class;
mod join_set;
mod pool;
mod spawn;
mod token;

pub use class::TaskClass;
pub use join_set::WorkerJoinSet;
pub use pool::WorkerPool;
pub use spawn::{spawn, spawn_blocking};
pub use token::GenerationClock;
