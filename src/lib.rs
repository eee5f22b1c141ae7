//! # validex — a declarative, single-threaded data validation engine
//!
//! Rules are plain data (`op` + `field` + optional `params`/`negative`/
//! `message`), resolved against a catalogue of named helpers and compiled
//! once into a cached, reusable execution plan. Records are validated
//! synchronously, asynchronously (for host-registered async helpers), or as
//! an ordered stream of chunks.
//!
//! An [`Engine`](engine::Engine) owns every collaborating subsystem — the
//! helper registry, rule compiler, data extractor, argument/path caches,
//! object pool, error handler, and callback manager — and is deliberately
//! single-cooperative-owner: its interior mutability is `RefCell`-based, not
//! `RwLock`/`Mutex`, so it is `!Sync` and cannot be silently shared across
//! threads (see `DESIGN.md`).

pub mod cache;
pub mod callback;
pub mod compiler;
pub mod engine;
pub mod error;
pub mod error_handler;
pub mod extractor;
pub mod helpers;
pub mod pool;
pub mod predicates;
pub mod streaming;
pub mod value;

pub use compiler::{Diagnostic, Rule};
pub use engine::{Engine, EngineMetrics, EngineOptions, ValidationResult};
pub use error::{EngineError, EngineResult};
pub use value::{Record, Value};
