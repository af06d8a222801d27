//! Coroutine Races
//!
//! Generates small structured-concurrency programs whose output is a race
//! between coroutines, together with their exact expected output:
//! - Statement trees with launches, scopes, jobs, deferred values and exceptions
//! - A deterministic virtual-time evaluator (single-threaded executor + timer queue)
//! - Seeded random growth to an exact statement count
//! - Output-preserving simplification down to a fixed point
//! - Kotlin-style rendering of the generated program

extern crate self as coroutine_races;

pub mod statement;
pub mod tree;
pub mod error;
pub mod rng;
pub mod values;
pub mod generator;
pub mod simplifier;
pub mod session;
pub mod pq;
pub mod scheduler;
pub mod executor;
pub mod context;
pub mod signal;
pub mod engine;
pub mod evaluator;
pub mod render;


pub use statement::{ExceptionKind, Node, Statement, StatementId};
pub use error::{GenerationError, InvariantViolation, Pool};
pub use generator::{generate, Difficulty, Generator, StatementKind};
pub use simplifier::simplify;
pub use session::{generate_challenge, Challenge, Session, SessionConfig};
pub use engine::{Engine, EngineConfig, RunOutcome, WAIT_FOREVER_HORIZON};
pub use evaluator::{evaluate, evaluate_with, Evaluation, PrintEvent, Termination};
pub use render::render;
pub use tree::validate;
pub use race_macros::program;
