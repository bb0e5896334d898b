//! Core building blocks for the pizzeria simulation.
//!
//! This crate provides the pieces shared by the reception and kitchen
//! processes:
//!
//! - [`pizza`]: the order model (pizza types, sizes, ingredients).
//! - [`codec`]: binary payload packing and the text message envelope.
//! - [`transport`]: host-local named bounded queues (POSIX mqueues).
//! - [`ipc`]: per-process inbox listener and outbox routing.
//! - [`stock`]: ingredient counters with atomic consume-and-commit.
//! - [`cook`]: the single-pizza-at-a-time cook worker.

pub mod codec;
pub mod cook;
pub mod ipc;
pub mod pizza;
pub mod stock;
pub mod transport;

/// Factor limiting a kitchen's accepted load to this many pizzas per cook.
pub const MAX_PIZZAS_PER_KITCHEN_MULTIPLIER: u32 = 2;
