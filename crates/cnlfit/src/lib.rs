//! # cnlfit: CNL fitting layer
//!
//! Session and request multiplexing between a character-device client
//! interface and a CNL transport. The client side opens controller and
//! adapter endpoints and issues `FitRequest`s; the transport side registers
//! devices and reports completions and events, which end up in per-endpoint
//! FIFO queues the client drains with get-event.
//!
//! ## Components
//!
//! | Component          | Module        |
//! |--------------------|---------------|
//! | Container pool     | `pool`        |
//! | I/O manager        | `io_manager`  |
//! | Controller session | `controller`  |
//! | Adapter port       | `adapter`     |
//! | Request dispatcher | `dispatcher`  |
//! | Event translation  | `translate`   |
//! | Session registry   | `registry`    |
//! | Force-close wait   | `wait`        |
//! | Poll wake-up       | `poll_waker`  |
//! | Loopback transport | `loopback`    |
//!
//! ## Locking
//!
//! One registry mutex serializes lifecycle transitions; each I/O manager has
//! its own queue lock. Neither is held across a transport call or while a
//! notifier runs.

pub mod config;
pub mod pool;
pub mod io_manager;
mod wait;
mod controller;
mod adapter;
mod dispatcher;
mod translate;
pub mod registry;
pub mod poll_waker;
pub mod loopback;

pub use config::FitConfig;
pub use pool::{AllocPolicy, ContainerPool};
pub use poll_waker::PollWaker;
pub use registry::{Endpoint, SessionRegistry};
