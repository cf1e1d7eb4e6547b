//! # cnlfit-core: Types and seams of the CNL fitting layer
//!
//! The fitting layer sits between a character-device client interface and a
//! CNL transport. This crate holds everything both sides agree on; the state
//! machines, queues and pools live in `cnlfit`.
//!
//! ## Modules
//!
//! - `id` - session, request, peer and handle identifiers
//! - `state` - controller and adapter lifecycle states
//! - `command` - command vocabulary and the endpoint permission table
//! - `request` - per-command argument records (`FitRequest`)
//! - `transport` - the transport operations interface (`CnlTransport`)
//! - `event` - transport events and the wrapper event vocabulary
//! - `notifier` - endpoint wake-up hook
//! - `error` - error kinds
//! - `kprint` - kernel-style leveled print macros
//! - `env` - environment variable helpers

pub mod id;
pub mod state;
pub mod command;
pub mod request;
pub mod transport;
pub mod event;
pub mod notifier;
pub mod error;
pub mod kprint;
pub mod env;

pub use command::{Command, CommandScope, EndpointType};
pub use error::{FitError, Result};
pub use event::{FitEvent, PortEvent, TransportEvent};
pub use id::{CnlHandle, DeviceHandle, RequestId, SessionId, Uid};
pub use notifier::Notifier;
pub use request::FitRequest;
pub use state::{AdapterState, ControllerState};
pub use transport::{CnlStatus, CnlTransport, CompletionSink, EventSink};
