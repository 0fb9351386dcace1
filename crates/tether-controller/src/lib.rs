//! tether-controller: the broker every other component connects to
//!
//! The controller accepts agents on one TLS port, operator clients on a
//! second, and browser sessions on a websocket port, keeps them in an
//! ordered registry, and relays lines between bound client/agent pairs.

pub mod dispatch;
pub mod endpoint;
pub mod pairs;
pub mod registry;
pub mod server;
pub mod state;

pub use endpoint::{EndpointHandle, Outbound};
pub use pairs::PairTable;
pub use registry::Registry;
pub use server::{BoundListeners, ControllerServer};
pub use state::ControllerState;
