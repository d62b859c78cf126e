pub mod config;
pub mod dispatcher;
pub mod ledger;
pub mod platform;
pub mod poller;
pub mod time;

pub use config::ListenerConfig;
pub use dispatcher::EventSource;
pub use platform::{FixedEncoding, MacosVersion, TimestampEncoding};
pub use poller::{Listener, ListenerState, PollError};
