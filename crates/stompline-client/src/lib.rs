//! Session state, command handling and event reporting for a STOMP event client.
//!
//! Two loops share one [`Session`] and one [`Connection`]:
//! - [`CommandDispatcher`] turns user command lines into frames
//! - [`InboundDispatcher`] consumes frames pushed by the server
//!
//! Login is the only exchange that must not race the inbound loop; the
//! [`LoginGate`] keeps the inbound loop parked until the CONNECT response
//! has been consumed by the login call itself.

pub mod command;
pub mod config;
pub mod connection;
pub mod error;
pub mod event;
pub mod inbound;
pub mod report;
pub mod session;

pub use command::{CommandDispatcher, CommandOutcome, UserCommand};
pub use config::ClientConfig;
pub use connection::{Connection, TcpConnection};
pub use error::{ClientError, Result};
pub use event::{load_events_file, Event, EventsFile};
pub use inbound::{Inbound, InboundDispatcher};
pub use report::{format_date_time, render_summary, truncate_description};
pub use session::{IdGenerator, LoginGate, Session, SubscriptionTable};
