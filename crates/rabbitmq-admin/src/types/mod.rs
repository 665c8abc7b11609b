#![allow(missing_docs)]

mod aliveness;
mod connection;
mod exchange;
mod node;
mod overview;
mod queue;
mod top;
mod user;
mod vhost;
mod whoami;

pub use aliveness::Aliveness;
pub use connection::Connection;
pub use exchange::Exchange;
pub use node::Node;
pub use overview::{MessageStats, ObjectTotals, Overview, QueueTotals};
pub use queue::Queue;
pub use top::{NodeTop, TopProcess};
pub use user::User;
pub use vhost::VirtualHost;
pub use whoami::Whoami;
