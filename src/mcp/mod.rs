pub mod dispatcher;
pub mod handlers;
pub mod registry;
pub mod state;
pub mod tools;

pub use dispatcher::Dispatcher;
pub use state::ServerState;
