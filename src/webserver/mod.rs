mod server;

pub mod routes;

// Public API for starting/stopping the webserver
pub use server::{shutdown, start_server};
