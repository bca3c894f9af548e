pub mod graph_routes;
pub mod score_routes;
pub mod server;
pub mod status_routes;

pub use server::{start_server, ApiState};
