pub mod builder;
pub mod illicit;
pub mod snapshot;
pub mod tx_graph;

pub use builder::{build_tx_graph, load_csv, rebuild, ReloadStats, TxEdge};
pub use illicit::pick_seed_illicit_wallets;
pub use snapshot::{GraphHandle, GraphSnapshot};
pub use tx_graph::{EdgeStats, TxGraph};
