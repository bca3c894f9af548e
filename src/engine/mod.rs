pub mod risk;
pub mod scoring;
pub mod subgraph;

pub use risk::{
    explain_wallet_risk, k_hop_exposure, k_hop_layers, risk_score_wallet, Contributor,
    HopBreakdown, HopExposure, RiskConfig, RiskExplanation, WalletRisk,
};
pub use scoring::{RunOutcome, ScoringEngine};
pub use subgraph::{Subgraph, SubgraphEdge, SubgraphNode, SubgraphParams};
