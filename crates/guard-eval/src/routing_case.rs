use serde::Deserialize;
use shared::profile::AssistantDomain;
use shared::routing::{RouteSource, Specialist};

#[derive(Debug, Clone, Deserialize)]
pub struct RoutingEvalCaseFixture {
    pub case_id: String,
    pub description: String,
    pub domain: AssistantDomain,
    pub message: String,
    pub expectations: RoutingExpectations,
}

/// `decided` names the specialist keyword routing must pick without a
/// delegated call; `ambiguous` lists the tie-breaker candidates instead.
#[derive(Debug, Clone, Deserialize)]
pub struct RoutingExpectations {
    #[serde(default)]
    pub decided: Option<Specialist>,
    #[serde(default)]
    pub source: Option<RouteSource>,
    #[serde(default)]
    pub ambiguous: Option<Vec<Specialist>>,
}
