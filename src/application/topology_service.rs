// Topology service - Use case for rendering the live pipeline graph
use crate::application::metrics_repository::MetricsRepository;
use crate::domain::topology::{marshal, TopologyGraph};
use anyhow::Context;
use std::sync::Arc;

#[derive(Clone)]
pub struct TopologyService {
    repository: Arc<dyn MetricsRepository>,
}

impl TopologyService {
    pub fn new(repository: Arc<dyn MetricsRepository>) -> Self {
        Self { repository }
    }

    /// Graph of every link seen in `[from_ms, to_ms]`, styled by scope liveness.
    pub async fn topology(&self, from_ms: i64, to_ms: i64) -> anyhow::Result<TopologyGraph> {
        let (links, liveness) = tokio::try_join!(
            async {
                self.repository
                    .fetch_links(from_ms, to_ms)
                    .await
                    .context("Failed to fetch topology links")
            },
            async {
                self.repository
                    .fetch_liveness(from_ms, to_ms)
                    .await
                    .context("Failed to fetch element liveness")
            },
        )?;

        let graph = marshal(&links, &liveness);
        tracing::debug!(
            "Marshalled {} links into {} nodes, {} edges, {} combos",
            links.len(),
            graph.nodes.len(),
            graph.edges.len(),
            graph.combos.len()
        );
        Ok(graph)
    }
}
