//! Property tests for the pure layout algorithms.

use proptest::prelude::*;
use trellis_core::config::{ForceConfig, GridConfig, LayoutConfig};
use trellis_core::{Connection, Graph, Node, NodeKind};
use trellis_layout::algorithm::{circular, depths, force, grid, hierarchical};

fn arb_graph() -> impl Strategy<Value = Graph> {
    (1..12usize).prop_flat_map(|count| {
        prop::collection::vec((0..count, 0..count), 0..(count * 2)).prop_map(move |edges| {
            Graph::from_parts(
                (0..count).map(|i| Node::new(format!("n{i}"), NodeKind::Sms, 0.0, 0.0)),
                edges
                    .into_iter()
                    .enumerate()
                    .map(|(i, (s, t))| Connection::new(format!("c{i}"), format!("n{s}"), format!("n{t}"))),
            )
        })
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Every algorithm places every node exactly once, at finite
    /// coordinates, even on cyclic graphs.
    #[test]
    fn prop_algorithms_cover_every_node(graph in arb_graph()) {
        let config = LayoutConfig {
            force: ForceConfig { iterations: 50, ..ForceConfig::default() },
            ..LayoutConfig::default()
        };
        let runs = [
            hierarchical(&graph, &config),
            force(&graph, &config.force),
            circular(&graph, &config),
            grid(&graph, &config, &GridConfig::default()),
        ];
        for positions in runs {
            prop_assert_eq!(positions.len(), graph.nodes.len());
            prop_assert!(positions.values().all(|p| p.x.is_finite() && p.y.is_finite()));
        }
        prop_assert_eq!(depths(&graph).len(), graph.nodes.len());
    }

    /// Hierarchical placement is deterministic.
    #[test]
    fn prop_hierarchical_is_deterministic(graph in arb_graph()) {
        let config = LayoutConfig::default();
        prop_assert_eq!(hierarchical(&graph, &config), hierarchical(&graph, &config));
    }
}
