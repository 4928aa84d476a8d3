//! Property tests: random edit sequences never leave dangling connections,
//! stale selections or an oversized history.

mod test_utils;

use proptest::prelude::*;
use test_utils::{link, sms, store_with};
use trellis_core::config::CanvasConfig;
use trellis_core::{ConnectionId, NodeId};
use trellis_graph::{HistoryManager, SelectionManager};

#[derive(Debug, Clone)]
enum Edit {
    Create(u8),
    Connect(u8, u8),
    Delete(u8),
    Select(u8),
    Disconnect(u8, u8),
    Undo,
    Redo,
}

fn arb_edit() -> impl Strategy<Value = Edit> {
    let id = 0..6u8;
    prop_oneof![
        3 => id.clone().prop_map(Edit::Create),
        3 => (id.clone(), id.clone()).prop_map(|(a, b)| Edit::Connect(a, b)),
        2 => id.clone().prop_map(Edit::Delete),
        2 => id.clone().prop_map(Edit::Select),
        1 => (id.clone(), id).prop_map(|(a, b)| Edit::Disconnect(a, b)),
        1 => Just(Edit::Undo),
        1 => Just(Edit::Redo),
    ]
}

const MAX_HISTORY: usize = 5;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    /// For any sequence of edits, every connection endpoint exists, every
    /// selected id exists, and the history stays within its bound.
    #[test]
    fn prop_edits_preserve_store_invariants(edits in prop::collection::vec(arb_edit(), 1..40)) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .build()
            .expect("tokio runtime");
        rt.block_on(async {
            let store = store_with(CanvasConfig::default().with_history_size(MAX_HISTORY));
            let history = HistoryManager::new(store.clone());
            let selection = SelectionManager::new(store.clone());

            for edit in edits {
                // Individual edits may be rejected; only the invariants matter.
                match edit {
                    Edit::Create(n) => {
                        let _ = store.create_node(sms(&format!("n{n}"), f64::from(n) * 10.0, 0.0)).await;
                    }
                    Edit::Connect(a, b) => {
                        let _ = store
                            .create_connection(link(&format!("c{a}{b}"), &format!("n{a}"), &format!("n{b}")))
                            .await;
                    }
                    Edit::Delete(n) => {
                        let _ = store.delete_node(&NodeId::from(format!("n{n}")), false).await;
                    }
                    Edit::Select(n) => {
                        selection.select_nodes(&[NodeId::from(format!("n{n}"))], true).await;
                    }
                    Edit::Disconnect(a, b) => {
                        let _ = store.delete_connection(&ConnectionId::from(format!("c{a}{b}"))).await;
                    }
                    Edit::Undo => {
                        let _ = history.undo().await;
                    }
                    Edit::Redo => {
                        let _ = history.redo().await;
                    }
                }

                let graph = store.graph();
                for connection in graph.connections.values() {
                    prop_assert!(graph.nodes.contains_key(&connection.source));
                    prop_assert!(graph.nodes.contains_key(&connection.target));
                }
                let selected = store.selection();
                for id in &selected.nodes {
                    prop_assert!(graph.nodes.contains_key(id));
                }
                for id in &selected.connections {
                    prop_assert!(graph.connections.contains_key(id));
                }
                prop_assert!(history.history_size() <= MAX_HISTORY);
            }
            Ok(())
        })?;
    }
}
