//! Integration tests for the exported artifact contract
//!
//! An artifact written to disk and loaded back through a `Session` must
//! classify exactly like the ensemble it was built from.

use anyhow::Result;
use pronounce_ai_core::graph::{Artifact, Graph, Producer};
use pronounce_ai_core::{Node, Session, Tree, TreeEnsemble, CoreError, FEATURE_COUNT, SCALE};
use proptest::prelude::*;
use std::collections::BTreeMap;

fn producer() -> Producer {
    Producer {
        name: "integration-test".to_string(),
        version: pronounce_ai_core::VERSION.to_string(),
    }
}

/// Trees with awkward float thresholds so a lossy encoder would be caught
fn ensemble() -> TreeEnsemble {
    let thresholds = [0.1f32, -3.3333333, 1.0e-7, 47.123_455, -0.000_1];
    let trees = thresholds
        .iter()
        .enumerate()
        .map(|(i, &t)| {
            Tree::new(vec![
                Node::internal(0, (i * 7 % FEATURE_COUNT) as i32, t, 1, 4),
                Node::internal(1, (i * 3 % FEATURE_COUNT) as i32, -t, 2, 3),
                Node::leaf(2, vec![SCALE, 0]),
                Node::leaf(3, vec![SCALE / 3, SCALE - SCALE / 3]),
                Node::leaf(4, vec![SCALE / 5, SCALE - SCALE / 5]),
            ])
        })
        .collect();
    TreeEnsemble::new(trees, FEATURE_COUNT, 2)
}

fn saved_session(dir: &tempfile::TempDir) -> Result<Session> {
    let graph = Graph::tree_ensemble_classifier("roundtrip", producer(), ensemble(), vec![0, 1]);
    let path = dir.path().join("forest.json");
    Artifact::new(graph, BTreeMap::new())?.save(&path)?;
    Ok(Session::load(&path)?)
}

#[test]
fn test_artifact_declares_feature_contract() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let session = saved_session(&dir)?;

    assert_eq!(session.input().shape, vec![None, Some(FEATURE_COUNT)]);
    assert_eq!(session.input_width(), 39);
    Ok(())
}

#[test]
fn test_corrupted_file_is_rejected() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("forest.json");
    let graph = Graph::tree_ensemble_classifier("roundtrip", producer(), ensemble(), vec![0, 1]);
    Artifact::new(graph, BTreeMap::new())?.save(&path)?;

    let text = std::fs::read_to_string(&path)?;
    std::fs::write(&path, text.replace("\"n_classes\": 2", "\"n_classes\": 3"))?;

    let err = Session::load(&path).unwrap_err();
    assert!(matches!(err, CoreError::HashMismatch { .. }));
    Ok(())
}

proptest! {
    #[test]
    fn prop_loaded_artifact_matches_in_memory_ensemble(
        rows in prop::collection::vec(prop::collection::vec(-50.0f32..50.0, FEATURE_COUNT), 1..20)
    ) {
        let dir = tempfile::tempdir().unwrap();
        let session = saved_session(&dir).unwrap();
        let in_memory = ensemble();

        let exported = session.run(&rows).unwrap();
        let expected: Vec<i64> = in_memory
            .predict_batch(&rows)
            .unwrap()
            .into_iter()
            .map(|c| c as i64)
            .collect();

        prop_assert_eq!(exported.labels, expected);
    }
}
