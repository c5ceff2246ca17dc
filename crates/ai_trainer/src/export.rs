//! Artifact export with staged, atomic publication
//!
//! A trained forest is wrapped in a single-node computation graph and written
//! to a temporary file next to the destination. The temporary file only
//! replaces the destination once [`StagedArtifact::persist`] is called, which
//! the pipeline does after verification. Dropping a staged artifact removes
//! the temporary file.

use pronounce_ai_core::graph::Graph;
use pronounce_ai_core::{Artifact, Producer, FEATURE_COUNT};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::errors::TrainerError;
use crate::trainer::RandomForest;

pub const GRAPH_NAME: &str = "pronunciation_random_forest";
pub const PRODUCER_NAME: &str = "pronounce-ai-trainer";

/// Class label emitted for each class index
pub const CLASS_LABELS: [i64; 2] = [0, 1];

/// Wrap a trained forest in a verified graph artifact
pub fn build_artifact(
    forest: &RandomForest,
    metadata: BTreeMap<String, String>,
) -> Result<Artifact, TrainerError> {
    if forest.n_features() != FEATURE_COUNT {
        return Err(TrainerError::Export(format!(
            "forest expects {} features, artifact contract is {}",
            forest.n_features(),
            FEATURE_COUNT
        )));
    }

    let producer = Producer {
        name: PRODUCER_NAME.to_string(),
        version: crate::VERSION.to_string(),
    };
    let graph = Graph::tree_ensemble_classifier(
        GRAPH_NAME,
        producer,
        forest.ensemble().clone(),
        CLASS_LABELS.to_vec(),
    );

    Ok(Artifact::new(graph, metadata)?)
}

/// An artifact written to a temporary file beside its destination
#[derive(Debug)]
pub struct StagedArtifact {
    file: NamedTempFile,
    destination: PathBuf,
    graph_hash: String,
}

impl StagedArtifact {
    /// Write `artifact` to a temporary file in `destination`'s directory
    pub fn stage(artifact: &Artifact, destination: &Path) -> Result<Self, TrainerError> {
        let dir = match destination.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;

        let mut file = tempfile::Builder::new()
            .prefix(".pronounce-export-")
            .suffix(".tmp")
            .tempfile_in(dir)?;
        artifact.write_to(file.as_file_mut())?;
        file.as_file().sync_all()?;

        debug!(staged = %file.path().display(), "Staged artifact");
        Ok(Self {
            file,
            destination: destination.to_path_buf(),
            graph_hash: artifact.graph_hash.clone(),
        })
    }

    /// Location of the staged bytes
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    pub fn graph_hash(&self) -> &str {
        &self.graph_hash
    }

    /// Atomically move the staged file onto the destination
    pub fn persist(self) -> Result<PathBuf, TrainerError> {
        let destination = self.destination;
        self.file
            .persist(&destination)
            .map_err(|err| TrainerError::Export(format!(
                "cannot move artifact to {}: {}",
                destination.display(),
                err.error
            )))?;
        info!(path = %destination.display(), hash = %self.graph_hash, "Artifact published");
        Ok(destination)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trainer::{ForestConfig, RandomForestTrainer};

    fn tiny_forest() -> RandomForest {
        let features: Vec<Vec<f32>> = (0..20)
            .map(|i| {
                let mut row = vec![0.0; FEATURE_COUNT];
                row[0] = if i % 2 == 0 { -1.0 } else { 1.0 };
                row[1] = i as f32;
                row
            })
            .collect();
        let labels: Vec<usize> = (0..20).map(|i| i % 2).collect();
        RandomForestTrainer::new(ForestConfig {
            n_trees: 3,
            ..ForestConfig::default()
        })
        .train(&features, &labels, 2)
        .unwrap()
    }

    #[test]
    fn test_artifact_declares_contract_shapes() {
        let artifact = build_artifact(&tiny_forest(), BTreeMap::new()).unwrap();
        let input = artifact.graph.input().unwrap();
        assert_eq!(input.name, "float_input");
        assert_eq!(input.shape, vec![None, Some(FEATURE_COUNT)]);
        assert_eq!(artifact.graph.outputs[0].name, "label");
    }

    #[test]
    fn test_dropped_stage_leaves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("model.json");
        let artifact = build_artifact(&tiny_forest(), BTreeMap::new()).unwrap();

        let staged = StagedArtifact::stage(&artifact, &destination).unwrap();
        let staged_path = staged.path().to_path_buf();
        assert!(staged_path.exists());
        drop(staged);

        assert!(!staged_path.exists());
        assert!(!destination.exists());
    }

    #[test]
    fn test_persist_publishes_loadable_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("nested").join("model.json");
        let artifact = build_artifact(&tiny_forest(), BTreeMap::new()).unwrap();

        let staged = StagedArtifact::stage(&artifact, &destination).unwrap();
        let hash = staged.graph_hash().to_string();
        let path = staged.persist().unwrap();

        let loaded = Artifact::load(&path).unwrap();
        assert_eq!(loaded.graph_hash, hash);
        assert_eq!(std::fs::read_dir(dir.path().join("nested")).unwrap().count(), 1);
    }
}
