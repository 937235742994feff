// ============================================
// Model Artifact Persistence
// ============================================
//
// One training run writes two files into the model directory:
//   knn_model.bin          bincode(ModelArtifact)
//   product_mappings.json  json(ProductMappings)
//
// Both carry the run id. Each file is written to a temp path, synced, then
// renamed into place, so readers never see a half-written file. A reader that
// lands between the two renames sees differing run ids and rejects the pair.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info};
use uuid::Uuid;

use super::{KnnIndex, RecommenderError, Result};
use crate::models::ProductId;

pub const KNN_MODEL_FILE: &str = "knn_model.bin";
pub const PRODUCT_MAPPINGS_FILE: &str = "product_mappings.json";

/// Fitted index plus run metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub run_id: Uuid,
    pub trained_at: DateTime<Utc>,
    pub index: KnnIndex,
}

/// Product id ↔ matrix column index, both directions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductMappings {
    pub run_id: Uuid,
    pub id_to_idx: BTreeMap<ProductId, usize>,
    pub idx_to_id: BTreeMap<usize, ProductId>,
}

impl ProductMappings {
    /// Build both directions from the column order of the user-item matrix
    pub fn from_columns(run_id: Uuid, product_ids: &[ProductId]) -> Self {
        let id_to_idx: BTreeMap<ProductId, usize> = product_ids
            .iter()
            .enumerate()
            .map(|(idx, id)| (*id, idx))
            .collect();
        let idx_to_id = id_to_idx.iter().map(|(id, idx)| (*idx, *id)).collect();

        Self {
            run_id,
            id_to_idx,
            idx_to_id,
        }
    }
}

/// Index and mappings from the same training run, checked for consistency
#[derive(Debug, Clone)]
pub struct LoadedModel {
    artifact: ModelArtifact,
    mappings: ProductMappings,
}

impl LoadedModel {
    pub fn new(artifact: ModelArtifact, mappings: ProductMappings) -> Result<Self> {
        artifact
            .index
            .validate()
            .map_err(RecommenderError::ArtifactCorrupt)?;

        if artifact.run_id != mappings.run_id {
            return Err(RecommenderError::ArtifactMismatch(format!(
                "index from run {} but mappings from run {}",
                artifact.run_id, mappings.run_id
            )));
        }

        let n_items = artifact.index.n_items();
        if mappings.id_to_idx.len() != n_items || mappings.idx_to_id.len() != n_items {
            return Err(RecommenderError::ArtifactMismatch(format!(
                "index has {} items but mappings have {}/{} entries",
                n_items,
                mappings.id_to_idx.len(),
                mappings.idx_to_id.len()
            )));
        }

        for (id, idx) in &mappings.id_to_idx {
            if *idx >= n_items || mappings.idx_to_id.get(idx) != Some(id) {
                return Err(RecommenderError::ArtifactMismatch(format!(
                    "product {} maps to index {} inconsistently",
                    id, idx
                )));
            }
        }

        Ok(Self { artifact, mappings })
    }

    pub fn run_id(&self) -> Uuid {
        self.artifact.run_id
    }

    pub fn trained_at(&self) -> DateTime<Utc> {
        self.artifact.trained_at
    }

    pub fn index(&self) -> &KnnIndex {
        &self.artifact.index
    }

    pub fn mappings(&self) -> &ProductMappings {
        &self.mappings
    }

    pub fn index_of(&self, product_id: ProductId) -> Option<usize> {
        self.mappings.id_to_idx.get(&product_id).copied()
    }

    pub fn product_at(&self, index: usize) -> Option<ProductId> {
        self.mappings.idx_to_id.get(&index).copied()
    }
}

/// Leading field of `ModelArtifact`; bincode reads it without the index
#[derive(Deserialize)]
struct ModelHeader {
    run_id: Uuid,
}

/// Modification stamp of the artifact pair, used to detect retraining
///
/// The run id catches a same-size rewrite inside one mtime tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArtifactStamp {
    model_run_id: Option<Uuid>,
    model_modified: SystemTime,
    model_len: u64,
    mappings_modified: SystemTime,
    mappings_len: u64,
}

/// Directory holding the artifact pair
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn model_path(&self) -> PathBuf {
        self.dir.join(KNN_MODEL_FILE)
    }

    pub fn mappings_path(&self) -> PathBuf {
        self.dir.join(PRODUCT_MAPPINGS_FILE)
    }

    /// Both files present
    pub fn exists(&self) -> bool {
        self.model_path().is_file() && self.mappings_path().is_file()
    }

    /// None when either file is missing
    pub fn stamp(&self) -> Option<ArtifactStamp> {
        let model = fs::metadata(self.model_path()).ok()?;
        let mappings = fs::metadata(self.mappings_path()).ok()?;
        Some(ArtifactStamp {
            model_run_id: self.model_run_id(),
            model_modified: model.modified().ok()?,
            model_len: model.len(),
            mappings_modified: mappings.modified().ok()?,
            mappings_len: mappings.len(),
        })
    }

    /// Run id of the persisted index, None when unreadable
    fn model_run_id(&self) -> Option<Uuid> {
        let file = fs::File::open(self.model_path()).ok()?;
        bincode::deserialize_from::<_, ModelHeader>(BufReader::new(file))
            .ok()
            .map(|header| header.run_id)
    }

    /// Persist one training run, replacing any previous pair
    pub fn save(&self, artifact: &ModelArtifact, mappings: &ProductMappings) -> Result<()> {
        if artifact.run_id != mappings.run_id {
            return Err(RecommenderError::ArtifactMismatch(
                "refusing to save artifacts from different runs".to_string(),
            ));
        }

        fs::create_dir_all(&self.dir)?;

        let model_bytes = bincode::serialize(artifact)
            .map_err(|e| RecommenderError::ArtifactCorrupt(e.to_string()))?;
        let mapping_bytes = serde_json::to_vec_pretty(mappings)
            .map_err(|e| RecommenderError::ArtifactCorrupt(e.to_string()))?;

        // Stage both before publishing either
        let model_tmp = self.write_temp(KNN_MODEL_FILE, artifact.run_id, &model_bytes)?;
        let mappings_tmp =
            match self.write_temp(PRODUCT_MAPPINGS_FILE, artifact.run_id, &mapping_bytes) {
                Ok(path) => path,
                Err(err) => {
                    let _ = fs::remove_file(&model_tmp);
                    return Err(err);
                }
            };

        if let Err(err) = fs::rename(&model_tmp, self.model_path()) {
            let _ = fs::remove_file(&model_tmp);
            let _ = fs::remove_file(&mappings_tmp);
            return Err(err.into());
        }
        if let Err(err) = fs::rename(&mappings_tmp, self.mappings_path()) {
            let _ = fs::remove_file(&mappings_tmp);
            return Err(err.into());
        }

        info!(
            run_id = %artifact.run_id,
            model_path = %self.model_path().display(),
            mappings_path = %self.mappings_path().display(),
            "Model artifacts saved"
        );

        Ok(())
    }

    /// Load and cross-check the artifact pair
    pub fn load(&self) -> Result<LoadedModel> {
        let model_path = self.model_path();
        let mappings_path = self.mappings_path();

        if !model_path.is_file() || !mappings_path.is_file() {
            return Err(RecommenderError::ArtifactMissing);
        }

        let model_bytes = fs::read(&model_path).map_err(|e| read_error(&model_path, e))?;
        let artifact: ModelArtifact = bincode::deserialize(&model_bytes).map_err(|e| {
            RecommenderError::ArtifactCorrupt(format!("{}: {}", model_path.display(), e))
        })?;

        let mapping_bytes = fs::read(&mappings_path).map_err(|e| read_error(&mappings_path, e))?;
        let mappings: ProductMappings = serde_json::from_slice(&mapping_bytes).map_err(|e| {
            RecommenderError::ArtifactCorrupt(format!("{}: {}", mappings_path.display(), e))
        })?;

        debug!(
            run_id = %artifact.run_id,
            items = artifact.index.n_items(),
            "Model artifacts read"
        );

        LoadedModel::new(artifact, mappings)
    }

    fn write_temp(&self, name: &str, run_id: Uuid, bytes: &[u8]) -> Result<PathBuf> {
        let tmp = self.dir.join(format!(".{}.{}.tmp", name, run_id));
        let mut file = fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        Ok(tmp)
    }
}

fn read_error(path: &Path, err: std::io::Error) -> RecommenderError {
    if err.kind() == std::io::ErrorKind::NotFound {
        RecommenderError::ArtifactMissing
    } else {
        RecommenderError::ArtifactCorrupt(format!("{}: {}", path.display(), err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::recommender::SparseBinaryMatrix;
    use tempfile::TempDir;

    fn sample(run_id: Uuid) -> (ModelArtifact, ProductMappings) {
        let m = SparseBinaryMatrix::from_coords(2, 2, &[(0, 0), (1, 0), (1, 1)]);
        let artifact = ModelArtifact {
            run_id,
            trained_at: Utc::now(),
            index: KnnIndex::fit(&m, 10),
        };
        let mappings = ProductMappings::from_columns(run_id, &[41, 42]);
        (artifact, mappings)
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path().join("nested/models"));
        let run_id = Uuid::new_v4();
        let (artifact, mappings) = sample(run_id);

        store.save(&artifact, &mappings).unwrap();
        assert!(store.exists());

        let loaded = store.load().unwrap();
        assert_eq!(loaded.run_id(), run_id);
        assert_eq!(loaded.index_of(42), Some(1));
        assert_eq!(loaded.product_at(0), Some(41));
        assert_eq!(loaded.index(), &artifact.index);
    }

    #[test]
    fn test_no_temp_files_left_behind() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path());
        let (artifact, mappings) = sample(Uuid::new_v4());
        store.save(&artifact, &mappings).unwrap();

        let names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 2);
        assert!(names.iter().all(|n| !n.ends_with(".tmp")));
    }

    #[test]
    fn test_failed_publish_cleans_up_temp_files() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path());
        // A directory squatting on the mappings path makes the second rename fail
        fs::create_dir_all(store.mappings_path().join("occupied")).unwrap();

        let (artifact, mappings) = sample(Uuid::new_v4());
        assert!(matches!(
            store.save(&artifact, &mappings),
            Err(RecommenderError::Io(_))
        ));

        let leftovers: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|n| n.ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty(), "left behind: {:?}", leftovers);
    }

    #[test]
    fn test_stamp_changes_with_run_even_when_metadata_matches() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path());
        let trained_at = Utc::now();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        let (mut artifact, mappings) = sample(first);
        artifact.trained_at = trained_at;
        store.save(&artifact, &mappings).unwrap();
        let model_mtime = fs::metadata(store.model_path()).unwrap().modified().unwrap();
        let mappings_mtime = fs::metadata(store.mappings_path()).unwrap().modified().unwrap();
        let before = store.stamp().unwrap();

        let (mut artifact, mappings) = sample(second);
        artifact.trained_at = trained_at;
        store.save(&artifact, &mappings).unwrap();
        // Same sizes; pin the mtimes to emulate a coarse-grained filesystem clock
        for (path, mtime) in [
            (store.model_path(), model_mtime),
            (store.mappings_path(), mappings_mtime),
        ] {
            fs::File::options()
                .write(true)
                .open(path)
                .unwrap()
                .set_modified(mtime)
                .unwrap();
        }

        let after = store.stamp().unwrap();
        assert_eq!(after.model_len, before.model_len);
        assert_eq!(after.model_modified, before.model_modified);
        assert_ne!(after, before);
        assert_eq!(after.model_run_id, Some(second));
    }

    #[test]
    fn test_missing_artifacts() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path());
        assert!(store.stamp().is_none());
        assert!(matches!(store.load(), Err(RecommenderError::ArtifactMissing)));
    }

    #[test]
    fn test_mappings_from_other_run_rejected() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path());
        let (artifact, _) = sample(Uuid::new_v4());
        let (other, other_mappings) = sample(Uuid::new_v4());
        store.save(&other, &other_mappings).unwrap();

        // Simulate a torn replace: new index next to old mappings
        fs::write(store.model_path(), bincode::serialize(&artifact).unwrap()).unwrap();

        assert!(matches!(
            store.load(),
            Err(RecommenderError::ArtifactMismatch(_))
        ));
    }

    #[test]
    fn test_corrupt_index_rejected() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path());
        let (artifact, mappings) = sample(Uuid::new_v4());
        store.save(&artifact, &mappings).unwrap();

        fs::write(store.model_path(), b"not a model").unwrap();
        assert!(matches!(
            store.load(),
            Err(RecommenderError::ArtifactCorrupt(_))
        ));
    }

    #[test]
    fn test_shape_mismatch_rejected() {
        let run_id = Uuid::new_v4();
        let (artifact, _) = sample(run_id);
        let mappings = ProductMappings::from_columns(run_id, &[41, 42, 43]);
        assert!(matches!(
            LoadedModel::new(artifact, mappings),
            Err(RecommenderError::ArtifactMismatch(_))
        ));
    }
}
