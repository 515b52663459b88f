use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::models::{
    classifier::{ClassifierPair, FAKE, REAL},
    error::{Error, Result},
    naive_bayes::MultinomialNb,
    vectorizer::CountVectorizer,
};

pub const CLASSIFIER_FILE: &str = "nb_model.json";
pub const VECTORIZER_FILE: &str = "vectorizer_model.json";

const SAMPLE_INPUT: &str = "test input";

/// On-disk form of either half of the pair. The `kind` tag lets a load
/// reject a file holding the wrong half.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum PersistedModel {
    MultinomialNb(MultinomialNb),
    CountVectorizer(CountVectorizer),
}

impl PersistedModel {
    fn kind(&self) -> &'static str {
        match self {
            PersistedModel::MultinomialNb(_) => "multinomial_nb",
            PersistedModel::CountVectorizer(_) => "count_vectorizer",
        }
    }
}

#[derive(Debug)]
pub enum LoadResult {
    Loaded(ClassifierPair),
    Missing(String),
    Invalid(String),
}

/// Persists the classifier pair under one directory and regenerates it
/// from the bootstrap corpus whenever it cannot be used. Clones share
/// one regeneration lock.
#[derive(Debug, Clone)]
pub struct ClassifierStore {
    dir: PathBuf,
    regenerating: Arc<Mutex<()>>,
}

impl ClassifierStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            regenerating: Arc::new(Mutex::new(())),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns a usable pair. Only a failed write of a regenerated pair
    /// is reported as an error.
    pub async fn load(&self) -> Result<ClassifierPair> {
        if let LoadResult::Loaded(pair) = self.try_load().await {
            return Ok(pair);
        }

        let _guard = self.regenerating.lock().await;
        // Re-read under the lock: a concurrent caller may have just written it.
        match self.try_load().await {
            LoadResult::Loaded(pair) => {
                debug!(dir = %self.dir.display(), "Models regenerated by another caller");
                Ok(pair)
            }
            LoadResult::Missing(reason) => {
                warn!(dir = %self.dir.display(), "{reason}, creating new models");
                self.create_default().await
            }
            LoadResult::Invalid(reason) => {
                error!(dir = %self.dir.display(), "Model loading failed: {reason}");
                self.create_default().await
            }
        }
    }

    pub async fn try_load(&self) -> LoadResult {
        match tokio::fs::metadata(&self.dir).await {
            Ok(meta) if meta.is_dir() => {}
            _ => return LoadResult::Missing("models directory not found".to_string()),
        }

        let classifier = match self.read_model(CLASSIFIER_FILE).await {
            Ok(PersistedModel::MultinomialNb(model)) => model,
            Ok(other) => {
                return LoadResult::Invalid(format!(
                    "{CLASSIFIER_FILE} holds a {} model",
                    other.kind()
                ))
            }
            Err(result) => return result,
        };

        let vectorizer = match self.read_model(VECTORIZER_FILE).await {
            Ok(PersistedModel::CountVectorizer(model)) => model,
            Ok(other) => {
                return LoadResult::Invalid(format!(
                    "{VECTORIZER_FILE} holds a {} model",
                    other.kind()
                ))
            }
            Err(result) => return result,
        };

        let pair = ClassifierPair {
            classifier,
            vectorizer,
        };
        match validate(&pair) {
            Ok(()) => LoadResult::Loaded(pair),
            Err(reason) => LoadResult::Invalid(reason),
        }
    }

    async fn read_model(&self, file: &str) -> std::result::Result<PersistedModel, LoadResult> {
        let path = self.dir.join(file);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(LoadResult::Missing(format!("{file} not found")));
            }
            Err(e) => return Err(LoadResult::Invalid(format!("reading {file}: {e}"))),
        };
        serde_json::from_slice(&bytes)
            .map_err(|e| LoadResult::Invalid(format!("decoding {file}: {e}")))
    }

    /// Fits a fresh pair from the bootstrap corpus and persists it.
    pub async fn create_default(&self) -> Result<ClassifierPair> {
        info!("Creating new models...");
        let pair = ClassifierPair::bootstrap();
        if let Err(e) = self.save(&pair).await {
            error!("Model creation failed: {e}");
            return Err(e);
        }
        Ok(pair)
    }

    pub async fn save(&self, pair: &ClassifierPair) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| Error::PersistenceWrite {
                path: self.dir.display().to_string(),
                source,
            })?;

        self.write_model(
            CLASSIFIER_FILE,
            &PersistedModel::MultinomialNb(pair.classifier.clone()),
        )
        .await?;
        self.write_model(
            VECTORIZER_FILE,
            &PersistedModel::CountVectorizer(pair.vectorizer.clone()),
        )
        .await?;

        info!(dir = %self.dir.display(), "Models successfully saved");
        Ok(())
    }

    /// Writes to a uniquely named file next to the target and renames
    /// over it, so concurrent writers never share a temp file.
    async fn write_model(&self, file: &str, model: &PersistedModel) -> Result<()> {
        let path = self.dir.join(file);
        let tmp = self
            .dir
            .join(format!(".{file}.{:016x}.tmp", rand::random::<u64>()));
        let bytes = serde_json::to_vec(model)?;

        let write = async {
            tokio::fs::write(&tmp, &bytes).await?;
            tokio::fs::rename(&tmp, &path).await
        };
        if let Err(source) = write.await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(Error::PersistenceWrite {
                path: path.display().to_string(),
                source,
            });
        }
        Ok(())
    }
}

fn validate(pair: &ClassifierPair) -> std::result::Result<(), String> {
    if let Err(e) = pair.vectorizer.transform(SAMPLE_INPUT) {
        return Err(format!("vectorizer not properly fitted: {e}"));
    }
    if !pair.classifier.is_consistent() {
        return Err("classifier parameters have inconsistent shapes".to_string());
    }
    if pair.classifier.classes != [FAKE, REAL] {
        return Err(format!(
            "classifier trained on classes {:?}",
            pair.classifier.classes
        ));
    }
    if pair.classifier.n_features() != pair.vectorizer.n_features() {
        return Err(format!(
            "classifier expects {} features, vectorizer yields {}",
            pair.classifier.n_features(),
            pair.vectorizer.n_features()
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::models::classifier::Label;

    #[tokio::test]
    async fn missing_directory_is_created_with_a_default_pair() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ClassifierStore::new(tmp.path().join("models"));

        assert!(matches!(store.try_load().await, LoadResult::Missing(_)));

        let pair = store.load().await.unwrap();
        assert_eq!(pair, ClassifierPair::bootstrap());
        assert!(store.dir().join(CLASSIFIER_FILE).is_file());
        assert!(store.dir().join(VECTORIZER_FILE).is_file());
        assert!(leftover_temp_files(store.dir()).is_empty());
    }

    fn leftover_temp_files(dir: &Path) -> Vec<PathBuf> {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "tmp"))
            .collect()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_loads_on_a_missing_directory_all_succeed() {
        for _ in 0..20 {
            let tmp = tempfile::tempdir().unwrap();
            let store = ClassifierStore::new(tmp.path().join("models"));

            let loads: Vec<_> = (0..8)
                .map(|_| {
                    let store = store.clone();
                    tokio::spawn(async move { store.load().await })
                })
                .collect();

            for load in loads {
                let pair = load.await.unwrap().unwrap();
                assert_eq!(pair, ClassifierPair::bootstrap());
            }
            assert!(matches!(store.try_load().await, LoadResult::Loaded(_)));
            assert!(leftover_temp_files(store.dir()).is_empty());
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn independent_stores_on_one_directory_do_not_collide() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("models");

        let saves: Vec<_> = (0..8)
            .map(|_| {
                let store = ClassifierStore::new(dir.clone());
                tokio::spawn(async move { store.save(&ClassifierPair::bootstrap()).await })
            })
            .collect();
        for save in saves {
            save.await.unwrap().unwrap();
        }

        assert!(matches!(
            ClassifierStore::new(dir.clone()).try_load().await,
            LoadResult::Loaded(_)
        ));
        assert!(leftover_temp_files(&dir).is_empty());
    }

    #[tokio::test]
    async fn corrupted_file_is_regenerated_and_reloads_deterministically() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ClassifierStore::new(tmp.path());
        tokio::fs::write(tmp.path().join(CLASSIFIER_FILE), b"\x80not json")
            .await
            .unwrap();
        tokio::fs::write(tmp.path().join(VECTORIZER_FILE), b"{}")
            .await
            .unwrap();

        assert!(matches!(store.try_load().await, LoadResult::Invalid(_)));

        let created = store.load().await.unwrap();
        let reloaded = match store.try_load().await {
            LoadResult::Loaded(pair) => pair,
            other => panic!("expected a persisted pair, got {other:?}"),
        };

        assert_eq!(created, reloaded);
        for title in [
            "Verified report from trusted journalist",
            "Celebrity claims going viral",
            "Completely unrelated words here",
        ] {
            assert_eq!(
                created.predict(title).unwrap(),
                reloaded.predict(title).unwrap()
            );
        }
    }

    #[tokio::test]
    async fn swapped_files_are_rejected_as_wrong_kind() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ClassifierStore::new(tmp.path());
        store.save(&ClassifierPair::bootstrap()).await.unwrap();

        let nb = tokio::fs::read(tmp.path().join(CLASSIFIER_FILE)).await.unwrap();
        let vec = tokio::fs::read(tmp.path().join(VECTORIZER_FILE)).await.unwrap();
        tokio::fs::write(tmp.path().join(CLASSIFIER_FILE), vec).await.unwrap();
        tokio::fs::write(tmp.path().join(VECTORIZER_FILE), nb).await.unwrap();

        match store.try_load().await {
            LoadResult::Invalid(reason) => assert!(reason.contains("count_vectorizer")),
            other => panic!("expected invalid, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unfitted_vectorizer_is_invalid() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ClassifierStore::new(tmp.path());
        let mut pair = ClassifierPair::bootstrap();
        pair.vectorizer = CountVectorizer::default();
        store.save(&pair).await.unwrap();

        match store.try_load().await {
            LoadResult::Invalid(reason) => assert!(reason.contains("not properly fitted")),
            other => panic!("expected invalid, got {other:?}"),
        }
        let recovered = store.load().await.unwrap();
        assert_eq!(
            recovered.predict("False claims going viral on social media").unwrap().label,
            Label::Fake
        );
    }

    #[tokio::test]
    async fn mismatched_halves_are_regenerated_together() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ClassifierStore::new(tmp.path());
        let mut pair = ClassifierPair::bootstrap();
        pair.vectorizer.fit_transform(&["an entirely different vocabulary of words"]);
        store.save(&pair).await.unwrap();

        assert!(matches!(store.try_load().await, LoadResult::Invalid(_)));
        assert_eq!(store.load().await.unwrap(), ClassifierPair::bootstrap());
    }

    #[tokio::test]
    async fn unwritable_directory_propagates_persistence_error() {
        let tmp = tempfile::tempdir().unwrap();
        let blocker = tmp.path().join("not-a-dir");
        tokio::fs::write(&blocker, b"file").await.unwrap();
        let store = ClassifierStore::new(blocker.join("models"));

        let err = store.load().await.unwrap_err();
        assert!(matches!(err, Error::PersistenceWrite { .. }));
    }
}
