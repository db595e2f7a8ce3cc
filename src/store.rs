//! Result Store
//!
//! One pretty-printed JSON file per paper: `{dir}/{title}_analysis.json`.

use std::io;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::pipeline::AnalysisResult;

/// Storage errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("No stored analysis for '{title}' at {}", path.display())]
    NotFound { title: String, path: PathBuf },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid analysis file {}: {source}", path.display())]
    Serialization {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone)]
pub struct ResultStore {
    dir: PathBuf,
}

impl ResultStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File that holds the analysis for `title`
    pub fn path_for(&self, title: &str) -> PathBuf {
        self.dir
            .join(format!("{}_analysis.json", sanitize_title(title)))
    }

    /// Write `result` under `title`, replacing any previous analysis
    pub async fn save(&self, title: &str, result: &AnalysisResult) -> Result<PathBuf, StoreError> {
        let path = self.path_for(title);

        let json = serde_json::to_string_pretty(result).map_err(|source| StoreError::Serialization {
            path: path.clone(),
            source,
        })?;

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| StoreError::Io {
                path: self.dir.clone(),
                source,
            })?;
        tokio::fs::write(&path, json)
            .await
            .map_err(|source| StoreError::Io {
                path: path.clone(),
                source,
            })?;

        info!(path = %path.display(), "Analysis saved");
        Ok(path)
    }

    pub async fn load(&self, title: &str) -> Result<AnalysisResult, StoreError> {
        let path = self.path_for(title);

        let json = match tokio::fs::read_to_string(&path).await {
            Ok(json) => json,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound {
                    title: title.to_string(),
                    path,
                })
            }
            Err(source) => return Err(StoreError::Io { path, source }),
        };

        serde_json::from_str(&json).map_err(|source| StoreError::Serialization { path, source })
    }
}

/// Make a title safe to use as a file name
pub fn sanitize_title(title: &str) -> String {
    let cleaned: String = title
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    // A bare "." or ".." would escape the directory
    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        "untitled".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Section;

    fn sample() -> AnalysisResult {
        AnalysisResult {
            section_analyses: [(Section::Introduction, "Clear motivation".to_string())]
                .into_iter()
                .collect(),
            final_synthesis: "A solid paper.".to_string(),
            page_summaries: [(0, "Title page.".to_string()), (1, "Methods.".to_string())]
                .into_iter()
                .collect(),
        }
    }

    #[test]
    fn test_sanitize_title() {
        assert_eq!(sanitize_title("Deep Nets for Proteins"), "Deep Nets for Proteins");
        assert_eq!(sanitize_title("A/B Testing: Why?"), "A_B Testing_ Why_");
        assert_eq!(sanitize_title("  "), "untitled");
        assert_eq!(sanitize_title(".."), "untitled");
    }

    #[test]
    fn test_path_for() {
        let store = ResultStore::new("/data/results");
        assert_eq!(
            store.path_for("My Paper"),
            PathBuf::from("/data/results/My Paper_analysis.json")
        );
    }

    #[tokio::test]
    async fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = ResultStore::new(dir.path().join("nested"));

        let path = store.save("My Paper", &sample()).await.unwrap();
        assert!(path.exists());

        let loaded = store.load("My Paper").await.unwrap();
        assert_eq!(loaded, sample());
    }

    #[tokio::test]
    async fn test_pretty_json_layout() {
        let dir = tempfile::tempdir().unwrap();
        let store = ResultStore::new(dir.path());
        let path = store.save("Layout", &sample()).await.unwrap();

        let text = tokio::fs::read_to_string(path).await.unwrap();
        assert!(text.starts_with("{\n  \"section_analyses\""));
        assert!(text.contains("\"0\": \"Title page.\""));
    }

    #[tokio::test]
    async fn test_missing_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = ResultStore::new(dir.path());
        assert!(matches!(
            store.load("Nothing here").await,
            Err(StoreError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = ResultStore::new(dir.path());
        tokio::fs::write(store.path_for("Bad"), "{ not json").await.unwrap();

        assert!(matches!(
            store.load("Bad").await,
            Err(StoreError::Serialization { .. })
        ));
    }
}
