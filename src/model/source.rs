use anyhow::{bail, Context, Result};
use hf_hub::api::sync::ApiBuilder;
use std::fmt;
use std::path::PathBuf;

/// Where the GGUF weights come from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ModelSource {
    /// An already downloaded file.
    Local(PathBuf),
    /// A file inside a Hugging Face repo; downloaded once into the local hub cache.
    HuggingFace { repo: String, file: String },
}

impl ModelSource {
    /// Prefer an explicit local path, otherwise go through the hub.
    pub fn from_parts(model_path: Option<PathBuf>, repo: &str, file: &str) -> Self {
        match model_path {
            Some(path) => Self::Local(path),
            None => Self::HuggingFace { repo: repo.to_string(), file: file.to_string() },
        }
    }

    /// Short name reported by the status endpoint.
    pub fn display_name(&self) -> String {
        match self {
            Self::Local(path) => path
                .file_stem()
                .and_then(|s| s.to_str())
                .map(str::to_string)
                .unwrap_or_else(|| path.display().to_string()),
            Self::HuggingFace { repo, .. } => repo.clone(),
        }
    }

    /// Blocking: may hit the network. Call from `spawn_blocking` inside async code.
    pub fn resolve(&self) -> Result<PathBuf> {
        match self {
            Self::Local(path) => {
                if !path.is_file() {
                    bail!("model file {:?} does not exist", path);
                }
                Ok(path.clone())
            }
            Self::HuggingFace { repo, file } => ApiBuilder::new()
                .with_progress(false)
                .build()
                .context("unable to create huggingface api")?
                .model(repo.clone())
                .get(file)
                .with_context(|| format!("unable to download {file} from {repo}")),
        }
    }
}

impl fmt::Display for ModelSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local(path) => write!(f, "{}", path.display()),
            Self::HuggingFace { repo, file } => write!(f, "hf://{repo}/{file}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn local_path_wins_over_hub() {
        let src = ModelSource::from_parts(Some("/tmp/m.gguf".into()), "org/repo", "m.gguf");
        assert_eq!(src, ModelSource::Local("/tmp/m.gguf".into()));
        assert_eq!(src.display_name(), "m");
    }

    #[test]
    fn hub_source_display() {
        let src = ModelSource::from_parts(None, "org/repo", "m.gguf");
        assert_eq!(src.to_string(), "hf://org/repo/m.gguf");
        assert_eq!(src.display_name(), "org/repo");
    }

    #[test]
    fn resolve_existing_local_file() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"GGUF").unwrap();
        let src = ModelSource::Local(f.path().to_path_buf());
        assert_eq!(src.resolve().unwrap(), f.path());
    }

    #[test]
    fn resolve_missing_local_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let src = ModelSource::Local(dir.path().join("nope.gguf"));
        let err = src.resolve().unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }
}
