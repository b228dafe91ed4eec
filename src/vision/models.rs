//! Model management for ONNX Runtime
//!
//! Handles downloading, caching, and loading of PaddleOCR models.

use anyhow::{Context, Result};
use futures_util::{Stream, StreamExt};
use ort::session::{builder::GraphOptimizationLevel, Session};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::runtime::Runtime;
use tracing::{debug, info, warn};

/// Environment variable that forbids model downloads
pub const OFFLINE_ENV: &str = "PLATE_READER_OFFLINE";

const MANIFEST_FILE: &str = "manifest.json";
const HF_REPO: &str = "https://huggingface.co/monkt/paddleocr-onnx/resolve/main";

/// One file of the PaddleOCR model set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelType {
    /// Text detection model (DBNet)
    Detection,
    /// Text recognition model (CRNN)
    Recognition,
    /// Character dictionary for recognition
    Dictionary,
}

impl ModelType {
    pub const ALL: [ModelType; 3] = [ModelType::Detection, ModelType::Recognition, ModelType::Dictionary];

    pub fn filename(&self) -> &'static str {
        match self {
            ModelType::Detection => "det.onnx",
            ModelType::Recognition => "rec.onnx",
            ModelType::Dictionary => "dict.txt",
        }
    }

    /// Path of the file inside the Hugging Face repository
    fn remote_path(&self) -> &'static str {
        match self {
            ModelType::Detection => "detection/v3/det.onnx",
            // English recognition covers A-Z and 0-9
            ModelType::Recognition => "languages/english/rec.onnx",
            ModelType::Dictionary => "languages/english/dict.txt",
        }
    }

    pub fn download_url(&self) -> String {
        format!("{}/{}", HF_REPO, self.remote_path())
    }

    /// Plausible file sizes in bytes; anything outside is a truncated or wrong file
    pub fn expected_size_range(&self) -> (u64, u64) {
        match self {
            ModelType::Detection => (2_000_000, 5_000_000),
            ModelType::Recognition => (7_000_000, 10_000_000),
            ModelType::Dictionary => (500, 10_000),
        }
    }

    /// Pinned SHA-256, `None` skips verification
    pub fn expected_sha256(&self) -> Option<&'static str> {
        None
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ModelType::Detection => "Text Detection",
            ModelType::Recognition => "Text Recognition",
            ModelType::Dictionary => "Character Dictionary",
        }
    }
}

/// Locations of a complete model set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelPaths {
    pub detection: PathBuf,
    pub recognition: PathBuf,
    pub dictionary: PathBuf,
}

/// On-disk state of one model file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelStatus {
    pub model: ModelType,
    pub path: PathBuf,
    /// File size, `None` when missing
    pub size: Option<u64>,
    /// Present with a plausible size
    pub ready: bool,
}

/// Record of downloaded files, kept as `manifest.json` in the models directory
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelManifest {
    pub models: Vec<ManifestEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub filename: String,
    pub size_bytes: u64,
    pub sha256: String,
    /// Seconds since the Unix epoch
    pub downloaded_at: u64,
}

/// Downloads and caches the model set in one directory
pub struct ModelManager {
    models_dir: PathBuf,
    offline: bool,
}

impl ModelManager {
    /// Manager for `<data dir>/models`
    pub fn new() -> Result<Self> {
        let data_dir = crate::storage::get_data_dir()?;
        Self::with_dir(data_dir.join("models"))
    }

    pub fn with_dir(models_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&models_dir)
            .with_context(|| format!("Failed to create models directory {}", models_dir.display()))?;
        Ok(Self {
            models_dir,
            offline: false,
        })
    }

    /// Forbid downloads regardless of the environment
    pub fn with_offline(mut self, offline: bool) -> Self {
        self.offline = offline;
        self
    }

    pub fn models_dir(&self) -> &Path {
        &self.models_dir
    }

    fn is_offline(&self) -> bool {
        self.offline || std::env::var_os(OFFLINE_ENV).is_some()
    }

    pub fn model_path(&self, model: ModelType) -> PathBuf {
        self.models_dir.join(model.filename())
    }

    pub fn model_paths(&self) -> ModelPaths {
        ModelPaths {
            detection: self.model_path(ModelType::Detection),
            recognition: self.model_path(ModelType::Recognition),
            dictionary: self.model_path(ModelType::Dictionary),
        }
    }

    pub fn status(&self, model: ModelType) -> ModelStatus {
        let path = self.model_path(model);
        let size = std::fs::metadata(&path).ok().filter(|m| m.is_file()).map(|m| m.len());
        let (min, max) = model.expected_size_range();
        ModelStatus {
            model,
            path,
            size,
            ready: size.is_some_and(|s| s >= min && s <= max),
        }
    }

    pub fn is_model_available(&self, model: ModelType) -> bool {
        self.status(model).ready
    }

    /// Return the model's path, downloading it first if needed
    pub fn ensure_model(&self, model: ModelType) -> Result<PathBuf> {
        let path = self.model_path(model);
        if self.is_model_available(model) {
            debug!("{} already available at {:?}", model.display_name(), path);
            return Ok(path);
        }

        self.download(model)?;
        Ok(path)
    }

    pub fn ensure_all_models(&self) -> Result<ModelPaths> {
        for model in ModelType::ALL {
            self.ensure_model(model)?;
        }
        Ok(self.model_paths())
    }

    /// Download one model, replacing whatever is on disk
    pub fn download(&self, model: ModelType) -> Result<()> {
        let url = model.download_url();
        let path = self.model_path(model);

        if self.is_offline() {
            anyhow::bail!(
                "Offline mode: cannot download {} model. Download it manually from {} and place it at {:?}",
                model.display_name(),
                url,
                path
            );
        }

        info!("Downloading {} model from {}", model.display_name(), url);

        let rt = Runtime::new().context("Failed to create tokio runtime")?;
        let sha256 = rt.block_on(fetch(&url, &path.with_extension("tmp")))?;

        if let Some(expected) = model.expected_sha256() {
            if sha256 != expected {
                std::fs::remove_file(path.with_extension("tmp")).ok();
                anyhow::bail!(
                    "Checksum mismatch for {}: expected {}, got {}",
                    model.filename(),
                    expected,
                    sha256
                );
            }
        }

        std::fs::rename(path.with_extension("tmp"), &path)
            .context("Failed to move downloaded file to final location")?;

        let status = self.status(model);
        if !status.ready {
            anyhow::bail!(
                "Downloaded {} model has an unexpected size ({:?} bytes)",
                model.display_name(),
                status.size
            );
        }

        self.record_download(model, status.size.unwrap_or_default(), sha256)?;
        info!("Downloaded {} model", model.display_name());
        Ok(())
    }

    fn record_download(&self, model: ModelType, size_bytes: u64, sha256: String) -> Result<()> {
        let mut manifest = self.load_manifest().unwrap_or_else(|e| {
            warn!("Ignoring unreadable model manifest: {}", e);
            ModelManifest::default()
        });

        let entry = ManifestEntry {
            filename: model.filename().to_string(),
            size_bytes,
            sha256,
            downloaded_at: SystemTime::now()
                .duration_since(SystemTime::UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
        };

        manifest.models.retain(|m| m.filename != entry.filename);
        manifest.models.push(entry);
        self.save_manifest(&manifest)
    }

    pub fn load_manifest(&self) -> Result<ModelManifest> {
        let manifest_path = self.models_dir.join(MANIFEST_FILE);
        if !manifest_path.exists() {
            return Ok(ModelManifest::default());
        }
        let content = std::fs::read_to_string(&manifest_path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save_manifest(&self, manifest: &ModelManifest) -> Result<()> {
        let content = serde_json::to_string_pretty(manifest)?;
        std::fs::write(self.models_dir.join(MANIFEST_FILE), content)?;
        Ok(())
    }
}

/// GET `url` into `temp_path`, returning the SHA-256 of the body
async fn fetch(url: &str, temp_path: &Path) -> Result<String> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(300))
        .build()
        .context("Failed to create HTTP client")?;

    let response = client
        .get(url)
        .send()
        .await
        .context("Failed to send download request")?;

    if !response.status().is_success() {
        anyhow::bail!("Download failed with status {}: {}", response.status(), url);
    }
    debug!("Download size: {:?} bytes", response.content_length());

    stream_to_file(response.bytes_stream(), temp_path).await
}

/// Write a byte stream to `temp_path`, hashing as it goes
///
/// The file is removed again when the stream or a write fails.
async fn stream_to_file<S, B, E>(stream: S, temp_path: &Path) -> Result<String>
where
    S: Stream<Item = std::result::Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: std::error::Error + Send + Sync + 'static,
{
    let written = write_chunks(stream, temp_path).await;
    if written.is_err() {
        std::fs::remove_file(temp_path).ok();
    }
    written
}

async fn write_chunks<S, B, E>(mut stream: S, temp_path: &Path) -> Result<String>
where
    S: Stream<Item = std::result::Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: std::error::Error + Send + Sync + 'static,
{
    let mut file = std::fs::File::create(temp_path)
        .with_context(|| format!("Failed to create {}", temp_path.display()))?;
    let mut hasher = Sha256::new();
    let mut written: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.context("Error reading download stream")?;
        let bytes = chunk.as_ref();
        file.write_all(bytes).context("Failed to write to temp file")?;
        hasher.update(bytes);
        written += bytes.len() as u64;
    }

    file.flush().context("Failed to flush temp file")?;
    debug!("Wrote {} bytes to {}", written, temp_path.display());

    Ok(format!("{:x}", hasher.finalize()))
}

/// ONNX Runtime session with a single tensor input
pub struct OnnxSession {
    session: Session,
    input_name: String,
}

impl OnnxSession {
    /// CPU session
    pub fn new(model_path: &Path, intra_threads: usize) -> Result<Self> {
        info!("Loading ONNX model from {:?}", model_path);

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(intra_threads.max(1))?
            .commit_from_file(model_path)
            .with_context(|| format!("Failed to load ONNX model {:?}", model_path))?;

        Self::from_session(session)
    }

    /// Session with GPU acceleration if available, CPU otherwise
    pub fn new_with_gpu(model_path: &Path, intra_threads: usize) -> Result<Self> {
        info!("Loading ONNX model with GPU acceleration from {:?}", model_path);

        let builder = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(intra_threads.max(1))?;

        #[cfg(target_os = "windows")]
        let builder = {
            use ort::execution_providers::DirectMLExecutionProvider;
            match builder.with_execution_providers([DirectMLExecutionProvider::default().build()]) {
                Ok(builder) => {
                    info!("DirectML GPU acceleration enabled");
                    builder
                }
                Err(e) => {
                    warn!("DirectML not available, using CPU: {}", e);
                    Session::builder()?
                        .with_optimization_level(GraphOptimizationLevel::Level3)?
                        .with_intra_threads(intra_threads.max(1))?
                }
            }
        };

        #[cfg(not(target_os = "windows"))]
        warn!("No GPU execution provider on this platform, using CPU");

        let session = builder
            .commit_from_file(model_path)
            .with_context(|| format!("Failed to load ONNX model {:?}", model_path))?;

        Self::from_session(session)
    }

    fn from_session(session: Session) -> Result<Self> {
        let input_name = session
            .inputs
            .first()
            .map(|input| input.name.clone())
            .context("ONNX model has no inputs")?;

        debug!(
            "Model loaded. Input: {}, outputs: {:?}",
            input_name,
            session.outputs.iter().map(|o| o.name.as_str()).collect::<Vec<_>>()
        );

        Ok(Self { session, input_name })
    }

    /// Run the model and copy out the first output as (shape, data)
    pub fn run_single(&mut self, shape: &[usize], data: Vec<f32>) -> Result<(Vec<usize>, Vec<f32>)> {
        let input_value = ort::value::Value::from_array((shape, data))?;
        let outputs = self
            .session
            .run(ort::inputs![self.input_name.as_str() => input_value])?;

        let (output_shape, output_data) = outputs[0].try_extract_tensor::<f32>()?;
        let dims = output_shape.iter().map(|&d| d.max(0) as usize).collect();

        Ok((dims, output_data.to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;
    use tempfile::TempDir;

    fn manager() -> (TempDir, ModelManager) {
        let dir = TempDir::new().unwrap();
        let manager = ModelManager::with_dir(dir.path().join("models")).unwrap();
        (dir, manager)
    }

    fn sha256_hex(data: &[u8]) -> String {
        format!("{:x}", Sha256::digest(data))
    }

    #[test]
    fn test_download_urls() {
        assert_eq!(
            ModelType::Detection.download_url(),
            "https://huggingface.co/monkt/paddleocr-onnx/resolve/main/detection/v3/det.onnx"
        );
        assert!(ModelType::Dictionary.download_url().ends_with("/languages/english/dict.txt"));
    }

    #[test]
    fn test_with_dir_creates_directory() {
        let (_dir, manager) = manager();
        assert!(manager.models_dir().is_dir());
    }

    #[test]
    fn test_status_when_missing() {
        let (_dir, manager) = manager();
        for model in ModelType::ALL {
            let status = manager.status(model);
            assert!(!status.ready);
            assert_eq!(status.size, None);
            assert_eq!(status.path, manager.models_dir().join(model.filename()));
        }
    }

    #[test]
    fn test_size_range_check() {
        let (_dir, manager) = manager();
        let dict = manager.model_path(ModelType::Dictionary);

        std::fs::write(&dict, "A").unwrap();
        let status = manager.status(ModelType::Dictionary);
        assert_eq!(status.size, Some(1));
        assert!(!status.ready);

        std::fs::write(&dict, "A\n".repeat(400)).unwrap();
        assert!(manager.is_model_available(ModelType::Dictionary));
    }

    #[test]
    fn test_offline_refuses_download() {
        let (_dir, manager) = manager();
        let manager = manager.with_offline(true);

        let err = manager.ensure_model(ModelType::Detection).unwrap_err();
        assert!(err.to_string().contains("Offline mode"));
        assert!(!manager.model_path(ModelType::Detection).with_extension("tmp").exists());
    }

    #[test]
    fn test_offline_uses_cached_model() {
        let (_dir, manager) = manager();
        let manager = manager.with_offline(true);
        std::fs::write(manager.model_path(ModelType::Dictionary), "0\n".repeat(300)).unwrap();

        let path = manager.ensure_model(ModelType::Dictionary).unwrap();
        assert_eq!(path, manager.models_dir().join("dict.txt"));
    }

    #[test]
    fn test_record_download_replaces_entry() {
        let (_dir, manager) = manager();
        assert!(manager.load_manifest().unwrap().models.is_empty());

        manager.record_download(ModelType::Dictionary, 10, "aa".to_string()).unwrap();
        manager.record_download(ModelType::Dictionary, 600, "bb".to_string()).unwrap();
        manager.record_download(ModelType::Detection, 3_000_000, "cc".to_string()).unwrap();

        let manifest = manager.load_manifest().unwrap();
        assert_eq!(manifest.models.len(), 2);
        let dict = manifest.models.iter().find(|m| m.filename == "dict.txt").unwrap();
        assert_eq!(dict.size_bytes, 600);
        assert_eq!(dict.sha256, "bb");
    }

    #[test]
    fn test_stream_to_file_hashes_body() {
        let dir = TempDir::new().unwrap();
        let temp_path = dir.path().join("dict.tmp");
        let chunks = stream::iter(vec![
            Ok::<_, std::io::Error>(b"A\n".to_vec()),
            Ok(b"B\n".to_vec()),
        ]);

        let rt = Runtime::new().unwrap();
        let hash = rt.block_on(stream_to_file(chunks, &temp_path)).unwrap();

        assert_eq!(hash, sha256_hex(b"A\nB\n"));
        assert_eq!(std::fs::read(&temp_path).unwrap(), b"A\nB\n");
    }

    #[test]
    fn test_stream_error_removes_temp_file() {
        let dir = TempDir::new().unwrap();
        let temp_path = dir.path().join("det.tmp");
        let chunks = stream::iter(vec![
            Ok(b"partial".to_vec()),
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "connection reset")),
        ]);

        let rt = Runtime::new().unwrap();
        let err = rt.block_on(stream_to_file(chunks, &temp_path)).unwrap_err();

        assert!(format!("{:#}", err).contains("connection reset"));
        assert!(!temp_path.exists());
    }

    #[test]
    fn test_model_paths() {
        let (_dir, manager) = manager();
        let paths = manager.model_paths();
        assert_eq!(paths.detection, manager.models_dir().join("det.onnx"));
        assert_eq!(paths.recognition, manager.models_dir().join("rec.onnx"));
        assert_eq!(paths.dictionary, manager.models_dir().join("dict.txt"));
    }
}
