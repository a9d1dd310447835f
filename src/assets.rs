//! Resource bundle acquisition: download, verify, unpack, cache
//!
//! Bundles live under a per-user cache root (`~/.kindred` by default). The
//! presence of a directory with the bundle's name anywhere below the root is
//! the only installed-check; there is no manifest.

use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use walkdir::WalkDir;

/// Name of the cache directory created under the user's home
pub const CACHE_DIR_NAME: &str = ".kindred";

/// Errors from bundle acquisition
#[derive(Debug, Error)]
pub enum AssetError {
    #[error("Integrity check failed for {archive}: expected SHA-256 {expected}, got {actual}")]
    Integrity {
        archive: String,
        expected: String,
        actual: String,
    },

    #[error("Download failed: {0}")]
    Download(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("Downloaded {archive} but could not find directory '{directory}' under {root}")]
    MissingAfterDownload {
        archive: String,
        directory: String,
        root: String,
    },

    #[error("Could not determine the home directory for the cache root")]
    NoHomeDirectory,
}

/// Result type for asset operations
pub type AssetResult<T> = Result<T, AssetError>;

/// Description of a downloadable resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceBundle {
    /// Where to fetch the archive from
    pub url: String,
    /// File name the archive is stored under in the cache root
    pub archive_name: String,
    /// Directory the archive unpacks to; its presence means "installed"
    pub directory_name: String,
    /// Expected SHA-256 of the archive, hex encoded
    pub sha256: String,
}

impl ResourceBundle {
    /// The Stanford CoreNLP 2016-10-31 full distribution
    pub fn corenlp() -> Self {
        Self {
            url: "http://nlp.stanford.edu/software/stanford-corenlp-full-2016-10-31.zip".to_string(),
            archive_name: "stanford-corenlp-full-2016-10-31.zip".to_string(),
            directory_name: "stanford-corenlp-full-2016-10-31".to_string(),
            sha256: "753dd5aae1ea4ba14ed8eca46646aef06f6808a9ce569e52a09840f6928d00d8".to_string(),
        }
    }

    fn is_zip(&self) -> bool {
        self.archive_name.ends_with(".zip")
    }
}

/// Default cache root: `~/.kindred`
pub fn default_cache_root() -> AssetResult<PathBuf> {
    dirs::home_dir()
        .map(|home| home.join(CACHE_DIR_NAME))
        .ok_or(AssetError::NoHomeDirectory)
}

/// Downloads and caches resource bundles under a cache root
#[derive(Debug, Clone)]
pub struct AssetManager {
    cache_root: PathBuf,
    http: reqwest::Client,
}

impl AssetManager {
    pub fn new(cache_root: impl Into<PathBuf>) -> Self {
        Self {
            cache_root: cache_root.into(),
            http: reqwest::Client::new(),
        }
    }

    /// Asset manager rooted at `~/.kindred`
    pub fn with_default_root() -> AssetResult<Self> {
        Ok(Self::new(default_cache_root()?))
    }

    pub fn cache_root(&self) -> &Path {
        &self.cache_root
    }

    /// Find the bundle's directory anywhere below the cache root
    pub fn locate(&self, bundle: &ResourceBundle) -> Option<PathBuf> {
        if !self.cache_root.is_dir() {
            return None;
        }
        WalkDir::new(&self.cache_root)
            .min_depth(1)
            .into_iter()
            .filter_map(Result::ok)
            .find(|entry| {
                entry.file_type().is_dir()
                    && entry.file_name() == std::ffi::OsStr::new(&bundle.directory_name)
            })
            .map(|entry| {
                let path = entry.into_path();
                std::fs::canonicalize(&path).unwrap_or(path)
            })
    }

    pub fn is_installed(&self, bundle: &ResourceBundle) -> bool {
        self.locate(bundle).is_some()
    }

    /// Make sure the bundle is unpacked under the cache root and return its
    /// directory. Does no network activity when already installed.
    pub async fn ensure(&self, bundle: &ResourceBundle) -> AssetResult<PathBuf> {
        if let Some(dir) = self.locate(bundle) {
            tracing::debug!(path = %dir.display(), "{} already installed", bundle.directory_name);
            return Ok(dir);
        }

        tokio::fs::create_dir_all(&self.cache_root).await?;
        let archive = self.cache_root.join(&bundle.archive_name);

        if !self.reuse_cached_archive(&archive, bundle).await? {
            tracing::info!(
                url = %bundle.url,
                root = %self.cache_root.display(),
                "Downloading {}",
                bundle.archive_name
            );
            self.download(bundle, &archive).await?;
        }

        if bundle.is_zip() {
            tracing::info!("Unzipping {}", bundle.archive_name);
            extract_zip(archive.clone(), self.cache_root.clone()).await?;
        }

        let dir = self.locate(bundle).ok_or_else(|| AssetError::MissingAfterDownload {
            archive: bundle.archive_name.clone(),
            directory: bundle.directory_name.clone(),
            root: self.cache_root.display().to_string(),
        })?;
        tracing::info!(path = %dir.display(), "Download complete");
        Ok(dir)
    }

    /// An archive left by an earlier run is reused only if its digest still matches.
    async fn reuse_cached_archive(&self, archive: &Path, bundle: &ResourceBundle) -> AssetResult<bool> {
        if !tokio::fs::try_exists(archive).await? {
            return Ok(false);
        }
        let actual = sha256_file(archive.to_path_buf()).await?;
        if actual.eq_ignore_ascii_case(&bundle.sha256) {
            tracing::debug!(archive = %archive.display(), "Reusing cached archive");
            return Ok(true);
        }
        tracing::warn!(archive = %archive.display(), "Cached archive has wrong digest, removing");
        tokio::fs::remove_file(archive).await?;
        Ok(false)
    }

    /// Stream the archive into a temp file in the cache root, hashing as it
    /// arrives. The temp file is removed on any failure.
    async fn download(&self, bundle: &ResourceBundle, archive: &Path) -> AssetResult<()> {
        let partial = tempfile::Builder::new()
            .prefix(".download-")
            .tempfile_in(&self.cache_root)?;
        let mut file = tokio::fs::File::from_std(partial.reopen()?);

        let mut response = self.http.get(&bundle.url).send().await?.error_for_status()?;
        let mut hasher = Sha256::new();
        while let Some(chunk) = response.chunk().await? {
            hasher.update(&chunk);
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        drop(file);

        let actual = hex::encode(hasher.finalize());
        if !actual.eq_ignore_ascii_case(&bundle.sha256) {
            // `partial` is deleted when dropped here
            return Err(AssetError::Integrity {
                archive: bundle.archive_name.clone(),
                expected: bundle.sha256.clone(),
                actual,
            });
        }

        partial.persist(archive).map_err(|e| AssetError::Io(e.error))?;
        Ok(())
    }
}

/// Hex-encoded SHA-256 of a byte slice
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

async fn sha256_file(path: PathBuf) -> AssetResult<String> {
    tokio::task::spawn_blocking(move || -> AssetResult<String> {
        let mut file = std::fs::File::open(&path)?;
        let mut hasher = Sha256::new();
        std::io::copy(&mut file, &mut hasher)?;
        Ok(hex::encode(hasher.finalize()))
    })
    .await
    .map_err(|e| AssetError::Io(std::io::Error::other(e)))?
}

async fn extract_zip(archive: PathBuf, dest: PathBuf) -> AssetResult<()> {
    tokio::task::spawn_blocking(move || -> AssetResult<()> {
        let file = std::fs::File::open(&archive)?;
        let mut zip = zip::ZipArchive::new(file)?;
        zip.extract(&dest)?;
        Ok(())
    })
    .await
    .map_err(|e| AssetError::Io(std::io::Error::other(e)))?
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bundle(dir: &str) -> ResourceBundle {
        ResourceBundle {
            // Port 9 (discard) on localhost; any fetch attempt fails fast
            url: "http://127.0.0.1:9/bundle.zip".to_string(),
            archive_name: format!("{dir}.zip"),
            directory_name: dir.to_string(),
            sha256: "00".repeat(32),
        }
    }

    #[test]
    fn locate_finds_nested_directory() {
        let root = tempfile::tempdir().unwrap();
        let nested = root.path().join("a").join("b").join("my-bundle");
        std::fs::create_dir_all(&nested).unwrap();

        let assets = AssetManager::new(root.path());
        let found = assets.locate(&bundle("my-bundle")).unwrap();
        assert!(found.ends_with("a/b/my-bundle"));
    }

    #[test]
    fn locate_ignores_files_with_bundle_name() {
        let root = tempfile::tempdir().unwrap();
        std::fs::write(root.path().join("my-bundle"), b"not a dir").unwrap();
        let assets = AssetManager::new(root.path());
        assert!(!assets.is_installed(&bundle("my-bundle")));
    }

    #[test]
    fn locate_on_missing_root() {
        let root = tempfile::tempdir().unwrap();
        let assets = AssetManager::new(root.path().join("absent"));
        assert!(assets.locate(&bundle("my-bundle")).is_none());
    }

    #[tokio::test]
    async fn ensure_installed_bundle_skips_network() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(root.path().join("my-bundle")).unwrap();
        let assets = AssetManager::new(root.path());

        let first = assets.ensure(&bundle("my-bundle")).await.unwrap();
        let second = assets.ensure(&bundle("my-bundle")).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn ensure_reports_download_failure() {
        let root = tempfile::tempdir().unwrap();
        let cache = root.path().join("cache");
        let assets = AssetManager::new(&cache);

        let err = assets.ensure(&bundle("my-bundle")).await.unwrap_err();
        assert!(matches!(err, AssetError::Download(_)));
        // cache root is created, but no partial download remains
        assert!(cache.is_dir());
        assert_eq!(std::fs::read_dir(&cache).unwrap().count(), 0);
    }

    #[test]
    fn sha256_of_known_input() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn corenlp_bundle_is_zip() {
        let b = ResourceBundle::corenlp();
        assert!(b.is_zip());
        assert_eq!(b.sha256.len(), 64);
    }
}
