//! Utility functions
//!
use std::{
    fs::File,
    io::Cursor,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use reqwest::Client;

/// Download a file from a URL to a given filepath.
pub async fn download_file(client: &Client, url: &str, filepath: impl AsRef<Path>) -> Result<()> {
    let resp = client.get(url).send().await?.error_for_status()?;

    let mut file = File::create(filepath)?;
    let mut content = Cursor::new(resp.bytes().await?);
    std::io::copy(&mut content, &mut file)?;

    Ok(())
}

/// Cache location of downloaded models.
pub fn model_cache_dir() -> Result<PathBuf> {
    let dir = dirs::cache_dir()
        .context("no cache directory on this platform")?
        .join("frame_server");
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create {}", dir.display()))?;
    Ok(dir)
}

/// Resolve the model file, downloading it into the cache when it is missing locally.
pub async fn ensure_model(model: &Path, url: Option<&str>) -> Result<PathBuf> {
    if model.exists() {
        return Ok(model.to_owned());
    }

    let url = match url {
        Some(url) => url,
        None => bail!("model {} not found and no download URL given", model.display()),
    };

    let file_name = model
        .file_name()
        .context("model path has no file name")?;
    let cached = model_cache_dir()?.join(file_name);
    if cached.exists() {
        log::info!("Using cached model {}", cached.display());
        return Ok(cached);
    }

    log::info!("Downloading model from {} to {}", url, cached.display());
    let partial = cached.with_extension("part");
    download_file(&Client::new(), url, &partial).await?;
    std::fs::rename(&partial, &cached)?;

    Ok(cached)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn existing_model_is_used_as_is() {
        let path = std::env::temp_dir().join(format!("model-{}.onnx", std::process::id()));
        std::fs::write(&path, b"onnx").unwrap();

        let resolved = ensure_model(&path, None).await.unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(resolved, path);
    }

    #[tokio::test]
    async fn missing_model_without_url_fails() {
        let result = ensure_model(Path::new("/nonexistent/yolov8n.onnx"), None).await;
        assert!(result.is_err());
    }
}
