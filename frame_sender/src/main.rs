//! Send still images to a frame server and report what it detected.
//!
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use clap::Parser;
use common::{
    data_url::{mime_for_path, to_data_url},
    protocol::{ErrorResponse, FrameRequest, FrameResponse},
};
use env_logger::TimestampPrecision;

#[derive(Parser, Debug)]
#[clap(author, version)]
struct Args {
    /// Address of the frame server to connect to
    #[clap(long, default_value = "127.0.0.1:3000")]
    address: String,

    /// Directory to write annotated frames to, if the server returns them
    #[clap(long)]
    output_dir: Option<PathBuf>,

    /// Image files to send, one request each
    #[clap(required = true)]
    images: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::builder()
        .format_timestamp(Some(TimestampPrecision::Millis))
        .init();

    if let Some(dir) = &args.output_dir {
        std::fs::create_dir_all(dir)?;
    }

    let client = reqwest::Client::new();
    let url = format!("http://{}/process_frame", &args.address);
    log::info!("Sending {} frames to {}", args.images.len(), &url);

    let mut failed = 0;
    for path in args.images.iter() {
        match send_frame(&client, &url, path).await {
            Ok(response) => {
                for detection in response.detections.iter() {
                    log::info!(
                        "{}: {} ({})",
                        path.display(),
                        detection.class,
                        detection.confidence
                    );
                }
                println!("{}", serde_json::to_string(&response.detections)?);

                if let (Some(dir), Some(image)) = (&args.output_dir, &response.image) {
                    save_annotated(dir, path, image)?;
                }
            }
            Err(e) => {
                log::error!("{}: {:#}", path.display(), e);
                failed += 1;
            }
        }
    }

    if failed > 0 {
        bail!("{} of {} frames failed", failed, args.images.len());
    }

    Ok(())
}

async fn send_frame(client: &reqwest::Client, url: &str, path: &Path) -> Result<FrameResponse> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    let request = FrameRequest::new(to_data_url(mime_for_path(path), &bytes));

    let resp = client.post(url).json(&request).send().await?;
    let status = resp.status();
    if !status.is_success() {
        let body: ErrorResponse = resp.json().await?;
        bail!("server answered {}: {}", status, body.error);
    }

    Ok(resp.json().await?)
}

fn save_annotated(dir: &Path, source: &Path, image: &str) -> Result<()> {
    let stem = source
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("frame");
    let target = dir.join(format!("{stem}-annotated.jpg"));
    std::fs::write(&target, STANDARD.decode(image)?)?;
    log::info!("Annotated frame written to {}", target.display());

    Ok(())
}
