//! Frame inference server binary.
//!
use std::{net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};

use anyhow::Result;
use clap::Parser;
use env_logger::TimestampPrecision;
use frame_server::{
    annotate::Annotator,
    config::ModelArgs,
    endpoints::app,
    meter::spawn_meter_logger,
    service::{FrameService, ServiceOptions},
};

#[derive(Parser, Debug)]
#[clap(author, version)]
struct Args {
    /// Address to serve HTTP on
    #[clap(long, default_value = "127.0.0.1:3000")]
    server_address: String,

    #[clap(flatten)]
    model: ModelArgs,

    /// Attach bounding boxes to detections
    #[clap(long)]
    geometry: bool,

    /// Round confidences up to two decimals
    #[clap(long)]
    round_confidence: bool,

    /// Draw detections and return the re-encoded frame
    #[clap(long)]
    annotate: bool,

    /// JPEG quality of annotated frames
    #[clap(long, default_value_t = 90)]
    jpeg_quality: i32,

    /// TrueType font for labels, the embedded DejaVu Sans Mono if not given
    #[clap(long)]
    font: Option<PathBuf>,

    /// Label text height in pixels
    #[clap(long, default_value_t = 16.0)]
    text_size: f32,

    /// Seconds between frame rate log lines
    #[clap(long, default_value_t = 5)]
    meter_interval: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Setup logger
    env_logger::builder()
        .format_timestamp(Some(TimestampPrecision::Millis))
        .init();

    // Load the model once, it is shared read-only by all requests
    let model = Arc::new(args.model.load_model().await?);
    let labels = args.model.load_labels(model.as_ref())?;

    let annotator = match args.annotate {
        true => Annotator::load(args.font.as_deref(), args.text_size)?,
        false => Annotator::new(None, args.text_size),
    };

    let options = ServiceOptions {
        geometry: args.geometry,
        round_confidence: args.round_confidence,
        annotate: args.annotate,
        jpeg_quality: args.jpeg_quality,
    };
    let service = Arc::new(FrameService::new(model, labels, annotator, options)?);
    log::info!(
        "Serving {} classes from {} with {:?}",
        service.labels().len(),
        args.model.labels,
        service.options()
    );

    spawn_meter_logger(Duration::from_secs(args.meter_interval.max(1)));

    // Serve HTTP server
    let addr: SocketAddr = args.server_address.parse()?;
    log::info!("Listening on http://{}", addr);
    axum::Server::bind(&addr)
        .serve(app(service).into_make_service())
        .await?;

    Ok(())
}
