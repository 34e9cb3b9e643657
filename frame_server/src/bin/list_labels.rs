//! Print the class names a model ships with.
//!
use anyhow::Result;
use clap::Parser;
use env_logger::TimestampPrecision;
use frame_server::{config::ModelArgs, nn::InferModel};

#[derive(Parser, Debug)]
#[clap(author, version)]
struct Args {
    #[clap(flatten)]
    model: ModelArgs,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::builder()
        .format_timestamp(Some(TimestampPrecision::Millis))
        .init();

    let model = args.model.load_model().await?;
    let labels = args.model.load_labels(&model)?;

    match model.class_count() {
        Some(class_count) if class_count != labels.len() => log::warn!(
            "Model predicts {} classes but {} labels are configured",
            class_count,
            labels.len()
        ),
        Some(class_count) => log::info!("Model predicts {} classes", class_count),
        None => log::info!("Model does not report its class count"),
    }

    for (index, name) in labels.iter() {
        println!("{index}: {name}");
    }

    Ok(())
}
