use std::{io::Cursor, net::SocketAddr, sync::Arc};

use anyhow::Result;
use common::{
    data_url::to_data_url,
    protocol::{ErrorResponse, FrameRequest, FrameResponse},
};
use frame_server::{
    annotate::Annotator,
    endpoints::app,
    labels::LabelMap,
    nn::{InferModel, OutputLayout, RawDetection, YoloModel},
    service::{FrameService, ServiceOptions},
};
use image::{ImageFormat, Rgb, RgbImage};
use reqwest::StatusCode;

/// Model that reports the same detections for every frame.
struct FixedModel(Vec<RawDetection>);

impl InferModel for FixedModel {
    fn run(&self, _input: &RgbImage) -> Result<Vec<RawDetection>> {
        Ok(self.0.clone())
    }

    fn class_count(&self) -> Option<usize> {
        Some(80)
    }
}

fn spawn_server(detections: Vec<RawDetection>, options: ServiceOptions) -> SocketAddr {
    let service = FrameService::new(
        Arc::new(FixedModel(detections)),
        LabelMap::coco(),
        Annotator::embedded(16.0),
        options,
    )
    .expect("service");

    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("local address");
    let server = axum::Server::from_tcp(listener)
        .expect("server")
        .serve(app(Arc::new(service)).into_make_service());
    tokio::spawn(server);

    addr
}

fn jpeg_frame(width: u32, height: u32) -> String {
    let frame = RgbImage::from_pixel(width, height, Rgb([90, 160, 30]));
    let mut buf = Cursor::new(Vec::new());
    frame.write_to(&mut buf, ImageFormat::Jpeg).expect("encode");
    to_data_url("image/jpeg", &buf.into_inner())
}

fn dog() -> RawDetection {
    RawDetection {
        class_index: 16,
        confidence: 0.734,
        bbox: [100.0, 50.0, 300.0, 250.0],
    }
}

async fn post_frame(addr: SocketAddr, image: String) -> reqwest::Response {
    reqwest::Client::new()
        .post(format!("http://{addr}/process_frame"))
        .json(&FrameRequest::new(image))
        .send()
        .await
        .expect("request")
}

#[tokio::test]
async fn solid_frame_has_no_detections() {
    let addr = spawn_server(vec![], ServiceOptions::default());

    let resp = post_frame(addr, jpeg_frame(640, 480)).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body, serde_json::json!({"detections": []}));
}

#[tokio::test]
async fn detections_with_geometry_and_image() {
    let addr = spawn_server(vec![dog()], ServiceOptions::annotated());

    let resp = post_frame(addr, jpeg_frame(640, 480)).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: FrameResponse = resp.json().await.unwrap();
    assert_eq!(body.detections.len(), 1);

    let detection = &body.detections[0];
    assert_eq!(detection.class, "dog");
    assert_eq!(detection.confidence, 0.74);
    assert_eq!(detection.x, Some(100));
    assert_eq!(detection.y, Some(50));
    assert_eq!(detection.width, Some(200));
    assert_eq!(detection.height, Some(200));

    let image = body.image.expect("annotated image");
    let decoded = frame_server::codec::decode_frame(&format!("data:image/jpeg;base64,{image}"))
        .expect("decodable image");
    assert_eq!(decoded.dimensions(), (640, 480));
}

/// PNG of pseudo random pixels, so that it barely compresses.
fn noise_png(width: u32, height: u32) -> String {
    let mut state: u32 = 0x9e37_79b9;
    let frame = RgbImage::from_fn(width, height, |_, _| {
        state ^= state << 13;
        state ^= state >> 17;
        state ^= state << 5;
        let [r, g, b, _] = state.to_le_bytes();
        Rgb([r, g, b])
    });
    let mut buf = Cursor::new(Vec::new());
    frame.write_to(&mut buf, ImageFormat::Png).expect("encode");
    to_data_url("image/png", &buf.into_inner())
}

#[tokio::test]
async fn large_frame_is_accepted() {
    let addr = spawn_server(vec![dog()], ServiceOptions::default());

    let image = noise_png(1280, 720);
    assert!(image.len() > 2 * 1024 * 1024);

    let resp = post_frame(addr, image).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: FrameResponse = resp.json().await.unwrap();
    assert_eq!(body.detections.len(), 1);
    assert_eq!(body.detections[0].class, "dog");
}

#[tokio::test]
async fn undecodable_frame_is_rejected() {
    let addr = spawn_server(vec![dog()], ServiceOptions::default());

    let resp = post_frame(addr, to_data_url("image/jpeg", b"garbage")).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let body: ErrorResponse = resp.json().await.unwrap();
    assert_eq!(body, ErrorResponse::frame_error());
}

#[tokio::test]
async fn malformed_body_is_rejected() {
    let addr = spawn_server(vec![], ServiceOptions::default());

    let resp = reqwest::Client::new()
        .post(format!("http://{addr}/process_frame"))
        .json(&serde_json::json!({"frame": "data:,"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let body: ErrorResponse = resp.json().await.unwrap();
    assert_eq!(body, ErrorResponse::frame_error());
}

#[tokio::test]
async fn index_and_healthcheck() {
    let addr = spawn_server(vec![], ServiceOptions::default());

    let health = reqwest::get(format!("http://{addr}/healthcheck"))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(health, "healthy");

    let index = reqwest::get(format!("http://{addr}/")).await.unwrap();
    assert_eq!(index.status(), StatusCode::OK);
    assert!(index.text().await.unwrap().contains("/process_frame"));
}

/// Needs the exported weights in `yolo-weights/` and the reference pictures in `test_pics/`.
#[test]
#[ignore]
fn test_yolov8n_reference_images() -> Result<()> {
    let model = YoloModel::new("yolo-weights/yolov8n.onnx", OutputLayout::Anchors, 640, 0.25, 0.45)?;
    let labels = LabelMap::coco();
    labels.validate(model.class_count().unwrap_or_default())?;

    let solid = RgbImage::from_pixel(640, 480, Rgb([128, 128, 128]));
    assert!(model.run(&solid)?.is_empty());

    let images_with_classes = vec![("test_pics/single_dog.jpg", "dog")];
    for (filename, expected_class) in images_with_classes {
        let image = image::open(filename)?.to_rgb8();
        let detections = model.run(&image)?;

        assert_eq!(detections.len(), 1, "{filename}");
        assert_eq!(labels.get(detections[0].class_index), Some(expected_class));
        assert!(detections[0].confidence > 0.5);
    }

    Ok(())
}
