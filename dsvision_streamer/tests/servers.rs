use std::net::SocketAddr;
use std::time::Duration;

use dsvision::core_modules::telemetry::{NetworkTable, TableValue};
use dsvision::{CameraRegistry, Frame, StreamSink};
use dsvision_streamer::{FrameBus, MjpegSink, start_mjpeg_server, start_table_server};
use image::{Rgb, RgbImage};

fn any_port() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 0))
}

#[tokio::test]
async fn healthz_answers() {
    let (addr, _server) = start_mjpeg_server(FrameBus::new(2), any_port()).await.unwrap();
    let body = reqwest::get(format!("http://{addr}/healthz"))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(body, "ok");
}

#[tokio::test]
async fn frame_endpoint_is_empty_until_first_frame() {
    let bus = FrameBus::new(2);
    let (addr, _server) = start_mjpeg_server(bus.clone(), any_port()).await.unwrap();

    let response = reqwest::get(format!("http://{addr}/frame.jpg")).await.unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::NO_CONTENT);

    let mut sink = MjpegSink::new(bus, 80);
    sink.stream(&Frame::from_image(RgbImage::from_pixel(8, 8, Rgb([0, 0, 255]))));

    let response = reqwest::get(format!("http://{addr}/frame.jpg")).await.unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "image/jpeg");
    let bytes = response.bytes().await.unwrap();
    assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
}

#[tokio::test]
async fn stream_serves_multipart_jpeg() {
    let bus = FrameBus::new(2);
    let mut sink = MjpegSink::new(bus.clone(), 80);
    sink.stream(&Frame::from_image(RgbImage::from_pixel(8, 8, Rgb([0, 255, 0]))));
    let (addr, _server) = start_mjpeg_server(bus, any_port()).await.unwrap();

    let mut response = reqwest::get(format!("http://{addr}/stream.mjpg")).await.unwrap();
    assert_eq!(
        response.headers()["content-type"],
        "multipart/x-mixed-replace; boundary=frame"
    );

    let mut received = Vec::new();
    while !received.windows(2).any(|w| w == [0xFF, 0xD9]) {
        let chunk = tokio::time::timeout(Duration::from_secs(5), response.chunk())
            .await
            .expect("stream stalled")
            .unwrap()
            .expect("stream ended");
        received.extend_from_slice(&chunk);
    }
    assert!(received.starts_with(b"--frame\r\nContent-Type: image/jpeg\r\n"));
}

#[tokio::test]
async fn robot_registers_a_camera_over_http() {
    let table = NetworkTable::new();
    let (addr, _server) = start_table_server(table.clone(), any_port()).await.unwrap();
    let client = reqwest::Client::new();

    let response = client
        .put(format!("http://{addr}/tables/CameraPublisher/Axis 5957/streams"))
        .header("content-type", "application/json")
        .body(r#"["mjpg:http://10.59.57.19/axis-cgi/mjpg/video.cgi"]"#)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::NO_CONTENT);

    assert_eq!(
        table.resolve_source("Axis 5957"),
        Ok(vec!["http://10.59.57.19/axis-cgi/mjpg/video.cgi".to_string()])
    );
}

#[tokio::test]
async fn published_values_are_readable_over_http() {
    let table = NetworkTable::new();
    table
        .sub_table("CameraPublisher/Retrotape")
        .put_number("Tape One Center", 20.0);
    let (addr, _server) = start_table_server(table, any_port()).await.unwrap();

    let body = reqwest::get(format!(
        "http://{addr}/tables/CameraPublisher/Retrotape/Tape%20One%20Center"
    ))
    .await
    .unwrap()
    .text()
    .await
    .unwrap();
    let value: TableValue = serde_json::from_str(&body).unwrap();
    assert_eq!(value, TableValue::Number(20.0));

    let response = reqwest::get(format!("http://{addr}/tables/CameraPublisher/Gear"))
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);
}
