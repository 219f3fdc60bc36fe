//! Shared helpers for the server integration tests.

#![allow(dead_code)]

use std::io::{Cursor, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use petal_core::{encode_frame, CHUNK_SIZE};
use petal_server::application::inference::InferenceAdapter;
use petal_server::application::session::SessionSettings;
use petal_server::domain::labels::{LabelEntry, LabelTable};
use petal_server::infrastructure::model::CentroidClassifier;
use petal_server::infrastructure::network::Server;

pub const RED: [u8; 3] = [220, 20, 30];
pub const GREEN: [u8; 3] = [30, 200, 40];
pub const BLUE: [u8; 3] = [20, 40, 210];

/// Encodes a solid-colour image in the given container format.
pub fn solid_image(rgb: [u8; 3], width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
    let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb(rgb)));
    let mut buf = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buf), format)
        .expect("encode test image");
    buf
}

/// Encodes a reddish image with per-pixel noise.  Noise keeps the encoded
/// size large, so the payload spans many chunks.
pub fn noisy_red_image(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
    let mut seed: u32 = 0x9E37_79B9;
    let image = RgbImage::from_fn(width, height, |_, _| {
        seed = seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
        let [r, g, b, _] = seed.to_le_bytes();
        Rgb([160 + r % 96, g % 64, b % 64])
    });
    let mut buf = Vec::new();
    DynamicImage::ImageRgb8(image)
        .write_to(&mut Cursor::new(&mut buf), format)
        .expect("encode test image");
    buf
}

/// Three-class colour model: rose (red), leaf (green), iris (blue).
pub fn colour_adapter() -> Arc<InferenceAdapter> {
    let unit = |rgb: [f32; 3]| -> Vec<f32> { rgb.iter().copied().cycle().take(2 * 2 * 3).collect() };
    let classifier = CentroidClassifier::new(
        32,
        2,
        vec![unit([1.0, 0.0, 0.0]), unit([0.0, 1.0, 0.0]), unit([0.0, 0.0, 1.0])],
    )
    .expect("valid centroids");
    let labels = LabelTable::new(vec![
        LabelEntry::new("rose", "장미"),
        LabelEntry::new("leaf", "잎"),
        LabelEntry::new("iris", "붓꽃"),
    ])
    .expect("non-empty labels");
    Arc::new(InferenceAdapter::new(Box::new(classifier), labels).expect("consistent model"))
}

pub fn start_server() -> Server {
    start_server_with(SessionSettings::default())
}

pub fn start_server_with(settings: SessionSettings) -> Server {
    Server::start("127.0.0.1:0".parse().unwrap(), colour_adapter(), settings)
        .expect("server starts on an ephemeral port")
}

/// Sends one framed payload in chunk-sized writes and reads the reply to EOF.
pub fn submit(addr: SocketAddr, payload: &[u8]) -> String {
    let mut stream = TcpStream::connect(addr).expect("connect");
    stream
        .set_read_timeout(Some(Duration::from_secs(10)))
        .unwrap();
    for chunk in encode_frame(payload).chunks(CHUNK_SIZE) {
        stream.write_all(chunk).expect("send");
    }
    let mut reply = String::new();
    stream.read_to_string(&mut reply).expect("read reply");
    reply
}

/// Polls `condition` until it holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    condition()
}
