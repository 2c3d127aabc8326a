//! Encode a moving bar as raw DIB frames and write it to an AVI file.
//!
//! ```text
//! RUST_LOG=debug cargo run -p framecap-avi --example write_synthetic -- out.avi
//! ```

use framecap_avi::AviWriter;
use framecap_containers::MovieWriter;
use framecap_core::codec::Codec;
use framecap_core::format::ENCODING_RASTER;
use framecap_core::{keys, Buffer, Format, MediaType, Payload, Raster, Rational, RawVideoCodec};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const WIDTH: u32 = 320;
const HEIGHT: u32 = 160;
const FRAMES: i64 = 100;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "synthetic.avi".to_string());
    let frame_rate = Rational::from_int(30);

    let mut codec = RawVideoCodec::new();
    let input_format = codec
        .set_input_format(
            Format::builder()
                .with(keys::MEDIA_TYPE, MediaType::Video)
                .with_str(keys::ENCODING, ENCODING_RASTER)
                .with(keys::FRAME_RATE, frame_rate)
                .build(),
        )
        .ok_or("raster input rejected")?;
    let track_format = codec.output_formats()[0]
        .with(keys::WIDTH, WIDTH as i32)
        .with(keys::HEIGHT, HEIGHT as i32)
        .with(keys::FRAME_RATE, frame_rate);

    let mut writer = AviWriter::create(&path)?;
    let track = MovieWriter::add_track(&mut writer, track_format)?;

    let mut encoded = Buffer::new();
    for n in 0..FRAMES {
        let mut raster = Raster::new(WIDTH, HEIGHT);
        let x = (n * WIDTH as i64 / FRAMES) as i32;
        for y in 0..HEIGHT as i32 {
            for dx in 0..8 {
                raster.set_pixel(x + dx, y, 0x3080ff);
            }
        }

        let input = Buffer {
            format: input_format.clone(),
            timestamp: Rational::new(n, 30),
            sample_duration: frame_rate.inverse(),
            payload: Payload::Raster(Arc::new(raster)),
            ..Buffer::new()
        };
        codec.process(&input, &mut encoded)?;
        MovieWriter::write(&mut writer, track, &encoded)?;
    }

    MovieWriter::close(&mut writer)?;
    tracing::info!(
        path = %path,
        duration = %MovieWriter::duration(&writer, track)?,
        "wrote synthetic movie"
    );
    Ok(())
}
