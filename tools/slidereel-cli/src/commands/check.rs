//! Check which codec candidates ffmpeg can produce.

use slidereel_common::config::AppConfig;
use slidereel_render_engine::encoder::{
    negotiate, EncoderRuntime, FfmpegRuntime, DEFAULT_CANDIDATES,
};

pub fn run(config: &AppConfig, ffmpeg: Option<String>) -> anyhow::Result<()> {
    let binary = ffmpeg.unwrap_or_else(|| config.encoder.ffmpeg_path.clone());
    let runtime = FfmpegRuntime::new(binary);

    println!("Slidereel System Check");
    println!("{}", "=".repeat(50));

    if runtime.is_available() {
        println!("[OK] ffmpeg: {}", runtime.binary());
    } else {
        println!("[FAIL] ffmpeg not usable: {}", runtime.binary());
    }

    println!();
    for candidate in &DEFAULT_CANDIDATES {
        let status = if runtime.supports(candidate) { "OK" } else { "--" };
        println!(
            "[{status}] {:<24} ({})",
            candidate.mime_type, candidate.encoder
        );
    }

    println!();
    match negotiate(&runtime, &DEFAULT_CANDIDATES) {
        Ok(chosen) => println!(
            "Exports will use {} (.{}).",
            chosen.mime_type,
            chosen.extension()
        ),
        Err(e) => println!("No export codec available: {e}"),
    }

    Ok(())
}
