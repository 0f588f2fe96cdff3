//! Render photos into a slideshow and save it.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use slidereel_common::config::AppConfig;
use slidereel_project_model::photos_from_locators;
use slidereel_render_engine::encoder::FfmpegRuntime;
use slidereel_render_engine::export::{ExportController, ExportOptions, ExportServices};
use slidereel_render_engine::progress::{ExportProgress, ProgressCallback};

pub struct ExportArgs {
    pub photos: Vec<String>,
    pub seconds: Option<f64>,
    pub transition: Option<String>,
    pub topic: Option<String>,
    pub output: Option<PathBuf>,
    pub ffmpeg: Option<String>,
}

pub async fn run(config: AppConfig, args: ExportArgs) -> anyhow::Result<()> {
    let settings = super::resolve_settings(&config, args.seconds, args.transition)?;
    let topic = args.topic.unwrap_or_else(|| config.export.topic.clone());
    let output_dir = args.output.unwrap_or_else(|| config.exports_dir.clone());
    let photos = photos_from_locators(args.photos);

    let mut services = ExportServices::from_config(&config);
    if let Some(binary) = args.ffmpeg {
        services.runtime = Arc::new(FfmpegRuntime::new(binary));
    }
    let mut controller = ExportController::new(services, ExportOptions::from_config(&config));

    let cancel = controller.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    println!("Exporting {} photos", photos.len());
    println!(
        "  Timing: {}s per photo, {} transition",
        settings.seconds_per_photo, settings.transition
    );
    println!("  Output: {}", output_dir.display());

    let progress_cb: ProgressCallback = Box::new(|p: ExportProgress| {
        print!("\r  {:<10} {:5.1}%  ", p.stage, p.percent);
        std::io::stdout().flush().ok();
    });

    match controller.export(&photos, settings, Some(progress_cb)).await {
        Ok(artifact) => {
            println!(
                "\n  Encoded {} frames as {} ({} bytes)",
                artifact.frame_count,
                artifact.mime_type,
                artifact.size()
            );
        }
        Err(e) => {
            println!("\nExport failed: {e}");
            return Err(e.into());
        }
    }

    if let Some(report) = controller.last_report() {
        tracing::debug!(
            sampled = report.encode.frames_sampled,
            duplicated = report.encode.frames_duplicated,
            skipped = report.encode.frames_skipped,
            "Encode statistics"
        );
        if report.photos_loaded < report.photos_requested {
            println!(
                "  Skipped {} photo(s) that could not be loaded",
                report.photos_requested - report.photos_loaded
            );
        }
    }

    let path = controller.save_artifact(&output_dir, &topic)?;
    println!("Export complete: {}", path.display());
    controller.discard();

    Ok(())
}
