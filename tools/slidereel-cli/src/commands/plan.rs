//! Print the frame timeline for a photo count.

use serde::Serialize;
use slidereel_common::config::AppConfig;
use slidereel_project_model::Timeline;

#[derive(Serialize)]
struct PlanRow {
    photo: usize,
    first_frame: u64,
    last_frame: u64,
    transition: Option<(u64, u64)>,
}

#[derive(Serialize)]
struct Plan {
    frame_rate: u32,
    frames_per_photo: u64,
    transition_frames: u64,
    total_frames: u64,
    duration_secs: f64,
    photos: Vec<PlanRow>,
}

pub fn run(
    config: &AppConfig,
    count: usize,
    seconds: Option<f64>,
    transition: Option<String>,
    json: bool,
) -> anyhow::Result<()> {
    let settings = super::resolve_settings(config, seconds, transition)?;
    let timeline = Timeline::new(&settings, count);
    let fpp = timeline.frames_per_photo();

    let plan = Plan {
        frame_rate: timeline.frame_rate(),
        frames_per_photo: fpp,
        transition_frames: timeline.transition_frames(),
        total_frames: timeline.total_frames(),
        duration_secs: timeline.duration().as_secs_f64(),
        photos: (0..count)
            .map(|photo| PlanRow {
                photo,
                first_frame: photo as u64 * fpp,
                last_frame: (photo as u64 + 1) * fpp - 1,
                transition: timeline
                    .transition_window(photo)
                    .map(|w| (w.start, w.end - 1)),
            })
            .collect(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(());
    }

    println!("Slideshow plan ({} photos, {})", count, settings.transition);
    println!("  Frame rate: {} fps", plan.frame_rate);
    println!("  Frames per photo: {}", plan.frames_per_photo);
    println!("  Transition frames: {}", plan.transition_frames);
    println!(
        "  Total: {} frames ({:.1}s)",
        plan.total_frames, plan.duration_secs
    );
    println!();
    for row in &plan.photos {
        match row.transition {
            Some((start, end)) => println!(
                "  #{:<3} frames {:>5}-{:<5} transition {:>5}-{}",
                row.photo, row.first_frame, row.last_frame, start, end
            ),
            None => println!(
                "  #{:<3} frames {:>5}-{:<5}",
                row.photo, row.first_frame, row.last_frame
            ),
        }
    }

    Ok(())
}
