//! Frame timeline for a slideshow export.
//!
//! The timeline is derived from the settings and photo count once per run and
//! never persisted. Every photo owns a window of `frames_per_photo` frames; the
//! trailing `transition_frames` of each window (except the last photo's) blend
//! towards the next photo.

use std::ops::Range;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::settings::{ExportSettings, TransitionKind};

/// Upper bound on the length of a transition window, in frames.
pub const MAX_TRANSITION_FRAMES: u64 = 15;

/// Number of frames a photo is displayed for.
///
/// Non-integral products are rounded half away from zero. Valid settings at
/// the fixed frame rate always produce an integral product. Never returns
/// zero.
pub fn frames_for_seconds(seconds: f64, fps: u32) -> u64 {
    let frames = (seconds * fps as f64).round();
    if frames.is_finite() && frames >= 1.0 {
        frames as u64
    } else {
        1
    }
}

/// Length of the transition window for a photo window of `frames_per_photo`.
pub fn transition_frames_for(kind: TransitionKind, frames_per_photo: u64) -> u64 {
    if kind.has_window() {
        MAX_TRANSITION_FRAMES.min(frames_per_photo / 4)
    } else {
        0
    }
}

/// What to draw for one output frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrameSchedule {
    /// Absolute frame index.
    pub frame_index: u64,
    /// Photo on screen.
    pub photo_index: usize,
    /// Photo being blended in; equals `photo_index` for the last photo.
    pub next_photo_index: usize,
    /// Frame counter reset to zero at each photo boundary.
    pub frame_in_photo: u64,
    /// Whether this frame lies inside a transition window.
    pub is_transitioning: bool,
    /// Transition progress in `[0, 1)`; zero outside a window.
    pub progress: f64,
    /// Elapsed fraction of the photo's own display window, in `[0, 1)`.
    pub hold_fraction: f64,
}

/// Map an absolute frame index to the photo(s) on screen.
pub fn schedule(
    frame_index: u64,
    frames_per_photo: u64,
    transition_frames: u64,
    photo_count: usize,
) -> FrameSchedule {
    let frames_per_photo = frames_per_photo.max(1);
    let photo_index = (frame_index / frames_per_photo) as usize;
    let frame_in_photo = frame_index % frames_per_photo;
    let last_photo = photo_count.saturating_sub(1);

    let window_start = frames_per_photo.saturating_sub(transition_frames);
    let is_transitioning =
        transition_frames > 0 && frame_in_photo >= window_start && photo_index < last_photo;
    let progress = if is_transitioning {
        (frame_in_photo - window_start) as f64 / transition_frames as f64
    } else {
        0.0
    };

    FrameSchedule {
        frame_index,
        photo_index,
        next_photo_index: (photo_index + 1).min(last_photo),
        frame_in_photo,
        is_transitioning,
        progress,
        hold_fraction: frame_in_photo as f64 / frames_per_photo as f64,
    }
}

/// Derived frame layout of one export run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timeline {
    frame_rate: u32,
    frames_per_photo: u64,
    transition_frames: u64,
    photo_count: usize,
}

impl Timeline {
    /// Timeline at the fixed export frame rate.
    pub fn new(settings: &ExportSettings, photo_count: usize) -> Self {
        Self::with_frame_rate(settings, ExportSettings::FRAME_RATE, photo_count)
    }

    /// Timeline at an arbitrary frame rate.
    pub fn with_frame_rate(settings: &ExportSettings, frame_rate: u32, photo_count: usize) -> Self {
        let frame_rate = frame_rate.max(1);
        let frames_per_photo = frames_for_seconds(settings.seconds_per_photo, frame_rate);
        Self {
            frame_rate,
            frames_per_photo,
            transition_frames: transition_frames_for(settings.transition, frames_per_photo),
            photo_count,
        }
    }

    pub fn frame_rate(&self) -> u32 {
        self.frame_rate
    }

    pub fn frames_per_photo(&self) -> u64 {
        self.frames_per_photo
    }

    pub fn transition_frames(&self) -> u64 {
        self.transition_frames
    }

    pub fn photo_count(&self) -> usize {
        self.photo_count
    }

    /// Total number of output frames.
    pub fn total_frames(&self) -> u64 {
        self.frames_per_photo * self.photo_count as u64
    }

    /// Playback duration of the output.
    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.total_frames() as f64 / self.frame_rate as f64)
    }

    /// Time between two consecutive frames.
    pub fn frame_interval(&self) -> Duration {
        Duration::from_nanos(1_000_000_000 / self.frame_rate as u64)
    }

    /// Schedule for one frame.
    pub fn schedule(&self, frame_index: u64) -> FrameSchedule {
        schedule(
            frame_index,
            self.frames_per_photo,
            self.transition_frames,
            self.photo_count,
        )
    }

    /// Schedules for every frame, in order.
    pub fn frames(&self) -> impl Iterator<Item = FrameSchedule> + '_ {
        (0..self.total_frames()).map(move |frame| self.schedule(frame))
    }

    /// Absolute frame range of the transition out of `photo_index`, if any.
    pub fn transition_window(&self, photo_index: usize) -> Option<Range<u64>> {
        if self.transition_frames == 0 || photo_index + 1 >= self.photo_count {
            return None;
        }
        let end = (photo_index as u64 + 1) * self.frames_per_photo;
        Some(end - self.transition_frames..end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn settings(seconds: f64, transition: TransitionKind) -> ExportSettings {
        ExportSettings::new(seconds, transition)
    }

    #[test]
    fn test_scenario_five_photos_fade() {
        let timeline = Timeline::new(&settings(2.0, TransitionKind::Fade), 5);
        assert_eq!(timeline.frames_per_photo(), 60);
        assert_eq!(timeline.transition_frames(), 15);
        assert_eq!(timeline.total_frames(), 300);

        for photo in 0..4 {
            let window = timeline.transition_window(photo).unwrap();
            let base = photo as u64 * 60;
            assert_eq!(window, base + 45..base + 60);
            for frame in base..base + 60 {
                let s = timeline.schedule(frame);
                assert_eq!(s.photo_index, photo);
                assert_eq!(s.is_transitioning, s.frame_in_photo >= 45);
            }
        }

        assert_eq!(timeline.transition_window(4), None);
        for frame in 240..300 {
            let s = timeline.schedule(frame);
            assert_eq!(s.photo_index, 4);
            assert_eq!(s.next_photo_index, 4);
            assert!(!s.is_transitioning);
            assert_eq!(s.progress, 0.0);
        }
    }

    #[test]
    fn test_scenario_single_photo_holds() {
        for kind in TransitionKind::ALL {
            let timeline = Timeline::new(&settings(3.0, kind), 1);
            assert_eq!(timeline.total_frames(), 90);
            assert!(timeline.frames().all(|s| !s.is_transitioning && s.photo_index == 0));
        }
    }

    #[test]
    fn test_scenario_hard_cuts() {
        let timeline = Timeline::new(&settings(1.5, TransitionKind::None), 3);
        let fpp = timeline.frames_per_photo();
        assert_eq!(timeline.transition_frames(), 0);
        assert!(timeline.frames().all(|s| !s.is_transitioning));

        for boundary in [fpp, 2 * fpp] {
            let before = timeline.schedule(boundary - 1);
            let at = timeline.schedule(boundary);
            assert_eq!(at.photo_index, before.photo_index + 1);
            assert_eq!(at.frame_in_photo, 0);
        }
    }

    #[test]
    fn test_short_window_uses_quarter() {
        let timeline = Timeline::new(&settings(1.0, TransitionKind::Slide), 2);
        assert_eq!(timeline.frames_per_photo(), 30);
        assert_eq!(timeline.transition_frames(), 7);
        let first = timeline.schedule(23);
        assert!(first.is_transitioning);
        assert_eq!(first.progress, 0.0);
        assert!(!timeline.schedule(22).is_transitioning);
    }

    #[test]
    fn test_non_integral_product_rounds() {
        assert_eq!(frames_for_seconds(1.25, 30), 38);
        assert_eq!(frames_for_seconds(1.2, 30), 36);
        assert_eq!(frames_for_seconds(0.01, 30), 1);
        let timeline = Timeline::new(&settings(1.25, TransitionKind::Fade), 2);
        assert_eq!(timeline.total_frames(), 76);
    }

    #[test]
    fn test_duration() {
        let timeline = Timeline::new(&settings(2.5, TransitionKind::Zoom), 4);
        assert_eq!(timeline.duration(), Duration::from_secs(10));
        assert_eq!(timeline.frame_interval(), Duration::from_nanos(33_333_333));
    }

    #[test]
    fn test_zero_photos_is_empty() {
        let timeline = Timeline::new(&settings(2.0, TransitionKind::Fade), 0);
        assert_eq!(timeline.total_frames(), 0);
        assert_eq!(timeline.frames().count(), 0);
    }

    proptest! {
        #[test]
        fn prop_total_frames_matches_product(
            photos in 1usize..40,
            half_seconds in 2u32..=10,
            kind in prop::sample::select(TransitionKind::ALL.to_vec()),
        ) {
            let seconds = half_seconds as f64 / 2.0;
            let timeline = Timeline::new(&settings(seconds, kind), photos);
            let expected = photos as f64 * seconds * 30.0;
            prop_assert_eq!(timeline.total_frames() as f64, expected);
            prop_assert!(timeline.transition_frames() < timeline.frames_per_photo());
        }

        #[test]
        fn prop_windows_rise_strictly(
            photos in 2usize..12,
            half_seconds in 2u32..=10,
            kind in prop::sample::select(vec![
                TransitionKind::Fade,
                TransitionKind::Slide,
                TransitionKind::Zoom,
            ]),
        ) {
            let timeline = Timeline::new(&settings(half_seconds as f64 / 2.0, kind), photos);
            let tf = timeline.transition_frames();

            for photo in 0..photos {
                let in_window: Vec<FrameSchedule> = timeline
                    .frames()
                    .filter(|s| s.photo_index == photo && s.is_transitioning)
                    .collect();

                if photo == photos - 1 {
                    prop_assert!(in_window.is_empty());
                    continue;
                }

                prop_assert_eq!(in_window.len() as u64, tf);
                prop_assert_eq!(in_window[0].progress, 0.0);
                for pair in in_window.windows(2) {
                    prop_assert!(pair[1].progress > pair[0].progress);
                }
                let last = in_window[in_window.len() - 1];
                prop_assert!(last.progress < 1.0);
                prop_assert_eq!(last.next_photo_index, photo + 1);
            }
        }

        #[test]
        fn prop_schedule_indices_in_range(
            frame in 0u64..10_000,
            fpp in 1u64..200,
            photos in 1usize..60,
        ) {
            let total = fpp * photos as u64;
            prop_assume!(frame < total);
            let s = schedule(frame, fpp, MAX_TRANSITION_FRAMES.min(fpp / 4), photos);
            prop_assert!(s.photo_index < photos);
            prop_assert!(s.next_photo_index < photos);
            prop_assert!(s.frame_in_photo < fpp);
            prop_assert!((0.0..1.0).contains(&s.progress));
            prop_assert!((0.0..1.0).contains(&s.hold_fraction));
        }
    }
}
