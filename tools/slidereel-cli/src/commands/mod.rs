pub mod check;
pub mod config;
pub mod export;
pub mod plan;

use slidereel_common::config::AppConfig;
use slidereel_project_model::{ExportSettings, TransitionKind};

/// Export settings from command-line overrides, falling back to the config.
pub fn resolve_settings(
    config: &AppConfig,
    seconds: Option<f64>,
    transition: Option<String>,
) -> anyhow::Result<ExportSettings> {
    let seconds = seconds.unwrap_or(config.export.seconds_per_photo);
    let transition: TransitionKind = transition
        .as_deref()
        .unwrap_or(&config.export.transition)
        .parse()?;

    let settings = ExportSettings::new(seconds, transition);
    settings.validate()?;
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_win_over_config() {
        let config = AppConfig::default();
        let settings = resolve_settings(&config, Some(2.5), Some("slide".into())).unwrap();
        assert_eq!(settings.seconds_per_photo, 2.5);
        assert_eq!(settings.transition, TransitionKind::Slide);

        let defaults = resolve_settings(&config, None, None).unwrap();
        assert_eq!(defaults, ExportSettings::default());
    }

    #[test]
    fn test_rejects_bad_values() {
        let config = AppConfig::default();
        assert!(resolve_settings(&config, Some(7.0), None).is_err());
        assert!(resolve_settings(&config, None, Some("wipe".into())).is_err());
    }
}
