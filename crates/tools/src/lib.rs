//! Helpers behind the `passport-map` commands, kept out of `main.rs` so they
//! can be tested without spawning the binary.

use std::fs;
use std::path::Path;

use catalog::OverlayOptions;
use engine::headless::{EngineOp, HeadlessBackend};
use engine::{EngineConfig, LoadingState};
use foundation::{LngLat, Viewport, ZoomRange, validate_viewport};
use layers::{DatasetConfig, Expression, Properties};
use serde_json::Value;
use session::MapSession;
use tracing::{debug, info};

/// Used by `simulate` when `MAPBOX_ACCESS_TOKEN` is unset; the headless
/// engine never contacts the tile service.
pub const SIMULATION_TOKEN: &str = "pk.headless-simulation-token";

/// Parses `"lng,lat"`.
pub fn parse_lng_lat(s: &str) -> Result<LngLat, String> {
    let (lng, lat) = s
        .split_once(',')
        .ok_or_else(|| format!("expected <lng,lat>, got {s:?}"))?;
    let lng: f64 = lng
        .trim()
        .parse()
        .map_err(|_| format!("invalid longitude: {lng:?}"))?;
    let lat: f64 = lat
        .trim()
        .parse()
        .map_err(|_| format!("invalid latitude: {lat:?}"))?;
    Ok(LngLat::new(lng, lat))
}

/// A dataset file holds either one dataset object or an array of them.
/// Every dataset is validated.
pub fn parse_datasets(text: &str) -> Result<Vec<DatasetConfig>, String> {
    let value: Value = serde_json::from_str(text).map_err(|e| format!("invalid JSON: {e}"))?;
    let datasets: Vec<DatasetConfig> = match value {
        Value::Array(_) => serde_json::from_value(value),
        _ => serde_json::from_value(value).map(|d| vec![d]),
    }
    .map_err(|e| format!("invalid dataset: {e}"))?;

    for dataset in &datasets {
        dataset
            .validate()
            .map_err(|e| format!("dataset {}: {e}", dataset.id))?;
    }
    Ok(datasets)
}

pub fn load_datasets(path: &Path) -> Result<Vec<DatasetConfig>, String> {
    let text = fs::read_to_string(path).map_err(|e| format!("read {path:?}: {e}"))?;
    parse_datasets(&text).map_err(|e| format!("{}: {e}", path.display()))
}

pub fn check_viewport(viewport: &Viewport) -> Result<(), String> {
    validate_viewport(viewport, ZoomRange::WORLD).map_err(|e| e.to_string())
}

/// The grey mask filter: everything outside `codes`.
pub fn overlay_filter(codes: &[String]) -> Expression {
    OverlayOptions::new(codes.iter().cloned()).mask_filter()
}

/// Whether a region with `code` would be greyed out by `filter`.
pub fn is_masked(filter: &Expression, code: &str) -> Result<bool, String> {
    let mut props = Properties::new();
    props.insert(
        catalog::REGION_CODE_PROPERTY.to_string(),
        Value::from(code),
    );
    filter.matches(&props).map_err(|e| e.to_string())
}

/// Runs a headless session through bind, ready, add, toggle off and on,
/// then unbind, and returns the engine journal.
pub fn simulate(config: &EngineConfig, datasets: &[DatasetConfig]) -> Result<Vec<EngineOp>, String> {
    let backend = HeadlessBackend::new();
    let mut session = MapSession::new(backend.clone());
    let container = "map".to_string();

    let state = session.bind(&container, config);
    if state == LoadingState::Error {
        return Err(session
            .error()
            .map(|e| e.to_string())
            .unwrap_or_else(|| "bind failed".to_string()));
    }
    backend.emit_ready();
    session.tick(0);
    if !session.is_loaded() {
        return Err(format!("engine did not load (state: {})", session.state().as_str()));
    }
    info!("headless engine ready");

    for dataset in datasets {
        let outcome = session
            .add_dataset(dataset)
            .map_err(|e| format!("add {}: {e}", dataset.id))?;
        debug!(dataset = %dataset.id, ?outcome, "dataset added");
    }
    for dataset in datasets {
        for _ in 0..2 {
            session
                .toggle_dataset(&dataset.id)
                .map_err(|e| format!("toggle {}: {e}", dataset.id))?;
        }
    }
    session.unbind();
    Ok(backend.journal())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    const SAMPLE: &str = include_str!("../data/visited_cities.json");

    #[test]
    fn parses_lng_lat_pairs() {
        assert_eq!(parse_lng_lat("2.35, 48.85").unwrap(), LngLat::new(2.35, 48.85));
        assert!(parse_lng_lat("2.35").is_err());
        assert!(parse_lng_lat("east,48").is_err());
    }

    #[test]
    fn sample_dataset_is_valid() {
        let datasets = parse_datasets(SAMPLE).unwrap();
        assert_eq!(datasets.len(), 1);
        assert_eq!(datasets[0].id, "visited-cities");
        assert_eq!(datasets[0].layers.len(), 3);
    }

    #[test]
    fn accepts_arrays_and_reports_invalid_datasets() {
        let text = format!("[{SAMPLE}]");
        assert_eq!(parse_datasets(&text).unwrap().len(), 1);

        let broken = SAMPLE.replace(
            "\"source\": \"visited-cities-source\",\n      \"minzoom\"",
            "\"source\": \"elsewhere\",\n      \"minzoom\"",
        );
        let err = parse_datasets(&broken).unwrap_err();
        assert!(err.starts_with("dataset visited-cities:"), "{err}");
    }

    #[test]
    fn load_reports_missing_files() {
        let err = load_datasets(&PathBuf::from("does/not/exist.json")).unwrap_err();
        assert!(err.contains("does/not/exist.json"), "{err}");
    }

    #[test]
    fn viewport_checks() {
        assert!(check_viewport(&Viewport::new(2.35, 48.85, 5.0)).is_ok());
        let err = check_viewport(&Viewport::new(200.0, 0.0, 1.0)).unwrap_err();
        assert!(err.contains("longitude"), "{err}");
    }

    #[test]
    fn mask_excludes_listed_codes() {
        let filter = overlay_filter(&["PRT".to_string(), "KEN".to_string()]);
        assert!(!is_masked(&filter, "PRT").unwrap());
        assert!(!is_masked(&filter, "KEN").unwrap());
        assert!(is_masked(&filter, "FRA").unwrap());
    }

    #[test]
    fn simulation_adds_toggles_and_tears_down() {
        let datasets = parse_datasets(SAMPLE).unwrap();
        let journal = simulate(&EngineConfig::new(SIMULATION_TOKEN), &datasets).unwrap();

        assert!(matches!(journal.first(), Some(EngineOp::Construct { .. })));
        assert!(matches!(journal.last(), Some(EngineOp::Destroy { .. })));
        assert!(journal.contains(&EngineOp::AddSource("visited-cities-source".to_string())));
        assert!(journal.contains(&EngineOp::RemoveSource("visited-cities-source".to_string())));

        let adds = journal
            .iter()
            .filter(|op| matches!(op, EngineOp::AddLayer { .. }))
            .count();
        assert_eq!(adds, 3);
    }

    #[test]
    fn simulation_rejects_blank_token() {
        let err = simulate(&EngineConfig::new(" "), &[]).unwrap_err();
        assert!(err.contains("INVALID_CONFIG"), "{err}");
    }
}
