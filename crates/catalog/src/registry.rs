use std::collections::{BTreeMap, BTreeSet};

use engine::ops::{remove_layer_if_present, remove_source_if_present};
use engine::{EngineError, MapEngine};
use layers::{DatasetConfig, VISIBILITY, Visibility};
use tracing::{debug, error, info, warn};

use crate::error::DatasetError;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AddOutcome {
    Added,
    /// The same config was already registered; nothing changed.
    AlreadyPresent,
    /// A different config with the same id was removed first.
    Replaced,
    /// The same config was already registered; ids missing from the engine
    /// were added again.
    Restored,
}

/// Datasets currently materialized on the engine, and which are visible.
///
/// Every active id is also a registered id.
#[derive(Debug, Default)]
pub struct DatasetRegistry {
    datasets: BTreeMap<String, DatasetConfig>,
    active: BTreeSet<String>,
}

impl DatasetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.datasets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.datasets.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&DatasetConfig> {
        self.datasets.get(id)
    }

    pub fn is_active(&self, id: &str) -> bool {
        self.active.contains(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.datasets.keys().map(String::as_str)
    }

    pub fn active_ids(&self) -> impl Iterator<Item = &str> {
        self.active.iter().map(String::as_str)
    }

    /// Materializes the dataset: source first, then layers in order. Ids the
    /// engine already knows are left alone. On failure everything this call
    /// created is removed again and the registry is unchanged.
    pub fn add<E: MapEngine + ?Sized>(
        &mut self,
        engine: &mut E,
        dataset: &DatasetConfig,
    ) -> Result<AddOutcome, DatasetError> {
        dataset.validate()?;

        let mut outcome = AddOutcome::Added;
        if let Some(existing) = self.datasets.get(&dataset.id) {
            if existing == dataset {
                return self.restore(engine, dataset);
            }
            info!(dataset = %dataset.id, "dataset config changed, replacing");
            self.remove(engine, &dataset.id);
            outcome = AddOutcome::Replaced;
        }

        let mut created = Created::default();
        if let Err(e) = materialize(engine, dataset, &mut created) {
            error!(dataset = %dataset.id, error = %e, "failed to add dataset");
            created.roll_back(engine);
            return Err(DatasetError::Engine {
                dataset: dataset.id.clone(),
                error: e,
            });
        }

        self.datasets.insert(dataset.id.clone(), dataset.clone());
        self.active.insert(dataset.id.clone());
        info!(
            dataset = %dataset.id,
            source = %dataset.source.id,
            layers = dataset.layers.len(),
            "dataset added"
        );
        Ok(outcome)
    }

    /// Re-adds whatever part of a registered dataset has gone missing from
    /// the engine. Restored layers follow the dataset's active flag.
    fn restore<E: MapEngine + ?Sized>(
        &mut self,
        engine: &mut E,
        dataset: &DatasetConfig,
    ) -> Result<AddOutcome, DatasetError> {
        let mut created = Created::default();
        if let Err(e) = materialize(engine, dataset, &mut created) {
            error!(dataset = %dataset.id, error = %e, "failed to restore dataset");
            created.roll_back(engine);
            return Err(DatasetError::Engine {
                dataset: dataset.id.clone(),
                error: e,
            });
        }
        if created.is_empty() {
            debug!(dataset = %dataset.id, "dataset already registered");
            return Ok(AddOutcome::AlreadyPresent);
        }
        if !self.active.contains(&dataset.id) {
            let hidden = Visibility::None.to_value();
            for id in &created.layers {
                if let Err(e) = engine.set_layout_property(id, VISIBILITY, &hidden) {
                    warn!(dataset = %dataset.id, layer = %id, error = %e, "could not hide restored layer");
                }
            }
        }
        info!(
            dataset = %dataset.id,
            layers = created.layers.len(),
            source = created.source.is_some(),
            "dataset restored"
        );
        Ok(AddOutcome::Restored)
    }

    /// Removes layers and then the source. Missing ids on the engine are
    /// ignored. Returns whether the dataset was registered.
    pub fn remove<E: MapEngine + ?Sized>(&mut self, engine: &mut E, id: &str) -> bool {
        let Some(dataset) = self.datasets.remove(id) else {
            return false;
        };
        self.active.remove(id);
        dematerialize(engine, &dataset);
        info!(dataset = id, "dataset removed");
        true
    }

    /// Flips visibility of every layer of the dataset still on the engine.
    /// Returns the new active flag, or `None` for an unknown id. If any layer
    /// fails, the ones already flipped are flipped back and the active flag
    /// is unchanged.
    pub fn toggle<E: MapEngine + ?Sized>(
        &mut self,
        engine: &mut E,
        id: &str,
    ) -> Result<Option<bool>, DatasetError> {
        let Some(dataset) = self.datasets.get(id) else {
            return Ok(None);
        };
        let show = !self.active.contains(id);
        let value = Visibility::from(show).to_value();
        let mut flipped: Vec<&str> = Vec::new();
        for layer in &dataset.layers {
            if !engine.has_layer(&layer.id) {
                debug!(dataset = id, layer = %layer.id, "layer missing, skipped");
                continue;
            }
            if let Err(e) = engine.set_layout_property(&layer.id, VISIBILITY, &value) {
                warn!(dataset = id, layer = %layer.id, error = %e, "toggle failed");
                let previous = Visibility::from(!show).to_value();
                for flipped_id in flipped.iter().rev() {
                    let _ = engine.set_layout_property(flipped_id, VISIBILITY, &previous);
                }
                return Err(DatasetError::Engine {
                    dataset: id.to_string(),
                    error: e,
                });
            }
            flipped.push(&layer.id);
        }
        if show {
            self.active.insert(id.to_string());
        } else {
            self.active.remove(id);
        }
        debug!(dataset = id, visible = show, "dataset toggled");
        Ok(Some(show))
    }

    /// Removes every registered dataset from the engine. Returns how many
    /// were removed.
    pub fn clear<E: MapEngine + ?Sized>(&mut self, engine: &mut E) -> usize {
        let datasets = std::mem::take(&mut self.datasets);
        self.active.clear();
        for dataset in datasets.values() {
            dematerialize(engine, dataset);
        }
        if !datasets.is_empty() {
            info!(count = datasets.len(), "all datasets removed");
        }
        datasets.len()
    }

    /// Drops bookkeeping without touching an engine, for when the instance
    /// is gone or never became usable.
    pub fn forget(&mut self) {
        self.datasets.clear();
        self.active.clear();
    }
}

/// Ids one call added to the engine, so a failure can undo exactly those.
#[derive(Debug, Default)]
pub(crate) struct Created {
    pub(crate) source: Option<String>,
    pub(crate) layers: Vec<String>,
}

impl Created {
    pub(crate) fn is_empty(&self) -> bool {
        self.source.is_none() && self.layers.is_empty()
    }

    pub(crate) fn roll_back<E: MapEngine + ?Sized>(self, engine: &mut E) {
        for id in self.layers.iter().rev() {
            remove_layer_if_present(engine, id);
        }
        if let Some(id) = &self.source {
            remove_source_if_present(engine, id);
        }
    }
}

fn materialize<E: MapEngine + ?Sized>(
    engine: &mut E,
    dataset: &DatasetConfig,
    created: &mut Created,
) -> Result<(), EngineError> {
    if !engine.has_source(&dataset.source.id) {
        engine.add_source(&dataset.source)?;
        created.source = Some(dataset.source.id.clone());
    }
    for layer in &dataset.layers {
        if engine.has_layer(&layer.id) {
            continue;
        }
        engine.add_layer(layer, None)?;
        created.layers.push(layer.id.clone());
    }
    Ok(())
}

fn dematerialize<E: MapEngine + ?Sized>(engine: &mut E, dataset: &DatasetConfig) {
    for layer in &dataset.layers {
        remove_layer_if_present(engine, &layer.id);
    }
    remove_source_if_present(engine, &dataset.source.id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FailingEngine, ready_binding, ready_engine};
    use engine::headless::EngineOp;
    use layers::{Expression, GeoJsonData, LayerSpec, LayerType, SourceSpec};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn dataset(id: &str) -> DatasetConfig {
        let source = format!("{id}-source");
        DatasetConfig::new(
            id,
            id,
            SourceSpec::geojson(
                source.clone(),
                GeoJsonData::Inline(json!({ "type": "FeatureCollection", "features": [] })),
            ),
        )
        .with_layer(LayerSpec::new(format!("{id}-fill"), LayerType::Fill, source.clone()))
        .with_layer(LayerSpec::new(format!("{id}-line"), LayerType::Line, source))
    }

    #[test]
    fn add_then_remove_restores_empty_registry() {
        let (backend, mut binding) = ready_binding();
        let engine = ready_engine(&mut binding);
        let mut registry = DatasetRegistry::new();

        assert_eq!(registry.add(engine, &dataset("trips")), Ok(AddOutcome::Added));
        assert!(registry.is_active("trips"));
        assert!(backend.source_ids().contains(&"trips-source".to_string()));

        assert!(registry.remove(engine, "trips"));
        assert!(registry.is_empty());
        assert_eq!(registry.active_ids().count(), 0);
        assert!(!backend.source_ids().contains(&"trips-source".to_string()));
        assert!(!registry.remove(engine, "trips"));
    }

    #[test]
    fn remove_takes_layers_before_source() {
        let (backend, mut binding) = ready_binding();
        let engine = ready_engine(&mut binding);
        let mut registry = DatasetRegistry::new();
        registry.add(engine, &dataset("trips")).unwrap();
        backend.clear_journal();

        registry.remove(engine, "trips");
        assert_eq!(
            backend.journal(),
            vec![
                EngineOp::RemoveLayer("trips-fill".into()),
                EngineOp::RemoveLayer("trips-line".into()),
                EngineOp::RemoveSource("trips-source".into()),
            ]
        );
    }

    #[test]
    fn double_add_is_idempotent() {
        let (backend, mut binding) = ready_binding();
        let engine = ready_engine(&mut binding);
        let mut registry = DatasetRegistry::new();
        registry.add(engine, &dataset("trips")).unwrap();
        assert_eq!(
            registry.add(engine, &dataset("trips")),
            Ok(AddOutcome::AlreadyPresent)
        );
        let layers = backend.layer_ids();
        assert_eq!(layers.iter().filter(|l| *l == "trips-fill").count(), 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn changed_config_replaces_old_dataset() {
        let (backend, mut binding) = ready_binding();
        let engine = ready_engine(&mut binding);
        let mut registry = DatasetRegistry::new();
        registry.add(engine, &dataset("trips")).unwrap();

        let mut changed = dataset("trips");
        changed.layers.pop();
        assert_eq!(registry.add(engine, &changed), Ok(AddOutcome::Replaced));
        assert!(backend.layer("trips-line").is_none());
        assert!(backend.layer("trips-fill").is_some());
    }

    #[test]
    fn toggle_twice_restores_visibility() {
        let (backend, mut binding) = ready_binding();
        let engine = ready_engine(&mut binding);
        let mut registry = DatasetRegistry::new();
        registry.add(engine, &dataset("trips")).unwrap();

        assert_eq!(registry.toggle(engine, "trips"), Ok(Some(false)));
        assert!(!registry.is_active("trips"));
        assert_eq!(backend.layer("trips-fill").unwrap().visibility(), Visibility::None);

        assert_eq!(registry.toggle(engine, "trips"), Ok(Some(true)));
        assert!(registry.is_active("trips"));
        assert_eq!(
            backend.layer("trips-line").unwrap().visibility(),
            Visibility::Visible
        );
        assert_eq!(registry.toggle(engine, "unknown"), Ok(None));
    }

    #[test]
    fn toggle_skips_externally_removed_layer() {
        let (_backend, mut binding) = ready_binding();
        let engine = ready_engine(&mut binding);
        let mut registry = DatasetRegistry::new();
        registry.add(engine, &dataset("trips")).unwrap();
        engine.remove_layer("trips-line").unwrap();
        assert_eq!(registry.toggle(engine, "trips"), Ok(Some(false)));
    }

    #[test]
    fn identical_add_restores_externally_removed_layer() {
        let (backend, mut binding) = ready_binding();
        let engine = ready_engine(&mut binding);
        let mut registry = DatasetRegistry::new();
        registry.add(engine, &dataset("trips")).unwrap();
        engine.remove_layer("trips-line").unwrap();

        assert_eq!(registry.add(engine, &dataset("trips")), Ok(AddOutcome::Restored));
        assert!(backend.layer("trips-line").is_some());
        assert!(backend.layer("trips-fill").is_some());
        assert_eq!(registry.len(), 1);
        assert_eq!(
            registry.add(engine, &dataset("trips")),
            Ok(AddOutcome::AlreadyPresent)
        );
    }

    #[test]
    fn restored_layer_of_hidden_dataset_stays_hidden() {
        let (backend, mut binding) = ready_binding();
        let engine = ready_engine(&mut binding);
        let mut registry = DatasetRegistry::new();
        registry.add(engine, &dataset("trips")).unwrap();
        registry.toggle(engine, "trips").unwrap();
        engine.remove_layer("trips-line").unwrap();

        assert_eq!(registry.add(engine, &dataset("trips")), Ok(AddOutcome::Restored));
        assert!(!registry.is_active("trips"));
        assert_eq!(backend.layer("trips-line").unwrap().visibility(), Visibility::None);
    }

    #[test]
    fn failed_toggle_flips_back_and_keeps_active_flag() {
        let (backend, mut binding) = ready_binding();
        let engine = ready_engine(&mut binding);
        let mut registry = DatasetRegistry::new();
        registry.add(engine, &dataset("trips")).unwrap();

        let mut failing = FailingEngine {
            inner: engine,
            fail_layer: "trips-line",
        };
        let err = registry.toggle(&mut failing, "trips").unwrap_err();
        assert!(matches!(err, DatasetError::Engine { ref dataset, .. } if dataset == "trips"));
        assert!(registry.is_active("trips"));
        assert_eq!(
            backend.layer("trips-fill").unwrap().visibility(),
            Visibility::Visible
        );
        assert_eq!(
            backend.layer("trips-line").unwrap().visibility(),
            Visibility::Visible
        );
    }

    #[test]
    fn failed_add_rolls_back_and_leaves_others_alone() {
        let (backend, mut binding) = ready_binding();
        let engine = ready_engine(&mut binding);
        let mut registry = DatasetRegistry::new();
        registry.add(engine, &dataset("cities")).unwrap();

        let mut broken = dataset("trips");
        broken.layers[1].filter = Some(Expression::new(json!(["==", ["get", "kind"]])));
        let err = registry.add(engine, &broken).unwrap_err();
        assert!(matches!(err, DatasetError::Engine { ref dataset, .. } if dataset == "trips"));

        assert!(!registry.contains("trips"));
        assert!(!registry.is_active("trips"));
        assert!(backend.layer("trips-fill").is_none());
        assert!(!backend.source_ids().contains(&"trips-source".to_string()));
        assert!(registry.is_active("cities"));
    }

    #[test]
    fn invalid_config_never_reaches_engine() {
        let (backend, mut binding) = ready_binding();
        let engine = ready_engine(&mut binding);
        let mut registry = DatasetRegistry::new();
        let mut foreign = dataset("trips");
        foreign.layers[0].source = "elsewhere".into();
        backend.clear_journal();
        assert!(matches!(
            registry.add(engine, &foreign),
            Err(DatasetError::InvalidConfig(_))
        ));
        assert!(backend.journal().is_empty());
    }

    #[test]
    fn clear_removes_every_dataset() {
        let (backend, mut binding) = ready_binding();
        let engine = ready_engine(&mut binding);
        let mut registry = DatasetRegistry::new();
        for id in ["a", "b", "c"] {
            registry.add(engine, &dataset(id)).unwrap();
        }
        assert_eq!(registry.clear(engine), 3);
        assert!(registry.is_empty());
        for id in ["a", "b", "c"] {
            assert!(!backend.source_ids().contains(&format!("{id}-source")));
        }
    }
}
