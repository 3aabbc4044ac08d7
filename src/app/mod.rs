// Application layer: one pipeline per deck-building stage.

pub mod pipelines;

use crate::config::DeckConfig;
use crate::core::{EtlEngine, Stage, StageKind, StageSequence};
use crate::domain::ports::Storage;
use pipelines::{
    CombinePipeline, CountriesPipeline, IdentificationPipeline, ImagesPipeline, SortPipeline,
    SpeciesPipeline, TraitsPipeline, TranslationsPipeline,
};

/// Boxes the pipeline behind `kind` into a runnable stage.
pub fn build_stage<S>(kind: StageKind, storage: S, config: DeckConfig, monitor: bool) -> Box<dyn Stage>
where
    S: Storage + 'static,
{
    match kind {
        StageKind::Species => Box::new(EtlEngine::new_with_monitoring(
            SpeciesPipeline::new(storage, config),
            monitor,
        )),
        StageKind::Translations => Box::new(EtlEngine::new_with_monitoring(
            TranslationsPipeline::new(storage, config),
            monitor,
        )),
        StageKind::Countries => Box::new(EtlEngine::new_with_monitoring(
            CountriesPipeline::new(storage, config),
            monitor,
        )),
        StageKind::Images => Box::new(EtlEngine::new_with_monitoring(
            ImagesPipeline::new(storage, config),
            monitor,
        )),
        StageKind::Identification => Box::new(EtlEngine::new_with_monitoring(
            IdentificationPipeline::new(storage, config),
            monitor,
        )),
        StageKind::Traits => Box::new(EtlEngine::new_with_monitoring(
            TraitsPipeline::new(storage, config),
            monitor,
        )),
        StageKind::Combine => Box::new(EtlEngine::new_with_monitoring(
            CombinePipeline::new(storage, config),
            monitor,
        )),
        StageKind::Sort => Box::new(EtlEngine::new_with_monitoring(
            SortPipeline::new(storage, config),
            monitor,
        )),
    }
}

/// A sequence running `stages` in the given order against one storage.
pub fn build_sequence<S>(
    execution_id: String,
    stages: &[StageKind],
    storage: S,
    config: &DeckConfig,
) -> StageSequence
where
    S: Storage + Clone + 'static,
{
    let monitor = config.monitoring_enabled();
    let mut sequence = StageSequence::new(execution_id).with_monitoring(monitor);
    for kind in stages {
        sequence.add_stage(build_stage(*kind, storage.clone(), config.clone(), monitor));
    }
    sequence
}
