//! The directive pipeline.
//!
//! One drain iteration turns its validated directive instances into
//! stages, orders them by zone and runs them one after another over the
//! same [`StageContext`]. A stage can narrow the work of the stages after
//! it, but never touch the stages already run.

use crate::context::IdsDataFields;
use crate::directive::{DirectiveInstance, StageContext};
use std::sync::Arc;
use tracing::trace;

/// One directive instance and the fields it runs over.
#[derive(Debug, Clone)]
pub struct Stage {
    pub instance: Arc<DirectiveInstance>,
    pub fields: IdsDataFields,
}

impl Stage {
    pub fn new(instance: Arc<DirectiveInstance>, fields: IdsDataFields) -> Self {
        Self { instance, fields }
    }

    fn remove_field(&mut self, id: &str, field: &str) {
        if let Some(data_fields) = self.fields.get_mut(id) {
            data_fields.remove(field);
            if data_fields.is_empty() {
                self.fields.shift_remove(id);
            }
        }
    }
}

/// The stages that have not run yet.
pub struct SucceedingStages<'p> {
    stages: &'p mut [Stage],
}

impl SucceedingStages<'_> {
    /// Drops a field of one object from every remaining stage.
    pub fn remove_field(&mut self, id: &str, field: &str) {
        for stage in self.stages.iter_mut() {
            stage.remove_field(id, field);
        }
    }

    /// Drops an object from every remaining stage.
    pub fn remove_id(&mut self, id: &str) {
        for stage in self.stages.iter_mut() {
            stage.fields.shift_remove(id);
        }
    }

    /// Iterates over the remaining stages.
    pub fn iter(&self) -> impl Iterator<Item = &Stage> {
        self.stages.iter()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

/// Ordered stages of one drain iteration.
#[derive(Debug, Default)]
pub struct DirectivePipeline {
    stages: Vec<Stage>,
}

impl DirectivePipeline {
    /// Orders `stages` front, middle, back. The order within a zone is
    /// kept.
    pub fn new(mut stages: Vec<Stage>) -> Self {
        stages.sort_by_key(|stage| stage.instance.position());
        Self { stages }
    }

    /// Returns the stage tokens in execution order.
    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        self.stages.iter().map(|stage| stage.instance.token.as_str())
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Runs every stage in order. Stages left without fields are skipped.
    pub fn execute(mut self, cx: &mut StageContext<'_, '_>) {
        for index in 0..self.stages.len() {
            let (done, rest) = self.stages.split_at_mut(index + 1);
            let stage = &done[index];
            if stage.fields.is_empty() {
                trace!(token = %stage.instance.token, "stage has no fields left");
                continue;
            }
            trace!(
                token = %stage.instance.token,
                position = ?stage.instance.position(),
                ids = stage.fields.len(),
                "running stage"
            );
            let mut succeeding = SucceedingStages { stages: rest };
            stage
                .instance
                .resolver
                .execute(&stage.instance, &stage.fields, &mut succeeding, cx);
        }
    }
}
