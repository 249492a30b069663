use crate::error::StageError;
use crate::stage::{ExecuteContext, MetadataContext, OutputPortDescriptor, Stage, StageSignature};
use vizflow_core::info::{CAN_PRODUCE_SUB_EXTENT, COMPOSITE_BLOCK_IDS, DATA_TIME_STEP, TIME_STEPS, WHOLE_EXTENT};
use vizflow_core::{DataKind, DataObject};

/// Source holding a client-supplied data object
///
/// Inserted by [`Pipeline::set_input_data`](crate::Pipeline::set_input_data)
/// and hidden from [`Pipeline::stage_ids`](crate::Pipeline::stage_ids).
/// Advertises what the object holds: its extent as the whole extent, its
/// time step and, for composites, its leaf ids.
#[derive(Debug, Clone)]
pub struct TrivialProducer {
    data: DataObject,
}

impl TrivialProducer {
    /// Producer of `data`
    #[must_use]
    pub fn new(data: DataObject) -> Self {
        Self { data }
    }

    /// Held object
    #[must_use]
    pub fn data(&self) -> &DataObject {
        &self.data
    }

    /// Mutable held object; marks it modified
    pub fn data_mut(&mut self) -> &mut DataObject {
        self.data.modified();
        &mut self.data
    }

    /// Replace the held object
    pub fn set_data(&mut self, data: DataObject) {
        self.data = data;
    }
}

impl Stage for TrivialProducer {
    fn type_name(&self) -> &'static str {
        "trivial_producer"
    }

    fn signature(&self) -> StageSignature {
        StageSignature::new().output(OutputPortDescriptor::new("output", self.data.kind()))
    }

    fn declare_output_type(&self, _port: usize, _inputs: &[Vec<DataKind>]) -> DataKind {
        self.data.kind()
    }

    fn exchange_metadata(&mut self, ctx: &mut MetadataContext<'_>) -> Result<(), StageError> {
        let Some(info) = ctx.output_mut(0) else {
            return Ok(());
        };
        if let Some(extent) = self.data.extent() {
            info.set(&WHOLE_EXTENT, extent);
            info.set(&CAN_PRODUCE_SUB_EXTENT, false);
        }
        if let Some(t) = self.data.info().get(&DATA_TIME_STEP) {
            info.set(&TIME_STEPS, vec![t]);
        }
        if let Some(composite) = self.data.composite() {
            info.set(&COMPOSITE_BLOCK_IDS, composite.leaf_ids());
        }
        Ok(())
    }

    fn execute(&mut self, ctx: &mut ExecuteContext<'_>) -> Result<(), StageError> {
        ctx.set_output(0, self.data.clone())
    }
}
