//! Testing utilities for the vizflow workspace
//!
//! Instrumented stages whose executions and received requests can be
//! observed from the test through a shared [`Monitor`].

#![allow(missing_docs)]

use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use vizflow_core::info::{
    Information, TimeRange, CAN_PRODUCE_SUB_EXTENT, COMPOSITE_BLOCK_IDS, DATA_TIME_STEP, TIME_RANGE, TIME_STEPS,
    WHOLE_EXTENT,
};
use vizflow_core::{BlockNode, CompositeData, DataKind, DataObject, Extent, FieldData, NegotiationError, UpdateRequest};
use vizflow_pipeline::{
    BlockFilter, BlockPolicy, ExecuteContext, ExtentPolicy, ForwardExtent, InputPortDescriptor, MetadataContext,
    OutputPortDescriptor, RequestWhole, Stage, StageError, StageSignature,
};

/// Shared view of what a stage did
#[derive(Debug, Clone, Default)]
pub struct Monitor {
    executions: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<UpdateRequest>>>,
}

impl Monitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn executions(&self) -> usize {
        self.executions.load(Ordering::SeqCst)
    }

    /// Request seen by each execution, oldest first
    pub fn requests(&self) -> Vec<UpdateRequest> {
        self.requests.lock().clone()
    }

    pub fn last_request(&self) -> Option<UpdateRequest> {
        self.requests.lock().last().cloned()
    }

    fn hit(&self, request: &UpdateRequest) {
        self.executions.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(request.clone());
    }
}

/// Structured field named `v` holding `value` everywhere
pub fn image(extent: Extent, value: f64) -> DataObject {
    let mut fields = FieldData::structured(extent);
    fields.set_array("v", vec![value; extent.num_points()]).unwrap();
    DataObject::with_fields(DataKind::ImageData, fields)
}

/// Single-row table with column `v`
pub fn table(value: f64) -> DataObject {
    let mut fields = FieldData::new();
    fields.set_array("v", vec![value]).unwrap();
    DataObject::with_fields(DataKind::Table, fields)
}

/// First value of array `v`
pub fn first_value(data: &DataObject) -> Option<f64> {
    data.fields()?.array("v")?.first().copied()
}

fn input_kind(inputs: &[Vec<DataKind>], fallback: DataKind) -> DataKind {
    inputs.first().and_then(|c| c.first()).copied().unwrap_or(fallback)
}

/// Structured source producing exactly the requested sub-extent
pub struct CountingSource {
    whole: Extent,
    value: f64,
    time_steps: Vec<f64>,
    policy: ForwardExtent,
    monitor: Monitor,
}

impl CountingSource {
    pub fn new(whole: Extent, monitor: Monitor) -> Self {
        Self {
            whole,
            value: 1.0,
            time_steps: Vec::new(),
            policy: ForwardExtent::new(),
            monitor,
        }
    }

    pub fn with_time_steps(mut self, steps: Vec<f64>) -> Self {
        self.time_steps = steps;
        self
    }

    pub fn set_value(&mut self, value: f64) {
        self.value = value;
    }
}

impl Stage for CountingSource {
    fn type_name(&self) -> &'static str {
        "counting_source"
    }

    fn signature(&self) -> StageSignature {
        StageSignature::new().output(OutputPortDescriptor::new("output", DataKind::ImageData))
    }

    fn exchange_metadata(&mut self, ctx: &mut MetadataContext<'_>) -> Result<(), StageError> {
        if let Some(info) = ctx.output_mut(0) {
            info.set(&WHOLE_EXTENT, self.whole);
            info.set(&CAN_PRODUCE_SUB_EXTENT, true);
            if let (Some(first), Some(last)) = (self.time_steps.first(), self.time_steps.last()) {
                info.set(&TIME_STEPS, self.time_steps.clone());
                info.set(&TIME_RANGE, TimeRange::new(*first, *last));
            }
        }
        Ok(())
    }

    fn execute(&mut self, ctx: &mut ExecuteContext<'_>) -> Result<(), StageError> {
        let requested = ctx.requested().clone();
        self.monitor.hit(&requested);
        let extent = requested
            .resolve_extent(&self.whole)
            .grow(requested.ghost_levels)
            .clamp_to(&self.whole);
        let mut data = image(extent, self.value);
        if let Some(t) = requested.time {
            data.info_mut().set(&DATA_TIME_STEP, t);
        }
        ctx.set_output(0, data)
    }

    fn extent_policy(&self) -> &dyn ExtentPolicy {
        &self.policy
    }
}

/// Adds one to array `v`; either extent-invariant or extent-aware
pub struct CountingFilter {
    aware: bool,
    forward: ForwardExtent,
    monitor: Monitor,
}

impl CountingFilter {
    /// Always asks for its whole input
    pub fn invariant(monitor: Monitor) -> Self {
        Self {
            aware: false,
            forward: ForwardExtent::new(),
            monitor,
        }
    }

    /// Asks only for what was requested of it
    pub fn aware(monitor: Monitor) -> Self {
        Self {
            aware: true,
            forward: ForwardExtent::new(),
            monitor,
        }
    }
}

impl Stage for CountingFilter {
    fn type_name(&self) -> &'static str {
        if self.aware {
            "counting_filter_aware"
        } else {
            "counting_filter_invariant"
        }
    }

    fn signature(&self) -> StageSignature {
        StageSignature::new()
            .input(InputPortDescriptor::new("input", DataKind::DataObject))
            .output(OutputPortDescriptor::new("output", DataKind::DataObject))
    }

    fn declare_output_type(&self, _port: usize, inputs: &[Vec<DataKind>]) -> DataKind {
        input_kind(inputs, DataKind::DataObject)
    }

    fn execute(&mut self, ctx: &mut ExecuteContext<'_>) -> Result<(), StageError> {
        self.monitor.hit(ctx.requested());
        let input = ctx.input_shared(0, 0).ok_or(StageError::MissingInput(0))?;
        let output = ctx.require_output(0)?;
        output.copy_from(&input)?;
        if let Some(values) = output.fields_mut().and_then(|f| f.array_mut("v")) {
            values.iter_mut().for_each(|v| *v += 1.0);
        }
        Ok(())
    }

    fn extent_policy(&self) -> &dyn ExtentPolicy {
        if self.aware {
            &self.forward
        } else {
            &RequestWhole
        }
    }
}

/// Pass-through whose execute fails while its switch is on
pub struct FailingStage {
    fail: Arc<AtomicBool>,
    monitor: Monitor,
}

impl FailingStage {
    /// Stage failing from the start, and the switch controlling it
    pub fn new(monitor: Monitor) -> (Self, Arc<AtomicBool>) {
        let fail = Arc::new(AtomicBool::new(true));
        (
            Self {
                fail: Arc::clone(&fail),
                monitor,
            },
            fail,
        )
    }
}

impl Stage for FailingStage {
    fn type_name(&self) -> &'static str {
        "failing_stage"
    }

    fn signature(&self) -> StageSignature {
        StageSignature::new()
            .input(InputPortDescriptor::new("input", DataKind::DataObject))
            .output(OutputPortDescriptor::new("output", DataKind::DataObject))
    }

    fn declare_output_type(&self, _port: usize, inputs: &[Vec<DataKind>]) -> DataKind {
        input_kind(inputs, DataKind::DataObject)
    }

    fn execute(&mut self, ctx: &mut ExecuteContext<'_>) -> Result<(), StageError> {
        self.monitor.hit(ctx.requested());
        if self.fail.load(Ordering::SeqCst) {
            return Err(StageError::failed("switched off"));
        }
        let input = ctx.input_shared(0, 0).ok_or(StageError::MissingInput(0))?;
        ctx.require_output(0)?.copy_from(&input)?;
        Ok(())
    }
}

/// Terminal stage with no outputs; keeps the first value of each input it gets
pub struct RecordingSink {
    written: Arc<Mutex<Vec<Option<f64>>>>,
    forward: ForwardExtent,
    monitor: Monitor,
}

impl RecordingSink {
    /// Sink forwarding its request upstream, and its record of writes
    pub fn new(monitor: Monitor) -> (Self, Arc<Mutex<Vec<Option<f64>>>>) {
        let written = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                written: Arc::clone(&written),
                forward: ForwardExtent::new(),
                monitor,
            },
            written,
        )
    }
}

impl Stage for RecordingSink {
    fn type_name(&self) -> &'static str {
        "recording_sink"
    }

    fn signature(&self) -> StageSignature {
        StageSignature::new().input(InputPortDescriptor::new("input", DataKind::DataObject))
    }

    fn execute(&mut self, ctx: &mut ExecuteContext<'_>) -> Result<(), StageError> {
        self.monitor.hit(ctx.requested());
        let input = ctx.require_input(0, 0)?;
        self.written.lock().push(first_value(input));
        Ok(())
    }

    fn extent_policy(&self) -> &dyn ExtentPolicy {
        &self.forward
    }
}

/// Multiblock source of single-row tables
///
/// Unchanged blocks keep their objects, and their stamps, across executions.
pub struct CompositeSource {
    blocks: Vec<(String, Arc<DataObject>)>,
    monitor: Monitor,
}

impl CompositeSource {
    pub fn new(monitor: Monitor) -> Self {
        Self {
            blocks: Vec::new(),
            monitor,
        }
    }

    pub fn with_block(mut self, name: &str, value: f64) -> Self {
        self.add_block(name, value);
        self
    }

    /// Append a leaf; returns its flat index
    pub fn add_block(&mut self, name: &str, value: f64) -> usize {
        self.blocks.push((name.to_string(), Arc::new(table(value))));
        self.blocks.len()
    }

    /// Replace the payload of the leaf at flat index `index`
    pub fn set_block_value(&mut self, index: usize, value: f64) {
        if let Some((_, data)) = index.checked_sub(1).and_then(|i| self.blocks.get_mut(i)) {
            *data = Arc::new(table(value));
        }
    }

    /// Payload stamps, in leaf order
    pub fn block_mtimes(&self) -> Vec<vizflow_core::MTime> {
        self.blocks.iter().map(|(_, d)| d.mtime()).collect()
    }
}

impl Stage for CompositeSource {
    fn type_name(&self) -> &'static str {
        "composite_source"
    }

    fn signature(&self) -> StageSignature {
        StageSignature::new().output(OutputPortDescriptor::new("output", DataKind::MultiBlock))
    }

    fn exchange_metadata(&mut self, ctx: &mut MetadataContext<'_>) -> Result<(), StageError> {
        let ids: BTreeSet<usize> = (1..=self.blocks.len()).collect();
        if let Some(info) = ctx.output_mut(0) {
            info.set(&COMPOSITE_BLOCK_IDS, ids);
        }
        Ok(())
    }

    fn execute(&mut self, ctx: &mut ExecuteContext<'_>) -> Result<(), StageError> {
        self.monitor.hit(ctx.requested());
        let wanted = ctx.requested().blocks.clone();
        let mut composite = CompositeData::new();
        for (name, data) in &self.blocks {
            let index = composite.push(BlockNode::leaf(name.clone(), None));
            if wanted.as_ref().map_or(true, |w| w.contains(&index)) {
                composite.set_leaf(index, Some(Arc::clone(data)))?;
            }
        }
        let output = ctx.require_output(0)?;
        if let Some(slot) = output.composite_mut() {
            *slot = composite;
        }
        Ok(())
    }

    fn block_policy(&self) -> BlockPolicy {
        BlockPolicy::Forward
    }
}

/// Pass-through that substitutes a clamped time when upstream rejects one
pub struct ClampingConsumer {
    monitor: Monitor,
}

impl ClampingConsumer {
    pub fn new(monitor: Monitor) -> Self {
        Self { monitor }
    }
}

impl Stage for ClampingConsumer {
    fn type_name(&self) -> &'static str {
        "clamping_consumer"
    }

    fn signature(&self) -> StageSignature {
        StageSignature::new()
            .input(InputPortDescriptor::new("input", DataKind::DataObject))
            .output(OutputPortDescriptor::new("output", DataKind::DataObject))
    }

    fn declare_output_type(&self, _port: usize, inputs: &[Vec<DataKind>]) -> DataKind {
        input_kind(inputs, DataKind::DataObject)
    }

    fn exchange_metadata(&mut self, ctx: &mut MetadataContext<'_>) -> Result<(), StageError> {
        ctx.forward_inputs();
        // Any time is accepted here and clamped upstream.
        if let Some(info) = ctx.output_mut(0) {
            info.remove(&TIME_RANGE);
            info.remove(&TIME_STEPS);
        }
        Ok(())
    }

    fn execute(&mut self, ctx: &mut ExecuteContext<'_>) -> Result<(), StageError> {
        self.monitor.hit(ctx.requested());
        let input = ctx.input_shared(0, 0).ok_or(StageError::MissingInput(0))?;
        ctx.require_output(0)?.copy_from(&input)?;
        Ok(())
    }

    fn negotiation_fallback(
        &self,
        _port: usize,
        error: &NegotiationError,
        _upstream: &Information,
        rejected: &UpdateRequest,
    ) -> Option<UpdateRequest> {
        match error {
            NegotiationError::TimeOutOfRange { requested, start, end } => {
                Some(rejected.clone().with_time(requested.clamp(*start, *end)))
            }
            _ => None,
        }
    }
}

/// Block filter adding `offset` to array `v`
#[derive(Debug, Clone, Copy)]
pub struct OffsetBlocks {
    pub offset: f64,
}

impl BlockFilter for OffsetBlocks {
    fn name(&self) -> &'static str {
        "offset_blocks"
    }

    fn process(&self, block: &DataObject) -> Result<DataObject, StageError> {
        let mut out = block.clone();
        if let Some(values) = out.fields_mut().and_then(|f| f.array_mut("v")) {
            values.iter_mut().for_each(|v| *v += self.offset);
        }
        Ok(out)
    }
}
