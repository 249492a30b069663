//! Running a block filter over every leaf of a composite
//!
//! [`PerBlock`] turns a [`BlockFilter`], which knows nothing about
//! composites, into a composite-aware [`Stage`]. Results are cached per leaf
//! against the leaf's input stamp, so a pull after one block changed only
//! reprocesses that block.

use crate::error::StageError;
use crate::policy::BlockPolicy;
use crate::stage::{ExecuteContext, InputPortDescriptor, OutputPortDescriptor, Stage, StageSignature};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::trace;
use vizflow_core::{DataKind, DataObject, MTime};

/// A transformation of one non-composite data object
pub trait BlockFilter: Send + 'static {
    /// Filter name, used as the stage type name
    fn name(&self) -> &'static str;

    /// Transform one leaf
    ///
    /// # Errors
    /// Any failure aborts the whole execution.
    fn process(&self, block: &DataObject) -> Result<DataObject, StageError>;
}

#[derive(Debug, Clone)]
struct CachedBlock {
    input_mtime: MTime,
    output: Arc<DataObject>,
}

/// Composite-aware adapter around a [`BlockFilter`]
pub struct PerBlock<F: BlockFilter> {
    filter: F,
    cache: HashMap<usize, CachedBlock>,
    processed: u64,
}

impl<F: BlockFilter> PerBlock<F> {
    /// Wrap `filter`
    #[must_use]
    pub fn new(filter: F) -> Self {
        Self {
            filter,
            cache: HashMap::new(),
            processed: 0,
        }
    }

    /// The wrapped filter
    #[must_use]
    pub fn filter(&self) -> &F {
        &self.filter
    }

    /// Mutable access to the filter; drops every cached block
    pub fn filter_mut(&mut self) -> &mut F {
        self.cache.clear();
        &mut self.filter
    }

    /// Leaves processed over the adapter's lifetime
    #[must_use]
    pub fn processed(&self) -> u64 {
        self.processed
    }

    /// Leaves currently cached
    #[must_use]
    pub fn cached_blocks(&self) -> usize {
        self.cache.len()
    }
}

impl<F: BlockFilter> Stage for PerBlock<F> {
    fn type_name(&self) -> &'static str {
        self.filter.name()
    }

    fn signature(&self) -> StageSignature {
        StageSignature::new()
            .input(InputPortDescriptor::new("input", DataKind::Composite))
            .output(OutputPortDescriptor::new("output", DataKind::MultiBlock))
    }

    fn declare_output_type(&self, _port: usize, inputs: &[Vec<DataKind>]) -> DataKind {
        inputs
            .first()
            .and_then(|conns| conns.first())
            .copied()
            .unwrap_or(DataKind::MultiBlock)
    }

    fn block_policy(&self) -> BlockPolicy {
        BlockPolicy::Forward
    }

    fn execute(&mut self, ctx: &mut ExecuteContext<'_>) -> Result<(), StageError> {
        let input = ctx.require_input(0, 0)?;
        let source = input.composite().ok_or_else(|| StageError::failed("input is not a composite"))?;

        let mut blocks = Vec::new();
        let mut live = HashMap::new();
        for leaf in source.leaves() {
            let Some(data) = leaf.data else { continue };
            let stamp = data.mtime();
            let cached = self
                .cache
                .get(&leaf.index)
                .filter(|c| c.input_mtime == stamp)
                .map(|c| Arc::clone(&c.output));
            let output = match cached {
                Some(output) => output,
                None => {
                    trace!(block = leaf.index, name = leaf.name, "processing block");
                    self.processed += 1;
                    Arc::new(self.filter.process(data)?)
                }
            };
            live.insert(
                leaf.index,
                CachedBlock {
                    input_mtime: stamp,
                    output: Arc::clone(&output),
                },
            );
            blocks.push((leaf.index, output));
        }

        let info = input.info().clone();
        let mut skeleton = vizflow_core::CompositeData::new();
        skeleton.copy_structure(source);
        self.cache = live;

        let output = ctx.require_output(0)?;
        *output.info_mut() = info;
        let target = output.composite_mut().ok_or_else(|| StageError::failed("output is not a composite"))?;
        *target = skeleton;
        for (index, block) in blocks {
            target.set_leaf(index, Some(block))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Pipeline;
    use vizflow_core::{BlockNode, FieldData, UpdateRequest};

    struct Double;

    impl BlockFilter for Double {
        fn name(&self) -> &'static str {
            "double"
        }

        fn process(&self, block: &DataObject) -> Result<DataObject, StageError> {
            let mut out = block.clone();
            if let Some(values) = out.fields_mut().and_then(|f| f.array_mut("v")) {
                values.iter_mut().for_each(|v| *v *= 2.0);
            }
            Ok(out)
        }
    }

    fn leaf(v: f64) -> DataObject {
        let mut fields = FieldData::new();
        fields.set_array("v", vec![v]).unwrap();
        DataObject::with_fields(DataKind::Table, fields)
    }

    fn multiblock(values: &[f64]) -> DataObject {
        let mut data = DataObject::new(DataKind::MultiBlock);
        let composite = data.composite_mut().unwrap();
        for (i, v) in values.iter().enumerate() {
            composite.push(BlockNode::leaf(format!("b{i}"), Some(leaf(*v))));
        }
        data
    }

    #[test]
    fn processes_each_leaf_once() {
        let mut p = Pipeline::new();
        let stage = p.add_stage(PerBlock::new(Double));
        p.set_input_data(stage, 0, multiblock(&[1.0, 2.0])).unwrap();

        let out = p.update(stage, 0, UpdateRequest::whole()).unwrap();
        let composite = out.composite().unwrap();
        let first = composite.leaf(1).unwrap();
        assert_eq!(first.fields().unwrap().array("v"), Some(&[2.0][..]));
        assert_eq!(p.with_stage::<PerBlock<Double>, _>(stage, PerBlock::processed).unwrap(), 2);
    }

    #[test]
    fn unchanged_leaves_come_from_cache() {
        let mut p = Pipeline::new();
        let stage = p.add_stage(PerBlock::new(Double));
        p.set_input_data(stage, 0, multiblock(&[1.0, 2.0])).unwrap();
        p.update(stage, 0, UpdateRequest::whole()).unwrap();

        p.modify_input_data(stage, 0, |data| {
            if let Some(values) = data
                .composite_mut()
                .and_then(|c| c.leaf_mut(2))
                .and_then(|d| d.fields_mut())
                .and_then(|f| f.array_mut("v"))
            {
                values[0] = 5.0;
            }
        })
        .unwrap();
        let out = p.update(stage, 0, UpdateRequest::whole()).unwrap();
        assert_eq!(p.with_stage::<PerBlock<Double>, _>(stage, PerBlock::processed).unwrap(), 3);
        let second = out.composite().unwrap().leaf(2).unwrap();
        assert_eq!(second.fields().unwrap().array("v"), Some(&[10.0][..]));
    }
}
