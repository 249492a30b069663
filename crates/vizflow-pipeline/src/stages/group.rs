use crate::error::StageError;
use crate::stage::{ExecuteContext, InputPortDescriptor, MetadataContext, OutputPortDescriptor, Stage, StageSignature};
use std::collections::BTreeSet;
use vizflow_core::info::{COMPOSITE_BLOCK_IDS, WHOLE_EXTENT};
use vizflow_core::{BlockNode, DataKind};

/// Collects every input into one multiblock
///
/// Connection `i` of the repeatable input becomes leaf `block{i}` at flat
/// index `i + 1`. Leaves share the producers' objects.
#[derive(Debug, Clone, Copy, Default)]
pub struct Group;

impl Group {
    /// Grouping stage
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Stage for Group {
    fn type_name(&self) -> &'static str {
        "group"
    }

    fn signature(&self) -> StageSignature {
        StageSignature::new()
            .input(InputPortDescriptor::new("input", DataKind::DataObject).repeatable())
            .output(OutputPortDescriptor::new("output", DataKind::MultiBlock))
    }

    fn exchange_metadata(&mut self, ctx: &mut MetadataContext<'_>) -> Result<(), StageError> {
        ctx.forward_inputs();
        let blocks: BTreeSet<usize> = (1..=ctx.inputs(0).len()).collect();
        if let Some(info) = ctx.output_mut(0) {
            info.remove(&WHOLE_EXTENT);
            info.set(&COMPOSITE_BLOCK_IDS, blocks);
        }
        Ok(())
    }

    fn execute(&mut self, ctx: &mut ExecuteContext<'_>) -> Result<(), StageError> {
        let wanted = ctx.requested().blocks.clone();
        let inputs: Vec<_> = (0..ctx.connections(0)).map(|conn| ctx.input_shared(0, conn)).collect();
        let output = ctx.require_output(0)?;
        let composite = output
            .composite_mut()
            .ok_or_else(|| StageError::failed("output is not a composite"))?;
        for (conn, data) in inputs.into_iter().enumerate() {
            let index = composite.push(BlockNode::leaf(format!("block{conn}"), None));
            if wanted.as_ref().map_or(true, |w| w.contains(&index)) {
                composite.set_leaf(index, data)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::{ExtractBlocks, SyntheticImage};
    use crate::Pipeline;
    use vizflow_core::{Extent, UpdateRequest};

    fn grouped(n: usize) -> (Pipeline, crate::StageId) {
        let mut p = Pipeline::new();
        let group = p.add_stage(Group::new());
        for i in 0..n {
            let hi = i32::try_from(i).unwrap() + 1;
            let source = p.add_stage(SyntheticImage::new(Extent::new(0, hi, 0, 0, 0, 0)));
            p.connect(source, 0, group, 0).unwrap();
        }
        (p, group)
    }

    #[test]
    fn one_leaf_per_connection() {
        let (p, group) = grouped(3);
        let out = p.update(group, 0, UpdateRequest::whole()).unwrap();
        let composite = out.composite().unwrap();
        let names: Vec<&str> = composite.leaves().iter().map(|l| l.name).collect();
        assert_eq!(names, vec!["block0", "block1", "block2"]);
        assert_eq!(composite.leaf(3).unwrap().extent(), Some(Extent::new(0, 3, 0, 0, 0, 0)));
    }

    #[test]
    fn extract_requests_only_selected_blocks() {
        let (mut p, group) = grouped(3);
        let extract = p.add_stage(ExtractBlocks::new([2]));
        p.connect(group, 0, extract, 0).unwrap();
        let out = p.update(extract, 0, UpdateRequest::whole()).unwrap();
        let composite = out.composite().unwrap();
        assert_eq!(composite.leaves().iter().filter(|l| l.data.is_some()).count(), 1);
        assert!(composite.leaf(2).is_some());

        let group_out = p.output_data(group, 0).unwrap().unwrap();
        assert!(group_out.composite().unwrap().leaf(1).is_none());
        let info = p.output_information(extract, 0).unwrap();
        assert_eq!(info.get(&COMPOSITE_BLOCK_IDS), Some(BTreeSet::from([2])));
    }

    #[test]
    fn requires_at_least_one_input() {
        let mut p = Pipeline::new();
        let group = p.add_stage(Group::new());
        assert!(matches!(
            p.update(group, 0, UpdateRequest::whole()),
            Err(crate::PipelineError::MissingInput { .. })
        ));
    }
}
