use crate::error::StageError;
use crate::policy::BlockPolicy;
use crate::stage::{
    ExecuteContext, InputPortDescriptor, MetadataContext, NegotiationContext, OutputPortDescriptor, Stage, StageSignature,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use vizflow_core::info::COMPOSITE_BLOCK_IDS;
use vizflow_core::{DataKind, NegotiationError};

/// Parameters of [`ExtractBlocks`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExtractBlocksParams {
    /// Flat indices of the leaves to keep
    pub blocks: BTreeSet<usize>,
}

/// Keeps a subset of a composite's leaves
///
/// Only the selected leaves are requested upstream. The tree shape is kept,
/// so flat indices downstream match those upstream.
#[derive(Debug, Clone, Default)]
pub struct ExtractBlocks {
    selected: BTreeSet<usize>,
}

impl ExtractBlocks {
    /// Keep `blocks`
    #[must_use]
    pub fn new(blocks: impl IntoIterator<Item = usize>) -> Self {
        Self {
            selected: blocks.into_iter().collect(),
        }
    }

    /// Registry constructor
    ///
    /// # Errors
    /// When nothing is selected, or the root index 0 is.
    pub fn from_params(params: ExtractBlocksParams) -> Result<Self, String> {
        if params.blocks.is_empty() {
            return Err("no blocks selected".to_string());
        }
        if params.blocks.contains(&0) {
            return Err("index 0 is the root, not a block".to_string());
        }
        Ok(Self { selected: params.blocks })
    }

    /// Selected leaves
    #[must_use]
    pub fn selected(&self) -> &BTreeSet<usize> {
        &self.selected
    }

    /// Select an additional leaf
    pub fn add_block(&mut self, index: usize) {
        self.selected.insert(index);
    }

    /// Deselect a leaf
    pub fn remove_block(&mut self, index: usize) -> bool {
        self.selected.remove(&index)
    }
}

impl Stage for ExtractBlocks {
    fn type_name(&self) -> &'static str {
        "extract_blocks"
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

    fn exchange_metadata(&mut self, ctx: &mut MetadataContext<'_>) -> Result<(), StageError> {
        ctx.forward_inputs();
        if let Some(info) = ctx.output_mut(0) {
            let available = info.get(&COMPOSITE_BLOCK_IDS);
            let kept = match available {
                Some(ids) => ids.intersection(&self.selected).copied().collect(),
                None => self.selected.clone(),
            };
            info.set(&COMPOSITE_BLOCK_IDS, kept);
        }
        Ok(())
    }

    fn negotiate_extent(&self, ctx: &mut NegotiationContext<'_>) -> Result<(), NegotiationError> {
        ctx.apply_extent_policy(self.extent_policy(), BlockPolicy::AllBlocks);
        let wanted: BTreeSet<usize> = match &ctx.requested().blocks {
            Some(requested) => requested.intersection(&self.selected).copied().collect(),
            None => self.selected.clone(),
        };
        let available = ctx.input_info(0, 0).and_then(|info| info.get(&COMPOSITE_BLOCK_IDS));
        let wanted: BTreeSet<usize> = match available {
            Some(ids) => wanted.intersection(&ids).copied().collect(),
            None => wanted,
        };
        if let Some(request) = ctx.input_request_mut(0, 0) {
            request.blocks = Some(wanted);
        }
        Ok(())
    }

    fn execute(&mut self, ctx: &mut ExecuteContext<'_>) -> Result<(), StageError> {
        let input = ctx.input_shared(0, 0).ok_or(StageError::MissingInput(0))?;
        let output = ctx.require_output(0)?;
        output.copy_from(&input)?;
        let keep = match &ctx.requested().blocks {
            Some(requested) => requested.intersection(&self.selected).copied().collect(),
            None => self.selected.clone(),
        };
        if let Some(composite) = ctx.require_output(0)?.composite_mut() {
            composite.retain_leaves(&keep);
        }
        Ok(())
    }
}
