use crate::error::StageError;
use crate::policy::{ExtentPolicy, ForwardExtent};
use crate::stage::{ExecuteContext, InputPortDescriptor, MetadataContext, NegotiationContext, OutputPortDescriptor, Stage, StageSignature};
use serde::{Deserialize, Serialize};
use vizflow_core::info::WHOLE_EXTENT;
use vizflow_core::{DataKind, Extent, NegotiationError};

/// Parameters of [`Clip`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClipParams {
    /// Box to keep
    pub extent: Extent,
}

/// Restricts a structured input to a box
///
/// The output's whole extent is the input's whole extent intersected with
/// the box. Pieces requested downstream are split over that clipped extent,
/// and only the matching region is requested upstream.
#[derive(Debug, Clone)]
pub struct Clip {
    extent: Extent,
    policy: ForwardExtent,
}

impl Clip {
    /// Keep `extent`
    #[must_use]
    pub fn new(extent: Extent) -> Self {
        Self {
            extent,
            policy: ForwardExtent::new(),
        }
    }

    /// Registry constructor
    ///
    /// # Errors
    /// When the box is empty.
    pub fn from_params(params: ClipParams) -> Result<Self, String> {
        if params.extent.is_empty() {
            return Err(format!("clip extent {} is empty", params.extent));
        }
        Ok(Self::new(params.extent))
    }

    /// Box being kept
    #[must_use]
    pub fn extent(&self) -> Extent {
        self.extent
    }

    /// Replace the box
    pub fn set_extent(&mut self, extent: Extent) {
        self.extent = extent;
    }

    fn clipped(&self, whole: Extent) -> Result<Extent, NegotiationError> {
        whole.intersection(&self.extent).ok_or(NegotiationError::ExtentOutOfBounds {
            requested: self.extent,
            whole,
        })
    }
}

impl Stage for Clip {
    fn type_name(&self) -> &'static str {
        "clip"
    }

    fn signature(&self) -> StageSignature {
        StageSignature::new()
            .input(InputPortDescriptor::new("input", DataKind::ImageData))
            .output(OutputPortDescriptor::new("output", DataKind::ImageData))
    }

    fn exchange_metadata(&mut self, ctx: &mut MetadataContext<'_>) -> Result<(), StageError> {
        ctx.forward_inputs();
        if let Some(info) = ctx.output_mut(0) {
            if let Some(whole) = info.get(&WHOLE_EXTENT) {
                info.set(&WHOLE_EXTENT, whole.intersection(&self.extent).unwrap_or(Extent::EMPTY));
            }
        }
        Ok(())
    }

    fn negotiate_extent(&self, ctx: &mut NegotiationContext<'_>) -> Result<(), NegotiationError> {
        let Some(whole) = ctx.input_info(0, 0).and_then(|info| info.get(&WHOLE_EXTENT)) else {
            ctx.apply_extent_policy(&self.policy, self.block_policy());
            return Ok(());
        };
        let clipped = self.clipped(whole)?;
        let requested = ctx.requested().clone();
        let wanted = requested
            .resolve_extent(&clipped)
            .grow(requested.ghost_levels)
            .clamp_to(&clipped);
        if wanted.is_empty() {
            return Err(NegotiationError::ExtentOutOfBounds {
                requested: requested.resolve_extent(&clipped),
                whole: clipped,
            });
        }
        if let Some(request) = ctx.input_request_mut(0, 0) {
            request.extent = (wanted != whole).then_some(wanted);
            request.pieces = None;
            request.ghost_levels = 0;
            request.blocks = None;
        }
        Ok(())
    }

    fn execute(&mut self, ctx: &mut ExecuteContext<'_>) -> Result<(), StageError> {
        let input = ctx.input_shared(0, 0).ok_or(StageError::MissingInput(0))?;
        let output = ctx.require_output(0)?;
        output.copy_from(&input)?;
        if let Some(held) = output.extent() {
            let keep = held.intersection(&self.extent).unwrap_or(Extent::EMPTY);
            let keep = match ctx.requested().extent {
                Some(requested) => keep.intersection(&requested).unwrap_or(Extent::EMPTY),
                None => keep,
            };
            if keep != held && !keep.is_empty() {
                ctx.require_output(0)?.crop(&keep)?;
            }
        }
        Ok(())
    }

    fn extent_policy(&self) -> &dyn ExtentPolicy {
        &self.policy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::SyntheticImage;
    use crate::Pipeline;
    use vizflow_core::UpdateRequest;

    fn chain(clip: Extent) -> (Pipeline, crate::StageId) {
        let mut p = Pipeline::new();
        let source = p.add_stage(SyntheticImage::new(Extent::new(0, 15, 0, 15, 0, 0)));
        let clip = p.add_stage(Clip::new(clip));
        p.connect(source, 0, clip, 0).unwrap();
        (p, clip)
    }

    #[test]
    fn narrows_whole_extent() {
        let (p, clip) = chain(Extent::new(4, 7, 0, 20, 0, 0));
        p.update_information(clip).unwrap();
        let info = p.output_information(clip, 0).unwrap();
        assert_eq!(info.get(&WHOLE_EXTENT), Some(Extent::new(4, 7, 0, 15, 0, 0)));
    }

    #[test]
    fn output_is_the_clipped_region() {
        let (p, clip) = chain(Extent::new(4, 7, 2, 5, 0, 0));
        let out = p.update(clip, 0, UpdateRequest::whole()).unwrap();
        assert_eq!(out.extent(), Some(Extent::new(4, 7, 2, 5, 0, 0)));
    }

    #[test]
    fn pieces_split_the_clipped_extent() {
        let box_ = Extent::new(4, 7, 2, 5, 0, 0);
        let (p, clip) = chain(box_);
        let out = p.update(clip, 0, UpdateRequest::piece(0, 2)).unwrap();
        assert_eq!(out.extent(), box_.split(0, 2));
    }

    #[test]
    fn disjoint_box_fails_negotiation() {
        let (p, clip) = chain(Extent::new(40, 50, 0, 0, 0, 0));
        let err = p.update(clip, 0, UpdateRequest::whole()).unwrap_err();
        assert!(matches!(err, crate::PipelineError::Negotiation { .. }));
    }
}
