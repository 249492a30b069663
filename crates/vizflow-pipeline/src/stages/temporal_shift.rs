use crate::error::StageError;
use crate::policy::{BlockPolicy, ExtentPolicy, ForwardExtent, ShiftTime, TimePolicy};
use crate::stage::{ExecuteContext, InputPortDescriptor, NegotiationContext, OutputPortDescriptor, Stage, StageSignature};
use serde::{Deserialize, Serialize};
use vizflow_core::info::{Information, DATA_TIME_STEP, TIME_RANGE};
use vizflow_core::{DataKind, NegotiationError, UpdateRequest};

/// Parameters of [`TemporalShift`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TemporalShiftParams {
    /// Added to input times after scaling
    pub shift: f64,
    /// Input time multiplier
    pub scale: f64,
    /// Clamp requests into the upstream time range instead of failing
    pub clamp: bool,
}

impl Default for TemporalShiftParams {
    fn default() -> Self {
        Self {
            shift: 0.0,
            scale: 1.0,
            clamp: false,
        }
    }
}

/// Relabels time: output time is `input * scale + shift`
///
/// With `clamp` set, a time the upstream rejects as out of range is
/// replaced by the nearest time it does offer.
#[derive(Debug, Clone)]
pub struct TemporalShift {
    time: ShiftTime,
    clamp: bool,
    extent: ForwardExtent,
}

impl TemporalShift {
    /// Shift by `shift` after scaling by `scale`
    #[must_use]
    pub fn new(shift: f64, scale: f64) -> Self {
        Self {
            time: ShiftTime::new(shift, scale),
            clamp: false,
            extent: ForwardExtent::new(),
        }
    }

    /// Enable clamping
    #[must_use]
    pub fn clamping(mut self) -> Self {
        self.clamp = true;
        self
    }

    /// Registry constructor
    ///
    /// # Errors
    /// When `shift` or `scale` is not finite.
    pub fn from_params(params: TemporalShiftParams) -> Result<Self, String> {
        if !params.shift.is_finite() || !params.scale.is_finite() {
            return Err("shift and scale must be finite".to_string());
        }
        let stage = Self::new(params.shift, params.scale);
        Ok(if params.clamp { stage.clamping() } else { stage })
    }

    /// Current transform
    #[must_use]
    pub fn transform(&self) -> ShiftTime {
        self.time
    }

    /// Replace the transform
    pub fn set_transform(&mut self, shift: f64, scale: f64) {
        self.time = ShiftTime::new(shift, scale);
    }

    /// Whether out-of-range requests are clamped
    #[must_use]
    pub fn is_clamping(&self) -> bool {
        self.clamp
    }
}

impl Stage for TemporalShift {
    fn type_name(&self) -> &'static str {
        "temporal_shift"
    }

    fn signature(&self) -> StageSignature {
        StageSignature::new()
            .input(InputPortDescriptor::new("input", DataKind::DataObject))
            .output(OutputPortDescriptor::new("output", DataKind::DataObject))
    }

    fn declare_output_type(&self, _port: usize, inputs: &[Vec<DataKind>]) -> DataKind {
        inputs
            .first()
            .and_then(|conns| conns.first())
            .copied()
            .unwrap_or(DataKind::DataObject)
    }

    fn negotiate_time(&self, ctx: &mut NegotiationContext<'_>) -> Result<(), NegotiationError> {
        ctx.apply_time_policy(&self.time);
        if !self.clamp {
            return Ok(());
        }
        let range = ctx.input_info(0, 0).and_then(|info| info.get(&TIME_RANGE));
        if let (Some(range), Some(request)) = (range, ctx.input_request_mut(0, 0)) {
            request.time = request.time.map(|t| range.clamp(t));
        }
        Ok(())
    }

    fn execute(&mut self, ctx: &mut ExecuteContext<'_>) -> Result<(), StageError> {
        let input = ctx.input_shared(0, 0).ok_or(StageError::MissingInput(0))?;
        let output = ctx.require_output(0)?;
        output.copy_from(&input)?;
        if let Some(t) = input.info().get(&DATA_TIME_STEP) {
            output.info_mut().set(&DATA_TIME_STEP, self.time.forward(t));
        }
        Ok(())
    }

    fn extent_policy(&self) -> &dyn ExtentPolicy {
        &self.extent
    }

    fn time_policy(&self) -> &dyn TimePolicy {
        &self.time
    }

    fn block_policy(&self) -> BlockPolicy {
        BlockPolicy::Forward
    }

    fn negotiation_fallback(
        &self,
        _port: usize,
        error: &NegotiationError,
        _upstream: &Information,
        rejected: &UpdateRequest,
    ) -> Option<UpdateRequest> {
        match error {
            NegotiationError::TimeOutOfRange { requested, start, end } if self.clamp => {
                Some(rejected.clone().with_time(requested.clamp(*start, *end)))
            }
            _ => None,
        }
    }
}
