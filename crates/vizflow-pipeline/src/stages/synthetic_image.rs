use crate::error::StageError;
use crate::policy::{ExtentPolicy, ForwardExtent, SnapTime};
use crate::stage::{ExecuteContext, MetadataContext, OutputPortDescriptor, Stage, StageSignature};
use serde::{Deserialize, Serialize};
use vizflow_core::info::{
    TimeRange, CAN_HANDLE_PIECE_REQUEST, CAN_PRODUCE_SUB_EXTENT, DATA_TIME_STEP, TIME_RANGE, TIME_STEPS, WHOLE_EXTENT,
};
use vizflow_core::{DataKind, Extent, FieldData};

/// Parameters of [`SyntheticImage`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyntheticImageParams {
    /// Extent the source can generate
    pub whole_extent: Extent,
    /// Available time values; empty for a static source
    pub time_steps: Vec<f64>,
    /// Name of the generated array
    pub array: String,
    /// Multiplier applied to every value
    pub scale: f64,
}

impl Default for SyntheticImageParams {
    fn default() -> Self {
        Self {
            whole_extent: Extent::new(0, 15, 0, 15, 0, 0),
            time_steps: Vec::new(),
            array: "scalars".to_string(),
            scale: 1.0,
        }
    }
}

/// Leaf source generating a structured scalar field
///
/// The value at point `(i, j, k)` and time `t` is
/// `scale * (i + 10 j + 100 k) + t`. Only the requested sub-extent is
/// generated.
#[derive(Debug, Clone)]
pub struct SyntheticImage {
    params: SyntheticImageParams,
    policy: ForwardExtent,
}

impl SyntheticImage {
    /// Static source over `whole_extent`
    #[must_use]
    pub fn new(whole_extent: Extent) -> Self {
        Self::with_params(SyntheticImageParams {
            whole_extent,
            ..SyntheticImageParams::default()
        })
    }

    /// Source from explicit parameters
    #[must_use]
    pub fn with_params(mut params: SyntheticImageParams) -> Self {
        params.time_steps.sort_by(f64::total_cmp);
        params.time_steps.dedup();
        Self {
            params,
            policy: ForwardExtent::new(),
        }
    }

    /// Registry constructor
    ///
    /// # Errors
    /// When the whole extent is empty.
    pub fn from_params(params: SyntheticImageParams) -> Result<Self, String> {
        if params.whole_extent.is_empty() {
            return Err(format!("whole extent {} is empty", params.whole_extent));
        }
        Ok(Self::with_params(params))
    }

    /// Add time steps
    #[must_use]
    pub fn with_time_steps(mut self, steps: impl IntoIterator<Item = f64>) -> Self {
        self.set_time_steps(steps);
        self
    }

    /// Current parameters
    #[must_use]
    pub fn params(&self) -> &SyntheticImageParams {
        &self.params
    }

    /// Whole extent
    #[must_use]
    pub fn whole_extent(&self) -> Extent {
        self.params.whole_extent
    }

    /// Replace the whole extent
    pub fn set_whole_extent(&mut self, extent: Extent) {
        self.params.whole_extent = extent;
    }

    /// Replace the time steps
    pub fn set_time_steps(&mut self, steps: impl IntoIterator<Item = f64>) {
        let mut steps: Vec<f64> = steps.into_iter().collect();
        steps.sort_by(f64::total_cmp);
        steps.dedup();
        self.params.time_steps = steps;
    }

    /// Value multiplier
    #[must_use]
    pub fn scale(&self) -> f64 {
        self.params.scale
    }

    /// Set the value multiplier
    pub fn set_scale(&mut self, scale: f64) {
        self.params.scale = scale;
    }

    /// Value generated at `ijk` for time `t`
    #[must_use]
    pub fn value(&self, ijk: [i32; 3], t: f64) -> f64 {
        let base = f64::from(ijk[0]) + 10.0 * f64::from(ijk[1]) + 100.0 * f64::from(ijk[2]);
        self.params.scale * base + t
    }

    fn generate(&self, extent: Extent, t: f64) -> Result<FieldData, StageError> {
        let mut values = Vec::with_capacity(extent.num_points());
        if !extent.is_empty() {
            for k in extent.min(2)..=extent.max(2) {
                for j in extent.min(1)..=extent.max(1) {
                    for i in extent.min(0)..=extent.max(0) {
                        values.push(self.value([i, j, k], t));
                    }
                }
            }
        }
        let mut fields = FieldData::structured(extent);
        fields.set_array(self.params.array.clone(), values)?;
        Ok(fields)
    }
}

impl Stage for SyntheticImage {
    fn type_name(&self) -> &'static str {
        "synthetic_image"
    }

    fn signature(&self) -> StageSignature {
        StageSignature::new().output(OutputPortDescriptor::new("output", DataKind::ImageData))
    }

    fn exchange_metadata(&mut self, ctx: &mut MetadataContext<'_>) -> Result<(), StageError> {
        let Some(info) = ctx.output_mut(0) else {
            return Ok(());
        };
        info.set(&WHOLE_EXTENT, self.params.whole_extent);
        info.set(&CAN_PRODUCE_SUB_EXTENT, true);
        info.set(&CAN_HANDLE_PIECE_REQUEST, true);
        if let (Some(first), Some(last)) = (self.params.time_steps.first(), self.params.time_steps.last()) {
            info.set(&TIME_STEPS, self.params.time_steps.clone());
            info.set(&TIME_RANGE, TimeRange::new(*first, *last));
        }
        Ok(())
    }

    fn execute(&mut self, ctx: &mut ExecuteContext<'_>) -> Result<(), StageError> {
        let requested = ctx.requested().clone();
        let whole = self.params.whole_extent;
        let extent = if requested.is_whole_extent() {
            whole
        } else {
            requested
                .resolve_extent(&whole)
                .grow(requested.ghost_levels)
                .clamp_to(&whole)
        };
        let t = match requested.time {
            Some(t) if !self.params.time_steps.is_empty() => SnapTime::snap(t, &self.params.time_steps).unwrap_or(t),
            Some(t) => t,
            None => self.params.time_steps.first().copied().unwrap_or(0.0),
        };

        let fields = self.generate(extent, t)?;
        let output = ctx.require_output(0)?;
        output.set_fields(fields);
        if requested.time.is_some() || !self.params.time_steps.is_empty() {
            output.info_mut().set(&DATA_TIME_STEP, t);
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
    use crate::Pipeline;
    use vizflow_core::UpdateRequest;

    #[test]
    fn generates_only_the_requested_piece() {
        let whole = Extent::new(0, 15, 0, 15, 0, 0);
        let mut p = Pipeline::new();
        let source = p.add_stage(SyntheticImage::new(whole));
        let out = p.update(source, 0, UpdateRequest::piece(1, 2)).unwrap();
        let piece = whole.split(1, 2).unwrap();
        assert_eq!(out.extent(), Some(piece));
        assert_eq!(out.fields().unwrap().num_points(), piece.num_points());
    }

    #[test]
    fn snaps_time_and_stamps_data() {
        let mut p = Pipeline::new();
        let source = p.add_stage(SyntheticImage::new(Extent::new(0, 1, 0, 0, 0, 0)).with_time_steps([0.0, 1.0, 2.0]));
        let out = p.update(source, 0, UpdateRequest::whole().with_time(0.4)).unwrap();
        assert_eq!(out.info().get(&DATA_TIME_STEP), Some(1.0));
        assert_eq!(out.fields().unwrap().value_at("scalars", [1, 0, 0]), Some(2.0));
    }

    #[test]
    fn advertises_time_and_extent() {
        let mut p = Pipeline::new();
        let source = p.add_stage(SyntheticImage::new(Extent::new(0, 3, 0, 3, 0, 0)).with_time_steps([2.0, 1.0]));
        p.update_information(source).unwrap();
        let info = p.output_information(source, 0).unwrap();
        assert_eq!(info.get(&TIME_RANGE), Some(TimeRange::new(1.0, 2.0)));
        assert_eq!(info.get(&WHOLE_EXTENT), Some(Extent::new(0, 3, 0, 3, 0, 0)));
    }

    #[test]
    fn rejects_empty_extent() {
        let params = SyntheticImageParams {
            whole_extent: Extent::EMPTY,
            ..SyntheticImageParams::default()
        };
        assert!(SyntheticImage::from_params(params).is_err());
    }
}
