//! Strategy objects a stage composes to describe its negotiation behaviour
//!
//! Instead of inheriting negotiation logic, a stage returns one
//! [`ExtentPolicy`], one [`TimePolicy`] and one [`BlockPolicy`]. The default
//! [`Stage`](crate::Stage) callbacks apply them to every input connection.

use std::collections::BTreeSet;
use vizflow_core::info::{Information, TimeRange, TIME_RANGE, TIME_STEPS, WHOLE_EXTENT};
use vizflow_core::UpdateRequest;

/// Maps the subset requested on a stage's outputs to the subset it needs
/// from one input
pub trait ExtentPolicy: Send + Sync {
    /// Policy name, for diagnostics
    fn name(&self) -> &'static str;

    /// Whether the stage always needs its whole input
    fn is_extent_invariant(&self) -> bool {
        false
    }

    /// Spatial part (extent, pieces, ghost levels) of the input request
    fn input_subset(&self, requested: &UpdateRequest, input: &Information) -> UpdateRequest;
}

/// Extent-invariant: always ask for everything
///
/// The executive crops structured outputs back to the requested extent after
/// execution.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestWhole;

impl ExtentPolicy for RequestWhole {
    fn name(&self) -> &'static str {
        "request-whole"
    }

    fn is_extent_invariant(&self) -> bool {
        true
    }

    fn input_subset(&self, _requested: &UpdateRequest, _input: &Information) -> UpdateRequest {
        UpdateRequest::whole()
    }
}

/// Ask for exactly the requested subset, widened by `halo` cells
///
/// Against a structured input (one advertising `WHOLE_EXTENT`) pieces are
/// translated into an extent and ghost levels become extent growth, clamped
/// to the whole extent. Against an unstructured input pieces are forwarded
/// and the halo is added to the ghost levels.
#[derive(Debug, Clone, Copy, Default)]
pub struct ForwardExtent {
    halo: u32,
}

impl ForwardExtent {
    /// Forward without a halo
    #[must_use]
    pub const fn new() -> Self {
        Self { halo: 0 }
    }

    /// Forward, widened by `cells` on every side
    #[must_use]
    pub const fn with_halo(cells: u32) -> Self {
        Self { halo: cells }
    }

    /// Halo width in cells
    #[must_use]
    pub fn halo(&self) -> u32 {
        self.halo
    }
}

impl ExtentPolicy for ForwardExtent {
    fn name(&self) -> &'static str {
        if self.halo == 0 {
            "forward"
        } else {
            "halo"
        }
    }

    fn input_subset(&self, requested: &UpdateRequest, input: &Information) -> UpdateRequest {
        let ghost = requested.ghost_levels.saturating_add(self.halo);
        match input.get(&WHOLE_EXTENT) {
            Some(whole) => {
                if requested.is_whole_extent() {
                    return UpdateRequest::whole();
                }
                let extent = requested.resolve_extent(&whole).grow(ghost).clamp_to(&whole);
                if extent == whole {
                    UpdateRequest::whole()
                } else {
                    UpdateRequest::whole().with_extent(extent)
                }
            }
            None => UpdateRequest {
                extent: requested.extent,
                pieces: requested.pieces.clone(),
                ghost_levels: if requested.is_whole_extent() { 0 } else { ghost },
                ..UpdateRequest::default()
            },
        }
    }
}

/// Maps a requested output time to the time asked of an input
pub trait TimePolicy: Send + Sync {
    /// Policy name, for diagnostics
    fn name(&self) -> &'static str;

    /// Time to request from an input that advertises `input`
    fn input_time(&self, requested: Option<f64>, input: &Information) -> Option<f64>;

    /// Rewrite time keys on an output during metadata exchange
    fn transform_metadata(&self, _output: &mut Information) {}
}

/// Request the same time downstream asked for
#[derive(Debug, Clone, Copy, Default)]
pub struct ForwardTime;

impl TimePolicy for ForwardTime {
    fn name(&self) -> &'static str {
        "forward-time"
    }

    fn input_time(&self, requested: Option<f64>, _input: &Information) -> Option<f64> {
        requested
    }
}

/// Time-invariant: never request a time, advertise none
#[derive(Debug, Clone, Copy, Default)]
pub struct IgnoreTime;

impl TimePolicy for IgnoreTime {
    fn name(&self) -> &'static str {
        "ignore-time"
    }

    fn input_time(&self, _requested: Option<f64>, _input: &Information) -> Option<f64> {
        None
    }

    fn transform_metadata(&self, output: &mut Information) {
        output.remove(&TIME_STEPS);
        output.remove(&TIME_RANGE);
    }
}

/// Output time is `input * scale + shift`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShiftTime {
    /// Added after scaling
    pub shift: f64,
    /// Multiplier; zero is treated as one
    pub scale: f64,
}

impl ShiftTime {
    /// Shift and scale
    #[must_use]
    pub fn new(shift: f64, scale: f64) -> Self {
        Self { shift, scale }
    }

    fn scale(&self) -> f64 {
        if self.scale == 0.0 {
            1.0
        } else {
            self.scale
        }
    }

    /// Input time to output time
    #[must_use]
    pub fn forward(&self, t: f64) -> f64 {
        t * self.scale() + self.shift
    }

    /// Output time to input time
    #[must_use]
    pub fn inverse(&self, t: f64) -> f64 {
        (t - self.shift) / self.scale()
    }
}

impl Default for ShiftTime {
    fn default() -> Self {
        Self::new(0.0, 1.0)
    }
}

impl TimePolicy for ShiftTime {
    fn name(&self) -> &'static str {
        "shift-time"
    }

    fn input_time(&self, requested: Option<f64>, _input: &Information) -> Option<f64> {
        requested.map(|t| self.inverse(t))
    }

    fn transform_metadata(&self, output: &mut Information) {
        if let Some(steps) = output.get(&TIME_STEPS) {
            let mut shifted: Vec<f64> = steps.iter().map(|t| self.forward(*t)).collect();
            shifted.sort_by(f64::total_cmp);
            output.set(&TIME_STEPS, shifted);
        }
        if let Some(range) = output.get(&TIME_RANGE) {
            output.set(&TIME_RANGE, TimeRange::new(self.forward(range.start), self.forward(range.end)));
        }
    }
}

/// Snap to the first advertised step not below the requested time
///
/// Times past the last step snap to the last step. Inputs without
/// `TIME_STEPS` receive the requested time unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct SnapTime;

impl SnapTime {
    /// Snap `t` onto `steps`, which must be ascending
    #[must_use]
    pub fn snap(t: f64, steps: &[f64]) -> Option<f64> {
        steps.iter().copied().find(|s| *s >= t).or_else(|| steps.last().copied())
    }
}

impl TimePolicy for SnapTime {
    fn name(&self) -> &'static str {
        "snap-time"
    }

    fn input_time(&self, requested: Option<f64>, input: &Information) -> Option<f64> {
        let t = requested?;
        match input.get(&TIME_STEPS) {
            Some(steps) if !steps.is_empty() => SnapTime::snap(t, &steps),
            _ => Some(t),
        }
    }
}

/// How a stage treats composite block selections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlockPolicy {
    /// Not composite-aware: always ask for every block
    #[default]
    AllBlocks,
    /// Composite-aware: ask for the blocks requested downstream
    Forward,
}

impl BlockPolicy {
    /// Block subset to ask of an input
    #[must_use]
    pub fn input_blocks(self, requested: Option<&BTreeSet<usize>>) -> Option<BTreeSet<usize>> {
        match self {
            BlockPolicy::AllBlocks => None,
            BlockPolicy::Forward => requested.cloned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use vizflow_core::Extent;

    fn structured(whole: Extent) -> Information {
        let mut info = Information::new();
        info.set(&WHOLE_EXTENT, whole);
        info
    }

    #[test]
    fn request_whole_ignores_subset() {
        let info = structured(Extent::new(0, 15, 0, 15, 0, 0));
        let sub = RequestWhole.input_subset(&UpdateRequest::piece(2, 4), &info);
        assert!(sub.is_whole_extent());
        assert!(RequestWhole.is_extent_invariant());
    }

    #[test]
    fn forward_translates_pieces_to_extent() {
        let whole = Extent::new(0, 15, 0, 15, 0, 0);
        let sub = ForwardExtent::new().input_subset(&UpdateRequest::piece(2, 4), &structured(whole));
        assert_eq!(sub.extent, whole.split(2, 4));
        assert!(sub.pieces.is_none());
    }

    #[test]
    fn halo_grows_and_clamps() {
        let whole = Extent::new(0, 9, 0, 9, 0, 0);
        let req = UpdateRequest::whole().with_extent(Extent::new(0, 4, 3, 6, 0, 0));
        let sub = ForwardExtent::with_halo(1).input_subset(&req, &structured(whole));
        assert_eq!(sub.extent, Some(Extent::new(0, 5, 2, 7, 0, 0)));
    }

    #[test]
    fn halo_adds_ghost_levels_for_unstructured() {
        let sub = ForwardExtent::with_halo(2).input_subset(&UpdateRequest::piece(1, 3), &Information::new());
        assert_eq!(sub.ghost_levels, 2);
        assert_eq!(sub.pieces, UpdateRequest::piece(1, 3).pieces);
    }

    #[test]
    fn shift_roundtrips_and_rewrites_metadata() {
        let policy = ShiftTime::new(10.0, 2.0);
        assert_eq!(policy.inverse(policy.forward(3.0)), 3.0);

        let mut info = Information::new();
        info.set(&TIME_STEPS, vec![0.0, 1.0, 2.0]);
        info.set(&TIME_RANGE, TimeRange::new(0.0, 2.0));
        policy.transform_metadata(&mut info);
        assert_eq!(info.get(&TIME_STEPS), Some(vec![10.0, 12.0, 14.0]));
        assert_eq!(info.get(&TIME_RANGE), Some(TimeRange::new(10.0, 14.0)));
        assert_eq!(policy.input_time(Some(12.0), &info), Some(1.0));
    }

    #[test]
    fn snap_picks_first_step_not_below() {
        let steps = [0.0, 0.5, 1.0, 1.5];
        assert_eq!(SnapTime::snap(0.7, &steps), Some(1.0));
        assert_eq!(SnapTime::snap(0.5, &steps), Some(0.5));
        assert_eq!(SnapTime::snap(9.0, &steps), Some(1.5));
        assert_eq!(SnapTime::snap(-1.0, &steps), Some(0.0));
    }

    #[test]
    fn block_policy_selection() {
        let wanted = BTreeSet::from([2usize]);
        assert_eq!(BlockPolicy::AllBlocks.input_blocks(Some(&wanted)), None);
        assert_eq!(BlockPolicy::Forward.input_blocks(Some(&wanted)), Some(wanted));
    }
}
