use crate::error::StageError;
use crate::policy::{BlockPolicy, ExtentPolicy, ForwardExtent};
use crate::stage::{ExecuteContext, InputPortDescriptor, OutputPortDescriptor, Stage, StageSignature};
use serde::{Deserialize, Serialize};
use vizflow_core::DataKind;

/// Parameters of [`PassThrough`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PassThroughParams {
    /// Take ownership of the input instead of copying it
    pub in_place: bool,
}

/// Copies its input to its output, forwarding every request unchanged
#[derive(Debug, Clone, Default)]
pub struct PassThrough {
    in_place: bool,
    policy: ForwardExtent,
}

impl PassThrough {
    /// Copying pass-through
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pass-through that takes its input over when it is the only reader
    #[must_use]
    pub fn in_place() -> Self {
        Self {
            in_place: true,
            policy: ForwardExtent::new(),
        }
    }

    /// Registry constructor
    ///
    /// # Errors
    /// Never; the signature matches the other constructors.
    pub fn from_params(params: PassThroughParams) -> Result<Self, String> {
        Ok(if params.in_place { Self::in_place() } else { Self::new() })
    }
}

impl Stage for PassThrough {
    fn type_name(&self) -> &'static str {
        "pass_through"
    }

    fn signature(&self) -> StageSignature {
        let input = InputPortDescriptor::new("input", DataKind::DataObject);
        let input = if self.in_place { input.in_place() } else { input };
        StageSignature::new()
            .input(input)
            .output(OutputPortDescriptor::new("output", DataKind::DataObject))
    }

    fn declare_output_type(&self, _port: usize, inputs: &[Vec<DataKind>]) -> DataKind {
        inputs
            .first()
            .and_then(|conns| conns.first())
            .copied()
            .unwrap_or(DataKind::DataObject)
    }

    fn execute(&mut self, ctx: &mut ExecuteContext<'_>) -> Result<(), StageError> {
        if self.in_place {
            let input = ctx.take_input(0, 0).ok_or(StageError::MissingInput(0))?;
            return ctx.set_output(0, input);
        }
        let input = ctx.input_shared(0, 0).ok_or(StageError::MissingInput(0))?;
        ctx.require_output(0)?.copy_from(&input)?;
        Ok(())
    }

    fn extent_policy(&self) -> &dyn ExtentPolicy {
        &self.policy
    }

    fn block_policy(&self) -> BlockPolicy {
        BlockPolicy::Forward
    }
}
