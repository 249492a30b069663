//! The stage contract
//!
//! A [`Stage`] declares its ports once through a [`StageSignature`] and is
//! then driven by the executive through four callbacks, always in this
//! order within a pull:
//!
//! 1. [`Stage::declare_output_type`] when an output container is missing or
//!    its inputs changed kind
//! 2. [`Stage::exchange_metadata`] on every pull
//! 3. [`Stage::negotiate_time`] then [`Stage::negotiate_extent`]
//! 4. [`Stage::execute`], only when the executive found the stage stale
//!
//! Stages never decide for themselves whether to run.

use crate::error::StageError;
use crate::policy::{BlockPolicy, ExtentPolicy, ForwardTime, RequestWhole, TimePolicy};
use std::any::Any;
use std::sync::Arc;
use vizflow_core::info::{Information, TIME_RANGE, TIME_STEPS};
use vizflow_core::{DataKind, DataObject, NegotiationError, Request, UpdateRequest};

/// Declaration of one input port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputPortDescriptor {
    /// Port name
    pub name: &'static str,
    /// Kind the producer's output must be, or derive from
    pub required_kind: DataKind,
    /// The stage can run with nothing connected here
    pub optional: bool,
    /// Accepts an ordered sequence of connections
    pub repeatable: bool,
    /// The stage may take ownership of the input object and mutate it
    pub in_place: bool,
}

impl InputPortDescriptor {
    /// Required, single-connection, read-only input
    #[must_use]
    pub fn new(name: &'static str, required_kind: DataKind) -> Self {
        Self {
            name,
            required_kind,
            optional: false,
            repeatable: false,
            in_place: false,
        }
    }

    /// Mark optional
    #[must_use]
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Mark repeatable
    #[must_use]
    pub fn repeatable(mut self) -> Self {
        self.repeatable = true;
        self
    }

    /// Mark in-place
    #[must_use]
    pub fn in_place(mut self) -> Self {
        self.in_place = true;
        self
    }
}

/// Declaration of one output port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPortDescriptor {
    /// Port name
    pub name: &'static str,
    /// Kind produced unless [`Stage::declare_output_type`] says otherwise
    pub kind: DataKind,
}

impl OutputPortDescriptor {
    /// Output of `kind`
    #[must_use]
    pub fn new(name: &'static str, kind: DataKind) -> Self {
        Self { name, kind }
    }
}

/// Static port layout of a stage
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageSignature {
    /// Input ports in index order
    pub inputs: Vec<InputPortDescriptor>,
    /// Output ports in index order
    pub outputs: Vec<OutputPortDescriptor>,
}

impl StageSignature {
    /// Empty signature
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an input port
    #[must_use]
    pub fn input(mut self, port: InputPortDescriptor) -> Self {
        self.inputs.push(port);
        self
    }

    /// Append an output port
    #[must_use]
    pub fn output(mut self, port: OutputPortDescriptor) -> Self {
        self.outputs.push(port);
        self
    }
}

/// Downcasting support for stage trait objects
pub trait AsAny: Any {
    /// Borrow as [`Any`]
    fn as_any(&self) -> &dyn Any;
    /// Mutably borrow as [`Any`]
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// A data-transforming node of the pipeline
pub trait Stage: AsAny + Send {
    /// Registered type name
    fn type_name(&self) -> &'static str;

    /// Port layout; read once when the stage is added
    fn signature(&self) -> StageSignature;

    /// Kind of data object to allocate on output `port`
    ///
    /// `inputs` holds, per input port, the kinds of the connected producers.
    fn declare_output_type(&self, port: usize, inputs: &[Vec<DataKind>]) -> DataKind {
        let _ = inputs;
        self.signature()
            .outputs
            .get(port)
            .map_or(DataKind::DataObject, |o| o.kind)
    }

    /// Fill output information from input information
    ///
    /// The default merges every input into every output and lets the time
    /// policy rewrite time keys.
    fn exchange_metadata(&mut self, ctx: &mut MetadataContext<'_>) -> Result<(), StageError> {
        ctx.forward_inputs();
        let policy = self.time_policy();
        for port in 0..ctx.num_outputs() {
            if let Some(info) = ctx.output_mut(port) {
                policy.transform_metadata(info);
            }
        }
        Ok(())
    }

    /// Choose the time to request from each input
    fn negotiate_time(&self, ctx: &mut NegotiationContext<'_>) -> Result<(), NegotiationError> {
        ctx.apply_time_policy(self.time_policy());
        Ok(())
    }

    /// Choose the spatial subset and blocks to request from each input
    fn negotiate_extent(&self, ctx: &mut NegotiationContext<'_>) -> Result<(), NegotiationError> {
        ctx.apply_extent_policy(self.extent_policy(), self.block_policy());
        Ok(())
    }

    /// Produce the outputs from the inputs
    fn execute(&mut self, ctx: &mut ExecuteContext<'_>) -> Result<(), StageError>;

    /// Spatial negotiation strategy
    fn extent_policy(&self) -> &dyn ExtentPolicy {
        &RequestWhole
    }

    /// Temporal negotiation strategy
    fn time_policy(&self) -> &dyn TimePolicy {
        &ForwardTime
    }

    /// Composite block strategy
    fn block_policy(&self) -> BlockPolicy {
        BlockPolicy::AllBlocks
    }

    /// Substitute request after the producer on input `port` rejected one
    ///
    /// Consulted at most once per producer port per pull. Returning `None`
    /// lets the pull fail with the producer's negotiation error.
    fn negotiation_fallback(
        &self,
        port: usize,
        error: &NegotiationError,
        upstream: &Information,
        rejected: &UpdateRequest,
    ) -> Option<UpdateRequest> {
        let _ = (port, error, upstream, rejected);
        None
    }
}

/// View handed to [`Stage::exchange_metadata`]
pub struct MetadataContext<'a> {
    request: &'a Request,
    inputs: &'a [Vec<Information>],
    outputs: &'a mut [Information],
}

impl<'a> MetadataContext<'a> {
    pub(crate) fn new(request: &'a Request, inputs: &'a [Vec<Information>], outputs: &'a mut [Information]) -> Self {
        Self { request, inputs, outputs }
    }

    /// Pass being driven
    #[must_use]
    pub fn request(&self) -> &Request {
        self.request
    }

    /// Number of input ports
    #[must_use]
    pub fn num_inputs(&self) -> usize {
        self.inputs.len()
    }

    /// Information of every connection on input `port`
    #[must_use]
    pub fn inputs(&self, port: usize) -> &[Information] {
        self.inputs.get(port).map(Vec::as_slice).unwrap_or_default()
    }

    /// Information of connection `conn` on input `port`
    #[must_use]
    pub fn input(&self, port: usize, conn: usize) -> Option<&Information> {
        self.inputs.get(port)?.get(conn)
    }

    /// Number of output ports
    #[must_use]
    pub fn num_outputs(&self) -> usize {
        self.outputs.len()
    }

    /// Output information being built
    #[must_use]
    pub fn output(&self, port: usize) -> Option<&Information> {
        self.outputs.get(port)
    }

    /// Mutable output information
    pub fn output_mut(&mut self, port: usize) -> Option<&mut Information> {
        self.outputs.get_mut(port)
    }

    /// Merge every input, in port then connection order, into every output
    ///
    /// Keys follow their merge rule. Afterwards `TIME_STEPS` is narrowed to
    /// the merged `TIME_RANGE`.
    pub fn forward_inputs(&mut self) {
        for output in self.outputs.iter_mut() {
            for info in self.inputs.iter().flatten() {
                output.merge_from(info);
            }
            if let (Some(range), Some(steps)) = (output.get(&TIME_RANGE), output.get(&TIME_STEPS)) {
                let kept: Vec<f64> = steps.into_iter().filter(|t| range.contains(*t)).collect();
                output.set(&TIME_STEPS, kept);
            }
        }
    }
}

/// View handed to [`Stage::negotiate_time`] and [`Stage::negotiate_extent`]
///
/// Every input request starts as a copy of the combined output request;
/// the callbacks rewrite what they need.
pub struct NegotiationContext<'a> {
    request: &'a Request,
    requested: &'a UpdateRequest,
    output_requests: &'a [Option<UpdateRequest>],
    input_info: &'a [Vec<Information>],
    input_requests: &'a mut [Vec<UpdateRequest>],
}

impl<'a> NegotiationContext<'a> {
    pub(crate) fn new(
        request: &'a Request,
        requested: &'a UpdateRequest,
        output_requests: &'a [Option<UpdateRequest>],
        input_info: &'a [Vec<Information>],
        input_requests: &'a mut [Vec<UpdateRequest>],
    ) -> Self {
        Self {
            request,
            requested,
            output_requests,
            input_info,
            input_requests,
        }
    }

    /// Pass being driven
    #[must_use]
    pub fn request(&self) -> &Request {
        self.request
    }

    /// Union of the requests on every output of this stage
    #[must_use]
    pub fn requested(&self) -> &UpdateRequest {
        self.requested
    }

    /// Request on output `port`, if that output was asked for
    #[must_use]
    pub fn output_request(&self, port: usize) -> Option<&UpdateRequest> {
        self.output_requests.get(port)?.as_ref()
    }

    /// Number of input ports
    #[must_use]
    pub fn num_inputs(&self) -> usize {
        self.input_info.len()
    }

    /// Connections on input `port`
    #[must_use]
    pub fn connections(&self, port: usize) -> usize {
        self.input_info.get(port).map_or(0, Vec::len)
    }

    /// Information advertised by the producer on `port`/`conn`
    #[must_use]
    pub fn input_info(&self, port: usize, conn: usize) -> Option<&Information> {
        self.input_info.get(port)?.get(conn)
    }

    /// Request currently planned for `port`/`conn`
    #[must_use]
    pub fn input_request(&self, port: usize, conn: usize) -> Option<&UpdateRequest> {
        self.input_requests.get(port)?.get(conn)
    }

    /// Mutable planned request for `port`/`conn`
    pub fn input_request_mut(&mut self, port: usize, conn: usize) -> Option<&mut UpdateRequest> {
        self.input_requests.get_mut(port)?.get_mut(conn)
    }

    /// Replace the planned request for `port`/`conn`
    pub fn set_input_request(&mut self, port: usize, conn: usize, request: UpdateRequest) {
        if let Some(slot) = self.input_request_mut(port, conn) {
            *slot = request;
        }
    }

    /// Set every input's time through `policy`
    pub fn apply_time_policy(&mut self, policy: &dyn TimePolicy) {
        let requested = self.requested.time;
        for (infos, requests) in self.input_info.iter().zip(self.input_requests.iter_mut()) {
            for (info, request) in infos.iter().zip(requests.iter_mut()) {
                request.time = policy.input_time(requested, info);
            }
        }
    }

    /// Set every input's spatial subset and blocks through the policies
    pub fn apply_extent_policy(&mut self, extent: &dyn ExtentPolicy, blocks: BlockPolicy) {
        let requested = self.requested;
        for (infos, requests) in self.input_info.iter().zip(self.input_requests.iter_mut()) {
            for (info, request) in infos.iter().zip(requests.iter_mut()) {
                let subset = extent.input_subset(requested, info);
                request.extent = subset.extent;
                request.pieces = subset.pieces;
                request.ghost_levels = subset.ghost_levels;
                request.blocks = blocks.input_blocks(requested.blocks.as_ref());
            }
        }
    }
}

/// View handed to [`Stage::execute`]
///
/// Inputs are already restricted to the negotiated subsets. Outputs are
/// exclusively owned for the duration of the call.
pub struct ExecuteContext<'a> {
    request: &'a Request,
    requested: &'a UpdateRequest,
    output_requests: &'a [Option<UpdateRequest>],
    inputs: Vec<Vec<Option<Arc<DataObject>>>>,
    outputs: &'a mut [DataObject],
}

impl<'a> ExecuteContext<'a> {
    pub(crate) fn new(
        request: &'a Request,
        requested: &'a UpdateRequest,
        output_requests: &'a [Option<UpdateRequest>],
        inputs: Vec<Vec<Option<Arc<DataObject>>>>,
        outputs: &'a mut [DataObject],
    ) -> Self {
        Self {
            request,
            requested,
            output_requests,
            inputs,
            outputs,
        }
    }

    /// Pass being driven
    #[must_use]
    pub fn request(&self) -> &Request {
        self.request
    }

    /// Union of the requests on every output
    #[must_use]
    pub fn requested(&self) -> &UpdateRequest {
        self.requested
    }

    /// Request on output `port`
    #[must_use]
    pub fn output_request(&self, port: usize) -> Option<&UpdateRequest> {
        self.output_requests.get(port)?.as_ref()
    }

    /// Number of input ports
    #[must_use]
    pub fn num_inputs(&self) -> usize {
        self.inputs.len()
    }

    /// Connections on input `port`
    #[must_use]
    pub fn connections(&self, port: usize) -> usize {
        self.inputs.get(port).map_or(0, Vec::len)
    }

    /// Read-only view of an input object
    #[must_use]
    pub fn input(&self, port: usize, conn: usize) -> Option<&DataObject> {
        self.inputs.get(port)?.get(conn)?.as_deref()
    }

    /// Input object, or [`StageError::MissingInput`]
    ///
    /// # Errors
    /// When nothing is connected or the producer holds no data.
    pub fn require_input(&self, port: usize, conn: usize) -> Result<&DataObject, StageError> {
        self.input(port, conn).ok_or(StageError::MissingInput(port))
    }

    /// Shared handle to an input object
    #[must_use]
    pub fn input_shared(&self, port: usize, conn: usize) -> Option<Arc<DataObject>> {
        self.inputs.get(port)?.get(conn)?.clone()
    }

    /// Take an input object by value
    ///
    /// Moves it when this stage is the sole holder, which the executive
    /// arranges for in-place ports; copies it otherwise.
    pub fn take_input(&mut self, port: usize, conn: usize) -> Option<DataObject> {
        let shared = self.inputs.get_mut(port)?.get_mut(conn)?.take()?;
        Some(Arc::try_unwrap(shared).unwrap_or_else(|shared| (*shared).clone()))
    }

    /// Number of output ports
    #[must_use]
    pub fn num_outputs(&self) -> usize {
        self.outputs.len()
    }

    /// Output object being produced
    #[must_use]
    pub fn output(&self, port: usize) -> Option<&DataObject> {
        self.outputs.get(port)
    }

    /// Mutable output object
    pub fn output_mut(&mut self, port: usize) -> Option<&mut DataObject> {
        self.outputs.get_mut(port)
    }

    /// Mutable output object, or a failure naming the port
    ///
    /// # Errors
    /// When `port` is out of range.
    pub fn require_output(&mut self, port: usize) -> Result<&mut DataObject, StageError> {
        self.outputs
            .get_mut(port)
            .ok_or_else(|| StageError::failed(format!("no output port {port}")))
    }

    /// Replace output `port` wholesale
    ///
    /// # Errors
    /// When `port` is out of range or `data` is not of the declared kind.
    pub fn set_output(&mut self, port: usize, data: DataObject) -> Result<(), StageError> {
        let slot = self.require_output(port)?;
        if !data.kind().is_a(slot.kind()) {
            return Err(vizflow_core::DataError::WrongKind {
                expected: slot.kind(),
                actual: data.kind(),
            }
            .into());
        }
        *slot = data;
        Ok(())
    }
}
