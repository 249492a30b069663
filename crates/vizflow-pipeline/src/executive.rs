//! The demand-driven executive
//!
//! A pull on `(stage, port)` visits the upstream closure of `stage` and
//! drives it through four passes:
//!
//! 1. create outputs, upstream to downstream
//! 2. exchange metadata, upstream to downstream
//! 3. negotiate time then extent, downstream to upstream
//! 4. execute stale stages, upstream to downstream
//!
//! Every stage of the closure is locked for the whole pull, in ascending id
//! order, so pulls over overlapping closures serialize while disjoint ones
//! proceed concurrently. Within one pull, stages of the same topological
//! level can run on the rayon pool when `parallel_execution` is set.

use crate::error::{PipelineError, StageError};
use crate::graph::{output_port, Pipeline, StageNode};
use crate::stage::{ExecuteContext, MetadataContext, NegotiationContext};
use crate::state::PortState;
use crate::trace::PassOutcome;
use crate::types::{Direction, StageId};
use parking_lot::MutexGuard;
use rayon::prelude::*;
use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, trace, warn};
use vizflow_core::info::{DATA_TYPE_NAME, WHOLE_EXTENT};
use vizflow_core::{DataKind, DataObject, Information, MTime, NegotiationError, PassKind, Request, UpdateRequest};

/// Per-stage bookkeeping owned by the executive
#[derive(Debug, Clone, Default)]
pub(crate) struct ExecutiveState {
    /// Stamp taken right after the last successful execute
    pub(crate) last_execute: MTime,
    pub(crate) executions: u64,
    /// Requests on each output negotiated by the current pull
    pub(crate) negotiated: Vec<Option<UpdateRequest>>,
    /// Union of `negotiated`
    pub(crate) combined: UpdateRequest,
    /// Requests the held outputs were produced for
    pub(crate) satisfied: Vec<Option<UpdateRequest>>,
    /// `combined` at the last successful execute; the only record a sink has
    pub(crate) executed_request: Option<UpdateRequest>,
    /// Input kinds seen at the last output declaration; `None` forces a new one
    pub(crate) declared_inputs: Option<Vec<Vec<DataKind>>>,
}

impl ExecutiveState {
    pub(crate) fn new(outputs: usize) -> Self {
        Self {
            negotiated: vec![None; outputs],
            satisfied: vec![None; outputs],
            ..Self::default()
        }
    }
}

impl Pipeline {
    /// Bring output `port` of `stage` up to date for `request` and return it
    ///
    /// Only stages whose parameters, inputs or negotiated request changed
    /// since their last execute run again. Repeating a pull with nothing
    /// modified executes nothing and returns the same object.
    ///
    /// # Errors
    /// The first failure in topological order. Failures upstream of `stage`
    /// are wrapped in [`PipelineError::UpstreamFailed`].
    pub fn update(&self, stage: StageId, port: usize, request: UpdateRequest) -> Result<Arc<DataObject>, PipelineError> {
        let mut pull = Pull::begin(self, stage, Some(port))?;
        let span = tracing::debug_span!("pull", pull = pull.id, stage = %stage, port);
        let _entered = span.enter();
        debug!(%request, closure = pull.order.len(), "update");

        let result = pull.run(request).and_then(|()| pull.target_output());
        result.map_err(|err| pull.attribute(err))
    }

    /// Bring a terminal stage up to date for `request`
    ///
    /// For stages without outputs, such as writers, which [`Pipeline::update`]
    /// cannot address. The sink re-executes when its parameters, its inputs
    /// or `request` changed since its last successful execute. A stage with
    /// outputs is pulled on output 0 and the object dropped.
    ///
    /// # Errors
    /// As [`Pipeline::update`].
    pub fn update_sink(&self, stage: StageId, request: UpdateRequest) -> Result<(), PipelineError> {
        let terminal = self.lock(stage)?.outputs.is_empty();
        if terminal {
            let mut pull = Pull::begin(self, stage, None)?;
            let span = tracing::debug_span!("pull", pull = pull.id, stage = %stage, sink = true);
            let _entered = span.enter();
            debug!(%request, closure = pull.order.len(), "update sink");

            let result = pull.run(request);
            result.map_err(|err| pull.attribute(err))
        } else {
            self.update(stage, 0, request).map(drop)
        }
    }

    /// Run only the output and metadata passes for `stage`
    ///
    /// Afterwards [`Pipeline::output_information`] reflects current inputs
    /// and parameters. No stage executes.
    ///
    /// # Errors
    /// Missing required inputs and metadata failures.
    pub fn update_information(&self, stage: StageId) -> Result<(), PipelineError> {
        let mut pull = Pull::begin(self, stage, None)?;
        let span = tracing::debug_span!("pull", pull = pull.id, stage = %stage, information = true);
        let _entered = span.enter();

        let result = pull.create_outputs().and_then(|()| pull.exchange_metadata());
        result.map_err(|err| pull.attribute(err))
    }

    /// Bring `stage` up to date for `request` and return its output information
    ///
    /// # Errors
    /// As [`Pipeline::update`].
    pub fn update_and_describe(
        &self,
        stage: StageId,
        port: usize,
        request: UpdateRequest,
    ) -> Result<(Arc<DataObject>, Information), PipelineError> {
        let data = self.update(stage, port, request)?;
        let info = self.output_information(stage, port)?;
        Ok((data, info))
    }
}

struct Pending {
    request: UpdateRequest,
    /// Consumers (stage, input port) that asked
    requesters: Vec<(StageId, usize)>,
}

type Inputs = Vec<Vec<Option<Arc<DataObject>>>>;

/// One pull over a locked upstream closure
struct Pull<'p> {
    pipeline: &'p Pipeline,
    id: u64,
    target: StageId,
    /// Output being pulled; `None` for sinks and information-only pulls
    port: Option<usize>,
    order: Vec<StageId>,
    guards: BTreeMap<StageId, MutexGuard<'p, StageNode>>,
}

impl<'p> Pull<'p> {
    fn begin(pipeline: &'p Pipeline, target: StageId, port: Option<usize>) -> Result<Self, PipelineError> {
        let order = pipeline.upstream_closure(target)?;
        let mut ids = order.clone();
        ids.sort_unstable();
        let mut guards = BTreeMap::new();
        for id in ids {
            guards.insert(id, pipeline.lock(id)?);
        }
        let pull = Self {
            pipeline,
            id: pipeline.next_pull_id(),
            target,
            port,
            order,
            guards,
        };
        if let Some(port) = port {
            output_port(pull.node(target)?, port)?;
        }
        Ok(pull)
    }

    fn run(&mut self, request: UpdateRequest) -> Result<(), PipelineError> {
        self.create_outputs()?;
        self.exchange_metadata()?;
        self.negotiate(request)?;
        self.execute()
    }

    fn node(&self, id: StageId) -> Result<&StageNode, PipelineError> {
        self.guards
            .get(&id)
            .map(|guard| &**guard)
            .ok_or(PipelineError::UnknownStage(id))
    }

    fn node_mut(&mut self, id: StageId) -> Result<&mut StageNode, PipelineError> {
        self.guards
            .get_mut(&id)
            .map(|guard| &mut **guard)
            .ok_or(PipelineError::UnknownStage(id))
    }

    fn record(&self, id: StageId, pass: PassKind, outcome: PassOutcome) {
        let name = self.guards.get(&id).map_or("?", |node| node.type_name);
        self.pipeline.trace().record(self.id, id, name, pass, outcome);
    }

    /// Wrap failures that did not originate at the target
    fn attribute(&self, err: PipelineError) -> PipelineError {
        match err.failed_stage() {
            Some(upstream) if upstream != self.target && !matches!(err, PipelineError::UpstreamFailed { .. }) => {
                PipelineError::UpstreamFailed {
                    stage: self.target,
                    upstream,
                    source: Box::new(err),
                }
            }
            _ => err,
        }
    }

    fn input_kinds(&self, id: StageId) -> Result<Vec<Vec<DataKind>>, PipelineError> {
        let node = self.node(id)?;
        node.inputs
            .iter()
            .map(|conns| {
                conns
                    .iter()
                    .map(|c| Ok(output_port(self.node(c.producer)?, c.port)?.kind_or_default()))
                    .collect()
            })
            .collect()
    }

    fn input_infos(&self, id: StageId) -> Result<Vec<Vec<Information>>, PipelineError> {
        let node = self.node(id)?;
        node.inputs
            .iter()
            .map(|conns| {
                conns
                    .iter()
                    .map(|c| Ok(output_port(self.node(c.producer)?, c.port)?.info.clone()))
                    .collect()
            })
            .collect()
    }

    fn create_outputs(&mut self) -> Result<(), PipelineError> {
        for id in self.order.clone() {
            let kinds = self.input_kinds(id)?;
            let node = self.node_mut(id)?;
            let redeclare = node.exec.declared_inputs.as_ref() != Some(&kinds)
                || node.outputs.iter().any(|o| o.kind.is_none());
            if redeclare {
                for (port, out) in node.outputs.iter_mut().enumerate() {
                    let kind = node.stage.declare_output_type(port, &kinds);
                    if out.kind != Some(kind) {
                        trace!(stage = %id, port, %kind, "allocating output");
                        out.kind = Some(kind);
                        out.data = Some(Arc::new(DataObject::new(kind)));
                        out.state = PortState::Uninitialized;
                        out.transition(PortState::CleanMetadata)?;
                    }
                }
                node.exec.declared_inputs = Some(kinds);
            }
            let missing = node
                .signature
                .inputs
                .iter()
                .zip(&node.inputs)
                .find(|(desc, conns)| !desc.optional && conns.is_empty())
                .map(|(desc, _)| desc.name.to_string());
            if let Some(port) = missing {
                self.record(id, PassKind::CreateOutput, PassOutcome::Failed);
                warn!(stage = %id, port, "required input not connected");
                return Err(PipelineError::MissingInput { stage: id, port });
            }
            let outcome = if redeclare { PassOutcome::Ran } else { PassOutcome::Cached };
            self.record(id, PassKind::CreateOutput, outcome);
        }
        Ok(())
    }

    fn exchange_metadata(&mut self) -> Result<(), PipelineError> {
        let request = Request::new(PassKind::ExchangeMetadata, self.id);
        for id in self.order.clone() {
            let inputs = self.input_infos(id)?;
            let node = self.node_mut(id)?;
            let mut outputs = vec![Information::new(); node.outputs.len()];
            let result = {
                let mut ctx = MetadataContext::new(&request, &inputs, &mut outputs);
                node.stage.exchange_metadata(&mut ctx)
            };
            if let Err(source) = result {
                self.record(id, PassKind::ExchangeMetadata, PassOutcome::Failed);
                warn!(stage = %id, error = %source, "metadata exchange failed");
                return Err(PipelineError::Metadata { stage: id, source });
            }
            for (out, mut info) in node.outputs.iter_mut().zip(outputs) {
                info.set(&DATA_TYPE_NAME, out.kind_or_default().name().to_string());
                out.info.replace_with(info);
            }
            self.record(id, PassKind::ExchangeMetadata, PassOutcome::Ran);
        }
        Ok(())
    }

    fn negotiate(&mut self, params: UpdateRequest) -> Result<(), PipelineError> {
        let mut pending: HashMap<(StageId, usize), Pending> = HashMap::new();
        if let Some(port) = self.port {
            pending.insert(
                (self.target, port),
                Pending {
                    request: params.clone(),
                    requesters: Vec::new(),
                },
            );
        }

        for id in self.order.clone().into_iter().rev() {
            let outputs = self.node(id)?.outputs.len();
            let mut output_requests: Vec<Option<UpdateRequest>> = vec![None; outputs];
            for (port, slot) in output_requests.iter_mut().enumerate() {
                if let Some(entry) = pending.remove(&(id, port)) {
                    *slot = Some(self.accept(id, port, entry)?);
                }
            }

            let mut combined: Option<UpdateRequest> = None;
            for request in output_requests.iter().flatten() {
                combined = Some(match combined {
                    None => request.clone(),
                    Some(acc) => acc.union(request).map_err(|source| {
                        self.record(id, PassKind::NegotiateExtent, PassOutcome::Failed);
                        PipelineError::Negotiation { stage: id, source }
                    })?,
                });
            }
            let combined = match combined {
                Some(combined) => combined,
                None if outputs == 0 && id == self.target => params.clone(),
                None => {
                    self.record(id, PassKind::NegotiateExtent, PassOutcome::Skipped);
                    continue;
                }
            };

            let input_info = self.input_infos(id)?;
            let mut input_requests: Vec<Vec<UpdateRequest>> =
                input_info.iter().map(|conns| vec![combined.clone(); conns.len()]).collect();

            let node = self.node(id)?;
            let time_request = Request::new(PassKind::NegotiateTime, self.id).with_params(combined.clone());
            let time = {
                let mut ctx =
                    NegotiationContext::new(&time_request, &combined, &output_requests, &input_info, &mut input_requests);
                node.stage.negotiate_time(&mut ctx)
            };
            if let Err(source) = time {
                self.record(id, PassKind::NegotiateTime, PassOutcome::Failed);
                warn!(stage = %id, error = %source, "time negotiation failed");
                return Err(PipelineError::Negotiation { stage: id, source });
            }
            self.record(id, PassKind::NegotiateTime, PassOutcome::Ran);

            let extent_request = Request::new(PassKind::NegotiateExtent, self.id).with_params(combined.clone());
            let extent = {
                let mut ctx =
                    NegotiationContext::new(&extent_request, &combined, &output_requests, &input_info, &mut input_requests);
                node.stage.negotiate_extent(&mut ctx)
            };
            if let Err(source) = extent {
                self.record(id, PassKind::NegotiateExtent, PassOutcome::Failed);
                warn!(stage = %id, error = %source, "extent negotiation failed");
                return Err(PipelineError::Negotiation { stage: id, source });
            }
            self.record(id, PassKind::NegotiateExtent, PassOutcome::Ran);
            trace!(stage = %id, request = %combined, "negotiated");

            let node = self.node_mut(id)?;
            node.exec.negotiated = output_requests;
            node.exec.combined = combined;
            for out in &mut node.outputs {
                if out.state == PortState::CleanMetadata {
                    out.transition(PortState::CleanExtent)?;
                }
            }

            let connections = node.inputs.clone();
            for (in_port, (conns, requests)) in connections.iter().zip(input_requests).enumerate() {
                for (conn, request) in conns.iter().zip(requests) {
                    match pending.entry((conn.producer, conn.port)) {
                        Entry::Occupied(mut slot) => {
                            let merged = slot.get().request.union(&request).map_err(|source| {
                                PipelineError::Negotiation {
                                    stage: conn.producer,
                                    source,
                                }
                            })?;
                            let slot = slot.get_mut();
                            slot.request = merged;
                            slot.requesters.push((id, in_port));
                        }
                        Entry::Vacant(slot) => {
                            slot.insert(Pending {
                                request,
                                requesters: vec![(id, in_port)],
                            });
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Validate a request against what output `port` of `id` advertises
    ///
    /// On rejection every requester is asked once for a substitute; the
    /// union of the substitutes must then validate.
    fn accept(&self, id: StageId, port: usize, entry: Pending) -> Result<UpdateRequest, PipelineError> {
        let info = &output_port(self.node(id)?, port)?.info;
        let Err(error) = entry.request.validate(info) else {
            return Ok(entry.request);
        };
        let reject = |source: NegotiationError| {
            self.record(id, PassKind::NegotiateExtent, PassOutcome::Failed);
            warn!(stage = %id, port, error = %source, "request rejected");
            PipelineError::Negotiation { stage: id, source }
        };
        if entry.requesters.is_empty() {
            return Err(reject(error));
        }

        let mut fallback: Option<UpdateRequest> = None;
        for (consumer, in_port) in &entry.requesters {
            let node = self.node(*consumer)?;
            let Some(substitute) = node.stage.negotiation_fallback(*in_port, &error, info, &entry.request) else {
                return Err(reject(error));
            };
            fallback = Some(match fallback {
                None => substitute,
                Some(acc) => acc.union(&substitute).map_err(&reject)?,
            });
        }
        let Some(fallback) = fallback else {
            return Err(reject(error));
        };
        fallback.validate(info).map_err(&reject)?;
        debug!(stage = %id, port, rejected = %entry.request, accepted = %fallback, "fallback request accepted");
        Ok(fallback)
    }

    fn stale_reason(&self, node: &StageNode, dirty: &HashSet<StageId>) -> Result<Option<&'static str>, PipelineError> {
        if node.exec.executions == 0 {
            return Ok(Some("never executed"));
        }
        if node
            .outputs
            .iter()
            .any(|o| !o.state.has_executed() || o.state == PortState::Invalid)
        {
            return Ok(Some("output invalid"));
        }
        if node.mtime > node.exec.last_execute {
            return Ok(Some("parameters modified"));
        }
        if node.outputs.is_empty() && node.exec.executed_request.as_ref() != Some(&node.exec.combined) {
            return Ok(Some("request changed"));
        }
        for conn in node.inputs.iter().flatten() {
            if dirty.contains(&conn.producer) {
                return Ok(Some("upstream stale"));
            }
            if output_port(self.node(conn.producer)?, conn.port)?.stamp > node.exec.last_execute {
                return Ok(Some("input changed"));
            }
        }
        let changed = node
            .exec
            .negotiated
            .iter()
            .zip(&node.exec.satisfied)
            .any(|(negotiated, satisfied)| negotiated.is_some() && negotiated != satisfied);
        if changed {
            return Ok(Some("request changed"));
        }
        Ok(None)
    }

    fn execute(&mut self) -> Result<(), PipelineError> {
        let mut dirty = HashSet::new();
        for id in &self.order {
            let node = self.node(*id)?;
            if let Some(reason) = self.stale_reason(node, &dirty)? {
                trace!(stage = %id, reason, "stale");
                dirty.insert(*id);
            }
        }

        // Stages holding no data must still run when something that runs reads them.
        let mut must_run = dirty;
        for id in self.order.iter().rev() {
            let node = self.node(*id)?;
            let needed = must_run.contains(id)
                || (*id == self.target
                    && self
                        .port
                        .and_then(|port| node.outputs.get(port))
                        .is_some_and(|o| o.data.is_none()));
            if !needed {
                continue;
            }
            must_run.insert(*id);
            for conn in node.inputs.iter().flatten() {
                if output_port(self.node(conn.producer)?, conn.port)?.data.is_none() {
                    must_run.insert(conn.producer);
                }
            }
        }

        let mut levels: HashMap<StageId, usize> = HashMap::new();
        let mut batches: BTreeMap<usize, Vec<StageId>> = BTreeMap::new();
        for id in &self.order {
            let level = self
                .node(*id)?
                .inputs
                .iter()
                .flatten()
                .filter_map(|c| levels.get(&c.producer))
                .map(|l| l + 1)
                .max()
                .unwrap_or(0);
            levels.insert(*id, level);
            batches.entry(level).or_default().push(*id);
        }

        let parallel = self.pipeline.config().executive.parallel_execution;
        let mut failure: Option<PipelineError> = None;
        for batch in batches.into_values() {
            if failure.is_some() {
                for id in &batch {
                    self.record(*id, PassKind::Execute, PassOutcome::Skipped);
                }
                continue;
            }
            let (runnable, cached): (Vec<StageId>, Vec<StageId>) = batch.into_iter().partition(|id| must_run.contains(id));
            for id in cached {
                trace!(stage = %id, "cached");
                self.record(id, PassKind::Execute, PassOutcome::Cached);
            }
            let mut inputs = HashMap::with_capacity(runnable.len());
            for id in &runnable {
                inputs.insert(*id, self.gather_inputs(*id)?);
            }

            let pull = self.id;
            let mut jobs: Vec<(&mut StageNode, Inputs)> = self
                .guards
                .iter_mut()
                .filter_map(|(id, guard)| inputs.remove(id).map(|i| (&mut **guard, i)))
                .collect();
            let results: Vec<(StageId, Result<(), PipelineError>)> = if parallel && jobs.len() > 1 {
                jobs.par_iter_mut()
                    .map(|(node, inputs)| (node.id, run_stage(node, std::mem::take(inputs), pull)))
                    .collect()
            } else {
                jobs.iter_mut()
                    .map(|(node, inputs)| (node.id, run_stage(node, std::mem::take(inputs), pull)))
                    .collect()
            };

            let positions: HashMap<StageId, usize> = self.order.iter().enumerate().map(|(i, id)| (*id, i)).collect();
            let mut results = results;
            results.sort_by_key(|(id, _)| positions.get(id).copied().unwrap_or(usize::MAX));
            for (id, result) in results {
                match result {
                    Ok(()) => self.record(id, PassKind::Execute, PassOutcome::Ran),
                    Err(err) => {
                        self.record(id, PassKind::Execute, PassOutcome::Failed);
                        warn!(stage = %id, error = %err, "execute failed");
                        failure.get_or_insert(err);
                    }
                }
            }
        }
        failure.map_or(Ok(()), Err)
    }

    /// Collect the input objects of `id`
    ///
    /// On an in-place port the producer's object is moved out when this
    /// stage is its only consumer, leaving the producer `Stale`.
    fn gather_inputs(&mut self, id: StageId) -> Result<Inputs, PipelineError> {
        let node = self.node(id)?;
        let connections = node.inputs.clone();
        let in_place: Vec<bool> = node.signature.inputs.iter().map(|d| d.in_place).collect();
        let pulled = self.port.map(|port| (self.target, port));

        let mut inputs = Vec::with_capacity(connections.len());
        for (port, conns) in connections.iter().enumerate() {
            let movable_port = in_place.get(port).copied().unwrap_or(false);
            let mut objects = Vec::with_capacity(conns.len());
            for conn in conns {
                let producer = self.node_mut(conn.producer)?;
                let out = producer.outputs.get_mut(conn.port).ok_or(PipelineError::InvalidPort {
                    stage: conn.producer,
                    direction: Direction::Output,
                    port: conn.port,
                })?;
                let movable =
                    movable_port && out.consumers.len() == 1 && Some((conn.producer, conn.port)) != pulled;
                if movable && out.data.is_some() {
                    if out.state == PortState::Valid {
                        out.transition(PortState::Stale)?;
                    }
                    trace!(producer = %conn.producer, consumer = %id, "moving input in place");
                    objects.push(out.data.take());
                } else {
                    objects.push(out.data.clone());
                }
            }
            inputs.push(objects);
        }
        Ok(inputs)
    }

    fn target_output(&self) -> Result<Arc<DataObject>, PipelineError> {
        let port = self.port.ok_or(PipelineError::InvalidPort {
            stage: self.target,
            direction: Direction::Output,
            port: 0,
        })?;
        output_port(self.node(self.target)?, port)?
            .data
            .clone()
            .ok_or_else(|| PipelineError::Execution {
                stage: self.target,
                source: StageError::failed("no output produced"),
            })
    }
}

/// Execute one stage on its gathered inputs
fn run_stage(node: &mut StageNode, inputs: Inputs, pull: u64) -> Result<(), PipelineError> {
    let id = node.id;
    for out in &mut node.outputs {
        if matches!(out.state, PortState::Valid | PortState::Invalid) {
            out.transition(PortState::Stale)?;
        }
    }

    let mut objects: Vec<DataObject> = node
        .outputs
        .iter_mut()
        .map(|out| {
            let kind = out.kind_or_default();
            match out.data.take().map(Arc::try_unwrap) {
                Some(Ok(mut object)) => {
                    object.reset();
                    object
                }
                // Still read downstream; leave that copy alone.
                Some(Err(_)) | None => DataObject::new(kind),
            }
        })
        .collect();

    let output_requests = node.exec.negotiated.clone();
    let request = Request::new(PassKind::Execute, pull).with_params(node.exec.combined.clone());
    let result = {
        let mut ctx = ExecuteContext::new(&request, &node.exec.combined, &output_requests, inputs, &mut objects);
        node.stage.execute(&mut ctx)
    };

    match result {
        Ok(()) => {
            let invariant = node.stage.extent_policy().is_extent_invariant();
            for ((out, mut object), requested) in node.outputs.iter_mut().zip(objects).zip(&output_requests) {
                if invariant {
                    if let Some(requested) = requested {
                        crop_to_request(&mut object, requested, &out.info);
                    }
                }
                object.modified();
                out.stamp = object.mtime();
                out.data = Some(Arc::new(object));
                out.transition(PortState::Valid)?;
            }
            node.exec.satisfied = output_requests;
            node.exec.executed_request = Some(node.exec.combined.clone());
            node.exec.executions += 1;
            node.exec.last_execute = MTime::next();
            debug!(stage = %id, type_name = node.type_name, executions = node.exec.executions, "executed");
            Ok(())
        }
        Err(source) => {
            for out in &mut node.outputs {
                out.data = Some(Arc::new(DataObject::new(out.kind_or_default())));
                out.transition(PortState::Invalid)?;
            }
            node.exec.satisfied = vec![None; node.outputs.len()];
            node.exec.executed_request = None;
            Err(PipelineError::Execution { stage: id, source })
        }
    }
}

/// Discard what an extent-invariant stage produced beyond the request
fn crop_to_request(object: &mut DataObject, requested: &UpdateRequest, info: &Information) {
    if requested.is_whole_extent() {
        return;
    }
    let Some(held) = object.extent() else {
        return;
    };
    let whole = info.get(&WHOLE_EXTENT).unwrap_or(held);
    let wanted = requested
        .resolve_extent(&whole)
        .grow(requested.ghost_levels)
        .clamp_to(&whole);
    if wanted.is_empty() || wanted == held || !held.contains(&wanted) {
        return;
    }
    if let Err(err) = object.crop(&wanted) {
        warn!(error = %err, extent = %wanted, "could not crop output");
    }
}
