//! The pipeline arena and its mutation API
//!
//! Stages live in an arena indexed by [`StageId`]. Connections are stored as
//! indices on the consumer's input ports, mirrored on the producer's output
//! ports and in a `petgraph` topology used for cycle checks and ordering.
//! Graph mutation takes `&mut self`; pulls take `&self` and lock only the
//! stages they visit.

use crate::config::PipelineConfig;
use crate::error::{PipelineError, WiringError};
use crate::executive::ExecutiveState;
use crate::registry::StageRegistry;
use crate::stage::{Stage, StageSignature};
use crate::stages::TrivialProducer;
use crate::state::{validate_transition, PortState};
use crate::trace::PassTrace;
use crate::types::{Connection, Direction, StageId};
use parking_lot::{Mutex, MutexGuard};
use petgraph::algo::{has_path_connecting, toposort};
use petgraph::graphmap::DiGraphMap;
use petgraph::visit::{Dfs, Reversed};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};
use vizflow_core::{DataKind, DataObject, Information, MTime};

/// An output port of a stage
#[derive(Debug, Default)]
pub(crate) struct OutputPort {
    pub(crate) kind: Option<DataKind>,
    pub(crate) data: Option<Arc<DataObject>>,
    pub(crate) info: Information,
    pub(crate) state: PortState,
    /// Stamp of `data` when it was last produced
    pub(crate) stamp: MTime,
    pub(crate) consumers: Vec<(StageId, usize)>,
}

impl OutputPort {
    pub(crate) fn transition(&mut self, to: PortState) -> Result<(), PipelineError> {
        validate_transition(self.state, to)?;
        self.state = to;
        Ok(())
    }

    pub(crate) fn kind_or_default(&self) -> DataKind {
        self.kind.unwrap_or(DataKind::DataObject)
    }
}

/// A stage together with its ports and executive state
pub(crate) struct StageNode {
    pub(crate) id: StageId,
    pub(crate) stage: Box<dyn Stage>,
    pub(crate) type_name: &'static str,
    pub(crate) signature: StageSignature,
    pub(crate) mtime: MTime,
    pub(crate) inputs: Vec<Vec<Connection>>,
    pub(crate) outputs: Vec<OutputPort>,
    pub(crate) exec: ExecutiveState,
    pub(crate) hidden: bool,
}

impl StageNode {
    fn new(id: StageId, stage: Box<dyn Stage>, hidden: bool) -> Self {
        let signature = stage.signature();
        let outputs = signature.outputs.iter().map(|_| OutputPort::default()).collect();
        Self {
            id,
            type_name: stage.type_name(),
            inputs: vec![Vec::new(); signature.inputs.len()],
            outputs,
            exec: ExecutiveState::new(signature.outputs.len()),
            signature,
            stage,
            mtime: MTime::next(),
            hidden,
        }
    }

    fn topology_changed(&mut self) {
        self.mtime.touch();
        self.exec.declared_inputs = None;
    }
}

/// A demand-driven graph of stages
///
/// ```
/// use vizflow_pipeline::prelude::*;
///
/// let mut pipeline = Pipeline::new();
/// let source = pipeline.add_stage(SyntheticImage::new(Extent::new(0, 7, 0, 7, 0, 0)));
/// let pass = pipeline.add_stage(PassThrough::new());
/// pipeline.connect(source, 0, pass, 0).unwrap();
///
/// let image = pipeline.update(pass, 0, UpdateRequest::piece(0, 2)).unwrap();
/// assert!(image.extent().is_some());
/// ```
pub struct Pipeline {
    nodes: Vec<Option<Mutex<StageNode>>>,
    topology: DiGraphMap<StageId, u32>,
    config: PipelineConfig,
    trace: PassTrace,
    pulls: AtomicU64,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl Pipeline {
    /// Empty pipeline with the default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(PipelineConfig::default())
    }

    /// Empty pipeline
    #[must_use]
    pub fn with_config(config: PipelineConfig) -> Self {
        let trace = PassTrace::new(config.executive.trace, config.executive.trace_capacity);
        Self {
            nodes: Vec::new(),
            topology: DiGraphMap::new(),
            config,
            trace,
            pulls: AtomicU64::new(0),
        }
    }

    /// Active configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Pass trace shared by every pull
    #[inline]
    #[must_use]
    pub fn trace(&self) -> &PassTrace {
        &self.trace
    }

    /// Add a stage and return its handle
    pub fn add_stage<S: Stage>(&mut self, stage: S) -> StageId {
        self.add_boxed(Box::new(stage))
    }

    /// Add a boxed stage and return its handle
    pub fn add_boxed(&mut self, stage: Box<dyn Stage>) -> StageId {
        self.insert(stage, false)
    }

    /// Build a stage from `registry` and add it
    ///
    /// # Errors
    /// [`PipelineError::Registry`] when the type is unknown or the
    /// parameters are rejected.
    pub fn add_registered(
        &mut self,
        registry: &StageRegistry,
        type_name: &str,
        params: &serde_json::Value,
    ) -> Result<StageId, PipelineError> {
        let stage = registry.create(type_name, params)?;
        Ok(self.add_boxed(stage))
    }

    fn insert(&mut self, stage: Box<dyn Stage>, hidden: bool) -> StageId {
        let id = StageId(u32::try_from(self.nodes.len()).unwrap_or(u32::MAX));
        let node = StageNode::new(id, stage, hidden);
        debug!(stage = %id, type_name = node.type_name, hidden, "stage added");
        self.nodes.push(Some(Mutex::new(node)));
        self.topology.add_node(id);
        id
    }

    /// Remove a stage and every connection touching it
    ///
    /// Hidden data producers left without consumers are removed as well.
    ///
    /// # Errors
    /// [`PipelineError::UnknownStage`].
    pub fn remove_stage(&mut self, id: StageId) -> Result<Box<dyn Stage>, PipelineError> {
        let (incoming, outgoing) = {
            let node = self.node_mut(id)?;
            let incoming: Vec<(Connection, usize)> = node
                .inputs
                .iter()
                .enumerate()
                .flat_map(|(port, conns)| conns.iter().map(move |c| (*c, port)))
                .collect();
            let outgoing: Vec<(usize, StageId, usize)> = node
                .outputs
                .iter()
                .enumerate()
                .flat_map(|(port, out)| out.consumers.iter().map(move |(c, p)| (port, *c, *p)))
                .collect();
            (incoming, outgoing)
        };
        for (conn, in_port) in incoming {
            self.disconnect(conn.producer, conn.port, id, in_port)?;
        }
        for (out_port, consumer, in_port) in outgoing {
            self.disconnect(id, out_port, consumer, in_port)?;
        }
        self.topology.remove_node(id);
        let node = self
            .nodes
            .get_mut(id.index())
            .and_then(Option::take)
            .ok_or(PipelineError::UnknownStage(id))?
            .into_inner();
        debug!(stage = %id, "stage removed");
        Ok(node.stage)
    }

    /// Connect output `out_port` of `producer` to input `in_port` of `consumer`
    ///
    /// # Errors
    /// [`PipelineError::Wiring`] for self loops, cycles, incompatible kinds
    /// and already-connected non-repeatable ports;
    /// [`PipelineError::UnknownStage`] / [`PipelineError::InvalidPort`] for
    /// bad handles.
    pub fn connect(
        &mut self,
        producer: StageId,
        out_port: usize,
        consumer: StageId,
        in_port: usize,
    ) -> Result<(), PipelineError> {
        self.check_output_port(producer, out_port)?;
        let descriptor = {
            let node = self.node_mut(consumer)?;
            node.signature
                .inputs
                .get(in_port)
                .cloned()
                .ok_or(PipelineError::InvalidPort {
                    stage: consumer,
                    direction: Direction::Input,
                    port: in_port,
                })?
        };
        if producer == consumer {
            return Err(WiringError::SelfLoop(producer).into());
        }

        let produced = self.resolve_output_kind(producer, out_port)?;
        if !produced.is_a(descriptor.required_kind) {
            return Err(WiringError::IncompatibleType {
                producer,
                produced,
                consumer,
                port: descriptor.name.to_string(),
                required: descriptor.required_kind,
            }
            .into());
        }

        let node = self.node_mut(consumer)?;
        if !descriptor.repeatable && node.inputs.get(in_port).is_some_and(|c| !c.is_empty()) {
            return Err(WiringError::NotRepeatable {
                stage: consumer,
                port: descriptor.name.to_string(),
            }
            .into());
        }
        if has_path_connecting(&self.topology, consumer, producer, None) {
            return Err(WiringError::Cycle { producer, consumer }.into());
        }

        let node = self.node_mut(consumer)?;
        if let Some(conns) = node.inputs.get_mut(in_port) {
            conns.push(Connection {
                producer,
                port: out_port,
            });
        }
        node.topology_changed();
        if let Some(out) = self.node_mut(producer)?.outputs.get_mut(out_port) {
            out.consumers.push((consumer, in_port));
        }
        match self.topology.edge_weight_mut(producer, consumer) {
            Some(count) => *count += 1,
            None => {
                self.topology.add_edge(producer, consumer, 1);
            }
        }
        self.mark_stale_from(consumer)?;
        debug!(%producer, out_port, %consumer, in_port, "connected");
        Ok(())
    }

    /// Remove one connection
    ///
    /// # Errors
    /// [`WiringError::NotConnected`] when no such connection exists.
    pub fn disconnect(
        &mut self,
        producer: StageId,
        out_port: usize,
        consumer: StageId,
        in_port: usize,
    ) -> Result<(), PipelineError> {
        let not_connected = || WiringError::NotConnected {
            producer,
            out_port,
            consumer,
            in_port,
        };
        let node = self.node_mut(consumer)?;
        let conns = node.inputs.get_mut(in_port).ok_or_else(not_connected)?;
        let position = conns
            .iter()
            .position(|c| c.producer == producer && c.port == out_port)
            .ok_or_else(not_connected)?;
        conns.remove(position);
        node.topology_changed();
        self.mark_stale_from(consumer)?;

        let source = self.node_mut(producer)?;
        if let Some(out) = source.outputs.get_mut(out_port) {
            if let Some(i) = out.consumers.iter().position(|c| *c == (consumer, in_port)) {
                out.consumers.remove(i);
            }
        }
        let orphaned = source.hidden && source.outputs.iter().all(|o| o.consumers.is_empty());

        if let Some(count) = self.topology.edge_weight_mut(producer, consumer) {
            *count -= 1;
            if *count == 0 {
                self.topology.remove_edge(producer, consumer);
            }
        }
        debug!(%producer, out_port, %consumer, in_port, "disconnected");

        if orphaned {
            self.remove_stage(producer)?;
        }
        Ok(())
    }

    /// Feed input `in_port` of `consumer` directly with `data`
    ///
    /// A hidden trivial producer owns the object. Calling this again on the
    /// same port replaces the object and marks the producer modified.
    ///
    /// # Errors
    /// As [`Pipeline::connect`].
    pub fn set_input_data(
        &mut self,
        consumer: StageId,
        in_port: usize,
        data: DataObject,
    ) -> Result<StageId, PipelineError> {
        if let Some(producer) = self.trivial_producer(consumer, in_port)? {
            let required = self.input_descriptor_kind(consumer, in_port)?;
            if !data.kind().is_a(required) {
                return Err(WiringError::IncompatibleType {
                    producer,
                    produced: data.kind(),
                    consumer,
                    port: self.input_name(consumer, in_port)?,
                    required,
                }
                .into());
            }
            self.modify_stage::<TrivialProducer, _>(producer, |t| t.set_data(data))?;
            // The object kind may have changed.
            self.node_mut(producer)?.exec.declared_inputs = None;
            return Ok(producer);
        }

        let repeatable = {
            let node = self.node_mut(consumer)?;
            node.signature.inputs.get(in_port).is_some_and(|d| d.repeatable)
        };
        if !repeatable {
            let existing: Vec<Connection> = self
                .node_mut(consumer)?
                .inputs
                .get(in_port)
                .cloned()
                .unwrap_or_default();
            for conn in existing {
                self.disconnect(conn.producer, conn.port, consumer, in_port)?;
            }
        }

        let producer = self.insert(Box::new(TrivialProducer::new(data)), true);
        if let Err(err) = self.connect(producer, 0, consumer, in_port) {
            self.nodes.get_mut(producer.index()).and_then(Option::take);
            self.topology.remove_node(producer);
            return Err(err);
        }
        Ok(producer)
    }

    /// Mutate the object previously given to [`Pipeline::set_input_data`]
    ///
    /// # Errors
    /// [`PipelineError::MissingInput`] when the port is not fed directly.
    pub fn modify_input_data<R>(
        &mut self,
        consumer: StageId,
        in_port: usize,
        f: impl FnOnce(&mut DataObject) -> R,
    ) -> Result<R, PipelineError> {
        let Some(producer) = self.trivial_producer(consumer, in_port)? else {
            return Err(PipelineError::MissingInput {
                stage: consumer,
                port: self.input_name(consumer, in_port)?,
            });
        };
        self.modify_stage::<TrivialProducer, _>(producer, |t| f(t.data_mut()))
    }

    fn trivial_producer(&mut self, consumer: StageId, in_port: usize) -> Result<Option<StageId>, PipelineError> {
        let conns = {
            let node = self.node_mut(consumer)?;
            node.inputs.get(in_port).cloned().ok_or(PipelineError::InvalidPort {
                stage: consumer,
                direction: Direction::Input,
                port: in_port,
            })?
        };
        for conn in conns {
            if self.node_mut(conn.producer)?.hidden {
                return Ok(Some(conn.producer));
            }
        }
        Ok(None)
    }

    fn input_descriptor_kind(&mut self, stage: StageId, in_port: usize) -> Result<DataKind, PipelineError> {
        self.node_mut(stage)?
            .signature
            .inputs
            .get(in_port)
            .map(|d| d.required_kind)
            .ok_or(PipelineError::InvalidPort {
                stage,
                direction: Direction::Input,
                port: in_port,
            })
    }

    fn input_name(&mut self, stage: StageId, in_port: usize) -> Result<String, PipelineError> {
        Ok(self
            .node_mut(stage)?
            .signature
            .inputs
            .get(in_port)
            .map_or_else(|| format!("#{in_port}"), |d| d.name.to_string()))
    }

    /// Mutate the parameters of a stage of concrete type `T`
    ///
    /// Always marks the stage modified, so its next pull re-executes it.
    ///
    /// # Errors
    /// [`PipelineError::WrongStageType`] when the stage is not a `T`.
    pub fn modify_stage<T: Stage, R>(&mut self, id: StageId, f: impl FnOnce(&mut T) -> R) -> Result<R, PipelineError> {
        let node = self.node_mut(id)?;
        let actual = node.type_name;
        let stage = (*node.stage)
            .as_any_mut()
            .downcast_mut::<T>()
            .ok_or(PipelineError::WrongStageType {
                stage: id,
                expected: std::any::type_name::<T>(),
                actual,
            })?;
        let out = f(stage);
        node.mtime.touch();
        debug!(stage = %id, mtime = %node.mtime, "stage modified");
        self.mark_stale_from(id)?;
        Ok(out)
    }

    /// Read the parameters of a stage of concrete type `T`
    ///
    /// # Errors
    /// [`PipelineError::WrongStageType`] when the stage is not a `T`.
    pub fn with_stage<T: Stage, R>(&self, id: StageId, f: impl FnOnce(&T) -> R) -> Result<R, PipelineError> {
        let node = self.lock(id)?;
        let stage = (*node.stage)
            .as_any()
            .downcast_ref::<T>()
            .ok_or(PipelineError::WrongStageType {
                stage: id,
                expected: std::any::type_name::<T>(),
                actual: node.type_name,
            })?;
        Ok(f(stage))
    }

    /// Mark a stage modified without changing it
    ///
    /// # Errors
    /// [`PipelineError::UnknownStage`].
    pub fn touch(&mut self, id: StageId) -> Result<MTime, PipelineError> {
        let mtime = self.node_mut(id)?.mtime.touch();
        self.mark_stale_from(id)?;
        Ok(mtime)
    }

    /// Parameter stamp of a stage
    ///
    /// # Errors
    /// [`PipelineError::UnknownStage`].
    pub fn stage_mtime(&self, id: StageId) -> Result<MTime, PipelineError> {
        Ok(self.lock(id)?.mtime)
    }

    /// Registered type name of a stage
    ///
    /// # Errors
    /// [`PipelineError::UnknownStage`].
    pub fn type_name(&self, id: StageId) -> Result<&'static str, PipelineError> {
        Ok(self.lock(id)?.type_name)
    }

    /// State of output `port`
    ///
    /// Modifying a stage or rewiring its inputs drops its executed outputs,
    /// and those of everything downstream, to [`PortState::Stale`] until the
    /// next pull re-executes them.
    ///
    /// # Errors
    /// [`PipelineError::UnknownStage`] / [`PipelineError::InvalidPort`].
    pub fn port_state(&self, id: StageId, port: usize) -> Result<PortState, PipelineError> {
        let node = self.lock(id)?;
        output_port(&node, port).map(|o| o.state)
    }

    /// Information on output `port`, without running any pass
    ///
    /// # Errors
    /// [`PipelineError::UnknownStage`] / [`PipelineError::InvalidPort`].
    pub fn output_information(&self, id: StageId, port: usize) -> Result<Information, PipelineError> {
        let node = self.lock(id)?;
        output_port(&node, port).map(|o| o.info.clone())
    }

    /// Data currently held on output `port`, without running any pass
    ///
    /// # Errors
    /// [`PipelineError::UnknownStage`] / [`PipelineError::InvalidPort`].
    pub fn output_data(&self, id: StageId, port: usize) -> Result<Option<Arc<DataObject>>, PipelineError> {
        let node = self.lock(id)?;
        output_port(&node, port).map(|o| o.data.clone())
    }

    /// Number of successful executions of a stage
    ///
    /// # Errors
    /// [`PipelineError::UnknownStage`].
    pub fn execution_count(&self, id: StageId) -> Result<u64, PipelineError> {
        Ok(self.lock(id)?.exec.executions)
    }

    /// Stages feeding input ports of `id`, in port then connection order
    ///
    /// # Errors
    /// [`PipelineError::UnknownStage`].
    pub fn producers(&self, id: StageId) -> Result<Vec<Connection>, PipelineError> {
        Ok(self.lock(id)?.inputs.iter().flatten().copied().collect())
    }

    /// Consumers of output `port` of `id` as `(stage, input port)`
    ///
    /// # Errors
    /// [`PipelineError::UnknownStage`] / [`PipelineError::InvalidPort`].
    pub fn consumers(&self, id: StageId, port: usize) -> Result<Vec<(StageId, usize)>, PipelineError> {
        let node = self.lock(id)?;
        output_port(&node, port).map(|o| o.consumers.clone())
    }

    /// Handles of every stage added by the client
    #[must_use]
    pub fn stage_ids(&self) -> Vec<StageId> {
        self.nodes
            .iter()
            .filter_map(|slot| slot.as_ref())
            .filter_map(|node| {
                let node = node.lock();
                (!node.hidden).then_some(node.id)
            })
            .collect()
    }

    /// Number of stages added by the client
    #[must_use]
    pub fn len(&self) -> usize {
        self.stage_ids().len()
    }

    /// Whether the pipeline has no client stages
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn next_pull_id(&self) -> u64 {
        self.pulls.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub(crate) fn lock(&self, id: StageId) -> Result<MutexGuard<'_, StageNode>, PipelineError> {
        self.nodes
            .get(id.index())
            .and_then(Option::as_ref)
            .map(Mutex::lock)
            .ok_or(PipelineError::UnknownStage(id))
    }

    fn node_mut(&mut self, id: StageId) -> Result<&mut StageNode, PipelineError> {
        self.nodes
            .get_mut(id.index())
            .and_then(Option::as_mut)
            .map(Mutex::get_mut)
            .ok_or(PipelineError::UnknownStage(id))
    }

    /// Drop every executed output at or downstream of `from` to `Stale`
    fn mark_stale_from(&mut self, from: StageId) -> Result<(), PipelineError> {
        let mut reached = Vec::new();
        let mut dfs = Dfs::new(&self.topology, from);
        while let Some(id) = dfs.next(&self.topology) {
            reached.push(id);
        }
        for id in reached {
            for out in &mut self.node_mut(id)?.outputs {
                if matches!(out.state, PortState::Valid | PortState::Invalid) {
                    out.transition(PortState::Stale)?;
                }
            }
        }
        trace!(stage = %from, "downstream outputs marked stale");
        Ok(())
    }

    fn check_output_port(&mut self, id: StageId, port: usize) -> Result<(), PipelineError> {
        if port < self.node_mut(id)?.outputs.len() {
            Ok(())
        } else {
            Err(PipelineError::InvalidPort {
                stage: id,
                direction: Direction::Output,
                port,
            })
        }
    }

    /// Kind output `port` of `id` will produce given its current inputs
    fn resolve_output_kind(&mut self, id: StageId, port: usize) -> Result<DataKind, PipelineError> {
        let inputs = self.node_mut(id)?.inputs.clone();
        let mut kinds = Vec::with_capacity(inputs.len());
        for conns in inputs {
            let mut port_kinds = Vec::with_capacity(conns.len());
            for conn in conns {
                port_kinds.push(self.resolve_output_kind(conn.producer, conn.port)?);
            }
            kinds.push(port_kinds);
        }
        Ok(self.node_mut(id)?.stage.declare_output_type(port, &kinds))
    }

    /// Every stage `target` depends on, itself included, in topological order
    pub(crate) fn upstream_closure(&self, target: StageId) -> Result<Vec<StageId>, PipelineError> {
        if !self.topology.contains_node(target) {
            return Err(PipelineError::UnknownStage(target));
        }
        let reversed = Reversed(&self.topology);
        let mut dfs = Dfs::new(reversed, target);
        let mut members = BTreeSet::new();
        while let Some(id) = dfs.next(reversed) {
            members.insert(id);
        }
        let order = toposort(&self.topology, None).map_err(|cycle| WiringError::Cycle {
            producer: cycle.node_id(),
            consumer: cycle.node_id(),
        })?;
        Ok(order.into_iter().filter(|id| members.contains(id)).collect())
    }
}

pub(crate) fn output_port(node: &StageNode, port: usize) -> Result<&OutputPort, PipelineError> {
    node.outputs.get(port).ok_or(PipelineError::InvalidPort {
        stage: node.id,
        direction: Direction::Output,
        port,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::{Clip, Group, PassThrough, SyntheticImage};
    use vizflow_core::Extent;

    fn source() -> SyntheticImage {
        SyntheticImage::new(Extent::new(0, 3, 0, 3, 0, 0))
    }

    #[test]
    fn connect_records_both_ends() {
        let mut p = Pipeline::new();
        let a = p.add_stage(source());
        let b = p.add_stage(PassThrough::new());
        p.connect(a, 0, b, 0).unwrap();
        assert_eq!(p.consumers(a, 0).unwrap(), vec![(b, 0)]);
        assert_eq!(p.producers(b).unwrap(), vec![Connection { producer: a, port: 0 }]);
    }

    #[test]
    fn connect_bumps_consumer_mtime() {
        let mut p = Pipeline::new();
        let a = p.add_stage(source());
        let b = p.add_stage(PassThrough::new());
        let before = p.stage_mtime(b).unwrap();
        p.connect(a, 0, b, 0).unwrap();
        assert!(p.stage_mtime(b).unwrap() > before);
    }

    #[test]
    fn kinds_resolve_through_pass_through() {
        let mut p = Pipeline::new();
        let a = p.add_stage(source());
        let b = p.add_stage(PassThrough::new());
        let c = p.add_stage(Clip::new(Extent::new(0, 1, 0, 1, 0, 0)));
        p.connect(a, 0, b, 0).unwrap();
        p.connect(b, 0, c, 0).unwrap();
    }

    #[test]
    fn repeatable_port_accepts_many() {
        let mut p = Pipeline::new();
        let a = p.add_stage(source());
        let b = p.add_stage(source());
        let g = p.add_stage(Group::new());
        p.connect(a, 0, g, 0).unwrap();
        p.connect(b, 0, g, 0).unwrap();
        assert_eq!(p.producers(g).unwrap().len(), 2);
    }

    #[test]
    fn disconnect_unknown_connection_fails() {
        let mut p = Pipeline::new();
        let a = p.add_stage(source());
        let b = p.add_stage(PassThrough::new());
        let err = p.disconnect(a, 0, b, 0).unwrap_err();
        assert!(matches!(err, PipelineError::Wiring(WiringError::NotConnected { .. })));
    }

    #[test]
    fn set_input_data_reuses_hidden_producer() {
        let mut p = Pipeline::new();
        let b = p.add_stage(PassThrough::new());
        let first = p.set_input_data(b, 0, DataObject::new(DataKind::ImageData)).unwrap();
        let second = p.set_input_data(b, 0, DataObject::new(DataKind::Table)).unwrap();
        assert_eq!(first, second);
        assert_eq!(p.stage_ids(), vec![b]);
        let before = p.stage_mtime(first).unwrap();
        p.modify_input_data(b, 0, |d| d.modified()).unwrap();
        assert!(p.stage_mtime(first).unwrap() > before);
    }

    #[test]
    fn removing_consumer_drops_hidden_producer() {
        let mut p = Pipeline::new();
        let b = p.add_stage(PassThrough::new());
        let hidden = p.set_input_data(b, 0, DataObject::new(DataKind::ImageData)).unwrap();
        p.remove_stage(b).unwrap();
        assert!(matches!(p.stage_mtime(hidden), Err(PipelineError::UnknownStage(_))));
        assert!(p.is_empty());
    }

    #[test]
    fn ids_are_not_reused() {
        let mut p = Pipeline::new();
        let a = p.add_stage(source());
        p.remove_stage(a).unwrap();
        let b = p.add_stage(source());
        assert_ne!(a, b);
    }

    #[test]
    fn modify_stage_checks_type() {
        let mut p = Pipeline::new();
        let a = p.add_stage(source());
        let err = p.modify_stage::<PassThrough, _>(a, |_| ()).unwrap_err();
        assert!(matches!(err, PipelineError::WrongStageType { .. }));
        p.modify_stage::<SyntheticImage, _>(a, |s| s.set_scale(2.0)).unwrap();
        assert!(p.with_stage::<SyntheticImage, _>(a, |s| s.scale()).unwrap() > 1.0);
    }
}
