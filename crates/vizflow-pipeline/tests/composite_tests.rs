use pretty_assertions::assert_eq;
use std::sync::Arc;
use vizflow_core::info::COMPOSITE_BLOCK_IDS;
use vizflow_pipeline::prelude::*;
use vizflow_pipeline::PerBlock;
use vizflow_test_utils::{first_value, CompositeSource, CountingFilter, Monitor, OffsetBlocks};

fn source(monitor: &Monitor) -> CompositeSource {
    CompositeSource::new(monitor.clone())
        .with_block("a", 1.0)
        .with_block("b", 2.0)
}

#[test]
fn test_structural_change_reruns_consumer() {
    let (sp, fp) = (Monitor::new(), Monitor::new());
    let mut p = Pipeline::new();
    let src = p.add_stage(source(&sp));
    let consumer = p.add_stage(CountingFilter::invariant(fp.clone()));
    p.connect(src, 0, consumer, 0).unwrap();

    let before = p.update(consumer, 0, UpdateRequest::whole()).unwrap();
    assert_eq!(before.composite().unwrap().leaf_ids().len(), 2);
    let stamps = p.with_stage::<CompositeSource, _>(src, CompositeSource::block_mtimes).unwrap();

    p.modify_stage::<CompositeSource, _>(src, |s| s.add_block("c", 3.0)).unwrap();
    let after = p.update(consumer, 0, UpdateRequest::whole()).unwrap();

    assert_eq!(fp.executions(), 2);
    assert_eq!(after.composite().unwrap().leaf_ids().len(), 3);
    let now = p.with_stage::<CompositeSource, _>(src, CompositeSource::block_mtimes).unwrap();
    assert_eq!(&now[..2], &stamps[..]);
    assert_eq!(
        p.output_information(consumer, 0).unwrap().get(&COMPOSITE_BLOCK_IDS),
        Some([1, 2, 3].into_iter().collect())
    );
}

#[test]
fn test_unchanged_leaves_are_shared_through_source() {
    let mut p = Pipeline::new();
    let src = p.add_stage(source(&Monitor::new()));

    let first = p.update(src, 0, UpdateRequest::whole()).unwrap();
    p.modify_stage::<CompositeSource, _>(src, |s| s.set_block_value(2, 9.0)).unwrap();
    let second = p.update(src, 0, UpdateRequest::whole()).unwrap();

    let (a, b) = (first.composite().unwrap(), second.composite().unwrap());
    assert!(Arc::ptr_eq(a.leaf(1).unwrap(), b.leaf(1).unwrap()));
    assert!(!Arc::ptr_eq(a.leaf(2).unwrap(), b.leaf(2).unwrap()));
    assert_eq!(first_value(b.leaf(2).unwrap()), Some(9.0));
}

#[test]
fn test_per_block_reprocesses_changed_leaf_only() {
    let mut p = Pipeline::new();
    let src = p.add_stage(source(&Monitor::new()));
    let offset = p.add_stage(PerBlock::new(OffsetBlocks { offset: 10.0 }));
    p.connect(src, 0, offset, 0).unwrap();

    let out = p.update(offset, 0, UpdateRequest::whole()).unwrap();
    assert_eq!(first_value(out.composite().unwrap().leaf(1).unwrap()), Some(11.0));
    let processed = |p: &Pipeline| {
        p.with_stage::<PerBlock<OffsetBlocks>, _>(offset, PerBlock::processed)
            .unwrap()
    };
    assert_eq!(processed(&p), 2);

    p.modify_stage::<CompositeSource, _>(src, |s| s.set_block_value(2, 5.0)).unwrap();
    let out = p.update(offset, 0, UpdateRequest::whole()).unwrap();
    assert_eq!(processed(&p), 3);
    assert_eq!(first_value(out.composite().unwrap().leaf(2).unwrap()), Some(15.0));
}

#[test]
fn test_block_selection_reaches_source() {
    let sp = Monitor::new();
    let mut p = Pipeline::new();
    let src = p.add_stage(source(&sp).with_block("c", 3.0));
    let pick = p.add_stage(ExtractBlocks::new([2]));
    p.connect(src, 0, pick, 0).unwrap();

    let out = p.update(pick, 0, UpdateRequest::whole()).unwrap();
    let composite = out.composite().unwrap();
    assert_eq!(composite.leaf_ids().len(), 3);
    assert!(composite.leaf(1).is_none());
    assert_eq!(first_value(composite.leaf(2).unwrap()), Some(2.0));
    assert!(composite.leaf(3).is_none());
    assert_eq!(sp.last_request().unwrap().blocks, Some([2].into_iter().collect()));
}

#[test]
fn test_unknown_block_is_rejected() {
    let mut p = Pipeline::new();
    let src = p.add_stage(source(&Monitor::new()));
    let err = p.update(src, 0, UpdateRequest::whole().with_blocks([7])).unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Negotiation {
            source: vizflow_core::NegotiationError::UnknownBlock(7),
            ..
        }
    ));
}
