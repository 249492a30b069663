use proptest::prelude::*;
use vizflow_core::info::{CAN_PRODUCE_SUB_EXTENT, WHOLE_EXTENT};
use vizflow_core::NegotiationError;
use vizflow_pipeline::prelude::*;
use vizflow_test_utils::{first_value, ClampingConsumer, CountingFilter, CountingSource, Monitor};

fn whole() -> Extent {
    Extent::new(0, 15, 0, 15, 0, 0)
}

/// Asks its two inputs for fixed, different windows
struct TwoWindows {
    a: Extent,
    b: Extent,
}

impl Stage for TwoWindows {
    fn type_name(&self) -> &'static str {
        "two_windows"
    }

    fn signature(&self) -> StageSignature {
        StageSignature::new()
            .input(InputPortDescriptor::new("a", DataKind::ImageData))
            .input(InputPortDescriptor::new("b", DataKind::ImageData))
            .output(OutputPortDescriptor::new("output", DataKind::ImageData))
    }

    fn exchange_metadata(&mut self, ctx: &mut MetadataContext<'_>) -> Result<(), StageError> {
        if let Some(info) = ctx.output_mut(0) {
            info.set(&WHOLE_EXTENT, self.a);
            info.set(&CAN_PRODUCE_SUB_EXTENT, false);
        }
        Ok(())
    }

    fn negotiate_extent(&self, ctx: &mut NegotiationContext<'_>) -> Result<(), NegotiationError> {
        ctx.set_input_request(0, 0, UpdateRequest::whole().with_extent(self.a));
        ctx.set_input_request(1, 0, UpdateRequest::whole().with_extent(self.b));
        Ok(())
    }

    fn execute(&mut self, ctx: &mut ExecuteContext<'_>) -> Result<(), StageError> {
        let input = ctx.require_input(0, 0)?.clone();
        ctx.set_output(0, input)
    }
}

#[test]
fn test_invariant_stage_requests_whole_and_crops() {
    let (sp, fp) = (Monitor::new(), Monitor::new());
    let mut p = Pipeline::new();
    let source = p.add_stage(CountingSource::new(whole(), sp.clone()));
    let mid = p.add_stage(CountingFilter::invariant(fp.clone()));
    p.connect(source, 0, mid, 0).unwrap();

    let out = p.update(mid, 0, UpdateRequest::piece(2, 4)).unwrap();

    assert!(sp.last_request().unwrap().is_whole_extent());
    assert_eq!(fp.last_request().unwrap(), UpdateRequest::piece(2, 4));
    assert_eq!(out.extent(), whole().split(2, 4));
    assert_eq!(first_value(&out), Some(2.0));

    // Another piece: the source already holds everything.
    let other = p.update(mid, 0, UpdateRequest::piece(0, 4)).unwrap();
    assert_eq!(other.extent(), whole().split(0, 4));
    assert_eq!(sp.executions(), 1);
}

#[test]
fn test_aware_stage_forwards_split_extent() {
    let sp = Monitor::new();
    let mut p = Pipeline::new();
    let source = p.add_stage(CountingSource::new(whole(), sp.clone()));
    let filter = p.add_stage(CountingFilter::aware(Monitor::new()));
    p.connect(source, 0, filter, 0).unwrap();

    let out = p.update(filter, 0, UpdateRequest::piece(1, 2)).unwrap();
    assert_eq!(sp.last_request().unwrap().extent, whole().split(1, 2));
    assert_eq!(out.extent(), whole().split(1, 2));

    // A different piece is a different request upstream.
    p.update(filter, 0, UpdateRequest::piece(0, 2)).unwrap();
    assert_eq!(sp.executions(), 2);
}

#[test]
fn test_invariant_between_source_and_aware_sink() {
    let (sp, mp, kp) = (Monitor::new(), Monitor::new(), Monitor::new());
    let mut p = Pipeline::new();
    let source = p.add_stage(CountingSource::new(whole(), sp.clone()));
    let mid = p.add_stage(CountingFilter::invariant(mp.clone()));
    let sink = p.add_stage(CountingFilter::aware(kp.clone()));
    p.connect(source, 0, mid, 0).unwrap();
    p.connect(mid, 0, sink, 0).unwrap();

    let out = p.update(sink, 0, UpdateRequest::piece(2, 4)).unwrap();

    assert!(sp.last_request().unwrap().is_whole_extent());
    assert_eq!(mp.last_request().unwrap().extent, whole().split(2, 4));
    assert_eq!(kp.last_request().unwrap(), UpdateRequest::piece(2, 4));
    assert_eq!(out.extent(), whole().split(2, 4));
    assert_eq!(first_value(&out), Some(3.0));
    assert_eq!((sp.executions(), mp.executions(), kp.executions()), (1, 1, 1));
}

#[test]
fn test_fan_out_requests_are_unioned() {
    let sp = Monitor::new();
    let mut p = Pipeline::new();
    let source = p.add_stage(CountingSource::new(whole(), sp.clone()));
    let a = Extent::new(0, 3, 0, 3, 0, 0);
    let b = Extent::new(8, 11, 2, 9, 0, 0);
    let join = p.add_stage(TwoWindows { a, b });
    p.connect(source, 0, join, 0).unwrap();
    p.connect(source, 0, join, 1).unwrap();

    p.update(join, 0, UpdateRequest::whole()).unwrap();

    assert_eq!(sp.executions(), 1);
    assert_eq!(sp.last_request().unwrap().extent, Some(a.union(&b)));
}

#[test]
fn test_rejected_time_is_clamped_by_consumer() {
    let sp = Monitor::new();
    let mut p = Pipeline::new();
    let source = p.add_stage(CountingSource::new(whole(), sp.clone()).with_time_steps(vec![0.0, 1.0, 2.0]));
    let consumer = p.add_stage(ClampingConsumer::new(Monitor::new()));
    p.connect(source, 0, consumer, 0).unwrap();

    p.update(consumer, 0, UpdateRequest::whole().with_time(9.0)).unwrap();
    assert_eq!(sp.last_request().unwrap().time, Some(2.0));
}

#[test]
fn test_rejected_time_without_fallback_fails() {
    let mut p = Pipeline::new();
    let source = p.add_stage(CountingSource::new(whole(), Monitor::new()).with_time_steps(vec![0.0, 1.0, 2.0]));
    let filter = p.add_stage(CountingFilter::aware(Monitor::new()));
    p.connect(source, 0, filter, 0).unwrap();

    let err = p.update(filter, 0, UpdateRequest::whole().with_time(9.0)).unwrap_err();
    assert!(matches!(
        err.root(),
        PipelineError::Negotiation {
            source: NegotiationError::TimeOutOfRange { .. },
            ..
        }
    ));
    assert_eq!(p.execution_count(source).unwrap(), 0);
}

#[test]
fn test_malformed_piece_is_rejected() {
    let mut p = Pipeline::new();
    let source = p.add_stage(CountingSource::new(whole(), Monitor::new()));
    let err = p.update(source, 0, UpdateRequest::piece(4, 4)).unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Negotiation {
            source: NegotiationError::InvalidPiece { piece: 4, count: 4 },
            ..
        }
    ));
}

#[test]
fn test_clip_requests_only_its_region() {
    let mut p = Pipeline::new();
    let source = p.add_stage(SyntheticImage::new(whole()));
    let clip = p.add_stage(Clip::new(Extent::new(4, 7, 4, 7, 0, 0)));
    p.connect(source, 0, clip, 0).unwrap();

    let out = p.update(clip, 0, UpdateRequest::whole()).unwrap();
    assert_eq!(out.extent(), Some(Extent::new(4, 7, 4, 7, 0, 0)));
    let held = p.output_data(source, 0).unwrap().unwrap();
    assert_eq!(held.extent(), Some(Extent::new(4, 7, 4, 7, 0, 0)));
}

proptest! {
    #[test]
    fn prop_invariant_consumer_never_reruns_source(
        requests in proptest::collection::vec((0u32..8, 1u32..8), 1..12)
    ) {
        let sp = Monitor::new();
        let mut p = Pipeline::new();
        let source = p.add_stage(CountingSource::new(whole(), sp.clone()));
        let mid = p.add_stage(CountingFilter::invariant(Monitor::new()));
        p.connect(source, 0, mid, 0).unwrap();

        for (piece, count) in requests {
            let piece = piece % count;
            let out = p.update(mid, 0, UpdateRequest::piece(piece, count)).unwrap();
            let expected = whole().split(piece, count);
            prop_assert!(expected.is_none() || out.extent() == expected);
        }
        prop_assert_eq!(sp.executions(), 1);
    }
}
