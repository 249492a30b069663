use std::sync::atomic::Ordering;
use vizflow_core::PassKind;
use vizflow_pipeline::prelude::*;
use vizflow_test_utils::{CountingFilter, CountingSource, FailingStage, Monitor};

fn whole() -> Extent {
    Extent::new(0, 7, 0, 7, 0, 0)
}

#[test]
fn test_failed_stage_is_invalid_and_retried() {
    let (sp, xp) = (Monitor::new(), Monitor::new());
    let mut p = Pipeline::new();
    let source = p.add_stage(CountingSource::new(whole(), sp.clone()));
    let (failing, switch) = FailingStage::new(xp.clone());
    let failing = p.add_stage(failing);
    p.connect(source, 0, failing, 0).unwrap();

    let err = p.update(failing, 0, UpdateRequest::whole()).unwrap_err();
    assert!(matches!(err, PipelineError::Execution { stage, .. } if stage == failing));
    assert_eq!(p.port_state(failing, 0).unwrap(), PortState::Invalid);
    assert_eq!(p.port_state(source, 0).unwrap(), PortState::Valid);

    // Invalid output is never served from cache.
    assert!(p.update(failing, 0, UpdateRequest::whole()).is_err());
    assert_eq!(xp.executions(), 2);
    assert_eq!(sp.executions(), 1);

    switch.store(false, Ordering::SeqCst);
    p.update(failing, 0, UpdateRequest::whole()).unwrap();
    assert_eq!(p.port_state(failing, 0).unwrap(), PortState::Valid);
    assert_eq!(xp.executions(), 3);
    assert_eq!(sp.executions(), 1);
}

#[test]
fn test_failure_does_not_disturb_sibling_cache() {
    let (sp, op) = (Monitor::new(), Monitor::new());
    let mut p = Pipeline::new();
    let source = p.add_stage(CountingSource::new(whole(), sp.clone()));
    let (failing, _switch) = FailingStage::new(Monitor::new());
    let failing = p.add_stage(failing);
    let other = p.add_stage(CountingFilter::invariant(op.clone()));
    p.connect(source, 0, failing, 0).unwrap();
    p.connect(source, 0, other, 0).unwrap();

    let cached = p.update(other, 0, UpdateRequest::whole()).unwrap();
    assert!(p.update(failing, 0, UpdateRequest::whole()).is_err());

    let again = p.update(other, 0, UpdateRequest::whole()).unwrap();
    assert!(std::sync::Arc::ptr_eq(&cached, &again));
    assert_eq!((sp.executions(), op.executions()), (1, 1));
}

#[test]
fn test_downstream_of_failure_reports_origin() {
    let fp = Monitor::new();
    let mut p = Pipeline::new();
    let source = p.add_stage(CountingSource::new(whole(), Monitor::new()));
    let (failing, switch) = FailingStage::new(Monitor::new());
    let failing = p.add_stage(failing);
    let sink = p.add_stage(CountingFilter::invariant(fp.clone()));
    p.connect(source, 0, failing, 0).unwrap();
    p.connect(failing, 0, sink, 0).unwrap();

    let err = p.update(sink, 0, UpdateRequest::whole()).unwrap_err();
    match &err {
        PipelineError::UpstreamFailed { stage, upstream, .. } => {
            assert_eq!(*stage, sink);
            assert_eq!(*upstream, failing);
        }
        other => panic!("unexpected error {other}"),
    }
    assert_eq!(err.failed_stage(), Some(failing));
    assert!(matches!(err.root(), PipelineError::Execution { .. }));
    assert_eq!(fp.executions(), 0);

    let pull = p.trace().last_pull().unwrap();
    let skipped = p
        .trace()
        .events_for_pull(pull)
        .into_iter()
        .any(|e| e.stage == sink && e.pass == PassKind::Execute && e.outcome == PassOutcome::Skipped);
    assert!(skipped);

    switch.store(false, Ordering::SeqCst);
    p.update(sink, 0, UpdateRequest::whole()).unwrap();
    assert_eq!(fp.executions(), 1);
}

#[test]
fn test_unconnected_required_input_fails_pull() {
    let mut p = Pipeline::new();
    let filter = p.add_stage(CountingFilter::aware(Monitor::new()));
    let err = p.update(filter, 0, UpdateRequest::whole()).unwrap_err();
    assert!(matches!(err, PipelineError::MissingInput { stage, .. } if stage == filter));
}

#[test]
fn test_unknown_stage_and_port() {
    let mut p = Pipeline::new();
    let source = p.add_stage(CountingSource::new(whole(), Monitor::new()));
    assert!(matches!(
        p.update(source, 3, UpdateRequest::whole()),
        Err(PipelineError::InvalidPort { port: 3, .. })
    ));
    p.remove_stage(source).unwrap();
    assert!(matches!(
        p.update(source, 0, UpdateRequest::whole()),
        Err(PipelineError::UnknownStage(_))
    ));
}
