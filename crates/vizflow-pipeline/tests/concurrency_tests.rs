use std::sync::Arc;
use vizflow_pipeline::prelude::*;
use vizflow_test_utils::{first_value, CountingFilter, CountingSource, Monitor};

fn whole() -> Extent {
    Extent::new(0, 31, 0, 31, 0, 0)
}

fn chain(p: &mut Pipeline, sp: &Monitor, fp: &Monitor) -> StageId {
    let source = p.add_stage(CountingSource::new(whole(), sp.clone()));
    let filter = p.add_stage(CountingFilter::aware(fp.clone()));
    p.connect(source, 0, filter, 0).unwrap();
    filter
}

#[test]
fn test_disjoint_pulls_run_concurrently() {
    let monitors: Vec<(Monitor, Monitor)> = (0..4).map(|_| (Monitor::new(), Monitor::new())).collect();
    let mut p = Pipeline::new();
    let sinks: Vec<StageId> = monitors.iter().map(|(sp, fp)| chain(&mut p, sp, fp)).collect();

    std::thread::scope(|scope| {
        for sink in &sinks {
            let p = &p;
            scope.spawn(move || {
                for _ in 0..10 {
                    let out = p.update(*sink, 0, UpdateRequest::whole()).unwrap();
                    assert_eq!(first_value(&out), Some(2.0));
                }
            });
        }
    });

    for (sp, fp) in &monitors {
        assert_eq!((sp.executions(), fp.executions()), (1, 1));
    }
}

#[test]
fn test_overlapping_pulls_execute_once() {
    let (sp, fp) = (Monitor::new(), Monitor::new());
    let mut p = Pipeline::new();
    let sink = chain(&mut p, &sp, &fp);

    let results: Vec<Arc<DataObject>> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| scope.spawn(|| p.update(sink, 0, UpdateRequest::whole()).unwrap()))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!((sp.executions(), fp.executions()), (1, 1));
    assert!(results.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
}

#[test]
fn test_parallel_levels_match_sequential() {
    let run = |parallel: bool| {
        let monitors: Vec<Monitor> = (0..3).map(|_| Monitor::new()).collect();
        let mut p = Pipeline::with_config(PipelineConfig::default().with_parallel_execution(parallel));
        let source = p.add_stage(CountingSource::new(whole(), monitors[0].clone()));
        let left = p.add_stage(CountingFilter::invariant(monitors[1].clone()));
        let right = p.add_stage(CountingFilter::aware(monitors[2].clone()));
        let group = p.add_stage(Group::new());
        p.connect(source, 0, left, 0).unwrap();
        p.connect(source, 0, right, 0).unwrap();
        p.connect(left, 0, group, 0).unwrap();
        p.connect(right, 0, group, 0).unwrap();

        let out = p.update(group, 0, UpdateRequest::whole()).unwrap();
        let leaves: Vec<Option<f64>> = out
            .composite()
            .unwrap()
            .leaves()
            .iter()
            .map(|leaf| leaf.data.and_then(|d| first_value(d)))
            .collect();
        let counts: Vec<usize> = monitors.iter().map(Monitor::executions).collect();
        (leaves, counts)
    };

    let sequential = run(false);
    let parallel = run(true);
    assert_eq!(sequential, parallel);
    assert_eq!(parallel.0, vec![Some(2.0), Some(2.0)]);
    assert_eq!(parallel.1, vec![1, 1, 1]);
}
