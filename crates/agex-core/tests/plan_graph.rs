//! Dependency-graph behavior of `ExecutionPlan`.

use agex_core::{ExecutionPlan, Params, PlanError, StepId, StepStatus};

fn run_to_completion(plan: &mut ExecutionPlan, id: &StepId) {
    let step = plan.get_step_mut(id).unwrap();
    step.start().unwrap();
    step.complete("ok").unwrap();
}

fn chain() -> (ExecutionPlan, StepId, StepId, StepId) {
    let mut plan = ExecutionPlan::new("chain", Params::new());
    let s1 = plan.add_step("shell", Params::new(), "first", vec![]).id.clone();
    let s2 = plan
        .add_step("shell", Params::new(), "second", vec![s1.clone()])
        .id
        .clone();
    let s3 = plan
        .add_step("shell", Params::new(), "third", vec![s2.clone()])
        .id
        .clone();
    (plan, s1, s2, s3)
}

#[test]
fn linear_chain_unlocks_one_step_at_a_time() {
    let (mut plan, s1, s2, s3) = chain();
    assert!(plan.validate().is_ok());

    assert_eq!(plan.ready_step_ids(), vec![s1.clone()]);
    run_to_completion(&mut plan, &s1);
    assert_eq!(plan.ready_step_ids(), vec![s2.clone()]);
    run_to_completion(&mut plan, &s2);
    assert_eq!(plan.ready_step_ids(), vec![s3.clone()]);
    assert!(!plan.is_complete());
    run_to_completion(&mut plan, &s3);

    assert!(plan.is_complete());
    assert!(plan.ready_step_ids().is_empty());
    assert_eq!(plan.progress().completed, 3);
}

#[test]
fn step_ids_follow_insertion_sequence() {
    let (plan, s1, s2, s3) = chain();
    assert_eq!(s1.as_str(), "step_1");
    assert_eq!(s2.as_str(), "step_2");
    assert_eq!(s3.as_str(), "step_3");
    let ids: Vec<&str> = plan.steps().iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, ["step_1", "step_2", "step_3"]);
}

#[test]
fn independent_steps_are_ready_together_in_insertion_order() {
    let mut plan = ExecutionPlan::new("fan-out", Params::new());
    let a = plan.add_step("shell", Params::new(), "a", vec![]).id.clone();
    let b = plan.add_step("shell", Params::new(), "b", vec![]).id.clone();
    let join = plan
        .add_step("shell", Params::new(), "join", vec![a.clone(), b.clone()])
        .id
        .clone();

    assert_eq!(plan.ready_step_ids(), vec![a.clone(), b.clone()]);
    run_to_completion(&mut plan, &a);
    assert_eq!(plan.ready_step_ids(), vec![b.clone()]);
    assert_eq!(plan.blocked_steps().len(), 1);
    run_to_completion(&mut plan, &b);
    assert_eq!(plan.ready_step_ids(), vec![join]);
}

#[test]
fn failed_dependency_blocks_dependents_and_completes_nothing() {
    let (mut plan, s1, _, _) = chain();
    let step = plan.get_step_mut(&s1).unwrap();
    step.start().unwrap();
    step.fail("boom").unwrap();

    assert!(plan.ready_step_ids().is_empty());
    assert!(!plan.is_complete());
    assert_eq!(plan.blocked_steps().len(), 2);
    assert_eq!(plan.first_failure().unwrap().id, s1);
}

#[test]
fn cycle_is_reported_with_its_members() {
    let mut plan = ExecutionPlan::new("cycle", Params::new());
    plan.add_step("shell", Params::new(), "a", vec![StepId::from("step_2")]);
    plan.add_step("shell", Params::new(), "b", vec![StepId::from("step_1")]);
    plan.add_step("shell", Params::new(), "free", vec![]);

    match plan.validate() {
        Err(PlanError::CycleDetected { steps }) => {
            assert_eq!(steps, vec!["step_1".to_string(), "step_2".to_string()]);
        }
        other => panic!("expected cycle, got {other:?}"),
    }
    let ready = plan.ready_step_ids();
    assert_eq!(ready, vec![StepId::from("step_3")]);
}

#[test]
fn missing_dependency_is_rejected() {
    let mut plan = ExecutionPlan::new("missing", Params::new());
    plan.add_step("shell", Params::new(), "a", vec![StepId::from("step_9")]);
    assert!(matches!(
        plan.validate(),
        Err(PlanError::MissingDependency { .. })
    ));

    let err = plan
        .try_add_step("shell", Params::new(), "b", vec![StepId::from("nope")])
        .unwrap_err();
    assert!(matches!(err, PlanError::MissingDependency { .. }));
    assert_eq!(plan.len(), 1);
}

#[test]
fn retry_counter_never_exceeds_ceiling() {
    let mut plan = ExecutionPlan::new("retry", Params::new()).with_default_max_retries(2);
    let id = plan.add_step("shell", Params::new(), "flaky", vec![]).id.clone();

    for attempt in 0..3 {
        let step = plan.get_step_mut(&id).unwrap();
        step.start().unwrap();
        step.fail(format!("failure {attempt}")).unwrap();
        if attempt < 2 {
            step.reset_for_retry().unwrap();
            assert_eq!(step.status, StepStatus::Pending);
        }
    }

    let step = plan.get_step_mut(&id).unwrap();
    assert_eq!(step.retry_count, 2);
    assert!(matches!(
        step.reset_for_retry(),
        Err(PlanError::RetriesExhausted { max_retries: 2, .. })
    ));
    assert_eq!(step.status, StepStatus::Failed);
}

#[test]
fn illegal_transitions_are_rejected() {
    let (mut plan, s1, _, _) = chain();
    let step = plan.get_step_mut(&s1).unwrap();
    assert!(matches!(
        step.complete("early"),
        Err(PlanError::InvalidTransition { .. })
    ));
    step.start().unwrap();
    step.complete("done").unwrap();
    assert!(step.start().is_err());
    assert!(step.reset_for_retry().is_err());
    assert_eq!(step.result.as_deref(), Some("done"));
}

#[test]
fn skipped_step_counts_as_terminal() {
    let mut plan = ExecutionPlan::new("skip", Params::new());
    let id = plan.add_step("shell", Params::new(), "optional", vec![]).id.clone();
    plan.skip_step(&id).unwrap();
    assert!(plan.is_complete());
    assert_eq!(plan.progress().skipped, 1);
    assert!(plan.skip_step(&StepId::from("ghost")).is_err());
}

#[test]
fn summary_lists_steps_with_markers() {
    let (mut plan, s1, _, _) = chain();
    run_to_completion(&mut plan, &s1);
    let summary = plan.summary();
    assert!(summary.starts_with("Plan: chain"));
    assert!(summary.contains("Steps: 3"));
    assert!(summary.contains("[+] step_1: first"));
    assert!(summary.contains("[ ] step_2: second"));
}

#[test]
fn plan_survives_json_serialization() {
    let (plan, _, _, _) = chain();
    let json = serde_json::to_string(&plan).unwrap();
    let back: ExecutionPlan = serde_json::from_str(&json).unwrap();
    assert_eq!(back, plan);
}
