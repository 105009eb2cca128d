use approx::assert_relative_eq;
use modelverse_core::domain::*;
use rstest::rstest;
use uuid::Uuid;

fn scored(choice: ExtractedChoice, correct: char) -> Answer {
    Answer::new(
        "Which option?".to_string(),
        vec!["w".into(), "x".into(), "y".into(), "z".into()],
        choice.to_string(),
        choice,
        correct,
        0.1,
    )
}

fn subject(name: &str, correct: usize, total: usize) -> SubjectResult {
    let mut result = SubjectResult::new(name);
    for i in 0..total {
        let choice = if i < correct {
            ExtractedChoice::Letter('A')
        } else {
            ExtractedChoice::Letter('B')
        };
        result.record(scored(choice, 'A'));
    }
    result
}

// ===== ID Tests =====

#[test]
fn test_task_id_conversions() {
    let uuid = Uuid::new_v4();
    let id = TaskId::from_uuid(uuid);

    assert_eq!(id.as_uuid(), &uuid);

    let id2: TaskId = uuid.into();
    assert_eq!(id, id2);

    let uuid2: Uuid = id.into();
    assert_eq!(uuid, uuid2);
}

#[test]
fn test_task_id_display() {
    let uuid = Uuid::new_v4();
    let id = TaskId::from_uuid(uuid);
    assert_eq!(id.to_string(), uuid.to_string());
    assert_eq!(id.short().len(), 8);
}

// ===== Status Tests =====

#[rstest]
#[case(TaskStatus::Pending, TaskStatus::Starting, true)]
#[case(TaskStatus::Starting, TaskStatus::Running, true)]
#[case(TaskStatus::Running, TaskStatus::Completed, true)]
#[case(TaskStatus::Running, TaskStatus::Failed, true)]
#[case(TaskStatus::Starting, TaskStatus::Stopped, true)]
#[case(TaskStatus::Running, TaskStatus::Starting, false)]
#[case(TaskStatus::Stopped, TaskStatus::Running, false)]
#[case(TaskStatus::Failed, TaskStatus::Completed, false)]
#[case(TaskStatus::Completed, TaskStatus::Stopped, false)]
fn test_status_transitions(
    #[case] from: TaskStatus,
    #[case] to: TaskStatus,
    #[case] allowed: bool,
) {
    assert_eq!(from.can_transition_to(to), allowed);
}

#[rstest]
#[case(TaskStatus::Pending, "pending")]
#[case(TaskStatus::Starting, "starting")]
#[case(TaskStatus::Running, "running")]
#[case(TaskStatus::Stopped, "stopped")]
fn test_status_display(#[case] status: TaskStatus, #[case] expected: &str) {
    assert_eq!(status.to_string(), expected);
}

// ===== Aggregation Tests =====

#[test]
fn test_micro_and_macro_accuracy() {
    let mut result = EvaluationResult::new(BenchmarkKind::Mmlu);
    result.push(subject("s1", 3, 4));
    result.push(subject("s2", 1, 2));

    assert_relative_eq!(result.macro_accuracy(), 0.625);
    assert_relative_eq!(result.micro_accuracy(), 4.0 / 6.0);
    assert_eq!(result.total_correct(), 4);
    assert_eq!(result.total_questions(), 6);
}

#[test]
fn test_empty_subject_counts_as_zero_in_macro() {
    let mut result = EvaluationResult::new(BenchmarkKind::Mmlu);
    result.push(subject("full", 2, 2));
    result.push(SubjectResult::new("aborted"));

    assert_relative_eq!(result.macro_accuracy(), 0.5);
    assert_relative_eq!(result.micro_accuracy(), 1.0);
}

#[test]
fn test_empty_result_is_all_zero() {
    let result = EvaluationResult::new(BenchmarkKind::MmluPro);
    assert_eq!(result.micro_accuracy(), 0.0);
    assert_eq!(result.macro_accuracy(), 0.0);
    assert_eq!(result.unknown_rate(), 0.0);
}

#[test]
fn test_overall_unknown_rate() {
    let mut s1 = SubjectResult::new("s1");
    s1.record(scored(ExtractedChoice::Unknown, 'A'));
    s1.record(scored(ExtractedChoice::Letter('A'), 'A'));
    let mut s2 = SubjectResult::new("s2");
    s2.record(scored(ExtractedChoice::Letter('C'), 'A'));
    s2.record(scored(ExtractedChoice::Letter('C'), 'C'));

    let mut result = EvaluationResult::new(BenchmarkKind::Mmlu);
    result.push(s1);
    result.push(s2);

    assert_relative_eq!(result.unknown_rate(), 0.25);
}

// ===== Dataset Tests =====

#[test]
fn test_mmlu_pro_accepts_late_letters() {
    let choices: Vec<String> = (0..10).map(|i| format!("opt {i}")).collect();
    let sample = Sample::new("q", choices, 9);
    let letters = BenchmarkKind::MmluPro.option_letters();

    assert!(sample.validate(letters).is_ok());
    assert_eq!(sample.correct_letter(letters), Some('J'));
    assert!(sample.validate(BenchmarkKind::Mmlu.option_letters()).is_err());
}
