use chrono::Utc;
use proptest::prelude::*;
use sdk::errors::{EngineError, ForgeErrorExt};
use sdk::{RunManifest, RunStatus, StageName, StageResult, StageStatus};

fn status_strategy() -> impl Strategy<Value = StageStatus> {
    prop_oneof![
        Just(StageStatus::Ok),
        Just(StageStatus::Degraded),
        Just(StageStatus::Failed),
    ]
}

proptest! {
    // User hints never echo the error payload back
    #[test]
    fn test_error_user_hint_is_static(detail in "[a-z0-9_-]{8,32}") {
        let errs = vec![
            EngineError::Config(detail.clone()),
            EngineError::Database(detail.clone()),
            EngineError::JobNotFound(detail.clone()),
            EngineError::RunIncomplete(detail.clone()),
            EngineError::RunNotFound(std::path::PathBuf::from(&detail)),
            EngineError::RunDirectory(std::path::PathBuf::from(&detail), detail.clone()),
            EngineError::NoRunDirectory(detail.clone()),
            EngineError::Serialization(detail.clone()),
        ];

        for err in errs {
            let hint = err.user_hint();
            prop_assert!(!hint.is_empty());
            prop_assert!(!hint.contains(&detail));
        }
    }

    #[test]
    fn test_stage_outcome_matches_worst_stage(
        statuses in prop::collection::vec(status_strategy(), 0..=6),
    ) {
        let mut manifest = RunManifest::new("run-1", "todo app");
        for (name, status) in StageName::ALL.iter().zip(statuses.iter()) {
            manifest.stages.push(StageResult {
                stage: *name,
                status: *status,
                artifacts: vec![format!("{}.md", name)],
                error: None,
                providers: vec![],
                started_at: Utc::now(),
                finished_at: Utc::now(),
            });
        }

        let expected = if statuses.contains(&StageStatus::Failed) {
            RunStatus::Failed
        } else if statuses.contains(&StageStatus::Degraded) {
            RunStatus::Degraded
        } else {
            RunStatus::Succeeded
        };
        prop_assert_eq!(manifest.stage_outcome(), expected);
        prop_assert!(manifest.stages_in_order());

        // The report survives a trip through run_report.json unchanged
        manifest.finish(expected, "done");
        let json = serde_json::to_string(&manifest).unwrap();
        let parsed: RunManifest = serde_json::from_str(&json).unwrap();
        prop_assert_eq!(parsed.status, expected);
        prop_assert_eq!(parsed.stages.len(), statuses.len());
    }
}
