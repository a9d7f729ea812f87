use std::io::Write;

use anyhow::Context as _;
use bqiam::{
    gcp::GcpClient,
    reconcile::{
        AssumeYes, BatchError, BatchOutcome, Confirm, DatasetBatch, Intent, ProjectBatch, Prompt,
        Reconciler,
    },
};

use crate::AccessTarget;

pub(crate) async fn run(intent: Intent, target: AccessTarget) -> anyhow::Result<()> {
    let client = GcpClient::from_default_credentials()
        .await
        .context("Failed to create GCP client")?;
    let reconciler = Reconciler::new(client.clone(), client);

    let stdin = std::io::stdin();
    let mut confirm: Box<dyn Confirm> = if target.assume_yes() {
        Box::new(AssumeYes(std::io::stdout()))
    } else {
        Box::new(Prompt::new(stdin.lock(), std::io::stdout()))
    };

    let result = match target {
        AccessTarget::Dataset {
            role,
            project,
            users,
            datasets,
            ..
        } => {
            let batch = DatasetBatch::builder()
                .project(project)
                .role(role)
                .datasets(datasets)
                .users(users)
                .build();
            match intent {
                Intent::Grant => reconciler.permit_datasets(&batch, confirm.as_mut()).await,
                Intent::Revoke => reconciler.revoke_datasets(&batch, confirm.as_mut()).await,
            }
        }
        AccessTarget::Project {
            role,
            project,
            users,
            ..
        } => {
            let batch = ProjectBatch::builder()
                .project(project)
                .role(role)
                .users(users)
                .build();
            match intent {
                Intent::Grant => reconciler.permit_project(&batch, confirm.as_mut()).await,
                Intent::Revoke => reconciler.revoke_project(&batch, confirm.as_mut()).await,
            }
        }
    };

    report(result, &mut std::io::stdout().lock())
}

impl AccessTarget {
    fn assume_yes(&self) -> bool {
        match self {
            AccessTarget::Dataset { yes, .. } | AccessTarget::Project { yes, .. } => *yes,
        }
    }
}

/// Print every completed step. Steps finished before a failure are printed
/// before the failure is returned.
fn report(
    result: Result<BatchOutcome, BatchError>,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    match result {
        Ok(BatchOutcome::Aborted) => {
            writeln!(out, "Abort.")?;
            Ok(())
        }
        Ok(BatchOutcome::Completed(steps)) => {
            for step in &steps {
                writeln!(out, "{step}")?;
            }
            Ok(())
        }
        Err(e) => {
            for step in &e.applied {
                writeln!(out, "{step}")?;
            }
            Err(e.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use bqiam::{
        ApiError, ApiErrorKind,
        principal::Principal,
        reconcile::{AccessGrant, Outcome, Reconciled, ReconcileError},
    };

    use super::*;

    fn step(entity: &str) -> Reconciled {
        Reconciled {
            intent: Intent::Grant,
            grant: AccessGrant::dataset("p1", "sales", "READER", entity),
            outcome: Outcome::Applied(Principal::qualify(entity)),
        }
    }

    #[test]
    fn test_aborted_batch_prints_abort() {
        let mut out = vec![];
        report(Ok(BatchOutcome::Aborted), &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "Abort.\n");
    }

    #[test]
    fn test_completed_steps_are_printed_in_order() {
        let mut out = vec![];
        report(
            Ok(BatchOutcome::Completed(vec![
                step("a@example.com"),
                step("b@example.com"),
            ])),
            &mut out,
        )
        .unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "Permit a@example.com to sales access as READER\n\
             Permit b@example.com to sales access as READER\n"
        );
    }

    #[test]
    fn test_applied_steps_are_printed_before_the_failure() {
        let mut out = vec![];
        let err = report(
            Err(BatchError {
                applied: vec![step("a@example.com")],
                source: ReconcileError::Fetch {
                    resource: "p1:ads".to_string(),
                    source: ApiError::new(ApiErrorKind::NotFound, "get dataset", "Not found"),
                },
            }),
            &mut out,
        )
        .unwrap_err();

        assert_eq!(
            String::from_utf8(out).unwrap(),
            "Permit a@example.com to sales access as READER\n"
        );
        assert!(err.to_string().contains("Stopped after 1 completed step(s)"));
    }
}
