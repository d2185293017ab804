//! CLI smoke entry point.
//!
//! # Responsibility
//! - Verify `labspace_core` linkage without the Flutter/FFI runtime.
//! - Run one scripted lab session in memory and print its summary.

use labspace_core::{
    compute_category_stats, InMemoryLabRemote, LabEngine, LabId, LabRole, MutationOutcome,
    NotificationQueue, SessionCredentials,
};
use std::sync::Arc;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    println!("labspace_core ping={}", labspace_core::ping());
    println!("labspace_core version={}", labspace_core::core_version());

    let lab_id = LabId::new("smoke-lab");
    let remote = Arc::new(InMemoryLabRemote::new(lab_id.clone()));
    let notifications = Arc::new(NotificationQueue::new());
    let engine = LabEngine::new(
        lab_id,
        LabRole::Editor,
        remote.clone(),
        Arc::new(SessionCredentials::new("smoke-token")),
        notifications.clone(),
    );

    if let Err(err) = run_session(&engine).await {
        eprintln!("labspace_core smoke=failed reason={err}");
        std::process::exit(1);
    }

    let tree = engine.snapshot();
    let stats = compute_category_stats(tree.categories());
    println!(
        "labspace_core smoke=ok categories={} subjects={} remote_calls={} notifications={}",
        stats.total_categories,
        stats.total_subjects,
        remote.calls().len(),
        notifications.drain().len()
    );
}

async fn run_session(
    engine: &LabEngine<InMemoryLabRemote>,
) -> Result<(), labspace_core::EngineError> {
    engine.load().await?;
    let subject = match engine.add_subject("abc123", "Smoke subject", None).await? {
        MutationOutcome::SubjectAdded(subject) => subject,
        other => {
            println!("labspace_core add_subject outcome={other:?}");
            return Ok(());
        }
    };
    let category = match engine.create_category("Smoke bucket").await? {
        MutationOutcome::CategoryCreated(category) => category,
        other => {
            println!("labspace_core create_category outcome={other:?}");
            return Ok(());
        }
    };
    let tree = engine.snapshot();
    let Some(from) = tree.find_subject_category(subject).map(|found| found.id.clone()) else {
        return Ok(());
    };
    engine.move_subject(subject, &from, &category).await?;
    Ok(())
}
