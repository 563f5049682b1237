use super::{parked_backend, test_runtime};
use quill_core::api::{Backend, MockBackend};
use quill_core::notify::NotificationCenter;
use quill_core::wizard::{ProjectWizard, WizardStep};
use std::path::PathBuf;
use std::sync::Arc;

fn wizard() -> (ProjectWizard, Arc<MockBackend>, NotificationCenter) {
    let backend = Arc::new(MockBackend::new());
    let notifier = NotificationCenter::new();
    let wizard = ProjectWizard::new(backend.clone(), notifier.clone());
    (wizard, backend, notifier)
}

fn paths(names: &[&str]) -> Vec<PathBuf> {
    names.iter().map(PathBuf::from).collect()
}

/// Upload `count` pdf files through the mock and pull them into the table.
async fn seed_files(wizard: &ProjectWizard, backend: &MockBackend, count: usize) {
    let paths: Vec<PathBuf> = (0..count).map(|i| PathBuf::from(format!("doc{i}.pdf"))).collect();
    backend.upload_files(&paths).await.expect("upload");
    wizard.refresh_files().await.expect("refresh");
}

#[test]
fn intake_partitions_a_mixed_batch() {
    let runtime = test_runtime();
    let (wizard, backend, notifier) = wizard();
    runtime.block_on(seed_files(&wizard, &backend, 1));

    let outcome = wizard.handle_files(&paths(&[
        "report.pdf",
        "doc0.pdf",     // already on the server
        "image.png",    // unsupported
        "notes.TXT",    // extension check is case-insensitive
    ]));
    assert_eq!(outcome.accepted, paths(&["report.pdf", "notes.TXT"]));
    assert_eq!(outcome.duplicates, vec!["doc0.pdf"]);
    assert_eq!(outcome.unsupported, vec!["image.png"]);

    let messages: Vec<String> = notifier.snapshot().iter().map(|n| n.message.clone()).collect();
    assert!(messages
        .contains(&"Unsupported format: image.png. Supported formats: pdf, docx, txt".to_string()));
    assert!(messages.contains(&"Duplicate files: doc0.pdf. These files already exist.".to_string()));
}

#[test]
fn a_staged_file_is_a_duplicate_of_itself() {
    let (wizard, _backend, _notifier) = wizard();

    let first = wizard.handle_files(&paths(&["a.pdf"]));
    assert_eq!(first.accepted.len(), 1);
    let second = wizard.handle_files(&paths(&["a.pdf"]));
    assert_eq!(second.duplicates, vec!["a.pdf"]);
    assert_eq!(wizard.pending_upload().len(), 1);
}

#[test]
fn staged_files_can_be_removed_before_upload() {
    let (wizard, _backend, _notifier) = wizard();

    wizard.handle_files(&paths(&["a.pdf", "b.pdf", "c.pdf"]));
    wizard.remove_pending(1);
    assert_eq!(wizard.pending_upload(), paths(&["a.pdf", "c.pdf"]));
    wizard.clear_pending();
    assert!(wizard.pending_upload().is_empty());
}

#[test]
fn upload_clears_the_staged_batch_and_refreshes() {
    let runtime = test_runtime();
    let (wizard, _backend, notifier) = wizard();

    wizard.handle_files(&paths(&["a.pdf", "b.txt"]));
    runtime.block_on(wizard.upload_staged()).expect("upload");
    assert!(wizard.pending_upload().is_empty());
    assert_eq!(wizard.files().len(), 2);
    assert!(notifier
        .snapshot()
        .iter()
        .any(|n| n.message == "Files uploaded successfully"));
}

#[test]
fn failed_upload_clears_the_staged_batch_too() {
    let runtime = test_runtime();
    let (wizard, backend, notifier) = wizard();

    wizard.handle_files(&paths(&["a.pdf"]));
    backend.set_fail_requests(true);
    runtime.block_on(wizard.upload_staged()).expect("upload");
    assert!(wizard.pending_upload().is_empty());
    assert!(notifier
        .snapshot()
        .iter()
        .any(|n| n.message == "File upload failed. Please try again."));
}

#[test]
fn fourth_file_selection_is_rejected() {
    let runtime = test_runtime();
    let (wizard, backend, notifier) = wizard();
    runtime.block_on(seed_files(&wizard, &backend, 4));
    let ids: Vec<i64> = wizard.files().iter().map(|f| f.file_id).collect();

    assert!(wizard.toggle_file(ids[0], true));
    assert!(wizard.toggle_file(ids[1], true));
    assert!(wizard.toggle_file(ids[2], true));
    assert!(!wizard.toggle_file(ids[3], true));
    assert_eq!(wizard.selected_file_ids().len(), 3);
    assert!(notifier
        .snapshot()
        .iter()
        .any(|n| n.message == "You can select a maximum of 3 files for a project."));
}

#[test]
fn picking_a_project_warns_but_keeps_file_checks() {
    let runtime = test_runtime();
    let (wizard, backend, notifier) = wizard();
    runtime.block_on(seed_files(&wizard, &backend, 2));
    let ids: Vec<i64> = wizard.files().iter().map(|f| f.file_id).collect();
    let project_id = runtime.block_on(async {
        backend
            .create_project("Existing", &ids[..1])
            .await
            .expect("create")
            .project_id
    });
    runtime.block_on(wizard.refresh_projects()).expect("refresh");

    wizard.toggle_file(ids[1], true);
    wizard.toggle_project(project_id, true);
    assert_eq!(wizard.selected_project_id(), Some(project_id));
    assert_eq!(wizard.selected_file_ids(), vec![ids[1]]);
    assert!(notifier.snapshot().iter().any(|n| n.message
        == "Selecting a project will ignore the selected files and join the chosen project instead."));
}

#[test]
fn deleting_the_last_row_of_a_trailing_page_steps_back() {
    let runtime = test_runtime();
    let (wizard, backend, _notifier) = wizard();
    runtime.block_on(seed_files(&wizard, &backend, 6));
    assert_eq!(wizard.total_pages(), 2);

    wizard.go_to_last_page();
    assert_eq!(wizard.current_page(), 2);
    let last_id = wizard.page_rows()[0].file_id;
    runtime.block_on(wizard.delete_file(last_id)).expect("delete");

    assert_eq!(wizard.files().len(), 5);
    assert_eq!(wizard.total_pages(), 1);
    assert_eq!(wizard.current_page(), 1);
}

#[test]
fn page_navigation_clamps_to_bounds() {
    let runtime = test_runtime();
    let (wizard, backend, _notifier) = wizard();
    runtime.block_on(seed_files(&wizard, &backend, 7));

    wizard.go_to_previous_page();
    assert_eq!(wizard.current_page(), 1);
    wizard.go_to_page(99);
    assert_eq!(wizard.current_page(), 2);
    wizard.go_to_next_page();
    assert_eq!(wizard.current_page(), 2);
    assert_eq!(wizard.page_rows().len(), 2);
}

#[test]
fn step_one_requires_projects_or_selected_files() {
    let (wizard, _backend, notifier) = wizard();

    assert!(!wizard.next_step());
    assert_eq!(wizard.step(), WizardStep::SelectProjectOrFiles);
    assert!(notifier.snapshot().iter().any(|n| n.message
        == "No existing project allocated to the user. Please select files to proceed."));
}

#[test]
fn step_two_requires_a_confirmed_selection() {
    let runtime = test_runtime();
    let (wizard, backend, notifier) = wizard();
    runtime.block_on(seed_files(&wizard, &backend, 1));
    let id = wizard.files()[0].file_id;

    wizard.toggle_file(id, true);
    assert!(wizard.next_step());
    wizard.toggle_file(id, false);
    assert!(!wizard.next_step());
    assert_eq!(wizard.step(), WizardStep::ConfirmSelection);
    assert!(notifier.snapshot().iter().any(|n| n.message
        == "Please select a project or select files to create a new project to proceed."));
}

#[test]
fn stepping_back_from_confirm_resets_the_selection() {
    let runtime = test_runtime();
    let (wizard, backend, _notifier) = wizard();
    runtime.block_on(seed_files(&wizard, &backend, 1));
    let id = wizard.files()[0].file_id;

    wizard.toggle_file(id, true);
    wizard.set_project_name("Draft");
    assert!(wizard.next_step());
    wizard.previous_step();
    assert_eq!(wizard.step(), WizardStep::SelectProjectOrFiles);
    assert!(wizard.selected_file_ids().is_empty());
    assert!(wizard.project_name().is_empty());
}

#[test]
fn confirm_creates_a_project_and_resets_the_flow() {
    let runtime = test_runtime();
    let (wizard, backend, notifier) = wizard();
    runtime.block_on(seed_files(&wizard, &backend, 2));
    let ids: Vec<i64> = wizard.files().iter().map(|f| f.file_id).collect();

    wizard.toggle_file(ids[0], true);
    wizard.toggle_file(ids[1], true);
    assert!(wizard.next_step());
    assert!(wizard.next_step());
    assert_eq!(wizard.step(), WizardStep::CreateOrJoin);
    let draft = wizard.current_project().expect("draft");
    assert_eq!(draft.project_id, 0);
    assert_eq!(draft.file_names.len(), 2);

    wizard.set_project_name("Research");
    let project_id = runtime
        .block_on(wizard.confirm_project_action())
        .expect("confirm");
    assert!(project_id.is_some());
    assert_eq!(wizard.step(), WizardStep::SelectProjectOrFiles);
    assert!(wizard.selected_file_ids().is_empty());
    assert!(notifier
        .snapshot()
        .iter()
        .any(|n| n.message == "Project created successfully!"));
}

#[test]
fn a_second_confirmation_is_suppressed_while_one_is_in_flight() {
    let runtime = test_runtime();
    let (backend, release) = parked_backend();
    let notifier = NotificationCenter::new();
    let wizard = ProjectWizard::new(backend.clone(), notifier.clone());
    runtime.block_on(async {
        backend
            .inner
            .upload_files(&paths(&["doc0.pdf"]))
            .await
            .expect("upload");
        wizard.refresh_files().await.expect("refresh");
    });
    wizard.toggle_file(wizard.files()[0].file_id, true);
    wizard.set_project_name("Research");

    runtime.block_on(async {
        let first = {
            let wizard = wizard.clone();
            tokio::spawn(async move { wizard.confirm_project_action().await })
        };
        // let the first confirmation run up to the parked backend call
        tokio::task::yield_now().await;

        let second = wizard.confirm_project_action().await.expect("confirm");
        assert_eq!(second, None);

        release.notify_one();
        let created = first.await.expect("join").expect("confirm");
        assert!(created.is_some());
    });

    // exactly one create call fired
    runtime.block_on(wizard.refresh_projects()).expect("refresh");
    assert_eq!(wizard.project_count(), 1);
    assert!(notifier
        .snapshot()
        .iter()
        .any(|n| n.message == "Project created successfully!"));
}

#[test]
fn confirm_requires_a_project_name_for_a_create() {
    let runtime = test_runtime();
    let (wizard, backend, notifier) = wizard();
    runtime.block_on(seed_files(&wizard, &backend, 1));
    wizard.toggle_file(wizard.files()[0].file_id, true);

    let outcome = runtime
        .block_on(wizard.confirm_project_action())
        .expect("confirm");
    assert!(outcome.is_none());
    assert!(notifier
        .snapshot()
        .iter()
        .any(|n| n.message == "Please enter a project name."));
}

#[test]
fn a_selected_project_wins_over_checked_files() {
    let runtime = test_runtime();
    let (wizard, backend, notifier) = wizard();
    runtime.block_on(seed_files(&wizard, &backend, 2));
    let ids: Vec<i64> = wizard.files().iter().map(|f| f.file_id).collect();
    let existing = runtime.block_on(async {
        backend
            .create_project("Existing", &ids[..1])
            .await
            .expect("create")
            .project_id
    });
    runtime.block_on(wizard.refresh_projects()).expect("refresh");

    wizard.toggle_file(ids[1], true);
    wizard.toggle_project(existing, true);
    let joined = runtime
        .block_on(wizard.confirm_project_action())
        .expect("confirm");
    assert_eq!(joined, Some(existing));
    assert!(notifier
        .snapshot()
        .iter()
        .any(|n| n.message == "Joined project successfully!"));
    // only the one seeded project exists, so nothing new was created
    runtime.block_on(wizard.refresh_projects()).expect("refresh");
    assert_eq!(wizard.project_count(), 1);
}

#[test]
fn deleting_the_selected_project_returns_to_confirm() {
    let runtime = test_runtime();
    let (wizard, backend, _notifier) = wizard();
    runtime.block_on(seed_files(&wizard, &backend, 1));
    let id = wizard.files()[0].file_id;
    let project_id = runtime.block_on(async {
        backend
            .create_project("Doomed", &[id])
            .await
            .expect("create")
            .project_id
    });
    runtime.block_on(wizard.refresh_projects()).expect("refresh");

    wizard.toggle_project(project_id, true);
    assert!(wizard.next_step());
    assert!(wizard.next_step());
    runtime
        .block_on(wizard.delete_project(project_id))
        .expect("delete");
    assert_eq!(wizard.step(), WizardStep::ConfirmSelection);
    assert_eq!(wizard.selected_project_id(), None);
    assert_eq!(wizard.project_count(), 0);
}
