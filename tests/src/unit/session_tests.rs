use super::{parked_backend, test_runtime};
use quill_core::api::{Backend, ChatRequest, MockBackend};
use quill_core::notify::NotificationCenter;
use quill_core::session::{ChatController, MessageRole, Surface};
use quill_core::store::{self, CredentialStore};
use std::sync::Arc;
use tempfile::TempDir;

fn controller(surface: Surface) -> (ChatController, Arc<MockBackend>, NotificationCenter) {
    let backend = Arc::new(MockBackend::new());
    let notifier = NotificationCenter::new();
    let store = CredentialStore::in_memory();
    let controller = ChatController::new(surface, backend.clone(), notifier.clone(), store);
    (controller, backend, notifier)
}

/// Create one project with one file through the mock and return its id.
async fn seed_project(backend: &MockBackend) -> i64 {
    backend
        .upload_files(&[std::path::PathBuf::from("notes.pdf")])
        .await
        .expect("upload");
    let files = backend.list_files().await.expect("files");
    let created = backend
        .create_project("Notes", &[files.files[0].file_id])
        .await
        .expect("create");
    created.project_id
}

#[test]
fn wiki_surface_provisions_and_persists_a_session() {
    let runtime = test_runtime();
    let backend = Arc::new(MockBackend::new());
    let notifier = NotificationCenter::new();
    let store = CredentialStore::in_memory();
    let controller = ChatController::new(
        Surface::Wikipedia,
        backend.clone(),
        notifier.clone(),
        store.clone(),
    );

    runtime.block_on(controller.ensure_session()).expect("session");
    let session_id = controller.session_id().expect("session id");
    assert_eq!(store.get(store::SESSION_ID).as_deref(), Some(&*session_id));

    // a second controller on the same store reuses the id
    let again = ChatController::new(Surface::Wikipedia, backend, notifier, store);
    runtime.block_on(again.ensure_session()).expect("session");
    assert_eq!(again.session_id().as_deref(), Some(&*session_id));
}

#[test]
fn open_project_loads_session_files_and_history() {
    let runtime = test_runtime();
    let (controller, backend, _notifier) = controller(Surface::Document);
    let project_id = runtime.block_on(seed_project(&backend));

    // seed one exchange directly through the backend
    runtime.block_on(async {
        let details = backend.get_project(project_id).await.expect("details");
        let session_id = details.session_id.expect("session");
        backend
            .document_chat(&ChatRequest {
                session_id,
                question: "what is in the notes?".to_string(),
            })
            .await
            .expect("chat");
    });

    runtime
        .block_on(controller.open_project(project_id))
        .expect("open");
    assert_eq!(controller.file_names(), vec!["notes.pdf".to_string()]);
    let messages = controller.messages();
    assert_eq!(messages.len(), 2);
    // server order is oldest-first; the controller renders newest-first
    assert_eq!(messages[0].role, MessageRole::Assistant);
    assert_eq!(messages[1].role, MessageRole::User);
}

#[test]
fn open_project_reports_an_unknown_project() {
    let runtime = test_runtime();
    let (controller, _backend, notifier) = controller(Surface::Document);

    runtime.block_on(controller.open_project(99)).expect("open");
    assert!(controller.session_id().is_none());
    assert!(notifier
        .snapshot()
        .iter()
        .any(|n| n.message == "Failed to retrieve project details. Please try again."));
}

#[test]
fn send_prepends_user_then_assistant() {
    let runtime = test_runtime();
    let (controller, backend, _notifier) = controller(Surface::Document);
    let project_id = runtime.block_on(seed_project(&backend));
    runtime
        .block_on(controller.open_project(project_id))
        .expect("open");

    runtime
        .block_on(controller.send_message("  hello there  "))
        .expect("send");
    let messages = controller.messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].role, MessageRole::Assistant);
    assert_eq!(messages[1].role, MessageRole::User);
    assert_eq!(messages[1].text, "hello there");
    assert!(!controller.input_disabled());
}

#[test]
fn blank_input_is_ignored() {
    let runtime = test_runtime();
    let (controller, _backend, notifier) = controller(Surface::Document);
    controller.set_session("session-1");

    runtime.block_on(controller.send_message("   ")).expect("send");
    assert!(controller.messages().is_empty());
    assert!(notifier.snapshot().is_empty());
}

#[test]
fn send_without_a_session_notifies() {
    let runtime = test_runtime();
    let (controller, _backend, notifier) = controller(Surface::Document);

    runtime.block_on(controller.send_message("hi")).expect("send");
    assert!(controller.messages().is_empty());
    assert!(notifier
        .snapshot()
        .iter()
        .any(|n| n.message == "Session ID is missing. Cannot send message."));
}

#[test]
fn a_second_send_is_rejected_while_one_is_in_flight() {
    let runtime = test_runtime();
    let (backend, release) = parked_backend();
    let notifier = NotificationCenter::new();
    let store = CredentialStore::in_memory();
    let controller = ChatController::new(Surface::Document, backend.clone(), notifier, store);
    let project_id = runtime.block_on(seed_project(&backend.inner));
    runtime
        .block_on(controller.open_project(project_id))
        .expect("open");

    runtime.block_on(async {
        let first = {
            let controller = controller.clone();
            tokio::spawn(async move { controller.send_message("first question").await })
        };
        // let the first send run up to the parked backend call
        tokio::task::yield_now().await;
        assert!(controller.input_disabled());

        controller
            .send_message("second question")
            .await
            .expect("send");
        let messages = controller.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].text, "first question");

        release.notify_one();
        first.await.expect("join").expect("send");
    });

    let messages = controller.messages();
    assert_eq!(messages.len(), 2);
    assert!(messages.iter().all(|m| m.text != "second question"));
    assert!(!controller.input_disabled());
}

#[test]
fn failed_send_keeps_the_user_entry_and_reenables_input() {
    let runtime = test_runtime();
    let (controller, backend, notifier) = controller(Surface::Document);
    let project_id = runtime.block_on(seed_project(&backend));
    runtime
        .block_on(controller.open_project(project_id))
        .expect("open");

    backend.set_fail_requests(true);
    runtime
        .block_on(controller.send_message("doomed question"))
        .expect("send");
    let messages = controller.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].role, MessageRole::User);
    assert_eq!(messages[0].text, "doomed question");
    assert!(!controller.input_disabled());
    assert!(notifier
        .snapshot()
        .iter()
        .any(|n| n.message == "Failed to send message. Please try again."));
}

#[test]
fn wiki_replies_carry_url_citations() {
    let runtime = test_runtime();
    let (controller, _backend, _notifier) = controller(Surface::Wikipedia);
    runtime.block_on(controller.ensure_session()).expect("session");

    runtime
        .block_on(controller.send_message("rust the language"))
        .expect("send");
    let messages = controller.messages();
    assert_eq!(messages[0].role, MessageRole::Assistant);
    match &messages[0].citations[0] {
        quill_core::session::Citation::Wiki { url, id } => {
            assert!(url.starts_with("https://"));
            assert_eq!(*id, Some(1));
        }
        other => panic!("expected a wiki citation, got {other:?}"),
    }
}

#[test]
fn export_writes_text_and_pdf_transcripts() {
    use quill_core::export::ExportFormat;

    let runtime = test_runtime();
    let (controller, backend, _notifier) = controller(Surface::Document);
    let project_id = runtime.block_on(seed_project(&backend));
    runtime
        .block_on(controller.open_project(project_id))
        .expect("open");
    runtime
        .block_on(controller.send_message("summarize the notes"))
        .expect("send");

    let out = TempDir::new().expect("temp dir");
    let session_id = controller.session_id().expect("session id");

    let text_path = runtime
        .block_on(controller.export_transcript(ExportFormat::Text, out.path()))
        .expect("export")
        .expect("path");
    assert_eq!(
        text_path.file_name().and_then(|n| n.to_str()),
        Some(format!("chat_history_{session_id}.txt").as_str())
    );
    let text = std::fs::read_to_string(&text_path).expect("read");
    assert!(text.starts_with("Chat History\n\n"));
    assert!(text.contains("summarize the notes"));

    let pdf_path = runtime
        .block_on(controller.export_transcript(ExportFormat::Pdf, out.path()))
        .expect("export")
        .expect("path");
    let pdf = std::fs::read(&pdf_path).expect("read");
    assert!(pdf.starts_with(b"%PDF-1.4"));
}

#[test]
fn export_refuses_an_empty_history() {
    use quill_core::export::ExportFormat;

    let runtime = test_runtime();
    let (controller, backend, notifier) = controller(Surface::Document);
    let project_id = runtime.block_on(seed_project(&backend));
    runtime
        .block_on(controller.open_project(project_id))
        .expect("open");

    let out = TempDir::new().expect("temp dir");
    let written = runtime
        .block_on(controller.export_transcript(ExportFormat::Text, out.path()))
        .expect("export");
    assert!(written.is_none());
    assert!(notifier
        .snapshot()
        .iter()
        .any(|n| n.message == "No messages found to export."));
}
