use crate::api::{self, ApiFile, Backend, ProjectSummary};
use crate::notify::{NotificationCenter, Severity};
use anyhow::Result;
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A new project may bundle at most this many files.
pub const MAX_PROJECT_FILES: usize = 3;
pub const SUPPORTED_EXTENSIONS: [&str; 3] = ["pdf", "docx", "txt"];
pub const DEFAULT_PAGE_SIZE: usize = 5;

const SUPPORTED_FORMATS_TEXT: &str = "Supported formats: pdf, docx, txt";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum WizardStep {
    SelectProjectOrFiles,
    ConfirmSelection,
    CreateOrJoin,
}

impl WizardStep {
    pub fn number(self) -> u8 {
        match self {
            Self::SelectProjectOrFiles => 1,
            Self::ConfirmSelection => 2,
            Self::CreateOrJoin => 3,
        }
    }
}

/// Snapshot of the selection confirmed at step 2, displayed at step 3.
/// `project_id == 0` marks a draft that will be created rather than joined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DraftProject {
    pub project_id: i64,
    pub project_name: String,
    pub file_names: Vec<String>,
}

/// How one intake batch was partitioned. Every candidate lands in exactly
/// one of the three sets.
#[derive(Debug, Clone, Default)]
pub struct FileBatchOutcome {
    pub accepted: Vec<PathBuf>,
    pub duplicates: Vec<String>,
    pub unsupported: Vec<String>,
}

struct Inner {
    step: WizardStep,
    api_files: Vec<ApiFile>,
    uploaded_names: Vec<String>,
    pending_upload: Vec<PathBuf>,
    uploading: bool,
    selected_file_ids: Vec<i64>,
    projects: Vec<ProjectSummary>,
    project_count: usize,
    selected_project_id: Option<i64>,
    new_project_name: String,
    current_project: Option<DraftProject>,
    confirm_busy: bool,
    current_page: usize,
}

impl Default for Inner {
    fn default() -> Self {
        Self {
            step: WizardStep::SelectProjectOrFiles,
            api_files: Vec::new(),
            uploaded_names: Vec::new(),
            pending_upload: Vec::new(),
            uploading: false,
            selected_file_ids: Vec::new(),
            projects: Vec::new(),
            project_count: 0,
            selected_project_id: None,
            new_project_name: String::new(),
            current_project: None,
            confirm_busy: false,
            current_page: 1,
        }
    }
}

/// Three-step create-or-join flow gating entry into the document chat:
/// pick a project or files, confirm the selection, then name/create or
/// join. Also owns the file table (intake, upload, delete, pagination).
#[derive(Clone)]
pub struct ProjectWizard {
    backend: Arc<dyn Backend>,
    notifier: NotificationCenter,
    page_size: usize,
    inner: Arc<RwLock<Inner>>,
}

impl ProjectWizard {
    pub fn new(backend: Arc<dyn Backend>, notifier: NotificationCenter) -> Self {
        Self::with_page_size(backend, notifier, DEFAULT_PAGE_SIZE)
    }

    pub fn with_page_size(
        backend: Arc<dyn Backend>,
        notifier: NotificationCenter,
        page_size: usize,
    ) -> Self {
        Self {
            backend,
            notifier,
            page_size: page_size.max(1),
            inner: Arc::new(RwLock::new(Inner::default())),
        }
    }

    // ---- snapshots -------------------------------------------------------

    pub fn step(&self) -> WizardStep {
        self.inner.read().step
    }

    pub fn files(&self) -> Vec<ApiFile> {
        self.inner.read().api_files.clone()
    }

    pub fn projects(&self) -> Vec<ProjectSummary> {
        self.inner.read().projects.clone()
    }

    pub fn project_count(&self) -> usize {
        self.inner.read().project_count
    }

    pub fn selected_file_ids(&self) -> Vec<i64> {
        self.inner.read().selected_file_ids.clone()
    }

    pub fn selected_project_id(&self) -> Option<i64> {
        self.inner.read().selected_project_id
    }

    pub fn current_project(&self) -> Option<DraftProject> {
        self.inner.read().current_project.clone()
    }

    pub fn pending_upload(&self) -> Vec<PathBuf> {
        self.inner.read().pending_upload.clone()
    }

    pub fn project_name(&self) -> String {
        self.inner.read().new_project_name.clone()
    }

    pub fn set_project_name(&self, name: impl Into<String>) {
        self.inner.write().new_project_name = name.into();
    }

    // ---- server lists ----------------------------------------------------

    pub async fn refresh_files(&self) -> Result<()> {
        match self.backend.list_files().await {
            Ok(list) => {
                self.inner.write().api_files = list.files;
            }
            Err(err) => {
                tracing::warn!(%err, "file listing failed");
                self.notifier.pop(
                    Severity::Error,
                    "Failed to retrieve files. Please try again.",
                );
            }
        }
        Ok(())
    }

    pub async fn refresh_projects(&self) -> Result<()> {
        match self.backend.list_projects().await {
            Ok(list) => {
                let mut inner = self.inner.write();
                inner.projects = list.projects;
                inner.project_count = list.count;
            }
            Err(err) => {
                tracing::warn!(%err, "project listing failed");
                self.notifier.pop(
                    Severity::Error,
                    "Failed to retrieve projects. Please try again.",
                );
            }
        }
        Ok(())
    }

    // ---- file intake -----------------------------------------------------

    fn is_duplicate(inner: &Inner, name: &str) -> bool {
        inner.uploaded_names.iter().any(|n| n == name)
            || inner
                .pending_upload
                .iter()
                .any(|p| file_name_of(p) == name)
            || inner.api_files.iter().any(|f| f.file_name == name)
    }

    fn is_supported(name: &str) -> bool {
        Path::new(name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                SUPPORTED_EXTENSIONS
                    .iter()
                    .any(|allowed| ext.eq_ignore_ascii_case(allowed))
            })
            .unwrap_or(false)
    }

    /// Partition a dropped/picked batch into accepted, duplicate, and
    /// unsupported sets; each rejection class reports once, naming every
    /// offending file. Accepted files are staged for [`upload_staged`].
    ///
    /// [`upload_staged`]: Self::upload_staged
    pub fn handle_files(&self, candidates: &[PathBuf]) -> FileBatchOutcome {
        let mut outcome = FileBatchOutcome::default();
        {
            let mut inner = self.inner.write();
            for candidate in candidates {
                let name = file_name_of(candidate);
                if Self::is_duplicate(&inner, &name) {
                    outcome.duplicates.push(name);
                    continue;
                }
                if Self::is_supported(&name) {
                    inner.pending_upload.push(candidate.clone());
                    outcome.accepted.push(candidate.clone());
                } else {
                    outcome.unsupported.push(name);
                }
            }
        }
        if !outcome.unsupported.is_empty() {
            self.notifier.pop(
                Severity::Error,
                format!(
                    "Unsupported format: {}. {SUPPORTED_FORMATS_TEXT}",
                    outcome.unsupported.join(", ")
                ),
            );
        }
        if !outcome.duplicates.is_empty() {
            self.notifier.pop(
                Severity::Error,
                format!(
                    "Duplicate files: {}. These files already exist.",
                    outcome.duplicates.join(", ")
                ),
            );
        }
        outcome
    }

    pub fn remove_pending(&self, index: usize) {
        let mut inner = self.inner.write();
        if index < inner.pending_upload.len() {
            inner.pending_upload.remove(index);
        }
    }

    pub fn clear_pending(&self) {
        self.inner.write().pending_upload.clear();
    }

    /// Upload the staged batch. Gated so a second upload cannot start while
    /// one is in flight; the staged list is cleared on both outcomes.
    pub async fn upload_staged(&self) -> Result<()> {
        let paths = {
            let mut inner = self.inner.write();
            if inner.pending_upload.is_empty() || inner.uploading {
                return Ok(());
            }
            inner.uploading = true;
            inner.pending_upload.clone()
        };
        let result = self.backend.upload_files(&paths).await;
        {
            let mut inner = self.inner.write();
            inner.uploading = false;
            inner.pending_upload.clear();
            if result.is_ok() {
                inner
                    .uploaded_names
                    .extend(paths.iter().map(|p| file_name_of(p)));
            }
        }
        match result {
            Ok(()) => {
                self.notifier
                    .pop(Severity::Success, "Files uploaded successfully");
                self.refresh_files().await?;
            }
            Err(err) => {
                tracing::warn!(%err, "upload failed");
                self.notifier
                    .pop(Severity::Error, "File upload failed. Please try again.");
            }
        }
        Ok(())
    }

    // ---- deletion --------------------------------------------------------

    pub async fn delete_file(&self, file_id: i64) -> Result<()> {
        match self.backend.delete_file(file_id).await {
            Ok(()) => {
                self.notifier
                    .pop(Severity::Success, "File deleted successfully");
                {
                    let mut inner = self.inner.write();
                    inner.api_files.retain(|f| f.file_id != file_id);
                    inner.selected_file_ids.retain(|id| *id != file_id);
                    // deleting the last row of a trailing page steps back
                    let start = (inner.current_page - 1) * self.page_size;
                    if inner.current_page > 1 && start >= inner.api_files.len() {
                        inner.current_page -= 1;
                    }
                }
                self.refresh_files().await?;
            }
            Err(err) => {
                tracing::warn!(%err, file_id, "file delete failed");
                self.notifier
                    .pop(Severity::Error, "Failed to delete file. Please try again.");
            }
        }
        Ok(())
    }

    pub async fn delete_project(&self, project_id: i64) -> Result<()> {
        match self.backend.delete_project(project_id).await {
            Ok(()) => {
                self.notifier
                    .pop(Severity::Success, "Project deleted successfully");
                let mut inner = self.inner.write();
                inner.projects.retain(|p| p.project_id != project_id);
                inner.project_count = inner.projects.len();
                if inner.selected_project_id == Some(project_id) {
                    inner.selected_project_id = None;
                    inner.step = WizardStep::ConfirmSelection;
                }
            }
            Err(err) => {
                tracing::warn!(%err, project_id, "project delete failed");
                self.notifier.pop(
                    Severity::Error,
                    "Failed to delete project. Please try again.",
                );
            }
        }
        Ok(())
    }

    // ---- selection -------------------------------------------------------

    /// Returns whether the checkbox state sticks; a rejected 4th check
    /// reverts to unchecked.
    pub fn toggle_file(&self, file_id: i64, checked: bool) -> bool {
        let mut inner = self.inner.write();
        if checked {
            if inner.selected_file_ids.len() >= MAX_PROJECT_FILES {
                drop(inner);
                self.notifier.pop(
                    Severity::Error,
                    "You can select a maximum of 3 files for a project.",
                );
                return false;
            }
            if !inner.selected_file_ids.contains(&file_id) {
                inner.selected_file_ids.push(file_id);
            }
        } else {
            inner.selected_file_ids.retain(|id| *id != file_id);
        }
        true
    }

    /// Choosing a project while files are checked warns that the files will
    /// be ignored but leaves the checks in place; the project id stays
    /// authoritative for the step-3 action.
    pub fn toggle_project(&self, project_id: i64, checked: bool) {
        let warn = {
            let mut inner = self.inner.write();
            if checked {
                inner.selected_project_id = Some(project_id);
                !inner.selected_file_ids.is_empty()
            } else {
                inner.selected_project_id = None;
                false
            }
        };
        if warn {
            self.notifier.pop(
                Severity::Warning,
                "Selecting a project will ignore the selected files and join the chosen project instead.",
            );
        }
    }

    // ---- step navigation -------------------------------------------------

    /// Advance one step; returns false (with a notification) when the
    /// current selection does not justify moving on.
    pub fn next_step(&self) -> bool {
        enum Blocked {
            NothingAtAll,
            NothingConfirmed,
        }
        let blocked = {
            let mut inner = self.inner.write();
            match inner.step {
                WizardStep::SelectProjectOrFiles => {
                    if inner.project_count == 0 && inner.selected_file_ids.is_empty() {
                        Some(Blocked::NothingAtAll)
                    } else {
                        inner.step = WizardStep::ConfirmSelection;
                        None
                    }
                }
                WizardStep::ConfirmSelection => {
                    if inner.selected_project_id.is_none() && inner.selected_file_ids.is_empty() {
                        Some(Blocked::NothingConfirmed)
                    } else {
                        inner.current_project = Self::snapshot_draft(&inner);
                        inner.step = WizardStep::CreateOrJoin;
                        None
                    }
                }
                WizardStep::CreateOrJoin => None,
            }
        };
        match blocked {
            Some(Blocked::NothingAtAll) => {
                self.notifier.pop(
                    Severity::Error,
                    "No existing project allocated to the user. Please select files to proceed.",
                );
                false
            }
            Some(Blocked::NothingConfirmed) => {
                self.notifier.pop(
                    Severity::Error,
                    "Please select a project or select files to create a new project to proceed.",
                );
                false
            }
            None => true,
        }
    }

    /// Step back, resetting the selections made in the step being left.
    pub fn previous_step(&self) {
        let mut inner = self.inner.write();
        match inner.step {
            WizardStep::SelectProjectOrFiles => {}
            WizardStep::ConfirmSelection => {
                inner.selected_project_id = None;
                inner.selected_file_ids.clear();
                inner.new_project_name.clear();
                inner.step = WizardStep::SelectProjectOrFiles;
            }
            WizardStep::CreateOrJoin => {
                if inner.selected_project_id.is_some() {
                    inner.selected_file_ids.clear();
                    inner.new_project_name.clear();
                    inner.current_project = None;
                }
                inner.step = WizardStep::ConfirmSelection;
            }
        }
    }

    fn snapshot_draft(inner: &Inner) -> Option<DraftProject> {
        if let Some(project_id) = inner.selected_project_id {
            return inner
                .projects
                .iter()
                .find(|p| p.project_id == project_id)
                .map(|p| DraftProject {
                    project_id: p.project_id,
                    project_name: p.project_name.clone(),
                    file_names: p.file_names.clone(),
                });
        }
        if inner.selected_file_ids.is_empty() {
            return None;
        }
        Some(DraftProject {
            project_id: 0,
            project_name: inner.new_project_name.clone(),
            file_names: inner
                .api_files
                .iter()
                .filter(|f| inner.selected_file_ids.contains(&f.file_id))
                .map(|f| f.file_name.clone())
                .collect(),
        })
    }

    // ---- confirmation ----------------------------------------------------

    /// Step-3 action: create from the selected files, or join the chosen
    /// project; a selected project wins over checked files. Exactly one
    /// backend call fires per confirmation, and a second confirmation is
    /// suppressed while one is in flight. Returns the project id to
    /// navigate into on success.
    pub async fn confirm_project_action(&self) -> Result<Option<i64>> {
        enum Action {
            Create(String, Vec<i64>),
            Join(i64),
        }
        let action = {
            let mut inner = self.inner.write();
            if inner.confirm_busy {
                return Ok(None);
            }
            if inner.selected_project_id.is_some() {
                let project_id = inner.selected_project_id.unwrap_or_default();
                inner.confirm_busy = true;
                Action::Join(project_id)
            } else if !inner.selected_file_ids.is_empty() {
                if inner.new_project_name.trim().is_empty() {
                    drop(inner);
                    self.notifier
                        .pop(Severity::Error, "Please enter a project name.");
                    return Ok(None);
                }
                inner.confirm_busy = true;
                Action::Create(
                    inner.new_project_name.clone(),
                    inner.selected_file_ids.clone(),
                )
            } else {
                drop(inner);
                self.notifier
                    .pop(Severity::Error, "Please select a project or files.");
                return Ok(None);
            }
        };

        match action {
            Action::Create(name, file_ids) => {
                match self.backend.create_project(&name, &file_ids).await {
                    Ok(created) => {
                        self.finish_confirmation();
                        self.notifier
                            .pop(Severity::Success, "Project created successfully!");
                        Ok(Some(created.project_id))
                    }
                    Err(err) => {
                        self.inner.write().confirm_busy = false;
                        self.notifier.pop(
                            Severity::Error,
                            api::detail_or(&err, "Failed to create project. Please try again."),
                        );
                        Ok(None)
                    }
                }
            }
            Action::Join(project_id) => match self.backend.join_project(project_id).await {
                Ok(joined) => {
                    self.finish_confirmation();
                    self.notifier
                        .pop(Severity::Success, "Joined project successfully!");
                    Ok(Some(joined.project_id))
                }
                Err(err) => {
                    self.inner.write().confirm_busy = false;
                    self.notifier.pop(
                        Severity::Error,
                        api::detail_or(&err, "Failed to join project. Please try again."),
                    );
                    Ok(None)
                }
            },
        }
    }

    fn finish_confirmation(&self) {
        let mut inner = self.inner.write();
        inner.selected_file_ids.clear();
        inner.selected_project_id = None;
        inner.new_project_name.clear();
        inner.current_project = None;
        inner.confirm_busy = false;
        inner.step = WizardStep::SelectProjectOrFiles;
    }

    // ---- pagination ------------------------------------------------------

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn total_pages(&self) -> usize {
        let len = self.inner.read().api_files.len();
        (len.div_ceil(self.page_size)).max(1)
    }

    pub fn current_page(&self) -> usize {
        self.inner.read().current_page
    }

    /// Rows of the file table visible on the current page.
    pub fn page_rows(&self) -> Vec<ApiFile> {
        let inner = self.inner.read();
        let start = (inner.current_page - 1) * self.page_size;
        inner
            .api_files
            .iter()
            .skip(start)
            .take(self.page_size)
            .cloned()
            .collect()
    }

    pub fn go_to_first_page(&self) {
        self.inner.write().current_page = 1;
    }

    pub fn go_to_previous_page(&self) {
        let mut inner = self.inner.write();
        if inner.current_page > 1 {
            inner.current_page -= 1;
        }
    }

    pub fn go_to_next_page(&self) {
        let total = self.total_pages();
        let mut inner = self.inner.write();
        if inner.current_page < total {
            inner.current_page += 1;
        }
    }

    pub fn go_to_last_page(&self) {
        let total = self.total_pages();
        self.inner.write().current_page = total;
    }

    pub fn go_to_page(&self, page: usize) {
        let total = self.total_pages();
        self.inner.write().current_page = page.clamp(1, total);
    }
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|os| os.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
