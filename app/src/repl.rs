use anyhow::Result;
use quill_core::export::ExportFormat;
use quill_core::notify::{NotificationCenter, Severity};
use quill_core::session::{ChatController, ChatMessage, Citation, MessageRole};
use quill_core::wizard::{ProjectWizard, WizardStep};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use tokio::runtime::Runtime;

/// Prints each toast once, in arrival order. Ids are monotonic, so the
/// highest id seen so far marks where the previous drain stopped.
#[derive(Default)]
pub struct NotificationPrinter {
    last_seen: u64,
}

impl NotificationPrinter {
    pub fn drain(&mut self, notifier: &NotificationCenter) {
        for notification in notifier.snapshot() {
            if notification.id <= self.last_seen {
                continue;
            }
            self.last_seen = notification.id;
            let tag = match notification.severity {
                Severity::Success => "ok",
                Severity::Error => "error",
                Severity::Warning => "warn",
                Severity::Info => "info",
            };
            println!("[{tag}] {}", notification.message);
        }
    }
}

pub fn render_file_table(wizard: &ProjectWizard) {
    let rows = wizard.page_rows();
    if rows.is_empty() {
        println!("(no files)");
        return;
    }
    let selected = wizard.selected_file_ids();
    for file in rows {
        let mark = if selected.contains(&file.file_id) {
            "[x]"
        } else {
            "[ ]"
        };
        println!(
            "{mark} {:>5}  {}  ({})",
            file.file_id, file.file_name, file.uploaded_at
        );
    }
    println!(
        "page {}/{} of {} file(s)",
        wizard.current_page(),
        wizard.total_pages(),
        wizard.files().len()
    );
}

pub fn render_project_table(wizard: &ProjectWizard) {
    let projects = wizard.projects();
    if projects.is_empty() {
        println!("(no projects)");
        return;
    }
    let selected = wizard.selected_project_id();
    for project in projects {
        let mark = if selected == Some(project.project_id) {
            "[x]"
        } else {
            "[ ]"
        };
        println!(
            "{mark} {:>5}  {}  [{}]",
            project.project_id,
            project.project_name,
            project.file_names.join(", ")
        );
    }
}

fn prompt(step: WizardStep) -> String {
    format!("wizard:{}> ", step.number())
}

fn read_line(prompt_text: &str) -> Result<Option<String>> {
    print!("{prompt_text}");
    io::stdout().flush()?;
    let mut line = String::new();
    if io::stdin().lock().read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}

/// Drive the three-step flow from stdin. Returns the project id to chat
/// against once a confirmation succeeds, or `None` on quit.
pub fn wizard_loop(
    runtime: &Runtime,
    wizard: &ProjectWizard,
    notifier: &NotificationCenter,
    printer: &mut NotificationPrinter,
) -> Result<Option<i64>> {
    println!("commands: files projects n p add <path>.. upload check <id> uncheck <id>");
    println!("          pick <id> unpick name <text> delete-file <id> delete-project <id>");
    println!("          next back confirm quit");
    loop {
        printer.drain(notifier);
        let Some(line) = read_line(&prompt(wizard.step()))? else {
            return Ok(None);
        };
        let mut parts = line.split_whitespace();
        let Some(command) = parts.next() else {
            continue;
        };
        match command {
            "quit" => return Ok(None),
            "files" => render_file_table(wizard),
            "projects" => render_project_table(wizard),
            "n" => {
                wizard.go_to_next_page();
                render_file_table(wizard);
            }
            "p" => {
                wizard.go_to_previous_page();
                render_file_table(wizard);
            }
            "add" => {
                let paths: Vec<PathBuf> = parts.map(PathBuf::from).collect();
                if paths.is_empty() {
                    println!("usage: add <path>..");
                    continue;
                }
                let outcome = wizard.handle_files(&paths);
                println!("staged {} file(s)", outcome.accepted.len());
            }
            "upload" => runtime.block_on(wizard.upload_staged())?,
            "check" | "uncheck" => {
                let Some(id) = parts.next().and_then(|v| v.parse::<i64>().ok()) else {
                    println!("usage: {command} <id>");
                    continue;
                };
                wizard.toggle_file(id, command == "check");
            }
            "pick" => {
                let Some(id) = parts.next().and_then(|v| v.parse::<i64>().ok()) else {
                    println!("usage: pick <id>");
                    continue;
                };
                wizard.toggle_project(id, true);
            }
            "unpick" => {
                if let Some(id) = wizard.selected_project_id() {
                    wizard.toggle_project(id, false);
                }
            }
            "name" => {
                let name = parts.collect::<Vec<_>>().join(" ");
                wizard.set_project_name(name);
            }
            "delete-file" => {
                let Some(id) = parts.next().and_then(|v| v.parse::<i64>().ok()) else {
                    println!("usage: delete-file <id>");
                    continue;
                };
                runtime.block_on(wizard.delete_file(id))?;
            }
            "delete-project" => {
                let Some(id) = parts.next().and_then(|v| v.parse::<i64>().ok()) else {
                    println!("usage: delete-project <id>");
                    continue;
                };
                runtime.block_on(wizard.delete_project(id))?;
            }
            "next" => {
                wizard.next_step();
            }
            "back" => wizard.previous_step(),
            "confirm" => {
                if let Some(project_id) = runtime.block_on(wizard.confirm_project_action())? {
                    printer.drain(notifier);
                    return Ok(Some(project_id));
                }
            }
            other => println!("unknown command '{other}'"),
        }
    }
}

fn render_message(message: &ChatMessage) {
    let label = match message.role {
        MessageRole::User => "you",
        MessageRole::Assistant => "assistant",
    };
    println!("{label}: {}", message.text);
    for citation in &message.citations {
        match citation {
            Citation::Document {
                file_name,
                page_number,
            } => println!("    source: {file_name} (page {page_number})"),
            Citation::Wiki { url, .. } => println!("    source: {url}"),
        }
    }
}

fn render_history(controller: &ChatController) {
    let messages = controller.messages();
    if messages.is_empty() {
        println!("(no messages)");
        return;
    }
    // stored newest-first; replay oldest-first for the terminal
    for message in messages.iter().rev() {
        render_message(message);
    }
}

/// Read-send loop for either chat surface. `:history`, `:export pdf|txt`
/// and `:quit` are commands; anything else goes to the assistant.
pub fn chat_loop(
    runtime: &Runtime,
    controller: &ChatController,
    notifier: &NotificationCenter,
    printer: &mut NotificationPrinter,
) -> Result<()> {
    let file_names = controller.file_names();
    if !file_names.is_empty() {
        println!("project files: {}", file_names.join(", "));
    }
    render_history(controller);
    loop {
        printer.drain(notifier);
        let Some(line) = read_line("> ")? else {
            return Ok(());
        };
        match line.as_str() {
            "" => continue,
            ":quit" => return Ok(()),
            ":history" => render_history(controller),
            ":export pdf" | ":export txt" => {
                let format = if line.ends_with("pdf") {
                    ExportFormat::Pdf
                } else {
                    ExportFormat::Text
                };
                let out = PathBuf::from(".");
                if let Some(path) = runtime.block_on(controller.export_transcript(format, &out))? {
                    println!("wrote {}", path.display());
                }
            }
            _ => {
                runtime.block_on(controller.send_message(&line))?;
                if let Some(reply) = controller.messages().first() {
                    if reply.role == MessageRole::Assistant {
                        render_message(reply);
                    }
                }
            }
        }
    }
}
