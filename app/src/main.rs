use anyhow::Result;
use clap::{Parser, Subcommand};
use quill_core::api::ApiGateway;
use quill_core::auth::{AuthFlow, SignupForm};
use quill_core::export::ExportFormat;
use quill_core::notify::NotificationCenter;
use quill_core::session::{ChatController, Surface};
use quill_core::store::{self, CredentialStore};
use quill_core::wizard::ProjectWizard;
use quill_core::{telemetry, Backend, Settings};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::runtime::Runtime;
use tracing_subscriber::EnvFilter;

mod repl;

#[derive(Parser, Debug)]
#[command(
    name = "quill",
    version,
    about = "Terminal client for a retrieval-augmented chat service"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
    /// Override the backend base url from quill.yaml / QUILL_BASE_URL.
    #[arg(long)]
    base_url: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create an account.
    Signup {
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        confirm_password: String,
    },
    /// Obtain a bearer token and persist it for later calls.
    Login {
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
    },
    /// Drop the persisted credentials and wikipedia session.
    Logout,
    /// Reset a forgotten password.
    ResetPassword {
        #[arg(long)]
        identifier: String,
        #[arg(long)]
        new_password: String,
    },
    /// Manage uploaded files.
    #[command(subcommand)]
    Files(FilesCommand),
    /// Manage projects.
    #[command(subcommand)]
    Projects(ProjectsCommand),
    /// Walk the three-step create-or-join flow, then chat.
    Wizard,
    /// Document-grounded chat against a project's session.
    Chat {
        #[arg(long)]
        project: i64,
    },
    /// Wikipedia chat; the session id persists across runs.
    Wiki,
    /// Export a transcript as chat_history_<session>.<pdf|txt>.
    Export {
        /// pdf or text
        #[arg(long)]
        format: String,
        /// Export the document surface scoped to this project; omit for
        /// the wikipedia surface.
        #[arg(long)]
        project: Option<i64>,
        #[arg(long, default_value = ".")]
        out: PathBuf,
    },
}

#[derive(Subcommand, Debug)]
enum FilesCommand {
    List,
    Upload { paths: Vec<PathBuf> },
    Delete { id: i64 },
}

#[derive(Subcommand, Debug)]
enum ProjectsCommand {
    List,
    Delete { id: i64 },
}

fn main() -> Result<()> {
    telemetry::init_tracing(EnvFilter::from_default_env());
    let cli = Cli::parse();

    let mut settings = Settings::load().map_err(|err| anyhow::anyhow!(err.user_message()))?;
    if let Some(base_url) = cli.base_url {
        settings.base_url = base_url;
    }

    let runtime = Runtime::new()?;
    let store = CredentialStore::new(settings.data_dir.join("credentials"));
    let notifier = NotificationCenter::with_runtime(runtime.handle().clone());
    let backend: Arc<dyn Backend> =
        Arc::new(ApiGateway::new(settings.base_url.clone(), store.clone()));
    let mut printer = repl::NotificationPrinter::default();

    match cli.command {
        Command::Signup {
            username,
            email,
            password,
            confirm_password,
        } => {
            let auth = AuthFlow::new(backend, notifier.clone(), store);
            let form = SignupForm {
                username,
                email,
                password,
                confirm_password,
            };
            runtime.block_on(auth.sign_up(&form))?;
        }
        Command::Login { username, password } => {
            let auth = AuthFlow::new(backend, notifier.clone(), store);
            runtime.block_on(auth.log_in(&username, &password))?;
        }
        Command::Logout => {
            let auth = AuthFlow::new(backend, notifier.clone(), store);
            auth.log_out();
            println!("logged out");
        }
        Command::ResetPassword {
            identifier,
            new_password,
        } => {
            let auth = AuthFlow::new(backend, notifier.clone(), store);
            runtime.block_on(auth.reset_password(&identifier, &new_password))?;
        }
        Command::Files(command) => {
            let wizard =
                ProjectWizard::with_page_size(backend, notifier.clone(), settings.page_size);
            match command {
                FilesCommand::List => {
                    runtime.block_on(wizard.refresh_files())?;
                    repl::render_file_table(&wizard);
                }
                FilesCommand::Upload { paths } => {
                    runtime.block_on(wizard.refresh_files())?;
                    let outcome = wizard.handle_files(&paths);
                    if !outcome.accepted.is_empty() {
                        runtime.block_on(wizard.upload_staged())?;
                    }
                }
                FilesCommand::Delete { id } => {
                    runtime.block_on(wizard.refresh_files())?;
                    runtime.block_on(wizard.delete_file(id))?;
                }
            }
        }
        Command::Projects(command) => {
            let wizard =
                ProjectWizard::with_page_size(backend, notifier.clone(), settings.page_size);
            match command {
                ProjectsCommand::List => {
                    runtime.block_on(wizard.refresh_projects())?;
                    repl::render_project_table(&wizard);
                }
                ProjectsCommand::Delete { id } => {
                    runtime.block_on(wizard.refresh_projects())?;
                    runtime.block_on(wizard.delete_project(id))?;
                }
            }
        }
        Command::Wizard => {
            let wizard = ProjectWizard::with_page_size(
                backend.clone(),
                notifier.clone(),
                settings.page_size,
            );
            runtime.block_on(wizard.refresh_files())?;
            runtime.block_on(wizard.refresh_projects())?;
            if let Some(project_id) =
                repl::wizard_loop(&runtime, &wizard, &notifier, &mut printer)?
            {
                let controller =
                    ChatController::new(Surface::Document, backend, notifier.clone(), store);
                runtime.block_on(controller.open_project(project_id))?;
                repl::chat_loop(&runtime, &controller, &notifier, &mut printer)?;
            }
        }
        Command::Chat { project } => {
            let controller =
                ChatController::new(Surface::Document, backend, notifier.clone(), store);
            runtime.block_on(controller.open_project(project))?;
            repl::chat_loop(&runtime, &controller, &notifier, &mut printer)?;
        }
        Command::Wiki => {
            let had_stored_session = store.get(store::SESSION_ID).is_some();
            let controller =
                ChatController::new(Surface::Wikipedia, backend, notifier.clone(), store);
            runtime.block_on(controller.ensure_session())?;
            if had_stored_session {
                runtime.block_on(controller.load_history())?;
            }
            repl::chat_loop(&runtime, &controller, &notifier, &mut printer)?;
        }
        Command::Export {
            format,
            project,
            out,
        } => {
            let format: ExportFormat = format.parse().map_err(anyhow::Error::msg)?;
            let controller = match project {
                Some(project_id) => {
                    let controller =
                        ChatController::new(Surface::Document, backend, notifier.clone(), store);
                    runtime.block_on(controller.open_project(project_id))?;
                    controller
                }
                None => {
                    let controller =
                        ChatController::new(Surface::Wikipedia, backend, notifier.clone(), store);
                    runtime.block_on(controller.ensure_session())?;
                    controller
                }
            };
            if let Some(path) = runtime.block_on(controller.export_transcript(format, &out))? {
                println!("wrote {}", path.display());
            }
        }
    }

    printer.drain(&notifier);
    Ok(())
}
