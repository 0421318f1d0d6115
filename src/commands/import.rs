use anyhow::{Context as _, Result};
use clap::Args;
use inquire::InquireError;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::config::{ImportArgs, ImportConfig, az_account_subscription, resolve_subscription_id};
use crate::context::Context;
use crate::iac::{IacEngine, TerraformEngine};
use crate::import::editor::{EditOutcome, UiEvent};
use crate::import::{
    ItemStatus, LogObserver, MappingStore, SessionController, SessionOutcome, TypeResolver,
};
use crate::infrastructure::discovery::{DiscoveryProvider, Selector};
use crate::infrastructure::error::ImportError;
use crate::infrastructure::providers::{AzureDiscovery, MappingFileDiscovery};
use crate::infrastructure::resource_mapper::ResourceCatalog;

const IMPORT_ACTION: &str = "▶ Import";
const QUIT_ACTION: &str = "✗ Quit";
/// Typed into the type prompt to skip a resource
const SKIP_INPUT: &str = "-";

/// Flags shared by every discovery mode
#[derive(Debug, Args)]
pub struct ImportFlags {
    /// Directory holding the IaC workspace and the mapping file
    #[arg(short, long, default_value = ".")]
    pub output_dir: PathBuf,

    /// Resolve types without prompting (recommendations or preset types)
    #[arg(short, long)]
    pub non_interactive: bool,

    /// Keep importing after a failed import (requires --non-interactive)
    #[arg(short = 'k', long = "continue")]
    pub continue_on_error: bool,

    /// Maximum number of imports running at once [default: 10]
    #[arg(long)]
    pub parallelism: Option<usize>,

    /// Only write the mapping file, do not import (requires --non-interactive)
    #[arg(short, long)]
    pub generate_mapping_file: bool,

    /// Prefix of generated resource names [default: res-]
    #[arg(long)]
    pub name_pattern: Option<String>,

    /// Module every resource is imported into, dot separated (e.g. network.hub)
    #[arg(long)]
    pub module_path: Option<String>,

    /// Terraform-compatible binary to run [default: terraform]
    #[arg(long, env = "CLOUDPORT_ENGINE")]
    pub engine: Option<String>,

    /// Seconds before a single import is abandoned [default: 600]
    #[arg(long)]
    pub import_timeout: Option<u64>,

    /// Azure subscription to work in
    #[arg(long, env = "CLOUDPORT_SUBSCRIPTION_ID")]
    pub subscription_id: Option<String>,

    /// Output of `<engine> providers schema -json`, extends the known resource types
    #[arg(long)]
    pub schema_file: Option<PathBuf>,

    /// YAML config file [default: <output-dir>/.cloudport.yaml]
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl From<ImportFlags> for ImportArgs {
    fn from(flags: ImportFlags) -> Self {
        Self {
            output_dir: flags.output_dir,
            non_interactive: flags.non_interactive,
            continue_on_error: flags.continue_on_error,
            parallelism: flags.parallelism,
            generate_mapping_file: flags.generate_mapping_file,
            name_pattern: flags.name_pattern,
            module_path: flags.module_path,
            engine: flags.engine,
            import_timeout: flags.import_timeout,
            subscription_id: flags.subscription_id,
            schema_file: flags.schema_file,
            config: flags.config,
        }
    }
}

/// Discover resources and import them into IaC state
pub struct ImportCommand;

impl ImportCommand {
    /// Run one import session for `selector`
    ///
    /// Ctrl+C stops new imports in both modes; running imports finish and the
    /// mapping file is finalized.
    pub fn execute(ctx: &Context, selector: Selector, args: &ImportArgs) -> Result<SessionOutcome> {
        let abort = Arc::new(AtomicBool::new(false));
        Self::install_abort_handler(&abort);
        Self::run_session(ctx, selector, args, abort)
    }

    fn run_session(
        ctx: &Context,
        selector: Selector,
        args: &ImportArgs,
        abort: Arc<AtomicBool>,
    ) -> Result<SessionOutcome> {
        let config = ImportConfig::load(args, ctx.fs.as_ref())?;
        ctx.fs
            .create_dir_all(&config.output_dir)
            .with_context(|| format!("Failed to create {}", config.output_dir.display()))?;

        ctx.output.section("Cloudport import");
        ctx.output.key_value("Selection", &selector.describe());
        ctx.output
            .key_value("Output directory", &config.output_dir.display().to_string());

        let env: HashMap<String, String> = std::env::vars().collect();
        let subscription_id = resolve_subscription_id(config.subscription_id.as_deref(), &env, || {
            az_account_subscription(ctx.command.as_ref(), &config.output_dir)
        });
        if let Some(sub) = &subscription_id {
            ctx.output.key_value("Subscription", sub);
        }

        let mut engine = TerraformEngine::new(
            config.engine.clone(),
            &config.output_dir,
            config.import_timeout,
            Arc::clone(&ctx.command),
            Arc::clone(&ctx.fs),
        );
        if let Some(sub) = &subscription_id {
            engine = engine.with_subscription(sub.clone());
        }
        let engine = Arc::new(engine);

        if !config.generate_mapping_file {
            Self::prepare_engine(ctx, &engine, subscription_id.as_deref())?;
        }

        // A corrupt mapping file stops the session before anything is discovered
        let store = MappingStore::load(Arc::clone(&ctx.fs), &config.mapping_path())?;
        if !store.is_empty() {
            ctx.output.info(&format!(
                "Resuming from {} ({} recorded resources)",
                store.path().display(),
                store.records().len()
            ));
        }

        let resolver = TypeResolver::new(Arc::new(Self::catalog(ctx, &config)?));
        let mut controller = SessionController::new(
            config.session_options(),
            store,
            resolver,
            engine,
            Arc::new(LogObserver),
        )
        .with_abort_flag(abort);

        let provider = Self::provider(ctx, &selector, subscription_id.as_deref());
        controller.discover(provider.as_ref(), &selector)?;
        ctx.output
            .info(&format!("Discovered {} resources", controller.items().len()));

        if config.non_interactive {
            controller.auto_resolve()?;
            if !config.generate_mapping_file {
                Self::run_round(ctx, &mut controller)?;
            }
        } else {
            Self::interactive(ctx, &mut controller)?;
        }

        let outcome = controller.finalize()?;
        Self::print_summary(ctx, &outcome);
        Ok(outcome)
    }

    fn prepare_engine(
        ctx: &Context,
        engine: &TerraformEngine,
        subscription_id: Option<&str>,
    ) -> Result<()> {
        let installed = engine.check_installed();
        ctx.output.status_check(engine.get_name(), installed);
        if !installed {
            return Err(ImportError::EngineUnavailable {
                cloud_id: String::new(),
                message: format!("{} is not installed or not on PATH", engine.get_name()),
            }
            .into());
        }

        subscription_id.context(
            "No subscription id: pass --subscription-id, set ARM_SUBSCRIPTION_ID, or run 'az login'",
        )?;
        engine.init_workspace()
    }

    fn catalog(ctx: &Context, config: &ImportConfig) -> Result<ResourceCatalog> {
        let catalog = ResourceCatalog::builtin();
        let Some(path) = &config.schema_file else {
            return Ok(catalog);
        };

        let content = ctx
            .fs
            .read_to_string(path)
            .with_context(|| format!("Failed to read schema file {}", path.display()))?;
        let catalog = catalog
            .with_provider_schema(&content)
            .with_context(|| format!("Invalid provider schema in {}", path.display()))?;
        tracing::info!(types = catalog.extra_type_count(), "loaded provider schema");
        Ok(catalog)
    }

    fn provider(
        ctx: &Context,
        selector: &Selector,
        subscription_id: Option<&str>,
    ) -> Box<dyn DiscoveryProvider> {
        match selector {
            Selector::MappingFile { .. } => Box::new(MappingFileDiscovery::new(Arc::clone(&ctx.fs))),
            _ => {
                let discovery = AzureDiscovery::new(Arc::clone(&ctx.command), ".");
                match subscription_id {
                    Some(sub) => Box::new(discovery.with_subscription(sub)),
                    None => Box::new(discovery),
                }
            }
        }
    }

    fn install_abort_handler(abort: &Arc<AtomicBool>) {
        let flag = Arc::clone(abort);
        if let Err(e) = ctrlc::set_handler(move || {
            tracing::warn!("interrupted, finishing running imports");
            flag.store(true, Ordering::SeqCst);
        }) {
            tracing::warn!(error = %e, "could not install interrupt handler");
        }
    }

    /// Import every resolved item and report the round
    fn run_round(ctx: &Context, controller: &mut SessionController) -> Result<()> {
        let runtime = tokio::runtime::Runtime::new().context("Failed to create tokio runtime")?;
        let report = runtime.block_on(controller.run_imports())?;

        if report.scheduled == 0 {
            ctx.output.dimmed("Nothing to import");
        } else if report.failed > 0 {
            ctx.output.warning(&format!(
                "{} of {} imports failed",
                report.failed, report.scheduled
            ));
        } else {
            ctx.output
                .success(&format!("Imported {} resources", report.scheduled));
        }
        if report.halted {
            ctx.output
                .warning("Stopped before every resource was imported");
        }
        Ok(())
    }

    fn interactive(ctx: &Context, controller: &mut SessionController) -> Result<()> {
        loop {
            if controller.aborted() {
                ctx.output.warning("Interrupted, leaving the editor");
                return Ok(());
            }

            let mut options: Vec<String> = controller.items().iter().map(|i| i.label()).collect();
            let count = options.len();
            options.push(IMPORT_ACTION.to_string());
            options.push(QUIT_ACTION.to_string());

            let choice = match ctx.input.select("Select a resource to edit its type", options) {
                Ok(choice) => choice,
                Err(e) if is_interrupted(&e) => return Ok(()),
                Err(e) => return Err(e),
            };

            if choice < count {
                let cloud_id = controller.items()[choice].cloud_id.clone();
                Self::edit_item(ctx, controller, &cloud_id)?;
            } else if choice == count {
                controller.auto_resolve()?;
                Self::run_round(ctx, controller)?;
                if controller
                    .items()
                    .iter()
                    .all(|i| matches!(i.status, ItemStatus::Imported | ItemStatus::Skipped))
                {
                    return Ok(());
                }
            } else {
                return Ok(());
            }
        }
    }

    fn edit_item(ctx: &Context, controller: &mut SessionController, cloud_id: &str) -> Result<()> {
        match controller.handle_event(cloud_id, UiEvent::Enter)? {
            EditOutcome::Focused => {}
            EditOutcome::CompensationFailed(message) => {
                ctx.output.error(&message);
                return Ok(());
            }
            _ => {
                ctx.output.dimmed("This resource cannot be edited right now");
                return Ok(());
            }
        }

        let current = controller
            .item(cloud_id)
            .map(|i| i.target_type.clone())
            .unwrap_or_default();
        let help = format!(
            "Leave empty for the recommended type, '{}' to skip the resource",
            SKIP_INPUT
        );

        let answer = match ctx.input.text(
            &format!("Resource type for {}", cloud_id),
            Some(&current),
            Some(&help),
        ) {
            Ok(answer) => answer,
            Err(e) => {
                controller.handle_event(cloud_id, UiEvent::Escape)?;
                return if is_interrupted(&e) { Ok(()) } else { Err(e) };
            }
        };

        let outcome = match answer {
            None => controller.handle_event(cloud_id, UiEvent::Escape)?,
            Some(text) if text.trim() == SKIP_INPUT => {
                controller.handle_event(cloud_id, UiEvent::Skip)?
            }
            Some(text) => {
                controller.handle_event(cloud_id, UiEvent::Input(text))?;
                controller.handle_event(cloud_id, UiEvent::Enter)?
            }
        };

        if let EditOutcome::Rejected(message) = outcome {
            ctx.output.warning(&message);
        }
        Ok(())
    }

    fn print_summary(ctx: &Context, outcome: &SessionOutcome) {
        ctx.output.section("Import summary");
        for item in &outcome.items {
            let text = if item.address.is_empty() {
                item.cloud_id.clone()
            } else {
                format!("{} -> {}", item.cloud_id, item.address)
            };
            ctx.output.item_status(item.status.as_str(), &text);
            if let Some(err) = &item.error {
                ctx.output.dimmed(&format!("      {}", err));
            }
        }

        ctx.output.blank();
        ctx.output.key_value("Imported", &outcome.imported.to_string());
        ctx.output.key_value("Skipped", &outcome.skipped.to_string());
        ctx.output.key_value("Errored", &outcome.errored.to_string());
        ctx.output.key_value("Pending", &outcome.pending.to_string());
        ctx.output
            .key_value("Mapping file", &outcome.mapping_path.display().to_string());

        if outcome.errored > 0 {
            ctx.output
                .error(&format!("{} resources failed to import", outcome.errored));
        } else if outcome.aborted {
            ctx.output.error("Import aborted");
        } else {
            ctx.output.success("Import finished");
        }
    }
}

/// The user pressed Ctrl+C or Escape in a prompt
fn is_interrupted(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<InquireError>(),
        Some(InquireError::OperationInterrupted | InquireError::OperationCanceled)
    )
}
