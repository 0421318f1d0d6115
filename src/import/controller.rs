//! Session controller for resource imports.
//!
//! The controller owns every [`ResourceItem`] of a session and is the only
//! code that changes them. It sequences discovery, type resolution (from
//! recommendations, a replayed mapping file, or interactive edits), bounded
//! parallel execution of imports, and persistence of every transition to the
//! mapping file. Workers never touch items: they report completions over a
//! channel and the controller applies them one at a time.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;

use super::editor::{self, EditOutcome, Focus, UiEvent};
use super::executor::{ImportCompletion, ImportExecutor, ImportJob};
use super::item::{ItemStatus, ResourceItem};
use super::mapping::MappingStore;
use super::resolver::TypeResolver;
use crate::iac::IacEngine;
use crate::infrastructure::discovery::{DiscoveryProvider, Selector};
use crate::infrastructure::error::{ImportError, ImportResult};

/// Session-level settings
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub parallelism: usize,
    pub continue_on_error: bool,
    /// Prefix of generated target names, followed by the discovery index
    pub name_pattern: String,
    /// Dotted module path every target address is placed under
    pub module_path: String,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            parallelism: 10,
            continue_on_error: false,
            name_pattern: "res-".to_string(),
            module_path: String::new(),
        }
    }
}

/// Receives every item transition, after it has been persisted
pub trait TransitionObserver: Send + Sync {
    fn on_transition(&self, item: &ResourceItem);
}

/// Observer that only logs
pub struct LogObserver;

impl TransitionObserver for LogObserver {
    fn on_transition(&self, item: &ResourceItem) {
        tracing::info!(
            cloud_id = %item.cloud_id,
            address = %item.target_address,
            status = %item.status,
            "item updated"
        );
    }
}

/// Final state of one item, as reported to the caller
#[derive(Debug, Clone, PartialEq)]
pub struct ItemSummary {
    pub cloud_id: String,
    pub address: String,
    pub status: ItemStatus,
    pub error: Option<String>,
}

/// Result of a finished session
#[derive(Debug, Clone)]
pub struct SessionOutcome {
    pub imported: usize,
    pub skipped: usize,
    pub errored: usize,
    /// Items that ended without a resolution (never scheduled, or invalid type)
    pub pending: usize,
    pub mapping_path: PathBuf,
    /// The user stopped the session before every item was resolved
    pub aborted: bool,
    pub items: Vec<ItemSummary>,
}

impl SessionOutcome {
    /// Process exit status: non-zero if any item errored or the user aborted
    pub fn exit_code(&self) -> i32 {
        if self.errored > 0 || self.aborted { 1 } else { 0 }
    }
}

/// What one round of imports did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundReport {
    pub scheduled: usize,
    pub failed: usize,
    /// Scheduling stopped early (failure without continue-on-error, or abort)
    pub halted: bool,
}

pub struct SessionController {
    items: Vec<ResourceItem>,
    index: HashMap<String, usize>,
    focus: Vec<Focus>,
    options: SessionOptions,
    store: MappingStore,
    resolver: TypeResolver,
    engine: Arc<dyn IacEngine>,
    executor: Arc<ImportExecutor>,
    observer: Arc<dyn TransitionObserver>,
    abort: Arc<AtomicBool>,
    halted: bool,
    fatal: Option<ImportError>,
    /// Imported items whose address was removed from state but whose reopen
    /// could not be recorded
    state_removed: HashSet<usize>,
}

impl SessionController {
    pub fn new(
        options: SessionOptions,
        store: MappingStore,
        resolver: TypeResolver,
        engine: Arc<dyn IacEngine>,
        observer: Arc<dyn TransitionObserver>,
    ) -> Self {
        let executor = Arc::new(ImportExecutor::new(Arc::clone(&engine), options.parallelism));
        Self {
            items: Vec::new(),
            index: HashMap::new(),
            focus: Vec::new(),
            options,
            store,
            resolver,
            engine,
            executor,
            observer,
            abort: Arc::new(AtomicBool::new(false)),
            halted: false,
            fatal: None,
            state_removed: HashSet::new(),
        }
    }

    /// Share a stop flag that an outside signal handler may raise
    pub fn with_abort_flag(mut self, abort: Arc<AtomicBool>) -> Self {
        self.abort = abort;
        self
    }

    /// Whether the stop flag has been raised
    pub fn aborted(&self) -> bool {
        self.abort.load(Ordering::SeqCst)
    }

    /// Items in discovery order
    pub fn items(&self) -> &[ResourceItem] {
        &self.items
    }

    pub fn item(&self, cloud_id: &str) -> Option<&ResourceItem> {
        self.index.get(cloud_id).map(|&i| &self.items[i])
    }

    /// Run discovery and build the session, merging the loaded mapping file
    ///
    /// Items recorded as Imported keep their binding and are never scheduled
    /// again. Every other recorded item starts over as Pending, keeping its
    /// target name and previously chosen type.
    pub fn discover(
        &mut self,
        provider: &dyn DiscoveryProvider,
        selector: &Selector,
    ) -> ImportResult<()> {
        let descriptors = provider.discover(selector)?;
        tracing::info!(
            selector = %selector.describe(),
            count = descriptors.len(),
            "discovered resources"
        );

        for (position, desc) in descriptors.iter().enumerate() {
            if self.index.contains_key(&desc.cloud_id) {
                tracing::warn!(cloud_id = %desc.cloud_id, "duplicate resource in discovery, ignored");
                continue;
            }

            let mut item = ResourceItem::from_descriptor(desc, position, &self.options.name_pattern)
                .in_module(&self.options.module_path);
            if let Some(record) = self.store.get(&item.cloud_id) {
                item.revision = record.revision;
                item.target_name = record.target_name.clone();
                if record.status == ItemStatus::Imported {
                    item.set_target_type(&record.target_type);
                    // The state entry lives where it was imported to
                    if !record.target_address.is_empty() {
                        item.target_address = record.target_address.clone();
                    }
                    item.status = ItemStatus::Imported;
                } else if item.preset_type.is_none() && !record.target_type.is_empty() {
                    item.preset_type = Some(record.target_type.clone());
                }
            }

            self.index.insert(item.cloud_id.clone(), self.items.len());
            self.items.push(item);
            self.focus.push(Focus::Unfocused);
        }

        for idx in 0..self.items.len() {
            self.seed_type(idx)?;
        }
        Ok(())
    }

    fn seed_type(&mut self, idx: usize) -> ImportResult<()> {
        let item = &mut self.items[idx];
        if item.status != ItemStatus::Pending {
            return Ok(());
        }

        if let Some(preset) = item.preset_type.clone() {
            item.set_target_type(&preset);
            return Ok(());
        }

        if let Some(recommended) = self.resolver.recommendation(item) {
            item.set_target_type(&recommended);
            item.is_recommended = true;
            self.transition(idx, ItemStatus::Recommended)?;
        }
        Ok(())
    }

    /// Resolve every open item without user input
    ///
    /// The current (preset or recommended) type is validated; an unresolvable
    /// item is Skipped, an invalid type leaves the item Pending with a
    /// validation error. Items that already carry a validation error from an
    /// interactive edit are left for the user to fix.
    pub fn auto_resolve(&mut self) -> ImportResult<()> {
        for idx in 0..self.items.len() {
            let item = &self.items[idx];
            if !matches!(item.status, ItemStatus::Pending | ItemStatus::Recommended)
                || item.validation_error.is_some()
            {
                continue;
            }

            match self.resolver.resolve(item, &item.target_type) {
                Ok(resource_type) => {
                    self.items[idx].set_target_type(&resource_type);
                    let next = if resource_type.is_empty() {
                        ItemStatus::Skipped
                    } else {
                        ItemStatus::Validated
                    };
                    self.transition(idx, next)?;
                }
                Err(e @ ImportError::InvalidType { .. }) => {
                    let item = &mut self.items[idx];
                    tracing::warn!(cloud_id = %item.cloud_id, error = %e, "unresolved resource type");
                    item.validation_error = Some(e.to_string());
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Route a UI event to one item
    ///
    /// The event is applied to a copy of the item, which replaces the item
    /// only once a status change is recorded in the mapping file. When the
    /// editor removed an import from state but the write failed, the item
    /// stays Imported in memory and the removal is remembered, so the next
    /// attempt does not call the engine again.
    pub fn handle_event(&mut self, cloud_id: &str, event: UiEvent) -> ImportResult<EditOutcome> {
        let idx = *self
            .index
            .get(cloud_id)
            .ok_or_else(|| ImportError::Discovery(format!("unknown resource {}", cloud_id)))?;

        let mut updated = self.items[idx].clone();
        let mut focus = self.focus[idx].clone();
        let state_removed = self.state_removed.contains(&idx);
        let outcome = editor::dispatch(
            &mut updated,
            &mut focus,
            event,
            &self.resolver,
            self.engine.as_ref(),
            state_removed,
        )?;

        if updated.revision != self.items[idx].revision {
            let compensated = self.items[idx].status == ItemStatus::Imported
                && outcome == EditOutcome::Focused;
            if let Err(e) = self.store.record_transition(&updated) {
                if compensated {
                    self.state_removed.insert(idx);
                }
                tracing::error!(cloud_id, error = %e, "could not record edit");
                return Err(e);
            }
            self.state_removed.remove(&idx);
            self.items[idx] = updated;
            self.focus[idx] = focus;
            self.observer.on_transition(&self.items[idx]);
        } else {
            self.items[idx] = updated;
            self.focus[idx] = focus;
        }
        Ok(outcome)
    }

    /// Import every Validated item, at most `parallelism` at a time
    ///
    /// Items are started in discovery order. After a failure without
    /// continue-on-error, an abort, or a fatal error, nothing new is started,
    /// running imports finish, and items that never started go back to
    /// Pending. A fatal error is returned once the running imports are done.
    pub async fn run_imports(&mut self) -> ImportResult<RoundReport> {
        self.halted = false;
        let mut report = RoundReport {
            scheduled: 0,
            failed: 0,
            halted: false,
        };

        let mut queue: VecDeque<usize> = (0..self.items.len())
            .filter(|&i| self.items[i].is_schedulable())
            .collect();
        let (tx, mut rx) = mpsc::unbounded_channel::<ImportCompletion>();
        let mut in_flight = 0usize;

        tracing::info!(
            count = queue.len(),
            parallelism = self.executor.parallelism(),
            "starting imports"
        );

        loop {
            if self.should_stop() && !queue.is_empty() {
                report.halted = true;
                for idx in queue.drain(..) {
                    self.unschedule(idx);
                }
            }

            if queue.is_empty() {
                if in_flight == 0 {
                    break;
                }
                match rx.recv().await {
                    Some(completion) => {
                        in_flight -= 1;
                        report.failed += self.apply_completion(completion);
                    }
                    None => break,
                }
                continue;
            }

            let executor = Arc::clone(&self.executor);
            tokio::select! {
                biased;

                Some(completion) = rx.recv(), if in_flight > 0 => {
                    in_flight -= 1;
                    report.failed += self.apply_completion(completion);
                }
                permit = executor.acquire() => {
                    if self.should_stop() {
                        continue;
                    }
                    let Some(idx) = queue.pop_front() else { continue };
                    if !self.start(idx) {
                        continue;
                    }
                    executor.spawn(permit, ImportJob::from_item(&self.items[idx]), tx.clone());
                    in_flight += 1;
                    report.scheduled += 1;
                }
            }
        }

        report.halted |= self.halted;
        match self.fatal.take() {
            Some(err) => Err(err),
            None => Ok(report),
        }
    }

    /// Write the final mapping and summarize the session
    ///
    /// An item whose import was removed from state without the reopen being
    /// recorded is written as Validated, ready to be imported again.
    pub fn finalize(&mut self) -> ImportResult<SessionOutcome> {
        let mut removed: Vec<usize> = self.state_removed.drain().collect();
        removed.sort_unstable();
        for idx in removed {
            let item = &mut self.items[idx];
            if item.status == ItemStatus::Imported {
                item.set_status(ItemStatus::Editing)?;
                item.set_status(ItemStatus::Validated)?;
            }
        }

        self.store.finalize(&self.items)?;

        let mut outcome = SessionOutcome {
            imported: 0,
            skipped: 0,
            errored: 0,
            pending: 0,
            mapping_path: self.store.path().to_path_buf(),
            aborted: self.aborted(),
            items: Vec::with_capacity(self.items.len()),
        };

        for item in &self.items {
            match item.status {
                ItemStatus::Imported => outcome.imported += 1,
                ItemStatus::Skipped => outcome.skipped += 1,
                ItemStatus::Errored => outcome.errored += 1,
                _ => outcome.pending += 1,
            }
            outcome.items.push(ItemSummary {
                cloud_id: item.cloud_id.clone(),
                address: item.target_address.clone(),
                status: item.status,
                error: item
                    .import_error
                    .clone()
                    .or_else(|| item.validation_error.clone()),
            });
        }

        Ok(outcome)
    }

    fn should_stop(&self) -> bool {
        self.halted || self.fatal.is_some() || self.abort.load(Ordering::SeqCst)
    }

    /// Move an item to Importing; false if that could not be recorded
    fn start(&mut self, idx: usize) -> bool {
        self.items[idx].import_error = None;
        match self.transition(idx, ItemStatus::Importing) {
            Ok(()) => true,
            Err(e) => {
                self.fail_session(e);
                false
            }
        }
    }

    fn unschedule(&mut self, idx: usize) {
        if let Err(e) = self.transition(idx, ItemStatus::Pending) {
            self.fail_session(e);
        }
    }

    /// Apply a worker result; returns 1 if the import failed
    fn apply_completion(&mut self, completion: ImportCompletion) -> usize {
        let Some(&idx) = self.index.get(&completion.cloud_id) else {
            tracing::error!(cloud_id = %completion.cloud_id, "completion for unknown resource");
            return 0;
        };

        let failed = completion.result.is_err();
        let next = match completion.result {
            Ok(()) => ItemStatus::Imported,
            Err(e) => {
                self.items[idx].import_error = Some(e.to_string());
                if e.is_fatal() {
                    tracing::error!(cloud_id = %completion.cloud_id, error = %e, "fatal engine error, stopping");
                    self.fail_session(e);
                } else if !self.options.continue_on_error {
                    tracing::warn!(cloud_id = %completion.cloud_id, "import failed, stopping new imports");
                    self.halted = true;
                }
                ItemStatus::Errored
            }
        };

        if let Err(e) = self.transition(idx, next) {
            self.fail_session(e);
        }

        usize::from(failed)
    }

    fn fail_session(&mut self, err: ImportError) {
        if self.fatal.is_none() {
            self.fatal = Some(err);
        }
    }

    /// Apply and record one status change
    ///
    /// The item only changes once the mapping file holds the new revision.
    fn transition(&mut self, idx: usize, next: ItemStatus) -> ImportResult<()> {
        let mut updated = self.items[idx].clone();
        updated.set_status(next)?;
        self.store.record_transition(&updated)?;
        self.items[idx] = updated;
        self.observer.on_transition(&self.items[idx]);
        Ok(())
    }
}
