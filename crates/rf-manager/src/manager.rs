//! Rules index manager
//!
//! Owns the rule buffers and the live `RulesIndex`, and keeps the index in
//! sync with the rule sources. All methods run on the owner thread; file
//! reads and index builds are posted to a `TaskRunner` and their results come
//! back as replies, handled by `process_replies` or `run_until_idle`.
//!
//! # States
//!
//! - `Idle`: nothing in flight
//! - `ReloadInProgress`: one build and/or index read is in flight. Rebuild
//!   requests made meanwhile are coalesced; a finished cycle that no longer
//!   matches the current buffers is detected when the index is read back.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use rf_core::{IndexData, ProcessKey, RuleBufferHolder, RuleBuffers, RulesIndex};

use crate::config::ManagerConfig;
use crate::files::{build_and_save_index, read_index, read_rules_buffer};
use crate::runner::TaskRunner;
use crate::source::RuleSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerState {
    Idle,
    ReloadInProgress,
}

/// Notified on the owner thread when the index changes.
pub trait RulesIndexObserver {
    /// A new index was installed.
    fn on_rules_index_loaded(&self, _index: &RulesIndex) {}

    /// The checksum of the stored index changed and should be persisted
    /// along with the sources. Empty when saving the index failed.
    fn on_index_checksum_changed(&self, _checksum: &str) {}
}

/// Result of a background task.
enum Reply {
    RulesRead {
        source_id: u32,
        checksum: String,
        buffer: Option<RuleBufferHolder>,
    },
    IndexBuilt {
        checksum: String,
    },
    IndexRead {
        data: Option<IndexData>,
    },
}

pub struct RulesIndexManager {
    config: ManagerConfig,
    runner: Box<dyn TaskRunner>,
    replies_tx: UnboundedSender<Reply>,
    replies_rx: UnboundedReceiver<Reply>,
    /// Tasks posted whose reply was not handled yet
    pending_tasks: usize,
    /// Rules reads issued at construction that did not complete yet
    initial_reads: usize,

    sources: BTreeMap<u32, RuleSource>,
    buffers: RuleBuffers,
    index: Option<RulesIndex>,
    index_checksum: String,

    state: ManagerState,
    index_read_failures: u32,
    rebuild_count: usize,
    observer: Option<Box<dyn RulesIndexObserver>>,
}

impl RulesIndexManager {
    /// Start managing `sources`. Stored rules lists are read in the
    /// background; `index_checksum` is the checksum of the previously saved
    /// index, if any. Without it the index is rebuilt as soon as the stored
    /// rules lists are loaded.
    pub fn new(
        config: ManagerConfig,
        sources: impl IntoIterator<Item = RuleSource>,
        index_checksum: impl Into<String>,
        runner: Box<dyn TaskRunner>,
    ) -> Self {
        let (replies_tx, replies_rx) = unbounded_channel();
        let mut manager = Self {
            config,
            runner,
            replies_tx,
            replies_rx,
            pending_tasks: 0,
            initial_reads: 0,
            sources: sources.into_iter().map(|source| (source.id, source)).collect(),
            buffers: RuleBuffers::new(),
            index: None,
            index_checksum: index_checksum.into(),
            state: ManagerState::Idle,
            index_read_failures: 0,
            rebuild_count: 0,
            observer: None,
        };

        let to_read: Vec<(u32, String)> = manager
            .sources
            .values()
            .filter(|source| !source.rules_list_checksum.is_empty())
            .map(|source| (source.id, source.rules_list_checksum.clone()))
            .collect();
        manager.initial_reads = to_read.len();
        for (source_id, checksum) in to_read {
            manager.read_rules(source_id, checksum);
        }

        if manager.index_checksum.is_empty() {
            // With reads in flight, the last one to finish starts the build
            if manager.initial_reads == 0 {
                manager.rebuild_index();
            }
        } else {
            manager.state = ManagerState::ReloadInProgress;
            let checksum = manager.index_checksum.clone();
            manager.read_index(checksum);
        }

        manager
    }

    pub fn set_observer(&mut self, observer: Box<dyn RulesIndexObserver>) {
        self.observer = Some(observer);
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub fn state(&self) -> ManagerState {
        self.state
    }

    /// The live index. `None` until the first index is loaded.
    pub fn rules_index(&self) -> Option<&RulesIndex> {
        self.index.as_ref()
    }

    /// Mutable access for the cached activation queries.
    pub fn rules_index_mut(&mut self) -> Option<&mut RulesIndex> {
        self.index.as_mut()
    }

    pub fn index_checksum(&self) -> &str {
        &self.index_checksum
    }

    pub fn sources(&self) -> impl Iterator<Item = &RuleSource> {
        self.sources.values()
    }

    pub fn buffers(&self) -> &RuleBuffers {
        &self.buffers
    }

    /// Number of index builds started so far.
    pub fn rebuild_count(&self) -> usize {
        self.rebuild_count
    }

    pub fn is_idle(&self) -> bool {
        self.state == ManagerState::Idle && self.pending_tasks == 0
    }

    // =========================================================================
    // Replies
    // =========================================================================

    /// Handle every reply that already arrived, without blocking.
    pub fn process_replies(&mut self) {
        while let Ok(reply) = self.replies_rx.try_recv() {
            self.handle_reply(reply);
        }
    }

    /// Handle replies until no task is in flight anymore.
    pub fn run_until_idle(&mut self) {
        while self.pending_tasks > 0 {
            match self.replies_rx.blocking_recv() {
                Some(reply) => self.handle_reply(reply),
                None => break,
            }
        }
    }

    fn handle_reply(&mut self, reply: Reply) {
        self.pending_tasks = self.pending_tasks.saturating_sub(1);
        match reply {
            Reply::RulesRead {
                source_id,
                checksum,
                buffer,
            } => self.on_rules_read(source_id, checksum, buffer),
            Reply::IndexBuilt { checksum } => self.on_index_built(checksum),
            Reply::IndexRead { data } => self.on_index_read(data),
        }
    }

    fn post<F>(&mut self, task: F)
    where
        F: FnOnce() -> Reply + Send + 'static,
    {
        let replies = self.replies_tx.clone();
        self.pending_tasks += 1;
        self.runner.post_task(Box::new(move || {
            // Only fails once the manager is gone
            let _ = replies.send(task());
        }));
    }

    // =========================================================================
    // Rule sources
    // =========================================================================

    /// A rule source was added, fetched or changed state.
    pub fn on_rule_source_updated(&mut self, source: RuleSource) {
        if source.is_fetching {
            log::debug!("Source {} is still fetching, ignoring update", source.id);
            return;
        }
        if !source.last_fetch_result.is_usable() {
            log::debug!("Source {} fetch failed ({:?}), keeping its rules", source.id, source.last_fetch_result);
            match self.sources.get_mut(&source.id) {
                Some(known) => known.last_fetch_result = source.last_fetch_result,
                None => {
                    self.sources.insert(source.id, source);
                }
            }
            return;
        }

        let unchanged = self
            .sources
            .get(&source.id)
            .is_some_and(|known| known.rules_list_checksum == source.rules_list_checksum);
        let source_id = source.id;
        let checksum = source.rules_list_checksum.clone();
        self.sources.insert(source_id, source);
        if unchanged && (checksum.is_empty() || self.buffers.contains_key(&source_id)) {
            return;
        }

        if checksum.is_empty() {
            // Nothing usable stored for this source
            if self.buffers.remove(&source_id).is_some() {
                self.rebuild_index();
            }
            return;
        }
        self.read_rules(source_id, checksum);
    }

    /// A rule source went away.
    pub fn on_rule_source_deleted(&mut self, source_id: u32) {
        self.sources.remove(&source_id);
        // The live index keeps its own reference until it is replaced
        self.buffers.remove(&source_id);
        log::info!("Source {} deleted", source_id);
        self.rebuild_index();
    }

    /// Exception lists only affect activations, so the index stays valid.
    pub fn on_exception_list_changed(&mut self) {
        if let Some(index) = &mut self.index {
            index.invalidate_activation_cache();
        }
    }

    pub fn on_process_destroyed(&mut self, process: ProcessKey) {
        if let Some(index) = &mut self.index {
            index.on_process_destroyed(process);
        }
    }

    fn read_rules(&mut self, source_id: u32, checksum: String) {
        let rules_dir = self.config.rules_dir.clone();
        self.post(move || {
            let buffer = match read_rules_buffer(&rules_dir, source_id, &checksum) {
                Ok(buffer) => Some(buffer),
                Err(e) => {
                    log::warn!("Failed to read rules of source {}: {}", source_id, e);
                    None
                }
            };
            Reply::RulesRead {
                source_id,
                checksum,
                buffer,
            }
        });
    }

    fn on_rules_read(&mut self, source_id: u32, checksum: String, buffer: Option<RuleBufferHolder>) {
        let initial_done = self.initial_reads == 1;
        self.initial_reads = self.initial_reads.saturating_sub(1);
        let current = self.sources.get(&source_id).map(|source| source.rules_list_checksum.as_str());
        if current != Some(checksum.as_str()) {
            log::debug!("Discarding stale rules read of source {}", source_id);
            // The deferred first build still has to happen
            if initial_done {
                self.rebuild_index();
            }
            return;
        }

        match buffer {
            Some(buffer) => {
                self.buffers.insert(source_id, Arc::new(buffer));
            }
            None => {
                // Unreadable rules count as no rules
                self.buffers.remove(&source_id);
            }
        }
        if self.initial_reads > 0 {
            return;
        }
        self.rebuild_index();
    }

    // =========================================================================
    // Index
    // =========================================================================

    fn rebuild_index(&mut self) {
        if self.state == ManagerState::ReloadInProgress {
            log::debug!("Index reload already in progress");
            return;
        }

        self.state = ManagerState::ReloadInProgress;
        self.rebuild_count += 1;
        log::info!("Rebuilding rules index from {} sources", self.buffers.len());

        let rules_dir = self.config.rules_dir.clone();
        let buffers = self.buffers.clone();
        self.post(move || Reply::IndexBuilt {
            checksum: build_and_save_index(&rules_dir, &buffers),
        });
    }

    fn on_index_built(&mut self, checksum: String) {
        if checksum != self.index_checksum {
            self.index_checksum = checksum.clone();
            if let Some(observer) = &self.observer {
                observer.on_index_checksum_changed(&checksum);
            }
        }
        self.read_index(checksum);
    }

    fn read_index(&mut self, checksum: String) {
        if checksum.is_empty() {
            log::warn!("No index to read, giving up on this reload");
            self.state = ManagerState::Idle;
            return;
        }

        let rules_dir = self.config.rules_dir.clone();
        self.post(move || {
            let data = match read_index(&rules_dir, &checksum) {
                Ok(data) => Some(data),
                Err(e) => {
                    log::warn!("Failed to read rules index: {}", e);
                    None
                }
            };
            Reply::IndexRead { data }
        });
    }

    fn on_index_read(&mut self, data: Option<IndexData>) {
        self.state = ManagerState::Idle;

        let Some(data) = data.filter(|data| RulesIndex::buffers_match(data, &self.buffers)) else {
            self.on_index_read_failed();
            return;
        };
        self.index_read_failures = 0;

        let complete = data.source_checksums.keys().eq(self.buffers.keys());
        let buffers: RuleBuffers = data
            .source_checksums
            .keys()
            .filter_map(|source_id| Some((*source_id, Arc::clone(self.buffers.get(source_id)?))))
            .collect();
        let index = RulesIndex::new(data, buffers, self.config.index_config());
        log::info!("Installed rules index: {:?}", index.stats());

        if let Some(observer) = &self.observer {
            observer.on_rules_index_loaded(&index);
        }
        // Dropping the previous index releases buffers no longer in use
        self.index = Some(index);

        if !complete {
            log::info!("Sources changed while building, rebuilding again");
            self.rebuild_index();
        }
    }

    fn on_index_read_failed(&mut self) {
        self.index_read_failures += 1;
        if self.index_read_failures > self.config.max_index_read_failures {
            log::warn!(
                "Rules index unreadable after {} attempts, giving up",
                self.index_read_failures
            );
            return;
        }
        log::info!(
            "Rules index stale or unreadable (attempt {}), rebuilding",
            self.index_read_failures
        );
        self.rebuild_index();
    }
}
