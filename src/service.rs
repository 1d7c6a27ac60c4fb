use std::path::{Path, PathBuf};
use std::sync::Arc;

use notify::{EventKind, RecursiveMode, Watcher};
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, info, warn};

use crate::store::NoteStore;
use crate::{Error, Linker, ReplaceReport, Result, Settings, SyncReport, Vault, VaultPath};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchKind {
    Create,
    Modify,
    Remove,
    Rename,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncCause {
    /// Explicit request from the host (CLI command, API call).
    Manual,
    /// The full pass run when the service starts.
    InitialSync,
    /// A debounced filesystem event.
    Watch { kind: WatchKind, event_kind: String },
}

#[derive(Debug, Clone)]
pub enum LinkerEvent {
    /// A whole-vault pass finished.
    FullSync {
        cause: SyncCause,
        report: SyncReport,
    },
    Synced {
        path: VaultPath,
        cause: SyncCause,
        report: SyncReport,
    },
    Removed {
        path: VaultPath,
        cause: SyncCause,
        report: SyncReport,
    },
    Renamed {
        from: VaultPath,
        to: VaultPath,
        cause: SyncCause,
        report: SyncReport,
    },
    SettingsReloaded {
        source_pages: usize,
    },
    Error {
        path: Option<VaultPath>,
        error: String,
    },
}

/// Watches a vault and keeps hub pages current as notes change.
///
/// Holds the settings snapshot in a watch channel; every batch of filesystem events is
/// processed against the snapshot current when the batch started.
pub struct LinkerService {
    vault: Vault,
    settings_path: PathBuf,
    settings_tx: Arc<watch::Sender<Arc<Settings>>>,
    events: broadcast::Sender<LinkerEvent>,
    shutdown_tx: watch::Sender<bool>,
    watcher: Option<notify::RecommendedWatcher>,
    watch_task: Option<tokio::task::JoinHandle<()>>,
}

impl LinkerService {
    /// Build a service over `vault`. Settings are validated like [`Self::update_settings`].
    pub fn new(vault: Vault, settings: Settings) -> Result<Self> {
        let settings_path = vault.settings_path();
        Self::with_settings_path(vault, settings, settings_path)
    }

    /// Like [`Self::new`], reloading settings from `settings_path` when it changes.
    ///
    /// Relative paths resolve against the working directory. A file outside the vault is
    /// watched through its parent directory.
    pub fn with_settings_path(
        vault: Vault,
        settings: Settings,
        settings_path: PathBuf,
    ) -> Result<Self> {
        settings.validate()?;
        let settings_path = resolve_settings_path(&settings_path)?;
        if !settings_path.starts_with(vault.root()) {
            warn!(
                path = %settings_path.display(),
                root = %vault.root().display(),
                "settings file is outside the vault; watching its folder separately"
            );
        }

        let (events, _) = broadcast::channel(512);
        let (shutdown_tx, _) = watch::channel(false);
        let (settings_tx, _) = watch::channel(Arc::new(settings));
        Ok(Self {
            vault,
            settings_path,
            settings_tx: Arc::new(settings_tx),
            events,
            shutdown_tx,
            watcher: None,
            watch_task: None,
        })
    }

    /// Open a service with settings read from the vault's settings file.
    pub fn load(vault: Vault) -> Result<Self> {
        let settings = Settings::load(&vault.settings_path())?;
        Self::new(vault, settings)
    }

    pub fn settings_path(&self) -> &Path {
        &self.settings_path
    }

    pub fn vault(&self) -> &Vault {
        &self.vault
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LinkerEvent> {
        self.events.subscribe()
    }

    pub fn settings(&self) -> Arc<Settings> {
        Arc::clone(&self.settings_tx.borrow())
    }

    /// Replace the settings snapshot. Invalid settings are rejected and the old ones kept.
    pub fn update_settings(&self, settings: Settings) -> Result<()> {
        settings.validate()?;
        let source_pages = settings.source_pages.len();
        self.settings_tx.send_replace(Arc::new(settings));
        let _ = self
            .events
            .send(LinkerEvent::SettingsReloaded { source_pages });
        Ok(())
    }

    pub async fn sync_all(&self) -> Result<SyncReport> {
        self.full_sync(SyncCause::Manual).await
    }

    pub async fn bulk_replace(&self, property: &str, old: &str, new: &str) -> Result<ReplaceReport> {
        let vault = self.vault.clone();
        let settings = self.settings();
        let (property, old, new) = (property.to_string(), old.to_string(), new.to_string());
        tokio::task::spawn_blocking(move || {
            Linker::new(&vault, &settings).bulk_replace(&property, &old, &new)
        })
        .await
        .map_err(|e| Error::InvalidRequest(format!("bulk replace task failed: {e}")))?
    }

    /// Run the initial sync, then start watching.
    pub async fn start(&mut self) -> Result<SyncReport> {
        let report = self.full_sync(SyncCause::InitialSync).await?;
        self.start_watching().await?;
        Ok(report)
    }

    pub async fn start_watching(&mut self) -> Result<()> {
        if self.watcher.is_some() {
            return Ok(());
        }

        let (raw_tx, raw_rx) =
            mpsc::unbounded_channel::<std::result::Result<notify::Event, notify::Error>>();
        let mut watcher = notify::recommended_watcher(move |res| {
            let _ = raw_tx.send(res);
        })?;
        watcher.watch(self.vault.root(), RecursiveMode::Recursive)?;
        if !self.settings_path.starts_with(self.vault.root()) {
            if let Some(dir) = self.settings_path.parent() {
                if let Err(err) = watcher.watch(dir, RecursiveMode::NonRecursive) {
                    warn!(path = %dir.display(), error = %err, "cannot watch settings folder");
                }
            }
        }

        let ctx = WatchContext {
            vault: self.vault.clone(),
            settings_path: self.settings_path.clone(),
            settings_tx: Arc::clone(&self.settings_tx),
        };
        let events = self.events.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let debounce = self.vault.config().watch_debounce;
        self.watch_task = Some(tokio::spawn(async move {
            watch_loop(ctx, events, raw_rx, &mut shutdown_rx, debounce).await;
        }));
        self.watcher = Some(watcher);
        info!(root = %self.vault.root().display(), "watching vault");

        Ok(())
    }

    pub async fn shutdown(&mut self) {
        let _ = self.shutdown_tx.send(true);
        self.watcher.take();
        if let Some(handle) = self.watch_task.take() {
            let _ = handle.await;
        }
    }

    async fn full_sync(&self, cause: SyncCause) -> Result<SyncReport> {
        let vault = self.vault.clone();
        let settings = self.settings();
        let report = tokio::task::spawn_blocking(move || Linker::new(&vault, &settings).sync_all())
            .await
            .map_err(|e| Error::InvalidRequest(format!("sync task failed: {e}")))??;
        let _ = self.events.send(LinkerEvent::FullSync { cause, report });
        Ok(report)
    }
}

impl Drop for LinkerService {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
    }
}

#[derive(Clone)]
struct WatchContext {
    vault: Vault,
    settings_path: PathBuf,
    settings_tx: Arc<watch::Sender<Arc<Settings>>>,
}

async fn watch_loop(
    ctx: WatchContext,
    events: broadcast::Sender<LinkerEvent>,
    mut raw_rx: mpsc::UnboundedReceiver<std::result::Result<notify::Event, notify::Error>>,
    shutdown_rx: &mut watch::Receiver<bool>,
    debounce: std::time::Duration,
) {
    let mut pending: Vec<notify::Event> = Vec::new();
    let mut debounce_armed = false;
    let debounce_timer =
        tokio::time::sleep(std::time::Duration::from_secs(60 * 60 * 24 * 365 * 10));
    tokio::pin!(debounce_timer);

    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        tokio::select! {
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    break;
                }
            }

            maybe = raw_rx.recv() => {
                let Some(res) = maybe else { break; };
                match res {
                    Ok(ev) => {
                        pending.push(ev);
                        debounce_armed = true;
                        debounce_timer
                            .as_mut()
                            .reset(tokio::time::Instant::now() + debounce);
                    }
                    Err(err) => {
                        warn!(error = %err, "watch error");
                        let _ = events.send(LinkerEvent::Error { path: None, error: err.to_string() });
                    }
                }
            }

            _ = &mut debounce_timer, if debounce_armed => {
                debounce_armed = false;
                if pending.is_empty() {
                    continue;
                }

                let batch = std::mem::take(&mut pending);
                let ctx2 = ctx.clone();
                let applied = tokio::task::spawn_blocking(move || apply_events(&ctx2, batch)).await;
                match applied {
                    Ok(list) => {
                        for ev in list {
                            let _ = events.send(ev);
                        }
                    }
                    Err(join_err) => {
                        let _ = events.send(LinkerEvent::Error { path: None, error: join_err.to_string() });
                    }
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Op {
    ReloadSettings,
    Upsert {
        path: VaultPath,
        cause: SyncCause,
    },
    Remove {
        path: VaultPath,
        cause: SyncCause,
    },
    Rename {
        from: VaultPath,
        to: VaultPath,
        cause: SyncCause,
    },
}

fn apply_events(ctx: &WatchContext, batch: Vec<notify::Event>) -> Vec<LinkerEvent> {
    let ops = events_to_ops(&ctx.vault, &ctx.settings_path, &batch);
    let mut out = Vec::new();

    // Settings reloads are ordered first so the rest of the batch sees them.
    if ops.contains(&Op::ReloadSettings) {
        out.push(reload_settings(ctx));
    }

    let settings = Arc::clone(&ctx.settings_tx.borrow());
    let vault = &ctx.vault;
    let linker = Linker::new(vault, &settings);

    for op in ops {
        match op {
            Op::ReloadSettings => {}
            Op::Upsert { path, cause } => {
                match std::fs::metadata(vault.to_abs(&path)) {
                    Ok(meta) if !meta.is_file() => continue,
                    Ok(_) => {}
                    Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                        let report = linker.handle_delete(&path);
                        out.push(LinkerEvent::Removed { path, cause, report });
                        continue;
                    }
                    Err(err) => {
                        out.push(LinkerEvent::Error {
                            path: Some(path),
                            error: err.to_string(),
                        });
                        continue;
                    }
                }

                match vault.properties(&path) {
                    Ok(props) => {
                        let report = linker.handle_change(&path, props.as_ref());
                        debug!(path = %path.as_str_lossy(), changed = report.changed(), "note synced");
                        out.push(LinkerEvent::Synced { path, cause, report });
                    }
                    Err(err) => {
                        warn!(path = %path.as_str_lossy(), error = %err, "failed to read note properties");
                        out.push(LinkerEvent::Error {
                            path: Some(path),
                            error: err.to_string(),
                        });
                    }
                }
            }
            Op::Remove { path, cause } => {
                let report = linker.handle_delete(&path);
                out.push(LinkerEvent::Removed { path, cause, report });
            }
            Op::Rename { from, to, cause } => {
                let mut report = linker.handle_delete(&from);
                match vault.properties(&to) {
                    Ok(props) => {
                        let added = linker.handle_change(&to, props.as_ref());
                        report.linked += added.linked;
                        report.unlinked += added.unlinked;
                        report.failed += added.failed;
                    }
                    Err(err) => {
                        out.push(LinkerEvent::Error {
                            path: Some(to.clone()),
                            error: err.to_string(),
                        });
                    }
                }
                out.push(LinkerEvent::Renamed {
                    from,
                    to,
                    cause,
                    report,
                });
            }
        }
    }

    out
}

fn reload_settings(ctx: &WatchContext) -> LinkerEvent {
    let loaded = Settings::load(&ctx.settings_path).and_then(|s| {
        s.validate()?;
        Ok(s)
    });
    match loaded {
        Ok(settings) => {
            let source_pages = settings.source_pages.len();
            ctx.settings_tx.send_replace(Arc::new(settings));
            info!(path = %ctx.settings_path.display(), "settings reloaded");
            LinkerEvent::SettingsReloaded { source_pages }
        }
        Err(err) => {
            warn!(path = %ctx.settings_path.display(), error = %err, "keeping previous settings");
            LinkerEvent::Error {
                path: None,
                error: err.to_string(),
            }
        }
    }
}

fn events_to_ops(vault: &Vault, settings_path: &Path, batch: &[notify::Event]) -> Vec<Op> {
    let mut ops = Vec::new();
    let mut reload = false;

    for ev in batch {
        // Reading a note produces access/metadata events; treating them as changes would
        // make the service trigger itself.
        match &ev.kind {
            EventKind::Access(_) => continue,
            EventKind::Modify(notify::event::ModifyKind::Metadata(_)) => continue,
            _ => {}
        }

        if ev.paths.iter().any(|p| p == settings_path) {
            reload = true;
            continue;
        }

        let cause = cause_from_event_kind(&ev.kind);
        match &ev.kind {
            EventKind::Modify(notify::event::ModifyKind::Name(_)) if ev.paths.len() == 2 => {
                let from = note_path(vault, &ev.paths[0]);
                let to = note_path(vault, &ev.paths[1]);
                match (from, to) {
                    (Some(from), Some(to)) => push_op(&mut ops, Op::Rename { from, to, cause }),
                    (Some(path), None) => push_op(&mut ops, Op::Remove { path, cause }),
                    (None, Some(path)) => push_op(&mut ops, Op::Upsert { path, cause }),
                    (None, None) => {}
                }
            }
            EventKind::Remove(_) => {
                for p in &ev.paths {
                    if let Some(path) = note_path(vault, p) {
                        push_op(
                            &mut ops,
                            Op::Remove {
                                path,
                                cause: cause.clone(),
                            },
                        );
                    }
                }
            }
            _ => {
                for p in &ev.paths {
                    if let Some(path) = note_path(vault, p) {
                        push_op(
                            &mut ops,
                            Op::Upsert {
                                path,
                                cause: cause.clone(),
                            },
                        );
                    }
                }
            }
        }
    }

    if reload {
        ops.insert(0, Op::ReloadSettings);
    }
    ops
}

/// Queue an op unless the same kind of op for the same path is already queued.
fn push_op(ops: &mut Vec<Op>, op: Op) {
    let duplicate = ops.iter().any(|existing| match (existing, &op) {
        (Op::Upsert { path: a, .. }, Op::Upsert { path: b, .. }) => a == b,
        (Op::Remove { path: a, .. }, Op::Remove { path: b, .. }) => a == b,
        _ => false,
    });
    if !duplicate {
        ops.push(op);
    }
}

/// Absolute form of `path` with symlinks resolved, matching the paths notify reports.
/// The file itself may not exist yet; its folder is resolved when possible.
fn resolve_settings_path(path: &Path) -> Result<PathBuf> {
    let abs = std::path::absolute(path).map_err(|e| Error::io(path, e))?;
    if let Ok(p) = std::fs::canonicalize(&abs) {
        return Ok(p);
    }
    Ok(match (abs.parent(), abs.file_name()) {
        (Some(parent), Some(name)) => std::fs::canonicalize(parent)
            .map(|p| p.join(name))
            .unwrap_or(abs),
        _ => abs,
    })
}

fn note_path(vault: &Vault, abs: &Path) -> Option<VaultPath> {
    let rel = vault.to_rel(abs).ok()?;
    vault.is_note_rel(rel.as_path()).then_some(rel)
}

fn cause_from_event_kind(kind: &EventKind) -> SyncCause {
    let kind_name = match kind {
        EventKind::Create(_) => WatchKind::Create,
        EventKind::Remove(_) => WatchKind::Remove,
        EventKind::Modify(notify::event::ModifyKind::Name(_)) => WatchKind::Rename,
        EventKind::Modify(_) => WatchKind::Modify,
        _ => WatchKind::Other,
    };
    SyncCause::Watch {
        kind: kind_name,
        event_kind: format!("{kind:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SourceConfig;

    fn make_vault() -> (tempfile::TempDir, Vault) {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path().join("vault");
        std::fs::create_dir_all(&root).expect("create vault root");
        let vault = Vault::open(&root).expect("open vault");
        (dir, vault)
    }

    fn event(kind: EventKind, paths: Vec<PathBuf>) -> notify::Event {
        notify::Event {
            kind,
            paths,
            attrs: Default::default(),
        }
    }

    fn context(vault: &Vault, settings: Settings) -> WatchContext {
        let (tx, _) = watch::channel(Arc::new(settings));
        WatchContext {
            vault: vault.clone(),
            settings_path: vault.settings_path(),
            settings_tx: Arc::new(tx),
        }
    }

    #[test]
    fn access_and_metadata_events_are_ignored() {
        let (_temp, vault) = make_vault();
        let p = vault.root().join("a.md");
        std::fs::write(&p, "hi").unwrap();

        let access = event(
            EventKind::Access(notify::event::AccessKind::Open(
                notify::event::AccessMode::Any,
            )),
            vec![p.clone()],
        );
        let metadata = event(
            EventKind::Modify(notify::event::ModifyKind::Metadata(
                notify::event::MetadataKind::Any,
            )),
            vec![p],
        );

        assert!(events_to_ops(&vault, &vault.settings_path(), &[access, metadata]).is_empty());
    }

    #[test]
    fn only_notes_become_ops_and_duplicates_collapse() {
        let (_temp, vault) = make_vault();
        let note = vault.root().join("a.md");
        let image = vault.root().join("a.png");
        std::fs::write(&note, "x").unwrap();
        std::fs::write(&image, "x").unwrap();

        let modify = || {
            event(
                EventKind::Modify(notify::event::ModifyKind::Data(
                    notify::event::DataChange::Any,
                )),
                vec![note.clone(), image.clone()],
            )
        };
        let ops = events_to_ops(&vault, &vault.settings_path(), &[modify(), modify()]);
        assert_eq!(ops.len(), 1);
        assert!(matches!(&ops[0], Op::Upsert { path, .. } if path.as_str_lossy() == "a.md"));
    }

    #[test]
    fn renames_map_to_remove_upsert_or_rename() {
        let (_temp, vault) = make_vault();
        let old = vault.root().join("old.md");
        let new = vault.root().join("new.md");
        let txt = vault.root().join("new.txt");
        std::fs::write(&new, "x").unwrap();
        std::fs::write(&txt, "x").unwrap();

        let rename = |from: &PathBuf, to: &PathBuf| {
            event(
                EventKind::Modify(notify::event::ModifyKind::Name(
                    notify::event::RenameMode::Both,
                )),
                vec![from.clone(), to.clone()],
            )
        };
        let sp = vault.settings_path();
        assert!(matches!(
            events_to_ops(&vault, &sp, &[rename(&old, &new)])[..],
            [Op::Rename { .. }]
        ));
        assert!(matches!(
            events_to_ops(&vault, &sp, &[rename(&old, &txt)])[..],
            [Op::Remove { .. }]
        ));
    }

    #[test]
    fn settings_file_changes_reload_first() {
        let (_temp, vault) = make_vault();
        let note = vault.root().join("a.md");
        std::fs::write(&note, "x").unwrap();
        let settings_path = vault.settings_path();

        let create = |p: &PathBuf| event(EventKind::Create(notify::event::CreateKind::File), vec![p.clone()]);
        let ops = events_to_ops(&vault, &settings_path, &[create(&note), create(&settings_path)]);
        assert_eq!(ops.len(), 2);
        assert_eq!(ops[0], Op::ReloadSettings);
    }

    #[test]
    fn apply_events_links_created_notes_and_skips_directories() {
        let (_temp, vault) = make_vault();
        std::fs::create_dir_all(vault.root().join("sub")).unwrap();
        let note = vault.root().join("a.md");
        std::fs::write(&note, "---\nproject: SO1\n---\n").unwrap();
        let settings = Settings {
            excluded_properties: vec![],
            source_pages: vec![SourceConfig::legacy("project", "SO1", "Hub", "# Pages")],
        };
        let ctx = context(&vault, settings);

        let out = apply_events(
            &ctx,
            vec![
                event(
                    EventKind::Create(notify::event::CreateKind::Folder),
                    vec![vault.root().join("sub")],
                ),
                event(EventKind::Create(notify::event::CreateKind::File), vec![note]),
            ],
        );
        assert_eq!(out.len(), 1);
        assert!(matches!(&out[0], LinkerEvent::Synced { report, .. } if report.linked == 1));
        let hub = std::fs::read_to_string(vault.root().join("Hub.md")).unwrap();
        assert!(hub.contains("- [[a]]"));
    }

    #[test]
    fn constructors_reject_invalid_settings() {
        let (_temp, vault) = make_vault();
        let blank_value = Settings {
            excluded_properties: vec![],
            source_pages: vec![
                SourceConfig::new("Hub", "# Pages")
                    .with_condition(crate::Condition::contains("tags", "")),
            ],
        };
        assert!(matches!(
            LinkerService::new(vault.clone(), blank_value),
            Err(Error::InvalidSourceConfig { index: 0, .. })
        ));
        assert!(LinkerService::new(vault, Settings::default()).is_ok());
    }

    #[test]
    fn settings_path_is_resolved_before_matching_events() {
        let (temp, vault) = make_vault();
        let outside = temp.path().join("conf");
        std::fs::create_dir_all(&outside).unwrap();
        let dotted = outside.join("..").join("conf").join("propg.toml");

        let service =
            LinkerService::with_settings_path(vault.clone(), Settings::default(), dotted).unwrap();
        let resolved = std::fs::canonicalize(&outside).unwrap().join("propg.toml");
        assert_eq!(service.settings_path(), resolved.as_path());

        let modify = event(
            EventKind::Modify(notify::event::ModifyKind::Data(
                notify::event::DataChange::Any,
            )),
            vec![resolved],
        );
        assert_eq!(
            events_to_ops(&vault, service.settings_path(), &[modify]),
            vec![Op::ReloadSettings]
        );
    }

    #[test]
    fn relative_settings_path_becomes_absolute() {
        let resolved = resolve_settings_path(Path::new("propg-missing-dir/settings.toml")).unwrap();
        assert!(resolved.is_absolute());
        assert!(resolved.ends_with("propg-missing-dir/settings.toml"));
    }

    #[test]
    fn invalid_settings_on_disk_keep_the_previous_snapshot() {
        let (_temp, vault) = make_vault();
        let path = vault.settings_path();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(
            &path,
            "[[source_pages]]\ntarget_page = \"Hub\"\ntarget_heading = \"Pages\"\n",
        )
        .unwrap();
        let previous = Settings {
            excluded_properties: vec!["kept".into()],
            source_pages: vec![],
        };
        let ctx = context(&vault, previous.clone());

        let ev = reload_settings(&ctx);
        assert!(matches!(ev, LinkerEvent::Error { .. }));
        assert_eq!(**ctx.settings_tx.borrow(), previous);
    }
}
