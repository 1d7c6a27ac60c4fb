//! Keeps hub pages in sync with note properties and runs bulk value rewrites.
//!
//! Every operation takes one note at a time through read, decide, write. Bulk operations
//! visit notes in store enumeration order and isolate failures per note.

use tracing::{debug, info, warn};

use crate::hub::{insert_link, new_hub_page, remove_link};
use crate::parse::parse_properties;
use crate::rewrite::replace_value;
use crate::store::NoteStore;
use crate::{Error, PropertyMap, PropertyValue, Result, Settings, SourceConfig, VaultPath};

/// Outcome of reconciling one or more notes against the configured hub pages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Links inserted into a hub page.
    pub linked: usize,
    /// Hub pages a link was removed from.
    pub unlinked: usize,
    pub failed: usize,
}

impl SyncReport {
    pub fn changed(&self) -> usize {
        self.linked + self.unlinked
    }

    fn absorb(&mut self, other: SyncReport) {
        self.linked += other.linked;
        self.unlinked += other.unlinked;
        self.failed += other.failed;
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuleReport {
    /// Notes with a header block that were tested against the rule.
    pub processed: usize,
    /// Matching notes whose link is now present on the hub page.
    pub linked: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaceReport {
    pub scanned: usize,
    pub modified: usize,
    pub failed: usize,
}

/// Hub-page maintenance over a [`NoteStore`], driven by a settings snapshot.
pub struct Linker<'a, S: NoteStore + ?Sized> {
    store: &'a S,
    settings: &'a Settings,
}

impl<'a, S: NoteStore + ?Sized> Linker<'a, S> {
    pub fn new(store: &'a S, settings: &'a Settings) -> Self {
        Self { store, settings }
    }

    pub fn settings(&self) -> &Settings {
        self.settings
    }

    /// Make the hub page of `cfg` list `note` (`present = true`) or not list it.
    ///
    /// A missing hub page is created on insert and left alone on removal. Returns
    /// whether the hub page was written.
    pub fn ensure_link(&self, note: &VaultPath, cfg: &SourceConfig, present: bool) -> Result<bool> {
        let hub = cfg.hub_path()?;
        if present && *note == hub {
            debug!(path = %note.as_str_lossy(), "not linking hub page to itself");
            return Ok(false);
        }

        if !self.store.exists(&hub) {
            if !present {
                return Ok(false);
            }
            let heading = cfg.target_heading.trim();
            self.store
                .create_note(&hub, &new_hub_page(cfg.target_page.trim(), heading))?;
            info!(hub = %hub.as_str_lossy(), "created hub page");
            if !self.store.exists(&hub) {
                return Err(Error::HubPageMissing(hub));
            }
        }

        let text = self.store.read_text(&hub)?;
        let target = note.link_target();
        let updated = if present {
            insert_link(&text, cfg.target_heading.trim(), &target)
        } else {
            remove_link(&text, &target)
        };

        let Some(updated) = updated else {
            return Ok(false);
        };
        self.store.write_text(&hub, &updated)?;
        debug!(
            hub = %hub.as_str_lossy(),
            link = %target,
            present,
            "hub page updated"
        );
        Ok(true)
    }

    /// Reconcile one note against every enabled rule.
    ///
    /// `None` means the note has no header block, so it is unlinked everywhere.
    pub fn handle_change(&self, note: &VaultPath, properties: Option<&PropertyMap>) -> SyncReport {
        let Some(properties) = properties else {
            return self.unlink_everywhere(note);
        };

        let mut report = SyncReport::default();
        for cfg in self.settings.enabled_sources() {
            let present = cfg.matches(properties);
            self.apply(note, cfg, present, &mut report);
        }
        report
    }

    pub fn handle_delete(&self, note: &VaultPath) -> SyncReport {
        self.unlink_everywhere(note)
    }

    /// Reconcile every note in the store. Only a failure to enumerate notes is an error.
    pub fn sync_all(&self) -> Result<SyncReport> {
        let notes = self.store.list_notes()?;
        let mut report = SyncReport::default();
        for note in &notes {
            match self.store.properties(note) {
                Ok(props) => report.absorb(self.handle_change(note, props.as_ref())),
                Err(err) => {
                    warn!(path = %note.as_str_lossy(), error = %err, "skipping note");
                    report.failed += 1;
                }
            }
        }
        info!(
            notes = notes.len(),
            linked = report.linked,
            unlinked = report.unlinked,
            failed = report.failed,
            "initial sync finished"
        );
        Ok(report)
    }

    /// Link every currently matching note for one rule. Never removes links.
    pub fn apply_rule(&self, cfg: &SourceConfig) -> Result<RuleReport> {
        let mut report = RuleReport::default();
        for note in self.store.list_notes()? {
            let props = match self.store.properties(&note) {
                Ok(Some(props)) => props,
                Ok(None) => continue,
                Err(err) => {
                    warn!(path = %note.as_str_lossy(), error = %err, "skipping note");
                    report.failed += 1;
                    continue;
                }
            };
            report.processed += 1;
            if !cfg.matches(&props) {
                continue;
            }
            match self.ensure_link(&note, cfg, true) {
                Ok(_) => report.linked += 1,
                Err(err) => {
                    warn!(
                        path = %note.as_str_lossy(),
                        hub = %cfg.target_page,
                        error = %err,
                        "failed to link note"
                    );
                    report.failed += 1;
                }
            }
        }
        info!(
            hub = %cfg.target_page,
            processed = report.processed,
            linked = report.linked,
            "rule applied"
        );
        Ok(report)
    }

    /// Notes a [`Linker::bulk_replace`] with the same arguments would try to rewrite.
    pub fn preview_replace(&self, property: &str, old: &str) -> Result<Vec<VaultPath>> {
        check_replace_args(property, old, None)?;
        let mut out = Vec::new();
        for note in self.store.list_notes()? {
            match self.store.properties(&note) {
                Ok(Some(props)) => {
                    if holds_value(&props, property, old).is_some() {
                        out.push(note);
                    }
                }
                Ok(None) => {}
                Err(err) => {
                    warn!(path = %note.as_str_lossy(), error = %err, "skipping note");
                }
            }
        }
        Ok(out)
    }

    /// Replace `old` with `new` in `property` across all notes.
    ///
    /// Only notes whose header block actually changes are written.
    pub fn bulk_replace(&self, property: &str, old: &str, new: &str) -> Result<ReplaceReport> {
        check_replace_args(property, old, Some(new))?;
        info!(property, old, new, "bulk replace started");

        let mut report = ReplaceReport::default();
        for note in self.store.list_notes()? {
            report.scanned += 1;
            match self.replace_in(&note, property, old, new) {
                Ok(true) => report.modified += 1,
                Ok(false) => {}
                Err(err) => {
                    warn!(path = %note.as_str_lossy(), error = %err, "bulk replace failed");
                    report.failed += 1;
                }
            }
        }

        info!(
            property,
            scanned = report.scanned,
            modified = report.modified,
            failed = report.failed,
            "bulk replace finished"
        );
        Ok(report)
    }

    fn replace_in(&self, note: &VaultPath, property: &str, old: &str, new: &str) -> Result<bool> {
        let text = self.store.read_text(note)?;
        let Some(props) = parse_properties(&text)? else {
            return Ok(false);
        };
        let Some(current) = holds_value(&props, property, old) else {
            return Ok(false);
        };

        let rewrite = replace_value(&text, property, current, old, new);
        if !rewrite.changed {
            debug!(path = %note.as_str_lossy(), property, "value not found in header block text");
            return Ok(false);
        }
        self.store.write_text(note, &rewrite.text)?;
        debug!(path = %note.as_str_lossy(), property, "property rewritten");
        Ok(true)
    }

    fn unlink_everywhere(&self, note: &VaultPath) -> SyncReport {
        let mut report = SyncReport::default();
        for cfg in self.settings.enabled_sources() {
            self.apply(note, cfg, false, &mut report);
        }
        report
    }

    fn apply(&self, note: &VaultPath, cfg: &SourceConfig, present: bool, report: &mut SyncReport) {
        match self.ensure_link(note, cfg, present) {
            Ok(true) if present => report.linked += 1,
            Ok(true) => report.unlinked += 1,
            Ok(false) => {}
            Err(err) => {
                warn!(
                    path = %note.as_str_lossy(),
                    hub = %cfg.target_page,
                    error = %err,
                    "failed to update hub page"
                );
                report.failed += 1;
            }
        }
    }
}

fn check_replace_args(property: &str, old: &str, new: Option<&str>) -> Result<()> {
    if property.trim().is_empty() {
        return Err(Error::InvalidRequest("property name is required".into()));
    }
    if old.trim().is_empty() {
        return Err(Error::InvalidRequest("current value is required".into()));
    }
    if new.is_some_and(|n| n.trim().is_empty()) {
        return Err(Error::InvalidRequest("new value is required".into()));
    }
    Ok(())
}

/// The property's raw value, if its normalized form contains `old`.
fn holds_value<'p>(props: &'p PropertyMap, property: &str, old: &str) -> Option<&'p PropertyValue> {
    let value = props.get(property)?;
    if matches!(value, PropertyValue::Empty) {
        return None;
    }
    value.normalize().iter().any(|v| v == old).then_some(value)
}
