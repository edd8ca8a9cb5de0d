use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Mutex;

use crate::lock;
use crate::persist::{DocumentFile, LoadStatus};

/// How each process name is treated. Serialized as the configuration
/// document (`aliases`, `tracked_apps`, `removed_apps`, `highlighted_apps`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Classification {
    pub aliases: BTreeMap<String, String>,
    #[serde(rename = "tracked_apps")]
    pub tracked: BTreeSet<String>,
    #[serde(rename = "removed_apps")]
    pub removed: BTreeSet<String>,
    #[serde(rename = "highlighted_apps")]
    pub highlighted: BTreeSet<String>,
}

impl Classification {
    pub fn is_tracked(&self, name: &str) -> bool {
        self.tracked.contains(name)
    }

    pub fn is_removed(&self, name: &str) -> bool {
        self.removed.contains(name)
    }

    pub fn is_highlighted(&self, name: &str) -> bool {
        self.highlighted.contains(name)
    }

    pub fn display_name<'a>(&'a self, name: &'a str) -> &'a str {
        self.aliases.get(name).map(String::as_str).unwrap_or(name)
    }

    /// Removed wins over tracked; a removed name carries no alias.
    fn normalize(&mut self) {
        for name in &self.removed {
            self.tracked.remove(name);
            self.aliases.remove(name);
        }
    }

    fn auto_register(&mut self, name: &str) -> bool {
        if self.is_tracked(name) || self.is_removed(name) {
            return false;
        }
        self.tracked.insert(name.to_owned())
    }

    fn is_known(&self, name: &str) -> bool {
        self.is_tracked(name) || self.is_removed(name)
    }

    /// An exact process name wins over an alias that happens to spell it.
    fn resolve_label(&self, label: &str) -> Result<String> {
        let label = label.trim();
        if label.is_empty() {
            bail!("no application selected");
        }
        if self.is_known(label) {
            return Ok(label.to_owned());
        }
        let name = self
            .aliases
            .iter()
            .find(|(_, alias)| alias.as_str() == label)
            .map(|(name, _)| name.clone())
            .unwrap_or_else(|| label.to_owned());
        Ok(name)
    }

    fn set_alias(&mut self, name: &str, alias: &str) -> Result<()> {
        if self.is_removed(name) {
            bail!("{name} is removed; add it back before renaming");
        }
        if alias != name && self.is_known(alias) {
            bail!("{alias} is already the name of another application");
        }
        if let Some((owner, _)) = self
            .aliases
            .iter()
            .find(|(owner, existing)| owner.as_str() != name && existing.as_str() == alias)
        {
            bail!("{alias} is already used for {owner}");
        }
        self.aliases.insert(name.to_owned(), alias.to_owned());
        Ok(())
    }
}

/// Thread-safe owner of the [`Classification`] and its document. Every
/// mutation runs under one lock and is persisted right after.
pub struct ClassificationStore {
    state: Mutex<Classification>,
    file: DocumentFile,
}

impl ClassificationStore {
    pub fn load(path: impl Into<PathBuf>) -> (Self, LoadStatus) {
        let file = DocumentFile::new(path);
        let (mut state, status) = file.load::<Classification>();
        state.normalize();
        let store = Self {
            state: Mutex::new(state),
            file,
        };
        (store, status)
    }

    /// Replaces the settings with the document on disk. A change whose save
    /// failed is written first; if that fails again nothing is replaced.
    pub fn reload(&self) -> Result<LoadStatus> {
        if self.file.has_unsaved_changes() {
            self.save()
                .context("configuration has unsaved changes, not reloading")?;
        }
        let (mut fresh, status) = self.file.load::<Classification>();
        fresh.normalize();
        *lock(&self.state) = fresh;
        Ok(status)
    }

    /// Advances on every in-memory change, saved or not.
    pub fn revision(&self) -> u64 {
        self.file.revision()
    }

    pub fn save(&self) -> Result<()> {
        self.file.save_with(|| {
            let state = lock(&self.state);
            serde_json::to_vec_pretty(&*state).context("failed to serialize configuration")
        })
    }

    pub fn snapshot(&self) -> Classification {
        lock(&self.state).clone()
    }

    pub fn is_tracked(&self, name: &str) -> bool {
        lock(&self.state).is_tracked(name)
    }

    pub fn is_removed(&self, name: &str) -> bool {
        lock(&self.state).is_removed(name)
    }

    pub fn is_highlighted(&self, name: &str) -> bool {
        lock(&self.state).is_highlighted(name)
    }

    pub fn removed_names(&self) -> BTreeSet<String> {
        lock(&self.state).removed.clone()
    }

    pub fn display_name(&self, name: &str) -> String {
        lock(&self.state).display_name(name).to_owned()
    }

    /// Maps a label shown to the user (alias or raw name) back to the
    /// process name it stands for.
    pub fn resolve_selection(&self, label: &str) -> Result<String> {
        lock(&self.state).resolve_label(label)
    }

    /// Starts tracking a newly seen process unless it is already tracked or
    /// was removed by the user. Returns whether anything changed.
    pub fn auto_register(&self, name: &str) -> bool {
        self.auto_register_all(std::iter::once(name)) == 1
    }

    /// Batch form of [`Self::auto_register`]; saves at most once.
    pub fn auto_register_all<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> usize {
        let added = {
            let mut state = lock(&self.state);
            names
                .into_iter()
                .filter(|name| state.auto_register(name))
                .count()
        };
        if added > 0 {
            // Already logged; sampling carries on and the next save retries.
            let _ = self.persist("auto-registration");
        }
        added
    }

    /// Tracks the given names, lifting any earlier removal.
    pub fn add_tracked<I, S>(&self, names: I) -> Result<usize>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let names: Vec<String> = names
            .into_iter()
            .map(|n| n.as_ref().trim().to_owned())
            .filter(|n| !n.is_empty())
            .collect();
        if names.is_empty() {
            bail!("no application selected");
        }

        let added = {
            let mut state = lock(&self.state);
            let mut added = 0;
            for name in names {
                state.removed.remove(&name);
                if state.tracked.insert(name) {
                    added += 1;
                }
            }
            added
        };
        self.persist("add")?;
        Ok(added)
    }

    /// Stops tracking `name`, blocks it from auto-registration and drops its
    /// alias. The highlight flag is left as is.
    pub fn remove_tracked(&self, name: &str) -> Result<()> {
        let name = non_blank(name)?;
        {
            let mut state = lock(&self.state);
            state.tracked.remove(name);
            state.aliases.remove(name);
            state.removed.insert(name.to_owned());
        }
        self.persist("remove")
    }

    /// Gives a tracked process a display name. Removed processes cannot be
    /// renamed, and an alias may not collide with another application's
    /// process name or alias.
    pub fn rename(&self, name: &str, alias: &str) -> Result<()> {
        let name = non_blank(name)?;
        let alias = alias.trim();
        if alias.is_empty() {
            bail!("new name for {name} cannot be empty");
        }
        lock(&self.state).set_alias(name, alias)?;
        self.persist("rename")
    }

    /// Flips the highlight flag and returns the new value.
    pub fn toggle_highlight(&self, name: &str) -> Result<bool> {
        let name = non_blank(name)?;
        let highlighted = {
            let mut state = lock(&self.state);
            if state.highlighted.remove(name) {
                false
            } else {
                state.highlighted.insert(name.to_owned());
                true
            }
        };
        self.persist("highlight")?;
        Ok(highlighted)
    }

    /// Marks the state changed and writes it. On failure the change stays in
    /// memory; the error is logged and handed back.
    fn persist(&self, action: &str) -> Result<()> {
        self.file.mark_changed();
        self.save().map_err(|err| {
            log::error!("configuration save after {action} failed: {err:#}");
            err.context(format!("{action} kept in memory but not saved"))
        })
    }
}

fn non_blank(name: &str) -> Result<&str> {
    let name = name.trim();
    if name.is_empty() {
        bail!("no application selected");
    }
    Ok(name)
}
