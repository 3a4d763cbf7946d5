//! Persistence for admin overrides and default edits.
//!
//! The engine never touches storage directly; it goes through the
//! [`AdminStore`] trait so the core stays persistence-agnostic and testable.
//! The file-backed implementation keeps each collection as a JSON array in
//! its own file under the data directory and replaces it wholesale on every
//! save (single local writer, whole-collection read-modify-write).

use crate::formula;
use crate::{DefaultEdit, Error, MaxDose, Override, Result};
use fs2::FileExt;
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::NamedTempFile;

/// File names of the two stored collections
pub const OVERRIDES_FILE: &str = "overrides.json";
pub const DEFAULT_EDITS_FILE: &str = "default_edits.json";

/// Storage abstraction for admin-managed dosing rules
pub trait AdminStore {
    fn load_overrides(&self) -> Result<Vec<Override>>;
    fn save_overrides(&self, overrides: &[Override]) -> Result<()>;
    fn load_default_edits(&self) -> Result<Vec<DefaultEdit>>;
    fn save_default_edits(&self, edits: &[DefaultEdit]) -> Result<()>;
}

// ============================================================================
// Eager validation
// ============================================================================

/// Validate every formula carried by an override.
///
/// Called on save so a typo'd formula surfaces to the admin immediately
/// instead of silently degrading to a lower-priority rule at calculation
/// time.
pub fn validate_override(o: &Override) -> Result<()> {
    formula::validate(&o.formula, false)
        .map_err(|e| Error::Store(format!("override for '{}': dose formula: {}", o.medication, e)))?;

    if let Some(MaxDose::Formula(expr)) = &o.max_dose {
        formula::validate(expr, false).map_err(|e| {
            Error::Store(format!("override for '{}': max dose formula: {}", o.medication, e))
        })?;
    }

    if let Some(expr) = &o.dose_ml_formula {
        if !expr.trim().is_empty() {
            formula::validate(expr, true).map_err(|e| {
                Error::Store(format!("override for '{}': mL formula: {}", o.medication, e))
            })?;
        }
    }

    if let Some(secondary) = &o.secondary {
        if let Some(MaxDose::Formula(expr)) = &secondary.max_dose {
            formula::validate(expr, false).map_err(|e| {
                Error::Store(format!(
                    "override for '{}': secondary max dose formula: {}",
                    o.medication, e
                ))
            })?;
        }
        if let Some(expr) = &secondary.dose_ml_formula {
            if !expr.trim().is_empty() {
                formula::validate(expr, true).map_err(|e| {
                    Error::Store(format!(
                        "override for '{}': secondary mL formula: {}",
                        o.medication, e
                    ))
                })?;
            }
        }
    }

    Ok(())
}

/// Validate every formula carried by a default edit
pub fn validate_default_edit(edit: &DefaultEdit) -> Result<()> {
    formula::validate(&edit.formula, false).map_err(|e| {
        Error::Store(format!(
            "default edit for '{}': dose formula: {}",
            edit.medication, e
        ))
    })?;

    if let Some(MaxDose::Formula(expr)) = &edit.max_dose {
        formula::validate(expr, false).map_err(|e| {
            Error::Store(format!(
                "default edit for '{}': max dose formula: {}",
                edit.medication, e
            ))
        })?;
    }

    for rule in &edit.age_rules {
        formula::validate(&rule.formula, false).map_err(|e| {
            Error::Store(format!(
                "default edit for '{}': age rule formula '{}': {}",
                edit.medication, rule.formula, e
            ))
        })?;
    }

    Ok(())
}

// ============================================================================
// File-backed store
// ============================================================================

/// JSON-file-backed store with atomic writes and file locking
pub struct FileStore {
    data_dir: PathBuf,
}

impl FileStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    fn overrides_path(&self) -> PathBuf {
        self.data_dir.join(OVERRIDES_FILE)
    }

    fn default_edits_path(&self) -> PathBuf {
        self.data_dir.join(DEFAULT_EDITS_FILE)
    }

    /// Load a JSON array from a file with a shared lock.
    ///
    /// A missing file is an empty collection. A corrupt file logs a warning
    /// and degrades to an empty collection rather than blocking every
    /// calculation.
    fn load_collection<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
        if !path.exists() {
            tracing::debug!("No store file at {:?}, using empty collection", path);
            return Ok(Vec::new());
        }

        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) => {
                tracing::warn!("Unable to open store file {:?}: {}. Using empty.", path, e);
                return Ok(Vec::new());
            }
        };

        if let Err(e) = file.lock_shared() {
            tracing::warn!("Unable to lock store file {:?}: {}. Using empty.", path, e);
            return Ok(Vec::new());
        }

        let mut contents = String::new();
        let mut reader = std::io::BufReader::new(&file);
        if let Err(e) = reader.read_to_string(&mut contents) {
            let _ = file.unlock();
            tracing::warn!("Failed to read store file {:?}: {}. Using empty.", path, e);
            return Ok(Vec::new());
        }

        file.unlock()?;

        match serde_json::from_str::<Vec<T>>(&contents) {
            Ok(items) => Ok(items),
            Err(e) => {
                tracing::warn!("Failed to parse store file {:?}: {}. Using empty.", path, e);
                Ok(Vec::new())
            }
        }
    }

    /// Atomically replace a collection file: write to a locked temp file in
    /// the same directory, fsync, rename over the original.
    fn save_collection<T: serde::Serialize>(path: &Path, items: &[T]) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let temp = NamedTempFile::new_in(path.parent().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::Other, "store path missing parent")
        })?)?;

        temp.as_file().lock_exclusive()?;

        {
            let mut writer = std::io::BufWriter::new(temp.as_file());
            let contents = serde_json::to_string(items)?;
            writer.write_all(contents.as_bytes())?;
            writer.flush()?;
        }

        temp.as_file().sync_all()?;
        temp.as_file().unlock()?;

        temp.persist(path).map_err(|e| Error::Io(e.error))?;

        tracing::debug!("Saved {} items to {:?}", items.len(), path);
        Ok(())
    }
}

impl AdminStore for FileStore {
    fn load_overrides(&self) -> Result<Vec<Override>> {
        Self::load_collection(&self.overrides_path())
    }

    fn save_overrides(&self, overrides: &[Override]) -> Result<()> {
        for o in overrides {
            validate_override(o)?;
        }
        Self::save_collection(&self.overrides_path(), overrides)
    }

    fn load_default_edits(&self) -> Result<Vec<DefaultEdit>> {
        Self::load_collection(&self.default_edits_path())
    }

    fn save_default_edits(&self, edits: &[DefaultEdit]) -> Result<()> {
        for edit in edits {
            validate_default_edit(edit)?;
        }
        Self::save_collection(&self.default_edits_path(), edits)
    }
}

// ============================================================================
// In-memory store
// ============================================================================

/// In-memory store for tests and embedding without a data directory
#[derive(Default)]
pub struct MemoryStore {
    overrides: Mutex<Vec<Override>>,
    default_edits: Mutex<Vec<DefaultEdit>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_overrides(overrides: Vec<Override>) -> Self {
        Self {
            overrides: Mutex::new(overrides),
            default_edits: Mutex::new(Vec::new()),
        }
    }
}

impl AdminStore for MemoryStore {
    fn load_overrides(&self) -> Result<Vec<Override>> {
        Ok(self.overrides.lock().expect("store lock poisoned").clone())
    }

    fn save_overrides(&self, overrides: &[Override]) -> Result<()> {
        for o in overrides {
            validate_override(o)?;
        }
        *self.overrides.lock().expect("store lock poisoned") = overrides.to_vec();
        Ok(())
    }

    fn load_default_edits(&self) -> Result<Vec<DefaultEdit>> {
        Ok(self
            .default_edits
            .lock()
            .expect("store lock poisoned")
            .clone())
    }

    fn save_default_edits(&self, edits: &[DefaultEdit]) -> Result<()> {
        for edit in edits {
            validate_default_edit(edit)?;
        }
        *self.default_edits.lock().expect("store lock poisoned") = edits.to_vec();
        Ok(())
    }
}

// ============================================================================
// Whole-collection mutation helpers
// ============================================================================

/// Append an override after eager validation
pub fn add_override<S: AdminStore>(store: &S, new: Override) -> Result<()> {
    validate_override(&new)?;
    let mut overrides = store.load_overrides()?;
    overrides.push(new);
    store.save_overrides(&overrides)
}

/// Remove all overrides for a medication name, returning how many were removed
pub fn remove_overrides<S: AdminStore>(store: &S, medication: &str) -> Result<usize> {
    let mut overrides = store.load_overrides()?;
    let before = overrides.len();
    overrides.retain(|o| o.medication != medication);
    let removed = before - overrides.len();
    if removed > 0 {
        store.save_overrides(&overrides)?;
    }
    Ok(removed)
}

/// Insert or replace the default edit for a medication (one edit per name)
pub fn add_default_edit<S: AdminStore>(store: &S, new: DefaultEdit) -> Result<()> {
    validate_default_edit(&new)?;
    let mut edits = store.load_default_edits()?;
    edits.retain(|e| e.medication != new.medication);
    edits.push(new);
    store.save_default_edits(&edits)
}

/// Remove the default edit for a medication name, returning how many were removed
pub fn remove_default_edits<S: AdminStore>(store: &S, medication: &str) -> Result<usize> {
    let mut edits = store.load_default_edits()?;
    let before = edits.len();
    edits.retain(|e| e.medication != medication);
    let removed = before - edits.len();
    if removed > 0 {
        store.save_default_edits(&edits)?;
    }
    Ok(removed)
}
