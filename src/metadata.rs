//! Metadata channel: progress, form fields, and de-duplicated errors,
//! distributed to every task via the run context and readable concurrently
//! with execution.
//!
//! Per-key aggregates follow the teacher's `EventEmitter`/`EventLog`
//! dependency-injection shape (a trait so tests can substitute a no-op
//! sink) layered over the same lock-free `DashMap` storage used by
//! `value_map` and `cache`. Field names in [`MetadataSnapshot`] are a
//! stable external contract, per §6.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::context::RunMode;

/// A single task's progress, guarded independently of every other task's
/// slot so readers never block on unrelated writers.
#[derive(Debug, Clone, Default)]
struct ProgressSlot {
    completion: f64,
    message: Option<String>,
}

/// Per-task progress, acquired on entry and released on exit by tasks
/// labeled *progress-reportable*.
#[derive(Default)]
pub struct ProgressTable {
    slots: DashMap<Arc<str>, Mutex<ProgressSlot>>,
}

impl ProgressTable {
    fn new() -> Self {
        ProgressTable {
            slots: DashMap::new(),
        }
    }

    /// Acquires (creating if absent) the progress slot for `task_id`.
    pub fn acquire(&self, task_id: Arc<str>) {
        self.slots.entry(task_id).or_insert_with(|| Mutex::new(ProgressSlot::default()));
    }

    pub fn update(&self, task_id: &str, completion: f64, message: Option<String>) {
        if let Some(slot) = self.slots.get(task_id) {
            let mut guard = slot.lock();
            guard.completion = completion.clamp(0.0, 1.0);
            guard.message = message;
        }
    }

    /// Releases the slot; called when a task finishes (success, failure, or
    /// cancellation), leaving its last-reported completion in the snapshot.
    pub fn release(&self, _task_id: &str) {
        // Slots are kept for the snapshot rather than removed on release:
        // external observers may read progress after the producing task
        // has already finished.
    }

    fn snapshot(&self) -> Vec<ProgressEntry> {
        self.slots
            .iter()
            .map(|entry| {
                let guard = entry.value().lock();
                ProgressEntry {
                    task_id: entry.key().to_string(),
                    completion: guard.completion,
                    message: guard.message.clone(),
                }
            })
            .collect()
    }
}

/// One field in the language-neutral form descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Text,
    File,
    Group,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HintType {
    None,
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDescriptor {
    pub id: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub label: String,
    pub description: String,
    pub hint_type: HintType,
    pub hint: Option<String>,
    pub default: Option<String>,
    pub readonly: bool,
    pub suggestions: Vec<String>,
}

/// Ordered collection of field descriptors produced while building a form.
#[derive(Default)]
pub struct FormFields {
    fields: Mutex<Vec<FieldDescriptor>>,
}

impl FormFields {
    fn new() -> Self {
        FormFields {
            fields: Mutex::new(Vec::new()),
        }
    }

    pub fn emit(&self, field: FieldDescriptor) {
        let mut fields = self.fields.lock();
        if let Some(existing) = fields.iter_mut().find(|f| f.id == field.id) {
            *existing = field;
        } else {
            fields.push(field);
        }
    }

    fn snapshot(&self) -> Vec<FieldDescriptor> {
        self.fields.lock().clone()
    }
}

/// A user-visible error, de-duplicated by `error_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEntry {
    pub error_id: u64,
    pub message: String,
    pub link: Option<String>,
}

#[derive(Default)]
pub struct ErrorSet {
    entries: DashMap<u64, ErrorEntry>,
}

impl ErrorSet {
    fn new() -> Self {
        ErrorSet {
            entries: DashMap::new(),
        }
    }

    /// Records an error, appending only if `error_id` has not been seen
    /// before in this run.
    pub fn record(&self, entry: ErrorEntry) {
        self.entries.entry(entry.error_id).or_insert(entry);
    }

    fn snapshot(&self) -> Vec<ErrorEntry> {
        let mut entries: Vec<_> = self.entries.iter().map(|e| e.value().clone()).collect();
        entries.sort_by_key(|e| e.error_id);
        entries
    }
}

/// The metadata channel handed to every task via [`crate::context::RunContext`].
pub struct MetadataMap {
    pub progress: ProgressTable,
    pub form_fields: FormFields,
    pub errors: ErrorSet,
    run_mode: Mutex<RunMode>,
}

impl MetadataMap {
    pub fn new() -> Self {
        MetadataMap {
            progress: ProgressTable::new(),
            form_fields: FormFields::new(),
            errors: ErrorSet::new(),
            run_mode: Mutex::new(RunMode::Run),
        }
    }

    pub fn set_run_mode(&self, mode: RunMode) {
        *self.run_mode.lock() = mode;
    }

    pub fn run_mode(&self) -> RunMode {
        *self.run_mode.lock()
    }

    /// A read-only, eventually-consistent snapshot suitable for
    /// `serde_json` serialization to a language-neutral structure.
    pub fn snapshot(&self) -> MetadataSnapshot {
        MetadataSnapshot {
            progress: self.progress.snapshot(),
            form: self.form_fields.snapshot(),
            error: self.errors.snapshot(),
        }
    }
}

impl Default for MetadataMap {
    fn default() -> Self {
        MetadataMap::new()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEntry {
    pub task_id: String,
    pub completion: f64,
    pub message: Option<String>,
}

/// Serializable, stable-field-name snapshot of an entire run's metadata.
/// Renaming any field here is a breaking change to external consumers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetadataSnapshot {
    pub progress: Vec<ProgressEntry>,
    pub form: Vec<FieldDescriptor>,
    pub error: Vec<ErrorEntry>,
}
