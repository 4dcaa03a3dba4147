//! Form-field builder (C8): a higher-level factory over [`crate::task`] that
//! turns one input field into a single task computing its default,
//! validation, converted value, and hint, per §4.8's state machine.
//!
//! Grounded on the teacher's `Task::builder`/`TaskConfig` closure-field
//! style: every optional computation (`default`, `readonly`, `suggestions`,
//! `validator`, `converter`, `hint`) is its own named closure with an
//! "always constant" shorthand, mirroring how the teacher's task config
//! structs offer both a literal field and a `with_*` override.

use std::sync::Arc;

use crate::context::RunContext;
use crate::error::{EngineError, Result};
use crate::id::Impl;
use crate::metadata::{FieldDescriptor, FieldType, HintType};
use crate::task::Task;

type DefaultFn<T> = Arc<dyn Fn(&RunContext) -> T + Send + Sync>;
type ReadonlyFn = Arc<dyn Fn(&RunContext) -> bool + Send + Sync>;
type SuggestionsFn = Arc<dyn Fn(&RunContext) -> Vec<String> + Send + Sync>;
type ValidatorFn = Arc<dyn Fn(&RunContext, &str) -> std::result::Result<(), String> + Send + Sync>;
type ConverterFn<T> = Arc<dyn Fn(&RunContext, &str) -> T + Send + Sync>;
type HintFn<T> = Arc<dyn Fn(&RunContext, &T) -> Option<(HintType, String)> + Send + Sync>;

/// Builds one form-field task. `T` is the field's converted output type,
/// the value dependents see via [`crate::value_map::ValueMap`].
pub struct FormFieldBuilder<T> {
    id: Impl<T>,
    field_type: FieldType,
    label: String,
    description: String,
    default: DefaultFn<T>,
    readonly: ReadonlyFn,
    suggestions: SuggestionsFn,
    validator: ValidatorFn,
    converter: ConverterFn<T>,
    hint: HintFn<T>,
}

impl<T: Clone + Send + Sync + ToString + Default + 'static> FormFieldBuilder<T> {
    pub fn new(id: Impl<T>) -> Self {
        FormFieldBuilder {
            id,
            field_type: FieldType::Text,
            label: String::new(),
            description: String::new(),
            default: Arc::new(|_ctx| T::default()),
            readonly: Arc::new(|_ctx| false),
            suggestions: Arc::new(|_ctx| Vec::new()),
            validator: Arc::new(|_ctx, _raw| Ok(())),
            converter: Arc::new(|_ctx, raw| {
                // Falls back to the constant default if no converter is
                // supplied and `T` cannot be parsed from a raw string; a
                // real field always supplies `.converter_fn`.
                let _ = raw;
                T::default()
            }),
            hint: Arc::new(|_ctx, _value| None),
        }
    }
}

impl<T: Clone + Send + Sync + ToString + 'static> FormFieldBuilder<T> {
    pub fn field_type(mut self, field_type: FieldType) -> Self {
        self.field_type = field_type;
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// "Always constant" shorthand for a fixed default value.
    pub fn default_value(mut self, value: T) -> Self {
        self.default = Arc::new(move |_ctx| value.clone());
        self
    }

    pub fn default_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&RunContext) -> T + Send + Sync + 'static,
    {
        self.default = Arc::new(f);
        self
    }

    pub fn readonly(mut self, value: bool) -> Self {
        self.readonly = Arc::new(move |_ctx| value);
        self
    }

    pub fn readonly_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&RunContext) -> bool + Send + Sync + 'static,
    {
        self.readonly = Arc::new(f);
        self
    }

    pub fn suggestions(mut self, values: Vec<String>) -> Self {
        self.suggestions = Arc::new(move |_ctx| values.clone());
        self
    }

    pub fn suggestions_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&RunContext) -> Vec<String> + Send + Sync + 'static,
    {
        self.suggestions = Arc::new(f);
        self
    }

    /// Validates the raw (pre-conversion) input string. `Ok(())` proceeds to
    /// `converter`; `Err(message)` enters the invalid branch of §4.8's state
    /// machine.
    pub fn validator_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&RunContext, &str) -> std::result::Result<(), String> + Send + Sync + 'static,
    {
        self.validator = Arc::new(f);
        self
    }

    /// Converts a validated raw input string into `T`.
    pub fn converter_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&RunContext, &str) -> T + Send + Sync + 'static,
    {
        self.converter = Arc::new(f);
        self
    }

    pub fn hint_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&RunContext, &T) -> Option<(HintType, String)> + Send + Sync + 'static,
    {
        self.hint = Arc::new(f);
        self
    }

    /// Builds the field's task, implementing §4.8's state machine.
    pub fn build(self) -> Result<Task<T>> {
        let field_id = self.id.r#ref().string().to_string();
        let field_type = self.field_type;
        let label = self.label;
        let description = self.description;
        let default = self.default;
        let readonly = self.readonly;
        let suggestions = self.suggestions;
        let validator = self.validator;
        let converter = self.converter;
        let hint = self.hint;

        Task::builder(self.id).build(move |ctx| {
            let field_id = field_id.clone();
            let field_type = field_type;
            let label = label.clone();
            let description = description.clone();
            let default = default.clone();
            let readonly = readonly.clone();
            let suggestions = suggestions.clone();
            let validator = validator.clone();
            let converter = converter.clone();
            let hint = hint.clone();

            async move {
                let default_value = default(&ctx);
                let readonly_value = readonly(&ctx);
                let suggestions_value = suggestions(&ctx);

                // Per-field history: the previously submitted raw value (if
                // any) is kept in shared scratch state so closures computed
                // on a later dry-run can see what the user last typed.
                let history_key = format!("form-history:{field_id}");
                let raw = ctx.inspection_request().get(&field_id);
                if let Some(raw) = &raw {
                    ctx.shared().set(history_key, raw.clone());
                }

                let (value, hint_type, hint_message) = match raw {
                    None => (default_value.clone(), HintType::None, None),
                    Some(raw) => match validator(&ctx, &raw) {
                        Ok(()) => {
                            let converted = converter(&ctx, &raw);
                            match hint(&ctx, &converted) {
                                Some((ty, msg)) => (converted, ty, Some(msg)),
                                None => (converted, HintType::None, None),
                            }
                        }
                        Err(message) => {
                            if ctx.run_mode().is_dry_run() {
                                (default_value.clone(), HintType::Error, Some(message))
                            } else {
                                return Err(EngineError::ValidationError {
                                    field: field_id.clone(),
                                    message,
                                });
                            }
                        }
                    },
                };

                ctx.metadata().form_fields.emit(FieldDescriptor {
                    id: field_id.clone(),
                    field_type,
                    label,
                    description,
                    hint_type,
                    hint: hint_message,
                    default: Some(default_value.to_string()),
                    readonly: readonly_value,
                    suggestions: suggestions_value,
                });

                Ok(value)
            }
        })
    }
}
