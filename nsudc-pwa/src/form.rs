//! Form model
//!
//! An ordered set of named controls with the browser's built-in constraint
//! checks (`required`, `type=email`, `minlength`/`maxlength`, `<select>`
//! options) and `application/x-www-form-urlencoded` encoding.
//!
//! Checkboxes sharing a name form a group; each checked box contributes one
//! entry, so a group submits as a repeated field name.

use std::collections::BTreeMap;

use crate::draft::Draft;
use crate::outbox::{encode_payload, payload_from_entries, Payload};

/// Joins several values under one name inside a draft value: the checked
/// values of a checkbox group, or the values of repeated non-checkbox
/// controls by position. Checkbox values must not contain it.
pub const DRAFT_VALUE_SEPARATOR: char = '\n';

// ── Types ───────────────────────────────────────────────────

/// Control type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Email,
    Tel,
    TextArea,
    /// `<select>` with its allowed option values.
    Select(Vec<String>),
    /// A checkbox; `value` is what it submits when checked.
    Checkbox { checked: bool },
}

/// A single form control.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormField {
    pub name: String,
    pub kind: FieldKind,
    pub value: String,
    pub required: bool,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
}

impl FormField {
    fn with_kind(name: &str, kind: FieldKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            value: String::new(),
            required: false,
            min_length: None,
            max_length: None,
        }
    }

    pub fn text(name: &str) -> Self {
        Self::with_kind(name, FieldKind::Text)
    }

    pub fn email(name: &str) -> Self {
        Self::with_kind(name, FieldKind::Email)
    }

    pub fn tel(name: &str) -> Self {
        Self::with_kind(name, FieldKind::Tel)
    }

    pub fn textarea(name: &str) -> Self {
        Self::with_kind(name, FieldKind::TextArea)
    }

    pub fn select(name: &str, options: &[&str]) -> Self {
        Self::with_kind(
            name,
            FieldKind::Select(options.iter().map(|o| o.to_string()).collect()),
        )
    }

    pub fn checkbox(name: &str, value: &str) -> Self {
        let mut field = Self::with_kind(name, FieldKind::Checkbox { checked: false });
        field.value = value.to_string();
        field
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn min_length(mut self, n: usize) -> Self {
        self.min_length = Some(n);
        self
    }

    pub fn max_length(mut self, n: usize) -> Self {
        self.max_length = Some(n);
        self
    }

    pub fn is_checkbox(&self) -> bool {
        matches!(self.kind, FieldKind::Checkbox { .. })
    }

    pub fn is_checked(&self) -> bool {
        matches!(self.kind, FieldKind::Checkbox { checked: true })
    }

    /// The value this control submits, if any.
    fn entry_value(&self) -> Option<&str> {
        match self.kind {
            FieldKind::Checkbox { checked: true } => Some(&self.value),
            FieldKind::Checkbox { checked: false } => None,
            _ => Some(&self.value),
        }
    }

    fn validity(&self) -> Option<Invalidity> {
        if let FieldKind::Checkbox { checked } = self.kind {
            return (self.required && !checked).then_some(Invalidity::Required);
        }

        if self.value.is_empty() {
            return self.required.then_some(Invalidity::Required);
        }

        let len = self.value.chars().count();
        if let Some(min) = self.min_length {
            if len < min {
                return Some(Invalidity::TooShort { min });
            }
        }
        if let Some(max) = self.max_length {
            if len > max {
                return Some(Invalidity::TooLong { max });
            }
        }

        match &self.kind {
            FieldKind::Email if !is_valid_email(&self.value) => Some(Invalidity::TypeMismatch),
            FieldKind::Select(options) if !options.iter().any(|o| *o == self.value) => {
                Some(Invalidity::TypeMismatch)
            }
            _ => None,
        }
    }
}

/// Why a control failed its constraints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Invalidity {
    Required,
    TypeMismatch,
    TooShort { min: usize },
    TooLong { max: usize },
}

impl std::fmt::Display for Invalidity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Invalidity::Required => write!(f, "is required"),
            Invalidity::TypeMismatch => write!(f, "has an invalid value"),
            Invalidity::TooShort { min } => write!(f, "must be at least {min} characters"),
            Invalidity::TooLong { max } => write!(f, "must be at most {max} characters"),
        }
    }
}

/// A control that failed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidField {
    pub name: String,
    pub reason: Invalidity,
}

/// The form failed its built-in constraint checks.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("{} field(s) invalid: {}", .fields.len(), describe(.fields))]
pub struct ValidationError {
    pub fields: Vec<InvalidField>,
}

fn describe(fields: &[InvalidField]) -> String {
    fields
        .iter()
        .map(|f| format!("{} {}", f.name, f.reason))
        .collect::<Vec<_>>()
        .join("; ")
}

/// A form element: action URL plus its controls in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Form {
    pub action: String,
    fields: Vec<FormField>,
}

impl Form {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            fields: Vec::new(),
        }
    }

    pub fn with_field(mut self, field: FormField) -> Self {
        self.fields.push(field);
        self
    }

    pub fn fields(&self) -> &[FormField] {
        &self.fields
    }

    /// First control named `name`.
    pub fn field(&self, name: &str) -> Option<&FormField> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    /// Set the value of the non-checkbox control `name`.
    /// Returns `false` if there is no such control.
    pub fn set_value(&mut self, name: &str, value: &str) -> bool {
        match self
            .fields
            .iter_mut()
            .find(|f| f.name == name && !f.is_checkbox())
        {
            Some(field) => {
                field.value = value.to_string();
                true
            }
            None => false,
        }
    }

    /// Check or uncheck the checkbox `name` whose value is `value`.
    pub fn set_checked(&mut self, name: &str, value: &str, checked: bool) -> bool {
        for field in &mut self.fields {
            if field.name == name && field.value == value {
                if let FieldKind::Checkbox { checked: c } = &mut field.kind {
                    *c = checked;
                    return true;
                }
            }
        }
        false
    }

    /// Submittable `(name, value)` entries in document order.
    pub fn entries(&self) -> Vec<(&str, &str)> {
        self.fields
            .iter()
            .filter_map(|f| f.entry_value().map(|v| (f.name.as_str(), v)))
            .collect()
    }

    /// The full current contents as a draft. Every control's name is
    /// present, so an unchecked group or an emptied field round-trips.
    ///
    /// Repeated non-checkbox controls are saved one value per control, in
    /// document order; a single control keeps its value verbatim.
    pub fn snapshot(&self) -> Draft {
        let mut draft = Draft::new();
        for (i, field) in self.fields.iter().enumerate() {
            let slot = draft.entry(field.name.clone()).or_default();
            if field.is_checkbox() {
                if let Some(value) = field.entry_value() {
                    if !slot.is_empty() {
                        slot.push(DRAFT_VALUE_SEPARATOR);
                    }
                    slot.push_str(value);
                }
                continue;
            }
            let repeated = self.fields[..i]
                .iter()
                .any(|f| f.name == field.name && !f.is_checkbox());
            if repeated {
                slot.push(DRAFT_VALUE_SEPARATOR);
            }
            slot.push_str(&field.value);
        }
        draft
    }

    /// Pre-fill controls from `draft`. Names the form lacks are ignored.
    pub fn apply_draft(&mut self, draft: &Draft) {
        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for field in self.fields.iter().filter(|f| !f.is_checkbox()) {
            *counts.entry(field.name.clone()).or_default() += 1;
        }
        let mut positions: BTreeMap<String, usize> = BTreeMap::new();

        for field in &mut self.fields {
            let Some(saved) = draft.get(&field.name) else {
                continue;
            };
            match &mut field.kind {
                FieldKind::Checkbox { checked } => {
                    *checked = saved
                        .split(DRAFT_VALUE_SEPARATOR)
                        .any(|v| !v.is_empty() && v == field.value);
                }
                _ if counts.get(&field.name).copied().unwrap_or(0) > 1 => {
                    let position = positions.entry(field.name.clone()).or_default();
                    field.value = saved
                        .split(DRAFT_VALUE_SEPARATOR)
                        .nth(*position)
                        .unwrap_or_default()
                        .to_string();
                    *position += 1;
                }
                _ => field.value = saved.clone(),
            }
        }
    }

    /// Empty every control.
    pub fn reset(&mut self) {
        for field in &mut self.fields {
            match &mut field.kind {
                FieldKind::Checkbox { checked } => *checked = false,
                _ => field.value.clear(),
            }
        }
    }

    /// Run the built-in constraint checks over every control.
    pub fn check_validity(&self) -> Result<(), ValidationError> {
        let fields: Vec<InvalidField> = self
            .fields
            .iter()
            .filter_map(|f| {
                f.validity().map(|reason| InvalidField {
                    name: f.name.clone(),
                    reason,
                })
            })
            .collect();
        if fields.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { fields })
        }
    }

    /// Entries collapsed into a payload (repeated names become sequences).
    pub fn payload(&self) -> Payload {
        payload_from_entries(self.entries())
    }

    /// Request body for a POST to `action`.
    pub fn encoded(&self) -> String {
        encode_payload(&self.payload())
    }
}

/// `type=email` check: one `@`, a non-empty local part without whitespace,
/// and a domain of non-empty alphanumeric/hyphen labels.
fn is_valid_email(value: &str) -> bool {
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    if local.is_empty() || local.chars().any(|c| c.is_whitespace() || c == '@') {
        return false;
    }
    !domain.is_empty()
        && domain.split('.').all(|label| {
            !label.is_empty()
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        })
}
