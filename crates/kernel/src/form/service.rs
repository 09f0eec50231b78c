//! Form instances: empty, prefilled and parsed views of a schema.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE;
use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::debug;

use super::builder::FormSchema;
use super::csrf::{CSRF_FIELD, CsrfError};
use super::types::{
    DateTimeLocalConfig, FieldDef, FieldKind, HiddenConfig, ParseFn, SelectOption, TextConfig,
    Widget,
};
use super::values::FormValues;

/// Layout of a `datetime-local` input value.
pub const DATETIME_LOCAL_FORMAT: &str = "%Y-%m-%dT%H:%M";

pub const MSG_REQUIRED: &str = "This field is required.";
pub const MSG_INVALID_DATETIME: &str = "Invalid date/time format.";
pub const MSG_SELECT_PROMPT: &str = "Please select an option.";
pub const MSG_CSRF_EXPIRED: &str = "Form has expired, please retry.";
pub const MSG_CSRF_INVALID: &str = "Could not validate form, please retry.";

/// A render-ready form: one snapshot of a schema.
#[derive(Debug, Clone, Serialize)]
pub struct Form {
    fields: Vec<Field>,
    /// Form-level errors (CSRF failures).
    pub errors: Vec<String>,
}

impl Form {
    /// Fields in declaration order; the CSRF field, if any, comes last.
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Replace a field's value and clear its errors.
    pub fn set_value(&mut self, name: &str, value: impl Into<String>) {
        if let Some(field) = self.fields.iter_mut().find(|f| f.name == name) {
            field.value = value.into();
            field.errors.clear();
        }
    }

    /// True when the form or any field carries an error.
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty() || self.fields.iter().any(|f| !f.errors.is_empty())
    }
}

/// One field of a form instance.
#[derive(Debug, Clone, Serialize)]
pub struct Field {
    pub id: String,
    pub name: String,
    pub label: String,
    pub kind: &'static str,
    pub widget: Widget,
    pub required: bool,
    /// Current value (first value for multi-selects).
    pub value: String,
    /// Every current value of a multi-select.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<FieldOption>,
    pub errors: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<String>,
}

/// A select option as rendered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldOption {
    pub id: String,
    pub value: String,
    pub label: String,
    pub selected: bool,
}

/// Typed values of the fields that parsed without a fatal error.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct FormData(Map<String, Value>);

impl FormData {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }

    /// Deserialize the typed values into a struct.
    pub fn into_typed<T: DeserializeOwned>(self) -> Result<T, serde_json::Error> {
        serde_json::from_value(Value::Object(self.0))
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mode {
    Prefill,
    Parse,
}

impl FormSchema {
    /// A blank form. Mints a fresh CSRF token when configured.
    pub fn empty(&self) -> Form {
        let mut fields: Vec<Field> = self.fields.iter().map(blank_field).collect();
        self.push_csrf_field(&mut fields);
        Form {
            fields,
            errors: Vec::new(),
        }
    }

    /// A form showing existing values, e.g. for editing a stored record.
    /// No validation errors are recorded and no token is checked.
    pub fn prefilled(&self, values: &FormValues) -> Form {
        self.bind(values, Mode::Prefill).0
    }

    /// Validate a submission.
    ///
    /// Returns the form to re-render (with errors) and the typed values of
    /// every field that produced one.
    pub fn parse(&self, values: &FormValues) -> (Form, FormData) {
        let (form, data) = self.bind(values, Mode::Parse);
        if form.has_errors() {
            debug!(
                form_errors = form.errors.len(),
                field_errors = form.fields.iter().map(|f| f.errors.len()).sum::<usize>(),
                "form submission rejected"
            );
        }
        (form, data)
    }

    fn bind(&self, values: &FormValues, mode: Mode) -> (Form, FormData) {
        let mut fields = Vec::with_capacity(self.fields.len() + 1);
        let mut data = Map::new();

        for def in self.fields.iter() {
            let (mut field, typed) = bind_field(def, values);
            if mode == Mode::Prefill {
                field.errors.clear();
            }
            if let Some(typed) = typed {
                data.insert(def.name.clone(), typed);
            }
            fields.push(field);
        }

        let mut errors = Vec::new();
        if mode == Mode::Parse
            && let Some(signer) = &self.csrf
        {
            match signer.validate(values.get(CSRF_FIELD).unwrap_or_default()) {
                Ok(()) => {}
                Err(CsrfError::Expired) => errors.push(MSG_CSRF_EXPIRED.to_string()),
                Err(_) => errors.push(MSG_CSRF_INVALID.to_string()),
            }
        }
        self.push_csrf_field(&mut fields);

        (Form { fields, errors }, FormData(data))
    }

    fn push_csrf_field(&self, fields: &mut Vec<Field>) {
        if let Some(signer) = &self.csrf {
            let mut field = Field::new(CSRF_FIELD, CSRF_FIELD, "hidden", Widget::Input);
            field.value = signer.generate();
            fields.push(field);
        }
    }
}

impl Field {
    fn new(name: &str, label: &str, kind: &'static str, widget: Widget) -> Self {
        Self {
            id: element_id(&[name]),
            name: name.to_string(),
            label: label.to_string(),
            kind,
            widget,
            required: false,
            value: String::new(),
            values: Vec::new(),
            options: Vec::new(),
            errors: Vec::new(),
            min_length: None,
            max_length: None,
            pattern: None,
            min: None,
            max: None,
        }
    }

    fn from_def(def: &FieldDef) -> Self {
        let mut field = Self::new(&def.name, &def.label, def.kind.name(), def.kind.widget());
        field.required = def.required;
        match &def.kind {
            FieldKind::Text(c) | FieldKind::Password(c) => {
                field.min_length = c.min_length;
                field.max_length = c.max_length;
                field.pattern = c.pattern.as_ref().map(|p| p.as_str().to_string());
            }
            FieldKind::DateTimeLocal(c) => {
                field.min = c.min.map(|t| format_datetime_local(t, c.time_zone));
                field.max = c.max.map(|t| format_datetime_local(t, c.time_zone));
            }
            _ => {}
        }
        field
    }
}

fn blank_field(def: &FieldDef) -> Field {
    let mut field = Field::from_def(def);
    field.options = options_view(def, |o| o.selected);
    match &def.kind {
        FieldKind::Hidden(c) => field.value = c.value.clone().unwrap_or_default(),
        FieldKind::Select(c) => {
            field.value = c
                .options
                .iter()
                .find(|o| o.selected)
                .map(|o| o.value.clone())
                .unwrap_or_default();
        }
        FieldKind::SelectMulti(c) => {
            field.values = c
                .options
                .iter()
                .filter(|o| o.selected)
                .map(|o| o.value.clone())
                .collect();
            field.value = field.values.first().cloned().unwrap_or_default();
        }
        _ => {}
    }
    field
}

/// Bind one field to the submitted values. `None` means fatal for this field.
fn bind_field(def: &FieldDef, values: &FormValues) -> (Field, Option<Value>) {
    let mut field = Field::from_def(def);

    if let FieldKind::SelectMulti(c) = &def.kind {
        let submitted: Vec<&str> = values
            .get_all(&def.name)
            .into_iter()
            .filter(|v| !v.is_empty())
            .collect();
        field.values = submitted.iter().map(|v| v.to_string()).collect();
        field.value = field.values.first().cloned().unwrap_or_default();
        field.options = options_view(def, |o| submitted.contains(&o.value.as_str()));

        if def.required && submitted.is_empty() {
            field.errors.push(MSG_REQUIRED.to_string());
            return (field, None);
        }

        let mut items = Vec::with_capacity(submitted.len());
        let mut fatal = false;
        for value in submitted {
            match parse_option(&c.options, c.parse.as_ref(), value) {
                Ok(item) => items.push(item),
                Err(errors) => {
                    field.errors.extend(errors);
                    fatal = true;
                }
            }
        }
        return (field, (!fatal).then_some(Value::Array(items)));
    }

    let submitted = values.get(&def.name).unwrap_or_default();
    let submitted = if def.trims() {
        submitted.trim()
    } else {
        submitted
    };
    let value = match &def.kind {
        FieldKind::Hidden(c) => c.value.as_deref().unwrap_or(submitted),
        _ => submitted,
    };
    field.value = value.to_string();
    field.options = options_view(def, |o| o.value == value);

    if def.required && value.is_empty() {
        field.errors.push(MSG_REQUIRED.to_string());
        return (field, None);
    }

    let typed = match &def.kind {
        FieldKind::Text(c) | FieldKind::Password(c) => parse_text(c, value, &mut field.errors),
        FieldKind::Hidden(c) => parse_hidden(c, value, &mut field.errors),
        FieldKind::DateTimeLocal(c) => parse_datetime(c, value, &mut field.errors),
        FieldKind::Select(c) => match parse_option(&c.options, c.parse.as_ref(), value) {
            Ok(v) => Some(v),
            Err(errors) => {
                field.errors.extend(errors);
                None
            }
        },
        FieldKind::SelectMulti(_) => None,
    };
    (field, typed)
}

fn parse_hidden(config: &HiddenConfig, value: &str, errors: &mut Vec<String>) -> Option<Value> {
    let Some(parse) = &config.parse else {
        return Some(Value::String(value.to_string()));
    };
    if value.is_empty() {
        return Some(Value::Null);
    }
    match parse.call(value) {
        Ok(typed) => Some(typed),
        Err(messages) => {
            errors.extend(messages);
            None
        }
    }
}

fn parse_text(config: &TextConfig, value: &str, errors: &mut Vec<String>) -> Option<Value> {
    if value.is_empty() {
        return Some(match config.parse {
            Some(_) => Value::Null,
            None => Value::String(String::new()),
        });
    }

    errors.extend(length_errors(config.min_length, config.max_length, value));

    if let Some(pattern) = &config.pattern
        && !pattern
            .find(value)
            .is_some_and(|m| m.start() == 0 && m.end() == value.len())
    {
        errors.push(format!("Must match the pattern {}.", pattern.as_str()));
    }

    match &config.parse {
        Some(parse) => match parse.call(value) {
            Ok(typed) => Some(typed),
            Err(e) => {
                errors.extend(e);
                None
            }
        },
        None => Some(Value::String(value.to_string())),
    }
}

fn length_errors(min: Option<usize>, max: Option<usize>, value: &str) -> Vec<String> {
    let len = value.chars().count();
    let mut errors = Vec::new();
    if let Some(min) = min
        && len < min
    {
        errors.push(format!("Must be at least {min} characters."));
    }
    if let Some(max) = max
        && len > max
    {
        errors.push(format!("Must be at most {max} characters."));
    }
    errors
}

fn parse_datetime(
    config: &DateTimeLocalConfig,
    value: &str,
    errors: &mut Vec<String>,
) -> Option<Value> {
    if value.is_empty() {
        return Some(Value::Null);
    }

    let Some(at) = is_datetime_local_shape(value)
        .then(|| NaiveDateTime::parse_from_str(value, DATETIME_LOCAL_FORMAT).ok())
        .flatten()
        .and_then(|naive| localize(naive, config.time_zone))
    else {
        errors.push(MSG_INVALID_DATETIME.to_string());
        return None;
    };

    let instant = at.with_timezone(&Utc);
    if let Some(min) = config.min
        && instant < min
    {
        errors.push(format!(
            "Date/time must not be before {}.",
            format_datetime_local(min, config.time_zone)
        ));
    }
    if let Some(max) = config.max
        && instant > max
    {
        errors.push(format!(
            "Date/time must not be after {}.",
            format_datetime_local(max, config.time_zone)
        ));
    }

    Some(Value::String(at.to_rfc3339()))
}

/// `YYYY-MM-DDTHH:mm` exactly; chrono alone accepts unpadded fields.
fn is_datetime_local_shape(value: &str) -> bool {
    const SHAPE: &[u8; 16] = b"dddd-dd-ddTdd:dd";
    value.len() == SHAPE.len()
        && value.bytes().zip(SHAPE).all(|(b, &expected)| match expected {
            b'd' => b.is_ascii_digit(),
            _ => b == expected,
        })
}

/// Interpret a wall-clock time in `tz` (UTC when unset). Times skipped by a
/// DST transition do not exist and yield `None`; ambiguous ones pick the
/// earlier instant.
fn localize(naive: NaiveDateTime, tz: Option<Tz>) -> Option<DateTime<FixedOffset>> {
    match tz {
        Some(tz) => tz
            .from_local_datetime(&naive)
            .earliest()
            .map(|t| t.fixed_offset()),
        None => Some(naive.and_utc().fixed_offset()),
    }
}

/// Format an instant as a `datetime-local` value in `tz` (UTC when unset).
pub fn format_datetime_local(at: DateTime<Utc>, tz: Option<Tz>) -> String {
    match tz {
        Some(tz) => at.with_timezone(&tz).format(DATETIME_LOCAL_FORMAT).to_string(),
        None => at.format(DATETIME_LOCAL_FORMAT).to_string(),
    }
}

fn parse_option(
    options: &[SelectOption],
    parse: Option<&ParseFn>,
    value: &str,
) -> Result<Value, Vec<String>> {
    if !options.iter().any(|o| o.value == value) {
        let message = if value.is_empty() {
            MSG_SELECT_PROMPT.to_string()
        } else {
            format!("{value} is not a valid selection.")
        };
        return Err(vec![message]);
    }
    match parse {
        Some(parse) => parse.call(value),
        None => Ok(Value::String(value.to_string())),
    }
}

fn options_view(def: &FieldDef, selected: impl Fn(&SelectOption) -> bool) -> Vec<FieldOption> {
    def.kind
        .options()
        .iter()
        .enumerate()
        .map(|(i, o)| FieldOption {
            id: element_id(&[&def.name, &i.to_string()]),
            value: o.value.clone(),
            label: o.label.clone(),
            selected: selected(o),
        })
        .collect()
}

/// Stable HTML id: the whitespace-free `_`-joined parts, `_`, then the
/// base64url FNV-1 hash of the parts' bytes (unseparated), so ids stay unique
/// even when names only differ in characters stripped here.
pub(crate) fn element_id(parts: &[&str]) -> String {
    let cleaned: String = parts
        .join("_")
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    let hash = parts
        .iter()
        .fold(FNV_OFFSET_BASIS, |hash, part| fnv1_32(hash, part.as_bytes()));
    format!("{cleaned}_{}", URL_SAFE.encode(hash.to_be_bytes()))
}

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;

/// FNV-1 (multiply, then xor) continuing from `hash`.
fn fnv1_32(hash: u32, bytes: &[u8]) -> u32 {
    const PRIME: u32 = 0x0100_0193;
    bytes
        .iter()
        .fold(hash, |hash, b| hash.wrapping_mul(PRIME) ^ u32::from(*b))
}
