//! Field definitions and per-kind configuration.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;

/// Typed-parse hook for a field value.
///
/// Returning `Err` makes the field fatal: the messages become field errors
/// and the field is left out of the typed map.
#[derive(Clone)]
pub struct ParseFn(Arc<dyn Fn(&str) -> Result<Value, Vec<String>> + Send + Sync>);

impl ParseFn {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&str) -> Result<Value, Vec<String>> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn call(&self, value: &str) -> Result<Value, Vec<String>> {
        (self.0)(value)
    }
}

impl fmt::Debug for ParseFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ParseFn(..)")
    }
}

/// Configuration shared by `text` and `password` fields.
#[derive(Debug, Clone, Default)]
pub struct TextConfig {
    pub parse: Option<ParseFn>,
    pub multiline: bool,
    pub pattern: Option<Regex>,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
}

impl TextConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(mut self, parse: ParseFn) -> Self {
        self.parse = Some(parse);
        self
    }

    /// Render as a textarea.
    pub fn multiline(mut self) -> Self {
        self.multiline = true;
        self
    }

    /// Whole-value pattern the input must match.
    pub fn pattern(mut self, pattern: Regex) -> Self {
        self.pattern = Some(pattern);
        self
    }

    pub fn min_length(mut self, min: usize) -> Self {
        self.min_length = Some(min);
        self
    }

    pub fn max_length(mut self, max: usize) -> Self {
        self.max_length = Some(max);
        self
    }
}

/// Configuration for `hidden` fields.
#[derive(Debug, Clone, Default)]
pub struct HiddenConfig {
    pub parse: Option<ParseFn>,
    /// Server-fixed value; submitted input is ignored when set.
    pub value: Option<String>,
}

impl HiddenConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fixed(value: impl Into<String>) -> Self {
        Self {
            value: Some(value.into()),
            ..Self::default()
        }
    }

    /// Typed conversion applied to the effective value.
    pub fn parse(mut self, parse: ParseFn) -> Self {
        self.parse = Some(parse);
        self
    }
}

/// Configuration for `datetime-local` fields.
#[derive(Debug, Clone, Default)]
pub struct DateTimeLocalConfig {
    /// Zone the submitted wall-clock time is interpreted in. UTC when unset.
    pub time_zone: Option<Tz>,
    /// Inclusive lower bound.
    pub min: Option<DateTime<Utc>>,
    /// Inclusive upper bound.
    pub max: Option<DateTime<Utc>>,
}

impl DateTimeLocalConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn time_zone(mut self, tz: Tz) -> Self {
        self.time_zone = Some(tz);
        self
    }

    pub fn min(mut self, min: DateTime<Utc>) -> Self {
        self.min = Some(min);
        self
    }

    pub fn max(mut self, max: DateTime<Utc>) -> Self {
        self.max = Some(max);
        self
    }
}

/// A selectable option.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectOption {
    pub value: String,
    pub label: String,
    /// Selected in the empty form.
    pub selected: bool,
}

impl SelectOption {
    pub fn new(value: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            label: label.into(),
            selected: false,
        }
    }

    pub fn selected(mut self) -> Self {
        self.selected = true;
        self
    }
}

impl<V: Into<String>, L: Into<String>> From<(V, L)> for SelectOption {
    fn from((value, label): (V, L)) -> Self {
        Self::new(value, label)
    }
}

/// Configuration for `select` fields.
#[derive(Debug, Clone, Default)]
pub struct SelectConfig {
    pub options: Vec<SelectOption>,
    pub parse: Option<ParseFn>,
    /// Render as radio buttons.
    pub radio: bool,
}

impl SelectConfig {
    pub fn new<I, O>(options: I) -> Self
    where
        I: IntoIterator<Item = O>,
        O: Into<SelectOption>,
    {
        Self {
            options: options.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn parse(mut self, parse: ParseFn) -> Self {
        self.parse = Some(parse);
        self
    }

    pub fn radio(mut self) -> Self {
        self.radio = true;
        self
    }
}

/// Configuration for `select-multi` fields.
#[derive(Debug, Clone, Default)]
pub struct SelectMultiConfig {
    pub options: Vec<SelectOption>,
    pub parse: Option<ParseFn>,
    /// Render as checkboxes.
    pub checkbox: bool,
}

impl SelectMultiConfig {
    pub fn new<I, O>(options: I) -> Self
    where
        I: IntoIterator<Item = O>,
        O: Into<SelectOption>,
    {
        Self {
            options: options.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn parse(mut self, parse: ParseFn) -> Self {
        self.parse = Some(parse);
        self
    }

    pub fn checkbox(mut self) -> Self {
        self.checkbox = true;
        self
    }
}

/// Field kind with its kind-specific configuration.
#[derive(Debug, Clone)]
pub enum FieldKind {
    Text(TextConfig),
    Password(TextConfig),
    Hidden(HiddenConfig),
    DateTimeLocal(DateTimeLocalConfig),
    Select(SelectConfig),
    SelectMulti(SelectMultiConfig),
}

impl FieldKind {
    /// Kind name as used by templates (and the HTML `type` where one exists).
    pub fn name(&self) -> &'static str {
        match self {
            FieldKind::Text(_) => "text",
            FieldKind::Password(_) => "password",
            FieldKind::Hidden(_) => "hidden",
            FieldKind::DateTimeLocal(_) => "datetime-local",
            FieldKind::Select(_) => "select",
            FieldKind::SelectMulti(_) => "select-multi",
        }
    }

    /// Rendering hint for templates.
    pub fn widget(&self) -> Widget {
        match self {
            FieldKind::Text(c) if c.multiline => Widget::Textarea,
            FieldKind::Text(_)
            | FieldKind::Password(_)
            | FieldKind::Hidden(_)
            | FieldKind::DateTimeLocal(_) => Widget::Input,
            FieldKind::Select(c) if c.radio => Widget::Radio,
            FieldKind::SelectMulti(c) if c.checkbox => Widget::Checkbox,
            FieldKind::Select(_) | FieldKind::SelectMulti(_) => Widget::Select,
        }
    }

    /// Kinds whose value is trimmed before validation unless overridden.
    pub(crate) fn trims_by_default(&self) -> bool {
        matches!(self, FieldKind::Text(_) | FieldKind::DateTimeLocal(_))
    }

    pub(crate) fn options(&self) -> &[SelectOption] {
        match self {
            FieldKind::Select(c) => &c.options,
            FieldKind::SelectMulti(c) => &c.options,
            _ => &[],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Widget {
    Input,
    Textarea,
    Select,
    Radio,
    Checkbox,
}

/// A field in a form schema.
#[derive(Debug, Clone)]
pub struct FieldDef {
    pub(crate) name: String,
    pub(crate) label: String,
    pub(crate) required: bool,
    pub(crate) trim: Option<bool>,
    pub(crate) kind: FieldKind,
}

impl FieldDef {
    pub fn new(kind: FieldKind) -> Self {
        Self {
            name: String::new(),
            label: String::new(),
            required: false,
            trim: None,
            kind,
        }
    }

    pub fn text(config: TextConfig) -> Self {
        Self::new(FieldKind::Text(config))
    }

    pub fn password(config: TextConfig) -> Self {
        Self::new(FieldKind::Password(config))
    }

    pub fn hidden(config: HiddenConfig) -> Self {
        Self::new(FieldKind::Hidden(config))
    }

    pub fn datetime_local(config: DateTimeLocalConfig) -> Self {
        Self::new(FieldKind::DateTimeLocal(config))
    }

    pub fn select(config: SelectConfig) -> Self {
        Self::new(FieldKind::Select(config))
    }

    pub fn select_multi(config: SelectMultiConfig) -> Self {
        Self::new(FieldKind::SelectMulti(config))
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Override the kind's default trim policy.
    pub fn trim(mut self, trim: bool) -> Self {
        self.trim = Some(trim);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &FieldKind {
        &self.kind
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub(crate) fn trims(&self) -> bool {
        self.trim.unwrap_or_else(|| self.kind.trims_by_default())
    }
}

// Tests are allowed to use unwrap/expect freely.
#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn trim_policy_per_kind() {
        assert!(FieldDef::text(TextConfig::new()).trims());
        assert!(FieldDef::datetime_local(DateTimeLocalConfig::new()).trims());
        assert!(!FieldDef::password(TextConfig::new()).trims());
        assert!(!FieldDef::hidden(HiddenConfig::new()).trims());
        assert!(!FieldDef::select(SelectConfig::new([("a", "A")])).trims());
        assert!(!FieldDef::text(TextConfig::new()).trim(false).trims());
    }

    #[test]
    fn widget_hints() {
        assert_eq!(
            FieldKind::Text(TextConfig::new().multiline()).widget(),
            Widget::Textarea
        );
        assert_eq!(
            FieldKind::Select(SelectConfig::new([("a", "A")]).radio()).widget(),
            Widget::Radio
        );
        assert_eq!(
            FieldKind::SelectMulti(SelectMultiConfig::new([("a", "A")])).widget(),
            Widget::Select
        );
    }

    #[test]
    fn parse_fn_is_callable() {
        let upper = ParseFn::new(|v| Ok(Value::String(v.to_uppercase())));
        assert_eq!(upper.call("abc").unwrap(), Value::String("ABC".into()));
        assert_eq!(format!("{upper:?}"), "ParseFn(..)");
    }

    #[test]
    fn hidden_builder_keeps_fixed_value() {
        let config = HiddenConfig::fixed("7").parse(ParseFn::new(|v| Ok(Value::from(v.len()))));
        assert_eq!(config.value.as_deref(), Some("7"));
        assert_eq!(config.parse.unwrap().call("abc").unwrap(), Value::from(3));
        assert!(HiddenConfig::new().parse.is_none());
    }
}
