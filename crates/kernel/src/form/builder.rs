//! Form schema construction.
//!
//! A [`FormBuilder`] collects fields until [`FormBuilder::done`] turns it
//! into an immutable [`FormSchema`]. The schema is the only thing that can
//! produce form instances, so a half-built form can never be rendered or
//! parsed, and a finished one can never gain fields.

use std::collections::HashSet;
use std::sync::Arc;

use thiserror::Error;

use super::csrf::{CSRF_FIELD, CsrfSigner};
use super::types::FieldDef;

/// Programmer errors in a schema definition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("form field name must not be empty")]
    EmptyName,

    #[error("form field name `{0}` is reserved")]
    ReservedName(String),

    #[error("form field `{0}` is defined more than once")]
    DuplicateName(String),
}

/// Collects field definitions in declaration order.
#[derive(Debug, Default)]
pub struct FormBuilder {
    fields: Vec<FieldDef>,
    names: HashSet<String>,
    csrf: Option<Arc<CsrfSigner>>,
    error: Option<SchemaError>,
}

impl FormBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Protect instances of this form with CSRF tokens.
    pub fn csrf(mut self, signer: impl Into<Option<Arc<CsrfSigner>>>) -> Self {
        self.csrf = signer.into();
        self
    }

    /// Append a field. Misuse is reported by [`done`](Self::done).
    pub fn field(mut self, name: impl Into<String>, mut def: FieldDef) -> Self {
        let name = name.into();
        if self.error.is_some() {
            return self;
        }

        if name.is_empty() {
            self.error = Some(SchemaError::EmptyName);
        } else if name == CSRF_FIELD {
            self.error = Some(SchemaError::ReservedName(name));
        } else if !self.names.insert(name.clone()) {
            self.error = Some(SchemaError::DuplicateName(name));
        } else {
            if def.label.is_empty() {
                def.label = name.clone();
            }
            def.name = name;
            self.fields.push(def);
        }
        self
    }

    /// Finalize the schema.
    pub fn done(self) -> Result<FormSchema, SchemaError> {
        if let Some(e) = self.error {
            return Err(e);
        }
        Ok(FormSchema {
            fields: self.fields.into(),
            csrf: self.csrf,
        })
    }
}

/// An immutable, shareable form definition.
///
/// Instances are produced with [`empty`](Self::empty),
/// [`prefilled`](Self::prefilled) and [`parse`](Self::parse).
#[derive(Debug, Clone)]
pub struct FormSchema {
    pub(crate) fields: Arc<[FieldDef]>,
    pub(crate) csrf: Option<Arc<CsrfSigner>>,
}

impl FormSchema {
    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn has_csrf(&self) -> bool {
        self.csrf.is_some()
    }
}
