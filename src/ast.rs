//! Selections to execute.

use std::sync::Arc;

use arcstr::ArcStr;

use crate::value::{Object, Value};

/// A field of a selection set, with its arguments already resolved to
/// values.
///
/// Cloning is cheap: arguments and the nested selection set are shared.
#[derive(Clone, Debug, PartialEq)]
pub struct Field {
    alias: Option<ArcStr>,
    name: ArcStr,
    arguments: Arc<Object>,
    selection_set: Arc<[Field]>,
}

impl Field {
    /// Selects the field `name` without arguments or sub-selection.
    pub fn new(name: impl Into<ArcStr>) -> Self {
        Self {
            alias: None,
            name: name.into(),
            arguments: Arc::default(),
            selection_set: Arc::new([]),
        }
    }

    /// Puts the result under `alias` instead of the field name.
    #[must_use]
    pub fn alias(mut self, alias: impl Into<ArcStr>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Passes `value` as the argument `name`.
    #[must_use]
    pub fn argument(mut self, name: impl Into<ArcStr>, value: Value) -> Self {
        _ = Arc::make_mut(&mut self.arguments).add_field(name, value);
        self
    }

    /// Selects `fields` of the result.
    #[must_use]
    pub fn selection(mut self, fields: impl IntoIterator<Item = Field>) -> Self {
        self.selection_set = fields.into_iter().collect();
        self
    }

    /// Key the result is put under in the response.
    pub fn response_key(&self) -> &ArcStr {
        self.alias.as_ref().unwrap_or(&self.name)
    }

    /// Name of the selected field.
    pub fn name(&self) -> &ArcStr {
        &self.name
    }

    /// Arguments passed to the field.
    pub fn arguments(&self) -> &Object {
        &self.arguments
    }

    /// Fields selected of the result.
    pub fn selection_set(&self) -> &Arc<[Field]> {
        &self.selection_set
    }
}
