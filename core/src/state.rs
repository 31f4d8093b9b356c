//! State container owned by the store, and name-based field access.
//!
//! A [`StateContainer`] pairs the observable state with a partition that only
//! the reducer sees. Both are plain owned values; the store keeps the
//! container behind its lock and hands the reducer `&mut` access.

use crate::error::StateError;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

type Getter<S> = Box<dyn Fn(&S) -> Result<Value, serde_json::Error> + Send + Sync>;
type Setter<S> = Box<dyn Fn(&mut S, Value) -> Result<(), serde_json::Error> + Send + Sync>;

struct Field<S> {
    name: &'static str,
    get: Getter<S>,
    set: Setter<S>,
}

/// Ordered table of named accessors into a state type.
///
/// Built once per state type and shared through an `Arc`. Values cross the
/// table as [`serde_json::Value`], so callers can read and write fields
/// without knowing their concrete types.
///
/// # Example
///
/// ```ignore
/// let fields = FieldTable::builder()
///     .field("count", |s: &Counter| &s.count, |s| &mut s.count)
///     .field("label", |s: &Counter| &s.label, |s| &mut s.label)
///     .build();
/// ```
pub struct FieldTable<S> {
    fields: Vec<Field<S>>,
}

impl<S: 'static> FieldTable<S> {
    /// Start building a table
    #[must_use]
    pub const fn builder() -> FieldTableBuilder<S> {
        FieldTableBuilder { fields: Vec::new() }
    }

    /// Field names in registration order
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields.iter().map(|field| field.name)
    }

    /// Number of registered fields
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the table has no fields
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Whether a field named `name` exists
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.find(name).is_some()
    }

    /// Read a field as JSON
    ///
    /// # Errors
    ///
    /// [`StateError::UnknownField`] for an unregistered name,
    /// [`StateError::Codec`] if the value fails to serialize.
    pub fn get(&self, state: &S, name: &str) -> Result<Value, StateError> {
        let field = self
            .find(name)
            .ok_or_else(|| StateError::UnknownField(name.to_string()))?;
        Ok((field.get)(state)?)
    }

    /// Overwrite a field from JSON
    ///
    /// # Errors
    ///
    /// [`StateError::UnknownField`] for an unregistered name,
    /// [`StateError::Codec`] if `value` does not fit the field's type. The
    /// state is unchanged on error.
    pub fn set(&self, state: &mut S, name: &str, value: Value) -> Result<(), StateError> {
        let field = self
            .find(name)
            .ok_or_else(|| StateError::UnknownField(name.to_string()))?;
        Ok((field.set)(state, value)?)
    }

    fn find(&self, name: &str) -> Option<&Field<S>> {
        self.fields.iter().find(|field| field.name == name)
    }
}

impl<S> std::fmt::Debug for FieldTable<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.fields.iter().map(|field| field.name))
            .finish()
    }
}

/// Builder for [`FieldTable`]
pub struct FieldTableBuilder<S> {
    fields: Vec<Field<S>>,
}

impl<S: 'static> FieldTableBuilder<S> {
    /// Register a field. Registering a name twice replaces the earlier
    /// accessor and keeps its position.
    #[must_use]
    pub fn field<T>(
        mut self,
        name: &'static str,
        get: fn(&S) -> &T,
        get_mut: fn(&mut S) -> &mut T,
    ) -> Self
    where
        T: Serialize + DeserializeOwned + 'static,
    {
        let field = Field {
            name,
            get: Box::new(move |state| serde_json::to_value(get(state))),
            set: Box::new(move |state, value| {
                *get_mut(state) = serde_json::from_value(value)?;
                Ok(())
            }),
        };

        match self.fields.iter_mut().find(|existing| existing.name == name) {
            Some(existing) => *existing = field,
            None => self.fields.push(field),
        }
        self
    }

    /// Finish the table
    #[must_use]
    pub fn build(self) -> FieldTable<S> {
        FieldTable {
            fields: self.fields,
        }
    }
}

/// The mutable state a store owns.
///
/// Dereferences to the observable state `S`. The reducer-private partition
/// `P` is reached through [`StateContainer::reducer_state`].
pub struct StateContainer<S, P = ()> {
    state: S,
    reducer_state: P,
    fields: Option<Arc<FieldTable<S>>>,
}

impl<S, P> StateContainer<S, P> {
    /// Container from both partitions
    #[must_use]
    pub const fn new(state: S, reducer_state: P) -> Self {
        Self {
            state,
            reducer_state,
            fields: None,
        }
    }

    /// Attach a field table for name-based access
    #[must_use]
    pub fn with_fields(mut self, fields: Arc<FieldTable<S>>) -> Self {
        self.fields = Some(fields);
        self
    }

    /// The reducer-private partition
    #[must_use]
    pub const fn reducer_state(&self) -> &P {
        &self.reducer_state
    }

    /// Mutable access to the reducer-private partition
    pub const fn reducer_state_mut(&mut self) -> &mut P {
        &mut self.reducer_state
    }

    /// The attached field table, if any
    #[must_use]
    pub fn fields(&self) -> Option<&FieldTable<S>> {
        self.fields.as_deref()
    }

    /// Split into observable and reducer-private state
    pub fn into_parts(self) -> (S, P) {
        (self.state, self.reducer_state)
    }
}

impl<S: 'static, P> StateContainer<S, P> {
    /// Read a field by name
    ///
    /// # Errors
    ///
    /// [`StateError::NoFieldTable`] without an attached table, otherwise the
    /// errors of [`FieldTable::get`].
    pub fn get(&self, name: &str) -> Result<Value, StateError> {
        self.fields
            .as_deref()
            .ok_or(StateError::NoFieldTable)?
            .get(&self.state, name)
    }

    /// Read a field by name into a concrete type
    ///
    /// # Errors
    ///
    /// As [`StateContainer::get`], plus [`StateError::Codec`] when the value
    /// does not deserialize into `T`.
    pub fn get_as<T: DeserializeOwned>(&self, name: &str) -> Result<T, StateError> {
        Ok(serde_json::from_value(self.get(name)?)?)
    }

    /// Write a field by name
    ///
    /// # Errors
    ///
    /// [`StateError::NoFieldTable`] without an attached table, otherwise the
    /// errors of [`FieldTable::set`].
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<(), StateError> {
        let fields = self.fields.clone().ok_or(StateError::NoFieldTable)?;
        fields.set(&mut self.state, name, value.into())
    }
}

impl<S> From<S> for StateContainer<S, ()> {
    fn from(state: S) -> Self {
        Self::new(state, ())
    }
}

impl<S: Default, P: Default> Default for StateContainer<S, P> {
    fn default() -> Self {
        Self::new(S::default(), P::default())
    }
}

impl<S, P> Deref for StateContainer<S, P> {
    type Target = S;

    fn deref(&self) -> &S {
        &self.state
    }
}

impl<S, P> DerefMut for StateContainer<S, P> {
    fn deref_mut(&mut self) -> &mut S {
        &mut self.state
    }
}

impl<S: Clone, P: Clone> Clone for StateContainer<S, P> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
            reducer_state: self.reducer_state.clone(),
            fields: self.fields.clone(),
        }
    }
}

// The field table is an accessor, not data
impl<S: PartialEq, P: PartialEq> PartialEq for StateContainer<S, P> {
    fn eq(&self, other: &Self) -> bool {
        self.state == other.state && self.reducer_state == other.reducer_state
    }
}

impl<S: std::fmt::Debug, P: std::fmt::Debug> std::fmt::Debug for StateContainer<S, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateContainer")
            .field("state", &self.state)
            .field("reducer_state", &self.reducer_state)
            .finish_non_exhaustive()
    }
}
