//! Reference and implementation identifiers.
//!
//! A [`Ref<T>`] names the logical *role* a task plays ("log-input", not
//! "cloud-logging"); an [`Impl<T>`] names one concrete binding of that role
//! ("log-input#cloud-logging"). Equality is by string at runtime; `T` is
//! part of static identity only, so mixing up `Ref<A>` and `Ref<B>` built
//! from the same string is a caller error the type system catches at the
//! call site, not something this module can detect for you.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::Lazy;

/// The character reserved to separate a reference from its implementation
/// tag in canonical string form.
pub const SEPARATOR: char = '#';

/// The tag used when a task does not name an explicit implementation.
pub const DEFAULT_TAG: &str = "default";

static INTERN: Lazy<DashMap<Box<str>, Arc<str>>> = Lazy::new(DashMap::new);

/// Interns `s`, returning a cheaply-cloneable handle shared by every caller
/// that interns the same string. Mirrors the teacher's string interning
/// pool used to avoid repeated allocation of the same task id.
fn intern(s: &str) -> Arc<str> {
    if let Some(existing) = INTERN.get(s) {
        return existing.clone();
    }
    let arc: Arc<str> = Arc::from(s);
    INTERN.insert(Box::from(s), arc.clone());
    arc
}

/// An opaque handle naming the logical role a task fulfills.
///
/// Construct with [`new_ref`]. The identifier must not contain
/// [`SEPARATOR`].
pub struct Ref<T> {
    id: Arc<str>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Ref<T> {
    pub fn string(&self) -> &str {
        &self.id
    }
}

impl<T> Clone for Ref<T> {
    fn clone(&self) -> Self {
        Ref {
            id: self.id.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> PartialEq for Ref<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}
impl<T> Eq for Ref<T> {}

impl<T> Hash for Ref<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl<T> fmt::Debug for Ref<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ref({})", self.id)
    }
}

impl<T> fmt::Display for Ref<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

/// Error returned when an identifier string is malformed.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum IdError {
    #[error("identifier '{0}' must not contain '{SEPARATOR}'")]
    ContainsSeparator(String),
    #[error("identifier must not be empty")]
    Empty,
}

/// Builds a [`Ref<T>`], rejecting identifiers containing [`SEPARATOR`].
pub fn new_ref<T>(id: impl AsRef<str>) -> Result<Ref<T>, IdError> {
    let id = id.as_ref();
    if id.is_empty() {
        return Err(IdError::Empty);
    }
    if id.contains(SEPARATOR) {
        return Err(IdError::ContainsSeparator(id.to_string()));
    }
    Ok(Ref {
        id: intern(id),
        _marker: PhantomData,
    })
}

/// A concrete binding of a [`Ref<T>`] to one implementation, identified by
/// `tag`. Canonical string form is `<ref>#<tag>`.
pub struct Impl<T> {
    reference: Ref<T>,
    tag: Arc<str>,
    canonical: Arc<str>,
}

impl<T> Impl<T> {
    pub fn reference(&self) -> &Ref<T> {
        &self.reference
    }

    /// Back-compat accessor name matching `Impl.ref()`.
    pub fn r#ref(&self) -> &Ref<T> {
        &self.reference
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn string(&self) -> &str {
        &self.canonical
    }
}

impl<T> Clone for Impl<T> {
    fn clone(&self) -> Self {
        Impl {
            reference: self.reference.clone(),
            tag: self.tag.clone(),
            canonical: self.canonical.clone(),
        }
    }
}

impl<T> PartialEq for Impl<T> {
    fn eq(&self, other: &Self) -> bool {
        self.canonical == other.canonical
    }
}
impl<T> Eq for Impl<T> {}

impl<T> Hash for Impl<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.canonical.hash(state);
    }
}

impl<T> fmt::Debug for Impl<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Impl({})", self.canonical)
    }
}

impl<T> fmt::Display for Impl<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.canonical)
    }
}

/// Builds an [`Impl<T>`] from a reference and implementation tag.
pub fn new_impl<T>(reference: Ref<T>, tag: impl AsRef<str>) -> Result<Impl<T>, IdError> {
    let tag = tag.as_ref();
    if tag.is_empty() {
        return Err(IdError::Empty);
    }
    if tag.contains(SEPARATOR) {
        return Err(IdError::ContainsSeparator(tag.to_string()));
    }
    let canonical = intern(&format!("{}{SEPARATOR}{}", reference.string(), tag));
    Ok(Impl {
        reference,
        tag: intern(tag),
        canonical,
    })
}

/// Shorthand for `new_impl(new_ref(id)?, DEFAULT_TAG)`.
pub fn new_default_impl<T>(id: impl AsRef<str>) -> Result<Impl<T>, IdError> {
    new_impl(new_ref(id)?, DEFAULT_TAG)
}

/// A type-erased reference identifier, used where a task's `deps` list must
/// hold references to values of heterogeneous types. Retains the static
/// type name of the `T` it was built from, so the resolver can perform the
/// type-consistency check required at reference-table construction (§4.4)
/// even though the identifier itself is now untyped.
#[derive(Clone, Debug)]
pub struct UntypedRef {
    id: Arc<str>,
    type_name: &'static str,
}

impl UntypedRef {
    pub fn string(&self) -> &str {
        &self.id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl PartialEq for UntypedRef {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}
impl Eq for UntypedRef {}

impl Hash for UntypedRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for UntypedRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

impl<T: 'static> From<Ref<T>> for UntypedRef {
    fn from(r: Ref<T>) -> Self {
        UntypedRef {
            id: r.id,
            type_name: std::any::type_name::<T>(),
        }
    }
}

impl<T: 'static> From<&Ref<T>> for UntypedRef {
    fn from(r: &Ref<T>) -> Self {
        UntypedRef {
            id: r.id.clone(),
            type_name: std::any::type_name::<T>(),
        }
    }
}
