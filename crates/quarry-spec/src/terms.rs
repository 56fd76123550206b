//! Specification terms.
//!
//! Each term is an opaque description of one query concern. Terms built from
//! names and [`Condition`]s can be translated by a store; terms built from
//! native closures can only be compiled into direct predicates and key
//! extractors, and a translating store reports them as untranslatable.

use std::any::type_name;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::condition::Condition;
use crate::value::{Entity, Literal};

/// Native filter closure.
pub type NativePredicate<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

/// Native key extractor.
pub type NativeKey<T> = Arc<dyn Fn(&T) -> Literal + Send + Sync>;

/// Maps an entity into a result shape.
pub type Projector<T, R> = Arc<dyn Fn(&T) -> R + Send + Sync>;

/// Transform applied to a materialized result sequence.
pub type PostProcess<X> = Arc<dyn Fn(Vec<X>) -> Vec<X> + Send + Sync>;

// ---------------------------------------------------------------------------
// Predicate
// ---------------------------------------------------------------------------

/// A filter term.
pub enum Predicate<T> {
    /// Structured, translatable condition.
    Condition(Condition),
    /// Opaque closure; in-memory only.
    Native(NativePredicate<T>),
}

impl<T: Entity> Predicate<T> {
    /// Wraps a closure.
    pub fn native(f: impl Fn(&T) -> bool + Send + Sync + 'static) -> Self {
        Predicate::Native(Arc::new(f))
    }

    /// Compiled evaluation against one entity.
    pub fn matches(&self, item: &T) -> bool {
        match self {
            Predicate::Condition(condition) => condition.matches(item),
            Predicate::Native(f) => f(item),
        }
    }

    /// The structured condition, if this predicate has one.
    pub fn as_condition(&self) -> Option<&Condition> {
        match self {
            Predicate::Condition(condition) => Some(condition),
            Predicate::Native(_) => None,
        }
    }
}

impl<T> From<Condition> for Predicate<T> {
    fn from(condition: Condition) -> Self {
        Predicate::Condition(condition)
    }
}

impl<T> Clone for Predicate<T> {
    fn clone(&self) -> Self {
        match self {
            Predicate::Condition(c) => Predicate::Condition(c.clone()),
            Predicate::Native(f) => Predicate::Native(Arc::clone(f)),
        }
    }
}

impl<T> fmt::Debug for Predicate<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Condition(c) => f.debug_tuple("Condition").field(c).finish(),
            Predicate::Native(_) => f.write_str("Native(<closure>)"),
        }
    }
}

// ---------------------------------------------------------------------------
// Selector
// ---------------------------------------------------------------------------

/// A key selector used by ordering, grouping and search terms.
pub enum Selector<T> {
    /// A named entity field.
    Field(String),
    /// Opaque key extractor; in-memory only.
    Native(NativeKey<T>),
}

impl<T: Entity> Selector<T> {
    /// Selects a named field.
    pub fn field(name: impl Into<String>) -> Self {
        Selector::Field(name.into())
    }

    /// Wraps a key closure.
    pub fn native(f: impl Fn(&T) -> Literal + Send + Sync + 'static) -> Self {
        Selector::Native(Arc::new(f))
    }

    /// Extracts the key of `item`.
    pub fn extract(&self, item: &T) -> Literal {
        match self {
            Selector::Field(name) => item.field(name).to_literal(),
            Selector::Native(f) => f(item),
        }
    }
}

impl<T> Selector<T> {
    /// The field name, for field selectors.
    pub fn field_name(&self) -> Option<&str> {
        match self {
            Selector::Field(name) => Some(name),
            Selector::Native(_) => None,
        }
    }
}

impl<T> From<&str> for Selector<T> {
    fn from(name: &str) -> Self {
        Selector::Field(name.to_string())
    }
}

impl<T> From<String> for Selector<T> {
    fn from(name: String) -> Self {
        Selector::Field(name)
    }
}

impl<T> Clone for Selector<T> {
    fn clone(&self) -> Self {
        match self {
            Selector::Field(name) => Selector::Field(name.clone()),
            Selector::Native(f) => Selector::Native(Arc::clone(f)),
        }
    }
}

impl<T> fmt::Debug for Selector<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::Field(name) => f.debug_tuple("Field").field(name).finish(),
            Selector::Native(_) => f.write_str("Native(<closure>)"),
        }
    }
}

// ---------------------------------------------------------------------------
// Ordering
// ---------------------------------------------------------------------------

/// Direction and rank of an order term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrderKind {
    OrderBy,
    OrderByDescending,
    ThenBy,
    ThenByDescending,
}

impl OrderKind {
    /// `true` for the primary sort kinds.
    pub fn is_primary(self) -> bool {
        matches!(self, OrderKind::OrderBy | OrderKind::OrderByDescending)
    }

    pub fn is_descending(self) -> bool {
        matches!(self, OrderKind::OrderByDescending | OrderKind::ThenByDescending)
    }
}

/// One ordering key.
pub struct OrderTerm<T> {
    pub selector: Selector<T>,
    pub kind: OrderKind,
}

impl<T> Clone for OrderTerm<T> {
    fn clone(&self) -> Self {
        Self {
            selector: self.selector.clone(),
            kind: self.kind,
        }
    }
}

impl<T> fmt::Debug for OrderTerm<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrderTerm")
            .field("selector", &self.selector)
            .field("kind", &self.kind)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Includes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IncludeKind {
    Include,
    ThenInclude,
}

/// One navigation step of an eager-load graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncludeTerm {
    pub kind: IncludeKind,
    /// Navigation property name.
    pub property: String,
    /// Type that declares the property.
    pub declaring_type: &'static str,
    /// Type of the property (element type for collections).
    pub property_type: &'static str,
    /// Property type of the previous step, for chained terms.
    pub previous_property_type: Option<&'static str>,
    /// Whether the property is collection-valued.
    pub collection: bool,
}

impl IncludeTerm {
    pub(crate) fn root<T: 'static, P: ?Sized + 'static>(property: String, collection: bool) -> Self {
        Self {
            kind: IncludeKind::Include,
            property,
            declaring_type: type_name::<T>(),
            property_type: type_name::<P>(),
            previous_property_type: None,
            collection,
        }
    }

    pub(crate) fn chained<P: ?Sized + 'static>(
        previous: &'static str,
        property: String,
        collection: bool,
    ) -> Self {
        Self {
            kind: IncludeKind::ThenInclude,
            property,
            declaring_type: previous,
            property_type: type_name::<P>(),
            previous_property_type: Some(previous),
            collection,
        }
    }
}

/// A dotted navigation path reconstructed from include terms.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IncludePath {
    segments: Vec<String>,
}

impl IncludePath {
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            segments: segments.into_iter().map(Into::into).collect(),
        }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// First navigation step.
    pub fn root(&self) -> &str {
        self.segments.first().map_or("", String::as_str)
    }

    pub fn is_nested(&self) -> bool {
        self.segments.len() > 1
    }
}

impl fmt::Display for IncludePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("."))
    }
}

/// Rebuilds the navigation paths described by an ordered list of include
/// terms. Every `Include` opens a path; every `ThenInclude` extends the path
/// opened last, so `a → b → c` yields the single path `a.b.c`.
pub fn include_paths(terms: &[IncludeTerm]) -> Vec<IncludePath> {
    let mut paths: Vec<IncludePath> = Vec::new();
    for term in terms {
        match (term.kind, paths.last_mut()) {
            (IncludeKind::ThenInclude, Some(current)) => {
                current.segments.push(term.property.clone());
            }
            _ => paths.push(IncludePath::new([term.property.clone()])),
        }
    }
    paths
}

// ---------------------------------------------------------------------------
// Search
// ---------------------------------------------------------------------------

/// A `LIKE`-style search term. Terms sharing a group are ORed; groups are
/// ANDed.
pub struct SearchTerm<T> {
    pub selector: Selector<T>,
    /// Pattern using `%` and `_` wildcards.
    pub pattern: String,
    pub group: u32,
}

impl<T> Clone for SearchTerm<T> {
    fn clone(&self) -> Self {
        Self {
            selector: self.selector.clone(),
            pattern: self.pattern.clone(),
            group: self.group,
        }
    }
}

impl<T> fmt::Debug for SearchTerm<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SearchTerm")
            .field("selector", &self.selector)
            .field("pattern", &self.pattern)
            .field("group", &self.group)
            .finish()
    }
}

/// Groups search terms by group number, in ascending group order.
pub fn search_groups<T>(terms: &[SearchTerm<T>]) -> BTreeMap<u32, Vec<&SearchTerm<T>>> {
    let mut groups: BTreeMap<u32, Vec<&SearchTerm<T>>> = BTreeMap::new();
    for term in terms {
        groups.entry(term.group).or_default().push(term);
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Guild;
    struct Config;
    struct Role;

    #[test]
    fn include_paths_follow_chains() {
        let terms = vec![
            IncludeTerm::root::<Guild, Config>("moderation_config".into(), false),
            IncludeTerm::chained::<Role>(type_name::<Config>(), "muted_role".into(), false),
            IncludeTerm::root::<Guild, Role>("roles".into(), true),
        ];
        let paths = include_paths(&terms);
        assert_eq!(paths.len(), 2);
        assert_eq!(paths[0].to_string(), "moderation_config.muted_role");
        assert!(paths[0].is_nested());
        assert_eq!(paths[1].root(), "roles");
        assert_eq!(terms[1].previous_property_type, Some(type_name::<Config>()));
        assert_eq!(terms[1].declaring_type, type_name::<Config>());
    }

    #[test]
    fn search_groups_are_ordered() {
        let term = |group| SearchTerm::<()> {
            selector: Selector::Field("name".into()),
            pattern: "%x%".into(),
            group,
        };
        let terms = vec![term(2), term(1), term(2)];
        let groups = search_groups(&terms);
        let keys: Vec<u32> = groups.keys().copied().collect();
        assert_eq!(keys, vec![1, 2]);
        assert_eq!(groups[&2].len(), 2);
    }
}
