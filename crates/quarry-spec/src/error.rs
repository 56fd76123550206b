//! Specification error types.
//!
//! Every failure the engine itself can raise is a [`SpecError`]. Builder
//! mistakes surface on the offending call, projection and in-memory guards
//! surface before any query is composed or any item is inspected. Errors
//! raised by a store while materializing a query are not wrapped here.

/// Unified error type for specification construction and evaluation.
#[derive(Debug, thiserror::Error)]
pub enum SpecError {
    // -- Builder errors -----------------------------------------------------
    /// `take` was called a second time on the same builder.
    #[error("take has already been set for this specification")]
    DuplicateTake,

    /// `skip` was called a second time on the same builder.
    #[error("skip has already been set for this specification")]
    DuplicateSkip,

    /// A second primary order clause (`order_by` / `order_by_descending`)
    /// was added. Use `then_by` for secondary keys.
    #[error("a primary order clause has already been set; use then_by for secondary keys")]
    DuplicateOrderBy,

    /// `then_by` / `then_by_descending` was called before any primary order
    /// clause.
    #[error("then_by requires a preceding order_by or order_by_descending")]
    ThenByWithoutOrderBy,

    /// `then_include` was not chained directly off an include call.
    #[error("then_include of `{property}` must directly follow include or then_include")]
    ThenIncludeWithoutInclude { property: String },

    /// `group_by` was called a second time on the same builder.
    #[error("group_by has already been set for this specification")]
    DuplicateGroupBy,

    // -- Evaluation guards --------------------------------------------------
    /// A projected query was requested without a selector and without a
    /// registered mapping for the type pair.
    #[error("projection from {entity} to {result} requires a selector or a registered mapping")]
    MissingSelector {
        entity: &'static str,
        result: &'static str,
    },

    /// Search terms are store-specific and cannot be evaluated in memory.
    #[error("specification carries {terms} search term(s), which cannot be evaluated in memory")]
    SearchNotSupportedInMemory { terms: usize },

    // -- Factory ------------------------------------------------------------
    /// A scoped specification failed to construct.
    #[error("failed to construct specification {specification}: {source}")]
    Construction {
        specification: &'static str,
        #[source]
        source: Box<SpecError>,
    },

    /// Catch-all for invariant violations inside the engine.
    #[error("internal specification error: {0}")]
    Internal(String),
}

impl SpecError {
    /// `true` for the duplicate-pagination family (`take` or `skip` set twice).
    pub fn is_duplicate_pagination(&self) -> bool {
        matches!(self, Self::DuplicateTake | Self::DuplicateSkip)
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SpecError>;
