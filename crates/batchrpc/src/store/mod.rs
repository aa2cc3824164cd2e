//! Sorting, grouping and pagination of store reads.
//!
//! [`StoreProcessor::process`] takes the full record set a handler produced,
//! orders it by the request's group keys followed by its sort keys, slices
//! the requested window, and records the pre-window total. When the handler
//! declares a [`GridSchema`] the result also carries [`StoreMetadata`].

mod metadata;
mod ordering;
mod request;

use std::cmp::Ordering;
use std::ops::Range;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

pub use self::metadata::{FieldSpec, FieldType, GridSchema, SortInfo, StoreMetadata};
pub use self::ordering::{FieldOrderings, JsonFieldOrdering, RecordOrdering, compare_json};
pub use self::request::{
    FilterSpec, ReadRequest, ReadRequestError, SortDirection, SortSpec,
};

pub(crate) const STORE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::store");

/// Which view a store result is projected through.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ViewSelection {
    /// Use the handler's declared view, if any.
    #[default]
    Inherit,
    /// Send records unprojected even if the handler declares a view.
    Disabled,
    /// Use the named view instead of the declared one.
    Named(String),
}

/// Records returned by a store read, with paging and reader metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoreResult<T = Value> {
    records: Vec<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    total: Option<u64>,
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(rename = "metaData", skip_serializing_if = "Option::is_none")]
    metadata: Option<StoreMetadata>,
    #[serde(skip)]
    view: ViewSelection,
}

impl<T> StoreResult<T> {
    /// Successful result without a total.
    #[must_use]
    pub const fn new(records: Vec<T>) -> Self {
        Self {
            records,
            total: None,
            success: true,
            message: None,
            metadata: None,
            view: ViewSelection::Inherit,
        }
    }

    /// Failed result carrying a client-visible message and no records.
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            ..Self::new(Vec::new())
        }
    }

    /// Sets the total count.
    #[must_use]
    pub const fn with_total(mut self, total: u64) -> Self {
        self.total = Some(total);
        self
    }

    /// Sets the message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Attaches grid metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: StoreMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Selects the view used to project the records.
    #[must_use]
    pub fn with_view(mut self, view: ViewSelection) -> Self {
        self.view = view;
        self
    }

    /// Records in the window.
    #[must_use]
    pub fn records(&self) -> &[T] {
        &self.records
    }

    /// Consumes the result, returning its records.
    #[must_use]
    pub fn into_records(self) -> Vec<T> {
        self.records
    }

    /// Total count before windowing.
    #[must_use]
    pub const fn total(&self) -> Option<u64> {
        self.total
    }

    /// Success flag.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.success
    }

    /// Message, if any.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Grid metadata, if any.
    #[must_use]
    pub const fn metadata(&self) -> Option<&StoreMetadata> {
        self.metadata.as_ref()
    }

    /// View selection.
    #[must_use]
    pub const fn view(&self) -> &ViewSelection {
        &self.view
    }

    pub(crate) fn records_mut(&mut self) -> &mut Vec<T> {
        &mut self.records
    }
}

impl<T: Serialize> StoreResult<T> {
    /// Converts typed records into JSON values.
    ///
    /// # Errors
    ///
    /// Returns the first serialization error encountered.
    pub fn into_json(self) -> Result<StoreResult<Value>, serde_json::Error> {
        let records = self
            .records
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(StoreResult {
            records,
            total: self.total,
            success: self.success,
            message: self.message,
            metadata: self.metadata,
            view: self.view,
        })
    }
}

/// Applies ordering, windowing and metadata to a full record set.
#[derive(Debug, Clone, Default)]
pub struct StoreProcessor {
    schema: Option<Arc<GridSchema>>,
}

impl StoreProcessor {
    /// Processor without grid metadata.
    #[must_use]
    pub const fn new() -> Self {
        Self { schema: None }
    }

    /// Processor that attaches metadata built from `schema`.
    #[must_use]
    pub const fn with_schema(schema: Arc<GridSchema>) -> Self {
        Self {
            schema: Some(schema),
        }
    }

    /// Orders, windows and counts `records` according to `request`.
    ///
    /// Group keys take precedence over sort keys; a property named by both is
    /// ordered once, by its first occurrence. Keys the `ordering` does not
    /// recognise are ignored. The sort is stable, so records equal under every
    /// key keep their input order.
    pub fn process<T, O>(&self, records: Vec<T>, request: &ReadRequest, ordering: &O) -> StoreResult<T>
    where
        O: RecordOrdering<T> + ?Sized,
    {
        let mut ordered = records;
        let total = ordered.len();
        let keys = ordering_keys(request);
        if !keys.is_empty() {
            ordered.sort_by(|left, right| compare_by_keys(&keys, ordering, left, right));
        }

        let window = window_bounds(total, request);
        let page = match window.clone() {
            Some(range) => ordered
                .into_iter()
                .skip(range.start)
                .take(range.len())
                .collect(),
            None => ordered,
        };

        debug!(
            target: STORE_TARGET,
            total,
            window = ?window,
            keys = keys.len(),
            "processed store read"
        );

        let result = StoreResult::new(page).with_total(u64::try_from(total).unwrap_or(u64::MAX));
        match &self.schema {
            Some(schema) => result.with_metadata(StoreMetadata::build(schema, request)),
            None => result,
        }
    }
}

fn ordering_keys(request: &ReadRequest) -> Vec<&SortSpec> {
    let mut keys: Vec<&SortSpec> = Vec::new();
    for key in request.groups().iter().chain(request.sorters()) {
        if keys.iter().all(|seen| seen.property() != key.property()) {
            keys.push(key);
        }
    }
    keys
}

fn compare_by_keys<T, O>(keys: &[&SortSpec], ordering: &O, left: &T, right: &T) -> Ordering
where
    O: RecordOrdering<T> + ?Sized,
{
    keys.iter()
        .filter_map(|key| {
            ordering
                .compare(key.property(), left, right)
                .map(|found| key.direction().apply(found))
        })
        .find(|found| found.is_ne())
        .unwrap_or(Ordering::Equal)
}

/// Window of record positions selected by the request, or `None` when the
/// request does not page.
///
/// Paging needs a `limit` and either a `start` or a `page`; `start` wins when
/// both are given. The window is clipped to the record count.
pub(crate) fn window_bounds(total: usize, request: &ReadRequest) -> Option<Range<usize>> {
    let limit = request.limit()?;
    let start = request.effective_start()?;
    let begin = start.min(total);
    let end = start.saturating_add(limit).min(total);
    Some(begin..end)
}
