//! Grid metadata attached to store results on request.

use serde::Serialize;

use super::request::{ReadRequest, SortDirection};

/// Client-side field type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// Let the client infer the type.
    #[default]
    Auto,
    /// Integer column.
    Int,
    /// Floating-point column.
    Float,
    /// Text column.
    String,
    /// Boolean column.
    Boolean,
    /// Date column.
    Date,
}

/// Column declaration for a grid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldSpec {
    name: String,
    #[serde(rename = "type")]
    field_type: FieldType,
    header: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    width: Option<u32>,
    sortable: bool,
    resizable: bool,
    hideable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    date_format: Option<String>,
}

impl FieldSpec {
    /// Declares a visible, sortable, resizable column headed by its name.
    #[must_use]
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        let field_name: String = name.into();
        Self {
            header: field_name.clone(),
            name: field_name,
            field_type,
            width: None,
            sortable: true,
            resizable: true,
            hideable: true,
            date_format: None,
        }
    }

    /// Sets the column header.
    #[must_use]
    pub fn header(mut self, header: impl Into<String>) -> Self {
        self.header = header.into();
        self
    }

    /// Sets the column width in pixels.
    #[must_use]
    pub const fn width(mut self, width: u32) -> Self {
        self.width = Some(width);
        self
    }

    /// Marks the column as not sortable.
    #[must_use]
    pub const fn unsortable(mut self) -> Self {
        self.sortable = false;
        self
    }

    /// Marks the column as fixed width.
    #[must_use]
    pub const fn fixed(mut self) -> Self {
        self.resizable = false;
        self
    }

    /// Marks the column as always visible.
    #[must_use]
    pub const fn always_visible(mut self) -> Self {
        self.hideable = false;
        self
    }

    /// Sets the client date format.
    #[must_use]
    pub fn date_format(mut self, format: impl Into<String>) -> Self {
        self.date_format = Some(format.into());
        self
    }

    /// Field name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Column layout for a store-read handler.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GridSchema {
    fields: Vec<FieldSpec>,
}

impl GridSchema {
    /// Creates an empty schema.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a column.
    #[must_use]
    pub fn field(mut self, field: FieldSpec) -> Self {
        self.fields.push(field);
        self
    }

    /// Columns in display order.
    #[must_use]
    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }
}

/// Primary sort key echoed to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SortInfo {
    field: String,
    direction: SortDirection,
}

impl SortInfo {
    /// Sorted field.
    #[must_use]
    pub fn field(&self) -> &str {
        &self.field
    }

    /// Direction.
    #[must_use]
    pub const fn direction(&self) -> SortDirection {
        self.direction
    }
}

/// Reader configuration and column layout sent with a store result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreMetadata {
    root: &'static str,
    total_property: &'static str,
    success_property: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    start: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    limit: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sort_info: Option<SortInfo>,
    fields: Vec<FieldSpec>,
}

impl StoreMetadata {
    pub(crate) fn build(schema: &GridSchema, request: &ReadRequest) -> Self {
        let sort_info = request.sorters().first().map(|key| SortInfo {
            field: key.property().to_owned(),
            direction: key.direction(),
        });
        Self {
            root: "records",
            total_property: "total",
            success_property: "success",
            start: request.effective_start(),
            limit: request.limit(),
            sort_info,
            fields: schema.fields().to_vec(),
        }
    }

    /// Columns.
    #[must_use]
    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Primary sort key.
    #[must_use]
    pub const fn sort_info(&self) -> Option<&SortInfo> {
        self.sort_info.as_ref()
    }

    /// Echoed offset.
    #[must_use]
    pub const fn start(&self) -> Option<usize> {
        self.start
    }

    /// Echoed page size.
    #[must_use]
    pub const fn limit(&self) -> Option<usize> {
        self.limit
    }
}
