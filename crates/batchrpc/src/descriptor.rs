//! Static metadata describing a registered handler.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::dispatch::ExceptionMapping;
use crate::error::RegistryError;
use crate::store::GridSchema;

/// Calling convention that decides how a call's payload maps onto parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallStyle {
    /// Positional arguments taken from the payload array.
    Simple,
    /// Named fields from a submitted form.
    Form,
    /// Store read with paging, sorting, grouping and filters.
    StoreRead,
    /// Store create, update or destroy carrying one or more records.
    StoreModify,
    /// Polling request with named fields.
    Poll,
}

impl CallStyle {
    /// Return shape implied by the style when none is declared.
    #[must_use]
    pub const fn default_shape(self) -> ReturnShape {
        match self {
            Self::StoreRead => ReturnShape::Store,
            Self::StoreModify => ReturnShape::List,
            Self::Simple | Self::Form | Self::Poll => ReturnShape::Single,
        }
    }

    /// Whether parameters are matched by position.
    #[must_use]
    pub const fn is_positional(self) -> bool {
        matches!(self, Self::Simple)
    }
}

/// Declared parameter type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamType {
    /// UTF-8 text.
    String,
    /// Signed 64-bit integer.
    Int,
    /// 64-bit float.
    Float,
    /// Boolean.
    Bool,
    /// Calendar date, `YYYY-MM-DD`.
    Date,
    /// Date and time without offset, `YYYY-MM-DDTHH:MM:SS`.
    DateTime,
    /// Any JSON value, passed through untouched.
    Json,
}

impl ParamType {
    /// Lower-case name used in error messages.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Int => "int",
            Self::Float => "float",
            Self::Bool => "bool",
            Self::Date => "date",
            Self::DateTime => "datetime",
            Self::Json => "json",
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Where a parameter's raw value is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ParamSource {
    /// The call payload.
    #[default]
    Body,
    /// A query-string value of the enclosing transport request.
    Query,
    /// A header of the enclosing transport request.
    Header,
    /// A cookie of the enclosing transport request.
    Cookie,
}

/// Declaration of a single handler parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec {
    name: String,
    param_type: ParamType,
    required: bool,
    default: Option<Value>,
    source: ParamSource,
}

impl ParamSpec {
    /// Declares a required body parameter.
    #[must_use]
    pub fn required(name: impl Into<String>, param_type: ParamType) -> Self {
        Self {
            name: name.into(),
            param_type,
            required: true,
            default: None,
            source: ParamSource::Body,
        }
    }

    /// Declares an optional body parameter.
    #[must_use]
    pub fn optional(name: impl Into<String>, param_type: ParamType) -> Self {
        Self {
            required: false,
            ..Self::required(name, param_type)
        }
    }

    /// Supplies a default used when the value is absent or null.
    #[must_use]
    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }

    /// Reads the value from another source than the call payload.
    #[must_use]
    pub const fn from_source(mut self, source: ParamSource) -> Self {
        self.source = source;
        self
    }

    /// Parameter name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared type.
    #[must_use]
    pub const fn param_type(&self) -> ParamType {
        self.param_type
    }

    /// Whether the parameter must resolve to a value.
    #[must_use]
    pub const fn is_required(&self) -> bool {
        self.required
    }

    /// Default value, if any.
    #[must_use]
    pub const fn default_value(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    /// Value source.
    #[must_use]
    pub const fn source(&self) -> ParamSource {
        self.source
    }
}

/// Kind of value a handler promises to return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReturnShape {
    /// One JSON value.
    Single,
    /// A list of records.
    List,
    /// A store result with records and optional total and metadata.
    Store,
    /// Pre-serialized JSON text.
    Raw,
}

/// Metadata for one `(action, method)` registration.
#[derive(Debug, Clone)]
pub struct HandlerDescriptor {
    action: String,
    method: String,
    style: CallStyle,
    params: Vec<ParamSpec>,
    return_shape: ReturnShape,
    view: Option<String>,
    exceptions: ExceptionMapping,
    grid: Option<Arc<GridSchema>>,
}

impl HandlerDescriptor {
    /// Starts a descriptor for the given action, method and calling style.
    #[must_use]
    pub fn new(action: impl Into<String>, method: impl Into<String>, style: CallStyle) -> Self {
        Self {
            action: action.into(),
            method: method.into(),
            style,
            params: Vec::new(),
            return_shape: style.default_shape(),
            view: None,
            exceptions: ExceptionMapping::default(),
            grid: None,
        }
    }

    /// Appends a parameter declaration.
    #[must_use]
    pub fn param(mut self, spec: ParamSpec) -> Self {
        self.params.push(spec);
        self
    }

    /// Overrides the declared return shape.
    #[must_use]
    pub const fn returns(mut self, shape: ReturnShape) -> Self {
        self.return_shape = shape;
        self
    }

    /// Projects results through a registered view.
    #[must_use]
    pub fn view(mut self, tag: impl Into<String>) -> Self {
        self.view = Some(tag.into());
        self
    }

    /// Installs handler-level exception mappings, consulted before global ones.
    #[must_use]
    pub fn exceptions(mut self, mapping: ExceptionMapping) -> Self {
        self.exceptions = mapping;
        self
    }

    /// Opts store reads into grid metadata built from `schema`.
    #[must_use]
    pub fn grid(mut self, schema: GridSchema) -> Self {
        self.grid = Some(Arc::new(schema));
        self
    }

    /// Action name.
    #[must_use]
    pub fn action(&self) -> &str {
        &self.action
    }

    /// Method name.
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Calling style.
    #[must_use]
    pub const fn style(&self) -> CallStyle {
        self.style
    }

    /// Declared parameters in order.
    #[must_use]
    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    /// Number of parameters read positionally from the payload.
    #[must_use]
    pub fn body_arity(&self) -> usize {
        self.params
            .iter()
            .filter(|spec| spec.source() == ParamSource::Body)
            .count()
    }

    /// Declared return shape.
    #[must_use]
    pub const fn return_shape(&self) -> ReturnShape {
        self.return_shape
    }

    /// Default view tag.
    #[must_use]
    pub fn view_tag(&self) -> Option<&str> {
        self.view.as_deref()
    }

    /// Handler-level exception mappings.
    #[must_use]
    pub const fn exception_mapping(&self) -> &ExceptionMapping {
        &self.exceptions
    }

    /// Grid schema for store metadata.
    #[must_use]
    pub fn grid_schema(&self) -> Option<&Arc<GridSchema>> {
        self.grid.as_ref()
    }

    pub(crate) fn validate(&self) -> Result<(), RegistryError> {
        let reject = |reason: &str| {
            Err(RegistryError::malformed(
                self.action.as_str(),
                self.method.as_str(),
                reason,
            ))
        };
        if self.action.trim().is_empty() {
            return reject("action name is empty");
        }
        if self.method.trim().is_empty() {
            return reject("method name is empty");
        }
        let mut seen = HashSet::new();
        for spec in &self.params {
            if spec.name().trim().is_empty() {
                return reject("parameter name is empty");
            }
            if !seen.insert(spec.name()) {
                return reject(&format!("parameter '{}' is declared twice", spec.name()));
            }
        }
        let shape_fits = match self.style {
            CallStyle::StoreRead => matches!(
                self.return_shape,
                ReturnShape::Store | ReturnShape::List | ReturnShape::Raw
            ),
            CallStyle::Simple | CallStyle::Form | CallStyle::StoreModify | CallStyle::Poll => {
                self.return_shape != ReturnShape::Store
            }
        };
        if !shape_fits {
            return reject("store results are only returned by store-read handlers");
        }
        if self.grid.is_some() && self.style != CallStyle::StoreRead {
            return reject("grid metadata requires a store-read handler");
        }
        Ok(())
    }
}
