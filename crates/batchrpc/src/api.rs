//! Client-facing API descriptor and its HTTP-style cache validators.
//!
//! The descriptor lists every remotable action and method so a client can
//! build stubs. It is rendered once; the rendering's SHA-256 digest is the
//! entity tag, and a matching `If-None-Match` yields [`ApiReply::NotModified`].

use std::collections::BTreeMap;

use batchrpc_config::Config;
use once_cell::sync::OnceCell;
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;
use time::macros::format_description;
use time::{Duration, OffsetDateTime, UtcOffset};

use crate::descriptor::{CallStyle, HandlerDescriptor};
use crate::registry::Registry;

const SECONDS_PER_MONTH: i64 = 30 * 24 * 60 * 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
struct ApiMethod {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    len: Option<usize>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    form_handler: bool,
}

impl ApiMethod {
    fn describe(descriptor: &HandlerDescriptor) -> Option<Self> {
        let (len, form_handler) = match descriptor.style() {
            CallStyle::Simple => (Some(descriptor.body_arity()), false),
            CallStyle::Form => (None, true),
            CallStyle::StoreRead | CallStyle::StoreModify => (Some(1), false),
            CallStyle::Poll => return None,
        };
        Some(Self {
            name: descriptor.method().to_owned(),
            len,
            form_handler,
        })
    }
}

/// Remoting descriptor advertised to clients.
///
/// Poll handlers are reached through their own polling endpoint and are not
/// listed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApiDescriptor {
    url: String,
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<String>,
    actions: BTreeMap<String, Vec<ApiMethod>>,
}

impl ApiDescriptor {
    /// Describes every remotable handler in `registry`.
    #[must_use]
    pub fn from_registry(registry: &Registry, url: impl Into<String>, namespace: Option<&str>) -> Self {
        let actions = registry
            .actions()
            .filter_map(|(action, descriptors)| {
                let methods: Vec<ApiMethod> = descriptors.filter_map(ApiMethod::describe).collect();
                (!methods.is_empty()).then(|| (action.to_owned(), methods))
            })
            .collect();
        Self {
            url: url.into(),
            kind: "remoting",
            namespace: namespace.map(str::to_owned),
            actions,
        }
    }

    /// Describes `registry` with the router URL and namespace from `config`.
    #[must_use]
    pub fn from_config(registry: &Registry, config: &Config) -> Self {
        Self::from_registry(registry, config.api_router_url(), config.api_namespace())
    }

    /// Router URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Names of the listed actions.
    pub fn action_names(&self) -> impl Iterator<Item = &str> {
        self.actions.keys().map(String::as_str)
    }
}

/// Errors raised while serving the descriptor.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The descriptor could not be serialized.
    #[error("failed to serialize API descriptor: {0}")]
    Serialize(#[from] serde_json::Error),
    /// The expiry timestamp could not be formatted.
    #[error("failed to format expiry timestamp: {0}")]
    Format(#[from] time::error::Format),
    /// The expiry timestamp is outside the supported calendar range.
    #[error("cache lifetime of {max_age} seconds overflows the calendar")]
    ExpiryOutOfRange {
        /// Configured lifetime in seconds.
        max_age: i64,
    },
}

/// Cache headers attached to a fresh descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheHeaders {
    etag: String,
    cache_control: String,
    expires: String,
}

impl CacheHeaders {
    /// Quoted entity tag.
    #[must_use]
    pub fn etag(&self) -> &str {
        &self.etag
    }

    /// `Cache-Control` value.
    #[must_use]
    pub fn cache_control(&self) -> &str {
        &self.cache_control
    }

    /// `Expires` value in RFC 1123 form.
    #[must_use]
    pub fn expires(&self) -> &str {
        &self.expires
    }
}

/// Outcome of a descriptor request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiReply<'a> {
    /// The client's copy is current.
    NotModified {
        /// Current entity tag.
        etag: &'a str,
    },
    /// The descriptor body with cache headers.
    Fresh {
        /// Serialized descriptor.
        body: &'a [u8],
        /// Cache headers.
        headers: CacheHeaders,
    },
}

#[derive(Debug)]
struct Rendered {
    body: Vec<u8>,
    etag: String,
}

/// Lazily rendered descriptor with validators.
#[derive(Debug)]
pub struct ApiCache {
    descriptor: ApiDescriptor,
    max_age: i64,
    rendered: OnceCell<Rendered>,
}

impl ApiCache {
    /// Caches `descriptor` for `months` thirty-day months.
    #[must_use]
    pub fn new(descriptor: ApiDescriptor, months: u32) -> Self {
        Self {
            descriptor,
            max_age: i64::from(months).saturating_mul(SECONDS_PER_MONTH),
            rendered: OnceCell::new(),
        }
    }

    /// Cached descriptor.
    #[must_use]
    pub const fn descriptor(&self) -> &ApiDescriptor {
        &self.descriptor
    }

    /// Cache lifetime in seconds.
    #[must_use]
    pub const fn max_age(&self) -> i64 {
        self.max_age
    }

    fn rendered(&self) -> Result<&Rendered, ApiError> {
        self.rendered.get_or_try_init(|| {
            let body = serde_json::to_vec(&self.descriptor)?;
            let digest = Sha256::digest(&body);
            let hex: String = digest.iter().map(|byte| format!("{byte:02x}")).collect();
            Ok(Rendered {
                etag: format!("\"0{hex}\""),
                body,
            })
        })
    }

    /// Quoted entity tag of the rendered descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Serialize`] when the descriptor cannot be rendered.
    pub fn etag(&self) -> Result<&str, ApiError> {
        self.rendered().map(|rendered| rendered.etag.as_str())
    }

    /// Answers a descriptor request.
    ///
    /// `if_none_match` is the raw header value; it may list several tags or
    /// be `*`. `now` anchors the `Expires` header.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] when rendering or timestamp formatting fails.
    pub fn serve(
        &self,
        if_none_match: Option<&str>,
        now: OffsetDateTime,
    ) -> Result<ApiReply<'_>, ApiError> {
        let rendered = self.rendered()?;
        if if_none_match.is_some_and(|header| matches_etag(header, &rendered.etag)) {
            return Ok(ApiReply::NotModified {
                etag: &rendered.etag,
            });
        }
        let expiry = now
            .to_offset(UtcOffset::UTC)
            .checked_add(Duration::seconds(self.max_age))
            .ok_or(ApiError::ExpiryOutOfRange {
                max_age: self.max_age,
            })?;
        let expires = expiry.format(format_description!(
            "[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] GMT"
        ))?;
        Ok(ApiReply::Fresh {
            body: &rendered.body,
            headers: CacheHeaders {
                etag: rendered.etag.clone(),
                cache_control: format!("public, max-age={}", self.max_age),
                expires,
            },
        })
    }
}

fn matches_etag(header: &str, etag: &str) -> bool {
    header.split(',').map(str::trim).any(|candidate| {
        candidate == "*" || candidate.strip_prefix("W/").unwrap_or(candidate) == etag
    })
}

#[cfg(test)]
mod tests {
    use insta::assert_snapshot;
    use rstest::{fixture, rstest};
    use time::macros::datetime;

    use super::*;
    use crate::call::{HandlerCall, HandlerOutput};
    use crate::descriptor::{ParamSource, ParamSpec, ParamType};
    use crate::error::HandlerFailure;
    use crate::registry::RegistryBuilder;

    fn noop(_call: &HandlerCall<'_>) -> Result<HandlerOutput, HandlerFailure> {
        Ok(HandlerOutput::Single(serde_json::Value::Null))
    }

    #[fixture]
    fn registry() -> Registry {
        let mut builder = RegistryBuilder::new();
        builder
            .register_fn(HandlerDescriptor::new("person", "load", CallStyle::StoreRead), noop)
            .expect("person.load");
        builder
            .register_fn(
                HandlerDescriptor::new("person", "find", CallStyle::Simple)
                    .param(ParamSpec::required("id", ParamType::Int))
                    .param(
                        ParamSpec::optional("agent", ParamType::String)
                            .from_source(ParamSource::Header),
                    ),
                noop,
            )
            .expect("person.find");
        builder
            .register_fn(HandlerDescriptor::new("profile", "save", CallStyle::Form), noop)
            .expect("profile.save");
        builder
            .register_fn(HandlerDescriptor::new("feed", "poll", CallStyle::Poll), noop)
            .expect("feed.poll");
        builder.build().expect("registry")
    }

    #[fixture]
    fn cache(registry: Registry) -> ApiCache {
        ApiCache::new(
            ApiDescriptor::from_registry(&registry, "/router", Some("App.direct")),
            6,
        )
    }

    #[rstest]
    fn descriptor_lists_remotable_methods(registry: Registry) {
        let descriptor = ApiDescriptor::from_registry(&registry, "/router", Some("App.direct"));
        let rendered = serde_json::to_string(&descriptor).expect("serialize");
        assert_snapshot!(
            rendered,
            @r#"{"url":"/router","type":"remoting","namespace":"App.direct","actions":{"person":[{"name":"find","len":1},{"name":"load","len":1}],"profile":[{"name":"save","formHandler":true}]}}"#
        );
    }

    #[rstest]
    fn etag_is_quoted_digest(cache: ApiCache) {
        let etag = cache.etag().expect("etag").to_owned();
        assert!(etag.starts_with("\"0"));
        assert!(etag.ends_with('"'));
        assert_eq!(etag.len(), 67);
        assert_eq!(cache.etag().expect("etag"), etag);
    }

    #[rstest]
    fn fresh_reply_carries_cache_headers(cache: ApiCache) {
        let reply = cache
            .serve(None, datetime!(2024-01-01 00:00:00 UTC))
            .expect("reply");
        let ApiReply::Fresh { body, headers } = reply else {
            panic!("expected a fresh reply");
        };
        assert!(!body.is_empty());
        assert_eq!(headers.cache_control(), "public, max-age=15552000");
        assert_eq!(headers.expires(), "Sat, 29 Jun 2024 00:00:00 GMT");
    }

    #[rstest]
    #[case(true)]
    #[case(false)]
    fn matching_etag_is_not_modified(cache: ApiCache, #[case] weak: bool) {
        let etag = cache.etag().expect("etag").to_owned();
        let header = if weak {
            format!("\"stale\", W/{etag}")
        } else {
            etag.clone()
        };
        let reply = cache
            .serve(Some(&header), OffsetDateTime::UNIX_EPOCH)
            .expect("reply");
        assert_eq!(reply, ApiReply::NotModified { etag: &etag });
    }

    #[rstest]
    fn stale_etag_gets_fresh_body(cache: ApiCache) {
        let reply = cache
            .serve(Some("\"0deadbeef\""), OffsetDateTime::UNIX_EPOCH)
            .expect("reply");
        assert!(matches!(reply, ApiReply::Fresh { .. }));
    }
}
