//! Field policies: per (type, field) read and merge functions.
//!
//! A read policy computes the value a field exposes, given whatever is
//! stored, the current operation variables, and a sibling-field accessor. A
//! merge policy combines an incoming write with the existing stored value.
//! Both must be pure with respect to their declared inputs.

use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

use crate::bucket::{FLAG_BUCKETS, stable_bucket};
use crate::geo::{DistanceModel, GeoPoint};

/// Failure raised by a read or merge function.
///
/// Policy failures never cross the engine boundary: a failing read yields an
/// unavailable result and a failing merge leaves the stored value untouched.
#[derive(Debug, Clone, Error)]
#[error("field policy failed: {message}")]
pub struct PolicyError {
    /// Failure details.
    pub message: String,
}

impl PolicyError {
    /// Create a policy error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Inputs available to a read policy.
pub struct ReadContext<'a> {
    variables: &'a Value,
    read_field: &'a dyn Fn(&str) -> Option<Value>,
}

impl<'a> ReadContext<'a> {
    pub(crate) fn new(
        variables: &'a Value,
        read_field: &'a dyn Fn(&str) -> Option<Value>,
    ) -> Self {
        Self {
            variables,
            read_field,
        }
    }

    /// The current operation's variables.
    #[must_use]
    pub const fn variables(&self) -> &'a Value {
        self.variables
    }

    /// Resolve a sibling field on the same entity.
    ///
    /// `None` marks an absent field; callers handle it defensively rather
    /// than failing the read.
    #[must_use]
    pub fn read_field(&self, name: &str) -> Option<Value> {
        (self.read_field)(name)
    }

    /// Fetch a named variable, if present.
    #[must_use]
    pub fn variable(&self, name: &str) -> Option<&'a Value> {
        self.variables.get(name)
    }
}

/// Inputs available to a merge policy.
pub struct MergeContext<'a> {
    variables: &'a Value,
}

impl<'a> MergeContext<'a> {
    pub(crate) const fn new(variables: &'a Value) -> Self {
        Self { variables }
    }

    /// The current operation's variables.
    #[must_use]
    pub const fn variables(&self) -> &'a Value {
        self.variables
    }

    /// The `offset` variable, defaulting to 0.
    #[must_use]
    pub fn offset(&self) -> usize {
        self.variables
            .get("offset")
            .and_then(Value::as_u64)
            .and_then(|offset| usize::try_from(offset).ok())
            .unwrap_or(0)
    }
}

/// Read function signature.
pub type ReadFn =
    Arc<dyn Fn(Option<&Value>, &ReadContext<'_>) -> Result<Value, PolicyError> + Send + Sync>;

/// Merge function signature.
pub type MergeFn = Arc<
    dyn Fn(Option<&Value>, &Value, &MergeContext<'_>) -> Result<Value, PolicyError> + Send + Sync,
>;

/// A field policy: a read function, a merge function, or both.
///
/// Policies are resolved by explicit `(type, field)` lookup; a field with no
/// merge policy stores incoming values as-is, and a field with no read
/// policy exposes the stored value directly.
#[derive(Clone)]
pub enum FieldPolicy {
    /// Read-only policy.
    Read(ReadFn),
    /// Merge-only policy.
    Merge(MergeFn),
    /// Both read and merge.
    Both {
        /// Read function.
        read: ReadFn,
        /// Merge function.
        merge: MergeFn,
    },
}

impl std::fmt::Debug for FieldPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            Self::Read(_) => "Read",
            Self::Merge(_) => "Merge",
            Self::Both { .. } => "Both",
        };
        f.debug_tuple("FieldPolicy").field(&kind).finish()
    }
}

impl FieldPolicy {
    /// Install a read function.
    #[must_use]
    pub fn read(
        read: impl Fn(Option<&Value>, &ReadContext<'_>) -> Result<Value, PolicyError>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        Self::Read(Arc::new(read))
    }

    /// Install a merge function.
    #[must_use]
    pub fn merge(
        merge: impl Fn(Option<&Value>, &Value, &MergeContext<'_>) -> Result<Value, PolicyError>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        Self::Merge(Arc::new(merge))
    }

    pub(crate) fn read_fn(&self) -> Option<&ReadFn> {
        match self {
            Self::Read(read) | Self::Both { read, .. } => Some(read),
            Self::Merge(_) => None,
        }
    }

    pub(crate) fn merge_fn(&self) -> Option<&MergeFn> {
        match self {
            Self::Merge(merge) | Self::Both { merge, .. } => Some(merge),
            Self::Read(_) => None,
        }
    }

    /// Fold a later registration into this one.
    ///
    /// Disjoint kinds combine into `Both`; overlapping kinds are replaced by
    /// the newer registration.
    #[must_use]
    pub(crate) fn fold(self, incoming: Self) -> Self {
        match (self, incoming) {
            (Self::Read(read), Self::Merge(merge)) | (Self::Merge(merge), Self::Read(read)) => {
                Self::Both { read, merge }
            }
            (Self::Both { read, .. }, Self::Merge(merge))
            | (Self::Merge(_), Self::Both { read, merge }) => Self::Both { read, merge },
            (Self::Both { merge, .. }, Self::Read(read))
            | (Self::Read(_), Self::Both { read, merge }) => Self::Both { read, merge },
            (_, incoming) => incoming,
        }
    }

    /// Always expose the latest fetch.
    ///
    /// Behaviourally identical to the default, but registered explicitly on
    /// list fields that must NOT accumulate across fetches. The choice is a
    /// per-field decision, not a universal rule for list-typed fields.
    #[must_use]
    pub fn replace() -> Self {
        Self::merge(|_existing, incoming, _ctx| Ok(incoming.clone()))
    }

    /// Offset/limit pagination merge.
    ///
    /// The incoming page is spliced into the existing list at the operation's
    /// `offset` variable (missing offset reads as 0). Gaps are padded with
    /// null; overlapping positions are overwritten; the result stays ordered
    /// by offset.
    #[must_use]
    pub fn offset_limit() -> Self {
        Self::merge(|existing, incoming, ctx| {
            let page = incoming
                .as_array()
                .ok_or_else(|| PolicyError::new("offset_limit expects a list"))?;
            let offset = ctx.offset();
            let mut merged = existing
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            if merged.len() < offset {
                merged.resize(offset, Value::Null);
            }
            for (index, item) in page.iter().cloned().enumerate() {
                let slot = offset + index;
                if slot < merged.len() {
                    merged[slot] = item;
                } else {
                    merged.push(item);
                }
            }
            Ok(Value::Array(merged))
        })
    }

    /// Derived boolean: the identifier's bucket is above `threshold`.
    ///
    /// Reads the sibling `key_field`, buckets it over [`FLAG_BUCKETS`], and
    /// exposes `bucket > threshold`. An absent identifier reads as null.
    #[must_use]
    pub fn stable_flag_above(key_field: &str, threshold: u32) -> Self {
        let key_field = key_field.to_owned();
        Self::read(move |_stored, ctx| {
            Ok(ctx
                .read_field(&key_field)
                .as_ref()
                .and_then(Value::as_str)
                .map_or(Value::Null, |id| {
                    Value::Bool(stable_bucket(id, FLAG_BUCKETS) > threshold)
                }))
        })
    }

    /// Derived boolean: the identifier's bucket is below `threshold`.
    #[must_use]
    pub fn stable_flag_below(key_field: &str, threshold: u32) -> Self {
        let key_field = key_field.to_owned();
        Self::read(move |_stored, ctx| {
            Ok(ctx
                .read_field(&key_field)
                .as_ref()
                .and_then(Value::as_str)
                .map_or(Value::Null, |id| {
                    Value::Bool(stable_bucket(id, FLAG_BUCKETS) < threshold)
                }))
        })
    }

    /// Derived distance between the operation's coordinates and a stored
    /// location field.
    ///
    /// Reads `latitude`/`longitude` variables and the sibling
    /// `location_field`'s `coordinates` pair. Any absent input reads as
    /// null, the unavailable sentinel.
    #[must_use]
    pub fn geo_distance(location_field: &str, model: DistanceModel) -> Self {
        let location_field = location_field.to_owned();
        Self::read(move |_stored, ctx| {
            let origin = match (
                ctx.variable("latitude").and_then(Value::as_f64),
                ctx.variable("longitude").and_then(Value::as_f64),
            ) {
                (Some(lat), Some(lon)) => Some(GeoPoint::new(lat, lon)),
                _ => None,
            };
            let location = ctx
                .read_field(&location_field)
                .as_ref()
                .and_then(GeoPoint::from_location);
            Ok(model
                .between(location, origin)
                .map_or(Value::Null, |km| serde_json::json!(km)))
        })
    }
}
