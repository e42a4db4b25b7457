//! Entity kinds served by the backend.
//!
//! Each kind is a typed view over the server payload: a handful of fields the
//! console reads directly, plus a flattened `extra` map holding everything
//! else verbatim. Filter fields are resolved against the serialized record,
//! so any server field is searchable whether typed or not.

pub mod admin;
pub mod images;
pub mod network;
pub mod node;

pub use admin::{DhcpSnippet, PackageRepository, ResourcePool, Script, SshKey, Tag, User};
pub use images::BootResource;
pub use network::{Discovery, Domain, Fabric, Space, Subnet, Vlan, Zone};
pub use node::{Controller, Device, Machine, Pod};

use fleetdeck_core::Entity;
use fleetdeck_filter::FieldValue;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;

/// An entity the filter language can search.
pub trait Searchable: Entity {
    /// Field that free-text terms are matched against.
    const DEFAULT_FIELD: &'static str;

    /// Dotted JSON path a filter field reads, e.g. `zone` reads `zone.name`.
    fn field_path(field: &str) -> &str {
        field
    }
}

/// Read an explicit `null` as the field's default.
pub fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Reference to a related record, as embedded in node payloads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelRef {
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
}

/// Define an entity struct and its `Entity`/`Searchable` impls.
///
/// Typed fields default when missing or `null`. Only usable inside this
/// crate, since the generated serde attributes name
/// `crate::models::null_as_default`.
///
/// ```ignore
/// impl_entity! {
///     /// A zone.
///     pub struct Zone {
///         key id: u64,
///         name: String,
///     }
///     model = "zone",
///     search = "name",
///     aliases { "pool" => "pool.name" },
/// }
/// ```
#[macro_export]
macro_rules! impl_entity {
    (
        $(#[$meta:meta])*
        pub struct $name:ident {
            key $pk:ident: $key_ty:ty,
            $( $(#[$fmeta:meta])* $field:ident: $fty:ty, )*
        }
        model = $model:literal,
        search = $default:literal
        $(, aliases { $( $alias:literal => $path:literal ),* $(,)? } )?
        $(,)?
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
        pub struct $name {
            pub $pk: $key_ty,
            $(
                $(#[$fmeta])*
                #[serde(default, deserialize_with = "crate::models::null_as_default")]
                pub $field: $fty,
            )*
            /// Server fields not modelled above.
            #[serde(flatten)]
            pub extra: serde_json::Map<String, serde_json::Value>,
        }

        impl fleetdeck_core::Entity for $name {
            type Key = $key_ty;
            const MODEL: &'static str = $model;
            const PK_FIELD: &'static str = stringify!($pk);

            fn key(&self) -> $key_ty {
                <$key_ty as Clone>::clone(&self.$pk)
            }
        }

        impl $crate::models::Searchable for $name {
            const DEFAULT_FIELD: &'static str = $default;

            $(
                fn field_path(field: &str) -> &str {
                    match field {
                        $( $alias => $path, )*
                        other => other,
                    }
                }
            )?
        }
    };
}

// ============================================================================
// JSON FIELD LOOKUP
// ============================================================================

/// Follow a dotted path through nested objects.
pub fn lookup<'a>(value: &'a JsonValue, path: &str) -> Option<&'a JsonValue> {
    path.split('.')
        .try_fold(value, |current, segment| match current {
            JsonValue::Object(map) => map.get(segment),
            _ => None,
        })
}

/// Filter view of a JSON value.
///
/// Scalars become one string, arrays their scalar members (related records
/// contribute their `name`), and `null` an empty set so that negated clauses
/// still match it.
pub fn field_value(value: &JsonValue) -> Option<FieldValue> {
    match value {
        JsonValue::Array(items) => Some(FieldValue::Many(
            items.iter().filter_map(scalar_text).collect(),
        )),
        JsonValue::Null => Some(FieldValue::Many(Vec::new())),
        other => scalar_text(other).map(FieldValue::One),
    }
}

fn scalar_text(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(text) => Some(text.clone()),
        JsonValue::Number(number) => Some(number.to_string()),
        JsonValue::Bool(flag) => Some(flag.to_string()),
        JsonValue::Object(map) => map.get("name").and_then(scalar_text),
        JsonValue::Null | JsonValue::Array(_) => None,
    }
}
