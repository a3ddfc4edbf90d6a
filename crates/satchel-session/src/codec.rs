//! Blob codec for session value maps.
//!
//! A session's values are serialized into one opaque blob before being handed
//! to the backing store. Primitive [`Value`] variants need no setup; every
//! application type carried in [`Value::Custom`] must be registered in a
//! [`TypeRegistry`] under a stable tag before it is encoded or decoded.
//!
//! The registry is populated once at startup and then frozen inside a
//! [`Codec`]. A process-wide codec can be installed with [`install`] and is
//! picked up by providers that are not handed one explicitly.

use std::any::{Any, TypeId};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, OnceLock};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::value::{CustomValue, Value};

/// Errors raised while encoding or decoding session blobs.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("Malformed session blob: {0}")]
    Json(#[from] serde_json::Error),

    /// A custom value's type (or a blob's tag) has no registration.
    #[error("Unregistered session value type: {0}")]
    UnregisteredType(String),

    /// A tag or type was registered twice.
    #[error("Session value type registered twice: {0}")]
    DuplicateType(String),

    #[error("Registered encoder for '{tag}' received a value of another type")]
    TypeMismatch { tag: String },

    #[error("A global codec is already installed")]
    AlreadyInstalled,
}

type EncodeFn = fn(&dyn Any, &str) -> Result<serde_json::Value, CodecError>;
type DecodeFn = fn(serde_json::Value) -> Result<CustomValue, CodecError>;

struct Registration {
    encode: EncodeFn,
    decode: DecodeFn,
}

/// Mapping from type tags to encode/decode functions.
#[derive(Default)]
pub struct TypeRegistry {
    by_tag: HashMap<String, Registration>,
    by_type: HashMap<TypeId, String>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `T` under `tag`.
    ///
    /// Fails if either the tag or the type is already registered.
    pub fn register<T>(&mut self, tag: impl Into<String>) -> Result<&mut Self, CodecError>
    where
        T: Serialize + DeserializeOwned + PartialEq + fmt::Debug + Send + Sync + 'static,
    {
        let tag = tag.into();
        if self.by_tag.contains_key(&tag) {
            return Err(CodecError::DuplicateType(tag));
        }
        let type_id = TypeId::of::<T>();
        if self.by_type.contains_key(&type_id) {
            return Err(CodecError::DuplicateType(
                std::any::type_name::<T>().to_string(),
            ));
        }

        self.by_type.insert(type_id, tag.clone());
        self.by_tag.insert(
            tag,
            Registration {
                encode: encode_custom::<T>,
                decode: decode_custom::<T>,
            },
        );
        Ok(self)
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.by_tag.contains_key(tag)
    }

    pub fn len(&self) -> usize {
        self.by_tag.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_tag.is_empty()
    }
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tags: Vec<_> = self.by_tag.keys().collect();
        tags.sort();
        f.debug_struct("TypeRegistry").field("tags", &tags).finish()
    }
}

fn encode_custom<T>(value: &dyn Any, tag: &str) -> Result<serde_json::Value, CodecError>
where
    T: Serialize + 'static,
{
    let value = value
        .downcast_ref::<T>()
        .ok_or_else(|| CodecError::TypeMismatch {
            tag: tag.to_string(),
        })?;
    Ok(serde_json::to_value(value)?)
}

fn decode_custom<T>(data: serde_json::Value) -> Result<CustomValue, CodecError>
where
    T: DeserializeOwned + PartialEq + fmt::Debug + Send + Sync + 'static,
{
    let value: T = serde_json::from_value(data)?;
    Ok(CustomValue::new(value))
}

/// On-disk shape of a single value.
#[derive(Serialize, Deserialize)]
#[serde(tag = "t", content = "v", rename_all = "snake_case")]
enum Wire {
    Bool(bool),
    Int(i64),
    Isize(isize),
    Float(
        #[serde(
            serialize_with = "float_repr::serialize_f64",
            deserialize_with = "float_repr::deserialize_f64"
        )]
        f64,
    ),
    Float32(
        #[serde(
            serialize_with = "float_repr::serialize_f32",
            deserialize_with = "float_repr::deserialize_f32"
        )]
        f32,
    ),
    String(String),
    Bytes(Vec<u8>),
    Time(DateTime<Utc>),
    List(Vec<Wire>),
    Map(BTreeMap<String, Wire>),
    Custom { tag: String, data: serde_json::Value },
}

/// JSON has no NaN or infinity. Finite floats are written as numbers, the
/// rest as the strings `"NaN"`, `"inf"` and `"-inf"`.
mod float_repr {
    use std::fmt;

    use serde::de::{self, Unexpected, Visitor};
    use serde::{Deserializer, Serializer};

    fn special(f: f64) -> Option<&'static str> {
        if f.is_nan() {
            Some("NaN")
        } else if f == f64::INFINITY {
            Some("inf")
        } else if f == f64::NEG_INFINITY {
            Some("-inf")
        } else {
            None
        }
    }

    pub fn serialize_f64<S: Serializer>(f: &f64, s: S) -> Result<S::Ok, S::Error> {
        match special(*f) {
            Some(text) => s.serialize_str(text),
            None => s.serialize_f64(*f),
        }
    }

    pub fn serialize_f32<S: Serializer>(f: &f32, s: S) -> Result<S::Ok, S::Error> {
        match special(f64::from(*f)) {
            Some(text) => s.serialize_str(text),
            None => s.serialize_f32(*f),
        }
    }

    struct FloatVisitor;

    impl Visitor<'_> for FloatVisitor {
        type Value = f64;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a number, \"NaN\", \"inf\" or \"-inf\"")
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> Result<f64, E> {
            Ok(v)
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<f64, E> {
            Ok(v as f64)
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<f64, E> {
            Ok(v as f64)
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<f64, E> {
            match v {
                "NaN" => Ok(f64::NAN),
                "inf" => Ok(f64::INFINITY),
                "-inf" => Ok(f64::NEG_INFINITY),
                other => Err(E::invalid_value(Unexpected::Str(other), &self)),
            }
        }
    }

    pub fn deserialize_f64<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
        d.deserialize_any(FloatVisitor)
    }

    pub fn deserialize_f32<'de, D: Deserializer<'de>>(d: D) -> Result<f32, D::Error> {
        deserialize_f64(d).map(|f| f as f32)
    }
}

/// Encoder/decoder for session value maps, backed by a frozen registry.
#[derive(Clone, Debug)]
pub struct Codec {
    registry: Arc<TypeRegistry>,
}

impl Codec {
    pub fn new(registry: TypeRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
        }
    }

    /// A codec that only understands the built-in value variants.
    pub fn primitives() -> Self {
        Self::new(TypeRegistry::new())
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    /// Serialize a session's values into a blob.
    pub fn encode(&self, values: &HashMap<String, Value>) -> Result<Vec<u8>, CodecError> {
        let wire = values
            .iter()
            .map(|(k, v)| Ok((k.clone(), self.encode_value(v)?)))
            .collect::<Result<BTreeMap<_, _>, CodecError>>()?;
        Ok(serde_json::to_vec(&wire)?)
    }

    /// Deserialize a blob produced by [`Codec::encode`]. An empty blob is an
    /// empty map.
    pub fn decode(&self, blob: &[u8]) -> Result<HashMap<String, Value>, CodecError> {
        if blob.is_empty() {
            return Ok(HashMap::new());
        }
        let wire: BTreeMap<String, Wire> = serde_json::from_slice(blob)?;
        wire.into_iter()
            .map(|(k, w)| Ok((k, self.decode_value(w)?)))
            .collect()
    }

    fn encode_value(&self, value: &Value) -> Result<Wire, CodecError> {
        Ok(match value {
            Value::Bool(b) => Wire::Bool(*b),
            Value::Int(i) => Wire::Int(*i),
            Value::Isize(i) => Wire::Isize(*i),
            Value::Float(f) => Wire::Float(*f),
            Value::Float32(f) => Wire::Float32(*f),
            Value::String(s) => Wire::String(s.clone()),
            Value::Bytes(b) => Wire::Bytes(b.clone()),
            Value::Time(t) => Wire::Time(*t),
            Value::List(items) => Wire::List(
                items
                    .iter()
                    .map(|v| self.encode_value(v))
                    .collect::<Result<_, _>>()?,
            ),
            Value::Map(map) => Wire::Map(
                map.iter()
                    .map(|(k, v)| Ok((k.clone(), self.encode_value(v)?)))
                    .collect::<Result<_, CodecError>>()?,
            ),
            Value::Custom(custom) => {
                let tag = self
                    .registry
                    .by_type
                    .get(&custom.value_type_id())
                    .ok_or_else(|| CodecError::UnregisteredType(custom.type_name().to_string()))?;
                let registration = &self.registry.by_tag[tag];
                let data = (registration.encode)(custom.as_any(), tag)?;
                Wire::Custom {
                    tag: tag.clone(),
                    data,
                }
            }
        })
    }

    fn decode_value(&self, wire: Wire) -> Result<Value, CodecError> {
        Ok(match wire {
            Wire::Bool(b) => Value::Bool(b),
            Wire::Int(i) => Value::Int(i),
            Wire::Isize(i) => Value::Isize(i),
            Wire::Float(f) => Value::Float(f),
            Wire::Float32(f) => Value::Float32(f),
            Wire::String(s) => Value::String(s),
            Wire::Bytes(b) => Value::Bytes(b),
            Wire::Time(t) => Value::Time(t),
            Wire::List(items) => Value::List(
                items
                    .into_iter()
                    .map(|w| self.decode_value(w))
                    .collect::<Result<_, _>>()?,
            ),
            Wire::Map(map) => Value::Map(
                map.into_iter()
                    .map(|(k, w)| Ok((k, self.decode_value(w)?)))
                    .collect::<Result<_, CodecError>>()?,
            ),
            Wire::Custom { tag, data } => {
                let registration = self
                    .registry
                    .by_tag
                    .get(&tag)
                    .ok_or(CodecError::UnregisteredType(tag))?;
                Value::Custom((registration.decode)(data)?)
            }
        })
    }
}

static GLOBAL: OnceLock<Codec> = OnceLock::new();

/// Install the process-wide codec. Only the first call succeeds.
pub fn install(registry: TypeRegistry) -> Result<(), CodecError> {
    GLOBAL
        .set(Codec::new(registry))
        .map_err(|_| CodecError::AlreadyInstalled)
}

/// The installed process-wide codec, or a primitives-only codec if none was
/// installed.
pub fn global() -> Codec {
    GLOBAL.get().cloned().unwrap_or_else(Codec::primitives)
}
