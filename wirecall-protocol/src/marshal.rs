//! Payload (de)serialization seam.
//!
//! The envelope codec never interprets payload bytes. It asks a [`Marshal`]
//! implementation to turn a domain value into `(type_name, bytes)` and to
//! rebuild a value from a type name and bytes. The registry is an explicit
//! object handed to the codec at construction.

use crate::error::MarshalError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;

/// Maps domain values to named byte payloads and back.
pub trait Marshal: Send + Sync + 'static {
    /// Domain value carried by requests and responses.
    type Value: Send + 'static;

    /// Serializes a value, returning its type name and encoded bytes.
    fn marshal(&self, value: &Self::Value) -> Result<(String, Vec<u8>), MarshalError>;

    /// Rebuilds a value of the named type from its encoded bytes.
    fn unmarshal(&self, type_name: &str, bytes: &[u8]) -> Result<Self::Value, MarshalError>;
}

/// An owned, type-erased payload value.
pub struct Payload {
    type_name: &'static str,
    value: Box<dyn Any + Send + Sync>,
}

impl Payload {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            type_name: std::any::type_name::<T>(),
            value: Box::new(value),
        }
    }

    /// Rust type name of the wrapped value (diagnostics only).
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn is<T: Any>(&self) -> bool {
        self.value.is::<T>()
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    /// Unwraps the value, handing the payload back if it holds another type.
    pub fn downcast<T: Any>(self) -> Result<T, Self> {
        let type_name = self.type_name;
        match self.value.downcast::<T>() {
            Ok(value) => Ok(*value),
            Err(value) => Err(Self { type_name, value }),
        }
    }

    fn value_type_id(&self) -> TypeId {
        (*self.value).type_id()
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Payload")
            .field("type", &self.type_name)
            .finish_non_exhaustive()
    }
}

type EncodeFn = fn(&Payload) -> Result<Vec<u8>, MarshalError>;
type DecodeFn = fn(&[u8]) -> Result<Payload, MarshalError>;

struct Registration {
    name: String,
    encode: EncodeFn,
}

/// Type-name registry backed by serde_json.
///
/// Register every type that may travel inside an envelope before handing the
/// registry to a codec:
///
/// ```
/// use wirecall_protocol::{JsonRegistry, Marshal, Payload};
///
/// #[derive(serde::Serialize, serde::Deserialize)]
/// struct Ping { n: u32 }
///
/// let mut registry = JsonRegistry::new();
/// registry.register::<Ping>("demo.Ping");
///
/// let (name, bytes) = registry.marshal(&Payload::new(Ping { n: 1 })).unwrap();
/// assert_eq!(name, "demo.Ping");
/// let back = registry.unmarshal(&name, &bytes).unwrap();
/// assert_eq!(back.downcast_ref::<Ping>().unwrap().n, 1);
/// ```
#[derive(Default)]
pub struct JsonRegistry {
    by_type: HashMap<TypeId, Registration>,
    by_name: HashMap<String, DecodeFn>,
}

impl JsonRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `T` under `name`. Re-registering a name replaces the previous entry.
    pub fn register<T>(&mut self, name: impl Into<String>) -> &mut Self
    where
        T: Serialize + DeserializeOwned + Send + Sync + 'static,
    {
        let name = name.into();
        self.by_name.insert(name.clone(), decode_json::<T>);
        self.by_type.insert(
            TypeId::of::<T>(),
            Registration {
                name,
                encode: encode_json::<T>,
            },
        );
        self
    }

    /// Returns the name `T` was registered under.
    pub fn name_of<T: Any>(&self) -> Option<&str> {
        self.by_type
            .get(&TypeId::of::<T>())
            .map(|reg| reg.name.as_str())
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.by_name.contains_key(type_name)
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

impl Marshal for JsonRegistry {
    type Value = Payload;

    fn marshal(&self, value: &Payload) -> Result<(String, Vec<u8>), MarshalError> {
        let reg = self
            .by_type
            .get(&value.value_type_id())
            .ok_or(MarshalError::UnregisteredType)?;
        let bytes = (reg.encode)(value).map_err(|e| match e {
            MarshalError::UnregisteredType => MarshalError::TypeMismatch(reg.name.clone()),
            other => other,
        })?;
        Ok((reg.name.clone(), bytes))
    }

    fn unmarshal(&self, type_name: &str, bytes: &[u8]) -> Result<Payload, MarshalError> {
        let decode = self
            .by_name
            .get(type_name)
            .ok_or_else(|| MarshalError::UnknownTypeName(type_name.to_string()))?;
        decode(bytes)
    }
}

fn encode_json<T: Serialize + 'static>(value: &Payload) -> Result<Vec<u8>, MarshalError> {
    let value = value
        .downcast_ref::<T>()
        .ok_or(MarshalError::UnregisteredType)?;
    Ok(serde_json::to_vec(value)?)
}

fn decode_json<T>(bytes: &[u8]) -> Result<Payload, MarshalError>
where
    T: DeserializeOwned + Send + Sync + 'static,
{
    let value: T = serde_json::from_slice(bytes)?;
    Ok(Payload::new(value))
}
