//! Typed payload decoding hooks: a table from a Rust type to a decoding
//! function for it, so callers can ask for `client.decode::<MyType>(&msg)`
//! instead of hand-rolling JSON (or whatever format) parsing at each call
//! site. Decoding itself is explicitly out of scope for the wire layer —
//! this is just the registration table the design notes call for.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{Error, Result};

type DecodeFn = Arc<dyn Fn(&[u8]) -> Result<Box<dyn Any + Send + Sync>> + Send + Sync>;

/// Per-client table of registered decoders, keyed by the target type.
/// There is no default decoder for any type; looking one up that was
/// never registered is a usage error (`Error::NoDecoder`), not a panic.
#[derive(Clone, Default)]
pub struct DecoderRegistry {
    decoders: HashMap<TypeId, DecodeFn>,
}

impl DecoderRegistry {
    pub fn new() -> Self {
        DecoderRegistry::default()
    }

    /// Register a decoder for `T`. Replaces any previously registered
    /// decoder for the same type.
    pub fn register<T, F, E>(&mut self, decode: F)
    where
        T: Send + Sync + 'static,
        F: Fn(&[u8]) -> std::result::Result<T, E> + Send + Sync + 'static,
        E: std::fmt::Display,
    {
        let decode = Arc::new(move |bytes: &[u8]| -> Result<Box<dyn Any + Send + Sync>> {
            decode(bytes)
                .map(|v| Box::new(v) as Box<dyn Any + Send + Sync>)
                .map_err(|e| Error::Decode(e.to_string()))
        });
        self.decoders.insert(TypeId::of::<T>(), decode);
    }

    /// Decode `payload` as `T` using the registered decoder, or
    /// `Error::NoDecoder` if none was registered for that type.
    pub fn decode<T: Send + Sync + 'static>(&self, payload: &[u8]) -> Result<T> {
        let decode = self
            .decoders
            .get(&TypeId::of::<T>())
            .ok_or(Error::NoDecoder)?;
        let boxed = decode(payload)?;
        boxed
            .downcast::<T>()
            .map(|b| *b)
            .map_err(|_| Error::NoDecoder)
    }

    pub fn has_decoder<T: 'static>(&self) -> bool {
        self.decoders.contains_key(&TypeId::of::<T>())
    }
}
