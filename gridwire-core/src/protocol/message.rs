//! Network messages and their factories.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;

use tracing::debug;

use super::constants::NULL_MESSAGE_TYPE;
use super::reader::MessageReader;
use super::writer::MessageWriter;
use crate::error::{GridwireError, Result};

/// An ordered-field record that can be written and read incrementally.
///
/// Both methods are re-entered after returning `Ok(false)`; fields already
/// completed are skipped by the writer and reader, so implementations simply
/// visit every field in declaration order on every call. Usually derived
/// with `#[derive(Message)]`.
pub trait Message: Any + Send + fmt::Debug {
    /// Type byte identifying the message on the wire.
    fn direct_type(&self) -> u8;

    /// Number of fields visited by [`write_to`](Message::write_to).
    fn field_count(&self) -> u8;

    /// Writes the type byte and the fields, returning `Ok(true)` once
    /// everything is out.
    fn write_to(&self, writer: &mut MessageWriter<'_, '_>) -> Result<bool>;

    /// Reads the fields that follow the type byte, returning `Ok(true)` once
    /// everything is in.
    fn read_from(&mut self, reader: &mut MessageReader<'_, '_>) -> Result<bool>;
}

/// Creates empty messages of one type for decoding.
pub trait MessageFactory: Send + Sync {
    /// Creates a message ready to be read into.
    fn create(&self) -> Box<dyn Message>;
}

impl<F> MessageFactory for F
where
    F: Fn() -> Box<dyn Message> + Send + Sync,
{
    fn create(&self) -> Box<dyn Message> {
        self()
    }
}

/// Registry of message factories keyed by type byte.
#[derive(Default)]
pub struct MessageFactoryRegistry {
    factories: HashMap<u8, Box<dyn MessageFactory>>,
}

impl MessageFactoryRegistry {
    /// Creates a new empty registry.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registers a factory for `direct_type`.
    ///
    /// If a factory with the same type was previously registered, it is
    /// replaced.
    ///
    /// # Errors
    ///
    /// `Configuration` if `direct_type` is the null-message marker.
    pub fn register(&mut self, direct_type: u8, factory: Box<dyn MessageFactory>) -> Result<()> {
        if direct_type == NULL_MESSAGE_TYPE {
            return Err(GridwireError::Configuration(format!(
                "message type 0x{direct_type:02X} is reserved for null messages"
            )));
        }
        debug!(direct_type, "registered message factory");
        self.factories.insert(direct_type, factory);
        Ok(())
    }

    /// Registers `M` under the type byte of its default value.
    pub fn register_message<M: Message + Default>(&mut self) -> Result<()> {
        let direct_type = M::default().direct_type();
        self.register(direct_type, Box::new(|| Box::new(M::default()) as Box<dyn Message>))
    }

    /// Removes the factory for `direct_type`.
    ///
    /// Returns the removed factory if it was present.
    pub fn unregister(&mut self, direct_type: u8) -> Option<Box<dyn MessageFactory>> {
        self.factories.remove(&direct_type)
    }

    /// Returns the factory for `direct_type`, if registered.
    pub fn get(&self, direct_type: u8) -> Option<&dyn MessageFactory> {
        self.factories.get(&direct_type).map(|f| f.as_ref())
    }

    /// Creates an empty message of type `direct_type`.
    pub fn create(&self, direct_type: u8) -> Option<Box<dyn Message>> {
        Some(self.factories.get(&direct_type)?.create())
    }

    /// Returns `true` if a factory is registered for `direct_type`.
    pub fn contains(&self, direct_type: u8) -> bool {
        self.factories.contains_key(&direct_type)
    }

    /// Returns the number of registered factories.
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    /// Returns `true` if no factories are registered.
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl fmt::Debug for MessageFactoryRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<_> = self.factories.keys().copied().collect();
        types.sort_unstable();
        f.debug_struct("MessageFactoryRegistry")
            .field("types", &types)
            .finish()
    }
}

/// Downcasts a decoded message to its concrete type.
///
/// Returns `None` if the message is of another type.
pub fn downcast_message<M: Message>(message: Box<dyn Message>) -> Option<Box<M>> {
    let any: Box<dyn Any> = message;
    any.downcast::<M>().ok()
}
