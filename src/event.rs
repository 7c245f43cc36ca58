//! Reads `(name-or-id, value)` event records and dispatches to registered
//! handlers (§4.5).
//!
//! A [`WireParser`] is the dual of [`crate::method::MethodWriter`]: where
//! the writer turns a typed call into an event, the parser turns an event
//! back into a call on whatever closure is registered for its key.

use std::collections::HashMap;

use crate::dictionary::Key;
use crate::error::{Error, Result};
use crate::value::Value;
use crate::wire::Wire;

/// A registered event handler: receives the event's argument value.
pub type Handler = Box<dyn FnMut(&Value) -> Result<()> + Send>;

/// The handler invoked for an event whose name has no registration.
pub type DefaultHandler = Box<dyn FnMut(&str, &Value) -> Result<()> + Send>;

fn ignore_unknown_event(name: &str, _value: &Value) -> Result<()> {
    log::debug!("eventwire: no handler registered for event {:?}, ignoring", name);
    Ok(())
}

/// Routes incoming events to handlers registered by name.
///
/// Binary-dialect events keyed by numeric id are resolved through
/// `id_to_name` before the name lookup runs; an id with no registered
/// name is skipped via [`Wire::skip_value`] rather than reaching the
/// default handler, matching §4.5's "field-id fallback... skips unknown
/// binary fields safely" — a reader with no idea what an id means can't
/// usefully report it by name either.
pub struct WireParser {
    handlers: HashMap<String, Handler>,
    id_to_name: HashMap<i64, String>,
    default_handler: DefaultHandler,
}

impl WireParser {
    pub fn new() -> WireParser {
        WireParser {
            handlers: HashMap::new(),
            id_to_name: HashMap::new(),
            default_handler: Box::new(ignore_unknown_event),
        }
    }

    /// Registers (or replaces) the handler for `name`.
    pub fn register(&mut self, name: impl Into<String>, handler: Handler) {
        self.handlers.insert(name.into(), handler);
    }

    /// Registers the handler for `name` only if nothing is registered
    /// there yet; a duplicate registration is logged and ignored rather
    /// than silently overwriting the first one.
    pub fn register_once(&mut self, name: impl Into<String>, handler: Handler) {
        let name = name.into();
        if self.handlers.contains_key(&name) {
            log::warn!("eventwire: ignoring duplicate registration for event {:?}", name);
            return;
        }
        self.handlers.insert(name, handler);
    }

    /// Declares that binary-dialect event id `id` names the same event as
    /// `name`, so `Key::Id(id)` resolves to `name`'s handler.
    pub fn bind_event_id(&mut self, id: i64, name: impl Into<String>) {
        self.id_to_name.insert(id, name.into());
    }

    /// Replaces the handler invoked for an event whose name has no
    /// registration. The default default handler logs and ignores.
    pub fn set_default_handler(&mut self, handler: DefaultHandler) {
        self.default_handler = handler;
    }

    /// Reads and dispatches one event. Returns `false` at the end of the
    /// open document, `true` if an event was consumed.
    pub fn parse_one(&mut self, wire: &mut dyn Wire) -> Result<bool> {
        let key = match wire.read_event_key()? {
            Some(key) => key,
            None => return Ok(false),
        };
        match key {
            Key::Name(name) => {
                if let Some(handler) = self.handlers.get_mut(&name) {
                    let value = wire.read_value()?;
                    handler(&value)?;
                } else {
                    let value = wire.read_value()?;
                    (self.default_handler)(&name, &value)?;
                }
            }
            Key::Id(id) => match self.id_to_name.get(&id).cloned() {
                Some(name) => match self.handlers.get_mut(&name) {
                    Some(handler) => {
                        let value = wire.read_value()?;
                        handler(&value)?;
                    }
                    None => wire.skip_value()?,
                },
                None => wire.skip_value()?,
            },
        }
        Ok(true)
    }

    /// Loops `parse_one` until the document reading cursor reports end of
    /// event stream, propagating the first error and reporting a protocol
    /// violation instead of looping forever if a call somehow claims
    /// progress without the document actually ending.
    pub fn accept(&mut self, wire: &mut dyn Wire) -> Result<()> {
        loop {
            if wire.at_document_end() {
                return Ok(());
            }
            if !self.parse_one(wire)? {
                return Err(Error::protocol_violation(
                    "parser failed to progress before reaching the document end",
                ));
            }
        }
    }
}

impl Default for WireParser {
    fn default() -> Self {
        WireParser::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytes::Bytes;
    use crate::value::Integer;
    use crate::wire::{BinaryWire, JsonWire};
    use std::sync::{Arc, Mutex};

    #[test]
    fn dispatches_registered_handler_by_name() {
        let mut wire = JsonWire::new();
        wire.acquire_writing_document(false, false).unwrap();
        wire.write_event_name("bark").unwrap();
        wire.write_value(&Value::Text("woof".into())).unwrap();
        wire.commit_document().unwrap();

        let mut bytes = wire.into_bytes();
        bytes.set_read_position(0);
        let mut wire = JsonWire::from_bytes(bytes);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen2 = seen.clone();
        let mut parser = WireParser::new();
        parser.register(
            "bark",
            Box::new(move |v: &Value| {
                seen2.lock().unwrap().push(v.as_text().unwrap().to_owned());
                Ok(())
            }),
        );

        assert!(wire.has_next_document().unwrap());
        wire.begin_reading_document().unwrap();
        parser.accept(&mut wire).unwrap();
        assert_eq!(*seen.lock().unwrap(), vec!["woof".to_owned()]);
    }

    #[test]
    fn unregistered_event_reaches_default_handler() {
        let mut wire = JsonWire::new();
        wire.acquire_writing_document(false, false).unwrap();
        wire.write_event_name("mystery").unwrap();
        wire.write_value(&Value::Int(Integer::new(1))).unwrap();
        wire.commit_document().unwrap();

        let mut bytes = wire.into_bytes();
        bytes.set_read_position(0);
        let mut wire = JsonWire::from_bytes(bytes);

        let seen = Arc::new(Mutex::new(None));
        let seen2 = seen.clone();
        let mut parser = WireParser::new();
        parser.set_default_handler(Box::new(move |name, _v| {
            *seen2.lock().unwrap() = Some(name.to_owned());
            Ok(())
        }));

        wire.begin_reading_document().unwrap();
        parser.accept(&mut wire).unwrap();
        assert_eq!(*seen.lock().unwrap(), Some("mystery".to_owned()));
    }

    #[test]
    fn unbound_event_id_is_skipped_not_defaulted() {
        let mut wire = BinaryWire::new();
        wire.acquire_writing_document(false, false).unwrap();
        wire.write_event_id(99).unwrap();
        wire.write_value(&Value::Text("skip me".into())).unwrap();
        wire.write_event_name("after").unwrap();
        wire.write_value(&Value::Bool(true)).unwrap();
        wire.commit_document().unwrap();

        let mut bytes = wire.into_bytes();
        bytes.set_read_position(0);
        let mut wire = BinaryWire::from_bytes(bytes);

        let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let seen2 = seen.clone();
        let mut parser = WireParser::new();
        parser.set_default_handler(Box::new(move |name, _v| {
            seen2.lock().unwrap().push(name.to_owned());
            Ok(())
        }));

        wire.begin_reading_document().unwrap();
        parser.accept(&mut wire).unwrap();
        assert_eq!(
            *seen.lock().unwrap(),
            vec!["after".to_owned()],
            "an unbound id must be skipped, not reach the default handler"
        );
    }

    #[test]
    fn duplicate_register_once_is_ignored() {
        let mut parser = WireParser::new();
        let calls = Arc::new(Mutex::new(0));
        let c1 = calls.clone();
        parser.register_once(
            "m",
            Box::new(move |_v| {
                *c1.lock().unwrap() += 1;
                Ok(())
            }),
        );
        let c2 = calls.clone();
        parser.register_once(
            "m",
            Box::new(move |_v| {
                *c2.lock().unwrap() += 100;
                Ok(())
            }),
        );
        assert_eq!(parser.handlers.len(), 1);
    }
}
