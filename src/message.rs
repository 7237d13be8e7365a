//! # Messages
//!
//! A [`Message`] is either a **wire** message (type name plus encoded bytes,
//! produced and consumed by an external codec) or a **native** Rust value
//! moved between services without serialization.
//!
//! Messages are move-only. A handler takes ownership with
//! [`Message::into_typed`], which reports a [`RuntimeError::TypeMismatch`]
//! instead of panicking when the payload is something else.

use crate::error::{Result, RuntimeError};
use crate::service::ServiceHandle;
use crate::session::SessionId;
use serde::{Deserialize, Serialize};
use std::any::{type_name, Any, TypeId};
use std::fmt;

/// Encoded payload tagged with the name of the type it decodes into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireMessage {
    pub type_name: String,
    pub payload: Vec<u8>,
}

impl WireMessage {
    pub fn new(type_name: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            type_name: type_name.into(),
            payload: payload.into(),
        }
    }
}

pub struct NativeMessage {
    type_name: &'static str,
    value: Box<dyn Any + Send>,
}

pub enum Message {
    Wire(WireMessage),
    Native(NativeMessage),
}

impl Message {
    /// Wraps any value. Passing a `Message` or a `WireMessage` yields it as is
    /// rather than boxing it a second time.
    ///
    /// ```
    /// use actor_kernel::Message;
    ///
    /// let msg = Message::new(7_u32);
    /// let again = Message::new(msg);
    /// assert_eq!(again.into_typed::<u32>().unwrap(), 7);
    /// ```
    pub fn new<T: Any + Send>(value: T) -> Self {
        let value = match cast::<Message, T>(value) {
            Ok(msg) => return msg,
            Err(value) => value,
        };
        match cast::<WireMessage, T>(value) {
            Ok(wire) => Message::Wire(wire),
            Err(value) => Message::Native(NativeMessage {
                type_name: type_name::<T>(),
                value: Box::new(value),
            }),
        }
    }

    pub fn wire(type_name: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Message::Wire(WireMessage::new(type_name, payload))
    }

    pub fn type_name(&self) -> &str {
        match self {
            Message::Wire(wire) => &wire.type_name,
            Message::Native(native) => native.type_name,
        }
    }

    pub fn is_wire(&self) -> bool {
        matches!(self, Message::Wire(_))
    }

    pub fn is<T: Any>(&self) -> bool {
        self.payload_type_id() == TypeId::of::<T>()
    }

    /// `TypeId` of the carried value. Every wire message reports [`WireMessage`].
    pub fn payload_type_id(&self) -> TypeId {
        match self {
            Message::Native(native) => {
                let value: &(dyn Any + Send) = &*native.value;
                value.type_id()
            }
            Message::Wire(_) => TypeId::of::<WireMessage>(),
        }
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        match self {
            Message::Native(native) => native.value.downcast_ref::<T>(),
            Message::Wire(wire) => (wire as &dyn Any).downcast_ref::<T>(),
        }
    }

    /// Takes the payload out as `T`, handing the message back on mismatch.
    pub fn downcast<T: Any>(self) -> Result<T, Message> {
        let msg = match cast::<T, Message>(self) {
            Ok(whole) => return Ok(whole),
            Err(msg) => msg,
        };
        match msg {
            Message::Native(NativeMessage { type_name, value }) => value
                .downcast::<T>()
                .map(|boxed| *boxed)
                .map_err(|value| Message::Native(NativeMessage { type_name, value })),
            Message::Wire(wire) => cast::<T, WireMessage>(wire).map_err(Message::Wire),
        }
    }

    pub fn into_typed<T: Any>(self) -> Result<T> {
        self.downcast::<T>().map_err(|msg| RuntimeError::TypeMismatch {
            expected: type_name::<T>(),
            found: msg.type_name().to_string(),
        })
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Message::Wire(wire) => f
                .debug_struct("Wire")
                .field("type_name", &wire.type_name)
                .field("len", &wire.payload.len())
                .finish(),
            Message::Native(native) => f.debug_tuple("Native").field(&native.type_name).finish(),
        }
    }
}

/// Moves `value` out as `T` when `U` and `T` are the same type.
fn cast<T: Any, U: Any>(value: U) -> Result<T, U> {
    let mut slot = Some(value);
    if let Some(same) = (&mut slot as &mut dyn Any).downcast_mut::<Option<T>>() {
        if let Some(value) = same.take() {
            return Ok(value);
        }
    }
    match slot {
        Some(value) => Err(value),
        None => unreachable!("slot is only emptied when the types match"),
    }
}

/// Last path segment of a type name, e.g. `Deposit` for `bank::msg::Deposit`.
pub(crate) fn short_type_name(full: &str) -> &str {
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

/// Lifecycle and timeout signals. They travel through the mailbox like any
/// other traffic, but user code cannot forge them.
#[derive(Debug)]
pub(crate) enum Control {
    Start(Option<Message>),
    Stop(Option<Message>),
    Exit,
    SessionTimeout(SessionId),
}

#[derive(Debug)]
pub(crate) enum Payload {
    User(Message),
    Control(Control),
}

#[derive(Debug)]
pub(crate) struct MailEntry {
    pub(crate) sender: Option<ServiceHandle>,
    pub(crate) session: SessionId,
    pub(crate) payload: Payload,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Deposit(u64);

    #[test]
    fn native_roundtrip_and_mismatch() {
        let msg = Message::new(Deposit(5));
        assert!(msg.is::<Deposit>());
        assert!(!msg.is_wire());
        assert_eq!(short_type_name(msg.type_name()), "Deposit");
        assert_eq!(msg.downcast_ref::<Deposit>(), Some(&Deposit(5)));

        let msg = match msg.downcast::<String>() {
            Ok(_) => panic!("downcast to the wrong type succeeded"),
            Err(msg) => msg,
        };
        assert_eq!(msg.into_typed::<Deposit>().unwrap(), Deposit(5));
    }

    #[test]
    fn mismatch_reports_both_types() {
        let err = Message::new(1_u8).into_typed::<Deposit>().unwrap_err();
        match err {
            RuntimeError::TypeMismatch { expected, found } => {
                assert!(expected.ends_with("Deposit"));
                assert_eq!(found, "u8");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn wire_messages_stay_wire() {
        let msg = Message::new(WireMessage::new("bank.Deposit", vec![1, 2, 3]));
        assert!(msg.is_wire());
        assert!(msg.is::<WireMessage>());
        assert_eq!(msg.type_name(), "bank.Deposit");
        let wire = msg.into_typed::<WireMessage>().unwrap();
        assert_eq!(wire.payload, vec![1, 2, 3]);
    }

    #[test]
    fn payload_type_id_names_the_carried_value() {
        assert_eq!(Message::new(Deposit(1)).payload_type_id(), TypeId::of::<Deposit>());
        assert_eq!(
            Message::wire("bank.Deposit", Vec::new()).payload_type_id(),
            TypeId::of::<WireMessage>()
        );
    }

    #[test]
    fn whole_message_can_be_taken() {
        let msg = Message::wire("ping", Vec::new());
        let same = msg.into_typed::<Message>().unwrap();
        assert_eq!(same.type_name(), "ping");
    }

    #[test]
    fn short_names_drop_paths_and_generics() {
        assert_eq!(short_type_name("a::b::Ledger"), "Ledger");
        assert_eq!(short_type_name("a::Wrapper<b::Inner>"), "Wrapper");
        assert_eq!(short_type_name("u32"), "u32");
    }
}
