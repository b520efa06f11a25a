//! Message marker traits and runtime type tags.

use std::any::{TypeId, type_name};
use std::fmt;

/// A marker trait for everything that travels through the mediator.
///
/// Messages must be `Send + Sync + 'static` to be safe for async use. It is
/// implemented for every such type; implement [`Request`] or [`Notification`]
/// to give a type its role.
#[diagnostic::on_unimplemented(
    message = "`{Self}` is not a valid Message",
    label = "must be `Send + Sync + 'static`",
    note = "All messages in Herald must be thread-safe and static."
)]
pub trait Message: Send + Sync + 'static {}

impl<T: Send + Sync + 'static> Message for T {}

/// An operation that expects exactly one result.
///
/// # Example
///
/// ```rust,ignore
/// struct Ping(u32);
///
/// impl Request for Ping {
///     type Response = u32;
/// }
/// ```
#[diagnostic::on_unimplemented(
    message = "`{Self}` is not a `Request`",
    label = "missing `Request` implementation",
    note = "Implement `Request` and name its `Response` type to send `{Self}`."
)]
pub trait Request: Message {
    /// The value produced by the request's handler.
    type Response: Send + 'static;
}

/// An event with zero expected results and zero or more handlers.
#[diagnostic::on_unimplemented(
    message = "`{Self}` is not a `Notification`",
    label = "missing `Notification` implementation",
    note = "Implement `Notification` to publish `{Self}`."
)]
pub trait Notification: Message {}

/// Runtime type tag of a message.
///
/// Equality and hashing only consider the [`TypeId`]; the name is carried for
/// log fields and error messages.
#[derive(Clone, Copy)]
pub struct MessageKind {
    id: TypeId,
    name: &'static str,
}

impl MessageKind {
    /// The kind of `M`.
    pub fn of<M: Message>() -> Self {
        Self {
            id: TypeId::of::<M>(),
            name: type_name::<M>(),
        }
    }

    /// The [`TypeId`] of the message type.
    pub fn type_id(&self) -> TypeId {
        self.id
    }

    /// The fully qualified name of the message type.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for MessageKind {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for MessageKind {}

impl std::hash::Hash for MessageKind {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Identity of one handler registration, assigned by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

impl HandlerId {
    /// Wrap a raw registry-assigned identifier.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw identifier.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handler#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Ping;
    struct Pong;

    #[test]
    fn test_kind_identity() {
        assert_eq!(MessageKind::of::<Ping>(), MessageKind::of::<Ping>());
        assert_ne!(MessageKind::of::<Ping>(), MessageKind::of::<Pong>());
        assert!(MessageKind::of::<Ping>().name().ends_with("Ping"));
    }

    #[test]
    fn test_handler_id_display() {
        assert_eq!(HandlerId::new(7).to_string(), "handler#7");
        assert_eq!(HandlerId::new(7).get(), 7);
    }
}
