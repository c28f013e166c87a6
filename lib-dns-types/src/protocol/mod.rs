//! The DNS message format, as described in RFC 1035 section 4, along
//! with serialisation to and deserialisation from the format used on
//! the wire.

pub mod deserialise;
pub mod serialise;
pub mod types;
