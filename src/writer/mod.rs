//! Serialization of objects into PDF syntax.
//!
//! Revision layout (objects, cross-reference section, trailer) is driven by
//! [`crate::update::DocumentUpdate`]; this module only turns values into
//! bytes.

mod object_serializer;

pub use object_serializer::ObjectSerializer;
