pub mod identifiers;
pub mod introspector;
pub mod router;
