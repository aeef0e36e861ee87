//! Data model of the routing engine's table entries.
//!
//! A [`Route`] is the flat record handed to the request-matching engine: an
//! identifier, the match conditions (host regexes, path condition, extra
//! predicates), a filter chain and a backend. The textual form produced by
//! [`Route`]'s `Display` implementation is the engine's route definition
//! language and is what tests and debug output compare.
//!
//! Filter and predicate expressions that originate in ingress annotations are
//! carried as opaque fragments; their semantics belong to the engine's own
//! parser. The [`dsl`] module only splits such fragments syntactically.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod dsl;
mod routes;

pub use self::routes::{Backend, Filter, Predicate, Route};
