//! Request middleware.

pub mod instrument;

pub use instrument::{instrument, route_label, CLIENT_CLOSED_REQUEST, UNMATCHED_ROUTE};
