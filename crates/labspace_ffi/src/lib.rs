//! Flutter-facing bindings for the Labspace core.

pub mod api;
