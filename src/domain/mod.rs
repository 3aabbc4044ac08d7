// Domain layer: table model, deck definitions and ports. No I/O here.

pub mod countries;
pub mod languages;
pub mod model;
pub mod ports;
pub mod taxa;
