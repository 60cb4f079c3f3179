// Domain layer: import data model and the ports the pipeline drives.

pub mod model;
pub mod ports;
