//! The higher level conversation with the module: parameter synchronization
//! with the vehicle's configuration model, socket mirroring, and access-point
//! provisioning.

pub mod ap;
pub mod params;
pub mod sockets;
