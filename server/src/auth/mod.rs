//! Request authentication.
//!
//! Credentials are checked upstream; this module reads the identity the
//! gateway forwards and turns it into a [`torque_engine::Identity`].

mod middleware;

pub use middleware::{Caller, DEVICE_ID_HEADER, USER_ID_HEADER};
