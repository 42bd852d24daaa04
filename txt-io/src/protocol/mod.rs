//! Frame codecs, one module per wire variant.
//!
//! - [`socket`]: plain TCP command set (status, session, config, exchange)
//! - [`serial`]: byte-packed frames of the direct motor-shield link
//! - [`compressed`]: header + delta bitstream for master and extension
//! - [`camera`]: camera stream frame header
//!
//! All functions are pure: they pack state into fixed-size frames or parse
//! received bytes, and never touch a transport.

pub mod camera;
pub mod compressed;
pub mod serial;
pub mod socket;
pub mod wire;
