/* keylightd library: per-key RGB keyboard lighting model, protocol encoders, update sequencing and
 * the per-device actor the daemon drives them through. */
pub mod actor;
pub mod device;
pub mod driver;
pub mod error;
pub mod keyboard_database;
