//! Caller identity: device id extraction, validation and fingerprinting.

mod fingerprint;
mod resolver;
mod validator;

pub use fingerprint::{generate_fingerprint, RequestSignals, FINGERPRINT_LEN};
pub use resolver::{
    generate_secure_id, DeviceIdentity, IdentityResolver, IdentitySource, Platform,
    RequestContext, UNKNOWN_CLIENT,
};
pub use validator::{
    check_device_id, recommendations, validate_device_id, DenyList, InvalidDeviceId,
    MAX_DEVICE_ID_LEN, MIN_DEVICE_ID_LEN,
};
