//! Certificate classification, generation and inspection.

mod inspect;
mod policy;
mod self_signed;

pub use inspect::{parse_certificate_pem, VALIDITY_FORMAT};
pub use policy::{CertificatePolicy, PolicyError};
pub use self_signed::{create_self_signed, CertificateError, SelfSignedRequest, RSA_KEY_BITS};
