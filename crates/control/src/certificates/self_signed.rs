//! Self-signed certificate generation.
//!
//! Produces a single PEM blob holding the PKCS#1 RSA private key followed by
//! the certificate, the layout host agents expect when a certificate is
//! uploaded to their storage.

use rcgen::{
    CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose, IsCa, KeyPair,
    KeyUsagePurpose, SanType, SerialNumber,
};
use rsa::pkcs1::EncodeRsaPrivateKey;
use rsa::pkcs8::{EncodePrivateKey, LineEnding};
use rsa::RsaPrivateKey;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::debug;

/// RSA modulus size of generated keys
pub const RSA_KEY_BITS: usize = 4096;

/// Serial number stamped on every generated certificate
const SERIAL_NUMBER: u64 = 2022;

const VALIDITY_YEARS: i32 = 10;

#[derive(Debug, Error)]
pub enum CertificateError {
    #[error("common name is required")]
    MissingCommonName,

    #[error("invalid subject alternative name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    #[error("could not generate private key: {0}")]
    KeyGeneration(#[from] rsa::Error),

    #[error("could not encode private key: {0}")]
    KeyEncoding(String),

    #[error("could not sign certificate: {0}")]
    Signing(#[from] rcgen::Error),

    #[error("could not compute validity period: {0}")]
    Validity(#[from] time::error::ComponentRange),

    #[error("could not parse certificate: {0}")]
    Parse(String),

    #[error("certificate generation task failed: {0}")]
    Task(String),
}

/// Subject of a self-signed certificate. Empty fields are left out.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelfSignedRequest {
    /// Name under which the certificate is stored on the host
    pub cert_name: String,
    pub common_name: String,
    pub email: String,
    pub country: String,
    pub province: String,
    pub locality: String,
    pub organization: String,
    /// Subject alternative names; IP literals become IP SANs
    pub alt_names: Vec<String>,
}

/// Generate a 4096-bit RSA key and a ten year self-signed certificate.
///
/// Key generation takes seconds; call from a blocking context.
pub fn create_self_signed(request: &SelfSignedRequest) -> Result<String, CertificateError> {
    let common_name = request.common_name.trim();
    if common_name.is_empty() {
        return Err(CertificateError::MissingCommonName);
    }

    let subject_alt_names = subject_alt_names(request)?;

    debug!(common_name = %common_name, bits = RSA_KEY_BITS, "Generating RSA key");
    let private_key = RsaPrivateKey::new(&mut rand::rngs::OsRng, RSA_KEY_BITS)?;

    let pkcs1_pem = private_key
        .to_pkcs1_pem(LineEnding::LF)
        .map_err(|e| CertificateError::KeyEncoding(e.to_string()))?;
    let pkcs8_pem = private_key
        .to_pkcs8_pem(LineEnding::LF)
        .map_err(|e| CertificateError::KeyEncoding(e.to_string()))?;
    let key_pair = KeyPair::from_pem(&pkcs8_pem)?;

    let mut params = CertificateParams::default();
    params.distinguished_name = distinguished_name(common_name, request);
    params.subject_alt_names = subject_alt_names;
    params.serial_number = Some(SerialNumber::from(SERIAL_NUMBER));
    params.key_usages = vec![
        KeyUsagePurpose::DigitalSignature,
        KeyUsagePurpose::KeyEncipherment,
    ];
    params.extended_key_usages = vec![
        ExtendedKeyUsagePurpose::ClientAuth,
        ExtendedKeyUsagePurpose::ServerAuth,
    ];
    params.is_ca = IsCa::ExplicitNoCa;

    let now = OffsetDateTime::now_utc();
    params.not_before = now;
    params.not_after = add_years(now, VALIDITY_YEARS)?;

    let cert = params.self_signed(&key_pair)?;

    Ok(format!("{}\n{}", pkcs1_pem.as_str(), cert.pem()))
}

fn distinguished_name(common_name: &str, request: &SelfSignedRequest) -> DistinguishedName {
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, common_name);

    let optional = [
        (DnType::OrganizationName, &request.organization),
        (DnType::CountryName, &request.country),
        (DnType::LocalityName, &request.locality),
        (DnType::StateOrProvinceName, &request.province),
    ];
    for (ty, value) in optional {
        let value = value.trim();
        if !value.is_empty() {
            dn.push(ty, value);
        }
    }

    dn
}

fn subject_alt_names(request: &SelfSignedRequest) -> Result<Vec<SanType>, CertificateError> {
    let invalid = |name: &str, reason: String| CertificateError::InvalidName {
        name: name.to_string(),
        reason,
    };

    let mut sans = Vec::with_capacity(request.alt_names.len() + 1);

    for name in request.alt_names.iter().map(|n| n.trim()).filter(|n| !n.is_empty()) {
        let san = match name.parse::<IpAddr>() {
            Ok(ip) => SanType::IpAddress(ip),
            Err(_) => SanType::DnsName(
                name.to_string()
                    .try_into()
                    .map_err(|e: rcgen::Error| invalid(name, e.to_string()))?,
            ),
        };
        sans.push(san);
    }

    let email = request.email.trim();
    if !email.is_empty() {
        sans.push(SanType::Rfc822Name(
            email
                .to_string()
                .try_into()
                .map_err(|e: rcgen::Error| invalid(email, e.to_string()))?,
        ));
    }

    Ok(sans)
}

/// Same calendar date `years` later; Feb 29 falls back to Feb 28
fn add_years(
    at: OffsetDateTime,
    years: i32,
) -> Result<OffsetDateTime, time::error::ComponentRange> {
    let year = at.year() + years;
    at.replace_year(year)
        .or_else(|_| at.replace_day(28).and_then(|d| d.replace_year(year)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::{Date, Month};

    fn utc(year: i32, month: Month, day: u8) -> OffsetDateTime {
        Date::from_calendar_date(year, month, day)
            .unwrap()
            .with_hms(10, 30, 0)
            .unwrap()
            .assume_utc()
    }

    #[test]
    fn test_common_name_required() {
        let err = create_self_signed(&SelfSignedRequest {
            common_name: "  ".to_string(),
            ..Default::default()
        })
        .unwrap_err();
        assert!(matches!(err, CertificateError::MissingCommonName));
    }

    #[test]
    fn test_invalid_alt_name_rejected_before_keygen() {
        let err = subject_alt_names(&SelfSignedRequest {
            common_name: "example.com".to_string(),
            alt_names: vec!["bücher.example".to_string()],
            ..Default::default()
        })
        .unwrap_err();
        assert!(matches!(err, CertificateError::InvalidName { .. }));
    }

    #[test]
    fn test_alt_names_and_email() {
        let sans = subject_alt_names(&SelfSignedRequest {
            common_name: "example.com".to_string(),
            email: "ops@example.com".to_string(),
            alt_names: vec![
                "example.com".to_string(),
                "".to_string(),
                "192.0.2.7".to_string(),
            ],
            ..Default::default()
        })
        .unwrap();

        assert_eq!(sans.len(), 3);
        assert!(matches!(sans[0], SanType::DnsName(_)));
        assert!(matches!(sans[1], SanType::IpAddress(_)));
        assert!(matches!(sans[2], SanType::Rfc822Name(_)));
    }

    #[test]
    fn test_add_years() {
        let at = utc(2024, Month::May, 17);
        assert_eq!(add_years(at, 10).unwrap(), utc(2034, Month::May, 17));

        let leap = utc(2024, Month::February, 29);
        assert_eq!(add_years(leap, 10).unwrap(), utc(2034, Month::February, 28));
    }
}
