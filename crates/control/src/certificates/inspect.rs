//! Reading PEM certificates into certificate records.

use certfleet_agent_protocol::{Certificate, Issuer};
use chrono::DateTime;
use x509_parser::extensions::GeneralName;
use x509_parser::prelude::{X509Certificate, X509Name};
use x509_parser::time::ASN1Time;
use x509_parser::x509::AttributeTypeAndValue;

use super::CertificateError;

/// Layout of `ValidFrom`/`ValidTo`, e.g. `02 Jan 06 15:04 -0700`
pub const VALIDITY_FORMAT: &str = "%d %b %y %H:%M %z";

/// Convert the first certificate of a PEM bundle into a record.
///
/// Private key blocks are skipped, so the output of
/// [`create_self_signed`](super::create_self_signed) is accepted as is.
/// `is_valid` is always false: no chain is verified here.
pub fn parse_certificate_pem(pem_data: &str) -> Result<Certificate, CertificateError> {
    let blocks = pem::parse_many(pem_data).map_err(|e| CertificateError::Parse(e.to_string()))?;

    let block = blocks
        .iter()
        .find(|b| b.tag() == "CERTIFICATE")
        .ok_or_else(|| CertificateError::Parse("no CERTIFICATE block found".to_string()))?;

    let (_, cert) = x509_parser::parse_x509_certificate(block.contents())
        .map_err(|e| CertificateError::Parse(e.to_string()))?;

    Ok(to_record(&cert))
}

fn to_record(cert: &X509Certificate<'_>) -> Certificate {
    let mut dns_names = Vec::new();
    let mut email_addresses = Vec::new();

    if let Ok(Some(san)) = cert.subject_alternative_name() {
        for name in &san.value.general_names {
            match name {
                GeneralName::DNSName(dns) => dns_names.push(dns.to_string()),
                GeneralName::RFC822Name(email) => email_addresses.push(email.to_string()),
                _ => {}
            }
        }
    }

    let subject = cert.subject();
    let issuer = cert.issuer();

    Certificate {
        cn: common_name(subject),
        valid_from: format_time(&cert.validity().not_before),
        valid_to: format_time(&cert.validity().not_after),
        dns_names,
        email_addresses,
        organization: collect(subject.iter_organization()),
        province: collect(subject.iter_state_or_province()),
        country: collect(subject.iter_country()),
        locality: collect(subject.iter_locality()),
        is_ca: cert.is_ca(),
        is_valid: false,
        issuer: Issuer {
            cn: common_name(issuer),
            organization: collect(issuer.iter_organization()),
        },
    }
}

fn common_name(name: &X509Name<'_>) -> String {
    name.iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .unwrap_or_default()
        .to_string()
}

fn collect<'a, 'b: 'a>(values: impl Iterator<Item = &'a AttributeTypeAndValue<'b>>) -> Vec<String> {
    values
        .filter_map(|v| v.as_str().ok())
        .map(str::to_string)
        .collect()
}

fn format_time(time: &ASN1Time) -> String {
    DateTime::from_timestamp(time.timestamp(), 0)
        .map(|t| t.format(VALIDITY_FORMAT).to_string())
        .unwrap_or_default()
}
