//! Certificate template construction and self-signing

use chrono::{DateTime, Duration, SubsecRound, Utc};
use der::asn1::{
    Any, BitString, GeneralizedTime, Ia5String, ObjectIdentifier, OctetString, SetOfVec, UtcTime,
};
use der::oid::AssociatedOid;
use der::{Encode, Tag};
use rand::rngs::OsRng;
use rand::RngCore;
use tracing::debug;
use x509_cert::attr::AttributeTypeAndValue;
use x509_cert::certificate::{Certificate, TbsCertificate, Version};
use x509_cert::ext::pkix::name::GeneralName;
use x509_cert::ext::pkix::{
    BasicConstraints, ExtendedKeyUsage, KeyUsage, KeyUsages, SubjectAltName,
};
use x509_cert::ext::Extension;
use x509_cert::name::{Name, RdnSequence, RelativeDistinguishedName};
use x509_cert::serial_number::SerialNumber;
use x509_cert::time::{Time, Validity};

use crate::key::PrivateKey;
use crate::IssuerError;

/// Organization placed in the subject of every issued certificate
pub const ORGANIZATION: &str = "Ionoverse";

/// Serial numbers are drawn from [0, 2^128)
pub const SERIAL_NUMBER_BYTES: usize = 16;

const COMMON_NAME_OID: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.3");
const ORGANIZATION_OID: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.10");
const SERVER_AUTH_OID: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.6.1.5.5.7.3.1");

/// Draw a serial number from the operating system's CSPRNG
pub fn random_serial() -> Result<[u8; SERIAL_NUMBER_BYTES], IssuerError> {
    let mut serial = [0u8; SERIAL_NUMBER_BYTES];
    OsRng
        .try_fill_bytes(&mut serial)
        .map_err(|e| IssuerError::Entropy(format!("serial number: {}", e)))?;
    Ok(serial)
}

/// Key usages set on every certificate, including the CA-style
/// certificate and CRL signing bits even though the certificate is not a CA.
pub fn key_usage() -> KeyUsage {
    KeyUsage(
        KeyUsages::DigitalSignature
            | KeyUsages::KeyEncipherment
            | KeyUsages::KeyCertSign
            | KeyUsages::CRLSign,
    )
}

/// The unsigned attribute set of a self-signed server certificate
#[derive(Debug, Clone)]
pub struct CertificateTemplate {
    pub serial: [u8; SERIAL_NUMBER_BYTES],
    pub organization: String,
    pub common_name: String,
    pub admin_email: String,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
}

impl CertificateTemplate {
    /// Template valid from now (whole seconds) for `validity`.
    ///
    /// A zero or negative validity is accepted and yields an already expired
    /// or inverted window.
    pub fn new(
        common_name: &str,
        admin_email: &str,
        validity: Duration,
    ) -> Result<Self, IssuerError> {
        let not_before = Utc::now().trunc_subsecs(0);
        let not_after = not_before.checked_add_signed(validity).ok_or_else(|| {
            IssuerError::InvalidValidity(format!("{} overflows the calendar", validity))
        })?;

        let serial = random_serial()?;
        debug!("Drew serial number {}", hex_serial(&serial));

        Ok(Self {
            serial,
            organization: ORGANIZATION.to_string(),
            common_name: common_name.to_string(),
            admin_email: admin_email.to_string(),
            not_before,
            not_after,
        })
    }

    pub fn subject(&self) -> Result<Name, IssuerError> {
        Ok(RdnSequence(vec![
            utf8_rdn(ORGANIZATION_OID, &self.organization)?,
            utf8_rdn(COMMON_NAME_OID, &self.common_name)?,
        ]))
    }

    pub fn validity(&self) -> Result<Validity, IssuerError> {
        Ok(Validity {
            not_before: x509_time(self.not_before)?,
            not_after: x509_time(self.not_after)?,
        })
    }

    /// Basic constraints (cA = false), key usage, server-auth EKU and the
    /// DNS + email subject alternative names.
    pub fn extensions(&self) -> Result<Vec<Extension>, IssuerError> {
        let basic_constraints = BasicConstraints {
            ca: false,
            path_len_constraint: None,
        };
        let extended_key_usage = ExtendedKeyUsage(vec![SERVER_AUTH_OID]);
        let subject_alt_name = SubjectAltName(vec![
            GeneralName::DnsName(Ia5String::new(&self.common_name)?),
            GeneralName::Rfc822Name(Ia5String::new(&self.admin_email)?),
        ]);

        Ok(vec![
            extension(&key_usage(), true)?,
            extension(&extended_key_usage, false)?,
            extension(&basic_constraints, true)?,
            extension(&subject_alt_name, false)?,
        ])
    }

    /// Sign the template with `key`. Issuer and subject are the same name.
    pub fn self_sign(&self, key: &PrivateKey) -> Result<Certificate, IssuerError> {
        let signature_algorithm = key.signature_algorithm()?;
        let subject = self.subject()?;

        let tbs_certificate = TbsCertificate {
            version: Version::V3,
            serial_number: SerialNumber::new(&self.serial)?,
            signature: signature_algorithm.clone(),
            issuer: subject.clone(),
            validity: self.validity()?,
            subject,
            subject_public_key_info: key.subject_public_key_info()?,
            issuer_unique_id: None,
            subject_unique_id: None,
            extensions: Some(self.extensions()?),
        };

        let signature = key.sign(&tbs_certificate.to_der()?)?;

        Ok(Certificate {
            tbs_certificate,
            signature_algorithm,
            signature: BitString::from_bytes(&signature)?,
        })
    }
}

fn utf8_rdn(oid: ObjectIdentifier, value: &str) -> Result<RelativeDistinguishedName, IssuerError> {
    let attribute = AttributeTypeAndValue {
        oid,
        value: Any::new(Tag::Utf8String, value.as_bytes())?,
    };
    Ok(RelativeDistinguishedName(SetOfVec::try_from(vec![
        attribute,
    ])?))
}

fn extension<T: AssociatedOid + Encode>(value: &T, critical: bool) -> Result<Extension, der::Error> {
    Ok(Extension {
        extn_id: T::OID,
        critical,
        extn_value: OctetString::new(value.to_der()?)?,
    })
}

// RFC 5280 4.1.2.5: UTCTime through 2049, GeneralizedTime from 2050 on
fn x509_time(instant: DateTime<Utc>) -> Result<Time, IssuerError> {
    let seconds = u64::try_from(instant.timestamp()).map_err(|_| {
        IssuerError::InvalidValidity(format!("{} precedes the Unix epoch", instant))
    })?;
    let date_time = der::DateTime::from_unix_duration(std::time::Duration::from_secs(seconds))?;

    if date_time.year() < 2050 {
        Ok(Time::UtcTime(UtcTime::from_date_time(date_time)?))
    } else {
        Ok(Time::GeneralTime(GeneralizedTime::from_date_time(date_time)))
    }
}

fn hex_serial(serial: &[u8]) -> String {
    serial.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::{EcdsaCurve, KeySpec};
    use der::Decode;

    fn template(validity: Duration) -> CertificateTemplate {
        CertificateTemplate::new("svc.internal", "ops@example.com", validity).unwrap()
    }

    #[test]
    fn test_serials_are_random() {
        let first = random_serial().unwrap();
        let second = random_serial().unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_validity_window() {
        let t = template(Duration::days(30));
        assert_eq!(t.not_after - t.not_before, Duration::days(30));
        assert_eq!(t.not_before.timestamp_subsec_nanos(), 0);

        let t = template(Duration::seconds(-60));
        assert!(t.not_after < t.not_before);
    }

    #[test]
    fn test_time_encoding_switches_at_2050() {
        let early = DateTime::parse_from_rfc3339("2049-12-31T23:59:59Z")
            .unwrap()
            .with_timezone(&Utc);
        let late = DateTime::parse_from_rfc3339("2050-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);

        assert!(matches!(x509_time(early).unwrap(), Time::UtcTime(_)));
        assert!(matches!(x509_time(late).unwrap(), Time::GeneralTime(_)));
    }

    #[test]
    fn test_subject_order() {
        let name = template(Duration::days(1)).subject().unwrap();
        let attributes: Vec<(ObjectIdentifier, String)> = name
            .0
            .iter()
            .flat_map(|rdn| rdn.0.iter())
            .map(|atv| (atv.oid, atv.value.decode_as::<String>().unwrap()))
            .collect();

        assert_eq!(
            attributes,
            vec![
                (ORGANIZATION_OID, ORGANIZATION.to_string()),
                (COMMON_NAME_OID, "svc.internal".to_string()),
            ]
        );
    }

    #[test]
    fn test_key_usage_bits() {
        let usage = key_usage();
        assert!(usage.digital_signature());
        assert!(usage.key_encipherment());
        assert!(usage.key_cert_sign());
        assert!(usage.crl_sign());
        assert!(!usage.non_repudiation());
    }

    #[test]
    fn test_self_sign_round_trip() {
        let key = PrivateKey::generate(KeySpec::Ecdsa(EcdsaCurve::P256)).unwrap();
        let t = template(Duration::days(7));
        let cert = t.self_sign(&key).unwrap();

        let decoded = Certificate::from_der(&cert.to_der().unwrap()).unwrap();
        let tbs = &decoded.tbs_certificate;
        assert_eq!(tbs.version, Version::V3);
        assert_eq!(tbs.issuer, tbs.subject);
        assert_eq!(tbs.extensions.as_ref().unwrap().len(), 4);
        assert_eq!(
            decoded.signature_algorithm.oid,
            EcdsaCurve::P256.signature_oid()
        );
    }
}
