//! Self-signed certificate generation

use super::config::TlsError;
use openssl::asn1::Asn1Time;
use openssl::bn::{BigNum, MsbOption};
use openssl::ec::{EcGroup, EcKey};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{PKey, Private};
use openssl::x509::{X509NameBuilder, X509};

/// Days a generated certificate stays valid
pub const SELF_SIGNED_DAYS: u32 = 365;

/// Generate a P-256 key and a self-signed certificate for `common_name`
pub fn self_signed(common_name: &str) -> Result<(X509, PKey<Private>), TlsError> {
    let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1)?;
    let key = PKey::from_ec_key(EcKey::generate(&group)?)?;

    let mut name = X509NameBuilder::new()?;
    name.append_entry_by_nid(Nid::COMMONNAME, common_name)?;
    let name = name.build();

    let serial = {
        let mut bn = BigNum::new()?;
        bn.rand(64, MsbOption::MAYBE_ZERO, false)?;
        bn.to_asn1_integer()?
    };

    let mut builder = X509::builder()?;
    builder.set_version(2)?;
    builder.set_serial_number(&serial)?;
    builder.set_subject_name(&name)?;
    builder.set_issuer_name(&name)?;
    builder.set_pubkey(&key)?;
    let not_before = Asn1Time::days_from_now(0)?;
    builder.set_not_before(&not_before)?;
    let not_after = Asn1Time::days_from_now(SELF_SIGNED_DAYS)?;
    builder.set_not_after(&not_after)?;
    builder.sign(&key, MessageDigest::sha256())?;

    Ok((builder.build(), key))
}
