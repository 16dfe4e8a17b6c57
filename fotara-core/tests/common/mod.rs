use base64ct::{Base64, Encoding};
use chrono::{TimeZone, Utc};
use fotara_core::{
    certificate::SigningCertificate,
    invoice::{Clock, FixedClock},
    keys::{KeyAlgorithm, PrivateKey},
};
use std::{
    path::{Path, PathBuf},
    str::FromStr,
    sync::Arc,
    time::Duration,
};
use x509_cert::{
    builder::{Builder, CertificateBuilder, Profile},
    der::Encode,
    name::Name,
    serial_number::SerialNumber,
    spki::{EncodePublicKey, SubjectPublicKeyInfoOwned},
    time::Validity,
};

#[allow(dead_code)]
pub const STANDARD_INVOICE: &str = "invoices/standard-invoice.xml";
#[allow(dead_code)]
pub const SIMPLIFIED_INVOICE: &str = "invoices/simplified-invoice-no-time.xml";

pub fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

#[allow(dead_code)]
pub fn read_fixture(name: &str) -> String {
    std::fs::read_to_string(fixture(name)).expect("read fixture")
}

#[allow(dead_code)]
pub fn ec_key() -> k256::ecdsa::SigningKey {
    k256::ecdsa::SigningKey::from_slice(&[0x2a; 32]).expect("scalar")
}

/// 10:00 local time on 2024-03-01.
#[allow(dead_code)]
pub fn fixed_clock() -> Arc<dyn Clock> {
    Arc::new(FixedClock(
        Utc.with_ymd_and_hms(2024, 3, 1, 7, 0, 0).unwrap(),
    ))
}

/// Key and matching self-signed certificate on secp256k1.
#[allow(dead_code)]
pub fn ec_signer_material() -> (PrivateKey, SigningCertificate) {
    let key = ec_key();
    let spki_der = key.verifying_key().to_public_key_der().expect("spki der");
    let cert = self_signed::<_, k256::ecdsa::DerSignature>(&key, spki_der.as_bytes());
    (PrivateKey::Secp256k1(key), cert)
}

/// Key and matching self-signed certificate on RSA-1024.
#[allow(dead_code)]
pub fn rsa_signer_material() -> (PrivateKey, SigningCertificate) {
    let key = PrivateKey::generate(KeyAlgorithm::Rsa { bits: 1024 }).expect("rsa key");
    let PrivateKey::Rsa(rsa_key) = &key else {
        unreachable!()
    };
    let signer = rsa::pkcs1v15::SigningKey::<sha2::Sha256>::new(rsa_key.clone());
    let spki_der = key.public_key().to_spki_der().expect("spki der");
    let cert = self_signed::<_, rsa::pkcs1v15::Signature>(&signer, &spki_der);
    (key, cert)
}

fn self_signed<S, Sig>(signer: &S, spki_der: &[u8]) -> SigningCertificate
where
    S: rsa::signature::Keypair
        + x509_cert::spki::DynSignatureAlgorithmIdentifier
        + rsa::signature::Signer<Sig>,
    S::VerifyingKey: EncodePublicKey,
    Sig: x509_cert::spki::SignatureBitStringEncoding,
{
    let public_key = SubjectPublicKeyInfoOwned::try_from(spki_der).expect("spki");
    let builder = CertificateBuilder::new(
        Profile::Root,
        SerialNumber::from(1_234_567u32),
        Validity::from_now(Duration::from_secs(3600)).expect("validity"),
        Name::from_str("CN=Fotara Test,O=Fotara,C=JO").expect("subject"),
        public_key,
        signer,
    )
    .expect("builder");
    let cert = builder.build::<Sig>().expect("certificate");
    let der = cert.to_der().expect("cert der");
    SigningCertificate::parse(&Base64::encode_string(&der)).expect("parse certificate")
}
