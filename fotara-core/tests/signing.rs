mod common;

use base64ct::{Base64, Encoding};
use fotara_core::invoice::{
    InvoiceSigner, InvoiceSubmission, InvoiceValidator, SigningError, decode_tlv, regenerate_qr,
};

fn tag(entries: &[(u8, Vec<u8>)], tag: u8) -> &[u8] {
    entries
        .iter()
        .find(|(t, _)| *t == tag)
        .map(|(_, value)| value.as_slice())
        .unwrap_or_else(|| panic!("tag {tag} missing"))
}

fn tag_text(entries: &[(u8, Vec<u8>)], t: u8) -> String {
    String::from_utf8(tag(entries, t).to_vec()).expect("utf8 tag")
}

#[test]
fn ec_signing_fills_every_slot() {
    let (key, cert) = common::ec_signer_material();
    let xml = common::read_fixture(common::STANDARD_INVOICE);
    let signed = InvoiceSigner::new(key, cert.clone())
        .with_clock(common::fixed_clock())
        .sign(&xml)
        .expect("sign");

    assert_eq!(signed.uuid(), "3cf5ee18-ee25-44ea-a444-2c37ba7f28be");
    assert!(!signed.signature_fallback());
    assert!(!signed.invoice_hash().is_empty());
    assert!(Base64::decode_vec(signed.signature()).is_ok());

    let out = signed.signed_xml();
    assert!(out.contains(signed.signature()));
    assert!(out.contains(signed.invoice_hash()));
    assert!(out.contains(&cert.base64_text()));
    assert!(out.contains(&cert.digest()));
    assert!(out.contains(&cert.serial_decimal()));
    assert!(out.contains("2024-03-01T10:00:00"), "signing time from clock");
    assert!(out.contains(signed.qr_code()));
    assert!(out.contains("http://www.w3.org/2001/04/xmldsig-more#ecdsa-sha256"));
}

#[test]
fn invoice_hash_is_stable_across_signings() {
    let (key, cert) = common::ec_signer_material();
    let xml = common::read_fixture(common::STANDARD_INVOICE);
    let signer = InvoiceSigner::new(key, cert).with_clock(common::fixed_clock());

    let first = signer.sign(&xml).expect("first");
    let second = signer.sign(&xml).expect("second");
    assert_eq!(first.invoice_hash(), second.invoice_hash());

    // Re-signing an already signed document hashes the same content.
    let resigned = signer.sign(first.signed_xml()).expect("resign");
    assert_eq!(first.invoice_hash(), resigned.invoice_hash());
}

#[test]
fn qr_payload_carries_nine_tags() {
    let (key, cert) = common::ec_signer_material();
    let xml = common::read_fixture(common::STANDARD_INVOICE);
    let signed = InvoiceSigner::new(key, cert.clone())
        .with_clock(common::fixed_clock())
        .sign(&xml)
        .expect("sign");

    let entries = decode_tlv(signed.qr_code()).expect("tlv");
    let tags: Vec<u8> = entries.iter().map(|(t, _)| *t).collect();
    assert_eq!(tags, [1, 2, 3, 4, 5, 6, 7, 8, 9]);

    assert_eq!(tag_text(&entries, 1), "Acme Trading");
    assert_eq!(tag_text(&entries, 2), "300000000000003");
    assert_eq!(tag_text(&entries, 3), "2024-03-01T13:00:00");
    assert_eq!(tag_text(&entries, 4), "116.00");
    assert_eq!(tag_text(&entries, 5), "16.00");
    assert_eq!(tag_text(&entries, 6), signed.invoice_hash());
    assert_eq!(
        tag(&entries, 7),
        Base64::decode_vec(signed.signature()).unwrap().as_slice()
    );
    assert_eq!(tag(&entries, 8), cert.public_key_der().unwrap().as_slice());
    assert_eq!(tag(&entries, 9), cert.signature_bytes());
}

#[test]
fn missing_issue_time_uses_midnight_in_qr() {
    let (key, cert) = common::ec_signer_material();
    let xml = common::read_fixture(common::SIMPLIFIED_INVOICE);
    let signed = InvoiceSigner::new(key, cert)
        .with_clock(common::fixed_clock())
        .sign(&xml)
        .expect("sign");

    assert_eq!(signed.uuid(), "8e6000cf-1a98-4174-b3e7-b5d5954bc10d");
    let entries = decode_tlv(signed.qr_code()).expect("tlv");
    assert_eq!(tag_text(&entries, 3), "2024-03-01T00:00:00");
}

#[test]
fn rsa_signature_validates() {
    let (key, cert) = common::rsa_signer_material();
    let xml = common::read_fixture(common::STANDARD_INVOICE);
    let signed = InvoiceSigner::new(key, cert)
        .with_clock(common::fixed_clock())
        .sign(&xml)
        .expect("sign");

    assert!(
        signed
            .signed_xml()
            .contains("http://www.w3.org/2001/04/xmldsig-more#rsa-sha256")
    );
    let report = InvoiceValidator::default().validate_str(signed.signed_xml());
    assert!(report.signed);
    assert!(report.is_valid(), "{:?}", report.errors);
}

#[test]
fn regenerated_qr_matches_embedded_one() {
    let (key, cert) = common::ec_signer_material();
    let xml = common::read_fixture(common::STANDARD_INVOICE);
    let signed = InvoiceSigner::new(key, cert)
        .with_clock(common::fixed_clock())
        .sign(&xml)
        .expect("sign");

    let qr = regenerate_qr(signed.signed_xml()).expect("regenerate");
    assert_eq!(qr.payload, signed.qr_code());
    assert!(!qr.signature_fallback);
}

#[test]
fn submission_body_reads_back_from_signed_xml() {
    let (key, cert) = common::ec_signer_material();
    let xml = common::read_fixture(common::STANDARD_INVOICE);
    let signed = InvoiceSigner::new(key, cert)
        .with_clock(common::fixed_clock())
        .sign(&xml)
        .expect("sign");

    let from_xml = InvoiceSubmission::from_signed_xml(signed.signed_xml()).expect("submission");
    assert_eq!(from_xml, InvoiceSubmission::from_signed(&signed));
    assert_eq!(
        Base64::decode_vec(&from_xml.invoice).unwrap(),
        signed.signed_xml().as_bytes()
    );
}

#[test]
fn invoice_without_uuid_is_rejected() {
    let (key, cert) = common::ec_signer_material();
    let xml = common::read_fixture(common::STANDARD_INVOICE).replace(
        "<cbc:UUID>3cf5ee18-ee25-44ea-a444-2c37ba7f28be</cbc:UUID>",
        "",
    );
    let err = InvoiceSigner::new(key, cert)
        .with_clock(common::fixed_clock())
        .sign(&xml)
        .unwrap_err();
    assert!(matches!(err, SigningError::MissingUuid), "{err}");
}

#[test]
fn unsigned_invoice_has_no_submission_hash() {
    let xml = common::read_fixture(common::STANDARD_INVOICE);
    assert!(InvoiceSubmission::from_signed_xml(&xml).is_err());
}
