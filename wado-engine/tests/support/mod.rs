//! Fixtures shared by the end-to-end scenario tests: minimal, real DICOM
//! byte buffers built with the same `dicom_object` builder APIs the object
//! crate's own tests use, rather than hand-rolled byte literals.

#![allow(dead_code)]

use dicom_core::{dicom_value, DataElement, Tag, VR};
use dicom_object::{FileMetaTableBuilder, InMemDicomObject};

/// Explicit VR Little Endian, the transfer syntax every instance below is
/// encoded with unless [`with_unsupported_transfer_syntax`] patches it.
pub const EXPLICIT_VR_LE: &str = "1.2.840.10008.1.2.1";

/// RLE Lossless: a real DICOM transfer syntax, but one this workspace's
/// pared-down transfer syntax registry cannot resolve since the pixel data
/// codec crates were trimmed out of it. Same byte length as
/// [`EXPLICIT_VR_LE`], which lets [`with_unsupported_transfer_syntax`] patch
/// it in place without touching any other length-prefixed field.
const UNSUPPORTED_TS: &str = "1.2.840.10008.1.2.5";

/// Builds a minimal, valid, Explicit-VR-Little-Endian-encoded DICOM file's
/// bytes: file meta group plus a handful of top-level tags, enough for the
/// rewriter to parse and for [`dicom_object::open_file`] to read back.
pub fn dicom_instance_bytes(
    sop_instance_uid: &str,
    patient_id: &str,
    study_instance_uid: &str,
) -> Vec<u8> {
    let mut obj = InMemDicomObject::new_empty();
    obj.put(DataElement::new(
        Tag(0x0010, 0x0020), // PatientID
        VR::LO,
        dicom_value!(Strs, [patient_id]),
    ));
    obj.put(DataElement::new(
        Tag(0x0020, 0x000D), // StudyInstanceUID
        VR::UI,
        dicom_value!(Strs, [study_instance_uid]),
    ));
    obj.put(DataElement::new(
        Tag(0x0008, 0x0018), // SOPInstanceUID
        VR::UI,
        dicom_value!(Strs, [sop_instance_uid]),
    ));
    obj.put(DataElement::new(
        Tag(0x0008, 0x0060), // Modality
        VR::CS,
        dicom_value!(Strs, ["OT"]),
    ));

    let file_object = obj
        .with_meta(
            FileMetaTableBuilder::default()
                .transfer_syntax(EXPLICIT_VR_LE)
                .media_storage_sop_class_uid("1.2.840.10008.5.1.4.1.1.7")
                .media_storage_sop_instance_uid(sop_instance_uid),
        )
        .expect("fixture meta table is valid");

    let mut bytes = Vec::new();
    file_object
        .write_all(&mut bytes)
        .expect("fixture object is serializable");
    bytes
}

/// Patches a buffer produced by [`dicom_instance_bytes`] so its declared
/// transfer syntax is one this workspace cannot decode, exercising the
/// fallback-retry path without needing a second, truly-compressed fixture.
pub fn with_unsupported_transfer_syntax(mut bytes: Vec<u8>) -> Vec<u8> {
    let needle = EXPLICIT_VR_LE.as_bytes();
    let pos = bytes
        .windows(needle.len())
        .position(|w| w == needle)
        .expect("transfer syntax UID is present in the meta group");
    bytes[pos..pos + needle.len()].copy_from_slice(UNSUPPORTED_TS.as_bytes());
    bytes
}

/// Assembles a `multipart/related` body out of already-encoded DICOM parts,
/// in the same wire shape the multipart reader's own unit tests parse.
pub fn multipart_body(boundary: &str, parts: &[Vec<u8>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(b"--");
        body.extend_from_slice(boundary.as_bytes());
        body.extend_from_slice(b"\r\nContent-Type: application/dicom\r\n\r\n");
        body.extend_from_slice(part);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(b"--");
    body.extend_from_slice(boundary.as_bytes());
    body.extend_from_slice(b"--\r\n");
    body
}
