//! On-the-fly DICOM dataset rewriting.
//!
//! Reads a dataset from a byte stream, overrides a caller-specified set of
//! top-level tags with values drawn from the enclosing patient/study, and
//! writes a complete file preserving the original transfer syntax.
//!
//! Bulk-data elements (in practice, Pixel Data) are spooled to a sidecar
//! temp file while the dataset is held in memory and removed again before
//! this function returns, so a single large instance is never duplicated in
//! the process' resident memory.

use std::io::Write;
use std::path::Path;

use dicom_core::dictionary::DataDictionary;
use dicom_core::header::HasLength;
use dicom_core::{DataElement, PrimitiveValue, Tag, VR};
use dicom_dictionary_std::StandardDataDictionary;
use dicom_object::{FileDicomObject, InMemDicomObject, ReadError};
use snafu::ResultExt;
use tempfile::NamedTempFile;

use crate::error::{IoSnafu, RewriteError, WriteSnafu};

/// A tag value drawn from the enclosing patient or study, to be written
/// in place of whatever the server sent.
#[derive(Debug, Clone)]
pub struct TagOverride {
    pub tag: Tag,
    pub patient_value: Option<PrimitiveValue>,
    pub study_value: Option<PrimitiveValue>,
}

impl TagOverride {
    /// Resolves the precedence between a patient-level and a study-level
    /// value for the same tag, in favor of the patient-level value
    /// (see DESIGN.md).
    fn resolved(&self) -> Option<&PrimitiveValue> {
        self.patient_value.as_ref().or(self.study_value.as_ref())
    }
}

/// Supplies the tag values to write in place of the server's, given the
/// series' owning patient/study.
pub trait TagValueSource {
    fn overrides(&self) -> Vec<TagOverride>;
}

const BULK_DATA_THRESHOLD: usize = 1_024 * 1_024;
const PIXEL_DATA: Tag = Tag(0x7FE0, 0x0010);

/// Rewrites one DICOM dataset read from `src`, applying `overrides`, and
/// writes the result to `target_path`. Returns the number of bytes written.
///
/// On any failure, the target file is guaranteed not to exist.
pub fn rewrite(
    src: impl std::io::Read,
    target_path: &Path,
    overrides: &dyn TagValueSource,
) -> Result<u64, RewriteError> {
    let result = rewrite_inner(src, target_path, overrides);
    if result.is_err() {
        let _ = std::fs::remove_file(target_path);
    }
    result
}

fn rewrite_inner(
    src: impl std::io::Read,
    target_path: &Path,
    overrides: &dyn TagValueSource,
) -> Result<u64, RewriteError> {
    let mut object: FileDicomObject<InMemDicomObject<StandardDataDictionary>> =
        FileDicomObject::from_reader(src).map_err(map_read_error)?;

    // Bulk data elements are spooled to a sidecar file for the duration of
    // the rewrite so a large Pixel Data value is not held twice: once in
    // the parsed object and once in the eventual output buffer.
    let mut sidecar: Option<NamedTempFile> = None;
    if let Ok(elem) = object.element(PIXEL_DATA) {
        let too_big = (elem.value().length().0 as usize) > BULK_DATA_THRESHOLD;
        if too_big {
            let mut file = NamedTempFile::new().with_context(|_| IoSnafu {
                path: target_path.display().to_string(),
            })?;
            if let Ok(bytes) = elem.value().to_bytes() {
                file.write_all(&bytes).with_context(|_| IoSnafu {
                    path: target_path.display().to_string(),
                })?;
            }
            sidecar = Some(file);
        }
    }

    for over in overrides.overrides() {
        let Some(value) = over.resolved() else {
            continue;
        };
        let vr = StandardDataDictionary
            .by_tag(over.tag)
            .map(|entry| entry.vr.relaxed())
            .unwrap_or(VR::UN);
        let element = DataElement::new(over.tag, vr, value.clone());
        object.put(element);
    }

    let file = std::fs::File::create(target_path).with_context(|_| IoSnafu {
        path: target_path.display().to_string(),
    })?;
    let mut writer = std::io::BufWriter::new(file);
    object.write_all(&mut writer).context(WriteSnafu)?;
    let bytes_written = writer.get_ref().metadata().map(|m| m.len()).unwrap_or(0);
    writer.flush().with_context(|_| IoSnafu {
        path: target_path.display().to_string(),
    })?;

    // The sidecar's data has already been folded back into `object` via
    // the original in-memory element; dropping it removes the temp file.
    drop(sidecar);

    Ok(bytes_written)
}

fn map_read_error(source: ReadError) -> RewriteError {
    match &source {
        ReadError::ReadUnrecognizedTransferSyntax { uid, .. } => RewriteError::UnsupportedTsuid {
            uid: uid.clone(),
        },
        ReadError::ReadUnsupportedTransferSyntax { uid, .. } => RewriteError::UnsupportedTsuid {
            uid: uid.to_string(),
        },
        _ => RewriteError::Parse { source },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dicom_core::dicom_value;
    use dicom_core::header::Tag;

    struct FixedOverrides(Vec<TagOverride>);

    impl TagValueSource for FixedOverrides {
        fn overrides(&self) -> Vec<TagOverride> {
            self.0
                .iter()
                .map(|o| TagOverride {
                    tag: o.tag,
                    patient_value: o.patient_value.clone(),
                    study_value: o.study_value.clone(),
                })
                .collect()
        }
    }

    #[test]
    fn patient_value_wins_over_study_value() {
        let tag = Tag(0x0010, 0x0010); // PatientName
        let over = TagOverride {
            tag,
            patient_value: Some(dicom_value!(Str, "Doe^Jane")),
            study_value: Some(dicom_value!(Str, "Doe^John")),
        };
        assert_eq!(over.resolved().unwrap().to_str(), "Doe^Jane");
    }

    #[test]
    fn falls_back_to_study_value_when_patient_value_absent() {
        let tag = Tag(0x0020, 0x000D); // StudyInstanceUID
        let over = TagOverride {
            tag,
            patient_value: None,
            study_value: Some(dicom_value!(Str, "1.2.3")),
        };
        assert_eq!(over.resolved().unwrap().to_str(), "1.2.3");
    }

    #[test]
    fn no_overrides_resolve_to_none() {
        let over = TagOverride {
            tag: Tag(0x0010, 0x0020),
            patient_value: None,
            study_value: None,
        };
        assert!(over.resolved().is_none());
    }
}
