//! Attribute tables for the basic confidentiality profile
//!
//! Only the attributes the profile acts on, plus the sequences and image
//! attributes needed to walk and describe implicit VR datasets.

use super::codec::{Tag, Vr};
use crate::domain::PhiCategory;

pub const MEDIA_STORAGE_SOP_INSTANCE_UID: Tag = Tag(0x0002, 0x0003);
pub const TRANSFER_SYNTAX_UID: Tag = Tag(0x0002, 0x0010);
pub const SOP_CLASS_UID: Tag = Tag(0x0008, 0x0016);
pub const SOP_INSTANCE_UID: Tag = Tag(0x0008, 0x0018);
pub const MODALITY: Tag = Tag(0x0008, 0x0060);
pub const MANUFACTURER: Tag = Tag(0x0008, 0x0070);
pub const STUDY_INSTANCE_UID: Tag = Tag(0x0020, 0x000D);
pub const SERIES_INSTANCE_UID: Tag = Tag(0x0020, 0x000E);
pub const PATIENT_IDENTITY_REMOVED: Tag = Tag(0x0012, 0x0062);
pub const DEIDENTIFICATION_METHOD: Tag = Tag(0x0012, 0x0063);
pub const NUMBER_OF_FRAMES: Tag = Tag(0x0028, 0x0008);
pub const ROWS: Tag = Tag(0x0028, 0x0010);
pub const COLUMNS: Tag = Tag(0x0028, 0x0011);
pub const PIXEL_DATA: Tag = Tag(0x7FE0, 0x0010);

/// VL Whole Slide Microscopy Image Storage
pub const WSI_SOP_CLASS_UID: &str = "1.2.840.10008.5.1.4.1.1.77.1.6";

/// Root of remapped identifiers
pub const UID_ROOT: &str = "1.2.826.0.1.3680043.10.1118.";

pub const DA_SENTINEL: &str = "19000101";
pub const TM_SENTINEL: &str = "000000";
pub const DT_SENTINEL: &str = "19000101000000";

/// Written to (0012,0063) after redaction
pub const DEIDENTIFICATION_METHOD_TEXT: &str = "slidescrub basic confidentiality profile";

/// Kept with an empty or sentinel value
pub const BLANK: [(Tag, &str, Vr); 25] = [
    (Tag(0x0010, 0x0010), "PatientName", Vr::PN),
    (Tag(0x0010, 0x0020), "PatientID", Vr::LO),
    (Tag(0x0010, 0x0030), "PatientBirthDate", Vr::DA),
    (Tag(0x0010, 0x0032), "PatientBirthTime", Vr::TM),
    (Tag(0x0010, 0x0040), "PatientSex", Vr::CS),
    (Tag(0x0010, 0x1010), "PatientAge", Vr::AS),
    (Tag(0x0010, 0x1020), "PatientSize", Vr::DS),
    (Tag(0x0010, 0x1030), "PatientWeight", Vr::DS),
    (Tag(0x0008, 0x0050), "AccessionNumber", Vr::SH),
    (Tag(0x0020, 0x0010), "StudyID", Vr::SH),
    (Tag(0x0008, 0x0020), "StudyDate", Vr::DA),
    (Tag(0x0008, 0x0030), "StudyTime", Vr::TM),
    (Tag(0x0008, 0x1030), "StudyDescription", Vr::LO),
    (Tag(0x0008, 0x0080), "InstitutionName", Vr::LO),
    (Tag(0x0008, 0x0090), "ReferringPhysicianName", Vr::PN),
    (Tag(0x0008, 0x0021), "SeriesDate", Vr::DA),
    (Tag(0x0008, 0x0031), "SeriesTime", Vr::TM),
    (Tag(0x0008, 0x103E), "SeriesDescription", Vr::LO),
    (Tag(0x0008, 0x1070), "OperatorsName", Vr::PN),
    (Tag(0x0020, 0x0011), "SeriesNumber", Vr::IS),
    (Tag(0x0008, 0x0023), "ContentDate", Vr::DA),
    (Tag(0x0008, 0x0033), "ContentTime", Vr::TM),
    (Tag(0x0008, 0x0022), "AcquisitionDate", Vr::DA),
    (Tag(0x0008, 0x0032), "AcquisitionTime", Vr::TM),
    (Tag(0x0008, 0x002A), "AcquisitionDateTime", Vr::DT),
];

/// Removed from the top-level dataset
pub const DELETE: [(Tag, &str, Vr); 38] = [
    (Tag(0x0010, 0x1000), "OtherPatientIDs", Vr::LO),
    (Tag(0x0010, 0x1001), "OtherPatientNames", Vr::PN),
    (Tag(0x0010, 0x1002), "OtherPatientIDsSequence", Vr::SQ),
    (Tag(0x0010, 0x1040), "PatientAddress", Vr::LO),
    (Tag(0x0010, 0x2154), "PatientTelephoneNumbers", Vr::SH),
    (Tag(0x0010, 0x1060), "PatientMotherBirthName", Vr::PN),
    (Tag(0x0010, 0x2110), "Allergies", Vr::LO),
    (Tag(0x0010, 0x21B0), "AdditionalPatientHistory", Vr::LT),
    (Tag(0x0010, 0x4000), "PatientComments", Vr::LT),
    (Tag(0x0010, 0x2160), "EthnicGroup", Vr::SH),
    (Tag(0x0010, 0x0050), "PatientInsurancePlanCodeSequence", Vr::SQ),
    (Tag(0x0010, 0x21F0), "PatientReligiousPreference", Vr::LO),
    (Tag(0x0008, 0x0081), "InstitutionAddress", Vr::ST),
    (Tag(0x0008, 0x0082), "InstitutionCodeSequence", Vr::SQ),
    (Tag(0x0008, 0x1040), "InstitutionalDepartmentName", Vr::LO),
    (Tag(0x0008, 0x1010), "StationName", Vr::SH),
    (Tag(0x0008, 0x1048), "PhysiciansOfRecord", Vr::PN),
    (Tag(0x0008, 0x1049), "PhysiciansOfRecordIdentificationSequence", Vr::SQ),
    (Tag(0x0008, 0x1050), "PerformingPhysicianName", Vr::PN),
    (Tag(0x0008, 0x1052), "PerformingPhysicianIdentificationSequence", Vr::SQ),
    (Tag(0x0008, 0x1060), "NameOfPhysiciansReadingStudy", Vr::PN),
    (Tag(0x0008, 0x1062), "PhysiciansReadingStudyIdentificationSequence", Vr::SQ),
    (Tag(0x0032, 0x1032), "RequestingPhysician", Vr::PN),
    (Tag(0x0032, 0x1033), "RequestingService", Vr::LO),
    (Tag(0x0008, 0x0092), "ReferringPhysicianAddress", Vr::ST),
    (Tag(0x0008, 0x0094), "ReferringPhysicianTelephoneNumbers", Vr::SH),
    (Tag(0x0008, 0x0096), "ReferringPhysicianIdentificationSequence", Vr::SQ),
    (Tag(0x0008, 0x1032), "ProcedureCodeSequence", Vr::SQ),
    (Tag(0x0032, 0x1060), "RequestedProcedureDescription", Vr::LO),
    (Tag(0x0040, 0x0275), "RequestAttributesSequence", Vr::SQ),
    (Tag(0x0040, 0x1001), "RequestedProcedureID", Vr::SH),
    (Tag(0x0040, 0xA730), "ContentSequence", Vr::SQ),
    (Tag(0x0020, 0x4000), "ImageComments", Vr::LT),
    (Tag(0x0008, 0x4000), "IdentifyingComments", Vr::LT),
    (Tag(0x0038, 0x0010), "AdmissionID", Vr::LO),
    (Tag(0x0038, 0x0500), "PatientState", Vr::LO),
    (Tag(0x0040, 0x2016), "PlacerOrderNumberImagingServiceRequest", Vr::LO),
    (Tag(0x0040, 0x2017), "FillerOrderNumberImagingServiceRequest", Vr::LO),
];

/// Identifiers replaced by a keyed remap
pub const REMAP: [(Tag, &str, Vr); 4] = [
    (MEDIA_STORAGE_SOP_INSTANCE_UID, "MediaStorageSOPInstanceUID", Vr::UI),
    (SOP_INSTANCE_UID, "SOPInstanceUID", Vr::UI),
    (STUDY_INSTANCE_UID, "StudyInstanceUID", Vr::UI),
    (SERIES_INSTANCE_UID, "SeriesInstanceUID", Vr::UI),
];

/// Blanked wherever they appear inside sequence items
pub const NESTED_BLANK: [Tag; 8] = [
    Tag(0x0010, 0x0010),
    Tag(0x0010, 0x0020),
    Tag(0x0008, 0x0080),
    Tag(0x0008, 0x0090),
    Tag(0x0008, 0x1050),
    Tag(0x0008, 0x1070),
    Tag(0x0040, 0xA123),
    Tag(0x0008, 0x0081),
];

/// Attributes outside the profile tables that implicit VR parsing and
/// `info` need to know about
const OTHER: [(Tag, &str, Vr); 25] = [
    (TRANSFER_SYNTAX_UID, "TransferSyntaxUID", Vr::UI),
    (SOP_CLASS_UID, "SOPClassUID", Vr::UI),
    (MODALITY, "Modality", Vr::CS),
    (MANUFACTURER, "Manufacturer", Vr::LO),
    (PATIENT_IDENTITY_REMOVED, "PatientIdentityRemoved", Vr::CS),
    (DEIDENTIFICATION_METHOD, "DeidentificationMethod", Vr::LO),
    (NUMBER_OF_FRAMES, "NumberOfFrames", Vr::IS),
    (ROWS, "Rows", Vr::US),
    (COLUMNS, "Columns", Vr::US),
    (PIXEL_DATA, "PixelData", Vr::OB),
    (Tag(0x0008, 0x0008), "ImageType", Vr::CS),
    (Tag(0x0040, 0xA123), "PersonName", Vr::PN),
    (Tag(0x0008, 0x1115), "ReferencedSeriesSequence", Vr::SQ),
    (Tag(0x0008, 0x1120), "ReferencedPatientSequence", Vr::SQ),
    (Tag(0x0008, 0x1140), "ReferencedImageSequence", Vr::SQ),
    (Tag(0x0008, 0x2218), "AnatomicRegionSequence", Vr::SQ),
    (Tag(0x0040, 0x0260), "PerformedProtocolCodeSequence", Vr::SQ),
    (Tag(0x0040, 0x0555), "AcquisitionContextSequence", Vr::SQ),
    (Tag(0x0040, 0x0560), "SpecimenDescriptionSequence", Vr::SQ),
    (Tag(0x0040, 0x0610), "SpecimenPreparationSequence", Vr::SQ),
    (Tag(0x0048, 0x0008), "TotalPixelMatrixOriginSequence", Vr::SQ),
    (Tag(0x0048, 0x0105), "OpticalPathSequence", Vr::SQ),
    (Tag(0x0040, 0xA043), "ConceptNameCodeSequence", Vr::SQ),
    (Tag(0x5200, 0x9229), "SharedFunctionalGroupsSequence", Vr::SQ),
    (Tag(0x5200, 0x9230), "PerFrameFunctionalGroupsSequence", Vr::SQ),
];

fn lookup(tag: Tag) -> Option<(&'static str, Vr)> {
    BLANK
        .iter()
        .chain(DELETE.iter())
        .chain(REMAP.iter())
        .chain(OTHER.iter())
        .find(|(t, _, _)| *t == tag)
        .map(|(_, name, vr)| (*name, *vr))
}

/// Attribute keyword, or the tag itself for unknown attributes
pub fn keyword(tag: Tag) -> String {
    lookup(tag).map_or_else(|| tag.to_string(), |(name, _)| name.to_string())
}

/// VR used when the transfer syntax does not encode one
pub fn implicit_vr(tag: Tag) -> Vr {
    if tag.1 == 0x0000 {
        return Vr::UL;
    }
    lookup(tag).map_or(Vr::UN, |(_, vr)| vr)
}

pub fn is_blank(tag: Tag) -> bool {
    BLANK.iter().any(|(t, _, _)| *t == tag)
}

pub fn is_delete(tag: Tag) -> bool {
    DELETE.iter().any(|(t, _, _)| *t == tag)
}

pub fn is_remap(tag: Tag) -> bool {
    REMAP.iter().any(|(t, _, _)| *t == tag)
}

/// Category of an identifying attribute
pub fn category(tag: Tag, vr: Vr) -> PhiCategory {
    match (tag, vr) {
        (Tag(0x0010, 0x0030), _) | (Tag(0x0010, 0x0032), _) => PhiCategory::DateOfBirth,
        (_, Vr::DA | Vr::TM | Vr::DT) => PhiCategory::Date,
        (_, Vr::PN) => PhiCategory::PersonName,
        (_, Vr::UI) => PhiCategory::UniqueIdentifier,
        (Tag(0x0010, 0x0020), _) | (Tag(0x0010, 0x1000), _) | (Tag(0x0010, 0x1002), _) => {
            PhiCategory::MedicalRecordNumber
        }
        (Tag(0x0008, 0x0050), _)
        | (Tag(0x0020, 0x0010), _)
        | (Tag(0x0040, 0x1001), _)
        | (Tag(0x0038, 0x0010), _)
        | (Tag(0x0040, 0x2016), _)
        | (Tag(0x0040, 0x2017), _) => PhiCategory::CaseNumber,
        (Tag(0x0008, 0x0080), _) | (Tag(0x0008, 0x0082), _) | (Tag(0x0008, 0x1040), _) => {
            PhiCategory::Institution
        }
        (Tag(0x0010, 0x1040), _) | (Tag(0x0008, 0x0081), _) | (Tag(0x0008, 0x0092), _) => {
            PhiCategory::Location
        }
        (Tag(0x0008, 0x1010), _) => PhiCategory::DeviceIdentifier,
        _ => PhiCategory::FreeText,
    }
}

/// Replacement text for a blanked value
pub fn blank_value(vr: Vr) -> &'static str {
    match vr {
        Vr::DA => DA_SENTINEL,
        Vr::TM => TM_SENTINEL,
        Vr::DT => DT_SENTINEL,
        _ => "",
    }
}

/// Whether a text value is already empty or carries its sentinel
///
/// A person name made only of component separators is empty.
pub fn is_anonymized(value: &str, vr: Vr) -> bool {
    let value = value.trim();
    if value.is_empty() || value.bytes().all(|b| b == b'X') {
        return true;
    }
    match vr {
        Vr::DA => value == DA_SENTINEL,
        Vr::TM => value == TM_SENTINEL,
        Vr::DT => value == DT_SENTINEL,
        Vr::PN => value.bytes().all(|b| b == b'^' || b == b'='),
        _ => false,
    }
}
