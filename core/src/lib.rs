#![crate_type = "lib"]
#![deny(
    trivial_casts,
    trivial_numeric_casts,
    unsafe_code,
    unstable_features
)]
#![warn(
    missing_debug_implementations,
    missing_docs,
    unused_qualifications,
    unused_import_braces
)]
#![recursion_limit = "60"]

//! This is the core DICOM library, containing various concepts, data structures
//! and traits specific to DICOM content.
//!

extern crate chrono;
extern crate itertools;
#[macro_use]
extern crate quick_error;
extern crate smallvec;

pub mod dictionary;
pub mod error;
pub mod header;
pub mod value;

pub use dictionary::DataDictionary;
pub use error::{Error, Result};
pub use header::{DataElement, DataElementHeader, Length, Tag, VR};
pub use value::{PrimitiveValue, Value as DicomValue};

mod util;

/// Construct a [`PrimitiveValue`] from one or more explicit elements,
/// converting each one along the way.
///
/// This is a convenience macro covering the inner type conversions that
/// [`PrimitiveValue`]'s `From` impls don't, such as building a sequence of
/// strings out of string slices.
///
/// # Examples
///
/// ```
/// # use dicom_core::dicom_value;
/// # use dicom_core::PrimitiveValue;
/// let value = dicom_value!(Strs, ["Smith^John"]);
/// assert_eq!(value, PrimitiveValue::Strs(["Smith^John".to_string()].into()));
///
/// let value = dicom_value!(Str, "Smith^John");
/// assert_eq!(value, PrimitiveValue::Str("Smith^John".to_string()));
///
/// let value = dicom_value!(I32, [1, 2, 5]);
/// assert_eq!(value, PrimitiveValue::I32([1, 2, 5].into()));
/// ```
#[macro_export]
macro_rules! dicom_value {
    (Strs, [$($elem: expr),* $(,)?]) => {
        $crate::PrimitiveValue::Strs(
            $crate::value::C::from_vec(vec![$($elem.to_string(),)*])
        )
    };
    (Str, $elem: expr) => {
        $crate::PrimitiveValue::Str($elem.to_string())
    };
    (Tags, [$($elem: expr),* $(,)?]) => {
        $crate::PrimitiveValue::Tags(
            $crate::value::C::from_vec(vec![$($elem,)*])
        )
    };
    (Bytes, $elem: expr) => {
        $crate::PrimitiveValue::U8(
            $crate::value::C::from_slice($elem)
        )
    };
    (Date, $elem: expr) => {
        $crate::PrimitiveValue::Date(
            $crate::value::C::from_elem($elem, 1)
        )
    };
    (Date, [$($elem: expr),* $(,)?]) => {
        $crate::PrimitiveValue::Date(
            $crate::value::C::from_vec(vec![$($elem,)*])
        )
    };
    (DateTime, $elem: expr) => {
        $crate::PrimitiveValue::DateTime(
            $crate::value::C::from_elem($elem, 1)
        )
    };
    (DateTime, [$($elem: expr),* $(,)?]) => {
        $crate::PrimitiveValue::DateTime(
            $crate::value::C::from_vec(vec![$($elem,)*])
        )
    };
    (Time, $elem: expr) => {
        $crate::PrimitiveValue::Time(
            $crate::value::C::from_elem($elem, 1)
        )
    };
    (Time, [$($elem: expr),* $(,)?]) => {
        $crate::PrimitiveValue::Time(
            $crate::value::C::from_vec(vec![$($elem,)*])
        )
    };
    ($variant: ident, [$($elem: expr),* $(,)?]) => {
        $crate::PrimitiveValue::$variant(
            $crate::value::C::from_vec(vec![$($elem,)*])
        )
    };
}
