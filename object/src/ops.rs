//! Baseline attribute operation implementations.
//!
//! See the [`dicom_core::ops`] module
//! for more information.

use dicom_core::Tag;
use dicom_core::ops::{ApplyOp, AttributeOp, AttributeSelector, AttributeSelectorStep};
use dicom_core::value::{ModifyValueError, ValueType};
use snafu::Snafu;

use crate::FileDicomObject;

/// An error which may occur when applying an attribute operation to an object.
#[derive(Debug, Snafu)]
#[non_exhaustive]
#[snafu(visibility(pub(crate)))]
pub enum ApplyError {
    /// Missing itermediate sequence for {selector} at step {step_index}
    MissingSequence {
        selector: AttributeSelector,
        step_index: u32,
    },
    /// Step {step_index} for {selector} is not a data set sequence 
    NotASequence {
        selector: AttributeSelector,
        step_index: u32,
    },
    /// Incompatible source element type {kind:?} for extension
    IncompatibleTypes {
        /// the source element value type
        kind: ValueType,
    },
    /// Illegal removal of mandatory attribute
    Mandatory,
    /// Could not modify source element type through extension
    Modify { source: ModifyValueError },
    /// Illegal extension of fixed cardinality attribute
    IllegalExtend,
    /// Unsupported action
    UnsupportedAction,
    /// Unsupported attribute insertion
    UnsupportedAttribute,
}

/// Result type for when applying attribute operations to an object.
pub type ApplyResult<T = (), E = ApplyError> = std::result::Result<T, E>;

impl<T> ApplyOp for FileDicomObject<T>
where
    T: ApplyOp<Err = ApplyError>,
{
    type Err = ApplyError;

    /// Apply the given attribute operation on this object.
    ///
    /// The operation is delegated to the file meta table
    /// if the selector root tag is in group `0002`,
    /// and to the underlying object otherwise.
    ///
    /// See the [`dicom_core::ops`] module
    /// for more information.
    fn apply(&mut self, op: AttributeOp) -> ApplyResult {
        if let AttributeSelectorStep::Tag(Tag(0x0002, _)) = op.selector.first_step() {
            self.meta.apply(op)
        } else {
            self.obj.apply(op)
        }
    }
}
