#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Tag for extension-array storage: array representations that live outside
/// the native scalar layouts and carry their own missing-value sentinel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtensionKind {
    /// String array backed by a validity mask.
    Utf8,
    /// Nullable integer array (masked storage).
    Int64Masked,
    /// Timezone-aware datetime array; the only extension representation that
    /// supports two-dimensional blocks.
    DatetimeTz { tz: String },
    /// Sparse float storage. Concatenated through its own logic, never
    /// short-circuited as all-missing.
    Sparse,
}

impl ExtensionKind {
    /// The missing-value sentinel declared by this representation.
    #[must_use]
    pub fn na_value(&self) -> Scalar {
        match self {
            Self::Utf8 | Self::Int64Masked => Scalar::Null(NullKind::Na),
            Self::DatetimeTz { .. } => Scalar::Null(NullKind::NaT),
            Self::Sparse => Scalar::Null(NullKind::NaN),
        }
    }

    /// Whether arrays of this kind only exist in one dimension.
    #[must_use]
    pub fn is_one_dimensional(&self) -> bool {
        !matches!(self, Self::DatetimeTz { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DType {
    Bool,
    Int64,
    UInt64,
    Float64,
    /// Nanoseconds since the epoch, timezone-naive.
    Datetime64,
    /// Nanosecond durations.
    Timedelta64,
    /// Heterogeneous scalar storage; the universal fallback dtype.
    Object,
    /// Placeholder dtype carried by null-array proxies. Ignored when deriving
    /// an output dtype, never a valid output dtype itself.
    Void,
    Extension(ExtensionKind),
}

impl DType {
    #[must_use]
    pub fn is_extension(&self) -> bool {
        matches!(self, Self::Extension(_))
    }

    #[must_use]
    pub fn is_1d_only_extension(&self) -> bool {
        matches!(self, Self::Extension(kind) if kind.is_one_dimensional())
    }

    /// Native temporal storage: dtypes whose missing marker must be encoded
    /// as a whole-number sentinel inside the value lane.
    #[must_use]
    pub fn is_native_temporal(&self) -> bool {
        matches!(self, Self::Datetime64 | Self::Timedelta64)
    }

    /// Whether arrays of this dtype can represent a missing value in place.
    #[must_use]
    pub fn can_hold_na(&self) -> bool {
        !matches!(self, Self::Bool | Self::Int64 | Self::UInt64)
    }

    /// Integer / unsigned / boolean numeric kind family. Masked integers
    /// report the same kind as their native counterpart.
    #[must_use]
    pub fn is_integer_bool_kind(&self) -> bool {
        matches!(
            self,
            Self::Bool | Self::Int64 | Self::UInt64 | Self::Extension(ExtensionKind::Int64Masked)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NullKind {
    /// Explicit null token.
    Null,
    /// Generic masked-NA token used by extension storage.
    Na,
    NaN,
    NaT,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Scalar {
    Null(NullKind),
    Bool(bool),
    Int64(i64),
    UInt64(u64),
    Float64(f64),
    Utf8(String),
    /// Nanoseconds since the epoch.
    Datetime64(i64),
    /// Nanosecond duration.
    Timedelta64(i64),
}

impl Scalar {
    #[must_use]
    pub fn is_missing(&self) -> bool {
        match self {
            Self::Null(_) => true,
            Self::Float64(v) => v.is_nan(),
            _ => false,
        }
    }

    #[must_use]
    pub fn missing_for_dtype(dtype: &DType) -> Self {
        match dtype {
            DType::Float64 | DType::Object => Self::Null(NullKind::NaN),
            DType::Datetime64 | DType::Timedelta64 => Self::Null(NullKind::NaT),
            DType::Extension(kind) => kind.na_value(),
            DType::Bool | DType::Int64 | DType::UInt64 | DType::Void => Self::Null(NullKind::Null),
        }
    }

    #[must_use]
    pub fn semantic_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Float64(a), Self::Float64(b)) => (a.is_nan() && b.is_nan()) || (a == b),
            (Self::Null(NullKind::NaN), Self::Float64(v))
            | (Self::Float64(v), Self::Null(NullKind::NaN)) => v.is_nan(),
            _ => self == other,
        }
    }

    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null(_) => "null",
            Self::Bool(_) => "bool",
            Self::Int64(_) => "int64",
            Self::UInt64(_) => "uint64",
            Self::Float64(_) => "float64",
            Self::Utf8(_) => "utf8",
            Self::Datetime64(_) => "datetime64",
            Self::Timedelta64(_) => "timedelta64",
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TypeError {
    #[error("no common dtype can be derived from an empty dtype list")]
    EmptyDtypeList,
    #[error("cannot cast {value} scalar to {to:?}")]
    InvalidCast { value: &'static str, to: DType },
    #[error("cannot cast float {value} to an integer dtype without loss")]
    LossyFloatToInt { value: f64 },
    #[error("integer {value} does not fit the target dtype {to:?}")]
    IntegerOverflow { value: i128, to: DType },
}

/// The promotion service. Passed explicitly into every consumer instead of
/// living in ambient lookup tables, so dtype dispatch stays a pure function
/// of its inputs.
#[derive(Debug, Clone, Copy, Default)]
pub struct Promoter;

impl Promoter {
    /// The smallest dtype able to represent every input dtype losslessly.
    /// Falls back to `Object` when no narrower representation exists.
    pub fn common_type(&self, dtypes: &[DType]) -> Result<DType, TypeError> {
        let mut iter = dtypes.iter();
        let first = iter.next().ok_or(TypeError::EmptyDtypeList)?.clone();
        Ok(iter.fold(first, |acc, next| self.common_pair(acc, next.clone())))
    }

    fn common_pair(&self, left: DType, right: DType) -> DType {
        use DType::{Bool, Float64, Int64, Object, UInt64, Void};
        use ExtensionKind::{Int64Masked, Sparse};

        if left == right {
            return left;
        }

        match (left, right) {
            (Void, other) | (other, Void) => other,
            // Native bools never promote into numeric dtypes.
            (Bool, Int64 | UInt64 | Float64) | (Int64 | UInt64 | Float64, Bool) => Object,
            // Signed/unsigned mixes have no common integer representation.
            (Int64, UInt64) | (UInt64, Int64) => Float64,
            (Int64 | UInt64, Float64) | (Float64, Int64 | UInt64) => Float64,
            (DType::Extension(Int64Masked), Bool | Int64 | UInt64)
            | (Bool | Int64 | UInt64, DType::Extension(Int64Masked)) => {
                DType::Extension(Int64Masked)
            }
            (DType::Extension(Int64Masked), Float64) | (Float64, DType::Extension(Int64Masked)) => {
                Float64
            }
            (DType::Extension(Sparse), other) | (other, DType::Extension(Sparse)) => {
                self.common_pair(Float64, other)
            }
            _ => Object,
        }
    }

    /// Result dtype for stacking native numeric arrays, the way raw array
    /// concatenation resolves it: bools take the other operand's dtype,
    /// signed/unsigned mixes widen to float. Off the native numeric set this
    /// falls back to the common-type lattice.
    #[must_use]
    pub fn native_numeric_result(&self, left: &DType, right: &DType) -> DType {
        use DType::{Bool, Float64, Int64, UInt64};

        let native = |dtype: &DType| matches!(dtype, Bool | Int64 | UInt64 | Float64);
        if !native(left) || !native(right) {
            return self.common_pair(left.clone(), right.clone());
        }
        match (left, right) {
            _ if left == right => left.clone(),
            (Bool, other) | (other, Bool) => other.clone(),
            _ => Float64,
        }
    }

    /// Widen a dtype to one capable of holding a missing marker.
    #[must_use]
    pub fn ensure_can_hold_na(&self, dtype: DType) -> DType {
        match dtype {
            DType::Bool => DType::Object,
            DType::Int64 | DType::UInt64 => DType::Float64,
            other => other,
        }
    }
}

/// Per-scalar compatibility of a missing marker with a target dtype. This is
/// the scalar-level check; join units layer a stricter block-level check on
/// top of it.
#[must_use]
pub fn is_valid_na_for_dtype(value: &Scalar, dtype: &DType) -> bool {
    if !value.is_missing() {
        return false;
    }
    let kind = match value {
        Scalar::Null(kind) => *kind,
        // a raw float NaN carries NaN semantics
        _ => NullKind::NaN,
    };
    match dtype {
        DType::Datetime64
        | DType::Timedelta64
        | DType::Extension(ExtensionKind::DatetimeTz { .. }) => true,
        DType::Bool
        | DType::Int64
        | DType::UInt64
        | DType::Float64
        | DType::Extension(ExtensionKind::Int64Masked) => !matches!(kind, NullKind::NaT),
        DType::Extension(ExtensionKind::Utf8) => matches!(kind, NullKind::Null | NullKind::Na),
        DType::Object | DType::Void | DType::Extension(ExtensionKind::Sparse) => true,
    }
}

/// Cast a scalar to a target dtype, taking ownership to skip clones when the
/// value already has the right representation. Missing values are remapped to
/// the target's missing marker.
pub fn cast_scalar(value: Scalar, target: &DType) -> Result<Scalar, TypeError> {
    if matches!(value, Scalar::Null(_)) {
        return Ok(Scalar::missing_for_dtype(target));
    }

    match (target, value) {
        (DType::Object, value) => Ok(value),
        (DType::Bool, Scalar::Bool(v)) => Ok(Scalar::Bool(v)),
        (DType::Int64 | DType::Extension(ExtensionKind::Int64Masked), value) => match value {
            Scalar::Int64(v) => Ok(Scalar::Int64(v)),
            Scalar::Bool(v) => Ok(Scalar::Int64(i64::from(v))),
            Scalar::UInt64(v) => i64::try_from(v).map(Scalar::Int64).map_err(|_| {
                TypeError::IntegerOverflow {
                    value: i128::from(v),
                    to: target.clone(),
                }
            }),
            Scalar::Float64(v) => {
                if !v.is_finite() || v != v.trunc() || v < i64::MIN as f64 || v > i64::MAX as f64 {
                    return Err(TypeError::LossyFloatToInt { value: v });
                }
                Ok(Scalar::Int64(v as i64))
            }
            other => Err(TypeError::InvalidCast {
                value: other.type_name(),
                to: target.clone(),
            }),
        },
        (DType::UInt64, value) => match value {
            Scalar::UInt64(v) => Ok(Scalar::UInt64(v)),
            Scalar::Bool(v) => Ok(Scalar::UInt64(u64::from(v))),
            Scalar::Int64(v) => u64::try_from(v).map(Scalar::UInt64).map_err(|_| {
                TypeError::IntegerOverflow {
                    value: i128::from(v),
                    to: DType::UInt64,
                }
            }),
            other => Err(TypeError::InvalidCast {
                value: other.type_name(),
                to: DType::UInt64,
            }),
        },
        (DType::Float64 | DType::Extension(ExtensionKind::Sparse), value) => match value {
            Scalar::Float64(v) => Ok(Scalar::Float64(v)),
            Scalar::Int64(v) => Ok(Scalar::Float64(v as f64)),
            Scalar::UInt64(v) => Ok(Scalar::Float64(v as f64)),
            Scalar::Bool(v) => Ok(Scalar::Float64(if v { 1.0 } else { 0.0 })),
            other => Err(TypeError::InvalidCast {
                value: other.type_name(),
                to: target.clone(),
            }),
        },
        (
            DType::Datetime64 | DType::Extension(ExtensionKind::DatetimeTz { .. }),
            Scalar::Datetime64(v),
        ) => Ok(Scalar::Datetime64(v)),
        (DType::Timedelta64, Scalar::Timedelta64(v)) => Ok(Scalar::Timedelta64(v)),
        (DType::Extension(ExtensionKind::Utf8), Scalar::Utf8(v)) => Ok(Scalar::Utf8(v)),
        (target, value) => Err(TypeError::InvalidCast {
            value: value.type_name(),
            to: target.clone(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::{
        DType, ExtensionKind, NullKind, Promoter, Scalar, TypeError, cast_scalar,
        is_valid_na_for_dtype,
    };

    #[test]
    fn identical_dtypes_need_no_promotion() {
        let promoter = Promoter;
        let out = promoter
            .common_type(&[DType::Int64, DType::Int64])
            .expect("common type");
        assert_eq!(out, DType::Int64);
    }

    #[test]
    fn numeric_ladder_widens_to_float() {
        let promoter = Promoter;
        assert_eq!(
            promoter
                .common_type(&[DType::Int64, DType::Float64])
                .expect("common"),
            DType::Float64
        );
        assert_eq!(
            promoter
                .common_type(&[DType::Int64, DType::UInt64])
                .expect("common"),
            DType::Float64
        );
    }

    #[test]
    fn bools_never_mix_numerically_in_the_common_lattice() {
        let promoter = Promoter;
        assert_eq!(
            promoter
                .common_type(&[DType::Bool, DType::Int64])
                .expect("common"),
            DType::Object
        );
        assert_eq!(
            promoter
                .common_type(&[DType::Float64, DType::Bool])
                .expect("common"),
            DType::Object
        );
        assert_eq!(
            promoter
                .common_type(&[DType::Bool, DType::Bool])
                .expect("common"),
            DType::Bool
        );
    }

    #[test]
    fn native_stacking_lets_bools_join_the_numeric_family() {
        let promoter = Promoter;
        assert_eq!(
            promoter.native_numeric_result(&DType::Bool, &DType::Int64),
            DType::Int64
        );
        assert_eq!(
            promoter.native_numeric_result(&DType::Float64, &DType::Bool),
            DType::Float64
        );
        assert_eq!(
            promoter.native_numeric_result(&DType::Int64, &DType::UInt64),
            DType::Float64
        );
        assert_eq!(
            promoter.native_numeric_result(&DType::Bool, &DType::Object),
            DType::Object
        );
    }

    #[test]
    fn masked_int_absorbs_native_integers() {
        let promoter = Promoter;
        let masked = DType::Extension(ExtensionKind::Int64Masked);
        assert_eq!(
            promoter
                .common_type(&[masked.clone(), DType::Int64])
                .expect("common"),
            masked
        );
        assert_eq!(
            promoter
                .common_type(&[masked, DType::Float64])
                .expect("common"),
            DType::Float64
        );
    }

    #[test]
    fn temporal_kind_mismatch_falls_back_to_object() {
        let promoter = Promoter;
        assert_eq!(
            promoter
                .common_type(&[DType::Datetime64, DType::Timedelta64])
                .expect("common"),
            DType::Object
        );
        let tz = DType::Extension(ExtensionKind::DatetimeTz {
            tz: "UTC".to_owned(),
        });
        assert_eq!(
            promoter
                .common_type(&[DType::Datetime64, tz])
                .expect("common"),
            DType::Object
        );
    }

    #[test]
    fn empty_dtype_list_is_rejected() {
        let err = Promoter.common_type(&[]).expect_err("must fail");
        assert_eq!(err, TypeError::EmptyDtypeList);
    }

    #[test]
    fn na_widening_targets() {
        let promoter = Promoter;
        assert_eq!(promoter.ensure_can_hold_na(DType::Int64), DType::Float64);
        assert_eq!(promoter.ensure_can_hold_na(DType::Bool), DType::Object);
        assert_eq!(
            promoter.ensure_can_hold_na(DType::Datetime64),
            DType::Datetime64
        );
        assert_eq!(
            promoter.ensure_can_hold_na(DType::Extension(ExtensionKind::Utf8)),
            DType::Extension(ExtensionKind::Utf8)
        );
    }

    #[test]
    fn nat_is_not_a_valid_na_for_numeric_targets() {
        let nat = Scalar::Null(NullKind::NaT);
        assert!(!is_valid_na_for_dtype(&nat, &DType::Int64));
        assert!(!is_valid_na_for_dtype(&nat, &DType::Float64));
        assert!(is_valid_na_for_dtype(&nat, &DType::Datetime64));
        assert!(is_valid_na_for_dtype(&nat, &DType::Object));
    }

    #[test]
    fn float_nan_is_not_a_valid_na_for_strings() {
        let nan = Scalar::Float64(f64::NAN);
        assert!(!is_valid_na_for_dtype(
            &nan,
            &DType::Extension(ExtensionKind::Utf8)
        ));
        assert!(is_valid_na_for_dtype(&nan, &DType::Float64));
        assert!(is_valid_na_for_dtype(
            &Scalar::Null(NullKind::Null),
            &DType::Extension(ExtensionKind::Utf8)
        ));
    }

    #[test]
    fn non_missing_values_are_never_valid_na() {
        assert!(!is_valid_na_for_dtype(&Scalar::Int64(0), &DType::Float64));
        assert!(!is_valid_na_for_dtype(&Scalar::Bool(false), &DType::Object));
    }

    #[test]
    fn missing_values_remap_to_target_marker() {
        let cast = cast_scalar(Scalar::Null(NullKind::Null), &DType::Float64).expect("cast");
        assert_eq!(cast, Scalar::Null(NullKind::NaN));
        let cast = cast_scalar(Scalar::Null(NullKind::NaN), &DType::Datetime64).expect("cast");
        assert_eq!(cast, Scalar::Null(NullKind::NaT));
    }

    #[test]
    fn object_cast_is_identity() {
        let cast = cast_scalar(Scalar::Datetime64(42), &DType::Object).expect("cast");
        assert_eq!(cast, Scalar::Datetime64(42));
    }

    #[test]
    fn string_to_integer_cast_fails() {
        let err =
            cast_scalar(Scalar::Utf8("x".to_owned()), &DType::Int64).expect_err("must fail");
        assert_eq!(
            err.to_string(),
            "cannot cast utf8 scalar to Int64"
        );
    }

    #[test]
    fn semantic_eq_treats_nan_markers_as_equal() {
        assert!(Scalar::Float64(f64::NAN).semantic_eq(&Scalar::Null(NullKind::NaN)));
        assert!(!Scalar::Float64(1.0).semantic_eq(&Scalar::Float64(2.0)));
    }

    #[test]
    fn dtype_round_trips_through_serde() {
        let dtype = DType::Extension(ExtensionKind::DatetimeTz {
            tz: "Europe/Kyiv".to_owned(),
        });
        let encoded = serde_json::to_string(&dtype).expect("encode");
        let decoded: DType = serde_json::from_str(&encoded).expect("decode");
        assert_eq!(dtype, decoded);
    }
}
