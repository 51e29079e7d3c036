#![forbid(unsafe_code)]

//! Umbrella crate re-exporting the blockcat public surface.
//!
//! The pieces live in focused member crates: `bc-types` (scalars, dtypes,
//! promotion), `bc-index` (axis labels), `bc-columnar` (arrays, blocks,
//! managers), and `bc-concat` (the concatenation engine).

pub use bc_columnar::{
    Array, Block, BlockManager, BlockPlacement, ColumnarError, NullArrayProxy, concat_compat,
    ensure_block_shape, make_na_array, native_concat,
};
pub use bc_concat::{
    AxisIndexers, ConcatAxis, ConcatError, CopyPolicy, JoinUnit, OutputAxes, align_for_row_concat,
    combined_plan, concatenate_managers, dtype_to_na_value, is_uniform_join_units, unified_dtype,
};
pub use bc_index::{Index, IndexLabel, append_indexes, union_indexes};
pub use bc_types::{
    DType, ExtensionKind, NullKind, Promoter, Scalar, TypeError, cast_scalar,
    is_valid_na_for_dtype,
};
