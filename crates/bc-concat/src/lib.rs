#![forbid(unsafe_code)]

//! Concatenation of block managers along either axis.
//!
//! Column-axis concatenation restacks whole blocks side by side with
//! recomputed placements and performs no type reconciliation. Row-axis
//! concatenation aligns every manager to a shared column axis (absent labels
//! become null-array proxies), partitions the column range into runs backed
//! by one block per manager, derives one output dtype per run, and assembles
//! the run's values into a single output block.

use std::borrow::Cow;
use std::cell::OnceCell;

use bc_columnar::{
    Array, Block, BlockManager, BlockPlacement, ColumnarError, concat_compat, ensure_block_shape,
    make_na_array, native_concat,
};
use bc_index::{Index, append_indexes, union_indexes};
use bc_types::{DType, ExtensionKind, NullKind, Promoter, Scalar, TypeError, is_valid_na_for_dtype};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConcatError {
    #[error("cannot concatenate zero managers")]
    EmptyInput,
    #[error("no missing-value marker exists for dtype {dtype:?}")]
    UnsupportedTypeKind { dtype: DType },
    #[error("join unit holds {found} columns but its plan run covers {expected}")]
    ShapeMismatch { expected: usize, found: usize },
    #[error(transparent)]
    Columnar(#[from] ColumnarError),
    #[error(transparent)]
    Type(#[from] TypeError),
}

/// Which manager axis the concatenation runs along.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConcatAxis {
    /// Glue column sets side by side. Blocks are reused whole with offset
    /// placements; rows must already agree (or carry a row indexer).
    Columns,
    /// Stack rows. Columns are aligned to a shared axis and every output
    /// column group is re-derived through dtype unification.
    Rows,
}

/// Whether the output may share storage with the inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyPolicy {
    View,
    Copy,
}

/// Per-manager alignment indexers. `None` means the manager's axis already
/// matches the output axis. The concat axis itself never carries an indexer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AxisIndexers {
    pub columns: Option<Vec<Option<usize>>>,
    pub rows: Option<Vec<Option<usize>>>,
}

impl AxisIndexers {
    #[must_use]
    pub fn aligned() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_columns(indexer: Vec<Option<usize>>) -> Self {
        Self {
            columns: Some(indexer),
            rows: None,
        }
    }

    #[must_use]
    pub fn with_rows(indexer: Vec<Option<usize>>) -> Self {
        Self {
            columns: None,
            rows: Some(indexer),
        }
    }
}

/// The label axes of the concatenated output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputAxes {
    pub columns: Index,
    pub rows: Index,
}

/// Outer-union alignment for row-axis concatenation: the output column axis
/// is the first-seen union of the inputs' column labels, the row axis stacks
/// the inputs' row labels end to end, and each manager whose columns differ
/// from the union gets a column indexer.
#[must_use]
pub fn align_for_row_concat(mgrs: &[&BlockManager]) -> (OutputAxes, Vec<AxisIndexers>) {
    let column_axes: Vec<&Index> = mgrs.iter().map(|mgr| mgr.columns()).collect();
    let row_axes: Vec<&Index> = mgrs.iter().map(|mgr| mgr.rows()).collect();
    let columns = union_indexes(&column_axes);
    let rows = append_indexes(&row_axes);
    let indexers = mgrs
        .iter()
        .map(|mgr| {
            if mgr.columns() == &columns {
                AxisIndexers::aligned()
            } else {
                AxisIndexers::with_columns(mgr.columns().indexer_for(&columns))
            }
        })
        .collect();
    (OutputAxes { columns, rows }, indexers)
}

/// Concatenate block managers along `axis` into a manager with the given
/// output axes. Each source carries its own alignment indexers for the
/// non-concat axes.
pub fn concatenate_managers(
    sources: &[(BlockManager, AxisIndexers)],
    axes: &OutputAxes,
    axis: ConcatAxis,
    copy: CopyPolicy,
    promoter: &Promoter,
) -> Result<BlockManager, ConcatError> {
    if sources.is_empty() {
        return Err(ConcatError::EmptyInput);
    }
    match axis {
        ConcatAxis::Columns => concat_managers_columns(sources, axes, copy, promoter),
        ConcatAxis::Rows => concat_managers_rows(sources, axes, copy, promoter),
    }
}

fn concat_managers_columns(
    sources: &[(BlockManager, AxisIndexers)],
    axes: &OutputAxes,
    copy: CopyPolicy,
    promoter: &Promoter,
) -> Result<BlockManager, ConcatError> {
    let mut blocks = Vec::new();
    let mut offset = 0;
    for (mgr, indexers) in sources {
        debug_assert!(
            indexers.columns.is_none(),
            "the concat axis never carries an indexer"
        );
        // A freshly reindexed manager already owns its storage, so the copy
        // policy does not need to copy it again.
        let (mgr, made_copy) = match &indexers.rows {
            Some(indexer) => (Cow::Owned(mgr.take_rows(&axes.rows, indexer, promoter)?), true),
            None => (Cow::Borrowed(mgr), false),
        };
        let force_copy = matches!(copy, CopyPolicy::Copy) && !made_copy;
        for block in mgr.blocks() {
            let values = if force_copy {
                block.values().deep_copy()
            } else {
                block.values().clone()
            };
            blocks.push(Block::new(values, block.placement().add_offset(offset))?);
        }
        offset += mgr.columns().len();
    }
    Ok(BlockManager::new(
        blocks,
        axes.columns.clone(),
        axes.rows.clone(),
    )?)
}

fn concat_managers_rows(
    sources: &[(BlockManager, AxisIndexers)],
    axes: &OutputAxes,
    copy: CopyPolicy,
    promoter: &Promoter,
) -> Result<BlockManager, ConcatError> {
    let mut reindexed: Vec<Cow<'_, BlockManager>> = Vec::with_capacity(sources.len());
    for (mgr, indexers) in sources {
        debug_assert!(
            indexers.rows.is_none(),
            "the concat axis never carries an indexer"
        );
        let mgr = match &indexers.columns {
            Some(indexer) => Cow::Owned(mgr.reindex_columns(&axes.columns, indexer, true)?),
            None => Cow::Borrowed(mgr),
        };
        reindexed.push(mgr);
    }

    let mgr_refs: Vec<&BlockManager> = reindexed.iter().map(Cow::as_ref).collect();
    let plan = combined_plan(&mgr_refs)?;

    #[cfg(feature = "tracing")]
    tracing::debug!(
        managers = mgr_refs.len(),
        groups = plan.len(),
        columns = axes.columns.len(),
        "combined concatenation plan"
    );

    let mut blocks = Vec::with_capacity(plan.len());
    for (placement, units) in plan {
        blocks.push(assemble_group(placement, &units, copy, promoter)?);
    }
    Ok(BlockManager::new(
        blocks,
        axes.columns.clone(),
        axes.rows.clone(),
    )?)
}

/// Partition the shared column range into maximal runs over which every
/// manager's column-to-block mapping is constant, pairing each run with one
/// join unit per manager.
///
/// All managers must already share the same column axis.
pub fn combined_plan(
    mgrs: &[&BlockManager],
) -> Result<Vec<(BlockPlacement, Vec<JoinUnit>)>, ConcatError> {
    let Some(first) = mgrs.first() else {
        return Ok(Vec::new());
    };
    let ncols = first.columns().len();
    debug_assert!(
        mgrs.iter().all(|mgr| mgr.columns().len() == ncols),
        "plan inputs must share one column axis"
    );

    let mut plan = Vec::new();
    let mut start = 0;
    while start < ncols {
        let mut end = start + 1;
        while end < ncols
            && mgrs
                .iter()
                .all(|mgr| mgr.blknos()[end] == mgr.blknos()[start])
        {
            end += 1;
        }
        let placement = BlockPlacement::from_range(start..end);
        let mut units = Vec::with_capacity(mgrs.len());
        for mgr in mgrs {
            let block = block_for_concat_plan(mgr, &placement, mgr.blknos()[start])?;
            units.push(JoinUnit::new(block));
        }
        plan.push((placement, units));
        start = end;
    }
    Ok(plan)
}

/// The slice of one manager's block backing a plan run. The whole block is
/// reused when the run covers it and its placement is a contiguous slice;
/// otherwise a positional column sub-slice (a view) is taken.
fn block_for_concat_plan(
    mgr: &BlockManager,
    placement: &BlockPlacement,
    blkno: usize,
) -> Result<Block, ColumnarError> {
    let block = &mgr.blocks()[blkno];
    if placement.len() == block.placement().len() && block.placement().is_slice_like() {
        return Ok(block.clone());
    }
    let locs: Vec<usize> = placement.iter().map(|pos| mgr.blklocs()[pos]).collect();
    block.slice_columns(&locs, placement.clone())
}

/// One manager's contribution to a plan run: a block plus a lazily computed
/// all-missing flag.
#[derive(Debug, Clone)]
pub struct JoinUnit {
    block: Block,
    is_na: OnceCell<bool>,
}

impl JoinUnit {
    #[must_use]
    pub fn new(block: Block) -> Self {
        Self {
            block,
            is_na: OnceCell::new(),
        }
    }

    #[must_use]
    pub fn block(&self) -> &Block {
        &self.block
    }

    #[must_use]
    pub fn dtype(&self) -> &DType {
        self.block.dtype()
    }

    /// Whether every value in this unit is missing. Proxies are trivially
    /// all-missing; dtypes that cannot hold a missing value never are; sparse
    /// storage is never short-circuited.
    #[must_use]
    pub fn is_na(&self) -> bool {
        *self.is_na.get_or_init(|| self.compute_is_na())
    }

    fn compute_is_na(&self) -> bool {
        let values = self.block.values();
        let dtype = values.dtype();
        if dtype == &DType::Void {
            return true;
        }
        if !dtype.can_hold_na() {
            return false;
        }
        if values.ncols() * values.nrows() == 0 {
            return true;
        }
        if matches!(dtype, DType::Extension(ExtensionKind::Sparse)) {
            return false;
        }
        let mut iter = values.iter_values();
        match iter.next() {
            Some(first) if first.is_missing() => iter.all(Scalar::is_missing),
            _ => false,
        }
    }

    /// Whether this all-missing unit can be represented by filling `dtype`
    /// with its native missing marker. Object units defer to their actual
    /// null tokens; a NaT marker never crosses into a different dtype; the
    /// generic NA token does not fit native temporal storage.
    #[must_use]
    pub fn is_valid_na_for(&self, dtype: &DType) -> bool {
        if !self.is_na() {
            return false;
        }
        let own = self.block.dtype();
        if own == &DType::Void {
            return true;
        }
        if own == &DType::Object {
            return self
                .block
                .values()
                .iter_values()
                .all(|value| is_valid_na_for_dtype(value, dtype));
        }
        let fill = self.block.fill_value();
        if matches!(fill, Scalar::Null(NullKind::NaT)) && own != dtype {
            return false;
        }
        if matches!(fill, Scalar::Null(NullKind::Na)) && dtype.is_native_temporal() {
            return false;
        }
        is_valid_na_for_dtype(&fill, dtype)
    }

    /// This unit's values, prepared for concatenation toward `empty_dtype`.
    ///
    /// Returns a borrowed view when no upcasting is needed. All-missing units
    /// compatible with the target materialize as a fresh all-missing array of
    /// the final dtype (object units forward an explicit leading null token
    /// instead of the generic marker). Bool units being upcast route through
    /// object storage so they do not turn numeric.
    pub fn get_reindexed_values(
        &self,
        empty_dtype: &DType,
        upcasted_na: Option<&Scalar>,
    ) -> Result<Cow<'_, Array>, ConcatError> {
        let values = self.block.values();
        if upcasted_na.is_none() && values.dtype() != &DType::Void {
            return Ok(Cow::Borrowed(values));
        }
        let mut fill = upcasted_na
            .cloned()
            .unwrap_or_else(|| Scalar::missing_for_dtype(empty_dtype));
        if self.is_valid_na_for(empty_dtype) {
            if values.dtype() == &DType::Object {
                if let Some(Scalar::Null(NullKind::Null)) = values.iter_values().next() {
                    fill = Scalar::Null(NullKind::Null);
                }
            }
            return Ok(Cow::Owned(make_na_array(
                empty_dtype,
                values.ncols(),
                values.nrows(),
                fill,
            )?));
        }
        if !self.block.can_consolidate() {
            return Ok(Cow::Borrowed(values));
        }
        if values.dtype() == &DType::Bool {
            return Ok(Cow::Owned(values.cast(&DType::Object)?));
        }
        Ok(Cow::Borrowed(values))
    }
}

/// The single output dtype for one plan run. Identical dtypes pass through;
/// otherwise all-missing units abstain, the promoter derives the common
/// dtype, and the presence of any proxy widens it to an NA-capable one.
pub fn unified_dtype(units: &[JoinUnit], promoter: &Promoter) -> Result<DType, ConcatError> {
    let first = units.first().ok_or(ConcatError::EmptyInput)?;
    if units.len() == 1 {
        return Ok(first.dtype().clone());
    }
    if units.iter().all(|unit| unit.dtype() == first.dtype()) {
        return Ok(first.dtype().clone());
    }

    let has_none_blocks = units.iter().any(|unit| unit.dtype() == &DType::Void);
    let mut dtypes: Vec<DType> = units
        .iter()
        .filter(|unit| !unit.is_na())
        .map(|unit| unit.dtype().clone())
        .collect();
    if dtypes.is_empty() {
        dtypes = units
            .iter()
            .filter(|unit| unit.dtype() != &DType::Void)
            .map(|unit| unit.dtype().clone())
            .collect();
    }
    let mut dtype = promoter.common_type(&dtypes)?;
    if has_none_blocks {
        dtype = promoter.ensure_can_hold_na(dtype);
    }
    Ok(dtype)
}

/// The fill marker used when materializing all-missing units toward a final
/// dtype. `None` means no upcasting is required at all, which short-circuits
/// the whole reindexing step.
pub fn dtype_to_na_value(
    dtype: &DType,
    has_none_blocks: bool,
) -> Result<Option<Scalar>, ConcatError> {
    match dtype {
        DType::Extension(kind) => Ok(Some(kind.na_value())),
        DType::Datetime64 | DType::Timedelta64 => Ok(Some(Scalar::Null(NullKind::NaT))),
        DType::Float64 => Ok(Some(Scalar::Null(NullKind::NaN))),
        DType::Object => Ok(Some(Scalar::Null(NullKind::NaN))),
        DType::Bool => Ok(None),
        DType::Int64 | DType::UInt64 => {
            if has_none_blocks {
                Ok(Some(Scalar::Null(NullKind::NaN)))
            } else {
                Ok(None)
            }
        }
        DType::Void => Err(ConcatError::UnsupportedTypeKind {
            dtype: dtype.clone(),
        }),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StorageClass {
    Numeric,
    Object,
    DatetimeLike,
    Extension,
    Void,
}

fn storage_class(dtype: &DType) -> StorageClass {
    match dtype {
        DType::Bool | DType::Int64 | DType::UInt64 | DType::Float64 => StorageClass::Numeric,
        DType::Object => StorageClass::Object,
        DType::Datetime64 | DType::Timedelta64 => StorageClass::DatetimeLike,
        DType::Extension(_) => StorageClass::Extension,
        DType::Void => StorageClass::Void,
    }
}

/// Whether a run's units are uniform enough for the fast concatenation path:
/// more than one unit, same storage class throughout, dtypes equal (integer,
/// unsigned, and boolean native kinds still count as uniform; the assembler
/// re-derives the combined dtype), and no all-missing native unit.
#[must_use]
pub fn is_uniform_join_units(units: &[JoinUnit]) -> bool {
    let Some(first) = units.first() else {
        return false;
    };
    if first.dtype() == &DType::Void {
        return false;
    }
    units.len() > 1
        && units
            .iter()
            .all(|unit| storage_class(unit.dtype()) == storage_class(first.dtype()))
        && units
            .iter()
            .all(|unit| unit.dtype() == first.dtype() || unit.dtype().is_integer_bool_kind())
        && units
            .iter()
            .all(|unit| !unit.is_na() || unit.dtype().is_extension())
}

/// Concatenate a run's units through the generic path: unify the dtype,
/// materialize all-missing units, then run compatibility concatenation. Any
/// one-dimensional extension value downgrades the whole run to column-wise
/// 1-D concatenation before reshaping back to block shape.
fn concatenate_join_units(units: &[JoinUnit], promoter: &Promoter) -> Result<Array, ConcatError> {
    let empty_dtype = unified_dtype(units, promoter)?;
    let has_none_blocks = units.iter().any(|unit| unit.dtype() == &DType::Void);
    let upcasted_na = dtype_to_na_value(&empty_dtype, has_none_blocks)?;

    // A group that degenerated to one value set needs no concatenation.
    if let [unit] = units {
        let values = unit.get_reindexed_values(&empty_dtype, upcasted_na.as_ref())?;
        return Ok(values.into_owned());
    }

    let to_concat: Vec<Cow<'_, Array>> = units
        .iter()
        .map(|unit| unit.get_reindexed_values(&empty_dtype, upcasted_na.as_ref()))
        .collect::<Result<_, _>>()?;

    if to_concat
        .iter()
        .any(|values| values.dtype().is_1d_only_extension())
    {
        let flat: Vec<Array> = to_concat.iter().map(|values| values.first_column()).collect();
        let refs: Vec<&Array> = flat.iter().collect();
        Ok(ensure_block_shape(concat_compat(&refs, promoter)?))
    } else {
        let refs: Vec<&Array> = to_concat.iter().map(Cow::as_ref).collect();
        Ok(concat_compat(&refs, promoter)?)
    }
}

/// Build one output block from a plan run. Single-unit runs pass values
/// through under the copy policy; uniform runs take the fast path and keep
/// the original representation when the combined dtype matches the first
/// unit's; everything else goes through the generic path.
fn assemble_group(
    placement: BlockPlacement,
    units: &[JoinUnit],
    copy: CopyPolicy,
    promoter: &Promoter,
) -> Result<Block, ConcatError> {
    let first = units.first().ok_or(ConcatError::EmptyInput)?;
    for unit in units {
        if unit.block().values().ncols() != placement.len() {
            return Err(ConcatError::ShapeMismatch {
                expected: placement.len(),
                found: unit.block().values().ncols(),
            });
        }
    }

    #[cfg(feature = "tracing")]
    tracing::trace!(
        columns = placement.len(),
        units = units.len(),
        "assembling output block"
    );

    let (values, fastpath) = if units.len() == 1 {
        let values = match copy {
            CopyPolicy::Copy => first.block().values().deep_copy(),
            CopyPolicy::View => first.block().values().clone(),
        };
        (values, true)
    } else if is_uniform_join_units(units) {
        let first_dtype = first.dtype().clone();
        let values = if !first_dtype.is_extension() {
            let refs: Vec<&Array> = units.iter().map(|unit| unit.block().values()).collect();
            // a representation native stacking refuses is not fatal
            match native_concat(&refs, promoter) {
                Ok(values) => values,
                Err(ColumnarError::NonUniformConcat { .. }) => concat_compat(&refs, promoter)?,
                Err(err) => return Err(err.into()),
            }
        } else if first_dtype.is_1d_only_extension() {
            let flat: Vec<Array> = units
                .iter()
                .map(|unit| unit.block().values().first_column())
                .collect();
            let refs: Vec<&Array> = flat.iter().collect();
            ensure_block_shape(concat_compat(&refs, promoter)?)
        } else {
            let refs: Vec<&Array> = units.iter().map(|unit| unit.block().values()).collect();
            concat_compat(&refs, promoter)?
        };
        let fastpath = values.dtype() == &first_dtype;
        (values, fastpath)
    } else {
        (concatenate_join_units(units, promoter)?, false)
    };

    let values = if fastpath {
        values
    } else {
        ensure_block_shape(values)
    };
    Ok(Block::new(values, placement)?)
}
