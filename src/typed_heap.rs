//! Minimal stand-in for the bulk-typed heap that gives foreign-language
//! callers an index-based (rather than pointer-based) view of a process's
//! local array storage. A real foreign-function boundary is out of scope
//! (§1); what's modeled here is just the alignment reference point every
//! symmetric allocation is measured against (§4.2).

use pgarray_transport::{ElemType, OneSided};

use crate::error::GaError;

pub struct TypedHeap {
    int_base: usize,
    dbl_base: usize,
    cplx_base: usize,
}

impl TypedHeap {
    /// Collectively carves out one small reference region per element type.
    /// Must be called by every process with the same sequence of calls.
    pub fn init<T: OneSided>(transport: &T, my_rank: usize) -> Result<Self, GaError> {
        let int_bases = transport
            .symmetric_alloc(ElemType::I64.size())
            .map_err(|e| GaError::resource_exhausted(e.to_string()))?;
        let dbl_bases = transport
            .symmetric_alloc(ElemType::F64.size())
            .map_err(|e| GaError::resource_exhausted(e.to_string()))?;
        let cplx_bases = transport
            .symmetric_alloc(ElemType::C128.size())
            .map_err(|e| GaError::resource_exhausted(e.to_string()))?;
        Ok(Self {
            int_base: int_bases[my_rank],
            dbl_base: dbl_bases[my_rank],
            cplx_base: cplx_bases[my_rank],
        })
    }

    pub fn typed_base(&self, element_type: ElemType) -> usize {
        match element_type {
            ElemType::I64 => self.int_base,
            ElemType::F64 => self.dbl_base,
            ElemType::C128 => self.cplx_base,
        }
    }

    /// Byte offset from the typed base that a `base_ptr` must satisfy after
    /// alignment-adjustment; `0` means already aligned to an element boundary.
    pub fn alignment_remainder(&self, element_type: ElemType, raw_ptr: usize) -> usize {
        let elem_size = element_type.size();
        let typed_base = self.typed_base(element_type);
        raw_ptr.abs_diff(typed_base) % elem_size
    }

    /// Foreign-language index of a local element at `ptr` of the given type.
    pub fn index_of(&self, element_type: ElemType, ptr: usize) -> usize {
        (ptr - self.typed_base(element_type)) / element_type.size()
    }
}
