//! pgarray: a partitioned global address space array runtime.
//!
//! Every process allocates one symmetric, distributed array by calling
//! [`Runtime::create`] (or its irregular-distribution sibling); the
//! resulting descriptor is replicated across every process, so any
//! process can compute the owner of any element without contacting
//! anyone. One-sided [`Runtime::put`]/[`Runtime::get`]/[`Runtime::acc`]
//! then move data directly between a caller's local buffer and a
//! (possibly remote) owner's patch.
//!
//! ```no_run
//! use pgarray::Runtime;
//! use pgarray_transport::{local::LocalCluster, ElemType};
//!
//! let ranks = LocalCluster::new(2, 1 << 20);
//! let mut rt = Runtime::initialize(ranks.into_iter().next().unwrap()).unwrap();
//! let handle = rt.create(ElemType::F64, vec![10, 10], "a").unwrap();
//! rt.fill(handle, pgarray_transport::Scalar::F64(0.0));
//! rt.destroy(handle);
//! rt.terminate();
//! ```

pub mod access;
pub mod accounting;
pub mod alloc;
pub mod config;
pub mod descriptor;
pub mod distribution;
pub mod error;
pub(crate) mod macros;
pub mod lifecycle;
pub mod fence;
pub mod rng;
pub mod runtime;
pub mod typed_heap;

pub use accounting::{Accounting, Snapshot};
pub use config::RuntimeConfig;
pub use descriptor::ArrayDescriptor;
pub use distribution::Rectangle;
pub use error::{GaError, GaResult};
pub use runtime::Runtime;

pub use pgarray_transport::{ElemType, Scalar};
