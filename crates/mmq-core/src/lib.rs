//! # mmq-core
//!
//! Core tensor-descriptor primitives shared by the host and NPU sides of mmq.
//!
//! This crate provides:
//! - [`DType`]: element types (F32, F16, BF16)
//! - [`Shape`]: dimension sizes of a contiguous buffer
//! - [`Device`]: host or NPU residency
//! - [`CpuStorage`]: host-resident buffers and the host reference kernels
//! - [`BackendStorage`] trait: what the dispatcher needs to know about any buffer
//! - [`RandomSource`]: injectable, seedable random fills
//! - [`Tolerance`] / [`compare`]: element-wise numerical equivalence
//! - [`Error`]: the single error type used across the workspace

pub mod backend;
pub mod compare;
pub mod device;
pub mod dtype;
pub mod error;
pub mod rng;
pub mod shape;
pub mod storage;

pub use backend::{BackendStorage, BinaryOp};
pub use compare::{all_close, compare, CloseReport, Tolerance};
pub use device::{Device, DeviceKind};
pub use dtype::{DType, WithDType};
pub use error::{Error, Result};
pub use rng::{RandomSource, SeededRandom};
pub use shape::Shape;
pub use storage::CpuStorage;
