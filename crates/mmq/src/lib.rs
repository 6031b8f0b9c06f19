//! # mmq
//!
//! Element-wise operations on an NPU, with host reference kernels and the
//! checks needed to verify one against the other.
//!
//! - [`Tensor`]: shape, dtype and an owned buffer on the host or an NPU
//! - [`to_device`]: deep-copy transfer between host and NPU memory
//! - [`Dispatcher`]: `(op, dtype, device)` kernel registry
//! - [`add`] / [`add_into`]: element-wise addition
//! - [`allclose`]: tolerance-based comparison, loosened for 16-bit dtypes
//!
//! # Quick Start
//!
//! ```ignore
//! use mmq::prelude::*;
//!
//! mmq_npu::init(0)?;
//! let mut rng = SeededRandom::new(0);
//! let x = Tensor::randn((3, 4), DType::BF16, Device::Host, &mut rng)?;
//! let y = Tensor::randn((3, 4), DType::BF16, Device::Host, &mut rng)?;
//! let expected = mmq::add(&x, &y)?;
//! let actual = mmq::add(&x.to_npu(0)?, &y.to_npu(0)?)?.to_host()?;
//! assert!(mmq::allclose_default(&actual, &expected)?);
//! ```

pub mod compare;
pub mod config;
pub mod dispatch;
pub mod logging;
pub mod ops;
pub mod tensor;
pub mod transfer;

pub use compare::{allclose, allclose_default, close_report};
pub use config::RuntimeConfig;
pub use dispatch::{Dispatcher, KernelFn};
pub use ops::{add, add_into};
pub use tensor::{Storage, Tensor};
pub use transfer::to_device;

pub use mmq_core;
pub use mmq_npu;

/// Convenience imports for the common workflow.
pub mod prelude {
    pub use crate::{add, add_into, allclose, allclose_default, to_device, Tensor};
    pub use mmq_core::{
        CloseReport, DType, Device, DeviceKind, Error, RandomSource, Result, SeededRandom, Shape,
        Tolerance,
    };
}
