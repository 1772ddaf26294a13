// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![deny(unsafe_code)]

//! # loopfuse
//!
//! Legality analysis and CFG transformation for fusing adjacent loops in SSA
//! form.
//!
//! Given a function with two loops that follow each other directly, run the
//! same number of times, always run together, and never touch the same memory
//! in an order that fusion would reverse, `loopfuse` merges them into one loop
//! that executes both bodies per iteration.
//!
//! ## Features
//!
//! - **SSA IR** - a small SSA function representation with a closure-based
//!   builder and a reference interpreter
//! - **Loop analysis** - natural loop detection, preheaders, guards, and a
//!   loop-nest registry with stable ids
//! - **Scalar evolution** - affine expressions, add-recurrences and symbolic
//!   trip counts
//! - **Dependence testing** - per-iteration distance for affine array accesses
//! - **Loop fusion** - four legality predicates plus a merger that splices the
//!   loops and removes the dead plumbing
//! - **Pass pipeline** - an `SsaPass` trait and a scheduler that runs passes
//!   over many functions in parallel until a fixpoint
//!
//! ## Quick Start
//!
//! ```rust
//! use loopfuse::prelude::*;
//!
//! // for i in 0..n { a[i] = i }  then  for j in 0..n { b[j] = a[j] + 1 }
//! let ssa = SsaFunctionBuilder::new("produce_consume").build_with(|f| {
//!     let (a, b, n) = (f.param(), f.param(), f.param());
//!     let (i_next, j_next) = (f.var(), f.var());
//!     let (zero, one) = f.block(0, |bb| {
//!         let consts = (bb.const_i64(0), bb.const_i64(1));
//!         bb.jump(1);
//!         consts
//!     });
//!     let i = f.block(1, |bb| {
//!         let i = bb.phi(&[(0, zero), (3, i_next)]);
//!         let c = bb.cmp(CmpKind::Lt, i, n);
//!         bb.branch(c, 2, 4);
//!         i
//!     });
//!     f.block(2, |bb| {
//!         bb.store(a, i, i);
//!         bb.jump(3);
//!     });
//!     f.block(3, |bb| {
//!         bb.add_into(i_next, i, one);
//!         bb.jump(1);
//!     });
//!     f.block(4, |bb| bb.jump(5));
//!     let j = f.block(5, |bb| {
//!         let j = bb.phi(&[(4, zero), (7, j_next)]);
//!         let c = bb.cmp(CmpKind::Lt, j, n);
//!         bb.branch(c, 6, 8);
//!         j
//!     });
//!     f.block(6, |bb| {
//!         let v = bb.load(a, j);
//!         let w = bb.add(v, one);
//!         bb.store(b, j, w);
//!         bb.jump(7);
//!     });
//!     f.block(7, |bb| {
//!         bb.add_into(j_next, j, one);
//!         bb.jump(5);
//!     });
//!     f.block(8, |bb| bb.ret());
//! });
//!
//! let mut fused = ssa.clone();
//! let events = EventLog::new();
//! let preserved =
//!     LoopFusionPass::new().run_function(&mut fused, &FusionConfig::default(), &events)?;
//!
//! assert_eq!(preserved, PreservedAnalyses::None);
//! assert_eq!(fused.analyze_loops().len(), 1);
//!
//! let args = [Argument::Array(vec![0; 4]), Argument::Array(vec![0; 4]), Argument::Int(4)];
//! let before = SsaEvaluator::new(&ssa).run(&args)?;
//! let after = SsaEvaluator::new(&fused).run(&args)?;
//! assert_eq!(before.memory, after.memory);
//! # Ok::<(), loopfuse::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`utils::graph`] - node ids, graph traits, dominators and traversals
//! - [`analysis`] - the SSA IR and the analyses fusion consults
//! - [`compiler`] - passes, the scheduler, events and configuration
//!
//! ## Logging
//!
//! The crate logs through the [`log`](https://docs.rs/log) facade: `debug` for
//! every fused or rejected loop pair, `trace` for the individual predicate
//! results, `warn` when the scheduler gives up before a fixpoint. No logger is
//! installed by the library.
//!
//! ## Error Handling
//!
//! Failing to fuse is not an error: rejected pairs are left alone and recorded
//! as [`compiler::EventKind::FusionRejected`]. An [`Error`] is only returned when
//! a transformation finds the IR in a state its checks ruled out, when
//! verification is enabled and fails, or when the interpreter is misused.

#[macro_use]
pub(crate) mod error;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust
/// use loopfuse::prelude::*;
///
/// let ssa = SsaFunctionBuilder::new("empty").build_with(|f| f.block(0, |b| b.ret()));
/// assert!(ssa.analyze_loops().is_empty());
/// ```
pub mod prelude;

/// Generic graph infrastructure: node ids, traits, dominators and traversals.
pub mod utils;

/// SSA IR and program analyses.
///
/// See the module documentation for the SSA representation, loop detection,
/// scalar evolution and dependence testing.
pub mod analysis;

/// SSA passes, the pass scheduler, events and configuration.
pub mod compiler;

/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
///
/// # Examples
///
/// ```rust
/// use loopfuse::{analysis::SsaFunction, Result};
///
/// fn check(ssa: &SsaFunction) -> Result<()> {
///     ssa.validate()
/// }
/// ```
pub type Result<T> = std::result::Result<T, Error>;

/// `loopfuse` Error type
///
/// # Examples
///
/// ```rust
/// use loopfuse::{analysis::SsaFunction, Error};
///
/// let mut ssa = SsaFunction::new("broken");
/// ssa.add_block();
/// match ssa.validate() {
///     Ok(()) => println!("valid"),
///     Err(Error::Malformed { message, .. }) => println!("malformed: {}", message),
///     Err(e) => println!("error: {}", e),
/// }
/// ```
pub use error::Error;
