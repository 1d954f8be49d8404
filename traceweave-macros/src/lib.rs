// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Marker attributes for traceweave.
//!
//! The generator finds `#[traced]` and `#[decorates(..)]` in the source text
//! and removes them from the instrumented copy. These definitions let the
//! unmodified crate build too: each checks its arguments and returns the
//! item unchanged.
//!
//! ```ignore
//! use traceweave::{decorates, traced};
//!
//! #[traced(name = "Shop")]
//! pub trait Orders {
//!     fn place(&self, id: OrderId) -> Result<u64, OrderError>;
//!     #[traced(skip)]
//!     fn count(&self) -> usize;
//! }
//!
//! #[decorates(Orders)]
//! pub struct AuditOrders { inner: Box<dyn Orders> }
//! ```

mod args;

use proc_macro::TokenStream;

/// Instrument a trait, or opt a single method in or out.
///
/// # Syntax
///
/// ```ignore
/// #[traced]
/// #[traced(skip)]
/// #[traced(name = "Shop")]
/// ```
#[proc_macro_attribute]
pub fn traced(attr: TokenStream, item: TokenStream) -> TokenStream {
    args::passthrough(args::parse_traced(attr.into()), item)
}

/// Declare a hand-written decorator of an instrumented trait.
///
/// # Syntax
///
/// ```ignore
/// #[decorates(crate::shop::Orders)]
/// ```
#[proc_macro_attribute]
pub fn decorates(attr: TokenStream, item: TokenStream) -> TokenStream {
    args::passthrough(args::parse_decorates(attr.into()), item)
}
