// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Runtime support for generated code.
//!
//! Instrumented crates depend on `traceweave` for this module only. The
//! generated `TRACER` static is a [`Tracer`]; decorators and interceptors
//! open spans through it:
//!
//! ```rust,ignore
//! use traceweave::runtime::{Instrument as _, Tracer};
//!
//! static TRACER: Tracer = Tracer::new("shop", "1.4.0");
//!
//! fn place(&self, id: OrderId) -> Result<(), Error> {
//!     let _span = TRACER.start_span("Orders.place");
//!     self.inner.place(id)
//! }
//!
//! async fn save(&self, item: Item) -> Result<(), Error> {
//!     self.inner.save(item).instrument(TRACER.span("Repo.save")).await
//! }
//! ```
//!
//! Spans are ordinary `tracing` spans, so any subscriber (fmt,
//! `tracing-opentelemetry`, a test layer) observes them.

mod tracer;

pub use tracer::{SpanGuard, Tracer, SPAN_NAME, TARGET};
pub use tracing::Instrument;
