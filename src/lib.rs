//! # pkgvault-loader
//!
//! A package-loader engine: fetch third-party registry artifacts, unpack
//! them safely, content-address the result, and stage it into an
//! append-only object graph alongside an origin-visit record describing
//! the outcome.
//!
//! ## Architecture
//! - [`orchestrator`] - drives one `load(origin)` visit end to end
//! - [`adapters`] - per-registry polymorphism (npm, PyPI, crates.io, CPAN,
//!   pub.dev, AUR, CRAN, nix/guix, generic tarball, deposit)
//! - [`fetch`] - retrying, digest-verifying, per-visit-memoised downloads
//! - [`unpack`] - sandboxed archive extraction (tar/zip/.deb/.gem/...)
//! - [`hash`] - content addressing (`sha1-git`) for blobs, trees and releases
//! - [`staging`] - dependency-ordered batched writes into the object store
//! - [`store`] - the `ObjectStore` contract and an in-memory test double
//! - [`model`] - the object graph's data types
//! - [`visit_state`] - the visit status state machine
//! - [`failures`] - per-branch failure classification and accounting
//! - [`config`] - the loader's numeric knobs
//! - [`error`] - the closed set of structural/transient error kinds

// Production-ready clippy configuration
#![warn(clippy::pedantic)]
#![warn(clippy::perf)]
#![warn(clippy::suspicious)]
// Allow documentation lints - internal code, not public API
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]
// Allow some pedantic lints that are too strict for this codebase
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::similar_names)]
#![allow(clippy::items_after_statements)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::significant_drop_tightening)]
// Allow pedantic lints that are not critical
#![allow(clippy::type_complexity)]

pub mod adapters;
pub mod config;
pub mod error;
pub mod failures;
pub mod fetch;
pub mod hash;
pub mod model;
pub mod orchestrator;
pub mod staging;
pub mod store;
pub mod unpack;
pub mod visit_state;
