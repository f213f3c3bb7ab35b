//! # Controllers
//!
//! Reconcilers driven by a [`DependencyWatcher`](crate::depwatch::DependencyWatcher).
//!
//! - `componentfinalizer`: keeps the cleanup finalizer on the `grc`
//!   InternalHubComponent while policy add-ons exist
//! - `complianceapi`: keeps the compliance history API Route in step with the
//!   database Secret

pub mod complianceapi;
pub mod componentfinalizer;

pub use complianceapi::ComplianceDbSecretReconciler;
pub use componentfinalizer::ComponentFinalizerReconciler;
