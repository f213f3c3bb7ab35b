//! Governance Policy Addon Controller Library
//!
//! Hub-side controller for the Open Cluster Management governance add-ons.
//! Computes per-cluster Helm values for the policy add-on agents, keeps the
//! cleanup finalizer on the hub's `InternalHubComponent` and reconciles the
//! compliance history API Route.

// Re-export modules so they can be tested
pub mod addon;
pub mod cli;
pub mod client;
pub mod config;
pub mod constants;
pub mod controllers;
pub mod crd;
pub mod depwatch;
pub mod error;
pub mod observability;
pub mod runtime;
pub mod server;
