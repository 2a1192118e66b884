//! Core verification logic for Freightline.
//!
//! This crate verifies identity tokens issued by third-party sign-in
//! providers. It has NO web framework or database dependencies; the
//! authentication flow that extracts tokens from requests lives elsewhere.
//!
//! # Modules
//!
//! - `identity` - Apple and Google ID-token verification and signing key caching

pub mod identity;
