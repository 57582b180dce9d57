//! Integration tests for ModVault
//!
//! These tests run the gateway router on a real socket in front of a stub
//! upstream, and drive the catalog resolver through the HTTP surface.

#[path = "integration/download_gateway.rs"]
mod download_gateway;

#[path = "integration/entitlements.rs"]
mod entitlements;
