// Copyright 2026 dxy-watch contributors
// SPDX-License-Identifier: Apache-2.0

//! dxy-watch library — scrape, validate, and persist the US dollar index.
//!
//! This library crate exposes the core modules for integration testing.

pub mod artifacts;
pub mod config;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod plausibility;
pub mod renderer;
pub mod store;
pub mod synthetic;
