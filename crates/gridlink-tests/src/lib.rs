// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Gridlink Authors. All rights reserved.

//! # gridlink-tests
//!
//! Integration tests and the shared harness for the GRIDLINK gateway.
//! The interesting content lives in `tests/`; this crate only exports the
//! common fixtures.

pub mod common;
