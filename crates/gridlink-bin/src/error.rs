// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Gridlink Authors. All rights reserved.

//! Binary-level errors.

use std::path::PathBuf;

use thiserror::Error;

use gridlink_core::error::ErrorCode;

/// Errors surfacing from the gateway binary.
#[derive(Debug, Error)]
pub enum BinError {
    /// Configuration file problems.
    #[error("config error in '{path}': {message}")]
    Config {
        /// Path of the offending file.
        path: PathBuf,
        /// What went wrong.
        message: String,
    },

    /// Initialization failed before the gateway was serving.
    #[error("initialization failed: {0}")]
    Initialization(String),

    /// A control-plane call failed during boot.
    #[error("gateway error: {0}")]
    Gateway(#[from] ErrorCode),
}

/// Result alias for the binary.
pub type BinResult<T> = Result<T, BinError>;
