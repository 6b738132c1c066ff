// ABOUTME: Unified error handling re-exported from the core crate
// ABOUTME: Gives the main crate a stable crate::errors path for AppError and the protocol taxonomy
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! # Unified Error Handling System
//!
//! Error types live in `arch-idp-core` so the persistence adapters and the
//! engine share one definition. This module re-exports them.

pub use arch_idp_core::errors::{
    store::is_transient_message, AppError, AppResult, ErrorCode, ProtocolError, StoreError,
};
