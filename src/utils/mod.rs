// ABOUTME: Utility modules shared by the OAuth client, token stores, and HTTP integration
// ABOUTME: Contains the injectable clock and the identity server HTTP client builder
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

/// Injectable time source
pub mod clock;
/// HTTP client configuration and helpers
pub mod http_client;
