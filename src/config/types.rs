// ABOUTME: Small strongly typed configuration enums shared by the config modules
// ABOUTME: Contains CookieSameSite with lenient parsing and conversion to the cookie crate type
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};

/// `SameSite` policy applied to every token cookie
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CookieSameSite {
    /// Sent on top-level navigations (default)
    #[default]
    Lax,
    /// Never sent cross-site
    Strict,
    /// Always sent; browsers require `Secure` alongside it
    None,
}

impl CookieSameSite {
    /// Parse from string with fallback to `Lax`
    #[must_use]
    pub fn from_str_or_default(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "strict" => Self::Strict,
            "none" => Self::None,
            _ => Self::Lax,
        }
    }

    /// Convert to the `cookie` crate representation
    #[must_use]
    pub const fn to_cookie(self) -> cookie::SameSite {
        match self {
            Self::Lax => cookie::SameSite::Lax,
            Self::Strict => cookie::SameSite::Strict,
            Self::None => cookie::SameSite::None,
        }
    }
}

impl Display for CookieSameSite {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Lax => write!(f, "lax"),
            Self::Strict => write!(f, "strict"),
            Self::None => write!(f, "none"),
        }
    }
}
