// SPDX-FileCopyrightText: 2025 Timothy Pogue
//
// SPDX-License-Identifier: ISC

pub const APP_NAME: &str = "kres";

/// Prefix for environment variables read by the config builder, e.g.
/// `KRES__PROVIDER__FIELD_MANAGER`
pub const ENV_PREFIX: &str = "KRES";

pub const DEFAULT_FIELD_MANAGER: &str = "kres";
pub const DEFAULT_NAMESPACE: &str = "default";
