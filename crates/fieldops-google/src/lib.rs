// SPDX-FileCopyrightText: 2026 Fieldops Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Google adapters for Fieldops.
//!
//! [`SheetsClient`] implements [`fieldops_core::traits::TabularBackend`]
//! over the Sheets values API; [`DriveStore`] implements
//! [`fieldops_core::traits::MediaStore`] over Drive v3 uploads. Both expect
//! an externally acquired OAuth bearer token; token refresh is outside the
//! process.

pub mod drive;
pub mod sheets;

pub use drive::DriveStore;
pub use sheets::SheetsClient;
