// SPDX-FileCopyrightText: 2026 Fieldops Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Geofence matching for the Fieldops bot.
//!
//! This crate provides:
//! - [`Site`]: named reference points with per-flow proximity radii, parsed
//!   leniently from the `Locations` sheet
//! - [`match_site`]: haversine-based containment with closest-site-wins
//!   tie-breaking and a configurable [`NoMatchPolicy`] fallback
//!
//! Site data is not cached; callers load it fresh on each geofence query
//! so a sheet edit takes effect on the very next fix.

pub mod matcher;
pub mod site;

pub use matcher::{format_coords, haversine_distance_m, match_site, NoMatchPolicy, SiteMatch};
pub use site::{parse_site_rows, Site};
