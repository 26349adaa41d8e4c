// SPDX-FileCopyrightText: 2026 Fieldops Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Great-circle geofence matching.
//!
//! Given a GPS fix and the current site list, finds the site whose per-flow
//! radius contains the fix. When several radii overlap, the closest site
//! wins. When none contain it, a configurable no-match policy decides what
//! name/group (if any) the transaction records.

use fieldops_core::FlowKind;

use crate::site::Site;

/// Mean Earth radius in meters, for the haversine formula.
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// What to record when no site's radius contains the fix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NoMatchPolicy {
    /// Record the nearest site's name/group, flagged as unmatched.
    #[default]
    NearestOrCoords,
    /// Record the raw coordinates as the site name, with no group.
    CoordsOnly,
    /// Record nothing; the caller rejects the location.
    Reject,
}

impl NoMatchPolicy {
    /// Parse a configured policy string, falling back to the default for
    /// unknown values so a typo in config degrades rather than breaks.
    pub fn from_config_value(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "coords_only" => NoMatchPolicy::CoordsOnly,
            "reject" => NoMatchPolicy::Reject,
            _ => NoMatchPolicy::NearestOrCoords,
        }
    }
}

/// Outcome of a geofence query.
///
/// `site_group` is `None` when there is no real site behind the name (the
/// coordinates fallback) or when the policy rejected the fix entirely.
#[derive(Debug, Clone, PartialEq)]
pub struct SiteMatch {
    pub site_name: Option<String>,
    pub site_group: Option<String>,
    pub matched: bool,
    pub distance_m: Option<f64>,
}

/// Great-circle distance between two coordinates, in meters.
pub fn haversine_distance_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let delta_phi = (lat2 - lat1).to_radians();
    let delta_lambda = (lon2 - lon1).to_radians();

    let a = (delta_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (delta_lambda / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_M * c
}

/// Format raw coordinates as a site-name placeholder.
pub fn format_coords(lat: f64, lon: f64) -> String {
    format!("{lat},{lon}")
}

/// Match a fix against the site list using the radius for `flow`.
///
/// Returns the closest site among all whose radius contains the fix
/// (matched=true), otherwise applies `policy`. An empty site list always
/// degrades to the coordinates fallback regardless of policy, so a blank
/// Locations tab never locks employees out.
pub fn match_site(
    lat: f64,
    lon: f64,
    flow: FlowKind,
    sites: &[Site],
    policy: NoMatchPolicy,
) -> SiteMatch {
    if sites.is_empty() {
        return SiteMatch {
            site_name: Some(format_coords(lat, lon)),
            site_group: None,
            matched: false,
            distance_m: None,
        };
    }

    let mut best_within: Option<(&Site, f64)> = None;
    let mut nearest: Option<(&Site, f64)> = None;

    for site in sites {
        let d = haversine_distance_m(lat, lon, site.latitude, site.longitude);
        let radius = site.radius_for(flow);
        if radius > 0.0 && d <= radius {
            match best_within {
                Some((_, best_d)) if best_d <= d => {}
                _ => best_within = Some((site, d)),
            }
        }
        match nearest {
            Some((_, nearest_d)) if nearest_d <= d => {}
            _ => nearest = Some((site, d)),
        }
    }

    if let Some((site, d)) = best_within {
        tracing::debug!(
            site = site.name.as_str(),
            distance_m = d,
            flow = %flow,
            "geofence match"
        );
        return SiteMatch {
            site_name: Some(site.name.clone()),
            site_group: Some(site.group.clone()),
            matched: true,
            distance_m: Some(d),
        };
    }

    // sites is non-empty here, so nearest is always populated
    let (nearest_site, nearest_d) = match nearest {
        Some(pair) => pair,
        None => {
            return SiteMatch {
                site_name: Some(format_coords(lat, lon)),
                site_group: None,
                matched: false,
                distance_m: None,
            };
        }
    };

    match policy {
        NoMatchPolicy::NearestOrCoords => SiteMatch {
            site_name: Some(nearest_site.name.clone()),
            site_group: Some(nearest_site.group.clone()),
            matched: false,
            distance_m: Some(nearest_d),
        },
        NoMatchPolicy::CoordsOnly => SiteMatch {
            site_name: Some(format_coords(lat, lon)),
            site_group: None,
            matched: false,
            distance_m: Some(nearest_d),
        },
        NoMatchPolicy::Reject => SiteMatch {
            site_name: None,
            site_group: None,
            matched: false,
            distance_m: Some(nearest_d),
        },
    }
}
