// SPDX-FileCopyrightText: 2026 Fieldops Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Site reference data parsed from the `Locations` sheet.

use fieldops_core::FlowKind;

/// A named site with a center point and per-flow proximity radii.
///
/// Radii are independent: a site can accept check-ins from 300 m but
/// submissions only from 100 m. A radius of zero (or below) means the site
/// can never be matched by proximity for that flow, only returned as
/// "nearest".
#[derive(Debug, Clone, PartialEq)]
pub struct Site {
    pub name: String,
    pub group: String,
    pub latitude: f64,
    pub longitude: f64,
    pub checkin_radius_m: f64,
    pub submission_radius_m: f64,
}

impl Site {
    /// The proximity radius that applies to the given flow.
    pub fn radius_for(&self, flow: FlowKind) -> f64 {
        match flow {
            FlowKind::Checkin => self.checkin_radius_m,
            FlowKind::Submission => self.submission_radius_m,
        }
    }
}

/// Parse raw `Locations` sheet rows into sites.
///
/// Expected layout (header at row 1, skipped):
/// `name | group | latitude | longitude | checkin_radius_m | submission_radius_m`.
///
/// Parsing is lenient: rows missing a name or with unparseable coordinates
/// are skipped rather than failing the whole load, so one bad row in the
/// sheet cannot take geofencing down. Missing radii default to 0, which
/// excludes the site from proximity matching without dropping it from
/// nearest-site fallback.
pub fn parse_site_rows(rows: &[Vec<String>]) -> Vec<Site> {
    let mut sites = Vec::new();
    if rows.len() < 2 {
        return sites;
    }
    for row in &rows[1..] {
        let name = match row.first().map(|c| c.trim()) {
            Some(n) if !n.is_empty() => n.to_string(),
            _ => continue,
        };
        let group = row
            .get(1)
            .map(|c| c.trim().to_string())
            .unwrap_or_default();
        let latitude = match row.get(2).and_then(|c| c.trim().parse::<f64>().ok()) {
            Some(v) => v,
            None => {
                tracing::debug!(site = name.as_str(), "skipping site row with bad latitude");
                continue;
            }
        };
        let longitude = match row.get(3).and_then(|c| c.trim().parse::<f64>().ok()) {
            Some(v) => v,
            None => {
                tracing::debug!(site = name.as_str(), "skipping site row with bad longitude");
                continue;
            }
        };
        let checkin_radius_m = row
            .get(4)
            .and_then(|c| c.trim().parse::<f64>().ok())
            .unwrap_or(0.0);
        let submission_radius_m = row
            .get(5)
            .and_then(|c| c.trim().parse::<f64>().ok())
            .unwrap_or(0.0);
        sites.push(Site {
            name,
            group,
            latitude,
            longitude,
            checkin_radius_m,
            submission_radius_m,
        });
    }
    sites
}
