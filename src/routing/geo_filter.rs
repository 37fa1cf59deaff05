use anyhow::{bail, Result};
use serde::Serialize;
use uuid::Uuid;

use crate::geo::GEO_KNOWN;
use crate::shared::models::BusinessUnit;
use crate::shared::utils::haversine_km;

#[derive(Debug, Clone, Serialize)]
pub struct GeoDecision {
    pub business_unit_id: Uuid,
    pub city: String,
    pub decision: String,
    pub method: String,
}

/// Pick the office for a ticket. Tickets without usable coordinates
/// are spread deterministically over all offices by the first byte of
/// their id; otherwise the nearest office with coordinates wins.
pub fn choose_office(
    ticket_id: Uuid,
    lat: Option<f64>,
    lon: Option<f64>,
    geo_status: &str,
    offices: &[BusinessUnit],
) -> Result<GeoDecision> {
    if offices.is_empty() {
        bail!("no business units configured");
    }

    let (lat, lon) = match (lat, lon) {
        (Some(lat), Some(lon)) if geo_status == GEO_KNOWN => (lat, lon),
        _ => {
            let idx = ticket_id.as_bytes()[0] as usize % offices.len();
            let selected = &offices[idx];
            return Ok(GeoDecision {
                business_unit_id: selected.id,
                city: selected.city.clone(),
                decision: format!(
                    "Geo status '{}' — fallback 50/50 distribution, assigned to {}",
                    geo_status, selected.city
                ),
                method: "fallback_50_50".to_string(),
            });
        }
    };

    let mut nearest: Option<(&BusinessUnit, f64)> = None;
    for office in offices {
        let (Some(office_lat), Some(office_lon)) = (office.lat, office.lon) else {
            continue;
        };
        let dist = haversine_km(lat, lon, office_lat, office_lon);
        if nearest.map_or(true, |(_, best)| dist < best) {
            nearest = Some((office, dist));
        }
    }

    match nearest {
        Some((office, dist)) => Ok(GeoDecision {
            business_unit_id: office.id,
            city: office.city.clone(),
            decision: format!(
                "Geo resolved — nearest office: {} (distance: {:.1} km)",
                office.city, dist
            ),
            method: "nearest".to_string(),
        }),
        None => {
            let office = &offices[0];
            Ok(GeoDecision {
                business_unit_id: office.id,
                city: office.city.clone(),
                decision: format!("No office coordinates — fallback to {}", office.city),
                method: "fallback_no_coords".to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn office(city: &str, lat: Option<f64>, lon: Option<f64>) -> BusinessUnit {
        BusinessUnit {
            id: Uuid::new_v4(),
            name: format!("Офис {}", city),
            city: city.to_string(),
            address: None,
            lat,
            lon,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_nearest_office_wins() {
        let offices = vec![
            office("Астана", Some(51.1694), Some(71.4491)),
            office("Алматы", Some(43.2220), Some(76.8512)),
        ];
        // Ticket geocoded in Almaty.
        let d = choose_office(Uuid::new_v4(), Some(43.25), Some(76.9), "known", &offices).unwrap();
        assert_eq!(d.city, "Алматы");
        assert_eq!(d.method, "nearest");
    }

    #[test]
    fn test_unknown_geo_uses_first_byte_fallback() {
        let offices = vec![
            office("Астана", Some(51.1694), Some(71.4491)),
            office("Алматы", Some(43.2220), Some(76.8512)),
        ];
        let ticket_id = Uuid::new_v4();
        let d = choose_office(ticket_id, None, None, "unknown", &offices).unwrap();
        let expected = &offices[ticket_id.as_bytes()[0] as usize % 2];
        assert_eq!(d.business_unit_id, expected.id);
        assert_eq!(d.method, "fallback_50_50");

        // Deterministic: same ticket id, same office.
        let again = choose_office(ticket_id, None, None, "unknown", &offices).unwrap();
        assert_eq!(again.business_unit_id, d.business_unit_id);
    }

    #[test]
    fn test_known_status_without_coords_falls_back() {
        let offices = vec![office("Астана", Some(51.0), Some(71.0))];
        let d = choose_office(Uuid::new_v4(), None, None, "known", &offices).unwrap();
        assert_eq!(d.method, "fallback_50_50");
    }

    #[test]
    fn test_no_office_coordinates_falls_back_to_first() {
        let offices = vec![office("Астана", None, None), office("Алматы", None, None)];
        let d = choose_office(Uuid::new_v4(), Some(43.2), Some(76.8), "known", &offices).unwrap();
        assert_eq!(d.city, "Астана");
        assert_eq!(d.method, "fallback_no_coords");
    }

    #[test]
    fn test_no_offices_is_error() {
        assert!(choose_office(Uuid::new_v4(), None, None, "unknown", &[]).is_err());
    }
}
