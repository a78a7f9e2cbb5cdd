use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VehicleType {
    Truck,
    Van,
    SemiTrailer,
    Refrigerated,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CargoCategory {
    Standard,
    Hazardous,
    Perishable,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactInfo {
    pub email: String,
    pub phone: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FleetVehicle {
    pub vehicle_type: VehicleType,
    pub quantity: u32,
}

/// A geographic endpoint on a transport route. Country codes are ISO 3166-1
/// alpha-2 and validated at the boundary.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutePoint {
    pub country_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportRoute {
    pub name: String,
    pub origin: RoutePoint,
    pub destination: RoutePoint,
    #[serde(default)]
    pub transit_countries: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitoringPreferences {
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub regions: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyProfile {
    pub company_name: String,
    pub contact: ContactInfo,
    pub fleet: Vec<FleetVehicle>,
    pub routes: Vec<TransportRoute>,
    pub cargo_categories: Vec<CargoCategory>,
    #[serde(default)]
    pub monitoring_preferences: MonitoringPreferences,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileViolation {
    pub field: String,
    pub message: String,
}

impl CompanyProfile {
    /// Boundary validation. Collects every violation instead of stopping at
    /// the first so an API caller can fix a payload in one round trip.
    pub fn validate(&self) -> Result<(), DomainError> {
        let mut violations = Vec::new();

        if self.company_name.trim().is_empty() {
            violations.push(ProfileViolation {
                field: "company_name".to_string(),
                message: "company name must not be empty".to_string(),
            });
        }

        for (index, vehicle) in self.fleet.iter().enumerate() {
            if vehicle.quantity == 0 {
                violations.push(ProfileViolation {
                    field: format!("fleet[{index}].quantity"),
                    message: "fleet quantity must be at least 1".to_string(),
                });
            }
        }

        for (index, route) in self.routes.iter().enumerate() {
            if route.name.trim().is_empty() {
                violations.push(ProfileViolation {
                    field: format!("routes[{index}].name"),
                    message: "route name must not be empty".to_string(),
                });
            }
            check_country_code(
                &route.origin.country_code,
                format!("routes[{index}].origin.country_code"),
                &mut violations,
            );
            check_country_code(
                &route.destination.country_code,
                format!("routes[{index}].destination.country_code"),
                &mut violations,
            );
            for (transit_index, code) in route.transit_countries.iter().enumerate() {
                check_country_code(
                    code,
                    format!("routes[{index}].transit_countries[{transit_index}]"),
                    &mut violations,
                );
            }
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(DomainError::InvalidProfile { violations })
        }
    }

    /// Country codes touched by any route, origin and destination included,
    /// in first-seen order without duplicates.
    pub fn route_countries(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for route in &self.routes {
            for code in [&route.origin.country_code, &route.destination.country_code]
                .into_iter()
                .chain(route.transit_countries.iter())
            {
                if !seen.iter().any(|existing: &String| existing == code) {
                    seen.push(code.clone());
                }
            }
        }
        seen
    }
}

fn check_country_code(code: &str, field: String, violations: &mut Vec<ProfileViolation>) {
    let trimmed = code.trim();
    if trimmed.len() != 2 || !trimmed.chars().all(|ch| ch.is_ascii_alphabetic()) {
        violations.push(ProfileViolation {
            field,
            message: format!("`{code}` is not a two-letter ISO 3166-1 country code"),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::{
        CargoCategory, CompanyProfile, ContactInfo, FleetVehicle, MonitoringPreferences,
        RoutePoint, TransportRoute, VehicleType,
    };
    use crate::errors::DomainError;

    fn profile() -> CompanyProfile {
        CompanyProfile {
            company_name: "Baltic Freight GmbH".to_string(),
            contact: ContactInfo {
                email: "ops@balticfreight.example".to_string(),
                phone: "+49 40 555 0199".to_string(),
            },
            fleet: vec![
                FleetVehicle { vehicle_type: VehicleType::Truck, quantity: 12 },
                FleetVehicle { vehicle_type: VehicleType::Refrigerated, quantity: 3 },
            ],
            routes: vec![TransportRoute {
                name: "Hamburg-Warsaw".to_string(),
                origin: RoutePoint {
                    country_code: "DE".to_string(),
                    city: Some("Hamburg".to_string()),
                },
                destination: RoutePoint {
                    country_code: "PL".to_string(),
                    city: Some("Warsaw".to_string()),
                },
                transit_countries: vec!["CZ".to_string()],
            }],
            cargo_categories: vec![CargoCategory::Standard, CargoCategory::Perishable],
            monitoring_preferences: MonitoringPreferences::default(),
        }
    }

    #[test]
    fn valid_profile_passes_validation() {
        profile().validate().expect("profile should be valid");
    }

    #[test]
    fn collects_all_violations_in_one_pass() {
        let mut bad = profile();
        bad.company_name = "  ".to_string();
        bad.fleet[0].quantity = 0;
        bad.routes[0].origin.country_code = "DEU".to_string();

        let error = bad.validate().expect_err("profile should be rejected");
        let DomainError::InvalidProfile { violations } = error else {
            panic!("expected InvalidProfile");
        };
        assert_eq!(violations.len(), 3);
        assert!(violations.iter().any(|v| v.field == "company_name"));
        assert!(violations.iter().any(|v| v.field == "fleet[0].quantity"));
        assert!(violations.iter().any(|v| v.field.contains("origin.country_code")));
    }

    #[test]
    fn route_countries_deduplicates_in_first_seen_order() {
        let mut with_return_leg = profile();
        with_return_leg.routes.push(TransportRoute {
            name: "Warsaw-Hamburg".to_string(),
            origin: RoutePoint { country_code: "PL".to_string(), city: None },
            destination: RoutePoint { country_code: "DE".to_string(), city: None },
            transit_countries: vec!["CZ".to_string()],
        });

        assert_eq!(with_return_leg.route_countries(), vec!["DE", "PL", "CZ"]);
    }

    #[test]
    fn vehicle_types_serialize_snake_case() {
        let json = serde_json::to_string(&VehicleType::SemiTrailer).expect("serialize");
        assert_eq!(json, "\"semi_trailer\"");
    }
}
